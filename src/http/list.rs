//! `GET /recordings`: lists items under a root/path, enriched with a resume
//! summary and — where cheap — a probed duration.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::collaborators::{RecordingEntry, RecordingListing};
use crate::error::AppError;
use crate::id_codec::{self, ServiceRef};

use super::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    #[serde(default)]
    pub path: String,
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnrichedEntry {
    pub id: String,
    pub name: String,
    pub size_bytes: u64,
    pub resume_seconds: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub movies: Vec<EnrichedEntry>,
    pub bookmarks: Vec<EnrichedEntry>,
}

pub async fn list_recordings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let principal = state.auth.principal(query.token.as_deref());

    let listing: RecordingListing = state.recording_source.list(&query.path).await?;

    let movies = enrich(&state, &listing.movies, principal.as_ref().map(|p| p.id.as_str())).await;
    let bookmarks =
        enrich(&state, &listing.bookmarks, principal.as_ref().map(|p| p.id.as_str())).await;

    Ok(Json(ListResponse { movies, bookmarks }))
}

async fn enrich(
    state: &Arc<AppState>,
    entries: &[RecordingEntry],
    principal_id: Option<&str>,
) -> Vec<EnrichedEntry> {
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let id = encode_entry_id(&entry.service_ref);
        let resume_seconds = match (principal_id, &id) {
            (Some(principal_id), Some(id)) => state
                .resume_store
                .get(principal_id, id)
                .await
                .map(|r| r.position_seconds),
            _ => None,
        };
        out.push(EnrichedEntry {
            id: id.unwrap_or_default(),
            name: entry.name.clone(),
            size_bytes: entry.size_bytes,
            resume_seconds,
        });
    }
    out
}

fn encode_entry_id(raw_ref: &str) -> Option<String> {
    let service_ref: ServiceRef = id_codec::validate_ref(raw_ref).ok()?;
    Some(id_codec::encode_id(&service_ref))
}
