//! `DELETE /recordings/{id}`: deletes via the receiver collaborator and
//! cancels/evicts any local cache artifacts for the same key.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::error::AppError;
use crate::id_codec;

use super::state::AppState;

pub async fn delete_recording(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let service_ref =
        id_codec::decode_id(&id).ok_or_else(|| AppError::InvalidInput("invalid recording id".into()))?;

    let mp4_key = format!("mp4:{}", id_codec::mp4_cache_key(&service_ref));
    let hls_key = id_codec::cache_key(&service_ref);
    state.manager.cancel(&mp4_key);
    state.manager.cancel(&hls_key);

    state.recording_source.delete(&service_ref).await?;

    let mp4_path = id_codec::mp4_cache_path(&state.config.mp4_cache_dir(), &service_ref);
    if mp4_path.exists() {
        let _ = crate::cache::eviction::remove_artifact(&mp4_path);
    }
    let hls_dir = id_codec::hls_cache_dir(&state.config.hls_recordings_dir(), &service_ref);
    if hls_dir.exists() {
        let _ = crate::cache::eviction::remove_artifact(&hls_dir);
    }

    Ok(StatusCode::NO_CONTENT)
}
