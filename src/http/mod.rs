//! HTTP Handlers (C10): the playback-facing axum surface. Grounded in the
//! pack's axum streaming handlers (range-header parsing and response
//! assembly) and `152f433d_miquels-hls-server`'s liveness endpoint
//! convention for `/healthz`.

pub mod delete;
pub mod list;
pub mod playback;
pub mod state;

use axum::routing::{delete as http_delete, get};
use axum::{Json, Router};
use serde::Serialize;

pub use state::AppState;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    metrics: crate::metrics::MetricsSnapshot,
}

async fn healthz(
    axum::extract::State(state): axum::extract::State<std::sync::Arc<AppState>>,
) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        metrics: state.metrics.snapshot(),
    })
}

pub fn router(state: std::sync::Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/recordings", get(list::list_recordings))
        .route("/recordings/:id/playback", get(playback::get_playback))
        .route("/recordings/:id/stream.mp4", get(playback::stream_mp4))
        .route(
            "/recordings/:id/playlist.m3u8",
            get(playback::get_playlist).head(playback::get_playlist),
        )
        .route(
            "/recordings/:id/timeshift.m3u8",
            get(playback::get_timeshift).head(playback::get_timeshift),
        )
        .route(
            "/recordings/:id/status",
            get(playback::get_status),
        )
        .route(
            "/recordings/:id/:segment",
            get(playback::get_segment).head(playback::get_segment),
        )
        .route("/recordings/:id", http_delete(delete::delete_recording))
        .with_state(state)
}
