//! Playback-facing handlers: `/playback`, `/stream.mp4`, the HLS playlists,
//! segments, and `/status`. Range/seek serving for the direct-MP4 path is
//! delegated to `tower_http::services::ServeFile`, the crate's
//! stdlib-content-serving-primitive equivalent named in §4.10.

use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::args::OutputKind;
use crate::build::BuildContext;
use crate::error::AppError;
use crate::id_codec::{self, ServiceRef};
use crate::manager::{self, BuildState};
use crate::planner::{self, PlaybackInfo};
use crate::preflight;
use crate::source;

use super::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct TokenQuery {
    pub token: Option<String>,
}

fn decode_recording_id(id: &str) -> Result<ServiceRef, AppError> {
    id_codec::decode_id(id).ok_or_else(|| AppError::InvalidInput("invalid recording id".into()))
}

pub async fn get_playback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<PlaybackInfo>, AppError> {
    let service_ref = decode_recording_id(&id)?;
    let local_path = FsPath::new(service_ref.file_path());
    let resolution =
        planner::resolve_local(local_path).map_err(|e| AppError::Internal(e.to_string()))?;
    let stable_window = Duration::from_secs_f64(state.config.recording_stable_window_secs);
    let info = planner::plan(
        &id,
        resolution,
        SystemTime::now(),
        stable_window,
        None,
        query.token.as_deref(),
    );
    Ok(Json(info))
}

pub async fn stream_mp4(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Response, AppError> {
    let service_ref = decode_recording_id(&id)?;
    let mp4_path = id_codec::mp4_cache_path(&state.config.mp4_cache_dir(), &service_ref);

    if mp4_path.exists() {
        let _ = crate::cache::touch(&mp4_path);
        state.metrics.cache_hit();
        return serve_file(&mp4_path, request).await;
    }
    state.metrics.cache_miss();

    let key = format!("mp4:{}", id_codec::mp4_cache_key(&service_ref));
    let run = ensure_mp4_build(&state, &service_ref, &mp4_path, key).await?;

    match run.status().state {
        BuildState::Ready if mp4_path.exists() => serve_file(&mp4_path, request).await,
        BuildState::Failed => Err(AppError::Internal("build failed, see .err.log".into())),
        _ => Err(AppError::NotReady),
    }
}

/// Resolves a service ref to an input path for the build pipeline,
/// preflighting and credentialing receiver URLs. The credentialed URL is
/// handed straight to ffmpeg as its `-i` argument and never logged; only
/// [`source::redact`]ed forms reach `tracing`.
async fn resolve_input(state: &Arc<AppState>, service_ref: &ServiceRef) -> Result<std::path::PathBuf, AppError> {
    let resolved = source::resolve(service_ref, &state.config.owi_base, state.config.stream_port)?;
    match resolved.location {
        source::SourceLocation::LocalPath(p) => Ok(p),
        source::SourceLocation::ReceiverUrl(url) => {
            preflight::check(&state.http_client, &url).await?;
            let credentialed = source::with_credentials(
                &url,
                state.config.owi_user.as_deref(),
                state.config.owi_pass.as_deref(),
            );
            tracing::debug!(url = %source::redact(&credentialed), "resolved receiver source");
            Ok(FsPath::new(credentialed.as_str()).to_path_buf())
        }
    }
}

async fn ensure_mp4_build(
    state: &Arc<AppState>,
    service_ref: &ServiceRef,
    mp4_path: &FsPath,
    key: String,
) -> Result<Arc<manager::BuildRun>, AppError> {
    let input_path = resolve_input(state, service_ref).await?;

    let ctx = BuildContext {
        ffmpeg_path: state.config.ffmpeg_path.clone(),
        ffprobe_path: state.config.ffprobe_path.clone(),
        input_path,
        output_path: mp4_path.to_path_buf(),
        output_kind: OutputKind::Mp4,
        startup_grace: Duration::from_secs(state.config.startup_grace_secs),
        stall_timeout: state.config.clamped_stall_timeout(),
        metrics: state.metrics.clone(),
        probe_size: state.config.vod_probe_size,
        analyze_duration_us: state.config.vod_analyze_duration_us,
    };

    let manager = state.manager.clone();
    let (run, _is_new) = manager.ensure(key, move |run| crate::build::build_artifact(run, ctx))?;
    Ok(run)
}

pub async fn get_playlist(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let service_ref = decode_recording_id(&id)?;
    let dir = id_codec::hls_cache_dir(&state.config.hls_recordings_dir(), &service_ref);
    let vod_playlist = dir.join("index.m3u8");
    if vod_playlist.exists() {
        return serve_playlist(&vod_playlist);
    }
    let run = ensure_hls_build(&state, &service_ref, &dir).await?;
    match run.status().state {
        BuildState::Failed => Err(AppError::Internal("build failed, see .err.log".into())),
        _ if vod_playlist.exists() => serve_playlist(&vod_playlist),
        _ => serve_playlist(&dir.join("index.live.m3u8")),
    }
}

pub async fn get_timeshift(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let service_ref = decode_recording_id(&id)?;
    let dir = id_codec::hls_cache_dir(&state.config.hls_recordings_dir(), &service_ref);
    let live_playlist = dir.join("index.live.m3u8");
    if !live_playlist.exists() {
        let run = ensure_hls_build(&state, &service_ref, &dir).await?;
        if run.status().state == BuildState::Failed {
            return Err(AppError::Internal("build failed, see .err.log".into()));
        }
    }
    if !live_playlist.exists() {
        return Err(AppError::NotReady);
    }
    crate::cache::publish::publish_hls_event(&dir, "index.live.m3u8", "timeshift.m3u8")
        .map_err(|e| AppError::Internal(e.to_string()))?;
    serve_playlist(&dir.join("timeshift.m3u8"))
}

async fn ensure_hls_build(
    state: &Arc<AppState>,
    service_ref: &ServiceRef,
    dir: &FsPath,
) -> Result<Arc<manager::BuildRun>, AppError> {
    let input_path = resolve_input(state, service_ref).await?;

    let ctx = BuildContext {
        ffmpeg_path: state.config.ffmpeg_path.clone(),
        ffprobe_path: state.config.ffprobe_path.clone(),
        input_path,
        output_path: dir.join("index.live.m3u8"),
        output_kind: OutputKind::Hls,
        startup_grace: Duration::from_secs(state.config.startup_grace_secs),
        stall_timeout: state.config.clamped_stall_timeout(),
        metrics: state.metrics.clone(),
        probe_size: state.config.vod_probe_size,
        analyze_duration_us: state.config.vod_analyze_duration_us,
    };

    let key = id_codec::cache_key(service_ref);
    let manager = state.manager.clone();
    let (run, _is_new) = manager.ensure(key, move |run| crate::build::build_artifact(run, ctx))?;
    Ok(run)
}

fn serve_playlist(path: &FsPath) -> Result<Response, AppError> {
    let body = std::fs::read_to_string(path).map_err(|_| AppError::NotReady)?;
    let mut response = body.into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/vnd.apple.mpegurl"),
    );
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}

pub async fn get_segment(
    State(state): State<Arc<AppState>>,
    Path((id, segment)): Path<(String, String)>,
) -> Result<Response, AppError> {
    if !id_codec::is_allowed_segment_name(&segment) {
        return Err(AppError::NotFound("segment not found".into()));
    }
    let service_ref = decode_recording_id(&id)?;
    let dir = id_codec::hls_cache_dir(&state.config.hls_recordings_dir(), &service_ref);
    let path = id_codec::confine(&dir, &segment)?;

    let bytes = std::fs::read(&path).map_err(|_| AppError::NotFound("segment not found".into()))?;
    let content_type = segment_content_type(&segment);

    let mut response = bytes.into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response.headers_mut().insert(
        header::CONTENT_ENCODING,
        HeaderValue::from_static("identity"),
    );
    Ok(response)
}

fn segment_content_type(name: &str) -> &'static str {
    if name.ends_with(".ts") {
        "video/MP2T"
    } else {
        // init.mp4 and .m4s segments both serve as video/mp4 (Safari requirement).
        "video/mp4"
    }
}

#[derive(serde::Serialize)]
struct StatusBody {
    state: BuildState,
    progressive_ready: bool,
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusBody>, AppError> {
    let service_ref = decode_recording_id(&id)?;
    let mp4_key = format!("mp4:{}", id_codec::mp4_cache_key(&service_ref));
    let hls_key = id_codec::cache_key(&service_ref);

    if let Some(run) = state.manager.get(&mp4_key).or_else(|| state.manager.get(&hls_key)) {
        let status = run.status();
        return Ok(Json(StatusBody {
            state: status.state,
            progressive_ready: status.progressive_ready,
        }));
    }

    let mp4_path = id_codec::mp4_cache_path(&state.config.mp4_cache_dir(), &service_ref);
    let hls_dir = id_codec::hls_cache_dir(&state.config.hls_recordings_dir(), &service_ref);
    let ready = mp4_path.exists() || hls_dir.join("index.m3u8").exists();

    Ok(Json(StatusBody {
        state: if ready { BuildState::Ready } else { BuildState::Idle },
        progressive_ready: ready,
    }))
}

async fn serve_file(path: &FsPath, request: Request) -> Result<Response, AppError> {
    let service = ServeFile::new(path);
    let response = service
        .oneshot(request)
        .await
        .unwrap_or_else(|err| match err {});
    Ok(response.map(axum::body::Body::new))
}

