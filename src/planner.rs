//! Playback Planner (C9): decides whether a client should be pointed at a
//! direct MP4 stream or an HLS playlist, and why.

use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    DirectMp4,
    Hls,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaybackInfo {
    pub mode: PlaybackMode,
    pub url: String,
    pub reason: &'static str,
    pub duration_seconds: Option<f64>,
}

/// Whether `path`'s mtime is at least `stable_window` old relative to `now`,
/// i.e. nothing has written to it recently. Pure so the stability judgment
/// is unit-testable without real file timestamps.
pub fn is_stable(mtime: SystemTime, now: SystemTime, stable_window: Duration) -> bool {
    now.duration_since(mtime).map(|age| age >= stable_window).unwrap_or(false)
}

pub enum LocalResolution {
    /// Resolves to a local path, with its last-modified time.
    Resolved { local_path: std::path::PathBuf, mtime: SystemTime },
    /// No local path; must be served from the receiver.
    NotLocal,
}

/// Builds the `PlaybackInfo` per §4.9's three-way branch. `token` is
/// appended as `?token=…` when present, for clients that cannot set
/// headers (a direct `<video>` tag).
pub fn plan(
    recording_id: &str,
    resolution: LocalResolution,
    now: SystemTime,
    stable_window: Duration,
    duration_seconds: Option<f64>,
    token: Option<&str>,
) -> PlaybackInfo {
    let info = match resolution {
        LocalResolution::Resolved { mtime, .. } if is_stable(mtime, now, stable_window) => {
            PlaybackInfo {
                mode: PlaybackMode::DirectMp4,
                url: format!("/api/v3/recordings/{recording_id}/stream.mp4"),
                reason: "local_file_available",
                duration_seconds,
            }
        }
        LocalResolution::Resolved { .. } => PlaybackInfo {
            mode: PlaybackMode::Hls,
            url: format!("/api/v3/recordings/{recording_id}/timeshift.m3u8"),
            reason: "file_growing",
            duration_seconds: None,
        },
        LocalResolution::NotLocal => PlaybackInfo {
            mode: PlaybackMode::Hls,
            url: format!("/api/v3/recordings/{recording_id}/playlist.m3u8"),
            reason: "remote_source",
            duration_seconds,
        },
    };
    inject_token(info, token)
}

fn inject_token(mut info: PlaybackInfo, token: Option<&str>) -> PlaybackInfo {
    if let Some(token) = token {
        let separator = if info.url.contains('?') { '&' } else { '?' };
        info.url = format!("{}{separator}token={token}", info.url);
    }
    info
}

/// Helper for callers that already have a filesystem path: resolves it to a
/// [`LocalResolution`] if the file exists.
pub fn resolve_local(path: &Path) -> std::io::Result<LocalResolution> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(LocalResolution::Resolved {
            local_path: path.to_path_buf(),
            mtime: meta.modified()?,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LocalResolution::NotLocal),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_local_file_plans_direct_mp4() {
        let now = SystemTime::now();
        let mtime = now - Duration::from_secs(10);
        let info = plan(
            "abc",
            LocalResolution::Resolved {
                local_path: "/media/x.ts".into(),
                mtime,
            },
            now,
            Duration::from_secs(2),
            Some(3600.0),
            None,
        );
        assert_eq!(info.mode, PlaybackMode::DirectMp4);
        assert_eq!(info.reason, "local_file_available");
        assert_eq!(info.url, "/api/v3/recordings/abc/stream.mp4");
    }

    #[test]
    fn growing_local_file_plans_hls_timeshift() {
        let now = SystemTime::now();
        let mtime = now - Duration::from_millis(100);
        let info = plan(
            "abc",
            LocalResolution::Resolved {
                local_path: "/media/x.ts".into(),
                mtime,
            },
            now,
            Duration::from_secs(2),
            None,
            None,
        );
        assert_eq!(info.mode, PlaybackMode::Hls);
        assert_eq!(info.reason, "file_growing");
    }

    #[test]
    fn non_local_plans_hls_remote_source() {
        let now = SystemTime::now();
        let info = plan("abc", LocalResolution::NotLocal, now, Duration::from_secs(2), None, None);
        assert_eq!(info.mode, PlaybackMode::Hls);
        assert_eq!(info.reason, "remote_source");
    }

    #[test]
    fn token_is_appended_as_query_param() {
        let now = SystemTime::now();
        let mtime = now - Duration::from_secs(10);
        let info = plan(
            "abc",
            LocalResolution::Resolved {
                local_path: "/media/x.ts".into(),
                mtime,
            },
            now,
            Duration::from_secs(2),
            None,
            Some("tok123"),
        );
        assert_eq!(info.url, "/api/v3/recordings/abc/stream.mp4?token=tok123");
    }
}
