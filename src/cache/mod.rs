//! Cache Store (C8): atomic publish, startup cleanup, LRU touch, TTL and
//! disk-pressure eviction for both cache namespaces (HLS recording
//! directories and flat MP4 artifacts).
//!
//! Grounded in the teacher's `engine/preview_cache_gc.rs` (mtime-age sweep
//! over a flat cache directory) generalized to two namespaces and a
//! disk-pressure pass, using `fs2`/`filetime` the way the pack's homeflix
//! example does for space accounting and touch semantics.

pub mod eviction;
pub mod playlist;
pub mod publish;

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bumping this invalidates every artifact built under the old value: new
/// builds land at a new cache key, old ones are reclaimed by eviction.
pub const VOD_CACHE_VERSION: u32 = 1;

pub const LOCK_SUFFIX: &str = ".lock";
pub const TMP_SUFFIX: &str = ".tmp";
pub const ERR_LOG_SUFFIX: &str = ".err.log";
pub const META_SUFFIX: &str = ".meta.json";

/// Age above which an orphaned `.tmp` file is considered abandoned rather
/// than mid-publish, per §4.8's startup cleanup rule.
pub const STALE_TMP_AGE: Duration = Duration::from_secs(3600);

pub fn lock_path(artifact: &Path) -> PathBuf {
    with_suffix(artifact, LOCK_SUFFIX)
}

pub fn tmp_path(artifact: &Path) -> PathBuf {
    with_suffix(artifact, TMP_SUFFIX)
}

pub fn err_log_path(artifact: &Path) -> PathBuf {
    with_suffix(artifact, ERR_LOG_SUFFIX)
}

pub fn meta_path(artifact: &Path) -> PathBuf {
    with_suffix(artifact, META_SUFFIX)
}

fn with_suffix(artifact: &Path, suffix: &str) -> PathBuf {
    let mut s = artifact.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Startup cleanup (§4.8): remove every `*.lock` unconditionally (no build
/// can legitimately hold one across a restart) and every `*.tmp` older than
/// [`STALE_TMP_AGE`]. Walks both cache roots; best-effort, logs and
/// continues past per-file errors.
pub fn startup_cleanup(roots: &[&Path]) {
    for root in roots {
        if !root.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(Result::ok) {
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            let name = path.to_string_lossy();
            if name.ends_with(LOCK_SUFFIX) {
                if let Err(e) = std::fs::remove_file(path) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove stale lock file");
                }
            } else if name.ends_with(TMP_SUFFIX) {
                let age = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .and_then(|m| m.elapsed().ok());
                if age.map(|a| a > STALE_TMP_AGE).unwrap_or(false) {
                    if let Err(e) = std::fs::remove_file(path) {
                        tracing::warn!(path = %path.display(), error = %e, "failed to remove stale tmp file");
                    }
                }
            }
        }
    }
}

/// Marks the artifact as recently used by bumping its mtime to now, per the
/// LRU-touch rule. Used on every cache hit.
pub fn touch(artifact: &Path) -> std::io::Result<()> {
    let now = filetime::FileTime::now();
    filetime::set_file_mtime(artifact, now)
}
