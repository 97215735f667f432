//! Atomic publish (§4.8/§6): build-to-tmp-then-rename for both cache
//! namespaces, plus HLS live-to-VOD/EVENT playlist finalization.
//!
//! Grounded in the teacher's tendency to never let a partially-written
//! output become visible under its final name (`data_root/resolve.rs`'s
//! confinement plus the engine's tmp-output convention); the rename step
//! itself is the same `std::fs::rename` atomic-on-same-filesystem idiom.

use std::path::Path;

use super::playlist::{self, PlaylistKind};
use super::{err_log_path, lock_path, meta_path, tmp_path};

/// Publishes a flat MP4 artifact: the caller has already written the final
/// bytes to `tmp_path(artifact)`; this renames it into place and removes the
/// lock file. Leaves `.meta.json` (if the caller wrote one) untouched.
pub fn publish_mp4(artifact: &Path) -> std::io::Result<()> {
    std::fs::rename(tmp_path(artifact), artifact)?;
    let lock = lock_path(artifact);
    if lock.exists() {
        std::fs::remove_file(lock)?;
    }
    Ok(())
}

/// Publishes an HLS recording directory: reads the live playlist, rewrites
/// it to the VOD form, writes it to a tmp file and renames it over
/// `index.m3u8`, then deletes the live playlist.
pub fn publish_hls_vod(dir: &Path, live_name: &str, final_name: &str) -> std::io::Result<()> {
    finalize_and_publish(dir, live_name, final_name, PlaylistKind::Vod)
}

/// As [`publish_hls_vod`] but produces the EVENT variant (used while the
/// recording is still growing, serving `timeshift.m3u8`).
pub fn publish_hls_event(dir: &Path, live_name: &str, final_name: &str) -> std::io::Result<()> {
    finalize_and_publish(dir, live_name, final_name, PlaylistKind::Event)
}

fn finalize_and_publish(
    dir: &Path,
    live_name: &str,
    final_name: &str,
    kind: PlaylistKind,
) -> std::io::Result<()> {
    let live_path = dir.join(live_name);
    let final_path = dir.join(final_name);
    let source = std::fs::read_to_string(&live_path)?;
    let rewritten = playlist::finalize(&source, kind);

    let tmp = tmp_path(&final_path);
    std::fs::write(&tmp, &rewritten)?;
    std::fs::rename(&tmp, &final_path)?;

    if kind == PlaylistKind::Vod && live_path.exists() {
        std::fs::remove_file(&live_path)?;
    }
    Ok(())
}

/// Writes `.err.log` on a failed build: strategy, classified kind, and a
/// stderr tail capped to 2048 bytes per §7.
pub fn write_err_log(
    artifact: &Path,
    strategy: &str,
    kind: crate::error::BuildFailureKind,
    stderr_tail: &str,
) -> std::io::Result<()> {
    let capped = crate::supervisor::classify::truncate_tail(stderr_tail, 2048);
    let body = format!("strategy={strategy}\nkind={kind}\n---\n{capped}\n");
    std::fs::write(err_log_path(artifact), body)
}

/// Writes `.meta.json` on a successful build (strategy, video/audio codec
/// and pixfmt, bit depth, track count, timestamp).
pub fn write_meta_json(artifact: &Path, meta: &BuildMeta) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(meta).map_err(std::io::Error::other)?;
    std::fs::write(meta_path(artifact), json)
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BuildMeta {
    pub strategy: String,
    pub video_codec: String,
    pub pix_fmt: Option<String>,
    pub bit_depth: u8,
    pub audio_track_count: usize,
    pub built_at_unix_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_mp4_renames_tmp_into_place_and_clears_lock() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("abc.mp4");
        std::fs::write(tmp_path(&artifact), b"payload").unwrap();
        std::fs::write(lock_path(&artifact), b"").unwrap();

        publish_mp4(&artifact).unwrap();

        assert!(artifact.exists());
        assert!(!tmp_path(&artifact).exists());
        assert!(!lock_path(&artifact).exists());
        assert_eq!(std::fs::read(&artifact).unwrap(), b"payload");
    }

    #[test]
    fn publish_hls_vod_finalizes_playlist_and_removes_live_copy() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("index.live.m3u8"),
            "#EXTM3U\n#EXT-X-DISCONTINUITY\n#EXTINF:6.0,\nseg_00000.m4s\n",
        )
        .unwrap();

        publish_hls_vod(dir.path(), "index.live.m3u8", "index.m3u8").unwrap();

        let final_contents = std::fs::read_to_string(dir.path().join("index.m3u8")).unwrap();
        assert!(final_contents.contains("#EXT-X-PLAYLIST-TYPE:VOD"));
        assert!(final_contents.contains("#EXT-X-ENDLIST"));
        assert!(!dir.path().join("index.live.m3u8").exists());
    }

    #[test]
    fn write_err_log_includes_strategy_and_kind() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("abc.mp4");
        write_err_log(
            &artifact,
            "default",
            crate::error::BuildFailureKind::Stalled,
            "line one\nline two",
        )
        .unwrap();
        let contents = std::fs::read_to_string(err_log_path(&artifact)).unwrap();
        assert!(contents.contains("strategy=default"));
        assert!(contents.contains("kind=Stalled"));
        assert!(contents.contains("line two"));
    }
}
