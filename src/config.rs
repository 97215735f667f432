use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Which source the Playback Planner is allowed to serve from (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPolicy {
    Auto,
    LocalOnly,
    ReceiverOnly,
}

impl Default for PlaybackPolicy {
    fn default() -> Self {
        PlaybackPolicy::Auto
    }
}

/// The `Config` snapshot named as an external collaborator in §6.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    pub hls_root: PathBuf,
    pub data_dir: PathBuf,
    pub owi_base: String,
    pub stream_port: u16,
    #[serde(default)]
    pub owi_user: Option<String>,
    #[serde(default)]
    pub owi_pass: Option<String>,

    #[serde(default = "default_vod_max_concurrent")]
    pub vod_max_concurrent: usize,
    #[serde(default = "default_vod_cache_ttl_secs")]
    pub vod_cache_ttl_secs: u64,
    #[serde(default = "default_recording_stable_window_secs")]
    pub recording_stable_window_secs: f64,
    #[serde(default = "default_probe_size")]
    pub vod_probe_size: u64,
    #[serde(default = "default_analyze_duration_us")]
    pub vod_analyze_duration_us: u64,
    #[serde(default)]
    pub playback_policy: PlaybackPolicy,

    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
    #[serde(default = "default_startup_grace_secs")]
    pub startup_grace_secs: u64,

    #[serde(default = "default_disk_pressure_floor_bytes")]
    pub disk_pressure_floor_bytes: u64,
    #[serde(default = "default_disk_pressure_reclaim_bytes")]
    pub disk_pressure_reclaim_bytes: u64,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_vod_max_concurrent() -> usize {
    2
}
fn default_vod_cache_ttl_secs() -> u64 {
    24 * 3600
}
fn default_recording_stable_window_secs() -> f64 {
    2.0
}
fn default_probe_size() -> u64 {
    5_000_000
}
fn default_analyze_duration_us() -> u64 {
    5_000_000
}
fn default_stall_timeout_secs() -> u64 {
    90
}
fn default_startup_grace_secs() -> u64 {
    25
}
fn default_disk_pressure_floor_bytes() -> u64 {
    5 * 1024 * 1024 * 1024
}
fn default_disk_pressure_reclaim_bytes() -> u64 {
    1024 * 1024 * 1024
}
fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}
fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Clamp the configured stall timeout into the documented 30-120s band (§4.6).
    pub fn clamped_stall_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.stall_timeout_secs.clamp(30, 120))
    }

    pub fn mp4_cache_dir(&self) -> PathBuf {
        self.data_dir.join("vod-cache")
    }

    pub fn hls_recordings_dir(&self) -> PathBuf {
        self.hls_root.join("recordings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_missing_fields() {
        let toml_str = r#"
            hls_root = "/var/hls"
            data_dir = "/var/data"
            owi_base = "http://receiver.local"
            stream_port = 8001
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.vod_max_concurrent, 2);
        assert_eq!(cfg.vod_cache_ttl_secs, 24 * 3600);
        assert_eq!(cfg.playback_policy, PlaybackPolicy::Auto);
        assert_eq!(cfg.clamped_stall_timeout().as_secs(), 90);
    }

    #[test]
    fn stall_timeout_is_clamped_into_band() {
        let mut cfg_str = String::from(
            r#"
            hls_root = "/var/hls"
            data_dir = "/var/data"
            owi_base = "http://receiver.local"
            stream_port = 8001
            stall_timeout_secs = 5
        "#,
        );
        let cfg: Config = toml::from_str(&cfg_str).unwrap();
        assert_eq!(cfg.clamped_stall_timeout().as_secs(), 30);

        cfg_str = cfg_str.replace("stall_timeout_secs = 5", "stall_timeout_secs = 999");
        let cfg: Config = toml::from_str(&cfg_str).unwrap();
        assert_eq!(cfg.clamped_stall_timeout().as_secs(), 120);
    }
}
