//! Probe (C2): invokes the external probe tool and parses its JSON output
//! into a `StreamInfo` record. Grounded in the teacher's
//! `ffprobe_format_duration_seconds` (`Command`-building + `with_context`
//! error style), generalized from duration-only to the full record §3 names.

use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamInfo {
    pub codec: String,
    pub pix_fmt: Option<String>,
    pub profile: Option<String>,
    pub level: Option<i64>,
    pub bit_depth: u8,
    pub start_time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioStreamInfo {
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub layout: Option<String>,
    pub track_count: u32,
    pub start_time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub video: VideoStreamInfo,
    pub audio: Option<AudioStreamInfo>,
}

/// Derives bit depth from an ffprobe `pix_fmt` string per §3/§8 property 3:
/// any substring `p10` → 10, `p12` → 12, `p16` → 16, else 8.
pub fn infer_bit_depth(pix_fmt: &str) -> u8 {
    if pix_fmt.contains("p10") {
        10
    } else if pix_fmt.contains("p12") {
        12
    } else if pix_fmt.contains("p16") {
        16
    } else {
        8
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    pix_fmt: Option<String>,
    profile: Option<String>,
    level: Option<i64>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    channel_layout: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
}

/// Probes `path` with the configured `ffprobe` binary and parses exactly one
/// video stream, the first audio stream, and the total audio-track count.
///
/// `probe_size`/`analyze_duration_us`, when given, are passed through as
/// `-probesize`/`-analyzeduration`; the §7 recovery policy retries a failed
/// probe once with larger values than ffprobe's own defaults.
pub fn probe(
    ffprobe_path: &Path,
    path: &Path,
    probe_size: Option<u64>,
    analyze_duration_us: Option<u64>,
) -> Result<StreamInfo, AppError> {
    let mut cmd = Command::new(ffprobe_path);
    cmd.arg("-v")
        .arg("quiet")
        .arg("-print_format")
        .arg("json")
        .arg("-show_streams");
    if let Some(size) = probe_size {
        cmd.arg("-probesize").arg(size.to_string());
    }
    if let Some(us) = analyze_duration_us {
        cmd.arg("-analyzeduration").arg(us.to_string());
    }
    let output = cmd
        .arg(path.as_os_str())
        .output()
        .map_err(|e| AppError::Internal(format!("failed to spawn ffprobe: {e}")))?;

    if !output.status.success() {
        let tail = tail_bytes(&output.stderr, 2048);
        return Err(AppError::Internal(format!(
            "ProbeFailed: ffprobe exited non-zero for {}: {}",
            path.display(),
            String::from_utf8_lossy(&tail)
        )));
    }

    let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| AppError::Internal(format!("ProbeFailed: invalid ffprobe JSON: {e}")))?;

    parse_stream_info(parsed)
}

fn parse_stream_info(parsed: FfprobeOutput) -> Result<StreamInfo, AppError> {
    let video_raw = parsed
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| AppError::Internal("ProbeFailed: no video stream".to_string()))?;

    let pix_fmt = video_raw.pix_fmt.clone();
    let bit_depth = pix_fmt.as_deref().map(infer_bit_depth).unwrap_or(8);
    let video = VideoStreamInfo {
        codec: video_raw
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        pix_fmt,
        profile: video_raw.profile.clone(),
        level: video_raw.level,
        bit_depth,
        start_time: parse_start_time(video_raw.start_time.as_deref()),
    };

    let audio_streams: Vec<&FfprobeStream> = parsed
        .streams
        .iter()
        .filter(|s| s.codec_type == "audio")
        .collect();

    let audio = audio_streams.first().map(|a| AudioStreamInfo {
        codec: a.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
        sample_rate: a.sample_rate.as_deref().and_then(|s| s.parse().ok()),
        channels: a.channels,
        layout: a.channel_layout.clone(),
        track_count: audio_streams.len() as u32,
        start_time: parse_start_time(a.start_time.as_deref()),
    });

    Ok(StreamInfo { video, audio })
}

fn parse_start_time(raw: Option<&str>) -> f64 {
    raw.and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn tail_bytes(buf: &[u8], max: usize) -> Vec<u8> {
    if buf.len() <= max {
        buf.to_vec()
    } else {
        buf[buf.len() - max..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_depth_inference_matches_property_3() {
        assert_eq!(infer_bit_depth("yuv420p10le"), 10);
        assert_eq!(infer_bit_depth("yuv420p10be"), 10);
        assert_eq!(infer_bit_depth("yuv420p12le"), 12);
        assert_eq!(infer_bit_depth("yuv420p16le"), 16);
        assert_eq!(infer_bit_depth("yuv420p"), 8);
        assert_eq!(infer_bit_depth("nv12"), 8);
    }

    #[test]
    fn parse_stream_info_picks_first_video_and_audio() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "pix_fmt": "yuv420p", "start_time": "0.000000"},
                {"codec_type": "audio", "codec_name": "ac3", "sample_rate": "48000", "channels": 6, "channel_layout": "5.1", "start_time": "0.023000"},
                {"codec_type": "audio", "codec_name": "aac", "sample_rate": "48000", "channels": 2, "start_time": "0.023000"},
                {"codec_type": "subtitle", "codec_name": "dvb_subtitle"}
            ]
        }"#;
        let parsed: FfprobeOutput = serde_json::from_str(json).unwrap();
        let info = parse_stream_info(parsed).unwrap();
        assert_eq!(info.video.codec, "h264");
        assert_eq!(info.video.bit_depth, 8);
        let audio = info.audio.unwrap();
        assert_eq!(audio.codec, "ac3");
        assert_eq!(audio.track_count, 2);
    }

    #[test]
    fn parse_stream_info_errors_without_video_stream() {
        let json = r#"{"streams": [{"codec_type": "audio", "codec_name": "aac"}]}"#;
        let parsed: FfprobeOutput = serde_json::from_str(json).unwrap();
        assert!(parse_stream_info(parsed).is_err());
    }
}
