//! Argument Builder (C4): renders argument vectors for the three build
//! strategies. Grounded in the teacher's `engine/ffmpeg_args/builder.rs`
//! (token-vector construction keyed off a preset) and in the pack's
//! `streaming_handlers.rs`/`ffmpeg_wrapper.rs` codec-arg conventions
//! (`-movflags +faststart`, `frag_keyframe+empty_moov+default_base_moof`,
//! `-avoid_negative_ts make_zero`).

use std::path::Path;

use crate::decision::Strategy;

/// Output container the Argument Builder targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Mp4,
    Hls,
}

/// HLS fragment length in seconds, used both for `-hls_time` and to derive
/// the fixed keyint for TRANSCODE-to-HLS.
const HLS_SEGMENT_SECONDS: u32 = 6;
const HLS_ASSUMED_FPS: u32 = 25;

#[derive(Debug, Clone, Default)]
pub struct BuildArgsInput<'a> {
    pub input_path: &'a Path,
    pub output_path: &'a Path,
    pub start_time_seconds: f64,
    /// `audio_start - video_start`, used to derive `asetpts` delay compensation.
    pub audio_video_start_skew_seconds: f64,
}

fn robust_input_preamble(args: &mut Vec<String>, input: &BuildArgsInput) {
    args.push("-fflags".into());
    args.push("+genpts+discardcorrupt+igndts".into());
    args.push("-err_detect".into());
    args.push("ignore_err".into());
    if input.start_time_seconds > 0.0 {
        args.push("-ss".into());
        args.push(format!("{:.3}", input.start_time_seconds));
    }
    args.push("-i".into());
    args.push(input.input_path.display().to_string());
    args.push("-map".into());
    args.push("0:v:0".into());
    args.push("-map".into());
    args.push("0:a:0".into());
    args.push("-sn".into());
    args.push("-dn".into());
}

fn audio_common(args: &mut Vec<String>, input: &BuildArgsInput) {
    args.push("-c:a".into());
    args.push("aac".into());
    args.push("-b:a".into());
    args.push("192k".into());
    args.push("-ac".into());
    args.push("2".into());
    args.push("-ar".into());
    args.push("48000".into());
    if input.audio_video_start_skew_seconds.abs() > 1e-6 {
        args.push("-af".into());
        args.push(format!(
            "asetpts=PTS-{}/TB",
            input.audio_video_start_skew_seconds
        ));
    }
}

fn faststart_or_fragmented(args: &mut Vec<String>, output_kind: OutputKind) {
    match output_kind {
        OutputKind::Mp4 => {
            args.push("-movflags".into());
            args.push("+faststart".into());
        }
        OutputKind::Hls => {
            args.push("-movflags".into());
            args.push("frag_keyframe+empty_moov+default_base_moof".into());
        }
    }
}

/// DEFAULT strategy (§4.4): copy video, re-encode audio, keyframe-aligned
/// start cut, faststart MP4.
pub fn build_default_args(input: &BuildArgsInput) -> Vec<String> {
    let mut args = Vec::new();
    robust_input_preamble(&mut args, input);
    args.push("-avoid_negative_ts".into());
    args.push("make_zero".into());
    args.push("-c:v".into());
    args.push("copy".into());
    audio_common(&mut args, input);
    faststart_or_fragmented(&mut args, OutputKind::Mp4);
    args.push(input.output_path.display().to_string());
    args
}

/// FALLBACK strategy (§4.4): DEFAULT plus timestamp repair flags, used after
/// a run classified as `NonMonotonousDTS` or `TimestampUnset`.
pub fn build_fallback_args(input: &BuildArgsInput) -> Vec<String> {
    let mut args = Vec::new();
    robust_input_preamble(&mut args, input);
    args.push("-avoid_negative_ts".into());
    args.push("make_zero".into());
    args.push("-c:v".into());
    args.push("copy".into());
    args.push("-vsync".into());
    args.push("cfr".into());
    args.push("-max_interleave_delta".into());
    args.push("0".into());
    audio_common(&mut args, input);
    faststart_or_fragmented(&mut args, OutputKind::Mp4);
    args.push(input.output_path.display().to_string());
    args
}

/// TRANSCODE strategy (§4.4): H.264 CRF-23 medium preset, `yuv420p`, same
/// audio policy as DEFAULT. `output_kind` selects MP4 (direct) vs HLS
/// (fragmented, fmp4 segments) muxing.
pub fn build_transcode_args(input: &BuildArgsInput, output_kind: OutputKind) -> Vec<String> {
    let mut args = Vec::new();
    robust_input_preamble(&mut args, input);
    args.push("-avoid_negative_ts".into());
    args.push("make_zero".into());
    args.push("-c:v".into());
    args.push("libx264".into());
    args.push("-preset".into());
    args.push("medium".into());
    args.push("-crf".into());
    args.push("23".into());
    args.push("-pix_fmt".into());
    args.push("yuv420p".into());
    if output_kind == OutputKind::Hls {
        let keyint = HLS_SEGMENT_SECONDS * HLS_ASSUMED_FPS;
        args.push("-g".into());
        args.push(keyint.to_string());
        args.push("-keyint_min".into());
        args.push(keyint.to_string());
        args.push("-sc_threshold".into());
        args.push("0".into());
    }
    audio_common(&mut args, input);

    match output_kind {
        OutputKind::Mp4 => {
            faststart_or_fragmented(&mut args, OutputKind::Mp4);
            args.push(input.output_path.display().to_string());
        }
        OutputKind::Hls => {
            args.push("-f".into());
            args.push("hls".into());
            args.push("-hls_time".into());
            args.push(HLS_SEGMENT_SECONDS.to_string());
            args.push("-hls_list_size".into());
            args.push("0".into());
            args.push("-hls_segment_type".into());
            args.push("fmp4".into());
            args.push("-hls_flags".into());
            args.push("append_list+temp_file".into());
            let dir = input.output_path.parent().unwrap_or_else(|| Path::new("."));
            args.push("-hls_fmp4_init_filename".into());
            args.push("init.mp4".into());
            args.push("-hls_segment_filename".into());
            args.push(dir.join("seg_%05d.m4s").display().to_string());
            args.push(input.output_path.display().to_string());
        }
    }
    args
}

/// Dispatches on a `RemuxDecision`'s strategy. Callers pass the strategy
/// produced by the Decision Engine (or the retry strategy from §7's recovery
/// policy); `Strategy::Unsupported` has no argument vector by invariant.
pub fn build_args(
    strategy: Strategy,
    input: &BuildArgsInput,
    output_kind: OutputKind,
) -> Option<Vec<String>> {
    match strategy {
        Strategy::Default => Some(build_default_args(input)),
        Strategy::Fallback => Some(build_fallback_args(input)),
        Strategy::Transcode => Some(build_transcode_args(input, output_kind)),
        Strategy::Unsupported => None,
    }
}

fn contains_token_pair(args: &[String], a: &str, b: &str) -> bool {
    args.windows(2).any(|w| w[0] == a && w[1] == b)
}

/// Property 10 of §8: DEFAULT strategy args contain these exact token pairs.
pub fn default_args_satisfy_property_10(args: &[String]) -> bool {
    contains_token_pair(args, "-c:v", "copy")
        && contains_token_pair(args, "-c:a", "aac")
        && contains_token_pair(args, "-movflags", "+faststart")
        && args.iter().any(|a| a == "-sn")
        && args.iter().any(|a| a == "-dn")
}
