//! Decision Engine (C3): turns a `StreamInfo` into a `RemuxDecision`.
//!
//! Audio policy is orthogonal to the video rule and always re-encodes to a
//! universal 2-channel 48kHz AAC-LC stream — `default` never selects an
//! audio-copy path. This codifies the intended policy from §9's Open
//! Questions: the source's vestigial audio-copy branch is never reintroduced.

use crate::probe::StreamInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Default,
    Fallback,
    Transcode,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemuxDecision {
    pub strategy: Strategy,
    pub reason: String,
}

/// Evaluates the five ordered rules of §4.3 and returns a decision. Argument
/// vectors are rendered separately by the Argument Builder (C4) once a
/// target output path is known.
pub fn decide(info: &StreamInfo) -> RemuxDecision {
    let codec = info.video.codec.to_ascii_lowercase();
    let audio_note = "audio always re-encoded to AAC-LC 2ch/48kHz";

    if codec == "hevc" || codec == "h265" {
        return RemuxDecision {
            strategy: Strategy::Transcode,
            reason: format!("video codec is HEVC; {audio_note}"),
        };
    }
    if codec == "h264" && info.video.bit_depth >= 10 {
        return RemuxDecision {
            strategy: Strategy::Transcode,
            reason: format!(
                "H.264 {}-bit requires 8-bit normalization; {audio_note}",
                info.video.bit_depth
            ),
        };
    }
    if codec == "mpeg2video" {
        return RemuxDecision {
            strategy: Strategy::Transcode,
            reason: format!("video codec is MPEG-2; {audio_note}"),
        };
    }
    if codec == "h264" && info.video.bit_depth == 8 {
        return RemuxDecision {
            strategy: Strategy::Default,
            reason: format!("H.264 8-bit video can be copied; {audio_note}"),
        };
    }
    RemuxDecision {
        strategy: Strategy::Transcode,
        reason: format!("video codec '{codec}' not eligible for copy; {audio_note}"),
    }
}

/// §7 recovery policy after a classified failure: which strategy the retry
/// attempt should use, if any retry is allowed at all.
pub fn retry_strategy(kind: crate::error::BuildFailureKind) -> Option<Strategy> {
    use crate::error::BuildFailureKind::*;
    match kind {
        ProbeFailed => Some(Strategy::Transcode),
        NonMonotonousDts | TimestampUnset => Some(Strategy::Fallback),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::VideoStreamInfo;

    fn video(codec: &str, bit_depth: u8) -> StreamInfo {
        StreamInfo {
            video: VideoStreamInfo {
                codec: codec.to_string(),
                pix_fmt: None,
                profile: None,
                level: None,
                bit_depth,
                start_time: 0.0,
            },
            audio: None,
        }
    }

    #[test]
    fn hevc_always_transcodes() {
        assert_eq!(decide(&video("hevc", 8)).strategy, Strategy::Transcode);
        assert_eq!(decide(&video("h265", 10)).strategy, Strategy::Transcode);
    }

    #[test]
    fn h264_10bit_transcodes_for_normalization() {
        assert_eq!(decide(&video("h264", 10)).strategy, Strategy::Transcode);
    }

    #[test]
    fn mpeg2_always_transcodes() {
        assert_eq!(decide(&video("mpeg2video", 8)).strategy, Strategy::Transcode);
    }

    #[test]
    fn h264_8bit_copies() {
        let d = decide(&video("h264", 8));
        assert_eq!(d.strategy, Strategy::Default);
        assert!(d.reason.contains("AAC-LC"));
    }

    #[test]
    fn unknown_codec_falls_back_to_transcode() {
        assert_eq!(decide(&video("vp9", 8)).strategy, Strategy::Transcode);
    }

    #[test]
    fn retry_policy_matches_recovery_table() {
        use crate::error::BuildFailureKind::*;
        assert_eq!(retry_strategy(ProbeFailed), Some(Strategy::Transcode));
        assert_eq!(retry_strategy(NonMonotonousDts), Some(Strategy::Fallback));
        assert_eq!(retry_strategy(TimestampUnset), Some(Strategy::Fallback));
        assert_eq!(retry_strategy(InvalidDuration), None);
        assert_eq!(retry_strategy(SourceUnavailable), None);
        assert_eq!(retry_strategy(Stalled), None);
        assert_eq!(retry_strategy(FfmpegFatal), None);
    }
}
