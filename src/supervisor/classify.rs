//! Exit-time stderr classification (§4.6). Scans stderr against an ordered
//! pattern list; first match wins. Non-fatal noise (PES packet size
//! mismatch, packet corrupt, incomplete frame) is explicitly ignored even on
//! a non-zero exit, matching the teacher's habit of treating known-benign
//! ffmpeg stderr chatter (`job_runner_process_execute.rs`'s stderr pump) as
//! just log lines rather than failure signals.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::BuildFailureKind;

struct Pattern {
    regex: Regex,
    kind: BuildFailureKind,
}

static NON_FATAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)PES packet size mismatch",
        r"(?i)packet corrupt",
        r"(?i)incomplete frame",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static ORDERED_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    let specs: &[(&str, BuildFailureKind)] = &[
        (r"(?i)Non-monotonous DTS", BuildFailureKind::NonMonotonousDts),
        (r"(?i)non-monotonic timestamp", BuildFailureKind::NonMonotonousDts),
        (r"(?i)Invalid duration", BuildFailureKind::InvalidDuration),
        (r"(?i)duration.*(negative|invalid)", BuildFailureKind::InvalidDuration),
        (r"(?i)Timestamps are unset", BuildFailureKind::TimestampUnset),
        (r"(?i)timestamp.*not set", BuildFailureKind::TimestampUnset),
        (r"(?i)codec parameters? not found", BuildFailureKind::ProbeFailed),
        (r"(?i)no streams? found", BuildFailureKind::ProbeFailed),
        (r"(?i)could not find codec parameters", BuildFailureKind::ProbeFailed),
        (r"(?i)error while decoding", BuildFailureKind::ProbeFailed),
        (r"(?i)401 unauthorized", BuildFailureKind::SourceUnavailable),
        (r"(?i)403 forbidden", BuildFailureKind::SourceUnavailable),
        (r"(?i)404 not found", BuildFailureKind::SourceUnavailable),
        (r"(?i)connection refused", BuildFailureKind::SourceUnavailable),
        (r"(?i)no route to host", BuildFailureKind::SourceUnavailable),
    ];
    specs
        .iter()
        .map(|(pattern, kind)| Pattern {
            regex: Regex::new(pattern).expect("valid regex"),
            kind: *kind,
        })
        .collect()
});

/// Classifies a non-zero exit by scanning `stderr_tail` against the ordered
/// pattern list; first match wins. Defaults to `FFmpegFatal` when nothing
/// matches.
pub fn classify_exit(stderr_tail: &str) -> BuildFailureKind {
    for pattern in ORDERED_PATTERNS.iter() {
        if pattern.regex.is_match(stderr_tail) {
            return pattern.kind;
        }
    }
    BuildFailureKind::FfmpegFatal
}

/// Whether a stderr line is known-benign noise that must not influence the
/// outcome even if the process later exits non-zero for an unrelated
/// reason.
pub fn is_non_fatal_noise(line: &str) -> bool {
    NON_FATAL_PATTERNS.iter().any(|re| re.is_match(line))
}

/// Truncates a stderr buffer to at most `max_bytes`, keeping the tail (most
/// recent output), at a char boundary.
pub fn truncate_tail(buf: &str, max_bytes: usize) -> String {
    if buf.len() <= max_bytes {
        return buf.to_string();
    }
    let start = buf.len() - max_bytes;
    let mut boundary = start;
    while boundary < buf.len() && !buf.is_char_boundary(boundary) {
        boundary += 1;
    }
    buf[boundary..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildFailureKind::*;

    #[test]
    fn classifies_non_monotonous_dts() {
        assert_eq!(
            classify_exit("frame= 10\n[mp4 @ 0x0] Application provided invalid, non-monotonous DTS"),
            NonMonotonousDts
        );
    }

    #[test]
    fn classifies_invalid_duration_as_non_retryable() {
        assert_eq!(classify_exit("Invalid duration specified"), InvalidDuration);
    }

    #[test]
    fn classifies_timestamp_unset() {
        assert_eq!(classify_exit("Timestamps are unset in a packet"), TimestampUnset);
    }

    #[test]
    fn classifies_probe_failed() {
        assert_eq!(classify_exit("could not find codec parameters for stream"), ProbeFailed);
    }

    #[test]
    fn classifies_source_unavailable() {
        assert_eq!(classify_exit("HTTP error 404 Not Found"), SourceUnavailable);
        assert_eq!(classify_exit("Connection refused"), SourceUnavailable);
    }

    #[test]
    fn unmatched_stderr_defaults_to_fatal() {
        assert_eq!(classify_exit("segmentation fault (core dumped)"), FfmpegFatal);
    }

    #[test]
    fn first_match_wins_when_multiple_patterns_present() {
        let combined = "Invalid duration\nNon-monotonous DTS";
        assert_eq!(classify_exit(combined), NonMonotonousDts);
    }

    #[test]
    fn non_fatal_noise_is_recognized() {
        assert!(is_non_fatal_noise("[mpegts] PES packet size mismatch"));
        assert!(is_non_fatal_noise("packet corrupt (stream = 0)"));
        assert!(!is_non_fatal_noise("Non-monotonous DTS"));
    }

    #[test]
    fn truncate_tail_keeps_last_bytes_at_char_boundary() {
        let s = "é".repeat(2000);
        let tail = truncate_tail(&s, 2048);
        assert!(tail.len() <= 2048);
        assert!(s.ends_with(&tail));
    }
}
