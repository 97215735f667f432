//! Progress Parser (C5): reads `key=value` frames from the build tool's
//! progress stream and emits `Progress` snapshots over a bounded channel.
//!
//! Grounded directly in the teacher's
//! `ffui_core::engine::ffmpeg_args::progress` (`parse_ffmpeg_progress_line`,
//! `is_ffmpeg_progress_end`, `parse_ffmpeg_time_to_seconds`), generalized
//! from time-only parsing to the `out_time_us`/`total_size`/`speed`/`fps`
//! field set §3 names. Lazy, finite, non-restartable: the parser only ever
//! runs forward over one child process's stdout.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::time::{SystemTime, UNIX_EPOCH};

/// One accumulated progress snapshot, emitted at each `progress=` line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub out_time_us: i64,
    pub total_size: i64,
    pub fps: f64,
    pub updated_at_unix_ms: u64,
}

impl Progress {
    /// "Advance" per §3/§5: both fields are monotone non-decreasing from the
    /// previous snapshot, and at least one of them strictly increased.
    pub fn has_advanced(&self, prev: Option<&Progress>) -> bool {
        match prev {
            None => true,
            Some(p) => {
                let monotone =
                    self.out_time_us >= p.out_time_us && self.total_size >= p.total_size;
                let strictly_greater =
                    self.out_time_us > p.out_time_us || self.total_size > p.total_size;
                monotone && strictly_greater
            }
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Accumulates `key=value` tokens between `progress=` boundaries and emits a
/// `Progress` on each boundary. Created once per build, driven by the
/// Build Supervisor's stderr/stdout pump thread.
#[derive(Default)]
pub struct ProgressAccumulator {
    out_time_us: i64,
    total_size: i64,
    speed: Option<String>,
    fps: f64,
}

pub enum LineOutcome {
    /// Not a recognized progress field; caller should treat the line as
    /// ordinary log/stderr output.
    Unrecognized,
    /// A field was accumulated but this wasn't a block boundary yet.
    Accumulated,
    /// `progress=continue` or `progress=end` closed out a block; carries the
    /// resulting snapshot and whether the stream has ended.
    Emit(Progress, bool),
}

impl ProgressAccumulator {
    pub fn feed_line(&mut self, line: &str) -> LineOutcome {
        let Some((key, value)) = line.split_once('=') else {
            return LineOutcome::Unrecognized;
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "out_time_us" => {
                if let Ok(v) = value.parse::<i64>() {
                    self.out_time_us = v;
                }
                LineOutcome::Accumulated
            }
            "total_size" => {
                if let Ok(v) = value.parse::<i64>() {
                    self.total_size = v;
                }
                LineOutcome::Accumulated
            }
            "speed" => {
                self.speed = Some(value.trim_end_matches('x').to_string());
                LineOutcome::Accumulated
            }
            "fps" => {
                if let Ok(v) = value.parse::<f64>() {
                    self.fps = v;
                }
                LineOutcome::Accumulated
            }
            "progress" => {
                let snapshot = Progress {
                    out_time_us: self.out_time_us,
                    total_size: self.total_size,
                    fps: self.fps,
                    updated_at_unix_ms: now_ms(),
                };
                let ended = value.eq_ignore_ascii_case("end");
                LineOutcome::Emit(snapshot, ended)
            }
            _ => LineOutcome::Unrecognized,
        }
    }
}

/// Capacity for the progress channel (§5: bounded, drops on full, never
/// blocks the producer).
pub const PROGRESS_CHANNEL_CAPACITY: usize = 100;

pub fn progress_channel() -> (ProgressSender, Receiver<Progress>) {
    let (tx, rx) = sync_channel(PROGRESS_CHANNEL_CAPACITY);
    (ProgressSender { inner: tx }, rx)
}

/// Wraps `SyncSender` so a full channel silently drops instead of blocking
/// the build supervisor's hot loop.
#[derive(Clone)]
pub struct ProgressSender {
    inner: SyncSender<Progress>,
}

impl ProgressSender {
    pub fn send(&self, progress: Progress) {
        match self.inner.try_send(progress) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!("progress channel full, dropping snapshot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_fields_until_progress_boundary() {
        let mut acc = ProgressAccumulator::default();
        assert!(matches!(
            acc.feed_line("out_time_us=1000000"),
            LineOutcome::Accumulated
        ));
        assert!(matches!(acc.feed_line("total_size=2048"), LineOutcome::Accumulated));
        assert!(matches!(acc.feed_line("fps=25.0"), LineOutcome::Accumulated));
        match acc.feed_line("progress=continue") {
            LineOutcome::Emit(p, ended) => {
                assert_eq!(p.out_time_us, 1_000_000);
                assert_eq!(p.total_size, 2048);
                assert_eq!(p.fps, 25.0);
                assert!(!ended);
            }
            _ => panic!("expected Emit"),
        }
    }

    #[test]
    fn progress_end_is_recognized() {
        let mut acc = ProgressAccumulator::default();
        match acc.feed_line("progress=end") {
            LineOutcome::Emit(_, ended) => assert!(ended),
            _ => panic!("expected Emit"),
        }
    }

    #[test]
    fn unrecognized_lines_pass_through() {
        let mut acc = ProgressAccumulator::default();
        assert!(matches!(
            acc.feed_line("frame=100 fps=25 q=28.0 size=1024kB time=00:00:10.00"),
            LineOutcome::Unrecognized
        ));
    }

    #[test]
    fn has_advanced_requires_strict_increase() {
        let a = Progress {
            out_time_us: 1000,
            total_size: 500,
            fps: 25.0,
            updated_at_unix_ms: 0,
        };
        let b = Progress {
            out_time_us: 1000,
            total_size: 500,
            fps: 25.0,
            updated_at_unix_ms: 1,
        };
        assert!(!b.has_advanced(Some(&a)));

        let c = Progress {
            out_time_us: 1500,
            total_size: 500,
            fps: 25.0,
            updated_at_unix_ms: 2,
        };
        assert!(c.has_advanced(Some(&a)));
    }

    #[test]
    fn channel_drops_on_full_without_blocking() {
        let (tx, rx) = progress_channel();
        for i in 0..(PROGRESS_CHANNEL_CAPACITY + 10) {
            tx.send(Progress {
                out_time_us: i as i64,
                total_size: 0,
                fps: 0.0,
                updated_at_unix_ms: 0,
            });
        }
        // Channel never blocked; at most capacity entries are observable.
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert!(count <= PROGRESS_CHANNEL_CAPACITY);
    }
}
