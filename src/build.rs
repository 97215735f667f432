//! Build pipeline glue: wires Probe (C2), Decision Engine (C3), Argument
//! Builder (C4), Build Supervisor (C6) and Cache Store (C8) together into
//! the single closure the VOD Manager (C7) runs per cache key. Not a
//! numbered component of its own — the orchestration `spec.md` describes in
//! prose for §2's control flow, given a concrete home here the way the
//! teacher's `engine/mod.rs` ties its own sub-modules together.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::args::{self, BuildArgsInput, OutputKind};
use crate::cache::publish::{self, BuildMeta};
use crate::cache::{lock_path, tmp_path};
use crate::decision::{self, Strategy};
use crate::manager::{self, BuildRun};
use crate::metrics::Metrics;
use crate::probe::{self, StreamInfo};
use crate::supervisor::{self, RunParams};

pub struct BuildContext {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub output_kind: OutputKind,
    pub startup_grace: Duration,
    pub stall_timeout: Duration,
    pub metrics: Arc<Metrics>,
    /// Upgraded `-probesize`/`-analyzeduration` values used on a ProbeFailed
    /// retry (§7), sourced from `Config::vod_probe_size`/`vod_analyze_duration_us`.
    pub probe_size: u64,
    pub analyze_duration_us: u64,
}

/// Runs one full build attempt (probe, decide, render args, supervise,
/// retry-once-if-allowed, publish-or-fail) and reports the terminal outcome
/// on `run`. This is the closure body handed to `Manager::ensure`.
pub fn build_artifact(run: Arc<BuildRun>, ctx: BuildContext) {
    ctx.metrics.build_started();
    if let Some(dir) = ctx.output_path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::error!(dir = %dir.display(), error = %e, "failed to create cache directory");
        }
    }
    acquire_lock(&ctx);

    let outcome = run_with_retry(&run, &ctx);

    match outcome {
        Ok(meta) => {
            if let Err(e) = finalize_success(&ctx, meta) {
                tracing::error!(error = %e, "failed to finalize successful build");
                ctx.metrics.build_failed();
                manager::report_outcome(&run, false);
                return;
            }
            ctx.metrics.build_succeeded();
            manager::report_outcome(&run, true);
        }
        Err((strategy, kind, stderr_tail)) => {
            if kind == crate::error::BuildFailureKind::Stalled {
                ctx.metrics.build_stalled();
            }
            let _ = publish::write_err_log(&ctx.output_path, strategy_name(strategy), kind, &stderr_tail);
            cleanup_partial(&ctx);
            ctx.metrics.build_failed();
            manager::report_outcome(&run, false);
        }
    }
}

type BuildError = (Strategy, crate::error::BuildFailureKind, String);

fn run_with_retry(run: &Arc<BuildRun>, ctx: &BuildContext) -> Result<BuildMeta, BuildError> {
    let info = match probe::probe(&ctx.ffprobe_path, &ctx.input_path, None, None) {
        Ok(info) => info,
        Err(_) => return retry_probe_then_transcode(run, ctx),
    };

    let decision = decision::decide(&info);

    match attempt(run, ctx, decision.strategy, &info) {
        Ok(meta) => Ok(meta),
        Err((kind, stderr_tail)) => {
            if !kind.retryable() {
                return Err((decision.strategy, kind, stderr_tail));
            }
            let Some(retry_strategy) = decision::retry_strategy(kind) else {
                return Err((decision.strategy, kind, stderr_tail));
            };
            let retry_info = if kind == crate::error::BuildFailureKind::ProbeFailed {
                reprobe_with_upgraded_params(ctx).unwrap_or_else(|| info.clone())
            } else {
                info.clone()
            };
            attempt(run, ctx, retry_strategy, &retry_info).map_err(|(k, tail)| (retry_strategy, k, tail))
        }
    }
}

/// §7: a ProbeFailed bare probe call (the probe tool itself exited non-zero
/// or produced unparseable output) retries once with upgraded
/// `probesize`/`analyzeduration`, then proceeds straight to TRANSCODE.
fn retry_probe_then_transcode(run: &Arc<BuildRun>, ctx: &BuildContext) -> Result<BuildMeta, BuildError> {
    let info = reprobe_with_upgraded_params(ctx).ok_or((
        Strategy::Unsupported,
        crate::error::BuildFailureKind::ProbeFailed,
        String::new(),
    ))?;
    attempt(run, ctx, Strategy::Transcode, &info).map_err(|(kind, tail)| (Strategy::Transcode, kind, tail))
}

fn reprobe_with_upgraded_params(ctx: &BuildContext) -> Option<StreamInfo> {
    probe::probe(
        &ctx.ffprobe_path,
        &ctx.input_path,
        Some(ctx.probe_size),
        Some(ctx.analyze_duration_us),
    )
    .ok()
}

fn attempt(
    run: &Arc<BuildRun>,
    ctx: &BuildContext,
    strategy: Strategy,
    info: &StreamInfo,
) -> Result<BuildMeta, (crate::error::BuildFailureKind, String)> {
    let skew = info
        .audio
        .as_ref()
        .map(|a| a.start_time - info.video.start_time)
        .unwrap_or(0.0);
    let input = BuildArgsInput {
        input_path: &ctx.input_path,
        output_path: &tmp_path(&ctx.output_path),
        start_time_seconds: info.video.start_time,
        audio_video_start_skew_seconds: skew,
    };

    let Some(arg_vec) = args::build_args(strategy, &input, ctx.output_kind) else {
        return Err((crate::error::BuildFailureKind::FfmpegFatal, String::new()));
    };

    let (tx, rx) = crate::progress::progress_channel();
    let progress_run = run.clone();
    let progress_thread = std::thread::spawn(move || {
        while let Ok(progress) = rx.recv() {
            if progress.out_time_us > 0 || progress.total_size > 0 {
                progress_run.mark_progressive_ready();
            }
        }
    });

    let outcome = supervisor::run(
        RunParams {
            program: &ctx.ffmpeg_path,
            args: &arg_vec,
            startup_grace: ctx.startup_grace,
            stall_timeout: ctx.stall_timeout,
        },
        run.cancel.clone(),
        tx,
    )
    .map_err(|e| (crate::error::BuildFailureKind::FfmpegFatal, e))?;
    let _ = progress_thread.join();

    if outcome.success {
        Ok(BuildMeta {
            strategy: strategy_name(strategy).to_string(),
            video_codec: info.video.codec.clone(),
            pix_fmt: info.video.pix_fmt.clone(),
            bit_depth: info.video.bit_depth,
            audio_track_count: info.audio.as_ref().map(|a| a.track_count as usize).unwrap_or(0),
            built_at_unix_ms: now_ms(),
        })
    } else {
        Err((outcome.failure_kind.unwrap_or(crate::error::BuildFailureKind::FfmpegFatal), outcome.stderr_tail))
    }
}

fn finalize_success(ctx: &BuildContext, meta: BuildMeta) -> std::io::Result<()> {
    match ctx.output_kind {
        OutputKind::Mp4 => {
            publish::publish_mp4(&ctx.output_path)?;
            publish::write_meta_json(&ctx.output_path, &meta)?;
        }
        OutputKind::Hls => {
            let dir = ctx.output_path.parent().unwrap_or_else(|| Path::new("."));
            std::fs::rename(tmp_path(&ctx.output_path), dir.join("index.live.m3u8"))?;
            publish::publish_hls_vod(dir, "index.live.m3u8", "index.m3u8")?;
            publish::write_meta_json(&ctx.output_path, &meta)?;
        }
    }
    let _ = std::fs::remove_file(lock_path(&ctx.output_path));
    Ok(())
}

/// Creates the `.lock` sidecar for the duration of the build (spec's
/// "exclusive writer via O_EXCL lock file"). In-process concurrency is
/// already serialized by the Manager's single-flight map; this file is the
/// cross-process signal eviction and startup cleanup rely on, so failure to
/// create it (e.g. a stale lock left by a killed process, to be swept up by
/// the next startup cleanup) is logged but never aborts the build.
fn acquire_lock(ctx: &BuildContext) {
    use std::fs::OpenOptions;
    let path = lock_path(&ctx.output_path);
    if let Err(e) = OpenOptions::new().write(true).create_new(true).open(&path) {
        if e.kind() != std::io::ErrorKind::AlreadyExists {
            tracing::warn!(path = %path.display(), error = %e, "failed to create build lock file");
        }
    }
}

fn cleanup_partial(ctx: &BuildContext) {
    let _ = std::fs::remove_file(tmp_path(&ctx.output_path));
    let _ = std::fs::remove_file(lock_path(&ctx.output_path));
}

fn strategy_name(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Default => "default",
        Strategy::Fallback => "fallback",
        Strategy::Transcode => "transcode",
        Strategy::Unsupported => "unsupported",
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
