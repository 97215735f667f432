use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use vodremux::cache::eviction::{self, CacheEntry};
use vodremux::cache::startup_cleanup;
use vodremux::collaborators::{IdentityPathMapper, InMemoryResumeStore, LocalFsRecordingSource, TokenEchoAuth};
use vodremux::config::Config;
use vodremux::http::{self, AppState};
use vodremux::manager::Manager;
use vodremux::metrics::Metrics;

#[derive(Parser, Debug)]
#[command(name = "vodremuxd")]
#[command(about = "VOD remux engine: on-demand build + cache + playback HTTP surface", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "VODREMUX_CONFIG", default_value = "vodremux.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .compact()
        .init();

    let args = Args::parse();
    info!(config = %args.config.display(), "loading configuration");
    let config = Arc::new(Config::load(&args.config).context("failed to load configuration")?);

    for root in [config.mp4_cache_dir(), config.hls_recordings_dir()] {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create cache root {}", root.display()))?;
    }
    startup_cleanup(&[&config.mp4_cache_dir(), &config.hls_recordings_dir()]);

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(LocalFsRecordingSource {
            root: config.hls_root.clone(),
        }),
        Arc::new(IdentityPathMapper),
        Arc::new(InMemoryResumeStore::default()),
        Arc::new(TokenEchoAuth),
    ));

    spawn_eviction_loop(config.clone(), state.manager.clone(), state.metrics.clone());

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "vodremuxd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sig.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}

/// Periodic TTL + disk-pressure eviction over both cache namespaces (§4.8's
/// 1h tick). Runs the scan and removal on a blocking thread since it walks
/// the filesystem and queries free space.
fn spawn_eviction_loop(config: Arc<Config>, manager: Arc<Manager>, metrics: Arc<Metrics>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            let config = config.clone();
            let manager = manager.clone();
            let metrics = metrics.clone();
            let result = tokio::task::spawn_blocking(move || run_eviction_pass(&config, &manager, &metrics)).await;
            if let Err(e) = result {
                error!(error = %e, "eviction pass panicked");
            }
        }
    });
}

fn run_eviction_pass(config: &Config, manager: &Manager, metrics: &Metrics) {
    let mp4_root = config.mp4_cache_dir();
    let hls_root = config.hls_recordings_dir();

    let mut entries = Vec::new();
    collect_mp4_entries(&mp4_root, &mut entries);
    collect_hls_entries(&hls_root, &mut entries);

    let available = fs2::available_space(&config.data_dir).unwrap_or(u64::MAX);
    let is_active = |path: &std::path::Path| {
        let key = artifact_key(path);
        key.map(|k| manager.get(&k).is_some()).unwrap_or(false)
    };

    let victims = eviction::run_pass(
        entries,
        Duration::from_secs(config.vod_cache_ttl_secs),
        SystemTime::now(),
        available,
        config.disk_pressure_floor_bytes,
        config.disk_pressure_reclaim_bytes,
        is_active,
    );

    for victim in &victims {
        let size = std::fs::metadata(victim).map(|m| m.len()).unwrap_or(0);
        if eviction::remove_artifact(victim).is_ok() {
            metrics.eviction(size);
        }
    }
    if !victims.is_empty() {
        info!(count = victims.len(), "evicted stale cache artifacts");
    }
}

fn artifact_key(path: &std::path::Path) -> Option<String> {
    if path.extension().map(|e| e == "mp4").unwrap_or(false) {
        let stem = path.file_stem()?.to_str()?;
        Some(format!("mp4:{stem}"))
    } else {
        path.file_name()?.to_str().map(|s| s.to_string())
    }
}

fn collect_mp4_entries(root: &std::path::Path, out: &mut Vec<CacheEntry>) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map(|e| e != "mp4").unwrap_or(true) {
            continue;
        }
        push_entry(&path, out);
    }
}

fn collect_hls_entries(root: &std::path::Path, out: &mut Vec<CacheEntry>) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            push_entry(&path, out);
        }
    }
}

fn push_entry(path: &std::path::Path, out: &mut Vec<CacheEntry>) {
    let Ok(meta) = std::fs::metadata(path) else {
        return;
    };
    let Ok(mtime) = meta.modified() else {
        return;
    };
    let locked = vodremux::cache::lock_path(path).exists();
    let size_bytes = dir_size(path, &meta);
    out.push(CacheEntry {
        path: path.to_path_buf(),
        mtime,
        size_bytes,
        locked,
    });
}

fn dir_size(path: &std::path::Path, meta: &std::fs::Metadata) -> u64 {
    if meta.is_file() {
        return meta.len();
    }
    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
