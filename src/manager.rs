//! VOD Manager (C7): single-flight build coordination keyed by cache key,
//! bounded concurrency, and cancellation.
//!
//! Single-flight is grounded in `synctv-stream`'s `dashmap`-keyed registries
//! (`relay::registry`): `DashMap::entry` gives atomic check-or-insert per
//! key without a separate outer lock. Concurrency bounding follows the
//! teacher's atomic-counter idiom (`engine/state.rs`) rather than pulling in
//! `tokio::sync::Semaphore` purely to gate a std-thread-driven build.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Idle,
    Running,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BuildStatus {
    pub state: BuildState,
    pub progressive_ready: bool,
}

/// One in-flight (or just-finished) build. Shared via `Arc` between the
/// Manager's map, the worker thread driving the child process, and any HTTP
/// callers polling `/status`.
pub struct BuildRun {
    pub cancel: Arc<AtomicBool>,
    status_tx: watch::Sender<BuildStatus>,
}

impl BuildRun {
    fn new() -> Self {
        let (status_tx, _rx) = watch::channel(BuildStatus {
            state: BuildState::Running,
            progressive_ready: false,
        });
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            status_tx,
        }
    }

    pub fn status(&self) -> BuildStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BuildStatus> {
        self.status_tx.subscribe()
    }

    /// Flips `progressive_ready` without changing `state`, once the partial
    /// artifact is safe to serve while the build continues.
    pub fn mark_progressive_ready(&self) {
        let mut status = self.status_tx.borrow().clone();
        status.progressive_ready = true;
        let _ = self.status_tx.send(status);
    }

    /// Closes out the run exactly once. Idempotent sends are harmless since
    /// only the owning worker thread calls this.
    fn finish(&self, success: bool) {
        let mut status = self.status_tx.borrow().clone();
        status.state = if success { BuildState::Ready } else { BuildState::Failed };
        if success {
            status.progressive_ready = true;
        }
        let _ = self.status_tx.send(status);
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }
}

pub struct Manager {
    runs: DashMap<String, Arc<BuildRun>>,
    in_flight: AtomicUsize,
    max_concurrent: usize,
}

impl Manager {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            runs: DashMap::new(),
            in_flight: AtomicUsize::new(0),
            max_concurrent,
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<BuildRun>> {
        self.runs.get(key).map(|r| r.clone())
    }

    pub fn cancel(&self, key: &str) {
        if let Some(run) = self.runs.get(key) {
            run.request_cancel();
        }
    }

    /// Atomic single-flight entry point. If a run already exists for `key`,
    /// returns it unchanged (`isNew=false`). Otherwise reserves a
    /// concurrency slot (returning `TooManyBuilds` if saturated), creates the
    /// `BuildRun`, spawns `work` on a blocking thread, and returns the new
    /// run (`isNew=true`).
    ///
    /// `work` receives the run so it can report progress/finish it, and runs
    /// to completion on a dedicated OS thread via `tokio::task::spawn_blocking`
    /// — it must call neither `.await` nor block the calling async context.
    pub fn ensure<F>(self: &Arc<Self>, key: String, work: F) -> Result<(Arc<BuildRun>, bool), AppError>
    where
        F: FnOnce(Arc<BuildRun>) + Send + 'static,
    {
        match self.runs.entry(key.clone()) {
            Entry::Occupied(e) => Ok((e.get().clone(), false)),
            Entry::Vacant(e) => {
                if self.try_reserve_slot() {
                    let run = Arc::new(BuildRun::new());
                    e.insert(run.clone());

                    let manager = self.clone();
                    let run_for_worker = run.clone();
                    tokio::task::spawn_blocking(move || {
                        work(run_for_worker);
                        manager.complete(&key);
                    });

                    Ok((run, true))
                } else {
                    Err(AppError::TooManyBuilds)
                }
            }
        }
    }

    fn try_reserve_slot(&self) -> bool {
        loop {
            let current = self.in_flight.load(Ordering::Acquire);
            if current >= self.max_concurrent {
                return false;
            }
            if self
                .in_flight
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Called by the worker thread after `work` returns. Removes the entry
    /// from the map only after the run's `done`/status has already been
    /// closed by `work` itself (via `BuildRun::finish`), matching the
    /// "close done before removing from the map" invariant.
    fn complete(&self, key: &str) {
        self.runs.remove(key);
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Convenience used by worker closures to report a terminal outcome through
/// the run's status channel. Kept as a free function since `BuildRun::finish`
/// is private to this module (only the Manager's worker contract should call
/// it, not arbitrary callers holding an `Arc<BuildRun>`).
pub fn report_outcome(run: &BuildRun, success: bool) {
    run.finish(success);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn manager(max: usize) -> Arc<Manager> {
        Arc::new(Manager::new(max))
    }

    #[tokio::test]
    async fn ensure_is_single_flight_for_same_key() {
        let mgr = manager(2);
        let (tx, rx) = mpsc::channel::<()>();
        let rx = std::sync::Mutex::new(rx);

        let (run1, is_new1) = mgr
            .ensure("key-a".to_string(), move |run| {
                let _ = rx.lock().unwrap().recv_timeout(Duration::from_secs(5));
                report_outcome(&run, true);
            })
            .unwrap();
        assert!(is_new1);

        let (run2, is_new2) = mgr.ensure("key-a".to_string(), |run| report_outcome(&run, true)).unwrap();
        assert!(!is_new2);
        assert!(Arc::ptr_eq(&run1, &run2));

        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn ensure_returns_too_many_builds_when_saturated() {
        let mgr = manager(1);
        let (_tx, rx) = mpsc::channel::<()>();
        let rx = std::sync::Mutex::new(rx);

        let (_run, _is_new) = mgr
            .ensure("key-a".to_string(), move |run| {
                let _ = rx.lock().unwrap().recv_timeout(Duration::from_secs(5));
                report_outcome(&run, true);
            })
            .unwrap();

        let result = mgr.ensure("key-b".to_string(), |run| report_outcome(&run, true));
        assert!(matches!(result, Err(AppError::TooManyBuilds)));
    }

    #[tokio::test]
    async fn completed_run_is_removed_from_map_and_frees_slot() {
        let mgr = manager(1);
        let (run, _) = mgr.ensure("key-a".to_string(), |run| report_outcome(&run, true)).unwrap();

        let mut rx = run.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("status changed")
            .unwrap();
        assert_eq!(rx.borrow().state, BuildState::Ready);

        // Give the worker's `complete` call a moment to run after `finish`.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(mgr.get("key-a").is_none());

        let (_run2, is_new2) = mgr.ensure("key-a".to_string(), |run| report_outcome(&run, true)).unwrap();
        assert!(is_new2);
    }
}
