//! TTL and disk-pressure eviction (§4.8). The selection logic is pure and
//! unit-tested against synthetic entries; the I/O (directory scan, free-space
//! query, removal) is kept thin around it, grounded in the teacher's
//! `engine/preview_cache_gc.rs` mtime-age sweep.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub mtime: SystemTime,
    pub size_bytes: u64,
    pub locked: bool,
}

/// Selects entries eligible for TTL eviction: older than `ttl`, not locked,
/// and not reported active by `is_active`. Ordering is not significant for
/// this pass; every eligible entry is evicted.
pub fn select_ttl_evictions(
    entries: &[CacheEntry],
    ttl: Duration,
    now: SystemTime,
    is_active: impl Fn(&Path) -> bool,
) -> Vec<PathBuf> {
    entries
        .iter()
        .filter(|e| !e.locked && !is_active(&e.path))
        .filter(|e| now.duration_since(e.mtime).map(|age| age > ttl).unwrap_or(false))
        .map(|e| e.path.clone())
        .collect()
}

/// Selects entries for disk-pressure eviction: oldest-first among the
/// remaining (non-locked, non-active) entries, accumulating until at least
/// `reclaim_target_bytes` would be freed. Stops as soon as the target is
/// met; may select zero entries if already met or if none are eligible.
pub fn select_pressure_evictions(
    entries: &[CacheEntry],
    reclaim_target_bytes: u64,
    is_active: impl Fn(&Path) -> bool,
) -> Vec<PathBuf> {
    let mut eligible: Vec<&CacheEntry> =
        entries.iter().filter(|e| !e.locked && !is_active(&e.path)).collect();
    eligible.sort_by_key(|e| e.mtime);

    let mut reclaimed = 0u64;
    let mut selected = Vec::new();
    for entry in eligible {
        if reclaimed >= reclaim_target_bytes {
            break;
        }
        selected.push(entry.path.clone());
        reclaimed += entry.size_bytes;
    }
    selected
}

/// Removes an artifact, whether it's a flat file (MP4 cache) or a directory
/// (HLS recording), along with its `.lock`/`.tmp`/`.err.log`/`.meta.json`
/// sidecars when present.
pub fn remove_artifact(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else if path.exists() {
        std::fs::remove_file(path)?;
    }
    for sidecar in [
        super::lock_path(path),
        super::tmp_path(path),
        super::err_log_path(path),
        super::meta_path(path),
    ] {
        if sidecar.exists() {
            let _ = std::fs::remove_file(sidecar);
        }
    }
    Ok(())
}

/// Runs the TTL pass followed by the disk-pressure pass over the remainder,
/// per §4.8's stated ordering. `available_bytes` is the caller-supplied free
/// space on the filesystem backing `root` (queried via `fs2` at the call
/// site so this function stays testable without real disk state).
pub fn run_pass(
    entries: Vec<CacheEntry>,
    ttl: Duration,
    now: SystemTime,
    available_bytes: u64,
    floor_bytes: u64,
    reclaim_target_bytes: u64,
    is_active: impl Fn(&Path) -> bool + Copy,
) -> Vec<PathBuf> {
    let ttl_victims = select_ttl_evictions(&entries, ttl, now, is_active);
    let ttl_victim_set: std::collections::HashSet<&PathBuf> = ttl_victims.iter().collect();

    let mut evicted = ttl_victims.clone();

    if available_bytes < floor_bytes {
        let remainder: Vec<CacheEntry> = entries
            .into_iter()
            .filter(|e| !ttl_victim_set.contains(&e.path))
            .collect();
        let pressure_victims = select_pressure_evictions(&remainder, reclaim_target_bytes, is_active);
        evicted.extend(pressure_victims);
    }

    evicted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, age_secs: u64, now: SystemTime, size: u64, locked: bool) -> CacheEntry {
        CacheEntry {
            path: PathBuf::from(format!("/cache/{name}")),
            mtime: now - Duration::from_secs(age_secs),
            size_bytes: size,
            locked,
        }
    }

    #[test]
    fn ttl_eviction_skips_locked_and_active_entries() {
        let now = SystemTime::now();
        let entries = vec![
            entry("old", 100_000, now, 10, false),
            entry("old_locked", 100_000, now, 10, true),
            entry("old_active", 100_000, now, 10, false),
            entry("fresh", 10, now, 10, false),
        ];
        let victims = select_ttl_evictions(
            &entries,
            Duration::from_secs(86400),
            now,
            |p| p.ends_with("old_active"),
        );
        assert_eq!(victims, vec![PathBuf::from("/cache/old")]);
    }

    #[test]
    fn pressure_eviction_picks_oldest_first_until_target_met() {
        let now = SystemTime::now();
        let entries = vec![
            entry("a", 300, now, 500, false),
            entry("b", 200, now, 500, false),
            entry("c", 100, now, 500, false),
        ];
        let victims = select_pressure_evictions(&entries, 900, |_| false);
        assert_eq!(
            victims,
            vec![PathBuf::from("/cache/a"), PathBuf::from("/cache/b")]
        );
    }

    #[test]
    fn pressure_eviction_selects_nothing_when_target_already_met() {
        let entries: Vec<CacheEntry> = vec![];
        let victims = select_pressure_evictions(&entries, 0, |_| false);
        assert!(victims.is_empty());
    }

    #[test]
    fn full_pass_only_runs_pressure_when_below_floor() {
        let now = SystemTime::now();
        let entries = vec![entry("a", 10, now, 2_000_000_000, false)];
        let above_floor = run_pass(
            entries.clone(),
            Duration::from_secs(86400),
            now,
            10_000_000_000,
            5_000_000_000,
            1_000_000_000,
            |_| false,
        );
        assert!(above_floor.is_empty());

        let below_floor = run_pass(
            entries,
            Duration::from_secs(86400),
            now,
            1_000_000_000,
            5_000_000_000,
            1_000_000_000,
            |_| false,
        );
        assert_eq!(below_floor, vec![PathBuf::from("/cache/a")]);
    }
}
