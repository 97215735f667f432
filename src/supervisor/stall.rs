//! Stall detection (§4.6/§5): pure decision logic, kept separate from the
//! supervisor loop so it's trivially unit-testable (property 6 of §8).

use std::time::Duration;

/// Whether the supervisor should treat the build as stalled right now.
///
/// `elapsed_since_start` gates the startup grace window; `elapsed_since_
/// advance` is measured from the last snapshot for which
/// `Progress::has_advanced` returned true (receiving snapshots without
/// advance does not reset this).
pub fn should_kill_for_stall(
    elapsed_since_start: Duration,
    elapsed_since_advance: Duration,
    startup_grace: Duration,
    stall_timeout: Duration,
) -> bool {
    if elapsed_since_start < startup_grace {
        return false;
    }
    elapsed_since_advance > stall_timeout
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stall_detection_disabled_during_startup_grace() {
        assert!(!should_kill_for_stall(
            Duration::from_secs(10),
            Duration::from_secs(200),
            Duration::from_secs(25),
            Duration::from_secs(90),
        ));
    }

    #[test]
    fn stall_detected_after_grace_when_no_advance() {
        assert!(should_kill_for_stall(
            Duration::from_secs(120),
            Duration::from_secs(91),
            Duration::from_secs(25),
            Duration::from_secs(90),
        ));
    }

    #[test]
    fn not_stalled_when_advance_within_timeout() {
        assert!(!should_kill_for_stall(
            Duration::from_secs(120),
            Duration::from_secs(10),
            Duration::from_secs(25),
            Duration::from_secs(90),
        ));
    }

    #[test]
    fn boundary_is_strictly_greater_than_timeout() {
        assert!(!should_kill_for_stall(
            Duration::from_secs(120),
            Duration::from_secs(90),
            Duration::from_secs(25),
            Duration::from_secs(90),
        ));
        assert!(should_kill_for_stall(
            Duration::from_secs(120),
            Duration::from_secs(91),
            Duration::from_secs(25),
            Duration::from_secs(90),
        ));
    }
}
