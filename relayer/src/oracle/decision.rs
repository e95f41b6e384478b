use alloy::primitives::U256;
use std::fmt;
use std::time::Duration;

const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayReason {
    Drift { bps: u64 },
    Stale { age_secs: u64 },
    UpToDate,
}

impl fmt::Display for RelayReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayReason::Drift { bps } if *bps == u64::MAX => write!(f, "no value on L2 yet"),
            RelayReason::Drift { bps } => write!(f, "drift of {bps} bps"),
            RelayReason::Stale { age_secs } => write!(f, "L2 value is {age_secs}s old"),
            RelayReason::UpToDate => write!(f, "L2 value is fresh and within drift"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayDecision {
    pub should_submit: bool,
    pub value: U256,
    pub reason: RelayReason,
    pub drift_bps: u64,
}

/// Relative change from `last_pushed` to `new_value` in basis points.
///
/// A zero `last_pushed` with any other value counts as maximal drift.
pub fn drift_bps(last_pushed: U256, new_value: U256) -> u64 {
    if last_pushed == new_value {
        return 0;
    }
    if last_pushed.is_zero() {
        return u64::MAX;
    }
    let diff = if new_value > last_pushed {
        new_value - last_pushed
    } else {
        last_pushed - new_value
    };
    let denominator = U256::from(BPS_DENOMINATOR);
    let bps = match diff.checked_mul(denominator) {
        Some(scaled) => scaled / last_pushed,
        // Only reachable for values close to U256::MAX.
        None if last_pushed >= denominator => diff / (last_pushed / denominator),
        None => return u64::MAX,
    };
    u64::try_from(bps).unwrap_or(u64::MAX)
}

/// Submit when the value drifted by at least `threshold_bps` or the stored value is at least
/// one `interval` old.
pub fn decide(
    new_value: U256,
    last_pushed: U256,
    last_updated: u64,
    now: u64,
    interval: Duration,
    threshold_bps: u64,
) -> RelayDecision {
    let drift_bps = drift_bps(last_pushed, new_value);
    let age_secs = now.saturating_sub(last_updated);

    let reason = if drift_bps >= threshold_bps {
        RelayReason::Drift { bps: drift_bps }
    } else if age_secs >= interval.as_secs() {
        RelayReason::Stale { age_secs }
    } else {
        RelayReason::UpToDate
    };

    RelayDecision {
        should_submit: reason != RelayReason::UpToDate,
        value: new_value,
        reason,
        drift_bps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(60);
    const NOW: u64 = 1_700_000_000;

    #[test]
    fn test_fresh_equal_value_is_skipped() {
        let decision = decide(U256::from(100), U256::from(100), NOW - 10, NOW, INTERVAL, 500);
        assert!(!decision.should_submit);
        assert_eq!(decision.reason, RelayReason::UpToDate);
    }

    #[test]
    fn test_six_percent_drift_is_relayed_at_five_percent_threshold() {
        let decision = decide(U256::from(106), U256::from(100), NOW - 10, NOW, INTERVAL, 500);
        assert!(decision.should_submit);
        assert_eq!(decision.value, U256::from(106));
        assert_eq!(decision.reason, RelayReason::Drift { bps: 600 });
    }

    #[test]
    fn test_drift_at_threshold_is_relayed() {
        let decision = decide(U256::from(95), U256::from(100), NOW, NOW, INTERVAL, 500);
        assert!(decision.should_submit);
        assert_eq!(decision.drift_bps, 500);
    }

    #[test]
    fn test_small_drift_is_skipped_until_stale() {
        let fresh = decide(U256::from(101), U256::from(100), NOW - 59, NOW, INTERVAL, 500);
        assert!(!fresh.should_submit);

        let stale = decide(U256::from(101), U256::from(100), NOW - 60, NOW, INTERVAL, 500);
        assert!(stale.should_submit);
        assert_eq!(stale.reason, RelayReason::Stale { age_secs: 60 });
    }

    #[test]
    fn test_first_push_counts_as_max_drift() {
        assert_eq!(drift_bps(U256::ZERO, U256::from(1)), u64::MAX);
        assert_eq!(drift_bps(U256::ZERO, U256::ZERO), 0);
        let decision = decide(U256::from(1), U256::ZERO, NOW, NOW, INTERVAL, 10_000);
        assert!(decision.should_submit);
    }

    #[test]
    fn test_drift_is_symmetric_in_direction() {
        assert_eq!(drift_bps(U256::from(200), U256::from(100)), 5_000);
        assert_eq!(drift_bps(U256::from(100), U256::from(200)), 10_000);
    }

    #[test]
    fn test_huge_values_do_not_overflow() {
        assert_eq!(drift_bps(U256::MAX, U256::ZERO), BPS_DENOMINATOR);
        assert_eq!(drift_bps(U256::from(1), U256::MAX), u64::MAX);
    }

    #[test]
    fn test_clock_behind_chain_is_not_stale() {
        let decision = decide(U256::from(100), U256::from(100), NOW + 5, NOW, INTERVAL, 500);
        assert!(!decision.should_submit);
    }
}
