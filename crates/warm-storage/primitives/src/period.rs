//! Proving period arithmetic
//!
//! Every data set proves on a fixed schedule anchored at the epoch its first
//! proving period started. All functions here are pure.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Epoch, ProvingParams, constants::INVALID_PERIOD};

/// Inclusive epoch range in which a proof for a deadline is accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChallengeWindow {
    /// First epoch of the window
    pub start: Epoch,
    /// Last epoch of the window (the deadline)
    pub end: Epoch,
}

impl ChallengeWindow {
    /// Window closing at `deadline`
    pub const fn ending_at(deadline: Epoch, window_size: u64) -> Self {
        Self { start: deadline.saturating_sub(window_size), end: deadline }
    }

    /// Whether `epoch` lies inside the window
    pub const fn contains(&self, epoch: Epoch) -> bool {
        epoch >= self.start && epoch <= self.end
    }
}

impl fmt::Display for ChallengeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Period geometry of a single data set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSchedule {
    /// Epoch proving was activated at, zero if never
    pub activation_epoch: Epoch,
    /// Length of every proving period
    pub max_proving_period: u64,
    /// Trailing epochs of a period in which proofs are accepted
    pub challenge_window_size: u64,
}

impl PeriodSchedule {
    /// Create a schedule anchored at `activation_epoch`
    pub const fn new(activation_epoch: Epoch, params: ProvingParams) -> Self {
        Self {
            activation_epoch,
            max_proving_period: params.max_proving_period,
            challenge_window_size: params.challenge_window_size,
        }
    }

    /// Whether proving has been activated
    pub const fn is_active(&self) -> bool {
        self.activation_epoch != 0
    }

    /// Period containing `epoch`, or [`INVALID_PERIOD`] before activation
    pub const fn period_index(&self, epoch: Epoch) -> u64 {
        if !self.is_active() || epoch < self.activation_epoch || self.max_proving_period == 0 {
            return INVALID_PERIOD;
        }
        (epoch - self.activation_epoch) / self.max_proving_period
    }

    /// Deadline (last epoch) of `period`
    pub const fn period_deadline(&self, period: u64) -> Epoch {
        self.activation_epoch
            .saturating_add(period.saturating_add(1).saturating_mul(self.max_proving_period))
    }

    /// First epoch after the previous period's deadline
    pub const fn period_start(&self, period: u64) -> Epoch {
        self.period_deadline(period).saturating_sub(self.max_proving_period)
    }

    /// Period whose deadline is exactly `deadline`
    ///
    /// Deadlines produced by [`Self::period_deadline`] always map back to
    /// their period. Returns [`INVALID_PERIOD`] for deadlines at or before
    /// activation.
    pub const fn period_of_deadline(&self, deadline: Epoch) -> u64 {
        if !self.is_active() || deadline <= self.activation_epoch || self.max_proving_period == 0 {
            return INVALID_PERIOD;
        }
        (deadline - self.activation_epoch - 1) / self.max_proving_period
    }

    /// Period whose range `(start, deadline]` contains `epoch`
    ///
    /// This is the period a proof at the deadline is recorded against. The
    /// activation epoch itself counts toward period 0.
    pub const fn period_containing(&self, epoch: Epoch) -> u64 {
        if !self.is_active() || epoch < self.activation_epoch || self.max_proving_period == 0 {
            return INVALID_PERIOD;
        }
        (epoch - self.activation_epoch).saturating_sub(1) / self.max_proving_period
    }

    /// Start of the challenge window that closes at `deadline`
    pub const fn challenge_window_start(&self, deadline: Epoch) -> Epoch {
        deadline.saturating_sub(self.challenge_window_size)
    }

    /// Challenge window that closes at `deadline`
    pub const fn window(&self, deadline: Epoch) -> ChallengeWindow {
        ChallengeWindow::ending_at(deadline, self.challenge_window_size)
    }

    /// First period deadline strictly after `epoch`
    pub const fn next_deadline_after(&self, epoch: Epoch) -> Epoch {
        if epoch < self.activation_epoch {
            return self.period_deadline(0);
        }
        self.period_deadline(self.period_index(epoch))
    }
}

/// Whole periods that elapsed unclaimed after `deadline` when advancing at `epoch`
pub const fn periods_skipped(deadline: Epoch, epoch: Epoch, max_proving_period: u64) -> u64 {
    if epoch <= deadline || max_proving_period == 0 {
        return 0;
    }
    (epoch - (deadline + 1)) / max_proving_period
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn schedule(activation: Epoch) -> PeriodSchedule {
        PeriodSchedule::new(activation, ProvingParams::new(2880, 60))
    }

    #[test]
    fn test_period_index_before_activation() {
        assert_eq!(schedule(0).period_index(5000), INVALID_PERIOD);
        assert_eq!(schedule(1000).period_index(999), INVALID_PERIOD);
        assert_eq!(schedule(1000).period_index(1000), 0);
    }

    #[test]
    fn test_period_boundaries() {
        let s = schedule(1000);
        assert_eq!(s.period_deadline(0), 3880);
        assert_eq!(s.period_deadline(1), 6760);
        assert_eq!(s.period_start(1), 3880);
        assert_eq!(s.period_index(3879), 0);
        assert_eq!(s.period_index(3880), 1);
        assert_eq!(s.period_of_deadline(3880), 0);
        assert_eq!(s.period_of_deadline(6760), 1);
        assert_eq!(s.period_of_deadline(1000), INVALID_PERIOD);
    }

    #[test]
    fn test_period_containing_includes_deadline() {
        let s = schedule(1000);
        assert_eq!(s.period_containing(999), INVALID_PERIOD);
        assert_eq!(s.period_containing(1000), 0);
        assert_eq!(s.period_containing(1001), 0);
        assert_eq!(s.period_containing(3880), 0);
        assert_eq!(s.period_containing(3881), 1);
        assert_eq!(s.period_containing(6760), s.period_of_deadline(6760));
    }

    #[test]
    fn test_challenge_window() {
        let s = schedule(1000);
        let window = s.window(3880);
        assert_eq!(window, ChallengeWindow { start: 3820, end: 3880 });
        assert!(window.contains(3820));
        assert!(window.contains(3880));
        assert!(!window.contains(3819));
        assert!(!window.contains(3881));
        assert_eq!(window.to_string(), "[3820, 3880]");
    }

    #[test]
    fn test_periods_skipped() {
        assert_eq!(periods_skipped(3880, 3880, 2880), 0);
        assert_eq!(periods_skipped(3880, 3881, 2880), 0);
        assert_eq!(periods_skipped(3880, 6760, 2880), 0);
        assert_eq!(periods_skipped(3880, 6761, 2880), 1);
        assert_eq!(periods_skipped(3880, 3880 + 3 * 2880 + 1, 2880), 3);
    }

    #[test]
    fn test_next_deadline_after() {
        let s = schedule(1000);
        assert_eq!(s.next_deadline_after(1000), 3880);
        assert_eq!(s.next_deadline_after(3879), 3880);
        assert_eq!(s.next_deadline_after(3880), 6760);
        assert_eq!(s.next_deadline_after(500), 3880);
    }

    proptest! {
        #[test]
        fn prop_epoch_lies_in_its_period(activation in 1u64..1_000_000, offset in 0u64..10_000_000) {
            let s = schedule(activation);
            let epoch = activation + offset;
            let period = s.period_index(epoch);
            prop_assert!(s.period_start(period) <= epoch);
            prop_assert!(epoch < s.period_deadline(period));
        }

        #[test]
        fn prop_deadline_round_trips(activation in 1u64..1_000_000, period in 0u64..100_000) {
            let s = schedule(activation);
            prop_assert_eq!(s.period_of_deadline(s.period_deadline(period)), period);
        }

        #[test]
        fn prop_skipped_deadline_stays_ahead(deadline in 1u64..1_000_000, late in 1u64..10_000_000) {
            let epoch = deadline + late;
            let skipped = periods_skipped(deadline, epoch, 2880);
            let next = deadline + 2880 * (skipped + 1);
            prop_assert!(next >= epoch);
            prop_assert!(next - epoch < 2880);
        }
    }
}
