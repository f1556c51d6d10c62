//! Proving period state machine
//!
//! ```text
//!  Uninitialized ──advance──► Open ──proof──► Proven
//!                              ▲  │              │
//!                              │  └───advance────┤
//!                              └──────advance────┤ (challenge scheduled)
//!                   Closed ◄──────advance────────┘ (nothing to prove)
//!                     └────advance (reopen)────► Open
//! ```
//!
//! Transitions are split into a fallible check that computes the outcome and
//! an infallible apply, so callers can run external calls in between and only
//! commit once everything succeeded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use warm_storage_primitives::{
    ChallengeWindow, DataSetId, Epoch, PeriodSchedule, ProvingParams,
    constants::{CHALLENGES_PER_PROOF, NO_CHALLENGE_SCHEDULED, NO_PROVING_DEADLINE},
    periods_skipped,
};

use crate::{Result, ServiceError};

const WORD_BITS: u64 = 64;

/// Sparse set of proven period indices packed into 64-bit words
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvenPeriods {
    words: BTreeMap<u64, u64>,
}

impl ProvenPeriods {
    /// Mark `period` proven
    pub fn insert(&mut self, period: u64) {
        *self.words.entry(period / WORD_BITS).or_default() |= 1u64 << (period % WORD_BITS);
    }

    /// Whether `period` is proven
    pub fn contains(&self, period: u64) -> bool {
        self.words
            .get(&(period / WORD_BITS))
            .is_some_and(|word| *word & (1u64 << (period % WORD_BITS)) != 0)
    }

    /// Number of proven periods
    pub fn len(&self) -> u64 {
        self.words.values().map(|word| u64::from(word.count_ones())).sum()
    }

    /// Whether no period was proven
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Proven periods in `start..end`
    pub fn count_in(&self, start: u64, end: u64) -> u64 {
        if start >= end {
            return 0;
        }
        let (first_word, last_word) = (start / WORD_BITS, (end - 1) / WORD_BITS);
        self.words
            .range(first_word..=last_word)
            .map(|(&index, &word)| {
                let mut mask = u64::MAX;
                if index == first_word {
                    mask &= u64::MAX << (start % WORD_BITS);
                }
                if index == last_word {
                    mask &= u64::MAX >> (WORD_BITS - 1 - (end - 1) % WORD_BITS);
                }
                u64::from((word & mask).count_ones())
            })
            .sum()
    }

    /// Iterate proven periods in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.words.iter().flat_map(|(&index, &word)| {
            (0..WORD_BITS)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| index * WORD_BITS + bit)
        })
    }
}

/// How a proving period advance changed the state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvanceKind {
    /// First period opened; activation recorded
    Activated,
    /// Period reopened after a close, aligned to the activation epoch
    Reopened,
    /// Deadline moved to the next period
    Advanced,
    /// No further challenges; deadline cleared
    Closed,
}

/// Outcome of a successful advance check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodAdvance {
    /// Kind of transition
    pub kind: AdvanceKind,
    /// Activation epoch after the advance
    pub activation_epoch: Epoch,
    /// Deadline before the advance
    pub previous_deadline: Epoch,
    /// Deadline after the advance, [`NO_PROVING_DEADLINE`] when closed
    pub next_deadline: Epoch,
    /// Periods that ended without an accepted proof
    pub faulted_periods: u64,
}

/// Proving state of one data set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvingState {
    /// Period parameters snapshotted at creation
    pub params: ProvingParams,
    /// Epoch the first period opened, zero if never
    pub activation_epoch: Epoch,
    /// Deadline of the open period, zero if none
    pub proving_deadline: Epoch,
    /// Whether a proof was accepted in the open period
    pub proven_this_period: bool,
    /// Periods with an accepted proof
    pub proven_periods: ProvenPeriods,
}

impl ProvingState {
    /// Uninitialized state
    pub fn new(params: ProvingParams) -> Self {
        Self {
            params,
            activation_epoch: 0,
            proving_deadline: NO_PROVING_DEADLINE,
            proven_this_period: false,
            proven_periods: ProvenPeriods::default(),
        }
    }

    /// Period geometry anchored at the activation epoch
    pub const fn schedule(&self) -> PeriodSchedule {
        PeriodSchedule::new(self.activation_epoch, self.params)
    }

    /// Whether proving was ever activated
    pub const fn is_active(&self) -> bool {
        self.activation_epoch != 0
    }

    /// Whether a period is open
    pub const fn is_open(&self) -> bool {
        self.proving_deadline != NO_PROVING_DEADLINE
    }

    /// Challenge window of the open period
    pub const fn current_window(&self) -> Option<ChallengeWindow> {
        if self.is_open() { Some(self.schedule().window(self.proving_deadline)) } else { None }
    }

    /// Whether `period` has an accepted proof
    pub fn is_period_proven(&self, period: u64) -> bool {
        self.proven_periods.contains(period)
    }

    /// Validate a proof submitted at `epoch`, returning the period it proves
    pub fn check_proof(
        &self,
        data_set_id: DataSetId,
        epoch: Epoch,
        challenge_count: u64,
    ) -> Result<u64> {
        if self.proven_this_period {
            return Err(ServiceError::ProofAlreadySubmitted(data_set_id));
        }
        if challenge_count < CHALLENGES_PER_PROOF {
            return Err(ServiceError::InvalidChallengeCount {
                required: CHALLENGES_PER_PROOF,
                actual: challenge_count,
            });
        }
        if !self.is_open() {
            return Err(ServiceError::ProvingNotStarted(data_set_id));
        }

        let deadline = self.proving_deadline;
        if epoch > deadline {
            return Err(ServiceError::ProvingPeriodPassed { data_set_id, deadline, epoch });
        }
        let window = self.schedule().window(deadline);
        if epoch < window.start {
            return Err(ServiceError::ChallengeWindowNotStarted { data_set_id, window, epoch });
        }

        Ok(self.schedule().period_of_deadline(deadline))
    }

    /// Record a proof checked by [`Self::check_proof`]
    pub fn record_proof(&mut self, period: u64) {
        self.proven_this_period = true;
        self.proven_periods.insert(period);
    }

    /// Validate an advance at `epoch` to a period challenged at `challenge_epoch`
    pub fn check_advance(
        &self,
        data_set_id: DataSetId,
        epoch: Epoch,
        challenge_epoch: Epoch,
    ) -> Result<PeriodAdvance> {
        let max_period = self.params.max_proving_period;
        let validate = |deadline: Epoch| {
            let window = ChallengeWindow::ending_at(deadline, self.params.challenge_window_size);
            if window.contains(challenge_epoch) {
                Ok(())
            } else {
                Err(ServiceError::InvalidChallengeEpoch { data_set_id, challenge_epoch, window })
            }
        };

        if !self.is_active() {
            // activation epoch 0 reads back as never activated
            if epoch == 0 {
                return Err(ServiceError::ActivationAtGenesis(data_set_id));
            }
            let next_deadline =
                epoch.checked_add(max_period).ok_or(ServiceError::Overflow("first deadline"))?;
            validate(next_deadline)?;
            return Ok(PeriodAdvance {
                kind: AdvanceKind::Activated,
                activation_epoch: epoch,
                previous_deadline: NO_PROVING_DEADLINE,
                next_deadline,
                faulted_periods: 0,
            });
        }

        if !self.is_open() {
            let next_deadline = self.schedule().next_deadline_after(epoch);
            validate(next_deadline)?;
            return Ok(PeriodAdvance {
                kind: AdvanceKind::Reopened,
                activation_epoch: self.activation_epoch,
                previous_deadline: NO_PROVING_DEADLINE,
                next_deadline,
                faulted_periods: 0,
            });
        }

        let deadline = self.proving_deadline;
        if epoch <= deadline {
            return Err(ServiceError::NextProvingPeriodAlreadyCalled { data_set_id, deadline, epoch });
        }

        let skipped = periods_skipped(deadline, epoch, max_period);
        let faulted_periods = skipped + u64::from(!self.proven_this_period);

        if challenge_epoch == NO_CHALLENGE_SCHEDULED {
            return Ok(PeriodAdvance {
                kind: AdvanceKind::Closed,
                activation_epoch: self.activation_epoch,
                previous_deadline: deadline,
                next_deadline: NO_PROVING_DEADLINE,
                faulted_periods,
            });
        }

        let next_deadline = max_period
            .checked_mul(skipped + 1)
            .and_then(|offset| deadline.checked_add(offset))
            .ok_or(ServiceError::Overflow("next deadline"))?;
        validate(next_deadline)?;

        Ok(PeriodAdvance {
            kind: AdvanceKind::Advanced,
            activation_epoch: self.activation_epoch,
            previous_deadline: deadline,
            next_deadline,
            faulted_periods,
        })
    }

    /// Apply an advance checked by [`Self::check_advance`]
    pub const fn apply_advance(&mut self, advance: &PeriodAdvance) {
        self.activation_epoch = advance.activation_epoch;
        self.proving_deadline = advance.next_deadline;
        self.proven_this_period = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn params() -> ProvingParams {
        ProvingParams::new(2880, 60)
    }

    fn activated_at(epoch: Epoch, challenge_epoch: Epoch) -> ProvingState {
        let mut state = ProvingState::new(params());
        let advance = state.check_advance(1, epoch, challenge_epoch).unwrap();
        state.apply_advance(&advance);
        state
    }

    #[test]
    fn test_proven_periods_bitset() {
        let mut periods = ProvenPeriods::default();
        for p in [0, 3, 63, 64, 200] {
            periods.insert(p);
        }
        assert!(periods.contains(63));
        assert!(periods.contains(64));
        assert!(!periods.contains(65));
        assert_eq!(periods.len(), 5);
        assert_eq!(periods.count_in(0, 64), 3);
        assert_eq!(periods.count_in(3, 65), 3);
        assert_eq!(periods.count_in(4, 63), 0);
        assert_eq!(periods.count_in(64, 201), 2);
        assert_eq!(periods.iter().collect::<Vec<_>>(), vec![0, 3, 63, 64, 200]);
    }

    #[test]
    fn test_first_advance_activates() {
        let state = activated_at(1000, 3820);
        assert_eq!(state.activation_epoch, 1000);
        assert_eq!(state.proving_deadline, 3880);
        assert_eq!(state.current_window(), Some(ChallengeWindow { start: 3820, end: 3880 }));

        let fresh = ProvingState::new(params());
        assert_matches!(
            fresh.check_advance(1, 1000, 3819),
            Err(ServiceError::InvalidChallengeEpoch { challenge_epoch: 3819, .. })
        );
        assert_matches!(
            fresh.check_advance(1, 1000, 3881),
            Err(ServiceError::InvalidChallengeEpoch { challenge_epoch: 3881, .. })
        );
    }

    #[test]
    fn test_activation_at_genesis_rejected() {
        let fresh = ProvingState::new(params());
        assert_eq!(fresh.check_advance(7, 0, 2820), Err(ServiceError::ActivationAtGenesis(7)));
        assert!(!fresh.is_active());
    }

    #[test]
    fn test_proof_window_boundaries() {
        let state = activated_at(1000, 3820);
        assert_eq!(state.check_proof(1, 3820, 5), Ok(0));
        assert_eq!(state.check_proof(1, 3880, 5), Ok(0));
        assert_matches!(
            state.check_proof(1, 3819, 5),
            Err(ServiceError::ChallengeWindowNotStarted { epoch: 3819, .. })
        );
        assert_matches!(
            state.check_proof(1, 3881, 5),
            Err(ServiceError::ProvingPeriodPassed { deadline: 3880, epoch: 3881, .. })
        );
    }

    #[test]
    fn test_proof_check_order() {
        let mut state = activated_at(1000, 3820);
        assert_eq!(
            state.check_proof(1, 100, 4),
            Err(ServiceError::InvalidChallengeCount { required: 5, actual: 4 })
        );

        state.record_proof(0);
        assert_eq!(state.check_proof(1, 3830, 5), Err(ServiceError::ProofAlreadySubmitted(1)));
        assert_eq!(state.check_proof(1, 3830, 1), Err(ServiceError::ProofAlreadySubmitted(1)));

        let fresh = ProvingState::new(params());
        assert_eq!(fresh.check_proof(1, 3830, 5), Err(ServiceError::ProvingNotStarted(1)));
    }

    #[test]
    fn test_advance_counts_faults() {
        let mut state = activated_at(1000, 3820);
        assert_matches!(
            state.check_advance(1, 3880, 6700),
            Err(ServiceError::NextProvingPeriodAlreadyCalled { deadline: 3880, epoch: 3880, .. })
        );

        // unproven, advanced right after the deadline
        let advance = state.check_advance(1, 3881, 6700).unwrap();
        assert_eq!(advance.kind, AdvanceKind::Advanced);
        assert_eq!(advance.next_deadline, 6760);
        assert_eq!(advance.faulted_periods, 1);

        // proven, then two whole periods skipped
        state.record_proof(0);
        let advance = state.check_advance(1, 3880 + 2 * 2880 + 1, 12_500).unwrap();
        assert_eq!(advance.next_deadline, 3880 + 3 * 2880);
        assert_eq!(advance.faulted_periods, 2);
        state.apply_advance(&advance);
        assert!(!state.proven_this_period);
        assert!(state.is_period_proven(0));
    }

    #[test]
    fn test_close_and_reopen() {
        let mut state = activated_at(1000, 3820);
        state.record_proof(0);

        let close = state.check_advance(1, 4000, NO_CHALLENGE_SCHEDULED).unwrap();
        assert_eq!(close.kind, AdvanceKind::Closed);
        assert_eq!(close.faulted_periods, 0);
        state.apply_advance(&close);
        assert!(!state.is_open());
        assert_eq!(state.check_proof(1, 4000, 5), Err(ServiceError::ProvingNotStarted(1)));

        let reopen = state.check_advance(1, 7000, 9600).unwrap();
        assert_eq!(reopen.kind, AdvanceKind::Reopened);
        assert_eq!(reopen.next_deadline, 9640);
        assert_eq!(reopen.faulted_periods, 0);
        state.apply_advance(&reopen);
        assert_eq!(state.activation_epoch, 1000);
        assert_eq!(state.check_proof(1, 9600, 5), Ok(2));
    }

    proptest! {
        #[test]
        fn prop_deadlines_strictly_increase(lates in proptest::collection::vec(1u64..20_000, 1..20)) {
            let mut state = activated_at(1000, 3820);
            for late in lates {
                let epoch = state.proving_deadline + late;
                let next = state.proving_deadline + 2880 * (periods_skipped(state.proving_deadline, epoch, 2880) + 1);
                let advance = state.check_advance(1, epoch, next).unwrap();
                prop_assert!(advance.next_deadline > advance.previous_deadline);
                prop_assert!(advance.next_deadline >= epoch);
                prop_assert_eq!(advance.activation_epoch, 1000);
                state.apply_advance(&advance);
            }
        }

        #[test]
        fn prop_count_matches_naive(periods in proptest::collection::btree_set(0u64..500, 0..60), start in 0u64..500, len in 0u64..500) {
            let mut set = ProvenPeriods::default();
            for p in &periods {
                set.insert(*p);
            }
            let end = start + len;
            let naive = periods.iter().filter(|p| **p >= start && **p < end).count() as u64;
            prop_assert_eq!(set.count_in(start, end), naive);
        }
    }
}
