//! Fault-aware settlement arbitration
//!
//! When the ledger settles the storage rail over `(from, to]` it asks this
//! service how much of the proposed amount is owed. Only epochs covered by a
//! proven period are paid, and the settlement watermark stops at the start of
//! a trailing unproven period so it can still be paid once proven.
//!
//! ```text
//!           first (partial)        middle (whole)        last (partial)
//!  from ──►|.......D(s)|.............D(s+1)|...........D(e-1)|......to
//!          └ proven? ─┘ └─ proven? ────────┘                 └ proven? ┘
//! ```

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use warm_storage_primitives::{Epoch, RailId, TokenAmount};

use crate::{ProvingState, Result, ServiceError, state::ServiceState};

/// Answer to a settlement request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Amount the payee receives
    pub modified_amount: TokenAmount,
    /// Epoch up to which the rail is considered settled
    pub settle_up_to: Epoch,
    /// Explanation for the ledger
    pub note: String,
}

/// Proven epochs within a settlement range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvenEpochs {
    /// Epochs covered by proven periods
    pub count: u64,
    /// Settlement watermark
    pub settle_up_to: Epoch,
}

/// Count proven epochs in `(from, to]`
///
/// `proving` must be activated. `to` must lie in `[activation, current_epoch]`.
pub fn find_proven_epochs(
    proving: &ProvingState,
    from: Epoch,
    to: Epoch,
    current_epoch: Epoch,
) -> Result<ProvenEpochs> {
    let activation = proving.activation_epoch;
    if to < activation {
        return Err(ServiceError::SettlementBeforeActivation { to, activation });
    }
    if to > current_epoch {
        return Err(ServiceError::SettlementInFuture { to, current: current_epoch });
    }

    let from = from.max(activation.saturating_sub(1));
    let schedule = proving.schedule();
    let max_period = schedule.max_proving_period;

    let starting_period = schedule.period_containing(from + 1);
    let starting_deadline = schedule.period_deadline(starting_period);
    let starting_proven = proving.is_period_proven(starting_period);

    if to <= starting_deadline {
        return Ok(if starting_proven {
            ProvenEpochs { count: to - from, settle_up_to: to }
        } else {
            ProvenEpochs { count: 0, settle_up_to: from }
        });
    }

    let mut count = if starting_proven { starting_deadline - from } else { 0 };

    let ending_period = schedule.period_containing(to);
    let middle = proving.proven_periods.count_in(starting_period + 1, ending_period);
    count = middle
        .checked_mul(max_period)
        .and_then(|epochs| epochs.checked_add(count))
        .ok_or(ServiceError::Overflow("proven epochs"))?;

    let mut settle_up_to = schedule.period_deadline(ending_period - 1);
    if proving.is_period_proven(ending_period) {
        count += to - settle_up_to;
        settle_up_to = to;
    }

    Ok(ProvenEpochs { count, settle_up_to })
}

impl ServiceState {
    /// Arbitrate a settlement of `proposed` over `(from, to]` on `rail_id`
    pub fn arbitrate(
        &self,
        rail_id: RailId,
        proposed: TokenAmount,
        from: Epoch,
        to: Epoch,
        rate: TokenAmount,
        current_epoch: Epoch,
    ) -> Result<ValidationOutcome> {
        let data_set_id =
            *self.rail_to_data_set.get(&rail_id).ok_or(ServiceError::RailNotAssociated(rail_id))?;
        if to <= from {
            return Err(ServiceError::InvalidEpochRange { from, to });
        }
        let data_set =
            self.data_sets.get(&data_set_id).ok_or(ServiceError::DataSetNotFound(data_set_id))?;

        if rail_id != data_set.pdp_rail_id {
            trace!(target: "warm_storage::arbitration", rail_id, data_set_id, "egress rail passes through");
            return Ok(ValidationOutcome {
                modified_amount: proposed,
                settle_up_to: to,
                note: String::new(),
            });
        }

        let proving =
            self.proving.get(&data_set_id).ok_or(ServiceError::DataSetNotFound(data_set_id))?;
        if !proving.is_active() {
            return Ok(ValidationOutcome {
                modified_amount: U256::ZERO,
                settle_up_to: from,
                note: "proving period not yet initialized".to_string(),
            });
        }

        let proven = find_proven_epochs(proving, from, to, current_epoch)?;
        let total = to - from;
        debug!(
            target: "warm_storage::arbitration",
            rail_id,
            data_set_id,
            from,
            to,
            %rate,
            proven_epochs = proven.count,
            settle_up_to = proven.settle_up_to,
            "arbitrated settlement"
        );

        if proven.count == 0 {
            return Ok(ValidationOutcome {
                modified_amount: U256::ZERO,
                settle_up_to: proven.settle_up_to,
                note: "no proven epochs in the requested range".to_string(),
            });
        }

        let modified_amount = proposed
            .checked_mul(U256::from(proven.count))
            .ok_or(ServiceError::Overflow("modified amount"))?
            .checked_div(U256::from(total))
            .ok_or(ServiceError::DivisionByZero("modified amount"))?;

        Ok(ValidationOutcome {
            modified_amount,
            settle_up_to: proven.settle_up_to,
            note: format!("proven epochs: {} of {}", proven.count, total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use warm_storage_primitives::ProvingParams;

    const M: u64 = 2880;

    fn proving(activation: Epoch, proven: &[u64]) -> ProvingState {
        let mut state = ProvingState::new(ProvingParams::new(M, 60));
        state.activation_epoch = activation;
        state.proving_deadline = activation + M;
        for period in proven {
            state.proven_periods.insert(*period);
        }
        state
    }

    #[test]
    fn test_range_bounds() {
        let state = proving(1000, &[]);
        assert_eq!(
            find_proven_epochs(&state, 0, 999, 5000),
            Err(ServiceError::SettlementBeforeActivation { to: 999, activation: 1000 })
        );
        assert_eq!(
            find_proven_epochs(&state, 1000, 5001, 5000),
            Err(ServiceError::SettlementInFuture { to: 5001, current: 5000 })
        );
    }

    #[test]
    fn test_inside_first_period() {
        let unproven = proving(1000, &[]);
        assert_eq!(
            find_proven_epochs(&unproven, 1500, 2000, 9000),
            Ok(ProvenEpochs { count: 0, settle_up_to: 1500 })
        );

        let proven = proving(1000, &[0]);
        assert_eq!(
            find_proven_epochs(&proven, 1500, 2000, 9000),
            Ok(ProvenEpochs { count: 500, settle_up_to: 2000 })
        );
    }

    #[test]
    fn test_from_clamped_to_activation() {
        let state = proving(1000, &[0]);
        // (999, 2000] is the counted range
        assert_eq!(
            find_proven_epochs(&state, 0, 2000, 9000),
            Ok(ProvenEpochs { count: 1001, settle_up_to: 2000 })
        );
    }

    #[test]
    fn test_multi_period_walk() {
        // deadlines: 3880, 6760, 9640, 12520
        let state = proving(1000, &[0, 2]);
        let proven = find_proven_epochs(&state, 2000, 11_000, 20_000).unwrap();
        // first: 3880 - 2000, middle: period 2 whole, last (period 3) unproven
        assert_eq!(proven, ProvenEpochs { count: 1880 + M, settle_up_to: 9640 });

        let state = proving(1000, &[0, 1, 2, 3]);
        assert_eq!(
            find_proven_epochs(&state, 2000, 11_000, 20_000),
            Ok(ProvenEpochs { count: 9000, settle_up_to: 11_000 })
        );
    }

    #[test]
    fn test_range_ending_on_deadline() {
        let state = proving(1000, &[0]);
        assert_eq!(
            find_proven_epochs(&state, 999, 3880, 9000),
            Ok(ProvenEpochs { count: 2881, settle_up_to: 3880 })
        );
    }

    #[test]
    fn test_deadline_epoch_belongs_to_its_period() {
        // (3879, 6760] starts with epoch 3880, the deadline of period 0
        let later_only = proving(1000, &[1]);
        assert_eq!(
            find_proven_epochs(&later_only, 3879, 6760, 9000),
            Ok(ProvenEpochs { count: M, settle_up_to: 6760 })
        );

        let first_only = proving(1000, &[0]);
        assert_eq!(
            find_proven_epochs(&first_only, 3879, 3880, 9000),
            Ok(ProvenEpochs { count: 1, settle_up_to: 3880 })
        );
        assert_eq!(
            find_proven_epochs(&first_only, 3879, 6760, 9000),
            Ok(ProvenEpochs { count: 1, settle_up_to: 3880 })
        );
    }

    fn state_with(proving_state: ProvingState) -> ServiceState {
        let mut state = ServiceState::default();
        state.rail_to_data_set.insert(10, 1);
        state.rail_to_data_set.insert(11, 1);
        state.data_sets.insert(
            1,
            crate::DataSet {
                id: 1,
                payer: alloy_primitives::Address::repeat_byte(1),
                service_provider: alloy_primitives::Address::repeat_byte(2),
                payee: alloy_primitives::Address::repeat_byte(3),
                provider_id: 1,
                client_data_set_id: U256::ZERO,
                pdp_rail_id: 10,
                cache_miss_rail_id: Some(11),
                cdn_rail_id: None,
                commission_bps: 0,
                pdp_end_epoch: 0,
                with_cdn: false,
                metadata: vec![],
                piece_metadata: Default::default(),
                pieces_added: 0,
            },
        );
        state.proving.insert(1, proving_state);
        state
    }

    #[test]
    fn test_arbitrate_request_validation() {
        let state = state_with(proving(1000, &[0]));
        assert_eq!(
            state.arbitrate(99, U256::from(1), 0, 10, U256::ZERO, 100),
            Err(ServiceError::RailNotAssociated(99))
        );
        assert_eq!(
            state.arbitrate(10, U256::from(1), 10, 10, U256::ZERO, 100),
            Err(ServiceError::InvalidEpochRange { from: 10, to: 10 })
        );
    }

    #[test]
    fn test_egress_rail_passes_through() {
        let state = state_with(ProvingState::new(ProvingParams::new(M, 60)));
        let outcome = state.arbitrate(11, U256::from(777), 5, 50, U256::ZERO, 100).unwrap();
        assert_eq!(outcome.modified_amount, U256::from(777));
        assert_eq!(outcome.settle_up_to, 50);
    }

    #[test]
    fn test_never_activated() {
        let state = state_with(ProvingState::new(ProvingParams::new(M, 60)));
        let outcome = state.arbitrate(10, U256::from(2880), 0, 2880, U256::from(1), 3000).unwrap();
        assert_eq!(outcome.modified_amount, U256::ZERO);
        assert_eq!(outcome.settle_up_to, 0);
        assert!(!outcome.note.is_empty());
    }

    #[test]
    fn test_partial_payment() {
        let state = state_with(proving(1000, &[0, 2]));
        let outcome = state.arbitrate(10, U256::from(9000), 2000, 11_000, U256::from(1), 20_000).unwrap();
        assert_eq!(outcome.modified_amount, U256::from(9000u64 * (1880 + M) / 9000));
        assert_eq!(outcome.settle_up_to, 9640);
    }

    #[test]
    fn test_unproven_range_pays_nothing() {
        let state = state_with(proving(1000, &[]));
        assert_matches!(
            state.arbitrate(10, U256::from(100), 1000, 8000, U256::from(1), 8000),
            Ok(ValidationOutcome { modified_amount, settle_up_to: 6760, .. }) if modified_amount.is_zero()
        );
    }

    proptest! {
        #[test]
        fn prop_fully_proven_pays_in_full(from in 999u64..30_000, len in 1u64..30_000, proposed in 0u64..u64::MAX) {
            let state = state_with(proving(1000, &(0..30).collect::<Vec<_>>()));
            let to = from + len;
            let outcome = state.arbitrate(10, U256::from(proposed), from, to, U256::ZERO, to).unwrap();
            prop_assert_eq!(outcome.settle_up_to, to);
            if proposed > 0 {
                prop_assert_eq!(outcome.modified_amount, U256::from(proposed));
            }
        }

        #[test]
        fn prop_proven_never_exceeds_range(
            proven in proptest::collection::btree_set(0u64..20, 0..20),
            from in 999u64..40_000,
            len in 1u64..40_000,
        ) {
            let periods: Vec<u64> = proven.into_iter().collect();
            let state = proving(1000, &periods);
            let to = from + len;
            let result = find_proven_epochs(&state, from, to, to).unwrap();
            prop_assert!(result.count <= to - from);
            prop_assert!(result.settle_up_to >= from && result.settle_up_to <= to);
        }
    }
}
