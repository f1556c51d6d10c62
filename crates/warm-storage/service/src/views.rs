//! Read-only views over the service state

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use warm_storage_primitives::{
    ChallengeWindow, DataSetId, Epoch, MetadataEntry, PieceId, ProviderId, RailId, ServicePricing,
    constants::INVALID_PERIOD, metadata,
};

use crate::{DataSet, NonceUsage, state::ServiceState};

/// Proving progress of a data set at a given epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvingStatus {
    /// Data set
    pub data_set_id: DataSetId,
    /// Epoch proving started, zero if never
    pub activation_epoch: Epoch,
    /// Deadline of the open period, zero if none
    pub proving_deadline: Epoch,
    /// Whether the open period has a proof
    pub proven_this_period: bool,
    /// Period containing the queried epoch
    pub current_period: Option<u64>,
    /// Window of the open period
    pub challenge_window: Option<ChallengeWindow>,
    /// Whether the queried epoch lies in that window
    pub in_challenge_window: bool,
    /// Periods proven so far
    pub proven_period_count: u64,
    /// Storage payment end epoch, zero while active
    pub payment_end_epoch: Epoch,
}

impl ServiceState {
    /// Data set by id
    pub fn data_set(&self, data_set_id: DataSetId) -> Option<&DataSet> {
        self.data_sets.get(&data_set_id)
    }

    /// Proving status of a data set at `epoch`
    pub fn proving_status(&self, data_set_id: DataSetId, epoch: Epoch) -> Option<ProvingStatus> {
        let data_set = self.data_sets.get(&data_set_id)?;
        let proving = self.proving.get(&data_set_id)?;

        let period = proving.schedule().period_containing(epoch);
        let challenge_window = proving.current_window();
        Some(ProvingStatus {
            data_set_id,
            activation_epoch: proving.activation_epoch,
            proving_deadline: proving.proving_deadline,
            proven_this_period: proving.proven_this_period,
            current_period: (period != INVALID_PERIOD).then_some(period),
            challenge_window,
            in_challenge_window: challenge_window.is_some_and(|window| window.contains(epoch)),
            proven_period_count: proving.proven_periods.len(),
            payment_end_epoch: data_set.pdp_end_epoch,
        })
    }

    /// Whether `period` of a data set has a proof
    pub fn is_period_proven(&self, data_set_id: DataSetId, period: u64) -> bool {
        self.proving.get(&data_set_id).is_some_and(|proving| proving.is_period_proven(period))
    }

    /// Live data sets paid by `payer`
    pub fn payer_data_sets(&self, payer: Address) -> &[DataSetId] {
        self.payer_data_sets.get(&payer).map(Vec::as_slice).unwrap_or_default()
    }

    /// All data set metadata
    pub fn all_data_set_metadata(&self, data_set_id: DataSetId) -> Option<&[MetadataEntry]> {
        self.data_sets.get(&data_set_id).map(|data_set| data_set.metadata.as_slice())
    }

    /// Data set metadata value under `key`
    pub fn data_set_metadata(&self, data_set_id: DataSetId, key: &str) -> Option<&str> {
        metadata::value_of(self.all_data_set_metadata(data_set_id)?, key)
    }

    /// All metadata of a piece
    pub fn all_piece_metadata(
        &self,
        data_set_id: DataSetId,
        piece_id: PieceId,
    ) -> Option<&[MetadataEntry]> {
        self.data_sets.get(&data_set_id)?.piece_metadata.get(&piece_id).map(Vec::as_slice)
    }

    /// Piece metadata value under `key`
    pub fn piece_metadata(&self, data_set_id: DataSetId, piece_id: PieceId, key: &str) -> Option<&str> {
        metadata::value_of(self.all_piece_metadata(data_set_id, piece_id)?, key)
    }

    /// Data set created under a payer's client data set id, even if since deleted
    pub fn client_data_set_owner(&self, payer: Address, client_data_set_id: U256) -> Option<DataSetId> {
        self.nonces.client_data_set(payer, client_data_set_id)
    }

    /// Usage of an add-piece nonce
    pub fn add_piece_nonce_usage(&self, payer: Address, nonce: U256) -> Option<NonceUsage> {
        self.nonces.add_piece_nonce(payer, nonce)
    }

    /// Next client data set id of `payer` under the counter scheme
    pub fn next_client_data_set_id(&self, payer: Address) -> u64 {
        self.payer_counters.get(&payer).copied().unwrap_or_default()
    }

    /// Live data set owning `rail_id`
    pub fn data_set_by_rail(&self, rail_id: RailId) -> Option<DataSetId> {
        self.rail_to_data_set.get(&rail_id).copied()
    }

    /// Public price sheet
    pub fn service_pricing(&self) -> ServicePricing {
        ServicePricing::new(&self.config.pricing, self.config.token)
    }

    /// Approved provider ids in ascending order
    pub fn approved_providers(&self) -> Vec<ProviderId> {
        self.approved_providers.iter().copied().collect()
    }

    /// Whether `provider_id` is approved
    pub fn is_provider_approved(&self, provider_id: ProviderId) -> bool {
        self.approved_providers.contains(&provider_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProvingState;
    use std::collections::BTreeMap;
    use warm_storage_primitives::ProvingParams;

    fn state() -> ServiceState {
        let mut state = ServiceState::default();
        let mut piece_metadata = BTreeMap::new();
        piece_metadata.insert(4, vec![MetadataEntry::new("label", "cat.jpg")]);
        state.data_sets.insert(
            1,
            DataSet {
                id: 1,
                payer: Address::repeat_byte(1),
                service_provider: Address::repeat_byte(2),
                payee: Address::repeat_byte(3),
                provider_id: 1,
                client_data_set_id: U256::from(0),
                pdp_rail_id: 5,
                cache_miss_rail_id: None,
                cdn_rail_id: None,
                commission_bps: 0,
                pdp_end_epoch: 0,
                with_cdn: false,
                metadata: vec![MetadataEntry::new("region", "eu")],
                piece_metadata,
                pieces_added: 5,
            },
        );
        let mut proving = ProvingState::new(ProvingParams::new(2880, 60));
        proving.activation_epoch = 1000;
        proving.proving_deadline = 3880;
        state.proving.insert(1, proving);
        state.payer_data_sets.insert(Address::repeat_byte(1), vec![1]);
        state.rail_to_data_set.insert(5, 1);
        state
    }

    #[test]
    fn test_proving_status() {
        let state = state();
        let status = state.proving_status(1, 3830).unwrap();
        assert_eq!(status.current_period, Some(0));
        assert_eq!(status.challenge_window, Some(ChallengeWindow { start: 3820, end: 3880 }));
        assert!(status.in_challenge_window);
        assert_eq!(state.proving_status(1, 3880).unwrap().current_period, Some(0));
        assert!(!state.proving_status(1, 3000).unwrap().in_challenge_window);
        assert_eq!(state.proving_status(1, 500).unwrap().current_period, None);
        assert!(state.proving_status(2, 3830).is_none());
    }

    #[test]
    fn test_metadata_lookups() {
        let state = state();
        assert_eq!(state.data_set_metadata(1, "region"), Some("eu"));
        assert_eq!(state.data_set_metadata(1, "withCDN"), None);
        assert_eq!(state.piece_metadata(1, 4, "label"), Some("cat.jpg"));
        assert_eq!(state.piece_metadata(1, 3, "label"), None);
    }

    #[test]
    fn test_index_lookups() {
        let state = state();
        assert_eq!(state.payer_data_sets(Address::repeat_byte(1)), &[1]);
        assert!(state.payer_data_sets(Address::repeat_byte(9)).is_empty());
        assert_eq!(state.data_set_by_rail(5), Some(1));
        assert_eq!(state.data_set_by_rail(6), None);
        assert_eq!(state.next_client_data_set_id(Address::repeat_byte(1)), 0);
    }
}
