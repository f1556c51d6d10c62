//! Data set records and the replay registry

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use warm_storage_primitives::{
    DataSetId, Epoch, MetadataEntry, PieceId, ProviderId, RailId,
    constants::WITH_CDN_METADATA_KEY,
};

/// One storage deal between a payer and a service provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSet {
    /// Handle assigned by the proof verifier
    pub id: DataSetId,
    /// Paying client
    pub payer: Address,
    /// Provider operating the data set
    pub service_provider: Address,
    /// Storage payment recipient, resolved from the registry
    pub payee: Address,
    /// Registry id of the service provider
    pub provider_id: ProviderId,
    /// Payer-scoped identifier
    pub client_data_set_id: U256,
    /// Storage rail
    pub pdp_rail_id: RailId,
    /// Cache-miss egress rail, present with the CDN add-on
    pub cache_miss_rail_id: Option<RailId>,
    /// CDN egress rail, present with the CDN add-on
    pub cdn_rail_id: Option<RailId>,
    /// Commission snapshotted at creation
    pub commission_bps: u16,
    /// Storage rail end epoch, zero while active
    pub pdp_end_epoch: Epoch,
    /// CDN opt-in as a dedicated flag
    pub with_cdn: bool,
    /// Data set scoped metadata
    pub metadata: Vec<MetadataEntry>,
    /// Metadata per piece
    pub piece_metadata: BTreeMap<PieceId, Vec<MetadataEntry>>,
    /// Pieces added over the data set's lifetime
    pub pieces_added: u64,
}

impl DataSet {
    /// Whether the storage payment was terminated
    pub const fn is_terminated(&self) -> bool {
        self.pdp_end_epoch != 0
    }

    /// Whether the storage payment ended before `epoch`
    pub const fn is_past_end(&self, epoch: Epoch) -> bool {
        self.is_terminated() && epoch > self.pdp_end_epoch
    }

    /// Whether the data set pays for CDN egress
    pub const fn has_cdn_rails(&self) -> bool {
        self.cdn_rail_id.is_some() && self.cache_miss_rail_id.is_some()
    }

    /// Every rail opened for this data set
    pub fn rail_ids(&self) -> impl Iterator<Item = RailId> + '_ {
        std::iter::once(self.pdp_rail_id).chain(self.cache_miss_rail_id).chain(self.cdn_rail_id)
    }

    /// Drop the CDN opt-in marker in both representations
    pub fn strip_cdn_marker(&mut self) {
        self.with_cdn = false;
        self.metadata.retain(|entry| entry.key != WITH_CDN_METADATA_KEY);
    }
}

/// Usage marker of an add-piece nonce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceUsage {
    /// Data set the pieces were added to
    pub data_set_id: DataSetId,
    /// Pieces in the data set after the addition
    pub piece_count: u64,
}

/// Write-once replay registry per payer
///
/// Entries outlive the data sets they point to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceRegistry {
    client_data_set_ids: BTreeMap<Address, BTreeMap<U256, DataSetId>>,
    add_piece_nonces: BTreeMap<Address, BTreeMap<U256, NonceUsage>>,
}

impl NonceRegistry {
    /// Data set created under `client_data_set_id`
    pub fn client_data_set(&self, payer: Address, client_data_set_id: U256) -> Option<DataSetId> {
        self.client_data_set_ids.get(&payer)?.get(&client_data_set_id).copied()
    }

    /// Usage of an add-piece nonce
    pub fn add_piece_nonce(&self, payer: Address, nonce: U256) -> Option<NonceUsage> {
        self.add_piece_nonces.get(&payer)?.get(&nonce).copied()
    }

    pub(crate) fn record_client_data_set(
        &mut self,
        payer: Address,
        client_data_set_id: U256,
        data_set_id: DataSetId,
    ) {
        self.client_data_set_ids.entry(payer).or_default().insert(client_data_set_id, data_set_id);
    }

    pub(crate) fn record_add_piece_nonce(&mut self, payer: Address, nonce: U256, usage: NonceUsage) {
        self.add_piece_nonces.entry(payer).or_default().insert(nonce, usage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_cdn_marker() {
        let mut data_set = DataSet {
            id: 1,
            payer: Address::repeat_byte(1),
            service_provider: Address::repeat_byte(2),
            payee: Address::repeat_byte(3),
            provider_id: 1,
            client_data_set_id: U256::ZERO,
            pdp_rail_id: 1,
            cache_miss_rail_id: Some(2),
            cdn_rail_id: Some(3),
            commission_bps: 0,
            pdp_end_epoch: 0,
            with_cdn: true,
            metadata: vec![
                MetadataEntry::new("region", "eu"),
                MetadataEntry::new(WITH_CDN_METADATA_KEY, ""),
            ],
            piece_metadata: BTreeMap::new(),
            pieces_added: 0,
        };
        assert_eq!(data_set.rail_ids().collect::<Vec<_>>(), vec![1, 2, 3]);

        data_set.strip_cdn_marker();
        assert!(!data_set.with_cdn);
        assert_eq!(data_set.metadata, vec![MetadataEntry::new("region", "eu")]);
    }

    #[test]
    fn test_nonce_namespaces_are_separate() {
        let payer = Address::repeat_byte(1);
        let mut registry = NonceRegistry::default();
        registry.record_client_data_set(payer, U256::from(7), 11);

        assert_eq!(registry.client_data_set(payer, U256::from(7)), Some(11));
        assert_eq!(registry.add_piece_nonce(payer, U256::from(7)), None);
        assert_eq!(registry.client_data_set(Address::repeat_byte(2), U256::from(7)), None);

        registry.record_add_piece_nonce(payer, U256::from(7), NonceUsage { data_set_id: 11, piece_count: 3 });
        assert_eq!(
            registry.add_piece_nonce(payer, U256::from(7)),
            Some(NonceUsage { data_set_id: 11, piece_count: 3 })
        );
    }

    #[test]
    fn test_registry_json_round_trip() {
        let mut registry = NonceRegistry::default();
        registry.record_client_data_set(Address::repeat_byte(1), U256::from(5), 2);
        registry.record_add_piece_nonce(
            Address::repeat_byte(1),
            U256::from(9),
            NonceUsage { data_set_id: 2, piece_count: 1 },
        );
        let json = serde_json::to_string(&registry).unwrap();
        assert_eq!(serde_json::from_str::<NonceRegistry>(&json).unwrap(), registry);
    }
}
