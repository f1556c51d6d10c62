//! Owned service state and its versioned snapshot schema
//!
//! Version 1 stored the CDN opt-in as a boolean on each data set, kept no
//! provider ids and approved providers by address. Version 2 resolves
//! provider ids through the registry and mirrors the CDN opt-in into the
//! `withCDN` metadata key when that is the configured representation.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};
use warm_storage_primitives::{
    CdnFlagMode, DataSetId, Epoch, MetadataEntry, PieceId, ProviderId, RailId, ServiceConfig,
    constants::WITH_CDN_METADATA_KEY, metadata,
};

use crate::{
    DataSet, NonceRegistry, ProvingState, Result, ServiceError, registry::ProviderRegistry,
};

/// Everything the service owns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    /// Active configuration
    pub config: ServiceConfig,
    /// Live data sets
    pub data_sets: BTreeMap<DataSetId, DataSet>,
    /// Proving state per live data set
    pub proving: BTreeMap<DataSetId, ProvingState>,
    /// Replay registry, kept across deletions
    pub nonces: NonceRegistry,
    /// Live data sets per payer
    pub payer_data_sets: BTreeMap<Address, Vec<DataSetId>>,
    /// Reverse mapping of every rail opened for a live data set
    pub rail_to_data_set: BTreeMap<RailId, DataSetId>,
    /// Providers allowed to create data sets
    pub approved_providers: BTreeSet<ProviderId>,
    /// Next client data set id per payer under the counter scheme
    pub payer_counters: BTreeMap<Address, u64>,
}

impl ServiceState {
    /// Empty state under `config`
    pub fn new(config: ServiceConfig) -> Self {
        Self { config, ..Default::default() }
    }
}

/// Data set as stored by schema version 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSetV1 {
    /// Handle assigned by the proof verifier
    pub id: DataSetId,
    /// Paying client
    pub payer: Address,
    /// Provider operating the data set
    pub service_provider: Address,
    /// Storage payment recipient
    pub payee: Address,
    /// Payer-scoped identifier
    pub client_data_set_id: U256,
    /// Storage rail
    pub pdp_rail_id: RailId,
    /// Cache-miss rail
    pub cache_miss_rail_id: Option<RailId>,
    /// CDN rail
    pub cdn_rail_id: Option<RailId>,
    /// Commission snapshotted at creation
    pub commission_bps: u16,
    /// Storage rail end epoch
    pub pdp_end_epoch: Epoch,
    /// Legacy CDN opt-in
    pub with_cdn: bool,
    /// Data set metadata
    pub metadata: Vec<MetadataEntry>,
    /// Metadata per piece
    pub piece_metadata: BTreeMap<PieceId, Vec<MetadataEntry>>,
    /// Pieces added
    pub pieces_added: u64,
}

/// Service state as stored by schema version 1
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStateV1 {
    /// Configuration
    pub config: ServiceConfig,
    /// Data sets
    pub data_sets: BTreeMap<DataSetId, DataSetV1>,
    /// Proving state
    pub proving: BTreeMap<DataSetId, ProvingState>,
    /// Replay registry
    pub nonces: NonceRegistry,
    /// Data sets per payer
    pub payer_data_sets: BTreeMap<Address, Vec<DataSetId>>,
    /// Rail reverse mapping
    pub rail_to_data_set: BTreeMap<RailId, DataSetId>,
    /// Approved provider addresses
    pub approved_providers: BTreeSet<Address>,
    /// Client id counters
    pub payer_counters: BTreeMap<Address, u64>,
}

/// Persisted state tagged by schema version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "version", content = "state")]
pub enum StateSnapshot {
    /// Legacy schema
    #[serde(rename = "1")]
    V1(ServiceStateV1),
    /// Current schema
    #[serde(rename = "2")]
    V2(ServiceState),
}

impl StateSnapshot {
    /// Schema version written by this crate
    pub const CURRENT_VERSION: u32 = 2;

    /// Schema version of this snapshot
    pub const fn version(&self) -> u32 {
        match self {
            Self::V1(_) => 1,
            Self::V2(_) => 2,
        }
    }

    /// Decode a JSON snapshot
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|err| ServiceError::Snapshot(err.to_string()))
    }

    /// Encode as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| ServiceError::Snapshot(err.to_string()))
    }

    /// Migrate to the current schema, resolving provider ids via `registry`
    pub fn into_current<R>(self, registry: &R) -> Result<ServiceState>
    where
        R: ProviderRegistry + ?Sized,
    {
        match self {
            Self::V2(state) => Ok(state),
            Self::V1(legacy) => migrate_v1(legacy, registry),
        }
    }
}

fn migrate_v1<R>(legacy: ServiceStateV1, registry: &R) -> Result<ServiceState>
where
    R: ProviderRegistry + ?Sized,
{
    let mirror_cdn_key = legacy.config.versioning.cdn_flag == CdnFlagMode::MetadataKey;

    let mut data_sets = BTreeMap::new();
    for (id, old) in legacy.data_sets {
        let provider_id = registry.provider_id(old.service_provider).ok_or(
            ServiceError::MigrationUnknownProvider { data_set_id: id, provider: old.service_provider },
        )?;

        let mut data_set_metadata = old.metadata;
        if mirror_cdn_key && old.with_cdn && !metadata::has_key(&data_set_metadata, WITH_CDN_METADATA_KEY)
        {
            data_set_metadata.push(MetadataEntry::new(WITH_CDN_METADATA_KEY, ""));
        }

        data_sets.insert(
            id,
            DataSet {
                id: old.id,
                payer: old.payer,
                service_provider: old.service_provider,
                payee: old.payee,
                provider_id,
                client_data_set_id: old.client_data_set_id,
                pdp_rail_id: old.pdp_rail_id,
                cache_miss_rail_id: old.cache_miss_rail_id,
                cdn_rail_id: old.cdn_rail_id,
                commission_bps: old.commission_bps,
                pdp_end_epoch: old.pdp_end_epoch,
                with_cdn: old.with_cdn,
                metadata: data_set_metadata,
                piece_metadata: old.piece_metadata,
                pieces_added: old.pieces_added,
            },
        );
    }

    let mut approved_providers = BTreeSet::new();
    for address in legacy.approved_providers {
        match registry.provider_id(address) {
            Some(id) => {
                approved_providers.insert(id);
            }
            None => {
                warn!(target: "warm_storage::state", %address, "dropping approval of unregistered provider");
            }
        }
    }

    info!(target: "warm_storage::state", data_sets = data_sets.len(), "migrated state snapshot from version 1");

    Ok(ServiceState {
        config: legacy.config,
        data_sets,
        proving: legacy.proving,
        nonces: legacy.nonces,
        payer_data_sets: legacy.payer_data_sets,
        rail_to_data_set: legacy.rail_to_data_set,
        approved_providers,
        payer_counters: legacy.payer_counters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryProviderRegistry;
    use assert_matches::assert_matches;

    fn legacy_data_set(id: DataSetId, provider: Address, with_cdn: bool) -> DataSetV1 {
        DataSetV1 {
            id,
            payer: Address::repeat_byte(0xaa),
            service_provider: provider,
            payee: Address::repeat_byte(0xbb),
            client_data_set_id: U256::from(id),
            pdp_rail_id: id * 3,
            cache_miss_rail_id: with_cdn.then_some(id * 3 + 1),
            cdn_rail_id: with_cdn.then_some(id * 3 + 2),
            commission_bps: 100,
            pdp_end_epoch: 0,
            with_cdn,
            metadata: vec![],
            piece_metadata: BTreeMap::new(),
            pieces_added: 0,
        }
    }

    #[test]
    fn test_v1_migration_resolves_provider_and_cdn_key() {
        let provider = Address::repeat_byte(0x01);
        let mut registry = InMemoryProviderRegistry::new();
        let provider_id = registry.register(provider, Address::repeat_byte(0xbb));

        let mut legacy = ServiceStateV1::default();
        legacy.data_sets.insert(1, legacy_data_set(1, provider, true));
        legacy.data_sets.insert(2, legacy_data_set(2, provider, false));
        legacy.approved_providers.insert(provider);
        legacy.approved_providers.insert(Address::repeat_byte(0x99));

        let state = StateSnapshot::V1(legacy).into_current(&registry).unwrap();
        assert_eq!(state.data_sets[&1].provider_id, provider_id);
        assert!(metadata::has_key(&state.data_sets[&1].metadata, WITH_CDN_METADATA_KEY));
        assert!(state.data_sets[&2].metadata.is_empty());
        assert_eq!(state.approved_providers, BTreeSet::from([provider_id]));
    }

    #[test]
    fn test_v1_migration_unknown_provider() {
        let registry = InMemoryProviderRegistry::new();
        let mut legacy = ServiceStateV1::default();
        legacy.data_sets.insert(4, legacy_data_set(4, Address::repeat_byte(0x05), false));

        assert_matches!(
            StateSnapshot::V1(legacy).into_current(&registry),
            Err(ServiceError::MigrationUnknownProvider { data_set_id: 4, .. })
        );
    }

    #[test]
    fn test_snapshot_json_carries_version_tag() {
        let snapshot = StateSnapshot::V2(ServiceState::default());
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"version\": \"2\""));

        let decoded = StateSnapshot::from_json(&json).unwrap();
        assert_eq!(decoded.version(), StateSnapshot::CURRENT_VERSION);
        assert_eq!(decoded, snapshot);

        assert_matches!(StateSnapshot::from_json("{\"version\":\"3\"}"), Err(ServiceError::Snapshot(_)));
    }
}
