//! Records emitted by state transitions

use alloy_primitives::{Address, U256};
use warm_storage_primitives::{
    DataSetId, Epoch, MetadataEntry, PieceId, ProviderId, ProvingParams, RailId, TokenAmount,
};

/// Observable outcome of a successful call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    /// Data set registered and its rails opened
    DataSetCreated {
        /// Data set
        data_set_id: DataSetId,
        /// Registry id of the provider
        provider_id: ProviderId,
        /// Storage rail
        pdp_rail_id: RailId,
        /// Cache-miss rail, if any
        cache_miss_rail_id: Option<RailId>,
        /// CDN rail, if any
        cdn_rail_id: Option<RailId>,
        /// Payer
        payer: Address,
        /// Service provider
        service_provider: Address,
        /// Payee
        payee: Address,
        /// Data set metadata
        metadata: Vec<MetadataEntry>,
    },

    /// Pieces added with their metadata
    PiecesAdded {
        /// Data set
        data_set_id: DataSetId,
        /// New piece ids
        piece_ids: Vec<PieceId>,
        /// Nonce consumed
        nonce: U256,
    },

    /// Payer authorized removal of pieces
    PieceRemovalsScheduled {
        /// Data set
        data_set_id: DataSetId,
        /// Pieces to remove
        piece_ids: Vec<PieceId>,
    },

    /// Proof accepted for a period
    PossessionProven {
        /// Data set
        data_set_id: DataSetId,
        /// Period proven
        period: u64,
        /// Epoch of the proof
        epoch: Epoch,
    },

    /// Proving period opened, advanced or closed
    NextProvingPeriod {
        /// Data set
        data_set_id: DataSetId,
        /// Scheduled challenge epoch, zero when closed
        challenge_epoch: Epoch,
        /// New deadline, zero when closed
        deadline: Epoch,
        /// Leaves in the data set
        leaf_count: u64,
    },

    /// Periods ended without a proof
    FaultRecord {
        /// Data set
        data_set_id: DataSetId,
        /// Number of faulted periods
        periods_faulted: u64,
        /// Deadline of the last faulted period
        deadline: Epoch,
    },

    /// Storage rail re-priced
    RailRateUpdated {
        /// Data set
        data_set_id: DataSetId,
        /// Rail
        rail_id: RailId,
        /// New rate per epoch
        rate: TokenAmount,
    },

    /// Service terminated by payer or provider
    ServiceTerminated {
        /// Caller
        caller: Address,
        /// Data set
        data_set_id: DataSetId,
        /// Storage rail
        pdp_rail_id: RailId,
        /// Cache-miss rail, if terminated with it
        cache_miss_rail_id: Option<RailId>,
        /// CDN rail, if terminated with it
        cdn_rail_id: Option<RailId>,
    },

    /// Storage payment end epoch recorded
    PdpPaymentTerminated {
        /// Data set
        data_set_id: DataSetId,
        /// Last payable epoch
        end_epoch: Epoch,
        /// Storage rail
        pdp_rail_id: RailId,
    },

    /// Data set and its local state purged
    DataSetDeleted {
        /// Data set
        data_set_id: DataSetId,
        /// Leaves removed with it
        deleted_leaf_count: u64,
    },

    /// Data set moved to another provider
    ProviderChanged {
        /// Data set
        data_set_id: DataSetId,
        /// Previous provider
        old_service_provider: Address,
        /// New provider
        new_service_provider: Address,
        /// Registry id of the new provider
        provider_id: ProviderId,
    },

    /// Payer increased CDN fixed lockups
    CdnPaymentRailsToppedUp {
        /// Data set
        data_set_id: DataSetId,
        /// CDN lockup after top-up
        cdn_lockup: TokenAmount,
        /// Cache-miss lockup after top-up
        cache_miss_lockup: TokenAmount,
    },

    /// CDN usage charged from fixed lockups
    CdnPaymentSettled {
        /// Data set
        data_set_id: DataSetId,
        /// Charged on the CDN rail
        cdn_amount: TokenAmount,
        /// Charged on the cache-miss rail
        cache_miss_amount: TokenAmount,
    },

    /// Provider added to the approved list
    ProviderApproved(ProviderId),

    /// Provider removed from the approved list
    ProviderUnapproved(ProviderId),

    /// Proving parameters for new data sets changed
    ProvingParamsUpdated(ProvingParams),

    /// Commission for new data sets changed
    CommissionUpdated(u16),

    /// Price sheet changed
    PricingUpdated,
}
