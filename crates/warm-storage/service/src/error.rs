//! Service errors

use alloy_primitives::{Address, U256};
use thiserror::Error;
use warm_storage_auth::AuthError;
use warm_storage_primitives::{
    ChallengeWindow, ConfigError, DataSetId, Epoch, MetadataError, PricingError, ProviderId,
    RailId, TokenAmount,
};

use crate::ledger::LedgerError;

/// Result alias for service operations
pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

/// Warm storage service errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    // --- authorization ---
    /// Callback not sent by the proof verifier
    #[error("Caller {0} is not the PDP verifier")]
    OnlyPdpVerifier(Address),

    /// Callback not sent by the payments ledger
    #[error("Caller {0} is not the payments ledger")]
    OnlyPayments(Address),

    /// Configuration change not sent by the owner
    #[error("Caller {0} is not the owner")]
    OnlyOwner(Address),

    /// Operation restricted to the data set payer
    #[error("Caller {caller} is not the payer {payer}")]
    OnlyPayer {
        /// Caller
        caller: Address,
        /// Data set payer
        payer: Address,
    },

    /// Operation restricted to the CDN controller
    #[error("Caller {0} is not the CDN controller")]
    OnlyCdnController(Address),

    /// Termination requested by a third party
    #[error("Caller {caller} is neither payer nor payee of data set {data_set_id}")]
    CallerNotPayerOrPayee {
        /// Data set
        data_set_id: DataSetId,
        /// Caller
        caller: Address,
    },

    /// Address not known to the provider registry
    #[error("Provider {0} is not registered")]
    ProviderNotRegistered(Address),

    /// Provider id unknown or inactive in the registry
    #[error("Provider id {0} is not registered or inactive")]
    ProviderIdNotRegistered(ProviderId),

    /// Provider not on the approved list
    #[error("Provider id {0} is not approved")]
    ProviderNotApproved(ProviderId),

    /// Provider already on the approved list
    #[error("Provider id {0} is already approved")]
    ProviderAlreadyApproved(ProviderId),

    /// Provider change callbacks are disabled
    #[error("Provider change is disabled for data set {0}")]
    ProviderChangeDisabled(DataSetId),

    /// Provider change names the wrong current provider
    #[error("Old provider mismatch for data set {data_set_id}: expected {expected}, got {actual}")]
    OldProviderMismatch {
        /// Data set
        data_set_id: DataSetId,
        /// Recorded provider
        expected: Address,
        /// Provider named by the callback
        actual: Address,
    },

    // --- validation ---
    /// Payer signature rejected
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Metadata outside configured bounds
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Configuration outside bounds
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Rate calculation failed
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// Payments ledger rejected a call
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Required address is zero
    #[error("Address for {0} must be non-zero")]
    ZeroAddress(&'static str),

    /// Client data set id was already used by this payer
    #[error("Client data set id {client_data_set_id} already used by payer {payer}")]
    ClientDataSetIdAlreadyUsed {
        /// Payer
        payer: Address,
        /// Reused id
        client_data_set_id: U256,
    },

    /// Add-piece nonce was already used by this payer
    #[error("Nonce {nonce} already used by payer {payer}")]
    NonceAlreadyUsed {
        /// Payer
        payer: Address,
        /// Reused nonce
        nonce: U256,
    },

    /// Piece metadata list does not match the piece list
    #[error("Piece metadata length mismatch: {pieces} pieces, {metadata} metadata entries")]
    PieceMetadataLengthMismatch {
        /// Pieces added
        pieces: usize,
        /// Metadata lists supplied
        metadata: usize,
    },

    /// Data set id already registered
    #[error("Data set {0} already exists")]
    DataSetAlreadyExists(DataSetId),

    /// Data set id unknown
    #[error("Data set {0} not found")]
    DataSetNotFound(DataSetId),

    /// Rail not created by this service
    #[error("Rail {0} is not associated with any data set")]
    RailNotAssociated(RailId),

    // --- funding ---
    /// Payer has not approved this service as operator
    #[error("Payer {payer} has not approved operator {operator}")]
    OperatorNotApproved {
        /// Payer
        payer: Address,
        /// Service address
        operator: Address,
    },

    /// Remaining rate allowance below the minimum rate
    #[error("Insufficient rate allowance: required {required}, available {available}")]
    InsufficientRateAllowance {
        /// Minimum rate
        required: TokenAmount,
        /// Remaining allowance
        available: TokenAmount,
    },

    /// Remaining lockup allowance below the required lockup
    #[error("Insufficient lockup allowance: required {required}, available {available}")]
    InsufficientLockupAllowance {
        /// Required lockup
        required: TokenAmount,
        /// Remaining allowance
        available: TokenAmount,
    },

    /// Approval caps the lockup period below the service lockup period
    #[error("Insufficient max lockup period: required {required}, available {available}")]
    InsufficientMaxLockupPeriod {
        /// Service lockup period
        required: u64,
        /// Approved maximum
        available: u64,
    },

    /// Payer account cannot cover the required lockup
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// Required lockup
        required: TokenAmount,
        /// Funds not locked up
        available: TokenAmount,
    },

    // --- state machine ---
    /// A proof was already accepted in the current period
    #[error("Proof already submitted for the current period of data set {0}")]
    ProofAlreadySubmitted(DataSetId),

    /// Proof covers too few challenges
    #[error("Invalid challenge count {actual}, at least {required} required")]
    InvalidChallengeCount {
        /// Minimum challenges
        required: u64,
        /// Challenges proven
        actual: u64,
    },

    /// No proving period is open
    #[error("Proving not started for data set {0}")]
    ProvingNotStarted(DataSetId),

    /// First proving period cannot start at the genesis epoch
    #[error("Cannot activate proving for data set {0} at epoch 0")]
    ActivationAtGenesis(DataSetId),

    /// Proof arrived after the deadline
    #[error("Proving period passed for data set {data_set_id}: deadline {deadline}, epoch {epoch}")]
    ProvingPeriodPassed {
        /// Data set
        data_set_id: DataSetId,
        /// Current deadline
        deadline: Epoch,
        /// Current epoch
        epoch: Epoch,
    },

    /// Proof arrived before the challenge window opened
    #[error("Challenge window not started for data set {data_set_id}: window {window}, epoch {epoch}")]
    ChallengeWindowNotStarted {
        /// Data set
        data_set_id: DataSetId,
        /// Current window
        window: ChallengeWindow,
        /// Current epoch
        epoch: Epoch,
    },

    /// Period advanced twice before its deadline passed
    #[error("Next proving period already called for data set {data_set_id}: deadline {deadline}, epoch {epoch}")]
    NextProvingPeriodAlreadyCalled {
        /// Data set
        data_set_id: DataSetId,
        /// Current deadline
        deadline: Epoch,
        /// Current epoch
        epoch: Epoch,
    },

    /// Challenge epoch outside the next deadline's window
    #[error("Invalid challenge epoch {challenge_epoch} for data set {data_set_id}, window {window}")]
    InvalidChallengeEpoch {
        /// Data set
        data_set_id: DataSetId,
        /// Requested challenge epoch
        challenge_epoch: Epoch,
        /// Allowed window
        window: ChallengeWindow,
    },

    /// Storage payment ended before the current epoch
    #[error("Payment for data set {data_set_id} ended at epoch {end_epoch}, current epoch {epoch}")]
    PaymentBeyondEndEpoch {
        /// Data set
        data_set_id: DataSetId,
        /// Storage rail end epoch
        end_epoch: Epoch,
        /// Current epoch
        epoch: Epoch,
    },

    /// Storage payment already terminated
    #[error("Payment for data set {0} already terminated")]
    PaymentAlreadyTerminated(DataSetId),

    /// Data set deleted before its storage rail finalized
    #[error("Payment rails of data set {data_set_id} not finalized: end epoch {end_epoch}, epoch {epoch}")]
    PaymentRailsNotFinalized {
        /// Data set
        data_set_id: DataSetId,
        /// Storage rail end epoch, zero while active
        end_epoch: Epoch,
        /// Current epoch
        epoch: Epoch,
    },

    /// Data set has no CDN add-on
    #[error("Data set {0} has no CDN payment rails")]
    NoCdnRails(DataSetId),

    /// CDN rail already terminated in the ledger
    #[error("CDN rail {0} is terminated")]
    CdnRailTerminated(RailId),

    /// Settlement exceeds the rail's fixed lockup
    #[error("Insufficient fixed lockup on rail {rail_id}: requested {requested}, available {available}")]
    InsufficientCdnLockup {
        /// Rail
        rail_id: RailId,
        /// Requested one-time payment
        requested: TokenAmount,
        /// Fixed lockup left
        available: TokenAmount,
    },

    // --- arbitration ---
    /// Settlement range is empty or reversed
    #[error("Invalid epoch range ({from}, {to}]")]
    InvalidEpochRange {
        /// Exclusive start
        from: Epoch,
        /// Inclusive end
        to: Epoch,
    },

    /// Settlement range ends before proving was activated
    #[error("Settlement end {to} before activation epoch {activation}")]
    SettlementBeforeActivation {
        /// Inclusive end
        to: Epoch,
        /// Activation epoch
        activation: Epoch,
    },

    /// Settlement range ends in the future
    #[error("Settlement end {to} after current epoch {current}")]
    SettlementInFuture {
        /// Inclusive end
        to: Epoch,
        /// Current epoch
        current: Epoch,
    },

    // --- arithmetic ---
    /// Integer overflow
    #[error("Arithmetic overflow computing {0}")]
    Overflow(&'static str),

    /// Zero divisor
    #[error("Division by zero computing {0}")]
    DivisionByZero(&'static str),

    // --- persistence ---
    /// Legacy snapshot names a provider the registry does not know
    #[error("Cannot migrate data set {data_set_id}: provider {provider} not registered")]
    MigrationUnknownProvider {
        /// Data set
        data_set_id: DataSetId,
        /// Service provider address
        provider: Address,
    },

    /// Snapshot could not be encoded or decoded
    #[error("Snapshot encoding: {0}")]
    Snapshot(String),
}
