//! Warm Storage Primitives
//!
//! Shared building blocks for the warm storage service:
//! - **Identifiers**: data set, rail, piece and provider handles
//! - **Proving periods**: epoch to period arithmetic and challenge windows
//! - **Pricing**: storage rate per epoch from a byte count
//! - **Configuration**: service parameters and revision strategies
//! - **Metadata**: bounded key/value entries attached to data sets and pieces
//!
//! # Proving period geometry
//!
//! ```text
//! activation                 deadline(0)                deadline(1)
//!     │◄──── max_proving_period ───►│◄──── max_proving_period ───►│
//!     │                    ┌────────┤                    ┌────────┤
//!     │                    │ window │                    │ window │
//!     │                    └────────┘                    └────────┘
//!  period 0 covers (activation, deadline(0)], period 1 covers (deadline(0), deadline(1)]
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod config;
pub mod metadata;
pub mod period;
pub mod pricing;

pub use config::{
    CdnFlagMode, ClientIdScheme, ConfigError, DomainConfig, MetadataLimits, PricingConfig,
    ProviderChangePolicy, ProvingParams, ServiceConfig, ServiceVersioning,
};
pub use metadata::{MetadataEntry, MetadataError, MetadataScope};
pub use period::{ChallengeWindow, PeriodSchedule, periods_skipped};
pub use pricing::{PricingError, ServicePricing, minimum_storage_lockup, storage_rate_per_epoch};

use alloy_primitives::U256;

/// Block height on the host chain
pub type Epoch = u64;

/// Data set handle assigned by the proof verifier
pub type DataSetId = u64;

/// Payment rail handle assigned by the payments ledger
pub type RailId = u64;

/// Piece handle within a data set, assigned by the proof verifier
pub type PieceId = u64;

/// Provider handle assigned by the provider registry
pub type ProviderId = u64;

/// Token amount in base units
pub type TokenAmount = U256;

/// Protocol constants
pub mod constants {
    use super::Epoch;

    /// Challenges every accepted proof must cover
    pub const CHALLENGES_PER_PROOF: u64 = 5;

    /// Size of a proof tree leaf in bytes
    pub const BYTES_PER_LEAF: u64 = 32;

    /// Challenge epoch passed by the verifier when nothing is left to prove
    pub const NO_CHALLENGE_SCHEDULED: Epoch = 0;

    /// Deadline value meaning no proving period is open
    pub const NO_PROVING_DEADLINE: Epoch = 0;

    /// Period index returned for epochs outside the proving schedule
    pub const INVALID_PERIOD: u64 = u64::MAX;

    /// Epochs per day (30 second epochs)
    pub const EPOCHS_PER_DAY: u64 = 2880;

    /// Epochs per 30-day month
    pub const EPOCHS_PER_MONTH: u64 = EPOCHS_PER_DAY * 30;

    /// Default lockup period of the storage rail
    pub const DEFAULT_LOCKUP_PERIOD: u64 = EPOCHS_PER_MONTH;

    /// Bytes in one tebibyte
    pub const TIB_IN_BYTES: u64 = 1 << 40;

    /// Decimals of the payment token
    pub const TOKEN_DECIMALS: u8 = 18;

    /// Upper bound for commission in basis points
    pub const MAX_COMMISSION_BPS: u16 = 10_000;

    /// Metadata key whose presence opts a data set into the CDN add-on
    pub const WITH_CDN_METADATA_KEY: &str = "withCDN";
}

/// Converts a whole token amount with `cents` hundredths into base units.
pub fn token_amount(whole: u64, cents: u64) -> TokenAmount {
    let unit = U256::from(10u64).pow(U256::from(constants::TOKEN_DECIMALS));
    U256::from(whole) * unit + U256::from(cents) * unit / U256::from(100u64)
}
