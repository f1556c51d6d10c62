//! Service configuration types

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    TokenAmount,
    constants::{DEFAULT_LOCKUP_PERIOD, EPOCHS_PER_DAY, MAX_COMMISSION_BPS},
    token_amount,
};

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Challenge window must satisfy `0 < window < max_proving_period`
    #[error("Invalid challenge window size {window} for proving period {period}")]
    InvalidChallengeWindow {
        /// Requested proving period
        period: u64,
        /// Requested window size
        window: u64,
    },

    /// Commission above 100%
    #[error("Commission {0} bps exceeds maximum {MAX_COMMISSION_BPS}")]
    CommissionTooHigh(u16),

    /// A privileged address was left unset
    #[error("Address for {0} must be non-zero")]
    ZeroAddress(&'static str),

    /// Lockup period of zero epochs
    #[error("Lockup period must be non-zero")]
    ZeroLockupPeriod,

    /// Metadata limits of zero
    #[error("Metadata limit {0} must be non-zero")]
    ZeroMetadataLimit(&'static str),

    /// Price floor above the storage price of one TiB
    #[error("Minimum storage rate {minimum} exceeds storage price {price}")]
    PriceFloorTooHigh {
        /// Configured floor per month
        minimum: U256,
        /// Configured price per TiB per month
        price: U256,
    },
}

/// Proving period parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvingParams {
    /// Length of a proving period in epochs
    pub max_proving_period: u64,
    /// Trailing epochs of a period in which proofs are accepted
    pub challenge_window_size: u64,
}

impl ProvingParams {
    /// Create proving params
    pub const fn new(max_proving_period: u64, challenge_window_size: u64) -> Self {
        Self { max_proving_period, challenge_window_size }
    }

    /// Check `0 < challenge_window_size < max_proving_period`
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.challenge_window_size == 0 || self.challenge_window_size >= self.max_proving_period
        {
            return Err(ConfigError::InvalidChallengeWindow {
                period: self.max_proving_period,
                window: self.challenge_window_size,
            });
        }
        Ok(())
    }
}

impl Default for ProvingParams {
    fn default() -> Self {
        Self::new(EPOCHS_PER_DAY, 60)
    }
}

/// Prices and fixed lockups, all in token base units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Storage price per TiB per month
    pub storage_price_per_tib_per_month: TokenAmount,
    /// CDN egress price per TiB
    pub cdn_egress_price_per_tib: TokenAmount,
    /// Cache-miss egress price per TiB
    pub cache_miss_egress_price_per_tib: TokenAmount,
    /// Floor applied to the storage rate, per month
    pub minimum_storage_rate_per_month: TokenAmount,
    /// Fixed lockup of a new CDN rail
    pub cdn_lockup_amount: TokenAmount,
    /// Fixed lockup of a new cache-miss rail
    pub cache_miss_lockup_amount: TokenAmount,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            storage_price_per_tib_per_month: token_amount(2, 50),
            cdn_egress_price_per_tib: token_amount(0, 50),
            cache_miss_egress_price_per_tib: token_amount(0, 50),
            minimum_storage_rate_per_month: token_amount(0, 6),
            cdn_lockup_amount: token_amount(0, 70),
            cache_miss_lockup_amount: token_amount(0, 30),
        }
    }
}

impl PricingConfig {
    /// Check the floor does not exceed the price of a full TiB
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.minimum_storage_rate_per_month > self.storage_price_per_tib_per_month {
            return Err(ConfigError::PriceFloorTooHigh {
                minimum: self.minimum_storage_rate_per_month,
                price: self.storage_price_per_tib_per_month,
            });
        }
        Ok(())
    }
}

/// Bounds on metadata attached to data sets and pieces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataLimits {
    /// Maximum key length in bytes
    pub max_key_length: usize,
    /// Maximum value length in bytes
    pub max_value_length: usize,
    /// Maximum keys on a data set
    pub max_keys_per_data_set: usize,
    /// Maximum keys on a single piece
    pub max_keys_per_piece: usize,
}

impl Default for MetadataLimits {
    fn default() -> Self {
        Self {
            max_key_length: 32,
            max_value_length: 128,
            max_keys_per_data_set: 10,
            max_keys_per_piece: 5,
        }
    }
}

impl MetadataLimits {
    fn check_nonzero(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.max_key_length, "max_key_length"),
            (self.max_value_length, "max_value_length"),
            (self.max_keys_per_data_set, "max_keys_per_data_set"),
            (self.max_keys_per_piece, "max_keys_per_piece"),
        ];
        match checks.iter().find(|(limit, _)| *limit == 0) {
            Some((_, name)) => Err(ConfigError::ZeroMetadataLimit(name)),
            None => Ok(()),
        }
    }
}

/// How a data set opts into the CDN add-on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CdnFlagMode {
    /// Presence of the `withCDN` metadata key
    #[default]
    MetadataKey,
    /// Dedicated boolean in the creation payload
    Field,
}

/// How the payer-scoped client data set id is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientIdScheme {
    /// Sequential counter per payer
    PayerCounter,
    /// Nonce supplied by the payer in the creation payload
    #[default]
    ClientNonce,
}

/// Handling of provider change callbacks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderChangePolicy {
    /// Every provider change is rejected
    #[default]
    Disabled,
    /// New provider must be registered and approved
    RegistryApproved,
}

/// Strategies that differ between service revisions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceVersioning {
    /// CDN opt-in representation
    pub cdn_flag: CdnFlagMode,
    /// Client data set id source
    pub client_id_scheme: ClientIdScheme,
    /// Provider change callback handling
    pub provider_change: ProviderChangePolicy,
}

/// Typed-data signing domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Domain name
    pub name: String,
    /// Domain version
    pub version: String,
    /// Chain id of the host chain
    pub chain_id: u64,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self { name: "FilecoinWarmStorageService".to_string(), version: "1".to_string(), chain_id: 314 }
    }
}

/// Full service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Address of this service; rail validator and typed-data verifying contract
    pub service_address: Address,
    /// Owner allowed to change configuration and provider approvals
    pub owner: Address,
    /// Proof verifier allowed to deliver callbacks
    pub pdp_verifier: Address,
    /// Payments ledger allowed to arbitrate and report terminations
    pub payments: Address,
    /// Payment token
    pub token: Address,
    /// Controller allowed to settle CDN usage
    pub cdn_controller: Address,
    /// Payee of CDN egress rails
    pub cdn_beneficiary: Address,
    /// Recipient of the service fee on every rail
    pub fee_recipient: Address,
    /// Commission snapshotted into new data sets
    pub commission_bps: u16,
    /// Lockup period of the storage rail
    pub lockup_period: u64,
    /// Proving period parameters
    pub proving: ProvingParams,
    /// Prices and lockups
    pub pricing: PricingConfig,
    /// Metadata bounds
    pub metadata: MetadataLimits,
    /// Revision strategies
    pub versioning: ServiceVersioning,
    /// Signing domain
    pub domain: DomainConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_address: Address::ZERO,
            owner: Address::ZERO,
            pdp_verifier: Address::ZERO,
            payments: Address::ZERO,
            token: Address::ZERO,
            cdn_controller: Address::ZERO,
            cdn_beneficiary: Address::ZERO,
            fee_recipient: Address::ZERO,
            commission_bps: 0,
            lockup_period: DEFAULT_LOCKUP_PERIOD,
            proving: ProvingParams::default(),
            pricing: PricingConfig::default(),
            metadata: MetadataLimits::default(),
            versioning: ServiceVersioning::default(),
            domain: DomainConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Validate every bounded parameter
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            (self.service_address, "service_address"),
            (self.owner, "owner"),
            (self.pdp_verifier, "pdp_verifier"),
            (self.payments, "payments"),
            (self.token, "token"),
        ];
        if let Some((_, name)) = required.iter().find(|(addr, _)| addr.is_zero()) {
            return Err(ConfigError::ZeroAddress(name));
        }
        if self.commission_bps > MAX_COMMISSION_BPS {
            return Err(ConfigError::CommissionTooHigh(self.commission_bps));
        }
        if self.lockup_period == 0 {
            return Err(ConfigError::ZeroLockupPeriod);
        }
        self.proving.validate()?;
        self.pricing.validate()?;
        self.metadata.check_nonzero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ServiceConfig {
        ServiceConfig {
            service_address: Address::repeat_byte(0x10),
            owner: Address::repeat_byte(0x11),
            pdp_verifier: Address::repeat_byte(0x12),
            payments: Address::repeat_byte(0x13),
            token: Address::repeat_byte(0x14),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_requires_addresses() {
        assert_eq!(
            ServiceConfig::default().validate(),
            Err(ConfigError::ZeroAddress("service_address"))
        );
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_challenge_window_bounds() {
        assert!(ProvingParams::new(2880, 60).validate().is_ok());
        assert!(ProvingParams::new(2880, 0).validate().is_err());
        assert!(ProvingParams::new(2880, 2880).validate().is_err());
        assert!(ProvingParams::new(60, 59).validate().is_ok());
    }

    #[test]
    fn test_commission_bound() {
        let mut config = valid_config();
        config.commission_bps = 10_000;
        assert!(config.validate().is_ok());
        config.commission_bps = 10_001;
        assert_eq!(config.validate(), Err(ConfigError::CommissionTooHigh(10_001)));
    }

    #[test]
    fn test_toml_partial_config() {
        let raw = r#"
            service_address = "0x1010101010101010101010101010101010101010"
            owner = "0x1111111111111111111111111111111111111111"
            pdp_verifier = "0x1212121212121212121212121212121212121212"
            payments = "0x1313131313131313131313131313131313131313"
            token = "0x1414141414141414141414141414141414141414"
            commission_bps = 100

            [proving]
            max_proving_period = 240
            challenge_window_size = 20

            [versioning]
            client_id_scheme = "payer-counter"
        "#;
        let config: ServiceConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.commission_bps, 100);
        assert_eq!(config.proving, ProvingParams::new(240, 20));
        assert_eq!(config.versioning.client_id_scheme, ClientIdScheme::PayerCounter);
        assert_eq!(config.versioning.cdn_flag, CdnFlagMode::MetadataKey);
        assert_eq!(config.metadata, MetadataLimits::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let config = valid_config();
        let json = serde_json::to_string(&config).unwrap();
        let decoded: ServiceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);
    }
}
