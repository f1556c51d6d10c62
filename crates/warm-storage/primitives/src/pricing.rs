//! Storage rate calculation

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    PricingConfig, TokenAmount,
    constants::{EPOCHS_PER_MONTH, TIB_IN_BYTES},
};

/// Arithmetic failures while pricing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PricingError {
    /// Intermediate product exceeded 256 bits
    #[error("Arithmetic overflow computing {0}")]
    Overflow(&'static str),

    /// Divisor was zero
    #[error("Division by zero computing {0}")]
    DivisionByZero(&'static str),
}

/// Per-epoch storage rate for `total_bytes` of stored data
///
/// The natural rate is `total_bytes * price / (TiB * EPOCHS_PER_MONTH)`,
/// floored at `minimum_storage_rate_per_month / EPOCHS_PER_MONTH`.
pub fn storage_rate_per_epoch(
    total_bytes: u64,
    pricing: &PricingConfig,
) -> Result<TokenAmount, PricingError> {
    let numerator = U256::from(total_bytes)
        .checked_mul(pricing.storage_price_per_tib_per_month)
        .ok_or(PricingError::Overflow("storage rate"))?;
    let denominator = U256::from(TIB_IN_BYTES) * U256::from(EPOCHS_PER_MONTH);
    let natural = numerator
        .checked_div(denominator)
        .ok_or(PricingError::DivisionByZero("storage rate"))?;
    let minimum = pricing.minimum_storage_rate_per_month / U256::from(EPOCHS_PER_MONTH);
    Ok(natural.max(minimum))
}

/// Lockup a new storage rail needs for `lockup_period` epochs at the floor rate
pub fn minimum_storage_lockup(
    pricing: &PricingConfig,
    lockup_period: u64,
) -> Result<TokenAmount, PricingError> {
    let rate = storage_rate_per_epoch(0, pricing)?;
    rate.checked_mul(U256::from(lockup_period)).ok_or(PricingError::Overflow("minimum lockup"))
}

/// Public price sheet of the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePricing {
    /// Storage price per TiB per month
    pub price_per_tib_per_month: TokenAmount,
    /// CDN egress price per TiB
    pub cdn_egress_price_per_tib: TokenAmount,
    /// Cache-miss egress price per TiB
    pub cache_miss_egress_price_per_tib: TokenAmount,
    /// Floor on the monthly storage charge
    pub minimum_rate_per_month: TokenAmount,
    /// Payment token
    pub token: Address,
    /// Epochs in one billing month
    pub epochs_per_month: u64,
}

impl ServicePricing {
    /// Build the price sheet from a pricing config
    pub fn new(pricing: &PricingConfig, token: Address) -> Self {
        Self {
            price_per_tib_per_month: pricing.storage_price_per_tib_per_month,
            cdn_egress_price_per_tib: pricing.cdn_egress_price_per_tib,
            cache_miss_egress_price_per_tib: pricing.cache_miss_egress_price_per_tib,
            minimum_rate_per_month: pricing.minimum_storage_rate_per_month,
            token,
            epochs_per_month: EPOCHS_PER_MONTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_amount;
    use proptest::prelude::*;

    #[test]
    fn test_floor_applies_to_small_data_sets() {
        let pricing = PricingConfig::default();
        let floor = token_amount(0, 6) / U256::from(EPOCHS_PER_MONTH);
        assert_eq!(storage_rate_per_epoch(0, &pricing).unwrap(), floor);
        assert_eq!(storage_rate_per_epoch(1 << 20, &pricing).unwrap(), floor);
    }

    #[test]
    fn test_one_tib_rate() {
        let pricing = PricingConfig::default();
        let expected = token_amount(2, 50) / U256::from(EPOCHS_PER_MONTH);
        assert_eq!(storage_rate_per_epoch(TIB_IN_BYTES, &pricing).unwrap(), expected);
    }

    #[test]
    fn test_minimum_lockup() {
        let pricing = PricingConfig::default();
        let floor = token_amount(0, 6) / U256::from(EPOCHS_PER_MONTH);
        assert_eq!(
            minimum_storage_lockup(&pricing, EPOCHS_PER_MONTH).unwrap(),
            floor * U256::from(EPOCHS_PER_MONTH)
        );
    }

    #[test]
    fn test_overflow() {
        let pricing =
            PricingConfig { storage_price_per_tib_per_month: U256::MAX, ..Default::default() };
        assert_eq!(
            storage_rate_per_epoch(2, &pricing),
            Err(PricingError::Overflow("storage rate"))
        );
    }

    proptest! {
        #[test]
        fn prop_rate_monotonic_in_bytes(a in 0u64..u64::MAX / 2, b in 0u64..u64::MAX / 2) {
            let pricing = PricingConfig::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(
                storage_rate_per_epoch(lo, &pricing).unwrap()
                    <= storage_rate_per_epoch(hi, &pricing).unwrap()
            );
        }
    }
}
