//! Integer share amounts and basis-point arithmetic
//!
//! All quantities on chain are signed 64-bit integer share amounts; every
//! intermediate product is computed in 128 bits. Floating point is never
//! used anywhere in consensus code, otherwise nodes could disagree on the
//! resulting state.

use crate::errors::MarketError;
use crate::ids::AssetId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Raw share quantity.
pub type ShareAmount = i64;

/// Platform-wide ceiling on any share amount or asset supply.
pub const SHARE_SUPPLY_MAX: i64 = 1_000_000_000_000_000;

/// 100% expressed in basis points.
pub const FULL_PERCENT: u16 = 10_000;

/// 1% expressed in basis points.
pub const ONE_PERCENT: u16 = 100;

/// Denominator for collateral-ratio fixed point (per-mille).
pub const RATIO_DENOM: u16 = 1_000;

/// Smallest accepted collateral ratio (1.001).
pub const RATIO_MIN: u16 = 1_001;

/// Largest accepted collateral ratio (32.0).
pub const RATIO_MAX: u16 = 32_000;

/// Compute `value * bps / 10_000`, truncating toward zero.
///
/// Uses a 128-bit intermediate and fails with an overflow error if the
/// result exceeds [`SHARE_SUPPLY_MAX`]. `value` must be non-negative.
pub fn calculate_percent(value: ShareAmount, bps: u16) -> Result<ShareAmount, MarketError> {
    let wide = i128::from(value) * i128::from(bps) / i128::from(FULL_PERCENT);
    if wide > i128::from(SHARE_SUPPLY_MAX) {
        return Err(MarketError::Overflow("calculate_percent"));
    }
    Ok(wide as i64)
}

/// A typed currency amount: `amount` units of `asset_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmount {
    pub amount: ShareAmount,
    pub asset_id: AssetId,
}

impl AssetAmount {
    pub fn new(amount: ShareAmount, asset_id: AssetId) -> Self {
        Self { amount, asset_id }
    }

    /// Zero units of the given asset.
    pub fn zero(asset_id: AssetId) -> Self {
        Self { amount: 0, asset_id }
    }

    /// Zero units of the core asset.
    pub fn core(amount: ShareAmount) -> Self {
        Self { amount, asset_id: AssetId::CORE }
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    /// Compare against another amount of the same asset.
    ///
    /// # Panics
    /// Panics if the asset ids differ; comparing amounts of different
    /// assets is a programming error, not a recoverable condition.
    pub fn cmp_amount(&self, other: &AssetAmount) -> std::cmp::Ordering {
        assert_eq!(self.asset_id, other.asset_id, "asset mismatch in comparison");
        self.amount.cmp(&other.amount)
    }

    pub fn lt(&self, other: &AssetAmount) -> bool {
        self.cmp_amount(other) == std::cmp::Ordering::Less
    }

    pub fn le(&self, other: &AssetAmount) -> bool {
        self.cmp_amount(other) != std::cmp::Ordering::Greater
    }

    pub fn min(self, other: AssetAmount) -> AssetAmount {
        if self.le(&other) {
            self
        } else {
            other
        }
    }
}

impl Add for AssetAmount {
    type Output = AssetAmount;

    fn add(self, rhs: AssetAmount) -> AssetAmount {
        assert_eq!(self.asset_id, rhs.asset_id, "asset mismatch in addition");
        AssetAmount::new(self.amount + rhs.amount, self.asset_id)
    }
}

impl Sub for AssetAmount {
    type Output = AssetAmount;

    fn sub(self, rhs: AssetAmount) -> AssetAmount {
        assert_eq!(self.asset_id, rhs.asset_id, "asset mismatch in subtraction");
        AssetAmount::new(self.amount - rhs.amount, self.asset_id)
    }
}

impl AddAssign for AssetAmount {
    fn add_assign(&mut self, rhs: AssetAmount) {
        *self = *self + rhs;
    }
}

impl SubAssign for AssetAmount {
    fn sub_assign(&mut self, rhs: AssetAmount) {
        *self = *self - rhs;
    }
}

impl Neg for AssetAmount {
    type Output = AssetAmount;

    fn neg(self) -> AssetAmount {
        AssetAmount::new(-self.amount, self.asset_id)
    }
}

impl fmt::Display for AssetAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.amount, self.asset_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_percent_truncates() {
        // 333 * 1% = 3.33 -> 3
        assert_eq!(calculate_percent(333, ONE_PERCENT).unwrap(), 3);
        assert_eq!(calculate_percent(100, FULL_PERCENT).unwrap(), 100);
        assert_eq!(calculate_percent(0, 5000).unwrap(), 0);
    }

    #[test]
    fn test_calculate_percent_wide_intermediate() {
        // value * bps would overflow i64 but not i128
        let value = SHARE_SUPPLY_MAX;
        assert_eq!(
            calculate_percent(value, ONE_PERCENT).unwrap(),
            SHARE_SUPPLY_MAX / 100
        );
    }

    #[test]
    fn test_calculate_percent_overflow() {
        // 200% of the max supply exceeds the ceiling
        let err = calculate_percent(SHARE_SUPPLY_MAX, 20_000).unwrap_err();
        assert!(matches!(err, MarketError::Overflow(_)));
    }

    #[test]
    fn test_asset_amount_arithmetic() {
        let a = AssetAmount::new(100, AssetId::CORE);
        let b = AssetAmount::new(40, AssetId::CORE);
        assert_eq!((a + b).amount, 140);
        assert_eq!((a - b).amount, 60);
        assert!(b.lt(&a));
        assert_eq!(a.min(b), b);
    }

    #[test]
    #[should_panic(expected = "asset mismatch")]
    fn test_asset_amount_mixed_assets_panics() {
        let a = AssetAmount::new(1, AssetId::CORE);
        let b = AssetAmount::new(1, AssetId::new(1));
        let _ = a + b;
    }
}
