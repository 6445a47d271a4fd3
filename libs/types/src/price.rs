//! Unreduced price ratios with directional rounding
//!
//! A price is the ratio of two typed amounts, kept unreduced: `base/quote`.
//! Multiplying an amount by a price converts it into the other leg of the
//! pair. Every matching decision picks one of two rounding directions
//! explicitly: plain multiplication rounds down, `multiply_and_round_up`
//! rounds up, and the choice always favors a named party.
//!
//! Prices form a total order: first by the asset-id pair, then by
//! cross-multiplication of the ratios in 128 bits. Two prices of the same
//! pair compare equal when their ratios are equal, regardless of
//! representation (1/2 equals 2/4).

use crate::errors::MarketError;
use crate::ids::AssetId;
use crate::numeric::{AssetAmount, ShareAmount, SHARE_SUPPLY_MAX};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Price ratio `base/quote` of two typed amounts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Price {
    pub base: AssetAmount,
    pub quote: AssetAmount,
}

impl Price {
    pub fn new(base: AssetAmount, quote: AssetAmount) -> Self {
        Self { base, quote }
    }

    /// The uninitialized price: zero over zero of the core asset.
    pub fn null() -> Self {
        Self {
            base: AssetAmount::zero(AssetId::CORE),
            quote: AssetAmount::zero(AssetId::CORE),
        }
    }

    pub fn is_null(&self) -> bool {
        self.base.amount == 0 || self.quote.amount == 0
    }

    /// Cheapest possible price for the pair: one satoshi of base buys the
    /// whole supply of quote. Used as an index bound.
    pub fn min(base: AssetId, quote: AssetId) -> Self {
        Self {
            base: AssetAmount::new(1, base),
            quote: AssetAmount::new(SHARE_SUPPLY_MAX, quote),
        }
    }

    /// Most expensive possible price for the pair. Used as an index bound.
    pub fn max(base: AssetId, quote: AssetId) -> Self {
        Self {
            base: AssetAmount::new(SHARE_SUPPLY_MAX, base),
            quote: AssetAmount::new(1, quote),
        }
    }

    /// Swap the two legs.
    pub fn invert(self) -> Self {
        Self { base: self.quote, quote: self.base }
    }

    /// Check that both legs are positive and the assets differ.
    pub fn validate(&self) -> Result<(), MarketError> {
        if self.base.amount <= 0 || self.quote.amount <= 0 {
            return Err(MarketError::validation("price amounts must be positive"));
        }
        if self.base.asset_id == self.quote.asset_id {
            return Err(MarketError::validation("price must span two different assets"));
        }
        Ok(())
    }

    /// Scale the ratio by `numer/denom`, multiplying the base leg by the
    /// numerator and the quote leg by the denominator. Both legs are halved
    /// together until they fit under the share ceiling, preserving the
    /// ratio to within one bit.
    pub fn scaled(&self, numer: u16, denom: u16) -> Result<Price, MarketError> {
        if numer == 0 || denom == 0 {
            return Err(MarketError::internal("price scaled by zero ratio"));
        }
        let mut base = i128::from(self.base.amount) * i128::from(numer);
        let mut quote = i128::from(self.quote.amount) * i128::from(denom);
        while base > i128::from(SHARE_SUPPLY_MAX) || quote > i128::from(SHARE_SUPPLY_MAX) {
            base >>= 1;
            quote >>= 1;
        }
        if base <= 0 || quote <= 0 {
            return Err(MarketError::Overflow("price scaling"));
        }
        Ok(Price {
            base: AssetAmount::new(base as ShareAmount, self.base.asset_id),
            quote: AssetAmount::new(quote as ShareAmount, self.quote.asset_id),
        })
    }
}

impl AssetAmount {
    /// Convert this amount into the other leg of `p`, rounding down.
    ///
    /// The rounding direction favors the party whose receive leg is being
    /// computed: they never receive more than the exact ratio allows.
    pub fn mul_price(self, p: Price) -> Result<AssetAmount, MarketError> {
        if self.asset_id == p.base.asset_id {
            if p.base.amount <= 0 {
                return Err(MarketError::internal("multiplying by price with empty base"));
            }
            let result = i128::from(self.amount) * i128::from(p.quote.amount)
                / i128::from(p.base.amount);
            if result > i128::from(SHARE_SUPPLY_MAX) {
                return Err(MarketError::Overflow("asset * price"));
            }
            Ok(AssetAmount::new(result as ShareAmount, p.quote.asset_id))
        } else if self.asset_id == p.quote.asset_id {
            if p.quote.amount <= 0 {
                return Err(MarketError::internal("multiplying by price with empty quote"));
            }
            let result = i128::from(self.amount) * i128::from(p.base.amount)
                / i128::from(p.quote.amount);
            if result > i128::from(SHARE_SUPPLY_MAX) {
                return Err(MarketError::Overflow("asset * price"));
            }
            Ok(AssetAmount::new(result as ShareAmount, p.base.asset_id))
        } else {
            Err(MarketError::internal(format!(
                "amount in {} cannot be priced by {}/{}",
                self.asset_id, p.base.asset_id, p.quote.asset_id
            )))
        }
    }

    /// Convert this amount into the other leg of `p`, rounding up.
    ///
    /// Used for the counterparty's pays leg so that rounding never creates
    /// value out of thin air.
    pub fn multiply_and_round_up(self, p: Price) -> Result<AssetAmount, MarketError> {
        if self.asset_id == p.base.asset_id {
            if p.base.amount <= 0 {
                return Err(MarketError::internal("multiplying by price with empty base"));
            }
            let result = (i128::from(self.amount) * i128::from(p.quote.amount)
                + i128::from(p.base.amount)
                - 1)
                / i128::from(p.base.amount);
            if result > i128::from(SHARE_SUPPLY_MAX) {
                return Err(MarketError::Overflow("asset * price round up"));
            }
            Ok(AssetAmount::new(result as ShareAmount, p.quote.asset_id))
        } else if self.asset_id == p.quote.asset_id {
            if p.quote.amount <= 0 {
                return Err(MarketError::internal("multiplying by price with empty quote"));
            }
            let result = (i128::from(self.amount) * i128::from(p.base.amount)
                + i128::from(p.quote.amount)
                - 1)
                / i128::from(p.quote.amount);
            if result > i128::from(SHARE_SUPPLY_MAX) {
                return Err(MarketError::Overflow("asset * price round up"));
            }
            Ok(AssetAmount::new(result as ShareAmount, p.base.asset_id))
        } else {
            Err(MarketError::internal(format!(
                "amount in {} cannot be priced by {}/{}",
                self.asset_id, p.base.asset_id, p.quote.asset_id
            )))
        }
    }
}

impl PartialEq for Price {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Price {}

impl PartialOrd for Price {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Price {
    fn cmp(&self, other: &Self) -> Ordering {
        // Group by pair first so prices of the same market are contiguous
        // in ordered indices, then compare ratios by cross-multiplication.
        self.base
            .asset_id
            .cmp(&other.base.asset_id)
            .then_with(|| self.quote.asset_id.cmp(&other.quote.asset_id))
            .then_with(|| {
                let lhs = i128::from(self.base.amount) * i128::from(other.quote.amount);
                let rhs = i128::from(other.base.amount) * i128::from(self.quote.amount);
                lhs.cmp(&rhs)
            })
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} / {} {}",
            self.base.amount, self.base.asset_id, self.quote.amount, self.quote.asset_id
        )
    }
}
