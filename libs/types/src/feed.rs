//! Published price feeds and feed-derived margin-call prices
//!
//! A feed quotes the settlement price of a market-issued asset in its
//! backing asset (debt/collateral) together with the collateral ratios the
//! publisher considers safe. The engine works off the per-field median of
//! all live feeds.

use crate::errors::MarketError;
use crate::numeric::{RATIO_DENOM, RATIO_MAX, RATIO_MIN};
use crate::price::Price;
use serde::{Deserialize, Serialize};

/// A single published feed for a market-issued asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFeed {
    /// Feed price in debt/collateral orientation; null when unset.
    pub settlement_price: Price,
    /// Exchange rate against the core asset, for fee-pool conversions.
    pub core_exchange_rate: Price,
    /// Maintenance collateral ratio, per-mille (1750 = 1.75).
    pub maintenance_collateral_ratio: u16,
    /// Maximum short-squeeze ratio, per-mille (1100 = 1.10).
    pub maximum_short_squeeze_ratio: u16,
    /// Initial collateral ratio required to open or enlarge a position,
    /// per-mille. Zero disables the check.
    pub initial_collateral_ratio: u16,
}

impl Default for PriceFeed {
    fn default() -> Self {
        Self {
            settlement_price: Price::null(),
            core_exchange_rate: Price::null(),
            maintenance_collateral_ratio: 1_750,
            maximum_short_squeeze_ratio: 1_500,
            initial_collateral_ratio: 0,
        }
    }
}

impl PriceFeed {
    /// Validate ratio ranges and price orientation sanity.
    pub fn validate(&self) -> Result<(), MarketError> {
        if !(RATIO_MIN..=RATIO_MAX).contains(&self.maintenance_collateral_ratio) {
            return Err(MarketError::validation("maintenance collateral ratio out of range"));
        }
        if !(RATIO_MIN..=RATIO_MAX).contains(&self.maximum_short_squeeze_ratio) {
            return Err(MarketError::validation("short squeeze ratio out of range"));
        }
        if self.initial_collateral_ratio != 0
            && !(RATIO_MIN..=RATIO_MAX).contains(&self.initial_collateral_ratio)
        {
            return Err(MarketError::validation("initial collateral ratio out of range"));
        }
        if !self.settlement_price.is_null() {
            self.settlement_price.validate()?;
        }
        Ok(())
    }

    /// Worst price at which a margin call surrenders collateral:
    /// `settlement_price / MSSR` on the collateral-per-debt axis.
    pub fn max_short_squeeze_price(&self) -> Result<Price, MarketError> {
        self.settlement_price
            .scaled(RATIO_DENOM, self.maximum_short_squeeze_ratio)
    }

    /// Price bound at which margin calls appear on the book. The issuer's
    /// margin-call fee ratio narrows the squeeze ratio, so eligible bids
    /// leave room for the fee. Falls back to the plain feed price when the
    /// fee ratio swallows the whole squeeze allowance.
    pub fn margin_call_order_price(&self, margin_call_fee_ratio: Option<u16>) -> Result<Price, MarketError> {
        let mcfr = margin_call_fee_ratio.unwrap_or(0);
        let numerator = if mcfr < self.maximum_short_squeeze_ratio {
            (self.maximum_short_squeeze_ratio - mcfr).max(RATIO_DENOM)
        } else {
            RATIO_DENOM
        };
        self.settlement_price.scaled(RATIO_DENOM, numerator)
    }

    /// Collateralization level below which a position is margin-called:
    /// `MCR * ~settlement_price`, a collateral/debt price.
    pub fn maintenance_collateralization(&self) -> Option<Price> {
        if self.settlement_price.is_null() {
            return None;
        }
        self.settlement_price
            .invert()
            .scaled(self.maintenance_collateral_ratio, RATIO_DENOM)
            .ok()
    }

    /// Collateralization required to open or enlarge a position. The
    /// initial ratio never undercuts the maintenance ratio.
    pub fn initial_collateralization(&self) -> Option<Price> {
        if self.settlement_price.is_null() {
            return None;
        }
        let icr = self
            .initial_collateral_ratio
            .max(self.maintenance_collateral_ratio);
        self.settlement_price.invert().scaled(icr, RATIO_DENOM).ok()
    }

    /// Whether a feed change affects margin-call processing.
    pub fn margin_call_params_equal(&self, other: &PriceFeed) -> bool {
        self.settlement_price == other.settlement_price
            && self.maintenance_collateral_ratio == other.maintenance_collateral_ratio
            && self.maximum_short_squeeze_ratio == other.maximum_short_squeeze_ratio
            && self.initial_collateral_ratio == other.initial_collateral_ratio
    }
}
