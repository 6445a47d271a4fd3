//! Limit orders, collateralized debt positions, and settle requests
//!
//! Limit orders are keyed on the book by sell price (most aggressive
//! first), ties broken by id. Call orders are keyed by collateralization
//! (weakest first). Force-settlement requests queue by settlement date per
//! asset. All of these are owned by the object store and referenced by id.

use crate::errors::MarketError;
use crate::ids::{AccountId, AssetId, CallOrderId, LimitOrderId, SettlementId};
use crate::numeric::{AssetAmount, ShareAmount, RATIO_DENOM};
use crate::price::Price;
use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// An open offer to sell `for_sale` of one asset at `sell_price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub id: LimitOrderId,
    pub seller: AccountId,
    /// Remaining amount offered, denominated in the sell asset.
    pub for_sale: ShareAmount,
    /// sell asset over receive asset.
    pub sell_price: Price,
    pub expiration: Timestamp,
    /// Core-denominated creation fee held until the first fill.
    pub deferred_fee: ShareAmount,
    /// Creation fee as originally paid, possibly in a non-core asset.
    pub deferred_paid_fee: AssetAmount,
}

impl LimitOrder {
    pub fn sell_asset_id(&self) -> AssetId {
        self.sell_price.base.asset_id
    }

    pub fn receive_asset_id(&self) -> AssetId {
        self.sell_price.quote.asset_id
    }

    pub fn amount_for_sale(&self) -> AssetAmount {
        AssetAmount::new(self.for_sale, self.sell_asset_id())
    }

    /// What the remaining amount would fetch at the order's own price.
    /// Zero marks the order as dust to be culled.
    pub fn amount_to_receive(&self) -> Result<AssetAmount, MarketError> {
        self.amount_for_sale().mul_price(self.sell_price)
    }
}

/// An open collateralized debt position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOrder {
    pub id: CallOrderId,
    pub borrower: AccountId,
    /// Outstanding debt in the market-issued asset. Positive while alive.
    pub debt: ShareAmount,
    /// Locked collateral in the backing asset. Positive while alive.
    pub collateral: ShareAmount,
    pub debt_asset: AssetId,
    pub collateral_asset: AssetId,
    /// Ratio the borrower wants restored when margin-called, per-mille.
    pub target_collateral_ratio: Option<u16>,
}

impl CallOrder {
    pub fn debt_amount(&self) -> AssetAmount {
        AssetAmount::new(self.debt, self.debt_asset)
    }

    pub fn collateral_amount(&self) -> AssetAmount {
        AssetAmount::new(self.collateral, self.collateral_asset)
    }

    /// Collateral per debt unit as an unreduced price. The call index keys
    /// on this, weakest position first.
    pub fn collateralization(&self) -> Price {
        Price::new(self.collateral_amount(), self.debt_amount())
    }

    /// Largest debt amount this position may cover in a margin call.
    ///
    /// Without a target collateral ratio the whole debt is callable. With
    /// one, the position only covers enough debt, paying collateral at
    /// `call_pays_price`, to lift its collateralization back to the target
    /// (never below the maintenance ratio). Rounds in the position's
    /// disfavor: covering one unit more is preferred over falling short of
    /// the target.
    pub fn max_debt_to_cover(
        &self,
        call_pays_price: Price,
        feed_price: Price,
        maintenance_collateral_ratio: u16,
        current_maintenance_collateralization: Option<Price>,
    ) -> Result<ShareAmount, MarketError> {
        let tcr = match self.target_collateral_ratio {
            None => return Ok(self.debt),
            Some(t) => t.max(maintenance_collateral_ratio),
        };

        // Feed protection: a position above the maintenance level covers nothing.
        if let Some(mc) = current_maintenance_collateralization {
            if self.collateralization() > mc {
                return Ok(0);
            }
        }

        let pays = self.orient_collateral_per_debt(call_pays_price)?;
        let feed = self.orient_collateral_per_debt(feed_price)?;
        let target = feed.scaled(tcr, RATIO_DENOM)?;

        // Solve the smallest x with
        //   (collateral - x * pays) / (debt - x) >= target
        // by cross-multiplied integer arithmetic, fractions reduced first.
        let (pn, pd) = reduce(pays.base.amount, pays.quote.amount);
        let (tn, td) = reduce(target.base.amount, target.quote.amount);
        let d = i128::from(self.debt);
        let c = i128::from(self.collateral);

        let a = match tn.checked_mul(pd).zip(pn.checked_mul(td)) {
            Some((l, r)) => l - r,
            None => return Ok(self.debt),
        };
        if a <= 0 {
            // Covering at this price never reaches the target; cover everything.
            return Ok(self.debt);
        }
        let b = match (|| {
            let lhs = d.checked_mul(tn)?.checked_mul(pd)?;
            let rhs = c.checked_mul(td)?.checked_mul(pd)?;
            lhs.checked_sub(rhs)
        })() {
            Some(b) => b,
            None => return Ok(self.debt),
        };
        if b <= 0 {
            return Ok(0);
        }

        let mut x = ((b + a - 1) / a).min(d);
        // The actual fill rounds the paid collateral up, which can leave the
        // position one step short of the target; nudge x until it holds.
        for _ in 0..4 {
            if x >= d {
                return Ok(self.debt);
            }
            let paid = AssetAmount::new(x as ShareAmount, self.debt_asset)
                .multiply_and_round_up(pays)?;
            let c_rem = c - i128::from(paid.amount);
            let d_rem = d - x;
            if c_rem * td >= d_rem * tn {
                return Ok(x as ShareAmount);
            }
            let step = ((td + a - 1) / a).max(1);
            x = (x + step).min(d);
        }
        Ok(self.debt)
    }

    fn orient_collateral_per_debt(&self, p: Price) -> Result<Price, MarketError> {
        let p = if p.base.asset_id == self.collateral_asset {
            p
        } else {
            p.invert()
        };
        if p.base.asset_id != self.collateral_asset || p.quote.asset_id != self.debt_asset {
            return Err(MarketError::internal("price does not span this position's market"));
        }
        Ok(p)
    }
}

fn reduce(n: ShareAmount, d: ShareAmount) -> (i128, i128) {
    let g = gcd(n.unsigned_abs(), d.unsigned_abs()).max(1);
    (i128::from(n) / i128::from(g), i128::from(d) / i128::from(g))
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// A holder's request to redeem market-issued units for backing collateral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceSettlement {
    pub id: SettlementId,
    pub owner: AccountId,
    /// Escrowed market-issued units awaiting settlement.
    pub balance: AssetAmount,
    /// When the queue may execute this request.
    pub settlement_date: Timestamp,
}
