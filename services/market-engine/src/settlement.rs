//! Global settlement, revival, and queue housekeeping
//!
//! A global settlement freezes a smartcoin: every debt position is force
//! closed at the settlement price, the collateral taken accumulates in a
//! redemption fund, and supply is preserved so holders can redeem against
//! the fund. A settled asset revives once its feed returns and the fund
//! covers the outstanding supply at the maintenance ratio (or the supply
//! reaches zero).
//!
//! The settle queue executes due redemption requests against the weakest
//! positions at the feed price less the settlement offset, capped per
//! maintenance interval.

use crate::engine::Engine;
use std::collections::BTreeSet;
use tracing::{debug, warn};
use types::prelude::*;

impl Engine {
    /// Force close every debt position of `mia_id` at `settlement_price`
    /// (debt/collateral), gathering the collateral into the redemption
    /// fund. Supply is restored afterwards: the fills burned it, but the
    /// tokens are still out there and redeem against the fund.
    pub fn globally_settle_asset(
        &mut self,
        mia_id: AssetId,
        settlement_price: Price,
    ) -> Result<(), MarketError> {
        let asset = self.store.asset(mia_id)?.clone();
        let bitasset = self.store.bitasset(mia_id)?.clone();
        if bitasset.has_settlement() {
            return Err(MarketError::precondition(
                "black swan already occurred, it cannot happen again",
            ));
        }
        let backing = bitasset.options.short_backing_asset;
        let original_supply = self.store.asset_dynamic(mia_id)?.current_supply;
        let mut collateral_gathered = AssetAmount::zero(backing);

        warn!(asset = %asset.symbol, supply = original_supply, "globally settling asset");

        for call_id in self.store.call_orders_in_market(backing, mia_id) {
            let call = self.store.call_order(call_id)?.clone();
            // Round up in favor of the settlement fund, capped by what the
            // position actually holds.
            let mut pays = call.debt_amount().multiply_and_round_up(settlement_price)?;
            if pays.amount > call.collateral {
                pays.amount = call.collateral;
            }
            collateral_gathered += pays;
            let closed = self.fill_call_order(
                call_id,
                pays,
                call.debt_amount(),
                settlement_price,
                true,
                AssetAmount::zero(backing),
            )?;
            if !closed {
                return Err(MarketError::internal("global settlement left a position open"));
            }
        }

        self.store.modify_bitasset(mia_id, |b| {
            b.settlement_price = Price::new(
                AssetAmount::new(original_supply, mia_id),
                collateral_gathered,
            );
            b.settlement_fund = collateral_gathered.amount;
        })?;

        // The fills above reported the supply as repaid; restore it so
        // redemption requests can consume it against the fund.
        self.store
            .modify_asset_dynamic(mia_id, |d| d.current_supply = original_supply)?;
        Ok(())
    }

    /// Bring a globally settled smartcoin back to life.
    ///
    /// With outstanding supply, the redemption fund becomes a debt
    /// position owned by the issuer (debt = supply, collateral = fund) so
    /// no value appears or disappears; with zero supply the fund must be
    /// empty already.
    pub fn revive_bitasset(&mut self, mia_id: AssetId) -> Result<(), MarketError> {
        let asset = self.store.asset(mia_id)?.clone();
        if !asset.is_market_issued() {
            return Err(MarketError::precondition("only smartcoins can revive"));
        }
        let bitasset = self.store.bitasset(mia_id)?.clone();
        if !bitasset.has_settlement() {
            return Err(MarketError::precondition("asset is not globally settled"));
        }
        if bitasset.is_prediction_market {
            return Err(MarketError::precondition("prediction markets do not revive"));
        }
        if !bitasset.feed_is_valid() {
            return Err(MarketError::precondition("cannot revive without a feed"));
        }

        let supply = self.store.asset_dynamic(mia_id)?.current_supply;
        if supply == 0 {
            if bitasset.settlement_fund != 0 {
                return Err(MarketError::internal("settlement fund outlived the supply"));
            }
        } else {
            let backing = bitasset.options.short_backing_asset;
            self.store.create_call_order(
                asset.issuer,
                supply,
                bitasset.settlement_fund,
                mia_id,
                backing,
                None,
            );
            if backing.is_core() {
                let fund = bitasset.settlement_fund;
                self.store
                    .modify_account_stats(asset.issuer, |s| s.total_core_in_orders += fund)?;
            }
        }

        self.store.modify_bitasset(mia_id, |b| {
            b.settlement_price = Price::null();
            b.settlement_fund = 0;
        })?;
        warn!(asset = %asset.symbol, supply, "smartcoin revived");
        Ok(())
    }

    /// Execute due settle requests against the weakest debt positions.
    ///
    /// Requests against assets without a feed are cancelled; requests
    /// against globally settled assets are cancelled too, since their
    /// holders can redeem instantly instead. Per asset, at most the
    /// configured share of supply settles per maintenance interval;
    /// blocked requests simply stay queued.
    pub fn process_settlements(&mut self) -> Result<(), MarketError> {
        let due = self.store.settlements_due(self.time());
        let mut capped: BTreeSet<AssetId> = BTreeSet::new();

        for settle_id in due {
            if self.store.find_settlement(settle_id).is_none() {
                continue;
            }
            let settle = self.store.settlement(settle_id)?.clone();
            let mia_id = settle.balance.asset_id;
            if capped.contains(&mia_id) {
                continue;
            }
            let bitasset = self.store.bitasset(mia_id)?.clone();

            if bitasset.has_settlement() || !bitasset.feed_is_valid() {
                self.cancel_settle_order(settle_id, true)?;
                continue;
            }

            let supply = self.store.asset_dynamic(mia_id)?.current_supply;
            let max_volume =
                calculate_percent(supply, bitasset.options.maximum_force_settlement_volume)?;
            let offset = bitasset.options.force_settlement_offset_percent;
            let fill_price = bitasset
                .current_feed
                .settlement_price
                .scaled(FULL_PERCENT, FULL_PERCENT - offset)?;

            while self.store.find_settlement(settle_id).is_some() {
                let volume_used = self.store.bitasset(mia_id)?.force_settled_volume;
                let remaining_volume = max_volume - volume_used;
                if remaining_volume <= 0 {
                    capped.insert(mia_id);
                    break;
                }
                let Some(call_id) = self
                    .store
                    .least_collateralized_call(bitasset.options.short_backing_asset, mia_id)
                else {
                    return Err(MarketError::internal(
                        "settle request outlived every debt position",
                    ));
                };
                let settled = self.match_call_settle(
                    call_id,
                    settle_id,
                    fill_price,
                    AssetAmount::new(remaining_volume, mia_id),
                    fill_price,
                )?;
                if settled.amount == 0 {
                    // Dust: either the request was cancelled inside the
                    // match, or the remaining cap is too small to matter.
                    if self.store.find_settlement(settle_id).is_some() {
                        capped.insert(mia_id);
                    }
                    break;
                }
                debug!(asset = %mia_id, settled = settled.amount, "force settlement executed");
                self.store
                    .modify_bitasset(mia_id, |b| b.force_settled_volume += settled.amount)?;
            }
        }
        Ok(())
    }

    /// Cancel limit orders whose expiration has passed, charging the
    /// cancellation fee out of their deferred fees.
    pub fn process_expired_orders(&mut self) -> Result<(), MarketError> {
        for order_id in self.store.expired_limit_orders(self.time()) {
            if self.store.find_limit_order(order_id).is_some() {
                self.cancel_limit_order(order_id, true, false)?;
            }
        }
        Ok(())
    }
}
