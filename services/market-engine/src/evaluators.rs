//! Operation evaluators
//!
//! One function per inbound operation: validate the fields against the
//! current state, move the funds, and hand off to the matching or
//! settlement engine. The dispatcher in `engine.rs` wraps each of these
//! in a store checkpoint, so returning an error is always safe.

use crate::engine::Engine;
use types::prelude::*;

impl Engine {
    pub(crate) fn do_limit_order_create(
        &mut self,
        op: &LimitOrderCreate,
    ) -> Result<OperationResult, MarketError> {
        if op.amount_to_sell.amount <= 0 {
            return Err(MarketError::validation("amount to sell must be positive"));
        }
        if op.min_to_receive.amount <= 0 {
            return Err(MarketError::validation("minimum to receive must be positive"));
        }
        if op.amount_to_sell.asset_id == op.min_to_receive.asset_id {
            return Err(MarketError::validation("cannot trade an asset against itself"));
        }
        if op.fee.amount < 0 {
            return Err(MarketError::validation("fee cannot be negative"));
        }
        if op.expiration <= self.time() {
            return Err(MarketError::validation("order would expire immediately"));
        }
        self.store.account(op.seller)?;
        self.store.asset(op.amount_to_sell.asset_id)?;
        self.store.asset(op.min_to_receive.asset_id)?;

        // The creation fee defers on the order until its first fill. A
        // fee paid in another asset is converted at that asset's core
        // exchange rate, with the core advanced out of its fee pool.
        let mut deferred_fee: ShareAmount = 0;
        let mut deferred_paid_fee = AssetAmount::zero(AssetId::CORE);
        if op.fee.amount > 0 {
            self.store.adjust_balance(op.seller, -op.fee)?;
            if op.fee.asset_id.is_core() {
                deferred_fee = op.fee.amount;
            } else {
                let fee_asset = self.store.asset(op.fee.asset_id)?.clone();
                let cer = fee_asset.options.core_exchange_rate;
                if cer.is_null() {
                    return Err(MarketError::precondition(
                        "fee asset has no core exchange rate",
                    ));
                }
                let core_fee = op.fee.mul_price(cer)?;
                if core_fee.asset_id != AssetId::CORE {
                    return Err(MarketError::validation(
                        "core exchange rate must be quoted against the core asset",
                    ));
                }
                if core_fee.amount <= 0 {
                    return Err(MarketError::precondition("fee too small to convert"));
                }
                if self.store.asset_dynamic(op.fee.asset_id)?.fee_pool < core_fee.amount {
                    return Err(MarketError::precondition(
                        "fee pool cannot advance the core fee",
                    ));
                }
                self.store
                    .modify_asset_dynamic(op.fee.asset_id, |d| d.fee_pool -= core_fee.amount)?;
                deferred_fee = core_fee.amount;
                deferred_paid_fee = op.fee;
            }
        }

        self.store.adjust_balance(op.seller, -op.amount_to_sell)?;
        if op.amount_to_sell.asset_id.is_core() {
            self.store.modify_account_stats(op.seller, |s| {
                s.total_core_in_orders += op.amount_to_sell.amount;
            })?;
        }

        let sell_price = Price::new(op.amount_to_sell, op.min_to_receive);
        sell_price.validate()?;
        let order_id = self.store.create_limit_order(
            op.seller,
            op.amount_to_sell.amount,
            sell_price,
            op.expiration,
            deferred_fee,
            deferred_paid_fee,
        );

        let filled = self.apply_order(order_id)?;
        if op.fill_or_kill && !filled {
            return Err(MarketError::precondition("order did not fill completely"));
        }
        Ok(OperationResult::ObjectId(order_id.value()))
    }

    pub(crate) fn do_limit_order_cancel(
        &mut self,
        op: &LimitOrderCancel,
    ) -> Result<OperationResult, MarketError> {
        let order = self.store.limit_order(op.order)?.clone();
        if order.seller != op.fee_paying_account {
            return Err(MarketError::validation("only the seller may cancel an order"));
        }
        // A cancellation the owner asked for refunds the deferred fee in
        // full; only housekeeping cancels charge the cancel fee.
        self.cancel_limit_order(op.order, false, false)?;
        Ok(OperationResult::None)
    }

    pub(crate) fn do_call_order_update(
        &mut self,
        op: &CallOrderUpdate,
    ) -> Result<OperationResult, MarketError> {
        let mia_id = op.delta_debt.asset_id;
        let mia = self.store.asset(mia_id)?.clone();
        if !mia.is_market_issued() {
            return Err(MarketError::validation("debt asset is not market issued"));
        }
        let bitasset = self.store.bitasset(mia_id)?.clone();
        if op.delta_collateral.asset_id != bitasset.options.short_backing_asset {
            return Err(MarketError::validation(
                "collateral asset does not back the debt asset",
            ));
        }
        if op.delta_debt.amount == 0 && op.delta_collateral.amount == 0 {
            return Err(MarketError::validation("update changes nothing"));
        }
        if let Some(tcr) = op.target_collateral_ratio {
            if tcr == 0 {
                return Err(MarketError::validation("target collateral ratio cannot be zero"));
            }
        }
        if bitasset.has_settlement() {
            return Err(MarketError::precondition(
                "cannot adjust a debt position after global settlement",
            ));
        }
        if bitasset.is_prediction_market {
            if op.delta_collateral.amount != op.delta_debt.amount {
                return Err(MarketError::validation(
                    "prediction market positions lock collateral one to one",
                ));
            }
        } else if op.delta_debt.amount > 0 && !bitasset.feed_is_valid() {
            return Err(MarketError::InsufficientFeeds);
        }

        // Funds move first; the position checks run on the result.
        if op.delta_debt.amount != 0 {
            let new_supply =
                self.store.asset_dynamic(mia_id)?.current_supply + op.delta_debt.amount;
            if new_supply > mia.options.max_supply {
                return Err(MarketError::precondition("debt would exceed max supply"));
            }
            self.store.adjust_balance(op.funding_account, op.delta_debt)?;
            self.store
                .modify_asset_dynamic(mia_id, |d| d.current_supply += op.delta_debt.amount)?;
        }
        if op.delta_collateral.amount != 0 {
            self.store
                .adjust_balance(op.funding_account, -op.delta_collateral)?;
            if op.delta_collateral.asset_id.is_core() {
                self.store.modify_account_stats(op.funding_account, |s| {
                    s.total_core_in_orders += op.delta_collateral.amount;
                })?;
            }
        }

        let existing = self.store.call_order_of(op.funding_account, mia_id);
        let (call_id, old_collateralization) = match existing {
            None => {
                if op.delta_debt.amount <= 0 || op.delta_collateral.amount <= 0 {
                    return Err(MarketError::validation("no open position to adjust"));
                }
                let id = self.store.create_call_order(
                    op.funding_account,
                    op.delta_debt.amount,
                    op.delta_collateral.amount,
                    mia_id,
                    bitasset.options.short_backing_asset,
                    op.target_collateral_ratio,
                );
                (id, None)
            }
            Some(id) => {
                let call = self.store.call_order(id)?.clone();
                let old_cr = call.collateralization();
                let new_debt = call.debt + op.delta_debt.amount;
                let new_collateral = call.collateral + op.delta_collateral.amount;
                if new_debt < 0 {
                    return Err(MarketError::validation("repaying more debt than owed"));
                }
                if new_collateral < 0 {
                    return Err(MarketError::validation(
                        "withdrawing more collateral than locked",
                    ));
                }
                if new_debt == 0 {
                    if new_collateral != 0 {
                        return Err(MarketError::validation(
                            "must withdraw all collateral when closing a position",
                        ));
                    }
                    self.store.remove_call_order(id)?;
                    return Ok(OperationResult::None);
                }
                if new_collateral == 0 {
                    return Err(MarketError::validation("a live position requires collateral"));
                }
                self.store.modify_call_order(id, |c| {
                    c.debt = new_debt;
                    c.collateral = new_collateral;
                    c.target_collateral_ratio = op.target_collateral_ratio;
                })?;
                (id, Some(old_cr))
            }
        };

        if !bitasset.is_prediction_market {
            let call = self.store.call_order(call_id)?.clone();
            if bitasset.feed_is_valid() {
                let callable = match bitasset.current_maintenance_collateralization {
                    Some(mc) => call.collateralization() <= mc,
                    None => false,
                };
                if callable {
                    // Still allowed when the update strictly de-risks an
                    // existing position without borrowing more.
                    let less_risky = match old_collateralization {
                        Some(old) => {
                            op.delta_debt.amount <= 0 && call.collateralization() > old
                        }
                        None => false,
                    };
                    if !less_risky {
                        return Err(MarketError::precondition(
                            "resulting position would be margin called",
                        ));
                    }
                } else if op.delta_debt.amount > 0 || op.delta_collateral.amount < 0 {
                    if let Some(initial) = bitasset.current_feed.initial_collateralization() {
                        if call.collateralization() < initial {
                            return Err(MarketError::precondition(
                                "position below the initial collateral requirement",
                            ));
                        }
                    }
                }
            } else if op.delta_debt.amount > 0 || op.delta_collateral.amount < 0 {
                return Err(MarketError::InsufficientFeeds);
            }

            // The adjusted position may itself be callable now; a margin
            // update is never allowed to trip a black swan.
            self.check_call_orders(mia_id, false)?;
        }

        Ok(OperationResult::ObjectId(call_id.value()))
    }

    pub(crate) fn do_asset_settle(
        &mut self,
        op: &AssetSettle,
    ) -> Result<OperationResult, MarketError> {
        if op.amount.amount <= 0 {
            return Err(MarketError::validation("settle amount must be positive"));
        }
        let mia = self.store.asset(op.amount.asset_id)?.clone();
        if !mia.is_market_issued() {
            return Err(MarketError::validation("can only settle market-issued assets"));
        }
        let bitasset = self.store.bitasset(mia.id)?.clone();
        if !(mia.can_force_settle() || bitasset.has_settlement()) {
            return Err(MarketError::precondition(
                "force settlement is disabled for this asset",
            ));
        }
        if bitasset.is_prediction_market && !bitasset.has_settlement() {
            return Err(MarketError::precondition(
                "prediction markets settle only after the outcome is published",
            ));
        }
        if !bitasset.has_settlement() && !bitasset.feed_is_valid() {
            return Err(MarketError::InsufficientFeeds);
        }
        if self.store.balance(op.account, op.amount.asset_id) < op.amount.amount {
            return Err(MarketError::InsufficientBalance {
                required: format!("{}", op.amount),
                available: format!(
                    "{} of {}",
                    self.store.balance(op.account, op.amount.asset_id),
                    op.amount.asset_id
                ),
            });
        }

        if bitasset.has_settlement() {
            // Redeem instantly against the settlement fund.
            let supply = self.store.asset_dynamic(mia.id)?.current_supply;
            let mut settled = op.amount.mul_price(bitasset.settlement_price)?;
            if op.amount.amount == supply {
                // The last holder takes the whole fund, leaving no residue.
                settled.amount = bitasset.settlement_fund;
            } else if settled.amount > bitasset.settlement_fund {
                return Err(MarketError::internal("settlement fund cannot cover redemption"));
            }
            if settled.amount == 0 && !bitasset.is_prediction_market {
                return Err(MarketError::precondition(
                    "amount too small to receive anything after rounding",
                ));
            }

            let mut pays = op.amount;
            if op.amount.amount != supply && settled.amount != 0 {
                // Burn only what the payout is actually worth.
                pays = settled.multiply_and_round_up(bitasset.settlement_price)?;
            }

            self.store.adjust_balance(op.account, -pays)?;
            let mut paid_out = settled;
            if settled.amount > 0 {
                self.store
                    .modify_bitasset(mia.id, |b| b.settlement_fund -= settled.amount)?;
                let issuer_fees =
                    self.pay_market_fees(Some(op.account), settled.asset_id, settled, false)?;
                paid_out = settled - issuer_fees;
                let settle_fees = self.pay_force_settle_fees(mia.id, paid_out)?;
                paid_out -= settle_fees;
                if paid_out.amount > 0 {
                    self.store.adjust_balance(op.account, paid_out)?;
                }
            }
            self.store
                .modify_asset_dynamic(mia.id, |d| d.current_supply -= pays.amount)?;
            Ok(OperationResult::Amount(paid_out))
        } else {
            // Queue a request; the escrowed balance leaves the account now.
            self.store.adjust_balance(op.account, -op.amount)?;
            let id = self.store.create_settlement(
                op.account,
                op.amount,
                self.time() + bitasset.options.force_settlement_delay_sec,
            );
            Ok(OperationResult::ObjectId(id.value()))
        }
    }

    pub(crate) fn do_asset_global_settle(
        &mut self,
        op: &AssetGlobalSettle,
    ) -> Result<OperationResult, MarketError> {
        let mia = self.store.asset(op.asset_to_settle)?.clone();
        if !mia.is_market_issued() {
            return Err(MarketError::validation(
                "can only globally settle market-issued assets",
            ));
        }
        if !mia.can_global_settle() {
            return Err(MarketError::precondition(
                "the global-settle permission of this asset is disabled",
            ));
        }
        if mia.issuer != op.issuer {
            return Err(MarketError::validation("only the issuer can globally settle"));
        }
        if self.store.asset_dynamic(mia.id)?.current_supply <= 0 {
            return Err(MarketError::precondition(
                "cannot globally settle an asset with zero supply",
            ));
        }
        let bitasset = self.store.bitasset(mia.id)?.clone();
        if bitasset.has_settlement() {
            return Err(MarketError::precondition(
                "this asset already has a settlement",
            ));
        }
        op.settle_price.validate()?;
        if op.settle_price.base.asset_id != mia.id
            || op.settle_price.quote.asset_id != bitasset.options.short_backing_asset
        {
            return Err(MarketError::validation(
                "settle price must be quoted in the backing asset",
            ));
        }

        let least = self
            .store
            .least_collateralized_call(bitasset.options.short_backing_asset, mia.id)
            .ok_or_else(|| MarketError::internal("no debt position found"))?;
        let least = self.store.call_order(least)?.clone();
        let needed = least.debt_amount().mul_price(op.settle_price)?;
        if needed.amount > least.collateral {
            return Err(MarketError::precondition(
                "least collateralized position lacks collateral to settle at this price",
            ));
        }

        self.globally_settle_asset(mia.id, op.settle_price)?;
        Ok(OperationResult::None)
    }

    pub(crate) fn do_asset_update_bitasset(
        &mut self,
        op: &AssetUpdateBitasset,
    ) -> Result<OperationResult, MarketError> {
        let asset = self.store.asset(op.asset_to_update)?.clone();
        if !asset.is_market_issued() {
            return Err(MarketError::validation(
                "cannot update smartcoin settings on a non-smartcoin",
            ));
        }
        if asset.issuer != op.issuer {
            return Err(MarketError::validation("only the issuer can update the asset"));
        }
        let bitasset = self.store.bitasset(op.asset_to_update)?.clone();
        if bitasset.has_settlement() {
            return Err(MarketError::precondition(
                "cannot update a smartcoin after a global settlement",
            ));
        }

        let new = &op.new_options;
        if new.force_settlement_offset_percent >= FULL_PERCENT {
            return Err(MarketError::validation("settlement offset must stay below 100%"));
        }

        let backing_changed = new.short_backing_asset != bitasset.options.short_backing_asset;
        if backing_changed {
            let dynamic = self.store.asset_dynamic(asset.id)?.clone();
            if dynamic.current_supply != 0 {
                return Err(MarketError::precondition(
                    "cannot change the backing asset while supply exists",
                ));
            }
            if dynamic.accumulated_collateral_fees != 0 {
                return Err(MarketError::precondition(
                    "claim collateral-denominated fees before changing the backing asset",
                ));
            }
            if new.short_backing_asset == asset.id {
                return Err(MarketError::validation("asset cannot be backed by itself"));
            }
            let new_backing = self.store.asset(new.short_backing_asset)?.clone();
            if bitasset.is_prediction_market && asset.precision != new_backing.precision {
                return Err(MarketError::validation(
                    "prediction markets require equal precision with the backing asset",
                ));
            }
            // Anything backed by this asset pins the chain depth at two.
            for child in self.store.bitassets_backed_by(asset.id) {
                if child == new.short_backing_asset {
                    return Err(MarketError::validation(
                        "circular backing between two smartcoins",
                    ));
                }
                if new_backing.is_market_issued() {
                    return Err(MarketError::validation(
                        "an asset with smartcoin children must be backed by a basic asset",
                    ));
                }
            }
            if new_backing.is_market_issued() {
                let backing_backing =
                    self.store.bitasset(new_backing.id)?.options.short_backing_asset;
                if !backing_backing.is_core()
                    && self.store.asset(backing_backing)?.is_market_issued()
                {
                    return Err(MarketError::validation(
                        "backing chains may be at most two smartcoins deep",
                    ));
                }
            }
        }

        // Which changes force a median recomputation or a margin sweep.
        let should_update_feeds = backing_changed
            || new.minimum_feeds != bitasset.options.minimum_feeds
            || new.feed_lifetime_sec != bitasset.options.feed_lifetime_sec
            || new.maintenance_collateral_ratio != bitasset.options.maintenance_collateral_ratio
            || new.maximum_short_squeeze_ratio != bitasset.options.maximum_short_squeeze_ratio
            || new.initial_collateral_ratio != bitasset.options.initial_collateral_ratio;
        let mcfr_changed = new.margin_call_fee_ratio != bitasset.options.margin_call_fee_ratio;

        let now = self.time();
        let witness_or_committee_fed =
            asset.options.flags & (asset_flags::WITNESS_FED | asset_flags::COMMITTEE_FED) != 0;
        let old_feed = bitasset.current_feed;
        let mut feed_changed = false;
        self.store.modify_bitasset(asset.id, |b| {
            b.options = op.new_options.clone();
            if backing_changed {
                if witness_or_committee_fed {
                    b.feeds.clear();
                } else {
                    // Producer feeds cannot simply vanish; blank their
                    // prices so the median ignores them.
                    for (_, feed) in b.feeds.values_mut() {
                        feed.settlement_price = Price::null();
                    }
                }
            }
            if should_update_feeds {
                b.update_median_feeds(now);
                feed_changed = !old_feed.margin_call_params_equal(&b.current_feed);
            }
        })?;
        self.store
            .bitasset(asset.id)?
            .validate_options(self.params.block_interval_sec)?;

        if feed_changed || mcfr_changed {
            self.check_call_orders(asset.id, true)?;
        }
        Ok(OperationResult::None)
    }

    pub(crate) fn do_asset_update_feed_producers(
        &mut self,
        op: &AssetUpdateFeedProducers,
    ) -> Result<OperationResult, MarketError> {
        if op.new_feed_producers.len() > self.params.maximum_feed_publishers {
            return Err(MarketError::validation(
                "more feed producers than the chain allows",
            ));
        }
        let asset = self.store.asset(op.asset_to_update)?.clone();
        if !asset.is_market_issued() {
            return Err(MarketError::validation(
                "cannot set feed producers on a non-smartcoin",
            ));
        }
        if asset.options.flags & asset_flags::COMMITTEE_FED != 0 {
            return Err(MarketError::validation(
                "cannot set feed producers on a committee-fed asset",
            ));
        }
        if asset.options.flags & asset_flags::WITNESS_FED != 0 {
            return Err(MarketError::validation(
                "cannot set feed producers on a witness-fed asset",
            ));
        }
        if asset.issuer != op.issuer {
            return Err(MarketError::validation("only the issuer can update feed producers"));
        }
        for producer in &op.new_feed_producers {
            self.store.account(*producer)?;
        }

        let now = self.time();
        self.store.modify_bitasset(asset.id, |b| {
            // Keep surviving producers' feeds, drop the rest, and open an
            // empty slot for each newcomer.
            b.feeds.retain(|producer, _| op.new_feed_producers.contains(producer));
            for producer in &op.new_feed_producers {
                b.feeds.entry(*producer).or_insert((0, PriceFeed::default()));
            }
            b.update_median_feeds(now);
        })?;

        self.check_call_orders(asset.id, true)?;
        Ok(OperationResult::None)
    }

    pub(crate) fn do_asset_publish_feed(
        &mut self,
        op: &AssetPublishFeed,
    ) -> Result<OperationResult, MarketError> {
        let asset = self.store.asset(op.asset_id)?.clone();
        if !asset.is_market_issued() {
            return Err(MarketError::validation(
                "can only publish feeds for market-issued assets",
            ));
        }
        let bitasset = self.store.bitasset(op.asset_id)?.clone();
        if bitasset.is_prediction_market && bitasset.has_settlement() {
            return Err(MarketError::precondition(
                "no feeds may follow a prediction market's outcome",
            ));
        }
        op.feed.validate()?;
        if !op.feed.settlement_price.is_null() {
            if op.feed.settlement_price.base.asset_id != op.asset_id
                || op.feed.settlement_price.quote.asset_id != bitasset.options.short_backing_asset
            {
                return Err(MarketError::validation(
                    "feed price must be quoted in the backing asset",
                ));
            }
        }
        if !op.feed.core_exchange_rate.is_null()
            && op.feed.core_exchange_rate.quote.asset_id != AssetId::CORE
        {
            return Err(MarketError::validation(
                "core exchange rate must be quoted against the core asset",
            ));
        }

        // Publisher authority: witness- and committee-fed assets accept
        // only their blessed publisher, others require membership in the
        // producer set.
        if asset.options.flags & asset_flags::WITNESS_FED != 0 {
            if op.publisher != AccountId::WITNESS {
                return Err(MarketError::precondition(
                    "only witnesses may publish feeds for this asset",
                ));
            }
        } else if asset.options.flags & asset_flags::COMMITTEE_FED != 0 {
            if op.publisher != AccountId::COMMITTEE {
                return Err(MarketError::precondition(
                    "only the committee may publish feeds for this asset",
                ));
            }
        } else if !bitasset.feeds.contains_key(&op.publisher) {
            return Err(MarketError::precondition(
                "account is not among this asset's feed producers",
            ));
        }

        let now = self.time();
        let old_feed = bitasset.current_feed;
        self.store.modify_bitasset(op.asset_id, |b| {
            b.feeds.insert(op.publisher, (now, op.feed));
            b.update_median_feeds(now);
        })?;

        let updated = self.store.bitasset(op.asset_id)?.clone();
        if !old_feed.margin_call_params_equal(&updated.current_feed) {
            // A returning feed may revive a settled asset before the
            // margin sweep runs.
            if updated.has_settlement() && updated.feed_is_valid() {
                let supply = self.store.asset_dynamic(op.asset_id)?.current_supply;
                let should_revive = if supply == 0 {
                    true
                } else {
                    let fund_collateralization = Price::new(
                        AssetAmount::new(
                            updated.settlement_fund,
                            updated.options.short_backing_asset,
                        ),
                        AssetAmount::new(supply, op.asset_id),
                    );
                    match updated.current_maintenance_collateralization {
                        Some(mc) => fund_collateralization > mc,
                        None => false,
                    }
                };
                if should_revive {
                    self.revive_bitasset(op.asset_id)?;
                }
            }
            self.check_call_orders(op.asset_id, true)?;
        }
        Ok(OperationResult::None)
    }

    pub(crate) fn do_asset_claim_fees(
        &mut self,
        op: &AssetClaimFees,
    ) -> Result<OperationResult, MarketError> {
        if op.amount_to_claim.amount <= 0 {
            return Err(MarketError::validation("claim amount must be positive"));
        }
        let container_id = op.claim_from_asset.unwrap_or(op.amount_to_claim.asset_id);
        let container = self.store.asset(container_id)?.clone();
        if container.issuer != op.issuer {
            return Err(MarketError::validation("asset fees may only be claimed by the issuer"));
        }

        if container_id == op.amount_to_claim.asset_id {
            let available = self.store.asset_dynamic(container_id)?.accumulated_fees;
            if op.amount_to_claim.amount > available {
                return Err(MarketError::precondition(
                    "claiming more fees than have accumulated",
                ));
            }
            self.store.modify_asset_dynamic(container_id, |d| {
                d.accumulated_fees -= op.amount_to_claim.amount;
            })?;
        } else {
            let backing = self.store.bitasset(container_id)?.options.short_backing_asset;
            if backing != op.amount_to_claim.asset_id {
                return Err(MarketError::precondition(
                    "asset neither is nor is backed by the claimed asset",
                ));
            }
            let available = self
                .store
                .asset_dynamic(container_id)?
                .accumulated_collateral_fees;
            if op.amount_to_claim.amount > available {
                return Err(MarketError::precondition(
                    "claiming more backing-asset fees than have accumulated",
                ));
            }
            self.store.modify_asset_dynamic(container_id, |d| {
                d.accumulated_collateral_fees -= op.amount_to_claim.amount;
            })?;
        }

        self.store.adjust_balance(op.issuer, op.amount_to_claim)?;
        Ok(OperationResult::None)
    }

    pub(crate) fn do_asset_fund_fee_pool(
        &mut self,
        op: &AssetFundFeePool,
    ) -> Result<OperationResult, MarketError> {
        if op.amount <= 0 {
            return Err(MarketError::validation("funding amount must be positive"));
        }
        self.store.asset(op.asset_id)?;
        self.store
            .adjust_balance(op.from_account, -AssetAmount::core(op.amount))?;
        self.store
            .modify_asset_dynamic(op.asset_id, |d| d.fee_pool += op.amount)?;
        Ok(OperationResult::None)
    }
}
