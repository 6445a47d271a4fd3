//! Order matching, margin calls, fills and cancels
//!
//! Three match functions drive the market: limit against limit, limit
//! against call, and call against settle request. `apply_order` runs a
//! freshly placed limit order through the book, consulting margin calls
//! when the order bids on the collateral of an undercollateralized
//! market. `check_call_orders` is the sweep that executes margin calls
//! after a feed or position change.
//!
//! Every loop here copies the next index key before acting, because a
//! match may delete the element the cursor points at.

use crate::engine::Engine;
use object_store::BookKey;
use tracing::{debug, error};
use types::prelude::*;

/// Bit set when the taker side was removed by a match.
const TAKER_FILLED: u8 = 1;
/// Bit set when the maker side was removed by a match.
const MAKER_FILLED: u8 = 2;

impl Engine {
    /// Run a new limit order through the market.
    ///
    /// Returns true if the order was completely consumed (filled, or
    /// culled as dust), false if a remainder stays on the book.
    pub(crate) fn apply_order(&mut self, order_id: LimitOrderId) -> Result<bool, MarketError> {
        let order = self.store.limit_order(order_id)?.clone();
        let sell_asset_id = order.sell_asset_id();
        let recv_asset_id = order.receive_asset_id();
        let own_key = BookKey::new(order.sell_price, order_id);

        // Only the order at the front of its side of the book can match;
        // anything behind an unmatched better order cannot match either.
        if self.store.has_limit_order_ahead(own_key) {
            return Ok(false);
        }

        // Margin calls join the match only when this order is bidding on
        // the collateral of a live, feed-protected smartcoin market and
        // its price reaches the margin-call bound.
        let mut check_calls = false;
        let mut call_pays_price = Price::null();
        let mut call_match_bound = Price::null();
        let mut feed = PriceFeed::default();
        let mut current_mc: Option<Price> = None;
        let sell_asset = self.store.asset(sell_asset_id)?.clone();
        if sell_asset.is_market_issued() {
            let bitasset = self.store.bitasset(sell_asset_id)?.clone();
            if bitasset.options.short_backing_asset == recv_asset_id
                && !bitasset.is_prediction_market
                && !bitasset.has_settlement()
                && bitasset.feed_is_valid()
            {
                let mcop = bitasset
                    .current_feed
                    .margin_call_order_price(bitasset.options.margin_call_fee_ratio)?;
                call_match_bound = mcop.invert();
                call_pays_price = bitasset.current_feed.max_short_squeeze_price()?;
                feed = bitasset.current_feed;
                current_mc = bitasset.current_maintenance_collateralization;
                if order.sell_price.invert() <= call_match_bound {
                    check_calls = true;
                }
            }
        }

        // Opposing orders must offer at least the new order's own ask.
        let worst_opposing = order.sell_price.invert();
        let mut limit_cursor = self.store.best_limit_key(recv_asset_id, sell_asset_id);
        let mut finished = false;

        if check_calls {
            // Opposing limits priced strictly better than the margin-call
            // bound trade first; limits beat calls at equal price.
            while !finished {
                let Some(key) = limit_cursor else { break };
                if key.price < worst_opposing || !(key.price > call_match_bound) {
                    break;
                }
                let next = self.store.next_limit_key_after(key, recv_asset_id, sell_asset_id);
                let result = self.match_limit_limit(order_id, key.id, key.price)?;
                finished = result != MAKER_FILLED;
                limit_cursor = next;
            }

            // Then the margin calls, weakest position first.
            while !finished {
                let Some(call_id) =
                    self.store.least_collateralized_call(recv_asset_id, sell_asset_id)
                else {
                    break;
                };
                let call = self.store.call_order(call_id)?.clone();
                match current_mc {
                    Some(mc) if call.collateralization() <= mc => {}
                    _ => break,
                }
                let debt_before = call.debt;
                let result =
                    self.match_limit_call(order_id, call_id, call_pays_price, &feed, current_mc)?;
                if result & TAKER_FILLED != 0 {
                    finished = true;
                }
                if result == 0 {
                    // A target-ratio position that covered nothing makes no
                    // progress; stop instead of spinning on it.
                    let unchanged = self
                        .store
                        .find_call_order(call_id)
                        .map(|c| c.debt == debt_before)
                        .unwrap_or(false);
                    if unchanged {
                        break;
                    }
                }
            }
        }

        // Finally the remaining opposing limit orders.
        while !finished {
            let Some(key) = limit_cursor else { break };
            if key.price < worst_opposing {
                break;
            }
            let next = self.store.next_limit_key_after(key, recv_asset_id, sell_asset_id);
            let result = self.match_limit_limit(order_id, key.id, key.price)?;
            finished = result != MAKER_FILLED;
            limit_cursor = next;
        }

        match self.store.find_limit_order(order_id) {
            None => Ok(true),
            Some(order) => {
                let order = order.clone();
                self.maybe_cull_small(&order)
            }
        }
    }

    /// Match two limit orders at `match_price` (the maker's price). The
    /// first argument is the taker. Returns the filled-side bit field.
    pub(crate) fn match_limit_limit(
        &mut self,
        taker_id: LimitOrderId,
        maker_id: LimitOrderId,
        match_price: Price,
    ) -> Result<u8, MarketError> {
        let taker = self.store.limit_order(taker_id)?.clone();
        let maker = self.store.limit_order(maker_id)?.clone();
        if taker.sell_price.quote.asset_id != maker.sell_price.base.asset_id
            || taker.sell_price.base.asset_id != maker.sell_price.quote.asset_id
        {
            return Err(MarketError::internal("matched orders span different markets"));
        }
        if taker.for_sale <= 0 || maker.for_sale <= 0 {
            return Err(MarketError::internal("matched an empty order"));
        }

        let taker_for_sale = taker.amount_for_sale();
        let maker_for_sale = maker.amount_for_sale();

        let taker_receives;
        let maker_receives;
        let mut cull_taker = false;

        if taker_for_sale.le(&maker_for_sale.mul_price(match_price)?) {
            // Taker is the smaller side; round its receive leg down.
            let receives = taker_for_sale.mul_price(match_price)?;
            // A partially filled taker can end up paying something for
            // nothing; call it filled and let the cull remove it.
            if receives.amount == 0 {
                return Ok(TAKER_FILLED);
            }
            maker_receives = receives.multiply_and_round_up(match_price)?;
            taker_receives = receives;
            cull_taker = true;
        } else {
            // Maker is the smaller side. A maker paying something for
            // nothing would have been culled already.
            maker_receives = maker_for_sale.mul_price(match_price)?;
            taker_receives = maker_receives.multiply_and_round_up(match_price)?;
        }

        let taker_pays = maker_receives;
        let maker_pays = taker_receives;

        let mut result = 0u8;
        result |= u8::from(self.fill_limit_order(
            taker_id,
            taker_pays,
            taker_receives,
            cull_taker,
            match_price,
            false,
        )?);
        result |= u8::from(self.fill_limit_order(
            maker_id,
            maker_pays,
            maker_receives,
            true,
            match_price,
            true,
        )?) << 1;
        if result == 0 {
            return Err(MarketError::internal("match consumed neither order"));
        }
        Ok(result)
    }

    /// Match a limit order bidding on collateral against a margin-called
    /// debt position. The limit side receives at its own sell price; the
    /// position surrenders collateral at `call_pays_price` (the short
    /// squeeze price), and the difference accrues to the asset issuer as
    /// the margin-call fee.
    ///
    /// May return 0 when the position's target collateral ratio limits
    /// its response.
    pub(crate) fn match_limit_call(
        &mut self,
        bid_id: LimitOrderId,
        call_id: CallOrderId,
        call_pays_price: Price,
        feed: &PriceFeed,
        current_mc: Option<Price>,
    ) -> Result<u8, MarketError> {
        let bid = self.store.limit_order(bid_id)?.clone();
        let call = self.store.call_order(call_id)?.clone();
        if bid.sell_asset_id() != call.debt_asset || bid.receive_asset_id() != call.collateral_asset
        {
            return Err(MarketError::internal("limit and call span different markets"));
        }
        if bid.for_sale <= 0 || call.debt <= 0 || call.collateral <= 0 {
            return Err(MarketError::internal("matched an empty order"));
        }

        let match_price = bid.sell_price;
        let usd_for_sale = bid.amount_for_sale();
        let usd_to_buy = AssetAmount::new(
            call.max_debt_to_cover(
                call_pays_price,
                feed.settlement_price,
                feed.maintenance_collateral_ratio,
                current_mc,
            )?,
            call.debt_asset,
        );
        if usd_to_buy.amount == 0 {
            return Ok(0);
        }

        let call_pays;
        let call_receives;
        let order_receives;
        let mut cull_taker = false;

        if usd_to_buy.amount > usd_for_sale.amount {
            // The limit order is the smaller side.
            let receives = usd_for_sale.mul_price(match_price)?;
            if receives.amount == 0 {
                return Ok(TAKER_FILLED);
            }
            call_pays = usd_for_sale.mul_price(call_pays_price)?;
            call_receives = receives.multiply_and_round_up(match_price)?;
            order_receives = receives;
            cull_taker = true;
        } else {
            // The position's cover limit is the smaller side.
            call_receives = usd_to_buy;
            order_receives = usd_to_buy.multiply_and_round_up(match_price)?;
            call_pays = usd_to_buy.multiply_and_round_up(call_pays_price)?;
        }
        let order_pays = call_receives;

        if call_pays.amount < order_receives.amount {
            return Err(MarketError::internal("margin call fee would be negative"));
        }
        let margin_call_fee = call_pays - order_receives;

        let mut result = 0u8;
        result |= u8::from(self.fill_limit_order(
            bid_id,
            order_pays,
            order_receives,
            cull_taker,
            match_price,
            false,
        )?);
        result |= u8::from(self.fill_call_order(
            call_id,
            call_pays,
            call_receives,
            match_price,
            true,
            margin_call_fee,
        )?) << 1;
        Ok(result)
    }

    /// Match a debt position against a due settle request at
    /// `match_price`, bounded by `max_settlement`. Returns the debt
    /// amount actually covered; zero means nothing could settle (dust).
    pub(crate) fn match_call_settle(
        &mut self,
        call_id: CallOrderId,
        settle_id: SettlementId,
        match_price: Price,
        max_settlement: AssetAmount,
        fill_price: Price,
    ) -> Result<AssetAmount, MarketError> {
        let call = self.store.call_order(call_id)?.clone();
        let settle = self.store.settlement(settle_id)?.clone();
        if call.debt_asset != settle.balance.asset_id {
            return Err(MarketError::internal("settle request against a different debt asset"));
        }
        if call.debt <= 0 || call.collateral <= 0 || settle.balance.amount <= 0 {
            return Err(MarketError::internal("matched an empty position or request"));
        }

        let settle_for_sale = settle.balance.min(max_settlement);
        let call_debt = call.debt_amount();
        let mut call_receives = settle_for_sale.min(call_debt);
        let mut call_pays = call_receives.mul_price(match_price)?;

        let mut cull_settle = false;
        if call_pays.amount == 0 {
            if call_receives.amount == call_debt.amount {
                // Wholly consumed position: pay one unit rather than
                // getting its debt covered for nothing.
                call_pays.amount = 1;
            } else {
                if call_receives.amount == settle.balance.amount {
                    // The whole request is dust; drop it.
                    self.cancel_settle_order(settle_id, true)?;
                }
                return Ok(AssetAmount::zero(settle.balance.asset_id));
            }
        } else if call_receives.amount == call_debt.amount {
            // Wholly consumed position: round in the settler's favor.
            call_pays = call_receives.multiply_and_round_up(match_price)?;
        } else {
            if call_receives.amount == settle.balance.amount {
                cull_settle = true;
            }
            // Recompute the covered debt from the rounded-down payment;
            // this never increases call_receives.
            call_receives = call_pays.multiply_and_round_up(match_price)?;
            if call_receives.amount == settle.balance.amount {
                cull_settle = false;
            }
        }

        let settle_pays = call_receives;
        let settle_receives = call_pays;

        self.fill_call_order(
            call_id,
            call_pays,
            call_receives,
            fill_price,
            true,
            AssetAmount::zero(call.collateral_asset),
        )?;
        self.fill_settle_order(settle_id, settle_pays, settle_receives, fill_price, false)?;

        if cull_settle {
            self.cancel_settle_order(settle_id, true)?;
        }
        Ok(call_receives)
    }

    /// Execute one side of a fill against a limit order.
    ///
    /// Charges market fees on the receive leg, applies the maker discount
    /// to any deferred creation fee on the first fill, and removes or
    /// shrinks the order. Returns true if the order is gone.
    pub(crate) fn fill_limit_order(
        &mut self,
        order_id: LimitOrderId,
        pays: AssetAmount,
        receives: AssetAmount,
        cull_if_small: bool,
        fill_price: Price,
        is_maker: bool,
    ) -> Result<bool, MarketError> {
        let order = self.store.limit_order(order_id)?.clone();
        if order.sell_asset_id() != pays.asset_id || pays.asset_id == receives.asset_id {
            return Err(MarketError::internal("fill legs do not match the order"));
        }
        let seller = order.seller;

        let issuer_fees =
            self.pay_market_fees(Some(seller), receives.asset_id, receives, is_maker)?;
        self.pay_order(seller, receives - issuer_fees, pays)?;

        self.push_applied(VirtualOperation::FillOrder {
            order: OrderRef::Limit(order_id),
            account: seller,
            pays,
            receives,
            fee: issuer_fees,
            fill_price,
            is_maker,
        });

        // Deferred creation fee: a maker discount refunds part of it on
        // the first fill, the rest is really paid out.
        let discount = self.params.maker_fee_discount_percent;
        let mut deferred_fee = order.deferred_fee;
        let deferred_paid = order.deferred_paid_fee;

        if deferred_paid.amount > 0 {
            let mut fee_pool_refund: ShareAmount = 0;
            let mut paid_remaining = deferred_paid.amount;
            if is_maker && discount > 0 {
                let refund = calculate_percent(deferred_paid.amount, discount)?;
                // A tiny fee can round the refund to zero; skip entirely then.
                if refund > 0 {
                    if refund > deferred_paid.amount || deferred_fee <= 0 {
                        return Err(MarketError::internal("maker discount out of bounds"));
                    }
                    self.store
                        .adjust_balance(seller, AssetAmount::new(refund, deferred_paid.asset_id))?;
                    paid_remaining -= refund;
                    fee_pool_refund = calculate_percent(deferred_fee, discount)?;
                    if fee_pool_refund > deferred_fee {
                        return Err(MarketError::internal("maker discount out of bounds"));
                    }
                    deferred_fee -= fee_pool_refund;
                }
            }
            self.store.modify_asset_dynamic(deferred_paid.asset_id, |d| {
                d.accumulated_fees += paid_remaining;
                d.fee_pool += fee_pool_refund;
            })?;
        }

        if order.deferred_fee > 0 {
            if deferred_paid.amount <= 0 && is_maker && discount > 0 {
                let refund = calculate_percent(deferred_fee, discount)?;
                if refund > 0 {
                    if refund > deferred_fee {
                        return Err(MarketError::internal("maker discount out of bounds"));
                    }
                    self.store.adjust_balance(seller, AssetAmount::core(refund))?;
                    deferred_fee -= refund;
                }
            }
            if deferred_fee > 0 {
                let threshold = self.params.cashback_vesting_threshold;
                self.store
                    .modify_account_stats(seller, |s| s.pay_fee(deferred_fee, threshold))?;
            }
        }

        if pays.amount == order.for_sale {
            self.store.remove_limit_order(order_id)?;
            return Ok(true);
        }
        self.store.modify_limit_order(order_id, |o| {
            o.for_sale -= pays.amount;
            // Later fills carry no deferred fee.
            o.deferred_fee = 0;
            o.deferred_paid_fee.amount = 0;
        })?;
        if cull_if_small {
            let updated = self.store.limit_order(order_id)?.clone();
            return self.maybe_cull_small(&updated);
        }
        Ok(false)
    }

    /// Execute one side of a fill against a debt position: the position
    /// repays `receives` of debt (burned from supply) and surrenders
    /// `pays` of collateral, `margin_call_fee` of which goes to the
    /// issuer. Returns true if the position closed.
    pub(crate) fn fill_call_order(
        &mut self,
        call_id: CallOrderId,
        pays: AssetAmount,
        receives: AssetAmount,
        fill_price: Price,
        is_maker: bool,
        margin_call_fee: AssetAmount,
    ) -> Result<bool, MarketError> {
        let call = self.store.call_order(call_id)?.clone();
        if call.debt_asset != receives.asset_id || call.collateral_asset != pays.asset_id {
            return Err(MarketError::internal("fill legs do not match the position"));
        }
        if call.collateral < pays.amount {
            return Err(MarketError::internal("position pays more than its collateral"));
        }

        let mut collateral_freed: Option<AssetAmount> = None;
        self.store.modify_call_order(call_id, |o| {
            o.debt -= receives.amount;
            o.collateral -= pays.amount;
            if o.debt == 0 {
                collateral_freed = Some(o.collateral_amount());
                o.collateral = 0;
            }
        })?;

        // Debt repaid is supply burned.
        self.store
            .modify_asset_dynamic(receives.asset_id, |d| d.current_supply -= receives.amount)?;

        if let Some(freed) = collateral_freed {
            self.store.adjust_balance(call.borrower, freed)?;
        }
        if pays.asset_id.is_core() {
            self.store.modify_account_stats(call.borrower, |s| {
                s.total_core_in_orders -= pays.amount;
                if let Some(freed) = collateral_freed {
                    s.total_core_in_orders -= freed.amount;
                }
            })?;
        }
        if margin_call_fee.amount != 0 {
            self.accumulate_fee(receives.asset_id, margin_call_fee)?;
        }

        self.push_applied(VirtualOperation::FillOrder {
            order: OrderRef::Call(call_id),
            account: call.borrower,
            pays,
            receives,
            fee: margin_call_fee,
            fill_price,
            is_maker,
        });

        if collateral_freed.is_some() {
            self.store.remove_call_order(call_id)?;
        }
        Ok(collateral_freed.is_some())
    }

    /// Execute one side of a fill against a settle request: the settler
    /// yields `pays` of the debt asset and receives collateral net of
    /// market and force-settle fees. Returns true if the request is gone.
    pub(crate) fn fill_settle_order(
        &mut self,
        settle_id: SettlementId,
        pays: AssetAmount,
        receives: AssetAmount,
        fill_price: Price,
        is_maker: bool,
    ) -> Result<bool, MarketError> {
        let settle = self.store.settlement(settle_id)?.clone();
        if pays.asset_id == receives.asset_id {
            return Err(MarketError::internal("fill legs do not match the request"));
        }

        let market_fees =
            self.pay_market_fees(Some(settle.owner), receives.asset_id, receives, is_maker)?;
        let settle_fees = self.pay_force_settle_fees(pays.asset_id, receives - market_fees)?;
        let total_fees = market_fees + settle_fees;

        let mut filled = false;
        if pays.amount < settle.balance.amount {
            self.store.modify_settlement(settle_id, |s| s.balance -= pays)?;
        } else {
            filled = true;
        }
        self.store.adjust_balance(settle.owner, receives - total_fees)?;

        self.push_applied(VirtualOperation::FillOrder {
            order: OrderRef::Settlement(settle_id),
            account: settle.owner,
            pays,
            receives,
            fee: total_fees,
            fill_price,
            is_maker,
        });

        if filled {
            self.store.remove_settlement(settle_id)?;
        }
        Ok(filled)
    }

    /// Credit the receiver with its fill proceeds, releasing the core
    /// locked by the paying side.
    fn pay_order(
        &mut self,
        receiver: AccountId,
        receives: AssetAmount,
        pays: AssetAmount,
    ) -> Result<(), MarketError> {
        if pays.asset_id.is_core() {
            self.store
                .modify_account_stats(receiver, |s| s.total_core_in_orders -= pays.amount)?;
        }
        self.store.adjust_balance(receiver, receives)
    }

    /// Cull an order whose remainder would fetch nothing at its own
    /// price. Returns true if the order was cancelled.
    pub(crate) fn maybe_cull_small(&mut self, order: &LimitOrder) -> Result<bool, MarketError> {
        if order.amount_to_receive()?.amount == 0 {
            debug!(order = %order.id, "culling dust order");
            self.cancel_limit_order(order.id, true, false)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Cancel a limit order: refund the remainder and the deferred fees,
    /// optionally charging the cancellation fee out of the deferred fee
    /// and emitting a cancel virtual operation.
    pub(crate) fn cancel_limit_order(
        &mut self,
        order_id: LimitOrderId,
        create_virtual_op: bool,
        skip_cancel_fee: bool,
    ) -> Result<(), MarketError> {
        let order = self.store.limit_order(order_id)?.clone();
        let mut deferred_fee = order.deferred_fee;
        let mut deferred_paid_fee = order.deferred_paid_fee;
        let mut vop_fee = AssetAmount::core(0);

        if create_virtual_op && !skip_cancel_fee && deferred_fee > 0 {
            let cancel_fee = self.params.limit_order_cancel_fee.min(deferred_fee);
            if cancel_fee > 0 {
                let threshold = self.params.cashback_vesting_threshold;
                self.store
                    .modify_account_stats(order.seller, |s| s.pay_fee(cancel_fee, threshold))?;
                deferred_fee -= cancel_fee;
                if deferred_paid_fee.amount == 0 {
                    vop_fee = AssetAmount::core(cancel_fee);
                } else {
                    // Charge a proportional slice of the originally paid
                    // fee, rounded up against the seller.
                    let slice = (i128::from(deferred_paid_fee.amount) * i128::from(cancel_fee)
                        + i128::from(order.deferred_fee)
                        - 1)
                        / i128::from(order.deferred_fee);
                    let slice = slice as ShareAmount;
                    self.store.modify_asset_dynamic(deferred_paid_fee.asset_id, |d| {
                        d.accumulated_fees += slice;
                    })?;
                    deferred_paid_fee.amount -= slice;
                    vop_fee = AssetAmount::new(slice, deferred_paid_fee.asset_id);
                }
            }
        }

        let refunded = order.amount_for_sale();
        if refunded.asset_id.is_core() {
            self.store
                .modify_account_stats(order.seller, |s| s.total_core_in_orders -= refunded.amount)?;
        }
        self.store.adjust_balance(order.seller, refunded)?;

        if order.deferred_paid_fee.amount == 0 {
            // Fee was paid in core; the remainder goes back to the seller.
            self.store
                .adjust_balance(order.seller, AssetAmount::core(deferred_fee))?;
        } else {
            // Refund the paid asset to the seller and the advanced core
            // back to that asset's fee pool.
            self.store.adjust_balance(order.seller, deferred_paid_fee)?;
            self.store.modify_asset_dynamic(order.deferred_paid_fee.asset_id, |d| {
                d.fee_pool += deferred_fee;
            })?;
        }

        if create_virtual_op {
            self.push_applied(VirtualOperation::LimitOrderCancelled {
                order: order_id,
                fee_paying_account: order.seller,
                fee: vop_fee,
            });
        }
        self.store.remove_limit_order(order_id)?;
        Ok(())
    }

    /// Cancel a settle request, refunding its escrowed balance.
    pub(crate) fn cancel_settle_order(
        &mut self,
        settle_id: SettlementId,
        create_virtual_op: bool,
    ) -> Result<(), MarketError> {
        let settle = self.store.settlement(settle_id)?.clone();
        self.store.adjust_balance(settle.owner, settle.balance)?;
        if create_virtual_op {
            self.push_applied(VirtualOperation::SettleCancelled {
                settlement: settle_id,
                account: settle.owner,
                amount: settle.balance,
            });
        }
        self.store.remove_settlement(settle_id)?;
        Ok(())
    }

    /// Execute margin calls: walk the undercollateralized positions,
    /// weakest first, against the best bids above the margin-call bound.
    ///
    /// Returns true if any position was at least partially called. When
    /// `enable_black_swan` is false and collateral cannot cover a call,
    /// the whole operation fails instead of settling globally.
    pub fn check_call_orders(
        &mut self,
        mia_id: AssetId,
        enable_black_swan: bool,
    ) -> Result<bool, MarketError> {
        let asset = self.store.asset(mia_id)?.clone();
        if !asset.is_market_issued() {
            return Ok(false);
        }
        let bitasset = self.store.bitasset(mia_id)?.clone();
        if bitasset.is_prediction_market {
            return Ok(false);
        }
        if self.check_for_black_swan(mia_id, enable_black_swan)? {
            return Ok(false);
        }
        if !bitasset.feed_is_valid() {
            return Ok(false);
        }

        let backing = bitasset.options.short_backing_asset;
        let feed = bitasset.current_feed;
        let mcop = feed.margin_call_order_price(bitasset.options.margin_call_fee_ratio)?;
        let mssp = feed.max_short_squeeze_price()?;
        let Some(current_mc) = bitasset.current_maintenance_collateralization else {
            return Ok(false);
        };

        let mut limit_cursor = self.store.best_limit_key(mia_id, backing);
        let mut margin_called = false;

        loop {
            if self.check_for_black_swan(mia_id, enable_black_swan)? {
                break;
            }
            let Some(limit_key) = limit_cursor else { break };
            // Bids below the margin-call bound leave room for nothing.
            if limit_key.price < mcop {
                break;
            }
            let Some(call_id) = self.store.least_collateralized_call(backing, mia_id) else {
                break;
            };
            let call = self.store.call_order(call_id)?.clone();
            // Feed protection: no calls above the maintenance level.
            if current_mc < call.collateralization() {
                break;
            }
            let limit = self.store.limit_order(limit_key.id)?.clone();
            let match_price = limit.sell_price;
            margin_called = true;

            // Sanity: the position must be able to pay the squeeze price
            // for its whole debt, or the market is past saving.
            let full_pays = call.debt_amount().mul_price(mssp)?;
            if full_pays.amount > call.collateral {
                error!(asset = %asset.symbol, call = %call.id, "black swan during margin call sweep");
                if !enable_black_swan {
                    return Err(MarketError::BlackSwanNotAllowed);
                }
                self.globally_settle_asset(mia_id, feed.settlement_price)?;
                return Ok(true);
            }

            let max_cover = call.max_debt_to_cover(
                mssp,
                feed.settlement_price,
                feed.maintenance_collateral_ratio,
                Some(current_mc),
            )?;
            if max_cover == 0 {
                // The weakest position sits exactly at its target; every
                // stronger one will too.
                break;
            }
            let usd_to_buy = AssetAmount::new(max_cover, mia_id);
            let usd_for_sale = limit.amount_for_sale();

            let call_pays;
            let call_receives;
            let limit_receives;
            if usd_to_buy.amount > usd_for_sale.amount {
                let receives = usd_for_sale.mul_price(match_price)?;
                call_pays = usd_for_sale.mul_price(mssp)?;
                call_receives = receives.multiply_and_round_up(match_price)?;
                limit_receives = receives;
            } else {
                call_receives = usd_to_buy;
                limit_receives = usd_to_buy.multiply_and_round_up(match_price)?;
                call_pays = usd_to_buy.multiply_and_round_up(mssp)?;
            }
            let limit_pays = call_receives;

            if call_pays.amount < limit_receives.amount {
                return Err(MarketError::internal("margin call fee would be negative"));
            }
            // Re-check payability against the actually consumed amounts;
            // rounding may ask for one satoshi more than the pre-check.
            if call_pays.amount > call.collateral {
                error!(asset = %asset.symbol, call = %call.id, "black swan on rounded margin call");
                if !enable_black_swan {
                    return Err(MarketError::BlackSwanNotAllowed);
                }
                self.globally_settle_asset(mia_id, feed.settlement_price)?;
                return Ok(true);
            }
            let margin_call_fee = call_pays - limit_receives;

            debug!(
                asset = %asset.symbol,
                call = %call.id,
                covered = call_receives.amount,
                fee = margin_call_fee.amount,
                "margin call executed"
            );

            // The call is the taker here: the resting bid was first.
            self.fill_call_order(call_id, call_pays, call_receives, match_price, false, margin_call_fee)?;

            let next_limit = self.store.next_limit_key_after(limit_key, mia_id, backing);
            let really_filled =
                self.fill_limit_order(limit_key.id, limit_pays, limit_receives, true, match_price, true)?;
            if really_filled {
                limit_cursor = next_limit;
            }
        }

        Ok(margin_called)
    }

    /// Detect an unavoidable black swan: the least collateralized
    /// position cannot cover its debt even at the short squeeze price.
    /// Triggers (or refuses, per `enable_black_swan`) global settlement.
    ///
    /// Returns true when the asset is or becomes globally settled.
    pub(crate) fn check_for_black_swan(
        &mut self,
        mia_id: AssetId,
        enable_black_swan: bool,
    ) -> Result<bool, MarketError> {
        let asset = self.store.asset(mia_id)?.clone();
        if !asset.is_market_issued() {
            return Ok(false);
        }
        let bitasset = self.store.bitasset(mia_id)?.clone();
        if bitasset.has_settlement() {
            return Ok(true);
        }
        if !bitasset.feed_is_valid() || bitasset.is_prediction_market {
            return Ok(false);
        }
        let backing = bitasset.options.short_backing_asset;
        let Some(call_id) = self.store.least_collateralized_call(backing, mia_id) else {
            return Ok(false);
        };
        let call = self.store.call_order(call_id)?.clone();

        let mssp = bitasset.current_feed.max_short_squeeze_price()?;
        // Debt per collateral unit the weakest position can actually pay.
        let break_even = call.collateralization().invert();
        if break_even < mssp {
            return Ok(false);
        }

        error!(asset = %asset.symbol, call = %call.id, "black swan detected");
        if !enable_black_swan {
            return Err(MarketError::BlackSwanNotAllowed);
        }
        let feed_price = bitasset.current_feed.settlement_price;
        if break_even <= feed_price {
            // The feed price still lets every position pay in full.
            self.globally_settle_asset(mia_id, feed_price)?;
        } else {
            // Settle at the weakest position's break-even so it
            // surrenders exactly all of its collateral.
            self.globally_settle_asset(mia_id, break_even)?;
        }
        Ok(true)
    }
}
