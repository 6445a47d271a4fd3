//! The chain state: id-keyed tables plus ordered secondary indices
//!
//! Every mutation of an indexed object goes through a `modify_*` method
//! which removes the old index keys, applies the mutator, and reinserts
//! the new keys. Matching loops therefore follow an advance-then-act
//! discipline: they copy the next key out of the index before calling
//! anything that may delete the current element.

use crate::indices::{BookKey, CollateralKey};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::{Excluded, Included};
use types::prelude::*;

/// Complete engine state. Cloning yields an undo checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Store {
    next_account_id: u64,
    next_asset_id: u64,
    next_limit_order_id: u64,
    next_call_order_id: u64,
    next_settlement_id: u64,

    accounts: BTreeMap<AccountId, Account>,
    account_stats: BTreeMap<AccountId, AccountStatistics>,
    assets: BTreeMap<AssetId, AssetRecord>,
    asset_dynamic: BTreeMap<AssetId, AssetDynamicData>,
    bitassets: BTreeMap<AssetId, BitassetData>,
    balances: BTreeMap<(AccountId, AssetId), ShareAmount>,
    /// Market-fee reward deposits awaiting vesting, per account and asset.
    market_fee_vesting: BTreeMap<(AccountId, AssetId), ShareAmount>,

    limit_orders: BTreeMap<LimitOrderId, LimitOrder>,
    limit_orders_by_price: BTreeSet<BookKey>,
    limit_orders_by_expiration: BTreeSet<(Timestamp, LimitOrderId)>,

    call_orders: BTreeMap<CallOrderId, CallOrder>,
    calls_by_collateral: BTreeSet<CollateralKey>,
    calls_by_account: BTreeSet<(AccountId, AssetId, CallOrderId)>,

    settlements: BTreeMap<SettlementId, ForceSettlement>,
    settlements_by_expiration: BTreeSet<(AssetId, Timestamp, SettlementId)>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Accounts ────────────────────────────────────────────────────────

    pub fn create_account(
        &mut self,
        name: impl Into<String>,
        registrar: AccountId,
        referrer: AccountId,
        referrer_rewards_percentage: u16,
    ) -> AccountId {
        let id = AccountId::new(self.next_account_id);
        self.next_account_id += 1;
        self.accounts.insert(
            id,
            Account {
                id,
                name: name.into(),
                registrar,
                referrer,
                referrer_rewards_percentage,
            },
        );
        self.account_stats.insert(id, AccountStatistics::new(id));
        id
    }

    pub fn account(&self, id: AccountId) -> Result<&Account, MarketError> {
        self.accounts
            .get(&id)
            .ok_or_else(|| MarketError::NotFound(format!("account {id}")))
    }

    pub fn account_stats(&self, id: AccountId) -> Result<&AccountStatistics, MarketError> {
        self.account_stats
            .get(&id)
            .ok_or_else(|| MarketError::NotFound(format!("statistics of account {id}")))
    }

    pub fn modify_account_stats(
        &mut self,
        id: AccountId,
        f: impl FnOnce(&mut AccountStatistics),
    ) -> Result<(), MarketError> {
        let stats = self
            .account_stats
            .get_mut(&id)
            .ok_or_else(|| MarketError::NotFound(format!("statistics of account {id}")))?;
        f(stats);
        Ok(())
    }

    pub fn all_account_stats(&self) -> impl Iterator<Item = &AccountStatistics> {
        self.account_stats.values()
    }

    // ── Assets ──────────────────────────────────────────────────────────

    pub fn create_asset(
        &mut self,
        issuer: AccountId,
        symbol: impl Into<String>,
        precision: u8,
        options: AssetOptions,
        market_issued: bool,
    ) -> AssetId {
        let id = AssetId::new(self.next_asset_id);
        self.next_asset_id += 1;
        self.assets.insert(
            id,
            AssetRecord {
                id,
                issuer,
                symbol: symbol.into(),
                precision,
                options,
                market_issued,
            },
        );
        self.asset_dynamic.insert(id, AssetDynamicData::default());
        id
    }

    pub fn attach_bitasset(&mut self, data: BitassetData) {
        self.bitassets.insert(data.asset_id, data);
    }

    pub fn asset(&self, id: AssetId) -> Result<&AssetRecord, MarketError> {
        self.assets
            .get(&id)
            .ok_or_else(|| MarketError::NotFound(format!("asset {id}")))
    }

    pub fn find_asset(&self, id: AssetId) -> Option<&AssetRecord> {
        self.assets.get(&id)
    }

    pub fn modify_asset(
        &mut self,
        id: AssetId,
        f: impl FnOnce(&mut AssetRecord),
    ) -> Result<(), MarketError> {
        let asset = self
            .assets
            .get_mut(&id)
            .ok_or_else(|| MarketError::NotFound(format!("asset {id}")))?;
        f(asset);
        Ok(())
    }

    pub fn asset_dynamic(&self, id: AssetId) -> Result<&AssetDynamicData, MarketError> {
        self.asset_dynamic
            .get(&id)
            .ok_or_else(|| MarketError::NotFound(format!("dynamic data of asset {id}")))
    }

    pub fn modify_asset_dynamic(
        &mut self,
        id: AssetId,
        f: impl FnOnce(&mut AssetDynamicData),
    ) -> Result<(), MarketError> {
        let dynamic = self
            .asset_dynamic
            .get_mut(&id)
            .ok_or_else(|| MarketError::NotFound(format!("dynamic data of asset {id}")))?;
        f(dynamic);
        Ok(())
    }

    pub fn bitasset(&self, id: AssetId) -> Result<&BitassetData, MarketError> {
        self.bitassets
            .get(&id)
            .ok_or_else(|| MarketError::NotFound(format!("bitasset data of asset {id}")))
    }

    pub fn find_bitasset(&self, id: AssetId) -> Option<&BitassetData> {
        self.bitassets.get(&id)
    }

    pub fn modify_bitasset(
        &mut self,
        id: AssetId,
        f: impl FnOnce(&mut BitassetData),
    ) -> Result<(), MarketError> {
        let data = self
            .bitassets
            .get_mut(&id)
            .ok_or_else(|| MarketError::NotFound(format!("bitasset data of asset {id}")))?;
        f(data);
        Ok(())
    }

    /// Smartcoins backed by the given asset.
    pub fn bitassets_backed_by(&self, backing: AssetId) -> Vec<AssetId> {
        self.bitassets
            .values()
            .filter(|b| b.options.short_backing_asset == backing)
            .map(|b| b.asset_id)
            .collect()
    }

    pub fn all_assets(&self) -> impl Iterator<Item = &AssetRecord> {
        self.assets.values()
    }

    pub fn all_bitassets(&self) -> impl Iterator<Item = &BitassetData> {
        self.bitassets.values()
    }

    pub fn all_asset_dynamic(&self) -> impl Iterator<Item = (&AssetId, &AssetDynamicData)> {
        self.asset_dynamic.iter()
    }

    // ── Balances ────────────────────────────────────────────────────────

    pub fn balance(&self, account: AccountId, asset: AssetId) -> ShareAmount {
        self.balances.get(&(account, asset)).copied().unwrap_or(0)
    }

    /// Apply a signed balance change, refusing to go negative.
    pub fn adjust_balance(
        &mut self,
        account: AccountId,
        delta: AssetAmount,
    ) -> Result<(), MarketError> {
        if delta.amount == 0 {
            return Ok(());
        }
        let entry = self.balances.entry((account, delta.asset_id)).or_insert(0);
        let updated = *entry + delta.amount;
        if updated < 0 {
            return Err(MarketError::InsufficientBalance {
                required: format!("{}", -delta),
                available: format!("{} of {}", *entry, delta.asset_id),
            });
        }
        *entry = updated;
        if updated == 0 {
            self.balances.remove(&(account, delta.asset_id));
        }
        Ok(())
    }

    pub fn all_balances(&self) -> impl Iterator<Item = (&(AccountId, AssetId), &ShareAmount)> {
        self.balances.iter()
    }

    pub fn deposit_market_fee_vesting(&mut self, account: AccountId, amount: AssetAmount) {
        if amount.amount == 0 {
            return;
        }
        *self
            .market_fee_vesting
            .entry((account, amount.asset_id))
            .or_insert(0) += amount.amount;
    }

    pub fn market_fee_vesting_balance(&self, account: AccountId, asset: AssetId) -> ShareAmount {
        self.market_fee_vesting
            .get(&(account, asset))
            .copied()
            .unwrap_or(0)
    }

    pub fn all_market_fee_vesting(
        &self,
    ) -> impl Iterator<Item = (&(AccountId, AssetId), &ShareAmount)> {
        self.market_fee_vesting.iter()
    }

    // ── Limit orders ────────────────────────────────────────────────────

    pub fn create_limit_order(
        &mut self,
        seller: AccountId,
        for_sale: ShareAmount,
        sell_price: Price,
        expiration: Timestamp,
        deferred_fee: ShareAmount,
        deferred_paid_fee: AssetAmount,
    ) -> LimitOrderId {
        let id = LimitOrderId::new(self.next_limit_order_id);
        self.next_limit_order_id += 1;
        let order = LimitOrder {
            id,
            seller,
            for_sale,
            sell_price,
            expiration,
            deferred_fee,
            deferred_paid_fee,
        };
        self.limit_orders_by_price.insert(BookKey::new(sell_price, id));
        self.limit_orders_by_expiration.insert((expiration, id));
        self.limit_orders.insert(id, order);
        id
    }

    pub fn limit_order(&self, id: LimitOrderId) -> Result<&LimitOrder, MarketError> {
        self.limit_orders
            .get(&id)
            .ok_or_else(|| MarketError::NotFound(format!("limit order {id}")))
    }

    pub fn find_limit_order(&self, id: LimitOrderId) -> Option<&LimitOrder> {
        self.limit_orders.get(&id)
    }

    pub fn modify_limit_order(
        &mut self,
        id: LimitOrderId,
        f: impl FnOnce(&mut LimitOrder),
    ) -> Result<(), MarketError> {
        let order = self
            .limit_orders
            .get_mut(&id)
            .ok_or_else(|| MarketError::NotFound(format!("limit order {id}")))?;
        let old_price_key = BookKey::new(order.sell_price, id);
        let old_expiration = (order.expiration, id);
        f(order);
        let new_price_key = BookKey::new(order.sell_price, id);
        let new_expiration = (order.expiration, id);
        if new_price_key != old_price_key {
            self.limit_orders_by_price.remove(&old_price_key);
            self.limit_orders_by_price.insert(new_price_key);
        }
        if new_expiration != old_expiration {
            self.limit_orders_by_expiration.remove(&old_expiration);
            self.limit_orders_by_expiration.insert(new_expiration);
        }
        Ok(())
    }

    pub fn remove_limit_order(&mut self, id: LimitOrderId) -> Result<LimitOrder, MarketError> {
        let order = self
            .limit_orders
            .remove(&id)
            .ok_or_else(|| MarketError::NotFound(format!("limit order {id}")))?;
        self.limit_orders_by_price
            .remove(&BookKey::new(order.sell_price, id));
        self.limit_orders_by_expiration.remove(&(order.expiration, id));
        Ok(order)
    }

    /// First key of the pair's book range: the most aggressive sell order.
    pub fn best_limit_key(&self, sell: AssetId, receive: AssetId) -> Option<BookKey> {
        self.limit_orders_by_price
            .range(BookKey::pair_start(sell, receive)..=BookKey::pair_end(sell, receive))
            .next()
            .copied()
    }

    /// Next key after `after` within the pair's range, i.e. the next-best
    /// order. Snapshot this before mutating at `after`.
    pub fn next_limit_key_after(
        &self,
        after: BookKey,
        sell: AssetId,
        receive: AssetId,
    ) -> Option<BookKey> {
        self.limit_orders_by_price
            .range((Excluded(after), Included(BookKey::pair_end(sell, receive))))
            .next()
            .copied()
    }

    /// Whether any order of the same pair sits ahead of `key` on the book.
    pub fn has_limit_order_ahead(&self, key: BookKey) -> bool {
        let start = BookKey::pair_start(key.price.base.asset_id, key.price.quote.asset_id);
        self.limit_orders_by_price
            .range((Included(start), Excluded(key)))
            .next()
            .is_some()
    }

    pub fn all_limit_orders(&self) -> impl Iterator<Item = &LimitOrder> {
        self.limit_orders.values()
    }

    /// Orders whose expiration has passed, in expiration order.
    pub fn expired_limit_orders(&self, now: Timestamp) -> Vec<LimitOrderId> {
        self.limit_orders_by_expiration
            .iter()
            .take_while(|(expiration, _)| *expiration <= now)
            .map(|(_, id)| *id)
            .collect()
    }

    // ── Call orders ─────────────────────────────────────────────────────

    pub fn create_call_order(
        &mut self,
        borrower: AccountId,
        debt: ShareAmount,
        collateral: ShareAmount,
        debt_asset: AssetId,
        collateral_asset: AssetId,
        target_collateral_ratio: Option<u16>,
    ) -> CallOrderId {
        let id = CallOrderId::new(self.next_call_order_id);
        self.next_call_order_id += 1;
        let order = CallOrder {
            id,
            borrower,
            debt,
            collateral,
            debt_asset,
            collateral_asset,
            target_collateral_ratio,
        };
        self.calls_by_collateral
            .insert(CollateralKey::new(order.collateralization(), id));
        self.calls_by_account.insert((borrower, debt_asset, id));
        self.call_orders.insert(id, order);
        id
    }

    pub fn call_order(&self, id: CallOrderId) -> Result<&CallOrder, MarketError> {
        self.call_orders
            .get(&id)
            .ok_or_else(|| MarketError::NotFound(format!("call order {id}")))
    }

    pub fn find_call_order(&self, id: CallOrderId) -> Option<&CallOrder> {
        self.call_orders.get(&id)
    }

    pub fn modify_call_order(
        &mut self,
        id: CallOrderId,
        f: impl FnOnce(&mut CallOrder),
    ) -> Result<(), MarketError> {
        let order = self
            .call_orders
            .get_mut(&id)
            .ok_or_else(|| MarketError::NotFound(format!("call order {id}")))?;
        let old_key = CollateralKey::new(order.collateralization(), id);
        f(order);
        let new_key = CollateralKey::new(order.collateralization(), id);
        if new_key != old_key {
            self.calls_by_collateral.remove(&old_key);
            self.calls_by_collateral.insert(new_key);
        }
        Ok(())
    }

    pub fn remove_call_order(&mut self, id: CallOrderId) -> Result<CallOrder, MarketError> {
        let order = self
            .call_orders
            .remove(&id)
            .ok_or_else(|| MarketError::NotFound(format!("call order {id}")))?;
        self.calls_by_collateral
            .remove(&CollateralKey::new(order.collateralization(), id));
        self.calls_by_account
            .remove(&(order.borrower, order.debt_asset, id));
        Ok(order)
    }

    /// The weakest debt position of the market, if any.
    pub fn least_collateralized_call(
        &self,
        collateral: AssetId,
        debt: AssetId,
    ) -> Option<CallOrderId> {
        self.calls_by_collateral
            .range(CollateralKey::pair_start(collateral, debt)..=CollateralKey::pair_end(collateral, debt))
            .next()
            .map(|key| key.id)
    }

    /// All debt positions of the market, weakest first.
    pub fn call_orders_in_market(&self, collateral: AssetId, debt: AssetId) -> Vec<CallOrderId> {
        self.calls_by_collateral
            .range(CollateralKey::pair_start(collateral, debt)..=CollateralKey::pair_end(collateral, debt))
            .map(|key| key.id)
            .collect()
    }

    /// An account's position in the given debt asset, if open.
    pub fn call_order_of(&self, borrower: AccountId, debt_asset: AssetId) -> Option<CallOrderId> {
        self.calls_by_account
            .range(
                (borrower, debt_asset, CallOrderId::new(0))
                    ..=(borrower, debt_asset, CallOrderId::new(u64::MAX)),
            )
            .next()
            .map(|(_, _, id)| *id)
    }

    pub fn all_call_orders(&self) -> impl Iterator<Item = &CallOrder> {
        self.call_orders.values()
    }

    // ── Force settlements ───────────────────────────────────────────────

    pub fn create_settlement(
        &mut self,
        owner: AccountId,
        balance: AssetAmount,
        settlement_date: Timestamp,
    ) -> SettlementId {
        let id = SettlementId::new(self.next_settlement_id);
        self.next_settlement_id += 1;
        self.settlements_by_expiration
            .insert((balance.asset_id, settlement_date, id));
        self.settlements.insert(
            id,
            ForceSettlement { id, owner, balance, settlement_date },
        );
        id
    }

    pub fn settlement(&self, id: SettlementId) -> Result<&ForceSettlement, MarketError> {
        self.settlements
            .get(&id)
            .ok_or_else(|| MarketError::NotFound(format!("settle request {id}")))
    }

    pub fn find_settlement(&self, id: SettlementId) -> Option<&ForceSettlement> {
        self.settlements.get(&id)
    }

    pub fn modify_settlement(
        &mut self,
        id: SettlementId,
        f: impl FnOnce(&mut ForceSettlement),
    ) -> Result<(), MarketError> {
        let settle = self
            .settlements
            .get_mut(&id)
            .ok_or_else(|| MarketError::NotFound(format!("settle request {id}")))?;
        let old_key = (settle.balance.asset_id, settle.settlement_date, id);
        f(settle);
        let new_key = (settle.balance.asset_id, settle.settlement_date, id);
        if new_key != old_key {
            self.settlements_by_expiration.remove(&old_key);
            self.settlements_by_expiration.insert(new_key);
        }
        Ok(())
    }

    pub fn remove_settlement(&mut self, id: SettlementId) -> Result<ForceSettlement, MarketError> {
        let settle = self
            .settlements
            .remove(&id)
            .ok_or_else(|| MarketError::NotFound(format!("settle request {id}")))?;
        self.settlements_by_expiration
            .remove(&(settle.balance.asset_id, settle.settlement_date, id));
        Ok(settle)
    }

    /// Requests due at or before `now`, grouped by asset, oldest first.
    pub fn settlements_due(&self, now: Timestamp) -> Vec<SettlementId> {
        self.settlements_by_expiration
            .iter()
            .filter(|(_, date, _)| *date <= now)
            .map(|(_, _, id)| *id)
            .collect()
    }

    pub fn all_settlements(&self) -> impl Iterator<Item = &ForceSettlement> {
        self.settlements.values()
    }
}
