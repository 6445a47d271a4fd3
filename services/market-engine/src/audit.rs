//! Global invariant checks
//!
//! Validates the economic invariants that must hold after every
//! operation: value conservation per asset, no negative quantities,
//! per-account order totals, and settlement-fund coverage. The test
//! suites call this after each step; production code never needs it.

use crate::engine::Engine;
use std::collections::BTreeMap;
use types::prelude::*;

/// Verify every global invariant, returning a description of the first
/// violation found.
pub fn check_invariants(engine: &Engine) -> Result<(), String> {
    let store = &engine.store;

    // No negative quantities anywhere.
    for ((account, asset), balance) in store.all_balances() {
        if *balance < 0 {
            return Err(format!("negative balance of {asset} held by {account}"));
        }
    }
    for (asset_id, dynamic) in store.all_asset_dynamic() {
        if dynamic.current_supply < 0 {
            return Err(format!("negative supply of {asset_id}"));
        }
        if dynamic.fee_pool < 0 || dynamic.accumulated_fees < 0 || dynamic.accumulated_collateral_fees < 0 {
            return Err(format!("negative fee bucket of {asset_id}"));
        }
        let record = store
            .asset(*asset_id)
            .map_err(|e| format!("dangling dynamic data: {e}"))?;
        if dynamic.current_supply > record.options.max_supply {
            return Err(format!("supply of {asset_id} exceeds its maximum"));
        }
    }
    for order in store.all_limit_orders() {
        if order.for_sale <= 0 {
            return Err(format!("limit order {} holds nothing for sale", order.id));
        }
        if order.deferred_fee < 0 || order.deferred_paid_fee.amount < 0 {
            return Err(format!("limit order {} carries a negative deferred fee", order.id));
        }
    }
    for call in store.all_call_orders() {
        if call.debt <= 0 || call.collateral <= 0 {
            return Err(format!("call order {} has non-positive debt or collateral", call.id));
        }
    }
    for settle in store.all_settlements() {
        if settle.balance.amount <= 0 {
            return Err(format!("settle request {} holds nothing", settle.id));
        }
    }

    // Value conservation: for every asset, the supply equals the sum of
    // everything anyone or anything holds in it.
    let mut located: BTreeMap<AssetId, i128> = BTreeMap::new();
    let mut add = |asset: AssetId, amount: i128| {
        *located.entry(asset).or_insert(0) += amount;
    };

    for ((_, asset), balance) in store.all_balances() {
        add(*asset, i128::from(*balance));
    }
    for ((_, asset), vested) in store.all_market_fee_vesting() {
        add(*asset, i128::from(*vested));
    }
    for stats in store.all_account_stats() {
        add(AssetId::CORE, i128::from(stats.pending_fees));
        add(AssetId::CORE, i128::from(stats.pending_vested_fees));
    }
    for order in store.all_limit_orders() {
        add(order.sell_asset_id(), i128::from(order.for_sale));
        add(AssetId::CORE, i128::from(order.deferred_fee));
        add(
            order.deferred_paid_fee.asset_id,
            i128::from(order.deferred_paid_fee.amount),
        );
    }
    for call in store.all_call_orders() {
        add(call.collateral_asset, i128::from(call.collateral));
    }
    for settle in store.all_settlements() {
        add(settle.balance.asset_id, i128::from(settle.balance.amount));
    }
    for (asset_id, dynamic) in store.all_asset_dynamic() {
        add(*asset_id, i128::from(dynamic.accumulated_fees));
        add(AssetId::CORE, i128::from(dynamic.fee_pool));
    }
    for bitasset in store.all_bitassets() {
        add(bitasset.options.short_backing_asset, i128::from(bitasset.settlement_fund));
        let dynamic = store
            .asset_dynamic(bitasset.asset_id)
            .map_err(|e| format!("dangling bitasset: {e}"))?;
        add(
            bitasset.options.short_backing_asset,
            i128::from(dynamic.accumulated_collateral_fees),
        );
    }

    for (asset_id, dynamic) in store.all_asset_dynamic() {
        let found = located.get(asset_id).copied().unwrap_or(0);
        if found != i128::from(dynamic.current_supply) {
            return Err(format!(
                "conservation violated for {asset_id}: supply {} but located {found}",
                dynamic.current_supply
            ));
        }
    }

    // Per-account locked-core totals.
    let mut core_in_orders: BTreeMap<AccountId, i128> = BTreeMap::new();
    for order in store.all_limit_orders() {
        if order.sell_asset_id().is_core() {
            *core_in_orders.entry(order.seller).or_insert(0) += i128::from(order.for_sale);
        }
    }
    for call in store.all_call_orders() {
        if call.collateral_asset.is_core() {
            *core_in_orders.entry(call.borrower).or_insert(0) += i128::from(call.collateral);
        }
    }
    for stats in store.all_account_stats() {
        let expected = core_in_orders.get(&stats.owner).copied().unwrap_or(0);
        if i128::from(stats.total_core_in_orders) != expected {
            return Err(format!(
                "total_core_in_orders of {} is {} but orders lock {expected}",
                stats.owner, stats.total_core_in_orders
            ));
        }
    }

    // Settlement funds must cover redemption of the whole supply.
    for bitasset in store.all_bitassets() {
        if !bitasset.has_settlement() {
            continue;
        }
        let dynamic = store
            .asset_dynamic(bitasset.asset_id)
            .map_err(|e| format!("dangling bitasset: {e}"))?;
        if dynamic.current_supply == 0 {
            if bitasset.settlement_fund != 0 {
                return Err(format!(
                    "settlement fund of {} outlived its supply",
                    bitasset.asset_id
                ));
            }
            continue;
        }
        let owed = AssetAmount::new(dynamic.current_supply, bitasset.asset_id)
            .mul_price(bitasset.settlement_price)
            .map_err(|e| format!("settlement price broken: {e}"))?;
        let tolerance = if bitasset.is_prediction_market { 1 } else { 0 };
        if owed.amount > bitasset.settlement_fund + tolerance {
            return Err(format!(
                "settlement fund of {} cannot cover its supply",
                bitasset.asset_id
            ));
        }
    }

    Ok(())
}
