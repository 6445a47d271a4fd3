//! Fee engine: market-fee routing with network and referral splits,
//! maker discounts on deferred creation fees, cancellation fee splits,
//! fee-pool funding and issuer claims.

mod common;

use common::START_TIME;
use market_engine::{ChainParams, Engine};
use types::prelude::*;

fn sell_op(
    seller: AccountId,
    amount_to_sell: AssetAmount,
    min_to_receive: AssetAmount,
    fee: AssetAmount,
    now: Timestamp,
) -> Operation {
    Operation::LimitOrderCreate(LimitOrderCreate {
        seller,
        amount_to_sell,
        min_to_receive,
        expiration: now + 86_400,
        fill_or_kill: false,
        fee,
    })
}

#[test]
fn maker_discount_refunds_part_of_the_deferred_fee() {
    let params = ChainParams {
        maker_fee_discount_percent: 2_000,
        ..Default::default()
    };
    let mut engine = Engine::with_params(params);
    engine.set_time(START_TIME);

    let alice = engine.register_account("alice");
    let bob = engine.register_account("bob");
    let issuer = engine.register_account("issuer");
    let x = engine.create_user_asset(issuer, "XCOIN", 4, AssetOptions::default());
    let y = engine.create_user_asset(issuer, "YCOIN", 4, AssetOptions::default());
    engine.issue_asset(alice, AssetAmount::new(1_000, x)).unwrap();
    engine.issue_asset(alice, AssetAmount::core(1_000)).unwrap();
    engine.issue_asset(bob, AssetAmount::new(1_000, y)).unwrap();

    // Alice's order defers a 100 core creation fee.
    engine
        .apply_operation(&sell_op(
            alice,
            AssetAmount::new(100, x),
            AssetAmount::new(300, y),
            AssetAmount::core(100),
            START_TIME,
        ))
        .unwrap();
    assert_eq!(engine.store.balance(alice, AssetId::CORE), 900);

    // Bob fills her; as the maker she gets 20% of the fee back, the
    // remaining 80 really pays into her fee bucket.
    engine
        .apply_operation(&sell_op(
            bob,
            AssetAmount::new(300, y),
            AssetAmount::new(100, x),
            AssetAmount::core(0),
            START_TIME,
        ))
        .unwrap();

    assert_eq!(engine.store.balance(alice, AssetId::CORE), 920);
    let stats = engine.store.account_stats(alice).unwrap();
    assert_eq!(stats.pending_fees, 80);
    assert_eq!(stats.pending_vested_fees, 0);
    market_engine::audit::check_invariants(&engine).unwrap();
}

#[test]
fn large_deferred_fee_routes_through_vesting() {
    let params = ChainParams {
        maker_fee_discount_percent: 0,
        cashback_vesting_threshold: 50,
        ..Default::default()
    };
    let mut engine = Engine::with_params(params);
    engine.set_time(START_TIME);

    let alice = engine.register_account("alice");
    let bob = engine.register_account("bob");
    let issuer = engine.register_account("issuer");
    let x = engine.create_user_asset(issuer, "XCOIN", 4, AssetOptions::default());
    let y = engine.create_user_asset(issuer, "YCOIN", 4, AssetOptions::default());
    engine.issue_asset(alice, AssetAmount::new(1_000, x)).unwrap();
    engine.issue_asset(alice, AssetAmount::core(1_000)).unwrap();
    engine.issue_asset(bob, AssetAmount::new(1_000, y)).unwrap();

    engine
        .apply_operation(&sell_op(
            alice,
            AssetAmount::new(100, x),
            AssetAmount::new(300, y),
            AssetAmount::core(100),
            START_TIME,
        ))
        .unwrap();
    engine
        .apply_operation(&sell_op(
            bob,
            AssetAmount::new(300, y),
            AssetAmount::new(100, x),
            AssetAmount::core(0),
            START_TIME,
        ))
        .unwrap();

    // 100 > threshold of 50: the whole fee vests.
    let stats = engine.store.account_stats(alice).unwrap();
    assert_eq!(stats.pending_fees, 0);
    assert_eq!(stats.pending_vested_fees, 100);
}

#[test]
fn cancellation_splits_a_non_core_deferred_fee() {
    let params = ChainParams {
        limit_order_cancel_fee: 30,
        ..Default::default()
    };
    let mut engine = Engine::with_params(params);
    engine.set_time(START_TIME);

    let alice = engine.register_account("alice");
    let issuer = engine.register_account("issuer");
    let x = engine.create_user_asset(issuer, "XCOIN", 4, AssetOptions::default());
    let y = engine.create_user_asset(issuer, "YCOIN", 4, AssetOptions::default());
    // OTHER converts to core at 1:2 through its exchange rate.
    let other = engine.create_user_asset(
        issuer,
        "OTHER",
        4,
        AssetOptions {
            core_exchange_rate: Price::new(
                AssetAmount::new(1, AssetId::new(3)),
                AssetAmount::new(2, AssetId::CORE),
            ),
            ..Default::default()
        },
    );
    assert_eq!(other, AssetId::new(3));
    engine.issue_asset(alice, AssetAmount::new(1_000, x)).unwrap();
    engine.issue_asset(alice, AssetAmount::new(1_000, other)).unwrap();
    engine.issue_asset(issuer, AssetAmount::core(10_000)).unwrap();
    engine
        .apply_operation(&Operation::AssetFundFeePool(AssetFundFeePool {
            from_account: issuer,
            asset_id: other,
            amount: 1_000,
        }))
        .unwrap();

    // A 50 OTHER fee converts to a 100 core deferred fee, advanced by
    // the OTHER fee pool.
    engine
        .apply_operation(&sell_op(
            alice,
            AssetAmount::new(100, x),
            AssetAmount::new(300, y),
            AssetAmount::new(50, other),
            START_TIME,
        ))
        .unwrap();
    assert_eq!(engine.store.balance(alice, other), 950);
    assert_eq!(engine.store.asset_dynamic(other).unwrap().fee_pool, 900);

    // Expire the order: the 30 core cancel fee takes a proportional,
    // rounded-up slice of the paid fee.
    engine.advance_time(100_000);
    engine.process_expired_orders().unwrap();

    let other_dynamic = engine.store.asset_dynamic(other).unwrap();
    // ceil(50 * 30 / 100) = 15 OTHER accumulate to the asset
    assert_eq!(other_dynamic.accumulated_fees, 15);
    // 70 core of the deferred fee return to the pool: 900 + 70
    assert_eq!(other_dynamic.fee_pool, 970);
    // the rest of the paid fee comes back: 950 + 35
    assert_eq!(engine.store.balance(alice, other), 985);
    // the sale itself is refunded in full
    assert_eq!(engine.store.balance(alice, x), 1_000);
    // the cancel fee lands in the seller's statistics
    assert_eq!(engine.store.account_stats(alice).unwrap().pending_fees, 30);

    // and the virtual cancel op reports the fee in the paid asset
    let vop = engine
        .applied_operations()
        .iter()
        .find_map(|op| match op {
            VirtualOperation::LimitOrderCancelled { fee, .. } => Some(*fee),
            _ => None,
        })
        .expect("housekeeping must emit a cancel op");
    assert_eq!(vop, AssetAmount::new(15, other));
    market_engine::audit::check_invariants(&engine).unwrap();
}

#[test]
fn owner_cancel_refunds_the_deferred_fee_in_full() {
    let mut engine = Engine::with_params(ChainParams {
        limit_order_cancel_fee: 30,
        ..Default::default()
    });
    engine.set_time(START_TIME);
    let alice = engine.register_account("alice");
    let issuer = engine.register_account("issuer");
    let x = engine.create_user_asset(issuer, "XCOIN", 4, AssetOptions::default());
    let y = engine.create_user_asset(issuer, "YCOIN", 4, AssetOptions::default());
    engine.issue_asset(alice, AssetAmount::new(1_000, x)).unwrap();
    engine.issue_asset(alice, AssetAmount::core(1_000)).unwrap();

    let result = engine
        .apply_operation(&sell_op(
            alice,
            AssetAmount::new(100, x),
            AssetAmount::new(300, y),
            AssetAmount::core(100),
            START_TIME,
        ))
        .unwrap();
    let OperationResult::ObjectId(id) = result else { panic!() };

    engine
        .apply_operation(&Operation::LimitOrderCancel(LimitOrderCancel {
            fee_paying_account: alice,
            order: LimitOrderId::new(id),
        }))
        .unwrap();

    // An owner-requested cancel skips the cancel fee entirely.
    assert_eq!(engine.store.balance(alice, AssetId::CORE), 1_000);
    assert_eq!(engine.store.balance(alice, x), 1_000);
    assert_eq!(engine.store.account_stats(alice).unwrap().pending_fees, 0);
}

#[test]
fn market_fee_splits_between_network_referral_and_issuer() {
    let params = ChainParams {
        market_fee_network_percent: 1_000,
        ..Default::default()
    };
    let mut engine = Engine::with_params(params);
    engine.set_time(START_TIME);

    let issuer = engine.register_account("issuer");
    let registrar = engine.register_account("registrar");
    let referrer = engine.register_account("referrer");
    // Bob's trades reward his referral chain: 25% of the reward to the
    // referrer, the rest to the registrar.
    let bob = engine.register_account_with_referrer("bob", registrar, referrer, 2_500);
    let carol = engine.register_account("carol");

    let x = engine.create_user_asset(issuer, "XCOIN", 4, AssetOptions::default());
    let other = engine.create_user_asset(
        issuer,
        "OTHER",
        4,
        AssetOptions {
            flags: asset_flags::CHARGE_MARKET_FEE,
            market_fee_percent: 100, // 1%
            reward_percent: Some(5_000),
            ..Default::default()
        },
    );
    engine.issue_asset(bob, AssetAmount::new(10_000, x)).unwrap();
    engine.issue_asset(carol, AssetAmount::new(10_000, other)).unwrap();

    // Bob rests an ask; Carol fills him. Bob receives 10,000 OTHER less
    // the 1% maker fee.
    engine
        .apply_operation(&sell_op(
            bob,
            AssetAmount::new(10_000, x),
            AssetAmount::new(10_000, other),
            AssetAmount::core(0),
            START_TIME,
        ))
        .unwrap();
    engine
        .apply_operation(&sell_op(
            carol,
            AssetAmount::new(10_000, other),
            AssetAmount::new(10_000, x),
            AssetAmount::core(0),
            START_TIME,
        ))
        .unwrap();

    assert_eq!(engine.store.balance(bob, other), 9_900);

    // fee 100: 10 to the network, reward 45 of the remaining 90 splits
    // 11 referrer / 34 registrar, issuer keeps 45.
    assert_eq!(
        engine.store.market_fee_vesting_balance(AccountId::COMMITTEE, other),
        10
    );
    assert_eq!(engine.store.market_fee_vesting_balance(referrer, other), 11);
    assert_eq!(engine.store.market_fee_vesting_balance(registrar, other), 34);
    assert_eq!(engine.store.asset_dynamic(other).unwrap().accumulated_fees, 45);
    market_engine::audit::check_invariants(&engine).unwrap();
}

#[test]
fn taker_fee_percent_overrides_for_takers() {
    let mut engine = Engine::new();
    engine.set_time(START_TIME);
    let issuer = engine.register_account("issuer");
    let bob = engine.register_account("bob");
    let carol = engine.register_account("carol");
    let x = engine.create_user_asset(issuer, "XCOIN", 4, AssetOptions::default());
    let other = engine.create_user_asset(
        issuer,
        "OTHER",
        4,
        AssetOptions {
            flags: asset_flags::CHARGE_MARKET_FEE,
            market_fee_percent: 100,        // 1% for makers
            taker_fee_percent: Some(200),   // 2% for takers
            ..Default::default()
        },
    );
    engine.issue_asset(bob, AssetAmount::new(10_000, x)).unwrap();
    engine.issue_asset(carol, AssetAmount::new(10_000, other)).unwrap();

    // Carol rests the OTHER ask; Bob takes it and receives OTHER as the
    // taker, paying the taker override.
    engine
        .apply_operation(&sell_op(
            carol,
            AssetAmount::new(10_000, other),
            AssetAmount::new(10_000, x),
            AssetAmount::core(0),
            START_TIME,
        ))
        .unwrap();
    engine
        .apply_operation(&sell_op(
            bob,
            AssetAmount::new(10_000, x),
            AssetAmount::new(10_000, other),
            AssetAmount::core(0),
            START_TIME,
        ))
        .unwrap();

    assert_eq!(engine.store.balance(bob, other), 9_800);
    assert_eq!(engine.store.asset_dynamic(other).unwrap().accumulated_fees, 200);
}

#[test]
fn max_market_fee_caps_the_charge() {
    let mut engine = Engine::new();
    engine.set_time(START_TIME);
    let issuer = engine.register_account("issuer");
    let bob = engine.register_account("bob");
    let carol = engine.register_account("carol");
    let x = engine.create_user_asset(issuer, "XCOIN", 4, AssetOptions::default());
    let other = engine.create_user_asset(
        issuer,
        "OTHER",
        4,
        AssetOptions {
            flags: asset_flags::CHARGE_MARKET_FEE,
            market_fee_percent: 1_000, // 10%, but capped below
            max_market_fee: 50,
            ..Default::default()
        },
    );
    engine.issue_asset(bob, AssetAmount::new(10_000, x)).unwrap();
    engine.issue_asset(carol, AssetAmount::new(10_000, other)).unwrap();

    engine
        .apply_operation(&sell_op(
            bob,
            AssetAmount::new(10_000, x),
            AssetAmount::new(10_000, other),
            AssetAmount::core(0),
            START_TIME,
        ))
        .unwrap();
    engine
        .apply_operation(&sell_op(
            carol,
            AssetAmount::new(10_000, other),
            AssetAmount::new(10_000, x),
            AssetAmount::core(0),
            START_TIME,
        ))
        .unwrap();

    assert_eq!(engine.store.balance(bob, other), 9_950);
    assert_eq!(engine.store.asset_dynamic(other).unwrap().accumulated_fees, 50);
}

#[test]
fn issuer_claims_accumulated_fees() {
    let mut engine = Engine::new();
    engine.set_time(START_TIME);
    let issuer = engine.register_account("issuer");
    let bob = engine.register_account("bob");
    let carol = engine.register_account("carol");
    let x = engine.create_user_asset(issuer, "XCOIN", 4, AssetOptions::default());
    let other = engine.create_user_asset(
        issuer,
        "OTHER",
        4,
        AssetOptions {
            flags: asset_flags::CHARGE_MARKET_FEE,
            market_fee_percent: 100,
            ..Default::default()
        },
    );
    engine.issue_asset(bob, AssetAmount::new(10_000, x)).unwrap();
    engine.issue_asset(carol, AssetAmount::new(10_000, other)).unwrap();
    engine
        .apply_operation(&sell_op(
            bob,
            AssetAmount::new(10_000, x),
            AssetAmount::new(10_000, other),
            AssetAmount::core(0),
            START_TIME,
        ))
        .unwrap();
    engine
        .apply_operation(&sell_op(
            carol,
            AssetAmount::new(10_000, other),
            AssetAmount::new(10_000, x),
            AssetAmount::core(0),
            START_TIME,
        ))
        .unwrap();
    assert_eq!(engine.store.asset_dynamic(other).unwrap().accumulated_fees, 100);

    // a stranger may not claim
    let err = engine
        .apply_operation(&Operation::AssetClaimFees(AssetClaimFees {
            issuer: bob,
            amount_to_claim: AssetAmount::new(100, other),
            claim_from_asset: None,
        }))
        .unwrap_err();
    assert!(matches!(err, MarketError::Validation(_)));

    // claiming more than accumulated fails
    let err = engine
        .apply_operation(&Operation::AssetClaimFees(AssetClaimFees {
            issuer,
            amount_to_claim: AssetAmount::new(200, other),
            claim_from_asset: None,
        }))
        .unwrap_err();
    assert!(matches!(err, MarketError::Precondition(_)));

    engine
        .apply_operation(&Operation::AssetClaimFees(AssetClaimFees {
            issuer,
            amount_to_claim: AssetAmount::new(100, other),
            claim_from_asset: None,
        }))
        .unwrap();
    assert_eq!(engine.store.balance(issuer, other), 100);
    assert_eq!(engine.store.asset_dynamic(other).unwrap().accumulated_fees, 0);
}

#[test]
fn fund_fee_pool_moves_core_into_the_pool() {
    let mut engine = Engine::new();
    engine.set_time(START_TIME);
    let issuer = engine.register_account("issuer");
    let other = engine.create_user_asset(issuer, "OTHER", 4, AssetOptions::default());
    engine.issue_asset(issuer, AssetAmount::core(5_000)).unwrap();

    engine
        .apply_operation(&Operation::AssetFundFeePool(AssetFundFeePool {
            from_account: issuer,
            asset_id: other,
            amount: 3_000,
        }))
        .unwrap();
    assert_eq!(engine.store.balance(issuer, AssetId::CORE), 2_000);
    assert_eq!(engine.store.asset_dynamic(other).unwrap().fee_pool, 3_000);
    market_engine::audit::check_invariants(&engine).unwrap();
}
