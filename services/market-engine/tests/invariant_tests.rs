//! Global invariants: conservation, rollback atomicity, rounding
//! properties, and a seeded random market walk.

mod common;

use common::{Fixture, PairFixture};
use market_engine::audit;
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use types::prelude::*;

#[test]
fn create_then_cancel_restores_the_seller() {
    let mut fx = PairFixture::new();
    let (x, y) = (fx.x, fx.y);

    let before_balance = fx.engine.store.balance(fx.alice, x);
    let before_stats = fx.engine.store.account_stats(fx.alice).unwrap().clone();

    let order = fx
        .sell(fx.alice, AssetAmount::new(100, x), AssetAmount::new(300, y))
        .unwrap();
    fx.engine
        .apply_operation(&Operation::LimitOrderCancel(LimitOrderCancel {
            fee_paying_account: fx.alice,
            order,
        }))
        .unwrap();

    assert_eq!(fx.engine.store.balance(fx.alice, x), before_balance);
    assert_eq!(
        fx.engine.store.account_stats(fx.alice).unwrap().total_core_in_orders,
        before_stats.total_core_in_orders
    );
    audit::check_invariants(&fx.engine).unwrap();
}

#[test]
fn rejected_operation_leaves_identical_state() {
    let mut fx = Fixture::new();
    fx.publish_feed(10, 1_750, 1_100);
    fx.borrow(fx.shorty, 100, 2_000);

    let before = fx.engine.store.clone();
    let ops_before = fx.engine.applied_operations().len();

    // more collateral than the account owns
    let err = fx
        .engine
        .apply_operation(&Operation::CallOrderUpdate(CallOrderUpdate {
            funding_account: fx.shorty,
            delta_collateral: AssetAmount::core(5_000_000),
            delta_debt: AssetAmount::new(10, fx.mia),
            target_collateral_ratio: None,
        }))
        .unwrap_err();
    assert!(matches!(err, MarketError::InsufficientBalance { .. }));

    assert_eq!(fx.engine.store, before);
    assert_eq!(fx.engine.applied_operations().len(), ops_before);
}

#[test]
fn conservation_holds_through_a_margin_call_storm() {
    let mut fx = Fixture::new();
    let mia = fx.mia;

    fx.publish_feed(8, 1_750, 1_100);
    fx.borrow(fx.shorty, 100, 1_700);
    fx.borrow(fx.alice, 60, 1_100);
    fx.borrow(fx.bob, 40, 800);
    audit::check_invariants(&fx.engine).unwrap();

    // bids from every holder, then a feed drop that calls two positions
    fx.sell(fx.alice, AssetAmount::new(30, mia), AssetAmount::core(310));
    fx.sell(fx.bob, AssetAmount::new(20, mia), AssetAmount::core(208));
    audit::check_invariants(&fx.engine).unwrap();

    fx.publish_feed(10, 1_750, 1_100);
    audit::check_invariants(&fx.engine).unwrap();

    fx.engine.advance_time(86_400 * 2);
    fx.engine.process_expired_orders().unwrap();
    fx.engine.process_settlements().unwrap();
    audit::check_invariants(&fx.engine).unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever two crossing orders trade, no value is created: the
    /// books, balances and supplies always reconcile.
    #[test]
    fn matching_conserves_value(
        maker_sale in 1i64..1_000_000,
        maker_ask in 1i64..1_000_000,
        taker_sale in 1i64..1_000_000,
        taker_ask in 1i64..1_000_000,
    ) {
        let mut fx = PairFixture::new();
        let (x, y) = (fx.x, fx.y);
        fx.engine.issue_asset(fx.alice, AssetAmount::new(1_000_000, x)).unwrap();
        fx.engine.issue_asset(fx.bob, AssetAmount::new(1_000_000, y)).unwrap();

        let _ = fx.engine.apply_operation(&Operation::LimitOrderCreate(LimitOrderCreate {
            seller: fx.alice,
            amount_to_sell: AssetAmount::new(maker_sale, x),
            min_to_receive: AssetAmount::new(maker_ask, y),
            expiration: fx.engine.time() + 3_600,
            fill_or_kill: false,
            fee: AssetAmount::core(0),
        }));
        let _ = fx.engine.apply_operation(&Operation::LimitOrderCreate(LimitOrderCreate {
            seller: fx.bob,
            amount_to_sell: AssetAmount::new(taker_sale, y),
            min_to_receive: AssetAmount::new(taker_ask, x),
            expiration: fx.engine.time() + 3_600,
            fill_or_kill: false,
            fee: AssetAmount::core(0),
        }));

        prop_assert!(audit::check_invariants(&fx.engine).is_ok());
    }

    /// The truncating percent never rounds up and never exceeds the
    /// plain value for sane percentages.
    #[test]
    fn percent_truncates_downward(value in 0i64..SHARE_SUPPLY_MAX, bps in 0u16..=10_000) {
        let result = calculate_percent(value, bps).unwrap();
        prop_assert!(result <= value);
        prop_assert!(i128::from(result) * 10_000 <= i128::from(value) * i128::from(bps));
    }

    /// Converting an amount through a price and back never gains.
    #[test]
    fn price_round_trip_never_gains(
        amount in 1i64..1_000_000_000,
        base in 1i64..1_000_000,
        quote in 1i64..1_000_000,
    ) {
        let price = Price::new(
            AssetAmount::new(base, AssetId::new(1)),
            AssetAmount::new(quote, AssetId::new(2)),
        );
        let there = AssetAmount::new(amount, AssetId::new(1)).mul_price(price).unwrap();
        let back = there.mul_price(price).unwrap();
        prop_assert!(back.amount <= amount);

        // rounding up overshoots rounding down by at most one unit
        let up = AssetAmount::new(amount, AssetId::new(1))
            .multiply_and_round_up(price)
            .unwrap();
        prop_assert!(up.amount >= there.amount);
        prop_assert!(up.amount - there.amount <= 1);
    }
}

/// A deterministic random walk over the whole engine surface. The seed
/// is fixed: every run replays the identical operation stream, and the
/// global invariants must hold after every single step.
#[test]
fn seeded_market_walk_preserves_invariants() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
    let mut fx = Fixture::new();
    let mia = fx.mia;

    fx.publish_feed(10, 1_750, 1_100);

    let traders = [fx.alice, fx.bob, fx.shorty];
    for step in 0..200 {
        match rng.gen_range(0..10) {
            // publish a feed move within a band that usually avoids swans
            0 => {
                let quote = rng.gen_range(8..13);
                fx.publish_feed(quote, 1_750, 1_100);
            }
            // open or grow a comfortable position
            1 | 2 => {
                let who = traders[rng.gen_range(0..traders.len())];
                let debt = rng.gen_range(1..50);
                let collateral = debt * rng.gen_range(18..40);
                let _ = fx.engine.apply_operation(&Operation::CallOrderUpdate(
                    CallOrderUpdate {
                        funding_account: who,
                        delta_collateral: AssetAmount::core(collateral),
                        delta_debt: AssetAmount::new(debt, mia),
                        target_collateral_ratio: if rng.gen_bool(0.3) {
                            Some(rng.gen_range(1_800..2_500))
                        } else {
                            None
                        },
                    },
                ));
            }
            // bid smart-asset units for core
            3 | 4 | 5 => {
                let who = traders[rng.gen_range(0..traders.len())];
                let amount = rng.gen_range(1..30);
                let ask = amount * rng.gen_range(9..12);
                let _ = fx.engine.apply_operation(&Operation::LimitOrderCreate(
                    LimitOrderCreate {
                        seller: who,
                        amount_to_sell: AssetAmount::new(amount, mia),
                        min_to_receive: AssetAmount::core(ask),
                        expiration: fx.engine.time() + rng.gen_range(600..86_400),
                        fill_or_kill: false,
                        fee: AssetAmount::core(0),
                    },
                ));
            }
            // bid core for smart-asset units
            6 | 7 => {
                let who = traders[rng.gen_range(0..traders.len())];
                let core = rng.gen_range(50..500);
                let ask = core / rng.gen_range(9..12);
                if ask > 0 {
                    let _ = fx.engine.apply_operation(&Operation::LimitOrderCreate(
                        LimitOrderCreate {
                            seller: who,
                            amount_to_sell: AssetAmount::core(core),
                            min_to_receive: AssetAmount::new(ask, mia),
                            expiration: fx.engine.time() + rng.gen_range(600..86_400),
                            fill_or_kill: false,
                            fee: AssetAmount::core(0),
                        },
                    ));
                }
            }
            // cancel a random resting order
            8 => {
                let orders: Vec<_> = fx
                    .engine
                    .store
                    .all_limit_orders()
                    .map(|o| (o.id, o.seller))
                    .collect();
                if !orders.is_empty() {
                    let (order, seller) = orders[rng.gen_range(0..orders.len())];
                    let _ = fx.engine.apply_operation(&Operation::LimitOrderCancel(
                        LimitOrderCancel { fee_paying_account: seller, order },
                    ));
                }
            }
            // let time pass and run the housekeeping passes
            _ => {
                fx.engine.advance_time(rng.gen_range(60..7_200));
                fx.engine.process_expired_orders().unwrap();
                fx.engine.process_settlements().unwrap();
                if rng.gen_bool(0.2) {
                    fx.engine.run_maintenance();
                }
            }
        }

        audit::check_invariants(&fx.engine)
            .unwrap_or_else(|e| panic!("invariant broken at step {step}: {e}"));
    }
}
