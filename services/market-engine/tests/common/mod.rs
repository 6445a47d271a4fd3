//! Shared test fixtures: a chain with funded accounts and a smartcoin
//! backed by the core asset.

#![allow(dead_code)]

use market_engine::{ChainParams, Engine};
use types::prelude::*;

pub const START_TIME: Timestamp = 1_000_000;

pub struct Fixture {
    pub engine: Engine,
    pub issuer: AccountId,
    pub feeder: AccountId,
    pub alice: AccountId,
    pub bob: AccountId,
    pub shorty: AccountId,
    pub mia: AssetId,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_params(ChainParams::default())
    }

    pub fn with_params(params: ChainParams) -> Self {
        let mut engine = Engine::with_params(params);
        engine.set_time(START_TIME);

        let issuer = engine.register_account("issuer");
        let feeder = engine.register_account("feeder");
        let alice = engine.register_account("alice");
        let bob = engine.register_account("bob");
        let shorty = engine.register_account("shorty");

        for account in [issuer, alice, bob, shorty] {
            engine
                .issue_asset(account, AssetAmount::core(1_000_000))
                .unwrap();
        }

        let mia = engine.create_smart_asset(
            issuer,
            "BITUSD",
            5,
            AssetOptions {
                issuer_permissions: asset_flags::GLOBAL_SETTLE,
                ..Default::default()
            },
            BitassetOptions::default(),
            false,
        );

        let mut fixture = Self { engine, issuer, feeder, alice, bob, shorty, mia };
        fixture.apply(Operation::AssetUpdateFeedProducers(AssetUpdateFeedProducers {
            issuer,
            asset_to_update: mia,
            new_feed_producers: [feeder].into_iter().collect(),
        }));
        fixture
    }

    /// Apply an operation that is expected to succeed.
    pub fn apply(&mut self, op: Operation) -> OperationResult {
        self.engine
            .apply_operation(&op)
            .unwrap_or_else(|e| panic!("operation failed: {e}\n{op:?}"))
    }

    /// Publish a feed of `1 smart asset = quote units of core`.
    pub fn publish_feed(&mut self, quote: i64, mcr: u16, mssr: u16) {
        let feed = PriceFeed {
            settlement_price: Price::new(
                AssetAmount::new(1, self.mia),
                AssetAmount::new(quote, AssetId::CORE),
            ),
            core_exchange_rate: Price::null(),
            maintenance_collateral_ratio: mcr,
            maximum_short_squeeze_ratio: mssr,
            initial_collateral_ratio: 0,
        };
        self.apply(Operation::AssetPublishFeed(AssetPublishFeed {
            publisher: self.feeder,
            asset_id: self.mia,
            feed,
        }));
    }

    /// Open or adjust a debt position.
    pub fn borrow(&mut self, who: AccountId, debt: i64, collateral: i64) {
        self.borrow_with_target(who, debt, collateral, None);
    }

    pub fn borrow_with_target(
        &mut self,
        who: AccountId,
        debt: i64,
        collateral: i64,
        target: Option<u16>,
    ) {
        self.apply(Operation::CallOrderUpdate(CallOrderUpdate {
            funding_account: who,
            delta_collateral: AssetAmount::core(collateral),
            delta_debt: AssetAmount::new(debt, self.mia),
            target_collateral_ratio: target,
        }));
    }

    /// Place a limit order without a creation fee.
    pub fn sell(
        &mut self,
        who: AccountId,
        amount_to_sell: AssetAmount,
        min_to_receive: AssetAmount,
    ) -> Option<LimitOrderId> {
        let result = self.apply(Operation::LimitOrderCreate(LimitOrderCreate {
            seller: who,
            amount_to_sell,
            min_to_receive,
            expiration: self.engine.time() + 86_400,
            fill_or_kill: false,
            fee: AssetAmount::core(0),
        }));
        match result {
            OperationResult::ObjectId(id) => {
                let id = LimitOrderId::new(id);
                self.engine.store.find_limit_order(id).map(|o| o.id)
            }
            _ => panic!("order creation returned no id"),
        }
    }

    pub fn balance(&self, who: AccountId, asset: AssetId) -> i64 {
        self.engine.store.balance(who, asset)
    }

    pub fn core_balance(&self, who: AccountId) -> i64 {
        self.balance(who, AssetId::CORE)
    }

    pub fn assert_invariants(&self) {
        market_engine::audit::check_invariants(&self.engine)
            .unwrap_or_else(|e| panic!("invariant violated: {e}"));
    }
}

/// A plain asset pair for pure limit matching tests.
pub struct PairFixture {
    pub engine: Engine,
    pub alice: AccountId,
    pub bob: AccountId,
    pub x: AssetId,
    pub y: AssetId,
}

impl PairFixture {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_time(START_TIME);
        let alice = engine.register_account("alice");
        let bob = engine.register_account("bob");
        let issuer = engine.register_account("pair-issuer");
        let x = engine.create_user_asset(issuer, "XCOIN", 4, AssetOptions::default());
        let y = engine.create_user_asset(issuer, "YCOIN", 4, AssetOptions::default());
        engine.issue_asset(alice, AssetAmount::new(100_000, x)).unwrap();
        engine.issue_asset(bob, AssetAmount::new(100_000, y)).unwrap();
        Self { engine, alice, bob, x, y }
    }

    pub fn sell(
        &mut self,
        who: AccountId,
        amount_to_sell: AssetAmount,
        min_to_receive: AssetAmount,
    ) -> Option<LimitOrderId> {
        let result = self
            .engine
            .apply_operation(&Operation::LimitOrderCreate(LimitOrderCreate {
                seller: who,
                amount_to_sell,
                min_to_receive,
                expiration: self.engine.time() + 86_400,
                fill_or_kill: false,
                fee: AssetAmount::core(0),
            }))
            .expect("order creation failed");
        match result {
            OperationResult::ObjectId(id) => {
                let id = LimitOrderId::new(id);
                self.engine.store.find_limit_order(id).map(|o| o.id)
            }
            _ => panic!("order creation returned no id"),
        }
    }
}
