//! Engine facade and operation dispatch
//!
//! The engine couples the object store with the global chain parameters
//! and a clock that only moves when told to. `apply_operation` is the
//! single entry point for inbound operations: it snapshots the store,
//! dispatches to the matching evaluator, and restores the snapshot if
//! anything fails, so a rejected operation leaves the state untouched.

use object_store::Store;
use types::prelude::*;

/// Chain-wide parameters, set by governance rather than per asset.
#[derive(Debug, Clone)]
pub struct ChainParams {
    /// Refund on deferred creation fees for maker fills, bps.
    pub maker_fee_discount_percent: u16,
    /// Slice of every market fee diverted to the network, bps.
    pub market_fee_network_percent: u16,
    /// Core fees above this vest instead of accruing directly.
    pub cashback_vesting_threshold: ShareAmount,
    /// Flat core fee charged when an order is cancelled by housekeeping.
    pub limit_order_cancel_fee: ShareAmount,
    /// Cap on the feed-producer set of one asset.
    pub maximum_feed_publishers: usize,
    pub block_interval_sec: i64,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            maker_fee_discount_percent: 0,
            market_fee_network_percent: 0,
            cashback_vesting_threshold: 100_000,
            limit_order_cancel_fee: 0,
            maximum_feed_publishers: 10,
            block_interval_sec: 3,
        }
    }
}

/// The matching and collateral engine.
pub struct Engine {
    pub store: Store,
    pub params: ChainParams,
    now: Timestamp,
    applied_operations: Vec<VirtualOperation>,
}

impl Engine {
    /// Create an engine with the core asset and the sentinel accounts in
    /// place, everything else empty.
    pub fn new() -> Self {
        let mut store = Store::new();
        let committee = store.create_account("committee-account", AccountId::COMMITTEE, AccountId::COMMITTEE, 0);
        debug_assert_eq!(committee, AccountId::COMMITTEE);
        store.create_account("witness-account", AccountId::COMMITTEE, AccountId::COMMITTEE, 0);
        store.create_account("temp-account", AccountId::COMMITTEE, AccountId::COMMITTEE, 0);
        let core = store.create_asset(
            AccountId::COMMITTEE,
            "CORE",
            5,
            AssetOptions::default(),
            false,
        );
        debug_assert_eq!(core, AssetId::CORE);
        Self {
            store,
            params: ChainParams::default(),
            now: 0,
            applied_operations: Vec::new(),
        }
    }

    pub fn with_params(params: ChainParams) -> Self {
        let mut engine = Self::new();
        engine.params = params;
        engine
    }

    pub fn time(&self) -> Timestamp {
        self.now
    }

    pub fn set_time(&mut self, now: Timestamp) {
        self.now = now;
    }

    pub fn advance_time(&mut self, seconds: i64) {
        self.now += seconds;
    }

    /// History of virtual operations emitted so far.
    pub fn applied_operations(&self) -> &[VirtualOperation] {
        &self.applied_operations
    }

    pub(crate) fn push_applied(&mut self, op: VirtualOperation) {
        self.applied_operations.push(op);
    }

    /// Execute one inbound operation atomically.
    ///
    /// On any error the store and the virtual-operation log are restored
    /// to their pre-operation state, bit for bit.
    pub fn apply_operation(&mut self, op: &Operation) -> Result<OperationResult, MarketError> {
        let checkpoint = self.store.clone();
        let applied_len = self.applied_operations.len();
        let result = self.dispatch(op);
        if result.is_err() {
            self.store = checkpoint;
            self.applied_operations.truncate(applied_len);
        }
        result
    }

    fn dispatch(&mut self, op: &Operation) -> Result<OperationResult, MarketError> {
        match op {
            Operation::LimitOrderCreate(inner) => self.do_limit_order_create(inner),
            Operation::LimitOrderCancel(inner) => self.do_limit_order_cancel(inner),
            Operation::CallOrderUpdate(inner) => self.do_call_order_update(inner),
            Operation::AssetSettle(inner) => self.do_asset_settle(inner),
            Operation::AssetGlobalSettle(inner) => self.do_asset_global_settle(inner),
            Operation::AssetUpdateBitasset(inner) => self.do_asset_update_bitasset(inner),
            Operation::AssetUpdateFeedProducers(inner) => self.do_asset_update_feed_producers(inner),
            Operation::AssetPublishFeed(inner) => self.do_asset_publish_feed(inner),
            Operation::AssetClaimFees(inner) => self.do_asset_claim_fees(inner),
            Operation::AssetFundFeePool(inner) => self.do_asset_fund_fee_pool(inner),
        }
    }

    // ── Genesis and fixture helpers ─────────────────────────────────────
    //
    // Account and asset creation are handled outside this engine; these
    // helpers stand in for those collaborators when bootstrapping a chain
    // or a test fixture.

    pub fn register_account(&mut self, name: impl Into<String>) -> AccountId {
        self.store
            .create_account(name, AccountId::COMMITTEE, AccountId::COMMITTEE, 0)
    }

    pub fn register_account_with_referrer(
        &mut self,
        name: impl Into<String>,
        registrar: AccountId,
        referrer: AccountId,
        referrer_rewards_percentage: u16,
    ) -> AccountId {
        self.store
            .create_account(name, registrar, referrer, referrer_rewards_percentage)
    }

    pub fn create_user_asset(
        &mut self,
        issuer: AccountId,
        symbol: impl Into<String>,
        precision: u8,
        options: AssetOptions,
    ) -> AssetId {
        self.store.create_asset(issuer, symbol, precision, options, false)
    }

    pub fn create_smart_asset(
        &mut self,
        issuer: AccountId,
        symbol: impl Into<String>,
        precision: u8,
        options: AssetOptions,
        bitasset_options: BitassetOptions,
        is_prediction_market: bool,
    ) -> AssetId {
        let id = self
            .store
            .create_asset(issuer, symbol, precision, options, true);
        self.store
            .attach_bitasset(BitassetData::new(id, bitasset_options, is_prediction_market));
        id
    }

    /// Mint supply of a non-market-issued asset into a balance.
    pub fn issue_asset(&mut self, to: AccountId, amount: AssetAmount) -> Result<(), MarketError> {
        let asset = self.store.asset(amount.asset_id)?.clone();
        if asset.is_market_issued() {
            return Err(MarketError::precondition(
                "market-issued supply only comes from debt positions",
            ));
        }
        let dynamic = self.store.asset_dynamic(amount.asset_id)?;
        if dynamic.current_supply + amount.amount > asset.options.max_supply {
            return Err(MarketError::precondition("issue would exceed max supply"));
        }
        self.store
            .modify_asset_dynamic(amount.asset_id, |d| d.current_supply += amount.amount)?;
        self.store.adjust_balance(to, amount)
    }

    /// Maintenance-interval housekeeping: the force-settlement volume
    /// caps reset and pending exchange-rate updates are acknowledged.
    pub fn run_maintenance(&mut self) {
        let ids: Vec<AssetId> = self.store.all_bitassets().map(|b| b.asset_id).collect();
        for id in ids {
            let _ = self.store.modify_bitasset(id, |b| {
                b.force_settled_volume = 0;
                b.asset_cer_updated = false;
            });
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
