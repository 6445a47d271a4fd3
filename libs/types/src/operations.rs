//! Inbound operations and virtual operations
//!
//! Inbound operations are a closed sum type dispatched exhaustively by the
//! engine's evaluators; there is no virtual-dispatch hierarchy. Virtual
//! operations are emitted for history only and are never re-executed.

use crate::asset::BitassetOptions;
use crate::feed::PriceFeed;
use crate::ids::{AccountId, AssetId, LimitOrderId, OrderRef, SettlementId};
use crate::numeric::{AssetAmount, ShareAmount};
use crate::price::Price;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Create a limit order and run it through the matching engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrderCreate {
    pub seller: AccountId,
    pub amount_to_sell: AssetAmount,
    pub min_to_receive: AssetAmount,
    pub expiration: Timestamp,
    /// Reject unless the order fills completely on arrival.
    pub fill_or_kill: bool,
    /// Creation fee; deferred on the order until its first fill. May be
    /// paid in a non-core asset, advanced from that asset's fee pool.
    pub fee: AssetAmount,
}

/// Cancel an open limit order, refunding the remainder and deferred fees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrderCancel {
    pub fee_paying_account: AccountId,
    pub order: LimitOrderId,
}

/// Open, adjust, or close a collateralized debt position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOrderUpdate {
    pub funding_account: AccountId,
    /// Collateral to add (positive) or withdraw (negative).
    pub delta_collateral: AssetAmount,
    /// Debt to take on (positive) or repay (negative).
    pub delta_debt: AssetAmount,
    pub target_collateral_ratio: Option<u16>,
}

/// Request redemption of a market-issued asset for backing collateral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSettle {
    pub account: AccountId,
    pub amount: AssetAmount,
}

/// Issuer-triggered global settlement at a stated price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetGlobalSettle {
    pub issuer: AccountId,
    pub asset_to_settle: AssetId,
    pub settle_price: Price,
}

/// Replace a smartcoin's issuer options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetUpdateBitasset {
    pub issuer: AccountId,
    pub asset_to_update: AssetId,
    pub new_options: BitassetOptions,
}

/// Replace the set of accounts allowed to publish feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetUpdateFeedProducers {
    pub issuer: AccountId,
    pub asset_to_update: AssetId,
    pub new_feed_producers: BTreeSet<AccountId>,
}

/// Publish a price feed for a smartcoin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPublishFeed {
    pub publisher: AccountId,
    pub asset_id: AssetId,
    pub feed: PriceFeed,
}

/// Issuer claim against accumulated market or collateral fees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetClaimFees {
    pub issuer: AccountId,
    pub amount_to_claim: AssetAmount,
    /// Claim backing-asset fees accumulated inside this asset instead of
    /// fees denominated in the claimed asset itself.
    pub claim_from_asset: Option<AssetId>,
}

/// Top up an asset's core-denominated fee pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFundFeePool {
    pub from_account: AccountId,
    pub asset_id: AssetId,
    pub amount: ShareAmount,
}

/// The closed set of inbound operations this engine consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    LimitOrderCreate(LimitOrderCreate),
    LimitOrderCancel(LimitOrderCancel),
    CallOrderUpdate(CallOrderUpdate),
    AssetSettle(AssetSettle),
    AssetGlobalSettle(AssetGlobalSettle),
    AssetUpdateBitasset(AssetUpdateBitasset),
    AssetUpdateFeedProducers(AssetUpdateFeedProducers),
    AssetPublishFeed(AssetPublishFeed),
    AssetClaimFees(AssetClaimFees),
    AssetFundFeePool(AssetFundFeePool),
}

/// What an operation produced, mirrored to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    None,
    /// Raw id of a newly created object.
    ObjectId(u64),
    /// An amount, e.g. what a settlement paid out.
    Amount(AssetAmount),
}

/// History-only records of economic effects, emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VirtualOperation {
    /// One side of a fill: the order paid `pays` and received `receives`
    /// net of `fee` at `fill_price`.
    FillOrder {
        order: OrderRef,
        account: AccountId,
        pays: AssetAmount,
        receives: AssetAmount,
        fee: AssetAmount,
        fill_price: Price,
        is_maker: bool,
    },
    /// A limit order was cancelled by the engine (expiration or dust cull),
    /// charging `fee` out of the deferred creation fee.
    LimitOrderCancelled {
        order: LimitOrderId,
        fee_paying_account: AccountId,
        fee: AssetAmount,
    },
    /// A settle request was cancelled and its balance returned.
    SettleCancelled {
        settlement: SettlementId,
        account: AccountId,
        amount: AssetAmount,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_round_trip() {
        let op = Operation::AssetSettle(AssetSettle {
            account: AccountId::new(10),
            amount: AssetAmount::new(100, AssetId::new(1)),
        });
        let json = serde_json::to_string(&op).unwrap();
        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, back);
    }
}
