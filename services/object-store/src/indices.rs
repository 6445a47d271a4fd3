//! Ordered index keys
//!
//! The order book and the margin-call queue are ordinary B-tree sets of
//! composite keys. Key ordering encodes the matching priority directly:
//! iteration from the front of a pair's range visits the most aggressive
//! sell order, or the weakest debt position, first. Ties always break by
//! id ascending, i.e. oldest object first.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use types::prelude::*;

/// Key of the limit-order book index: sell price descending (most
/// aggressive first), then id ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookKey {
    pub price: Price,
    pub id: LimitOrderId,
}

impl BookKey {
    pub fn new(price: Price, id: LimitOrderId) -> Self {
        Self { price, id }
    }

    /// Smallest key of the pair's range (best price, lowest id).
    pub fn pair_start(sell: AssetId, receive: AssetId) -> Self {
        Self { price: Price::max(sell, receive), id: LimitOrderId::new(0) }
    }

    /// Largest key of the pair's range (worst price, highest id).
    pub fn pair_end(sell: AssetId, receive: AssetId) -> Self {
        Self { price: Price::min(sell, receive), id: LimitOrderId::new(u64::MAX) }
    }
}

impl PartialOrd for BookKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BookKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .price
            .cmp(&self.price)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Key of the call-order index: collateralization ascending (weakest
/// position first), then id ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralKey {
    pub collateralization: Price,
    pub id: CallOrderId,
}

impl CollateralKey {
    pub fn new(collateralization: Price, id: CallOrderId) -> Self {
        Self { collateralization, id }
    }

    /// Smallest key of the pair's range (weakest collateralization).
    pub fn pair_start(collateral: AssetId, debt: AssetId) -> Self {
        Self {
            collateralization: Price::min(collateral, debt),
            id: CallOrderId::new(0),
        }
    }

    /// Largest key of the pair's range.
    pub fn pair_end(collateral: AssetId, debt: AssetId) -> Self {
        Self {
            collateralization: Price::max(collateral, debt),
            id: CallOrderId::new(u64::MAX),
        }
    }
}

impl PartialOrd for CollateralKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CollateralKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.collateralization
            .cmp(&other.collateralization)
            .then_with(|| self.id.cmp(&other.id))
    }
}
