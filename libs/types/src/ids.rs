//! Unique identifier types for chain entities
//!
//! All ids are sequence numbers handed out by the object store. Consensus
//! requires every node to assign identical ids for identical operation
//! streams, so ids are never derived from clocks or randomness. Objects
//! reference each other by id only, which keeps the undo journal free of
//! embedded object cycles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(u64);

impl AccountId {
    /// Committee account: receives redirected temp-account rewards and
    /// network fee shares, and issues blockchain-controlled assets.
    pub const COMMITTEE: AccountId = AccountId(0);
    /// Witness account: authoritative publisher for witness-fed assets.
    pub const WITNESS: AccountId = AccountId(1);
    /// Temp account sentinel: reward deposits are redirected to COMMITTEE.
    pub const TEMP: AccountId = AccountId(2);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1.2.{}", self.0)
    }
}

/// Unique identifier for an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(u64);

impl AssetId {
    /// The core asset of the chain. Fee pools and deferred order-creation
    /// fees are denominated in it.
    pub const CORE: AssetId = AssetId(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_core(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1.3.{}", self.0)
    }
}

/// Unique identifier for a limit order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LimitOrderId(u64);

impl LimitOrderId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LimitOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1.7.{}", self.0)
    }
}

/// Unique identifier for a call order (collateralized debt position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallOrderId(u64);

impl CallOrderId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1.8.{}", self.0)
    }
}

/// Unique identifier for a force-settlement request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettlementId(u64);

impl SettlementId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SettlementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1.4.{}", self.0)
    }
}

/// Reference to the order-side object of a fill, for history reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRef {
    Limit(LimitOrderId),
    Call(CallOrderId),
    Settlement(SettlementId),
}
