//! Accounts and per-account statistics
//!
//! The account record carries the referral chain used for market-fee
//! sharing; the statistics record tracks core locked in open orders and
//! the fee buckets that later vest as cashback.

use crate::ids::AccountId;
use crate::numeric::ShareAmount;
use serde::{Deserialize, Serialize};

/// An account known to the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    /// Account that registered this one; receives the registrar share of
    /// referral rewards.
    pub registrar: AccountId,
    /// Account credited with the referrer share of referral rewards.
    pub referrer: AccountId,
    /// Slice of the reward routed to the referrer, bps.
    pub referrer_rewards_percentage: u16,
}

/// Mutable per-account bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatistics {
    pub owner: AccountId,
    /// Sum of core-denominated `for_sale` over open limit orders plus core
    /// collateral in open call orders.
    pub total_core_in_orders: ShareAmount,
    /// Fees below the vesting threshold, awaiting the next maintenance pass.
    pub pending_fees: ShareAmount,
    /// Fees above the vesting threshold, routed through vesting.
    pub pending_vested_fees: ShareAmount,
}

impl AccountStatistics {
    pub fn new(owner: AccountId) -> Self {
        Self { owner, ..Default::default() }
    }

    /// Record a core fee as really paid. Small fees accumulate directly,
    /// larger ones go through the vesting bucket.
    pub fn pay_fee(&mut self, core_fee: ShareAmount, cashback_vesting_threshold: ShareAmount) {
        if core_fee > cashback_vesting_threshold {
            self.pending_vested_fees += core_fee;
        } else {
            self.pending_fees += core_fee;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pay_fee_routes_by_threshold() {
        let mut stats = AccountStatistics::new(AccountId::new(10));
        stats.pay_fee(50, 100);
        stats.pay_fee(500, 100);
        assert_eq!(stats.pending_fees, 50);
        assert_eq!(stats.pending_vested_fees, 500);
    }
}
