//! Asset records and smartcoin (market-issued) state
//!
//! Every asset carries static options set by its issuer and a dynamic-data
//! record tracking supply and fee buckets. Market-issued assets additionally
//! carry bitasset state: published feeds, the current median feed, and the
//! global-settlement fields.

use crate::errors::MarketError;
use crate::feed::PriceFeed;
use crate::ids::{AccountId, AssetId};
use crate::numeric::{AssetAmount, ShareAmount};
use crate::price::Price;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Issuer-controlled flag bits.
pub mod asset_flags {
    /// Market trades in this asset pay the issuer's market fee.
    pub const CHARGE_MARKET_FEE: u16 = 0x01;
    /// Holders must be whitelisted by the issuer.
    pub const WHITE_LIST: u16 = 0x02;
    /// Holders may not force-settle against debt positions.
    pub const DISABLE_FORCE_SETTLE: u16 = 0x10;
    /// The issuer may trigger a global settlement.
    pub const GLOBAL_SETTLE: u16 = 0x20;
    /// Feeds come from the active witnesses.
    pub const WITNESS_FED: u16 = 0x80;
    /// Feeds come from the committee.
    pub const COMMITTEE_FED: u16 = 0x100;
}

/// Static, issuer-editable asset options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetOptions {
    pub max_supply: ShareAmount,
    /// Market fee charged to makers (and takers without an override), bps.
    pub market_fee_percent: u16,
    /// Taker-specific market fee override, bps.
    pub taker_fee_percent: Option<u16>,
    /// Absolute cap on a single trade's market fee.
    pub max_market_fee: ShareAmount,
    pub issuer_permissions: u16,
    pub flags: u16,
    /// Rate for converting fees paid in this asset into core.
    pub core_exchange_rate: Price,
    /// Accounts allowed to hold the asset when WHITE_LIST is set.
    pub whitelist_accounts: BTreeSet<AccountId>,
    /// Accounts barred from holding the asset.
    pub blacklist_accounts: BTreeSet<AccountId>,
    /// Share of the market fee paid out as referral rewards, bps.
    pub reward_percent: Option<u16>,
    /// When present and non-empty, only sellers registered by one of these
    /// accounts participate in market-fee sharing.
    pub whitelist_market_fee_sharing: Option<BTreeSet<AccountId>>,
}

impl Default for AssetOptions {
    fn default() -> Self {
        Self {
            max_supply: crate::numeric::SHARE_SUPPLY_MAX,
            market_fee_percent: 0,
            taker_fee_percent: None,
            max_market_fee: crate::numeric::SHARE_SUPPLY_MAX,
            issuer_permissions: 0,
            flags: 0,
            core_exchange_rate: Price::null(),
            whitelist_accounts: BTreeSet::new(),
            blacklist_accounts: BTreeSet::new(),
            reward_percent: None,
            whitelist_market_fee_sharing: None,
        }
    }
}

/// An asset known to the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: AssetId,
    pub issuer: AccountId,
    pub symbol: String,
    pub precision: u8,
    pub options: AssetOptions,
    /// True when supply is created by borrowers locking collateral; such
    /// assets have a bitasset record in the store.
    pub market_issued: bool,
}

impl AssetRecord {
    pub fn is_market_issued(&self) -> bool {
        self.market_issued
    }

    pub fn charges_market_fees(&self) -> bool {
        self.options.flags & asset_flags::CHARGE_MARKET_FEE != 0
    }

    pub fn can_force_settle(&self) -> bool {
        self.options.flags & asset_flags::DISABLE_FORCE_SETTLE == 0
    }

    pub fn can_global_settle(&self) -> bool {
        self.options.issuer_permissions & asset_flags::GLOBAL_SETTLE != 0
    }

    pub fn amount(&self, amount: ShareAmount) -> AssetAmount {
        AssetAmount::new(amount, self.id)
    }
}

/// Supply and fee buckets of an asset; mutated on nearly every fill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDynamicData {
    pub current_supply: ShareAmount,
    /// Core-denominated pool advancing order-creation fees paid in this asset.
    pub fee_pool: ShareAmount,
    /// Issuer-claimable fees denominated in the asset itself.
    pub accumulated_fees: ShareAmount,
    /// Issuer-claimable fees denominated in the backing asset
    /// (margin-call and force-settle fees).
    pub accumulated_collateral_fees: ShareAmount,
}

/// Issuer-editable smartcoin options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitassetOptions {
    pub short_backing_asset: AssetId,
    /// Feeds older than this are ignored by the median.
    pub feed_lifetime_sec: i64,
    /// Fewer live feeds than this nullifies the median.
    pub minimum_feeds: u8,
    /// Delay between a settle request and its execution.
    pub force_settlement_delay_sec: i64,
    /// Discount taken from the feed price when force-settling, bps.
    pub force_settlement_offset_percent: u16,
    /// Per-maintenance-interval cap on settled volume, bps of supply.
    pub maximum_force_settlement_volume: u16,
    /// Override for the median maintenance collateral ratio, per-mille.
    pub maintenance_collateral_ratio: Option<u16>,
    /// Override for the median short-squeeze ratio, per-mille.
    pub maximum_short_squeeze_ratio: Option<u16>,
    /// Override for the median initial collateral ratio, per-mille.
    pub initial_collateral_ratio: Option<u16>,
    /// Slice of the squeeze allowance kept by the issuer on margin calls,
    /// per-mille.
    pub margin_call_fee_ratio: Option<u16>,
    /// Issuer fee on force settlements, bps of the collateral paid out.
    pub force_settle_fee_percent: Option<u16>,
}

impl Default for BitassetOptions {
    fn default() -> Self {
        Self {
            short_backing_asset: AssetId::CORE,
            feed_lifetime_sec: 24 * 60 * 60,
            minimum_feeds: 1,
            force_settlement_delay_sec: 24 * 60 * 60,
            force_settlement_offset_percent: 0,
            maximum_force_settlement_volume: 2_000,
            maintenance_collateral_ratio: None,
            maximum_short_squeeze_ratio: None,
            initial_collateral_ratio: None,
            margin_call_fee_ratio: None,
            force_settle_fee_percent: None,
        }
    }
}

/// Mutable smartcoin state: feeds, medians, and settlement bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitassetData {
    pub asset_id: AssetId,
    pub options: BitassetOptions,
    /// Publisher to (publication time, feed).
    pub feeds: BTreeMap<AccountId, (Timestamp, PriceFeed)>,
    /// Per-field median over live feeds, with option overrides applied.
    pub current_feed: PriceFeed,
    pub current_feed_publication_time: Timestamp,
    /// Feed-derived margin-call threshold, collateral/debt orientation.
    pub current_maintenance_collateralization: Option<Price>,
    /// Volume force-settled in the current maintenance interval.
    pub force_settled_volume: ShareAmount,
    /// Redemption price after a global settlement; null while solvent.
    pub settlement_price: Price,
    /// Backing-asset fund backing redemptions after a global settlement.
    pub settlement_fund: ShareAmount,
    pub is_prediction_market: bool,
    /// Median core exchange rate changed since the last maintenance pass.
    pub asset_cer_updated: bool,
}

impl BitassetData {
    pub fn new(asset_id: AssetId, options: BitassetOptions, is_prediction_market: bool) -> Self {
        Self {
            asset_id,
            options,
            feeds: BTreeMap::new(),
            current_feed: PriceFeed::default(),
            current_feed_publication_time: 0,
            current_maintenance_collateralization: None,
            force_settled_volume: 0,
            settlement_price: Price::null(),
            settlement_fund: 0,
            is_prediction_market,
            asset_cer_updated: false,
        }
    }

    /// Whether a global settlement is in effect.
    pub fn has_settlement(&self) -> bool {
        !self.settlement_price.is_null()
    }

    /// Whether the current median carries a usable price.
    pub fn feed_is_valid(&self) -> bool {
        !self.current_feed.settlement_price.is_null()
    }

    /// Recompute the median feed after a publish, a producer change, or an
    /// option change.
    ///
    /// Feeds older than the lifetime or without a settlement price are
    /// discarded. Below the minimum count the median becomes null, halting
    /// margin calls and settlements. With several feeds, each field's
    /// median is taken independently (element `n/2` of the sorted field).
    pub fn update_median_feeds(&mut self, now: Timestamp) {
        let mut live: Vec<PriceFeed> = Vec::with_capacity(self.feeds.len());
        let mut oldest = now;
        for (published, feed) in self.feeds.values() {
            if now - published < self.options.feed_lifetime_sec
                && !feed.settlement_price.is_null()
            {
                live.push(*feed);
                oldest = oldest.min(*published);
            }
        }

        if live.len() < usize::from(self.options.minimum_feeds) {
            self.current_feed = PriceFeed::default();
            self.current_feed_publication_time = now;
            self.current_maintenance_collateralization = None;
            return;
        }
        self.current_feed_publication_time = oldest;

        let old_cer = self.current_feed.core_exchange_rate;
        if live.len() == 1 {
            self.current_feed = live[0];
        } else {
            let mid = live.len() / 2;

            live.sort_by(|a, b| a.settlement_price.cmp(&b.settlement_price));
            let settlement_price = live[mid].settlement_price;
            live.sort_by(|a, b| a.core_exchange_rate.cmp(&b.core_exchange_rate));
            let core_exchange_rate = live[mid].core_exchange_rate;
            live.sort_by_key(|f| f.maintenance_collateral_ratio);
            let maintenance_collateral_ratio = live[mid].maintenance_collateral_ratio;
            live.sort_by_key(|f| f.maximum_short_squeeze_ratio);
            let maximum_short_squeeze_ratio = live[mid].maximum_short_squeeze_ratio;
            live.sort_by_key(|f| f.initial_collateral_ratio);
            let initial_collateral_ratio = live[mid].initial_collateral_ratio;

            self.current_feed = PriceFeed {
                settlement_price,
                core_exchange_rate,
                maintenance_collateral_ratio,
                maximum_short_squeeze_ratio,
                initial_collateral_ratio,
            };
        }

        // Issuer options override the published medians.
        if let Some(mcr) = self.options.maintenance_collateral_ratio {
            self.current_feed.maintenance_collateral_ratio = mcr;
        }
        if let Some(mssr) = self.options.maximum_short_squeeze_ratio {
            self.current_feed.maximum_short_squeeze_ratio = mssr;
        }
        if let Some(icr) = self.options.initial_collateral_ratio {
            self.current_feed.initial_collateral_ratio = icr;
        }

        if self.current_feed.core_exchange_rate != old_cer {
            self.asset_cer_updated = true;
        }
        self.current_maintenance_collateralization =
            self.current_feed.maintenance_collateralization();
    }

    /// Validate issuer options against chain limits and the backing chain
    /// rules (depth at most two, never self-referential).
    pub fn validate_options(&self, block_interval_sec: i64) -> Result<(), MarketError> {
        if self.options.feed_lifetime_sec <= block_interval_sec {
            return Err(MarketError::validation("feed lifetime must exceed block interval"));
        }
        if self.options.force_settlement_delay_sec <= block_interval_sec {
            return Err(MarketError::validation(
                "force settlement delay must exceed block interval",
            ));
        }
        if self.options.short_backing_asset == self.asset_id {
            return Err(MarketError::validation("asset cannot be backed by itself"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::AssetAmount;

    fn feed_at(quote: i64) -> PriceFeed {
        PriceFeed {
            settlement_price: Price::new(
                AssetAmount::new(1, AssetId::new(1)),
                AssetAmount::new(quote, AssetId::CORE),
            ),
            core_exchange_rate: Price::null(),
            maintenance_collateral_ratio: 1_750,
            maximum_short_squeeze_ratio: 1_100,
            initial_collateral_ratio: 0,
        }
    }

    fn bitasset() -> BitassetData {
        BitassetData::new(AssetId::new(1), BitassetOptions::default(), false)
    }

    #[test]
    fn test_median_single_feed() {
        let mut ba = bitasset();
        ba.feeds.insert(AccountId::new(10), (100, feed_at(10)));
        ba.update_median_feeds(200);
        assert_eq!(ba.current_feed.settlement_price, feed_at(10).settlement_price);
        assert!(ba.current_maintenance_collateralization.is_some());
    }

    #[test]
    fn test_median_odd_count_takes_middle() {
        let mut ba = bitasset();
        ba.feeds.insert(AccountId::new(10), (100, feed_at(8)));
        ba.feeds.insert(AccountId::new(11), (100, feed_at(10)));
        ba.feeds.insert(AccountId::new(12), (100, feed_at(14)));
        ba.update_median_feeds(200);
        assert_eq!(ba.current_feed.settlement_price, feed_at(10).settlement_price);
    }

    #[test]
    fn test_median_per_field() {
        let mut ba = bitasset();
        let mut a = feed_at(8);
        a.maintenance_collateral_ratio = 2_000;
        let mut b = feed_at(12);
        b.maintenance_collateral_ratio = 1_600;
        let mut c = feed_at(10);
        c.maintenance_collateral_ratio = 1_800;
        ba.feeds.insert(AccountId::new(10), (100, a));
        ba.feeds.insert(AccountId::new(11), (100, b));
        ba.feeds.insert(AccountId::new(12), (100, c));
        ba.update_median_feeds(200);
        // price median and ratio median come from different publishers
        assert_eq!(ba.current_feed.settlement_price, feed_at(10).settlement_price);
        assert_eq!(ba.current_feed.maintenance_collateral_ratio, 1_800);
    }

    #[test]
    fn test_expired_feeds_are_ignored() {
        let mut ba = bitasset();
        ba.options.feed_lifetime_sec = 100;
        ba.feeds.insert(AccountId::new(10), (0, feed_at(10)));
        ba.update_median_feeds(500);
        assert!(!ba.feed_is_valid());
        assert!(ba.current_maintenance_collateralization.is_none());
    }

    #[test]
    fn test_minimum_feeds_enforced() {
        let mut ba = bitasset();
        ba.options.minimum_feeds = 2;
        ba.feeds.insert(AccountId::new(10), (100, feed_at(10)));
        ba.update_median_feeds(200);
        assert!(!ba.feed_is_valid());
    }

    #[test]
    fn test_option_override_beats_median() {
        let mut ba = bitasset();
        ba.options.maintenance_collateral_ratio = Some(2_100);
        ba.feeds.insert(AccountId::new(10), (100, feed_at(10)));
        ba.update_median_feeds(200);
        assert_eq!(ba.current_feed.maintenance_collateral_ratio, 2_100);
    }

    #[test]
    fn test_has_settlement() {
        let mut ba = bitasset();
        assert!(!ba.has_settlement());
        ba.settlement_price = feed_at(10).settlement_price;
        assert!(ba.has_settlement());
    }

    #[test]
    fn test_validate_options_rejects_self_backing() {
        let mut ba = bitasset();
        ba.options.short_backing_asset = ba.asset_id;
        assert!(ba.validate_options(5).is_err());
    }
}
