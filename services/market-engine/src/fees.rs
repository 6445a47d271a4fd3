//! Fee computation and routing
//!
//! A market fee is charged on the receive leg of every fill. It is then
//! carved up in order: a network slice vests under the committee account,
//! a referral reward splits between the seller's referrer and registrar,
//! and whatever remains accrues to the asset's fee bucket for the issuer
//! to claim. Force settlements additionally pay the issuer a fee in the
//! backing asset. Every satoshi ends up in exactly one bucket.

use crate::engine::Engine;
use types::prelude::*;

impl Engine {
    /// Fee on a trade of `trade_amount`, before routing.
    ///
    /// Makers pay `market_fee_percent`; takers pay the taker override when
    /// one is set. The result is capped at `max_market_fee`.
    pub(crate) fn calculate_market_fee(
        &self,
        trade_asset: &AssetRecord,
        trade_amount: AssetAmount,
        is_maker: bool,
    ) -> Result<AssetAmount, MarketError> {
        debug_assert_eq!(trade_asset.id, trade_amount.asset_id);

        if !trade_asset.charges_market_fees() {
            return Ok(AssetAmount::zero(trade_asset.id));
        }
        if is_maker && trade_asset.options.market_fee_percent == 0 {
            return Ok(AssetAmount::zero(trade_asset.id));
        }
        let taker_fee_percent = trade_asset.options.taker_fee_percent;
        if !is_maker && taker_fee_percent == Some(0) {
            return Ok(AssetAmount::zero(trade_asset.id));
        }

        let fee_percent = if is_maker {
            trade_asset.options.market_fee_percent
        } else {
            taker_fee_percent.unwrap_or(trade_asset.options.market_fee_percent)
        };

        let mut value = calculate_percent(trade_amount.amount, fee_percent)?;
        if value > trade_asset.options.max_market_fee {
            value = trade_asset.options.max_market_fee;
        }
        Ok(AssetAmount::new(value, trade_asset.id))
    }

    /// Charge and route the market fee on `receives`, returning the total
    /// fee withheld from the receiver.
    ///
    /// `seller` enables referral sharing; fills without a seller context
    /// (none currently) leave the whole fee with the issuer. A recipient
    /// that is not authorized to hold the fee asset forfeits its slice.
    pub(crate) fn pay_market_fees(
        &mut self,
        seller: Option<AccountId>,
        recv_asset_id: AssetId,
        receives: AssetAmount,
        is_maker: bool,
    ) -> Result<AssetAmount, MarketError> {
        let recv_asset = self.store.asset(recv_asset_id)?.clone();
        let market_fees = self.calculate_market_fee(&recv_asset, receives, is_maker)?;
        let mut issuer_fees = market_fees;
        if issuer_fees.amount > receives.amount {
            return Err(MarketError::internal("market fee exceeds the traded amount"));
        }

        if issuer_fees.amount > 0 && self.params.market_fee_network_percent > 0 {
            let network_amount =
                calculate_percent(issuer_fees.amount, self.params.market_fee_network_percent)?;
            if network_amount > issuer_fees.amount {
                return Err(MarketError::internal("network slice exceeds the market fee"));
            }
            if network_amount > 0 {
                self.store.deposit_market_fee_vesting(
                    AccountId::COMMITTEE,
                    AssetAmount::new(network_amount, recv_asset_id),
                );
                issuer_fees.amount -= network_amount;
            }
        }

        if issuer_fees.amount > 0 {
            let mut reward = AssetAmount::zero(recv_asset_id);

            if let Some(seller_id) = seller {
                let seller_account = self.store.account(seller_id)?.clone();
                let sharing_allowed = match &recv_asset.options.whitelist_market_fee_sharing {
                    None => true,
                    Some(list) => list.is_empty() || list.contains(&seller_account.registrar),
                };
                let reward_percent = recv_asset.options.reward_percent.unwrap_or(0);
                if sharing_allowed && reward_percent > 0 {
                    let reward_value = calculate_percent(issuer_fees.amount, reward_percent)?;
                    if reward_value > 0
                        && self.is_authorized_for_asset(seller_account.registrar, &recv_asset)
                    {
                        if reward_value > issuer_fees.amount {
                            return Err(MarketError::internal("reward exceeds issuer fees"));
                        }
                        reward = AssetAmount::new(reward_value, recv_asset_id);

                        let mut registrar = seller_account.registrar;
                        let mut referrer = seller_account.referrer;
                        if registrar == AccountId::TEMP {
                            registrar = AccountId::COMMITTEE;
                        }
                        if referrer == AccountId::TEMP {
                            referrer = AccountId::COMMITTEE;
                        }

                        let mut registrar_reward = reward;
                        if referrer != registrar {
                            let referrer_value = calculate_percent(
                                reward.amount,
                                seller_account.referrer_rewards_percentage,
                            )?;
                            if referrer_value > 0
                                && self.is_authorized_for_asset(referrer, &recv_asset)
                            {
                                if referrer_value > reward.amount {
                                    return Err(MarketError::internal(
                                        "referrer reward exceeds total reward",
                                    ));
                                }
                                let referrer_reward =
                                    AssetAmount::new(referrer_value, recv_asset_id);
                                registrar_reward -= referrer_reward;
                                self.store
                                    .deposit_market_fee_vesting(referrer, referrer_reward);
                            }
                        }
                        if registrar_reward.amount > 0 {
                            self.store
                                .deposit_market_fee_vesting(registrar, registrar_reward);
                        }
                    }
                }
            }

            if issuer_fees.amount > reward.amount {
                let to_issuer = issuer_fees.amount - reward.amount;
                self.store
                    .modify_asset_dynamic(recv_asset_id, |d| d.accumulated_fees += to_issuer)?;
            }
        }

        Ok(market_fees)
    }

    /// Force-settle fee owed to the issuer of the settled asset,
    /// denominated in the backing asset and assessed on the collateral
    /// remaining after market fees.
    pub(crate) fn pay_force_settle_fees(
        &mut self,
        settled_asset_id: AssetId,
        collat_receives: AssetAmount,
    ) -> Result<AssetAmount, MarketError> {
        if settled_asset_id == collat_receives.asset_id {
            return Err(MarketError::internal(
                "force-settle fee must be denominated in the backing asset",
            ));
        }
        let bitasset = self.store.bitasset(settled_asset_id)?;
        let percent = match bitasset.options.force_settle_fee_percent {
            Some(p) if p > 0 => p,
            _ => return Ok(AssetAmount::zero(collat_receives.asset_id)),
        };
        let value = calculate_percent(collat_receives.amount, percent)?;
        let settle_fee = AssetAmount::new(value, collat_receives.asset_id);
        if value > 0 {
            self.accumulate_fee(settled_asset_id, settle_fee)?;
        }
        Ok(settle_fee)
    }

    /// Credit a fee into the asset's own bucket, or into its
    /// collateral-fee bucket when the fee is denominated in the backing
    /// asset.
    pub(crate) fn accumulate_fee(
        &mut self,
        into_asset: AssetId,
        fee: AssetAmount,
    ) -> Result<(), MarketError> {
        if fee.amount < 0 {
            return Err(MarketError::internal("negative fee"));
        }
        if fee.asset_id == into_asset {
            self.store
                .modify_asset_dynamic(into_asset, |d| d.accumulated_fees += fee.amount)
        } else {
            let backing = self.store.bitasset(into_asset)?.options.short_backing_asset;
            if backing != fee.asset_id {
                return Err(MarketError::internal(
                    "fee denominated in an asset the bucket cannot hold",
                ));
            }
            self.store
                .modify_asset_dynamic(into_asset, |d| d.accumulated_collateral_fees += fee.amount)
        }
    }

    /// Whether `account` may hold `asset` under its white/blacklists.
    pub(crate) fn is_authorized_for_asset(&self, account: AccountId, asset: &AssetRecord) -> bool {
        if asset.options.blacklist_accounts.contains(&account) {
            return false;
        }
        if asset.options.flags & asset_flags::WHITE_LIST != 0 {
            return asset.options.whitelist_accounts.contains(&account);
        }
        true
    }
}
