//! Staking rewards ledger
//!
//! A global per-unit-of-weight accumulator advances lazily with elapsed
//! time, the configured annual rate and the committee's total weight,
//! clamped by an absolute annual cap. Guardians are credited from the
//! accumulator; a percent-mille share of every guardian credit is spread
//! over the guardian's delegated stake as a per-token rate from which
//! delegators are credited in turn. Claims compound back into stake.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use meridian_core::constants::PERCENT_MILLE_BASE;
use meridian_core::error::CoreError;
use meridian_core::interfaces::{
    Address, Committee, DelegationChangeListener, DelegationsView, GuardianRegistry,
    StakeBalances, Token,
};
use meridian_core::registry::Shared;
use meridian_core::units::{add128, add64, sub64, to_external, to_internal};
use meridian_core::AccessControl;

use crate::accumulator::{
    capped_annual_rate_pm, per_token_delta, per_weight_delta, ratio_pm, weighted_credit,
};
use crate::distribution::DistributionBatch;
use crate::error::{Result, RewardsError};
use crate::events::StakingRewardsEvent;

/// Governance parameters for the staking reward stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StakingRewardsSettings {
    /// Annual rate, percent-mille of committee weight.
    pub annual_rate_pm: u64,
    /// Absolute annual ceiling, internal units.
    pub annual_cap: u64,
    pub default_delegators_share_pm: u64,
    pub max_delegators_share_pm: u64,
}

/// Global accumulator state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StakingRewardsState {
    /// Reward accrued per unit of committee weight since genesis,
    /// `TOKEN_BASE`-scaled.
    pub rewards_per_weight: u128,
    pub last_assigned: u64,
    pub active: bool,
}

/// Per-guardian balance and snapshots. Amounts are internal units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardianStakingRewards {
    pub balance: u64,
    pub last_rewards_per_weight: u128,
    /// Delegator-facing reward per token of this guardian's delegated
    /// stake, `TOKEN_BASE`-scaled.
    pub delegator_rewards_per_token: u128,
    pub claimed: u64,
}

/// Per-delegator balance and snapshot. Amounts are internal units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelegatorStakingRewards {
    pub balance: u64,
    pub last_delegator_rewards_per_token: u128,
    pub claimed: u64,
}

/// Collaborator handles, swapped atomically on registry changes.
pub struct StakingRewardsDeps {
    pub committee: Shared<dyn Committee>,
    pub delegations: Shared<dyn DelegationsView>,
    pub staking: Shared<dyn StakeBalances>,
    pub guardian_registry: Shared<dyn GuardianRegistry>,
    pub token: Shared<dyn Token>,
}

pub struct StakingRewardsLedger {
    contract_address: Address,
    access: AccessControl,
    /// Single authorized caller of membership-change notifications.
    committee_caller: Address,
    /// Token destination for re-staked claims.
    staking_address: Address,
    state: StakingRewardsState,
    settings: StakingRewardsSettings,
    guardians: HashMap<Address, GuardianStakingRewards>,
    delegators: HashMap<Address, DelegatorStakingRewards>,
    guardian_share_overrides: HashMap<Address, u64>,
    batches: HashMap<Address, DistributionBatch>,
    committee: Option<Shared<dyn Committee>>,
    delegations: Option<Shared<dyn DelegationsView>>,
    staking: Option<Shared<dyn StakeBalances>>,
    guardian_registry: Option<Shared<dyn GuardianRegistry>>,
    token: Option<Shared<dyn Token>>,
    next_ledger: Option<Shared<StakingRewardsLedger>>,
    events: Vec<StakingRewardsEvent>,
}

impl StakingRewardsLedger {
    pub fn new(
        contract_address: &str,
        access: AccessControl,
        committee_caller: &str,
        staking_address: &str,
        settings: StakingRewardsSettings,
    ) -> Self {
        Self {
            contract_address: contract_address.to_string(),
            access,
            committee_caller: committee_caller.to_string(),
            staking_address: staking_address.to_string(),
            state: StakingRewardsState::default(),
            settings,
            guardians: HashMap::new(),
            delegators: HashMap::new(),
            guardian_share_overrides: HashMap::new(),
            batches: HashMap::new(),
            committee: None,
            delegations: None,
            staking: None,
            guardian_registry: None,
            token: None,
            next_ledger: None,
            events: Vec::new(),
        }
    }

    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    /// Swap the collaborator handles (registry change).
    pub fn rewire(&mut self, deps: StakingRewardsDeps) {
        self.committee = Some(deps.committee);
        self.delegations = Some(deps.delegations);
        self.staking = Some(deps.staking);
        self.guardian_registry = Some(deps.guardian_registry);
        self.token = Some(deps.token);
    }

    /// Register the successor ledger balances migrate to.
    pub fn set_next_ledger(&mut self, caller: &str, next: Shared<StakingRewardsLedger>) -> Result<()> {
        self.access.only_admin(caller)?;
        self.next_ledger = Some(next);
        Ok(())
    }

    // ---- queries ----

    pub fn get_state(&self) -> &StakingRewardsState {
        &self.state
    }

    pub fn get_settings(&self) -> &StakingRewardsSettings {
        &self.settings
    }

    pub fn guardian_rewards_data(&self, addr: &str) -> GuardianStakingRewards {
        self.guardians.get(addr).cloned().unwrap_or_default()
    }

    pub fn delegator_rewards_data(&self, addr: &str) -> DelegatorStakingRewards {
        self.delegators.get(addr).cloned().unwrap_or_default()
    }

    /// Effective delegators share for a guardian, percent-mille.
    pub fn get_guardian_delegators_share(&self, guardian: &str) -> u64 {
        self.guardian_share_overrides
            .get(guardian)
            .copied()
            .unwrap_or(self.settings.default_delegators_share_pm)
            .min(self.settings.max_delegators_share_pm)
    }

    /// Claimable balances including pending accrual, external units:
    /// `(guardian_component, delegator_component)`.
    pub fn get_staking_rewards_balance(&self, addr: &str, now: u64) -> Result<(u128, u128)> {
        let (stats, info) = {
            let committee = self.committee()?.read();
            (committee.get_committee_stats(), committee.get_member_info(addr))
        };
        let per_weight = self.projected_per_weight(stats.total_weight, now)?;

        // Guardian component
        let guardian_rec = self.guardian_rewards_data(addr);
        let mut guardian_balance = guardian_rec.balance;
        let mut projected_gpt = guardian_rec.delegator_rewards_per_token;
        let delegated = self.delegations()?.read().uncapped_stake_of(addr);
        if info.in_committee && per_weight > guardian_rec.last_rewards_per_weight {
            let total = weighted_credit(
                per_weight - guardian_rec.last_rewards_per_weight,
                info.weight,
            )?;
            let delegators_cut = ratio_pm(total, self.get_guardian_delegators_share(addr))?;
            if delegated > 0 && delegators_cut > 0 {
                guardian_balance = add64(guardian_balance, total - delegators_cut, "balance")?;
                projected_gpt = add128(
                    projected_gpt,
                    per_token_delta(delegators_cut, delegated)?,
                    "per-token rate",
                )?;
            } else {
                guardian_balance = add64(guardian_balance, total, "balance")?;
            }
        }

        // Delegator component, against the current guardian's projected rate
        let (guardian_of, own_stake) = {
            let delegations = self.delegations()?.read();
            (
                delegations.effective_delegate_of(addr),
                delegations.own_stake_of(addr),
            )
        };
        let gpt = if guardian_of == addr {
            projected_gpt
        } else {
            let g_rec = self.guardian_rewards_data(&guardian_of);
            let g_info = self.committee()?.read().get_member_info(&guardian_of);
            let g_delegated = self.delegations()?.read().uncapped_stake_of(&guardian_of);
            let mut gpt = g_rec.delegator_rewards_per_token;
            if g_info.in_committee && per_weight > g_rec.last_rewards_per_weight {
                let total =
                    weighted_credit(per_weight - g_rec.last_rewards_per_weight, g_info.weight)?;
                let cut = ratio_pm(total, self.get_guardian_delegators_share(&guardian_of))?;
                if g_delegated > 0 && cut > 0 {
                    gpt = add128(gpt, per_token_delta(cut, g_delegated)?, "per-token rate")?;
                }
            }
            gpt
        };
        let delegator_rec = self.delegator_rewards_data(addr);
        let mut delegator_balance = delegator_rec.balance;
        if gpt > delegator_rec.last_delegator_rewards_per_token && own_stake > 0 {
            delegator_balance = add64(
                delegator_balance,
                weighted_credit(gpt - delegator_rec.last_delegator_rewards_per_token, own_stake)?,
                "balance",
            )?;
        }

        Ok((to_external(guardian_balance), to_external(delegator_balance)))
    }

    pub fn events(&self) -> &[StakingRewardsEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<StakingRewardsEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- notifications ----

    /// Committee notification fired before a member's weight or membership
    /// changes. All values are the pre-change ones.
    pub fn committee_membership_will_change(
        &mut self,
        caller: &str,
        guardian: &str,
        weight: u64,
        total_committee_weight: u64,
        in_committee: bool,
        now: u64,
    ) -> Result<()> {
        AccessControl::only_designated(caller, &self.committee_caller, "committee contract")
            .map_err(RewardsError::Core)?;
        self.advance_rewards_per_weight(total_committee_weight, now)?;
        let delegated = self.delegations()?.read().uncapped_stake_of(guardian);
        self.settle_guardian(guardian, in_committee, weight, delegated)
    }

    // ---- claims & distribution ----

    /// Settle `addr` as guardian and delegator, zero both balances, and
    /// compound the sum back into stake. Returns the claimed external
    /// amount; claiming a zero balance is a no-op.
    pub fn claim_staking_rewards(&mut self, addr: &str, now: u64) -> Result<u128> {
        self.settle_member(addr, now)?;

        let guardian_amount = {
            let rec = self.guardians.entry(addr.to_string()).or_default();
            let amount = rec.balance;
            rec.balance = 0;
            rec.claimed = add64(rec.claimed, amount, "claimed total")?;
            amount
        };
        let delegator_amount = {
            let rec = self.delegators.entry(addr.to_string()).or_default();
            let amount = rec.balance;
            rec.balance = 0;
            rec.claimed = add64(rec.claimed, amount, "claimed total")?;
            amount
        };
        let total = add64(guardian_amount, delegator_amount, "claimed total")?;
        if total == 0 {
            return Ok(0);
        }
        let total_external = to_external(total);

        {
            let token = self.token()?;
            token
                .write()
                .transfer(&self.contract_address, &self.staking_address, total_external)
                .map_err(CoreError::Collaborator)?;
        }
        self.staking()?
            .write()
            .distribute_rewards(total_external, &[addr.to_string()], &[total_external])
            .map_err(CoreError::Collaborator)?;

        info!(
            "staking rewards claimed: {} restaked {} external units",
            addr, total_external
        );
        self.events.push(StakingRewardsEvent::StakingRewardsClaimed {
            addr: addr.to_string(),
            guardian_amount: to_external(guardian_amount),
            delegator_amount: to_external(delegator_amount),
        });
        Ok(total_external)
    }

    /// Distribute a guardian's settled rewards to a recipient list under the
    /// batch state machine. Amounts are external units and are re-staked.
    #[allow(clippy::too_many_arguments)]
    pub fn distribute_staking_rewards(
        &mut self,
        caller: &str,
        from_block: u64,
        to_block: u64,
        split_pm: u64,
        tx_index: u64,
        to: &[Address],
        amounts: &[u128],
        now: u64,
        now_block: u64,
    ) -> Result<()> {
        if to.is_empty() || to.len() != amounts.len() {
            return Err(RewardsError::LengthMismatch(to.len(), amounts.len()));
        }
        if split_pm > self.settings.max_delegators_share_pm {
            return Err(RewardsError::InvalidSplit(split_pm));
        }
        let guardian = self
            .guardian_registry()?
            .read()
            .resolve_guardian_address(caller)
            .ok_or_else(|| RewardsError::GuardianNotRegistered(caller.to_string()))?;
        let cursor = DistributionBatch::validate_next(
            self.batches.get(&guardian),
            from_block,
            to_block,
            split_pm,
            tx_index,
            now_block,
        )?;

        self.settle_member(&guardian, now)?;

        let mut total: u64 = 0;
        let mut delegators_total: u64 = 0;
        for (recipient, amount) in to.iter().zip(amounts) {
            let internal = to_internal(*amount).map_err(RewardsError::Core)?;
            if to_external(internal) != *amount {
                return Err(RewardsError::AmountNotGranular(*amount));
            }
            total = add64(total, internal, "distribution total")?;
            if recipient != &guardian {
                delegators_total = add64(delegators_total, internal, "distribution total")?;
            }
        }
        if total == 0 {
            return Err(RewardsError::ZeroAmount);
        }
        let allowed = ratio_pm(total, split_pm)?;
        if delegators_total > allowed {
            return Err(RewardsError::DelegatorsShareExceeded {
                allowed: to_external(allowed),
                actual: to_external(delegators_total),
            });
        }

        // Pay out of the guardian's settled balances, guardian-side first.
        let guardian_balance = self.guardians.entry(guardian.clone()).or_default().balance;
        let delegator_balance = self.delegators.entry(guardian.clone()).or_default().balance;
        let available = add64(guardian_balance, delegator_balance, "rewards balance")?;
        if available < total {
            return Err(RewardsError::InsufficientBalance {
                requested: to_external(total),
                available: to_external(available),
            });
        }
        let from_guardian = guardian_balance.min(total);
        {
            let rec = self.guardians.entry(guardian.clone()).or_default();
            rec.balance = sub64(rec.balance, from_guardian, "rewards balance")?;
            rec.claimed = add64(rec.claimed, from_guardian, "claimed total")?;
        }
        let from_delegator = total - from_guardian;
        if from_delegator > 0 {
            let rec = self.delegators.entry(guardian.clone()).or_default();
            rec.balance = sub64(rec.balance, from_delegator, "rewards balance")?;
            rec.claimed = add64(rec.claimed, from_delegator, "claimed total")?;
        }

        let total_external = to_external(total);
        {
            let token = self.token()?;
            token
                .write()
                .transfer(&self.contract_address, &self.staking_address, total_external)
                .map_err(CoreError::Collaborator)?;
        }
        self.staking()?
            .write()
            .distribute_rewards(total_external, to, amounts)
            .map_err(CoreError::Collaborator)?;

        self.batches.insert(guardian.clone(), cursor);

        debug!(
            "distributed {} external units for {} (batch {}-{} tx {})",
            total_external, guardian, from_block, to_block, tx_index
        );
        self.events.push(StakingRewardsEvent::StakingRewardsDistributed {
            distributor: guardian,
            from_block,
            to_block,
            split_pm,
            tx_index,
            to: to.to_vec(),
            amounts: amounts.to_vec(),
        });
        Ok(())
    }

    // ---- settings ----

    /// Update the annual rate and cap. The accumulator is settled first so
    /// the old rate applies to the elapsed interval. Cap is external units.
    pub fn set_annual_staking_rewards_rate(
        &mut self,
        caller: &str,
        rate_pm: u64,
        annual_cap: u128,
        now: u64,
    ) -> Result<()> {
        self.access.only_functional_manager(caller)?;
        let total_weight = self.committee()?.read().get_committee_stats().total_weight;
        self.advance_rewards_per_weight(total_weight, now)?;
        self.settings.annual_rate_pm = rate_pm;
        self.settings.annual_cap = to_internal(annual_cap).map_err(RewardsError::Core)?;
        self.events
            .push(StakingRewardsEvent::AnnualStakingRewardsRateChanged { rate_pm, annual_cap });
        Ok(())
    }

    pub fn set_default_delegators_share(&mut self, caller: &str, share_pm: u64) -> Result<()> {
        self.access.only_functional_manager(caller)?;
        if share_pm > self.settings.max_delegators_share_pm {
            return Err(RewardsError::InvalidSplit(share_pm));
        }
        self.settings.default_delegators_share_pm = share_pm;
        self.events
            .push(StakingRewardsEvent::DefaultDelegatorsShareChanged { share_pm });
        Ok(())
    }

    pub fn set_max_delegators_share(&mut self, caller: &str, share_pm: u64) -> Result<()> {
        self.access.only_functional_manager(caller)?;
        if share_pm > PERCENT_MILLE_BASE {
            return Err(RewardsError::InvalidSplit(share_pm));
        }
        self.settings.max_delegators_share_pm = share_pm;
        self.events
            .push(StakingRewardsEvent::MaxDelegatorsShareChanged { share_pm });
        Ok(())
    }

    /// Per-guardian delegators-share override, set by the guardian (or its
    /// registered agent address). The guardian is settled first so accrued
    /// rewards keep the old split.
    pub fn set_guardian_delegators_share(
        &mut self,
        caller: &str,
        share_pm: u64,
        now: u64,
    ) -> Result<()> {
        if share_pm > PERCENT_MILLE_BASE {
            return Err(RewardsError::InvalidSplit(share_pm));
        }
        let guardian = self
            .guardian_registry()?
            .read()
            .resolve_guardian_address(caller)
            .ok_or_else(|| RewardsError::GuardianNotRegistered(caller.to_string()))?;
        self.settle_member(&guardian, now)?;
        self.guardian_share_overrides.insert(guardian.clone(), share_pm);
        self.events
            .push(StakingRewardsEvent::GuardianDelegatorsShareChanged { guardian, share_pm });
        Ok(())
    }

    // ---- lifecycle & migration ----

    /// Unfreeze accrual, starting the clock at `start_time` (a successor's
    /// clock starts exactly where its predecessor ended).
    pub fn activate(&mut self, caller: &str, start_time: u64) -> Result<()> {
        self.access.only_migration_manager(caller)?;
        if self.state.active {
            return Err(RewardsError::DistributionActive);
        }
        self.state.active = true;
        self.state.last_assigned = start_time;
        self.events
            .push(StakingRewardsEvent::RewardDistributionActivated { start_time });
        Ok(())
    }

    /// One final settlement pass over the global accumulator, then freeze.
    /// Claims of already-accrued balances remain available.
    pub fn deactivate(&mut self, caller: &str, now: u64) -> Result<()> {
        self.access.only_migration_manager(caller)?;
        if !self.state.active {
            return Err(RewardsError::DistributionInactive);
        }
        let total_weight = self.committee()?.read().get_committee_stats().total_weight;
        self.advance_rewards_per_weight(total_weight, now)?;
        self.state.active = false;
        self.events
            .push(StakingRewardsEvent::RewardDistributionDeactivated { at: now });
        Ok(())
    }

    /// Hand each member's settled balance off to the registered successor
    /// ledger. Requires deactivation.
    pub fn migrate_rewards_balance(&mut self, caller: &str, addrs: &[Address], now: u64) -> Result<()> {
        self.access.only_migration_manager(caller)?;
        if self.state.active {
            return Err(RewardsError::DistributionActive);
        }
        let next = self
            .next_ledger
            .clone()
            .ok_or(CoreError::NotWired("rewards successor"))?;
        let next_address = next.read().contract_address.clone();
        if next_address == self.contract_address {
            return Err(RewardsError::SelfMigration);
        }

        let mut guardian_amounts: Vec<u128> = Vec::with_capacity(addrs.len());
        let mut delegator_amounts: Vec<u128> = Vec::with_capacity(addrs.len());
        let mut total: u128 = 0;
        for addr in addrs {
            self.settle_member(addr, now)?;
            let guardian_amount = {
                let rec = self.guardians.entry(addr.clone()).or_default();
                std::mem::take(&mut rec.balance)
            };
            let delegator_amount = {
                let rec = self.delegators.entry(addr.clone()).or_default();
                std::mem::take(&mut rec.balance)
            };
            guardian_amounts.push(to_external(guardian_amount));
            delegator_amounts.push(to_external(delegator_amount));
            total += to_external(guardian_amount) + to_external(delegator_amount);
        }
        if total == 0 {
            return Ok(());
        }

        {
            let token = self.token()?;
            token
                .write()
                .approve(&self.contract_address, &next_address, total)
                .map_err(CoreError::Collaborator)?;
        }
        next.write().accept_rewards_balance_migration(
            &self.contract_address,
            addrs,
            &guardian_amounts,
            &delegator_amounts,
            total,
        )?;

        for (i, addr) in addrs.iter().enumerate() {
            self.events
                .push(StakingRewardsEvent::StakingRewardsBalanceMigrated {
                    addr: addr.clone(),
                    guardian_amount: guardian_amounts[i],
                    delegator_amount: delegator_amounts[i],
                    to: next_address.clone(),
                });
        }
        info!(
            "migrated staking rewards balances of {} members to {}",
            addrs.len(),
            next_address
        );
        Ok(())
    }

    /// Accept migrated balances from any pre-approved payer. The per-member
    /// amount lists must sum to `total`.
    pub fn accept_rewards_balance_migration(
        &mut self,
        caller: &str,
        addrs: &[Address],
        guardian_amounts: &[u128],
        delegator_amounts: &[u128],
        total: u128,
    ) -> Result<()> {
        if addrs.len() != guardian_amounts.len() {
            return Err(RewardsError::LengthMismatch(
                addrs.len(),
                guardian_amounts.len(),
            ));
        }
        if addrs.len() != delegator_amounts.len() {
            return Err(RewardsError::LengthMismatch(
                addrs.len(),
                delegator_amounts.len(),
            ));
        }
        if total == 0 {
            return Err(RewardsError::ZeroAmount);
        }
        let actual: u128 = guardian_amounts.iter().sum::<u128>()
            + delegator_amounts.iter().sum::<u128>();
        if actual != total {
            return Err(RewardsError::TotalMismatch {
                expected: total,
                actual,
            });
        }
        for amount in guardian_amounts.iter().chain(delegator_amounts) {
            let internal = to_internal(*amount).map_err(RewardsError::Core)?;
            if to_external(internal) != *amount {
                return Err(RewardsError::AmountNotGranular(*amount));
            }
        }

        {
            let token = self.token()?;
            token
                .write()
                .transfer_from(&self.contract_address, caller, &self.contract_address, total)
                .map_err(CoreError::Collaborator)?;
        }

        for (i, addr) in addrs.iter().enumerate() {
            let guardian_internal = to_internal(guardian_amounts[i]).map_err(RewardsError::Core)?;
            let delegator_internal =
                to_internal(delegator_amounts[i]).map_err(RewardsError::Core)?;
            if guardian_internal > 0 {
                let rec = self.guardians.entry(addr.clone()).or_default();
                rec.balance = add64(rec.balance, guardian_internal, "rewards balance")?;
            }
            if delegator_internal > 0 {
                let rec = self.delegators.entry(addr.clone()).or_default();
                rec.balance = add64(rec.balance, delegator_internal, "rewards balance")?;
            }
            self.events
                .push(StakingRewardsEvent::StakingRewardsBalanceMigrationAccepted {
                    from: caller.to_string(),
                    addr: addr.clone(),
                    guardian_amount: guardian_amounts[i],
                    delegator_amount: delegator_amounts[i],
                });
        }
        Ok(())
    }

    /// Sweep the entire token balance to the caller. No settlement is
    /// performed; this bypasses all accumulator bookkeeping.
    pub fn emergency_withdraw(&mut self, caller: &str) -> Result<u128> {
        self.access.only_migration_manager(caller)?;
        let token = self.token()?;
        let amount = token.read().balance_of(&self.contract_address);
        if amount > 0 {
            token
                .write()
                .transfer(&self.contract_address, caller, amount)
                .map_err(CoreError::Collaborator)?;
        }
        self.events.push(StakingRewardsEvent::EmergencyWithdrawal {
            caller: caller.to_string(),
            amount,
        });
        Ok(amount)
    }

    // ---- settlement internals ----

    /// Advance the global accumulator to `now` at the given total weight.
    /// A no-op while frozen or when no time has elapsed.
    fn advance_rewards_per_weight(&mut self, total_weight: u64, now: u64) -> Result<()> {
        if !self.state.active || now <= self.state.last_assigned {
            return Ok(());
        }
        let elapsed = now - self.state.last_assigned;
        let rate_pm = capped_annual_rate_pm(
            self.settings.annual_rate_pm,
            self.settings.annual_cap,
            total_weight,
        );
        if total_weight > 0 && rate_pm > 0 {
            let delta = per_weight_delta(rate_pm, elapsed)?;
            self.state.rewards_per_weight =
                add128(self.state.rewards_per_weight, delta, "rewards per weight")?;
        }
        self.state.last_assigned = now;
        Ok(())
    }

    /// Credit a guardian for the accumulator delta since its last snapshot
    /// and advance its delegator-facing per-token rate. Always snapshots,
    /// even out of committee, so absence intervals accrue nothing.
    fn settle_guardian(
        &mut self,
        guardian: &str,
        in_committee: bool,
        weight: u64,
        delegated_stake: u64,
    ) -> Result<()> {
        let per_weight = self.state.rewards_per_weight;
        let share_pm = self.get_guardian_delegators_share(guardian);
        let mut assigned: Option<(u64, u64)> = None;
        {
            let rec = self.guardians.entry(guardian.to_string()).or_default();
            if in_committee && per_weight > rec.last_rewards_per_weight {
                let total = weighted_credit(per_weight - rec.last_rewards_per_weight, weight)?;
                if total > 0 {
                    let delegators_cut = ratio_pm(total, share_pm)?;
                    if delegated_stake > 0 && delegators_cut > 0 {
                        rec.balance =
                            add64(rec.balance, total - delegators_cut, "rewards balance")?;
                        rec.delegator_rewards_per_token = add128(
                            rec.delegator_rewards_per_token,
                            per_token_delta(delegators_cut, delegated_stake)?,
                            "per-token rate",
                        )?;
                        assigned = Some((total, delegators_cut));
                    } else {
                        // Nobody to attribute the delegator share to; the
                        // guardian keeps the whole credit.
                        rec.balance = add64(rec.balance, total, "rewards balance")?;
                        assigned = Some((total, 0));
                    }
                }
            }
            rec.last_rewards_per_weight = per_weight;
        }
        if let Some((total, delegators_cut)) = assigned {
            self.events
                .push(StakingRewardsEvent::GuardianStakingRewardsAssigned {
                    guardian: guardian.to_string(),
                    amount: to_external(total),
                    delegators_amount: to_external(delegators_cut),
                });
        }
        Ok(())
    }

    /// Credit a delegator for its guardian's per-token rate delta since the
    /// last snapshot, then re-anchor the snapshot.
    fn settle_delegator(&mut self, delegator: &str, guardian: &str, delegator_stake: u64) -> Result<()> {
        let gpt = self
            .guardians
            .entry(guardian.to_string())
            .or_default()
            .delegator_rewards_per_token;
        let mut credited: u64 = 0;
        {
            let rec = self.delegators.entry(delegator.to_string()).or_default();
            if gpt > rec.last_delegator_rewards_per_token && delegator_stake > 0 {
                credited = weighted_credit(
                    gpt - rec.last_delegator_rewards_per_token,
                    delegator_stake,
                )?;
                rec.balance = add64(rec.balance, credited, "rewards balance")?;
            }
            rec.last_delegator_rewards_per_token = gpt;
        }
        if credited > 0 {
            self.events
                .push(StakingRewardsEvent::DelegatorStakingRewardsAssigned {
                    delegator: delegator.to_string(),
                    guardian: guardian.to_string(),
                    amount: to_external(credited),
                });
        }
        Ok(())
    }

    /// Full settlement of one address: global accumulator, the address as
    /// guardian, its guardian if different, and the address as delegator.
    fn settle_member(&mut self, addr: &str, now: u64) -> Result<()> {
        let (stats, info) = {
            let committee = self.committee()?.read();
            (committee.get_committee_stats(), committee.get_member_info(addr))
        };
        self.advance_rewards_per_weight(stats.total_weight, now)?;

        let (guardian, own_stake, delegated, guardian_delegated) = {
            let delegations = self.delegations()?.read();
            let guardian = delegations.effective_delegate_of(addr);
            (
                guardian.clone(),
                delegations.own_stake_of(addr),
                delegations.uncapped_stake_of(addr),
                delegations.uncapped_stake_of(&guardian),
            )
        };

        self.settle_guardian(addr, info.in_committee, info.weight, delegated)?;
        if guardian != addr {
            let guardian_info = self.committee()?.read().get_member_info(&guardian);
            self.settle_guardian(
                &guardian,
                guardian_info.in_committee,
                guardian_info.weight,
                guardian_delegated,
            )?;
        }
        self.settle_delegator(addr, &guardian, own_stake)
    }

    /// Hypothetical accumulator value at `now` without mutating state.
    fn projected_per_weight(&self, total_weight: u64, now: u64) -> Result<u128> {
        let mut per_weight = self.state.rewards_per_weight;
        if self.state.active && now > self.state.last_assigned && total_weight > 0 {
            let elapsed = now - self.state.last_assigned;
            let rate_pm = capped_annual_rate_pm(
                self.settings.annual_rate_pm,
                self.settings.annual_cap,
                total_weight,
            );
            if rate_pm > 0 {
                per_weight = add128(
                    per_weight,
                    per_weight_delta(rate_pm, elapsed)?,
                    "rewards per weight",
                )?;
            }
        }
        Ok(per_weight)
    }

    // ---- handle accessors ----

    fn committee(&self) -> Result<&Shared<dyn Committee>> {
        Ok(self
            .committee
            .as_ref()
            .ok_or(CoreError::NotWired("committee"))?)
    }

    fn delegations(&self) -> Result<&Shared<dyn DelegationsView>> {
        Ok(self
            .delegations
            .as_ref()
            .ok_or(CoreError::NotWired("delegations"))?)
    }

    fn staking(&self) -> Result<&Shared<dyn StakeBalances>> {
        Ok(self
            .staking
            .as_ref()
            .ok_or(CoreError::NotWired("staking"))?)
    }

    fn guardian_registry(&self) -> Result<&Shared<dyn GuardianRegistry>> {
        Ok(self
            .guardian_registry
            .as_ref()
            .ok_or(CoreError::NotWired("guardian registry"))?)
    }

    fn token(&self) -> Result<&Shared<dyn Token>> {
        Ok(self.token.as_ref().ok_or(CoreError::NotWired("token"))?)
    }
}

impl DelegationChangeListener for StakingRewardsLedger {
    fn delegation_will_change(
        &mut self,
        guardian: &str,
        delegated_stake: u64,
        delegator: &str,
        delegator_stake: u64,
        next_guardian: &str,
        next_guardian_delegated_stake: u64,
        now: u64,
    ) -> std::result::Result<(), String> {
        self.handle_delegation_will_change(
            guardian,
            delegated_stake,
            delegator,
            delegator_stake,
            next_guardian,
            next_guardian_delegated_stake,
            now,
        )
        .map_err(|e| e.to_string())
    }
}

impl StakingRewardsLedger {
    #[allow(clippy::too_many_arguments)]
    fn handle_delegation_will_change(
        &mut self,
        guardian: &str,
        delegated_stake: u64,
        delegator: &str,
        delegator_stake: u64,
        next_guardian: &str,
        next_guardian_delegated_stake: u64,
        now: u64,
    ) -> Result<()> {
        let total_weight = self.committee()?.read().get_committee_stats().total_weight;
        self.advance_rewards_per_weight(total_weight, now)?;

        let info = self.committee()?.read().get_member_info(guardian);
        self.settle_guardian(guardian, info.in_committee, info.weight, delegated_stake)?;
        if next_guardian != guardian {
            let next_info = self.committee()?.read().get_member_info(next_guardian);
            self.settle_guardian(
                next_guardian,
                next_info.in_committee,
                next_info.weight,
                next_guardian_delegated_stake,
            )?;
        }
        self.settle_delegator(delegator, guardian, delegator_stake)?;

        // Re-anchor the delegator to the rate of the guardian it is moving
        // to, so no credit spans the switch.
        let next_gpt = self
            .guardians
            .entry(next_guardian.to_string())
            .or_default()
            .delegator_rewards_per_token;
        self.delegators
            .entry(delegator.to_string())
            .or_default()
            .last_delegator_rewards_per_token = next_gpt;
        Ok(())
    }
}
