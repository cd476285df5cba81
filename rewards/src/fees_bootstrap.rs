//! Fees and bootstrap rewards ledger
//!
//! Per-member accumulators over the general and certified committees. The
//! certified tracks accumulate the general deltas plus a certified-only
//! extra: certified membership is general-plus-extra, not a separate pool.
//! Fee revenue enters the accumulators in exactly one place, the pull from
//! the fee bucket pools during a global advance. Fee and bootstrap balances
//! accrue independently and are paid in two different tokens.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use meridian_core::error::CoreError;
use meridian_core::interfaces::{Address, Committee, FeeBucketSource, Token};
use meridian_core::registry::Shared;
use meridian_core::units::{add128, add64, mul128, to_external, to_internal};
use meridian_core::AccessControl;

use crate::accumulator::{per_member_delta, scaled_credit};
use crate::error::{Result, RewardsError};
use crate::events::FeesBootstrapEvent;
use meridian_core::constants::TOKEN_BASE;

/// Which of the two reward tokens an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardToken {
    Fee,
    Bootstrap,
}

/// Governance parameters: annual bootstrap allowances per member,
/// internal units. Certified members receive the general allowance plus
/// the certified one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeesAndBootstrapSettings {
    pub general_annual_bootstrap: u64,
    pub certified_annual_bootstrap: u64,
}

/// Global per-member accumulators, `TOKEN_BASE`-scaled. The residues hold
/// collected fees that could not be allocated yet (empty committee).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeesAndBootstrapState {
    pub general_fees_per_member: u128,
    pub certified_fees_per_member: u128,
    pub general_bootstrap_per_member: u128,
    pub certified_bootstrap_per_member: u128,
    pub general_fees_residue: u64,
    pub certified_fees_residue: u64,
    pub last_assigned: u64,
    pub active: bool,
}

/// Per-guardian balances and snapshots. Amounts are internal units. The
/// snapshots anchor against the track matching `certified`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeesAndBootstrap {
    pub fee_balance: u64,
    pub bootstrap_balance: u64,
    pub last_fees_per_member: u128,
    pub last_bootstrap_per_member: u128,
    pub withdrawn_fees: u64,
    pub withdrawn_bootstrap: u64,
    pub certified: bool,
}

/// Collaborator handles, swapped atomically on registry changes.
pub struct FeesAndBootstrapDeps {
    pub committee: Shared<dyn Committee>,
    pub general_fees_wallet: Shared<dyn FeeBucketSource>,
    pub certified_fees_wallet: Shared<dyn FeeBucketSource>,
    pub fee_token: Shared<dyn Token>,
    pub bootstrap_token: Shared<dyn Token>,
}

pub struct FeesAndBootstrapLedger {
    contract_address: Address,
    access: AccessControl,
    /// Single authorized caller of membership-change notifications.
    committee_caller: Address,
    state: FeesAndBootstrapState,
    settings: FeesAndBootstrapSettings,
    guardians: HashMap<Address, FeesAndBootstrap>,
    committee: Option<Shared<dyn Committee>>,
    general_fees_wallet: Option<Shared<dyn FeeBucketSource>>,
    certified_fees_wallet: Option<Shared<dyn FeeBucketSource>>,
    fee_token: Option<Shared<dyn Token>>,
    bootstrap_token: Option<Shared<dyn Token>>,
    next_ledger: Option<Shared<FeesAndBootstrapLedger>>,
    events: Vec<FeesBootstrapEvent>,
}

impl FeesAndBootstrapLedger {
    pub fn new(
        contract_address: &str,
        access: AccessControl,
        committee_caller: &str,
        settings: FeesAndBootstrapSettings,
    ) -> Self {
        Self {
            contract_address: contract_address.to_string(),
            access,
            committee_caller: committee_caller.to_string(),
            state: FeesAndBootstrapState::default(),
            settings,
            guardians: HashMap::new(),
            committee: None,
            general_fees_wallet: None,
            certified_fees_wallet: None,
            fee_token: None,
            bootstrap_token: None,
            next_ledger: None,
            events: Vec::new(),
        }
    }

    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    /// Swap the collaborator handles (registry change).
    pub fn rewire(&mut self, deps: FeesAndBootstrapDeps) {
        self.committee = Some(deps.committee);
        self.general_fees_wallet = Some(deps.general_fees_wallet);
        self.certified_fees_wallet = Some(deps.certified_fees_wallet);
        self.fee_token = Some(deps.fee_token);
        self.bootstrap_token = Some(deps.bootstrap_token);
    }

    /// Register the successor ledger balances migrate to.
    pub fn set_next_ledger(
        &mut self,
        caller: &str,
        next: Shared<FeesAndBootstrapLedger>,
    ) -> Result<()> {
        self.access.only_admin(caller)?;
        self.next_ledger = Some(next);
        Ok(())
    }

    // ---- queries ----

    pub fn get_state(&self) -> &FeesAndBootstrapState {
        &self.state
    }

    pub fn get_settings(&self) -> &FeesAndBootstrapSettings {
        &self.settings
    }

    pub fn guardian_fees_and_bootstrap(&self, addr: &str) -> FeesAndBootstrap {
        self.guardians.get(addr).cloned().unwrap_or_default()
    }

    /// Claimable balances including pending accrual, external units:
    /// `(fee_balance, bootstrap_balance)`.
    pub fn get_fees_and_bootstrap_balance(&self, addr: &str, now: u64) -> Result<(u128, u128)> {
        let (stats, info) = {
            let committee = self.committee()?.read();
            (committee.get_committee_stats(), committee.get_member_info(addr))
        };
        let rec = self.guardian_fees_and_bootstrap(addr);
        let mut fee_balance = rec.fee_balance;
        let mut bootstrap_balance = rec.bootstrap_balance;

        if info.in_committee {
            let (fees_track, bootstrap_track) =
                self.projected_tracks(rec.certified, stats.general_size, stats.certified_size, now)?;
            if fees_track > rec.last_fees_per_member {
                fee_balance = add64(
                    fee_balance,
                    scaled_credit(fees_track - rec.last_fees_per_member)?,
                    "fee balance",
                )?;
            }
            if bootstrap_track > rec.last_bootstrap_per_member {
                bootstrap_balance = add64(
                    bootstrap_balance,
                    scaled_credit(bootstrap_track - rec.last_bootstrap_per_member)?,
                    "bootstrap balance",
                )?;
            }
        }
        Ok((to_external(fee_balance), to_external(bootstrap_balance)))
    }

    pub fn events(&self) -> &[FeesBootstrapEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<FeesBootstrapEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- notifications ----

    /// Committee notification fired before a member's membership or
    /// certification changes. Sizes and flags are the pre-change values
    /// except `next_certified`.
    #[allow(clippy::too_many_arguments)]
    pub fn committee_membership_will_change(
        &mut self,
        caller: &str,
        guardian: &str,
        in_committee: bool,
        certified: bool,
        next_certified: bool,
        general_committee_size: u32,
        certified_committee_size: u32,
        now: u64,
    ) -> Result<()> {
        AccessControl::only_designated(caller, &self.committee_caller, "committee contract")
            .map_err(RewardsError::Core)?;
        self.advance_totals(general_committee_size, certified_committee_size, now)?;
        self.settle_guardian(guardian, in_committee, certified, next_certified)
    }

    // ---- withdrawals ----

    /// Settle and pay out a guardian's fee balance in the fee token.
    /// Returns the external amount; a zero balance is a no-op.
    pub fn withdraw_fees(&mut self, guardian: &str, now: u64) -> Result<u128> {
        self.settle_member(guardian, now)?;
        let amount = {
            let rec = self.guardians.entry(guardian.to_string()).or_default();
            let amount = std::mem::take(&mut rec.fee_balance);
            rec.withdrawn_fees = add64(rec.withdrawn_fees, amount, "withdrawn total")?;
            amount
        };
        if amount == 0 {
            return Ok(0);
        }
        let external = to_external(amount);
        self.fee_token()?
            .write()
            .transfer(&self.contract_address, guardian, external)
            .map_err(CoreError::Collaborator)?;
        info!("fees withdrawn: {} received {} external units", guardian, external);
        self.events.push(FeesBootstrapEvent::FeesWithdrawn {
            guardian: guardian.to_string(),
            amount: external,
        });
        Ok(external)
    }

    /// Settle and pay out a guardian's bootstrap balance in the bootstrap
    /// token. Returns the external amount; a zero balance is a no-op.
    pub fn withdraw_bootstrap_funds(&mut self, guardian: &str, now: u64) -> Result<u128> {
        self.settle_member(guardian, now)?;
        let amount = {
            let rec = self.guardians.entry(guardian.to_string()).or_default();
            let amount = std::mem::take(&mut rec.bootstrap_balance);
            rec.withdrawn_bootstrap = add64(rec.withdrawn_bootstrap, amount, "withdrawn total")?;
            amount
        };
        if amount == 0 {
            return Ok(0);
        }
        let external = to_external(amount);
        self.bootstrap_token()?
            .write()
            .transfer(&self.contract_address, guardian, external)
            .map_err(CoreError::Collaborator)?;
        info!(
            "bootstrap withdrawn: {} received {} external units",
            guardian, external
        );
        self.events.push(FeesBootstrapEvent::BootstrapWithdrawn {
            guardian: guardian.to_string(),
            amount: external,
        });
        Ok(external)
    }

    // ---- settings ----

    /// Update the general-committee annual bootstrap allowance (external
    /// units). The accumulators are settled first.
    pub fn set_general_committee_annual_bootstrap(
        &mut self,
        caller: &str,
        annual_amount: u128,
        now: u64,
    ) -> Result<()> {
        self.access.only_functional_manager(caller)?;
        self.advance_with_current_stats(now)?;
        self.settings.general_annual_bootstrap =
            to_internal(annual_amount).map_err(RewardsError::Core)?;
        self.events
            .push(FeesBootstrapEvent::GeneralCommitteeAnnualBootstrapChanged { annual_amount });
        Ok(())
    }

    /// Update the certified-committee extra annual bootstrap allowance
    /// (external units). The accumulators are settled first.
    pub fn set_certified_committee_annual_bootstrap(
        &mut self,
        caller: &str,
        annual_amount: u128,
        now: u64,
    ) -> Result<()> {
        self.access.only_functional_manager(caller)?;
        self.advance_with_current_stats(now)?;
        self.settings.certified_annual_bootstrap =
            to_internal(annual_amount).map_err(RewardsError::Core)?;
        self.events
            .push(FeesBootstrapEvent::CertifiedCommitteeAnnualBootstrapChanged { annual_amount });
        Ok(())
    }

    // ---- lifecycle & migration ----

    /// Unfreeze accrual, starting the clock at `start_time`.
    pub fn activate(&mut self, caller: &str, start_time: u64) -> Result<()> {
        self.access.only_migration_manager(caller)?;
        if self.state.active {
            return Err(RewardsError::DistributionActive);
        }
        self.state.active = true;
        self.state.last_assigned = start_time;
        self.events
            .push(FeesBootstrapEvent::RewardDistributionActivated { start_time });
        Ok(())
    }

    /// One final settlement pass over the accumulators, then freeze.
    /// Withdrawals of already-accrued balances remain available.
    pub fn deactivate(&mut self, caller: &str, now: u64) -> Result<()> {
        self.access.only_migration_manager(caller)?;
        if !self.state.active {
            return Err(RewardsError::DistributionInactive);
        }
        self.advance_with_current_stats(now)?;
        self.state.active = false;
        self.events
            .push(FeesBootstrapEvent::RewardDistributionDeactivated { at: now });
        Ok(())
    }

    /// Hand each member's settled balances off to the registered successor
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

        let mut fee_amounts: Vec<u128> = Vec::with_capacity(addrs.len());
        let mut bootstrap_amounts: Vec<u128> = Vec::with_capacity(addrs.len());
        let mut total_fees: u128 = 0;
        let mut total_bootstrap: u128 = 0;
        for addr in addrs {
            self.settle_member(addr, now)?;
            let rec = self.guardians.entry(addr.clone()).or_default();
            let fees = to_external(std::mem::take(&mut rec.fee_balance));
            let bootstrap = to_external(std::mem::take(&mut rec.bootstrap_balance));
            fee_amounts.push(fees);
            bootstrap_amounts.push(bootstrap);
            total_fees += fees;
            total_bootstrap += bootstrap;
        }
        if total_fees == 0 && total_bootstrap == 0 {
            return Ok(());
        }

        if total_fees > 0 {
            self.fee_token()?
                .write()
                .approve(&self.contract_address, &next_address, total_fees)
                .map_err(CoreError::Collaborator)?;
        }
        if total_bootstrap > 0 {
            self.bootstrap_token()?
                .write()
                .approve(&self.contract_address, &next_address, total_bootstrap)
                .map_err(CoreError::Collaborator)?;
        }
        next.write().accept_rewards_balance_migration(
            &self.contract_address,
            addrs,
            &fee_amounts,
            &bootstrap_amounts,
            total_fees,
            total_bootstrap,
        )?;

        for (i, addr) in addrs.iter().enumerate() {
            self.events
                .push(FeesBootstrapEvent::FeesAndBootstrapBalanceMigrated {
                    addr: addr.clone(),
                    fee_amount: fee_amounts[i],
                    bootstrap_amount: bootstrap_amounts[i],
                    to: next_address.clone(),
                });
        }
        info!(
            "migrated fees/bootstrap balances of {} members to {}",
            addrs.len(),
            next_address
        );
        Ok(())
    }

    /// Accept migrated balances from any pre-approved payer. Each amount
    /// list must sum to its supplied total.
    pub fn accept_rewards_balance_migration(
        &mut self,
        caller: &str,
        addrs: &[Address],
        fee_amounts: &[u128],
        bootstrap_amounts: &[u128],
        total_fees: u128,
        total_bootstrap: u128,
    ) -> Result<()> {
        if addrs.len() != fee_amounts.len() {
            return Err(RewardsError::LengthMismatch(addrs.len(), fee_amounts.len()));
        }
        if addrs.len() != bootstrap_amounts.len() {
            return Err(RewardsError::LengthMismatch(
                addrs.len(),
                bootstrap_amounts.len(),
            ));
        }
        if total_fees == 0 && total_bootstrap == 0 {
            return Err(RewardsError::ZeroAmount);
        }
        let actual_fees: u128 = fee_amounts.iter().sum();
        if actual_fees != total_fees {
            return Err(RewardsError::TotalMismatch {
                expected: total_fees,
                actual: actual_fees,
            });
        }
        let actual_bootstrap: u128 = bootstrap_amounts.iter().sum();
        if actual_bootstrap != total_bootstrap {
            return Err(RewardsError::TotalMismatch {
                expected: total_bootstrap,
                actual: actual_bootstrap,
            });
        }
        for amount in fee_amounts.iter().chain(bootstrap_amounts) {
            let internal = to_internal(*amount).map_err(RewardsError::Core)?;
            if to_external(internal) != *amount {
                return Err(RewardsError::AmountNotGranular(*amount));
            }
        }

        if total_fees > 0 {
            self.fee_token()?
                .write()
                .transfer_from(&self.contract_address, caller, &self.contract_address, total_fees)
                .map_err(CoreError::Collaborator)?;
        }
        if total_bootstrap > 0 {
            self.bootstrap_token()?
                .write()
                .transfer_from(
                    &self.contract_address,
                    caller,
                    &self.contract_address,
                    total_bootstrap,
                )
                .map_err(CoreError::Collaborator)?;
        }

        for (i, addr) in addrs.iter().enumerate() {
            let fees = to_internal(fee_amounts[i]).map_err(RewardsError::Core)?;
            let bootstrap = to_internal(bootstrap_amounts[i]).map_err(RewardsError::Core)?;
            let rec = self.guardians.entry(addr.clone()).or_default();
            rec.fee_balance = add64(rec.fee_balance, fees, "fee balance")?;
            rec.bootstrap_balance = add64(rec.bootstrap_balance, bootstrap, "bootstrap balance")?;
            self.events
                .push(FeesBootstrapEvent::FeesAndBootstrapBalanceMigrationAccepted {
                    from: caller.to_string(),
                    addr: addr.clone(),
                    fee_amount: fee_amounts[i],
                    bootstrap_amount: bootstrap_amounts[i],
                });
        }
        Ok(())
    }

    /// Sweep the entire balance of one token to the caller. No settlement
    /// is performed; this bypasses all accumulator bookkeeping.
    pub fn emergency_withdraw(&mut self, caller: &str, token: RewardToken) -> Result<u128> {
        self.access.only_migration_manager(caller)?;
        let handle = match token {
            RewardToken::Fee => self.fee_token()?,
            RewardToken::Bootstrap => self.bootstrap_token()?,
        };
        let amount = handle.read().balance_of(&self.contract_address);
        if amount > 0 {
            handle
                .write()
                .transfer(&self.contract_address, caller, amount)
                .map_err(CoreError::Collaborator)?;
        }
        self.events.push(FeesBootstrapEvent::EmergencyWithdrawal {
            caller: caller.to_string(),
            token,
            amount,
        });
        Ok(amount)
    }

    // ---- settlement internals ----

    /// Advance the per-member accumulators to `now`: bootstrap by elapsed
    /// time, fees by pulling the bucket pools. The only place fee revenue
    /// is recognized. A no-op while frozen.
    fn advance_totals(&mut self, general_size: u32, certified_size: u32, now: u64) -> Result<()> {
        if !self.state.active {
            return Ok(());
        }

        if now > self.state.last_assigned {
            let elapsed = now - self.state.last_assigned;
            let general_delta =
                per_member_delta(self.settings.general_annual_bootstrap, elapsed)?;
            let certified_extra =
                per_member_delta(self.settings.certified_annual_bootstrap, elapsed)?;
            self.state.general_bootstrap_per_member = add128(
                self.state.general_bootstrap_per_member,
                general_delta,
                "bootstrap per member",
            )?;
            self.state.certified_bootstrap_per_member = add128(
                self.state.certified_bootstrap_per_member,
                add128(general_delta, certified_extra, "bootstrap per member")?,
                "bootstrap per member",
            )?;
            self.state.last_assigned = now;
        }

        let general_collected = {
            let wallet = self
                .general_fees_wallet
                .as_ref()
                .ok_or(CoreError::NotWired("general fees wallet"))?;
            let collected = wallet
                .write()
                .collect_fees(&self.contract_address, now)
                .map_err(CoreError::Collaborator)?;
            to_internal(collected).map_err(RewardsError::Core)?
        };
        let certified_collected = {
            let wallet = self
                .certified_fees_wallet
                .as_ref()
                .ok_or(CoreError::NotWired("certified fees wallet"))?;
            let collected = wallet
                .write()
                .collect_fees(&self.contract_address, now)
                .map_err(CoreError::Collaborator)?;
            to_internal(collected).map_err(RewardsError::Core)?
        };
        self.state.general_fees_residue = add64(
            self.state.general_fees_residue,
            general_collected,
            "fees residue",
        )?;
        self.state.certified_fees_residue = add64(
            self.state.certified_fees_residue,
            certified_collected,
            "fees residue",
        )?;

        let mut general_delta: u128 = 0;
        if general_size > 0 && self.state.general_fees_residue > 0 {
            general_delta = mul128(
                self.state.general_fees_residue as u128,
                TOKEN_BASE,
                "fees per member",
            )? / general_size as u128;
            self.state.general_fees_per_member = add128(
                self.state.general_fees_per_member,
                general_delta,
                "fees per member",
            )?;
            self.state.general_fees_residue = 0;
        }
        let mut certified_delta: u128 = general_delta;
        if certified_size > 0 && self.state.certified_fees_residue > 0 {
            let extra = mul128(
                self.state.certified_fees_residue as u128,
                TOKEN_BASE,
                "fees per member",
            )? / certified_size as u128;
            certified_delta = add128(certified_delta, extra, "fees per member")?;
            self.state.certified_fees_residue = 0;
        }
        if certified_delta > 0 {
            self.state.certified_fees_per_member = add128(
                self.state.certified_fees_per_member,
                certified_delta,
                "fees per member",
            )?;
        }

        if general_collected > 0 || certified_collected > 0 {
            debug!(
                "fees recognized: {} general, {} certified internal units",
                general_collected, certified_collected
            );
        }
        Ok(())
    }

    fn advance_with_current_stats(&mut self, now: u64) -> Result<()> {
        let stats = self.committee()?.read().get_committee_stats();
        self.advance_totals(stats.general_size, stats.certified_size, now)
    }

    /// Credit a guardian for the track deltas since its last snapshots,
    /// then re-anchor the snapshots on the track matching its next
    /// certification. Fee deltas land on the fee balance and bootstrap
    /// deltas on the bootstrap balance.
    fn settle_guardian(
        &mut self,
        guardian: &str,
        in_committee: bool,
        certified: bool,
        next_certified: bool,
    ) -> Result<()> {
        let fees_track = if certified {
            self.state.certified_fees_per_member
        } else {
            self.state.general_fees_per_member
        };
        let bootstrap_track = if certified {
            self.state.certified_bootstrap_per_member
        } else {
            self.state.general_bootstrap_per_member
        };
        let next_fees_track = if next_certified {
            self.state.certified_fees_per_member
        } else {
            self.state.general_fees_per_member
        };
        let next_bootstrap_track = if next_certified {
            self.state.certified_bootstrap_per_member
        } else {
            self.state.general_bootstrap_per_member
        };

        let mut assigned: Option<(u64, u64)> = None;
        {
            let rec = self.guardians.entry(guardian.to_string()).or_default();
            if in_committee {
                let mut fee_credit: u64 = 0;
                let mut bootstrap_credit: u64 = 0;
                if fees_track > rec.last_fees_per_member {
                    fee_credit = scaled_credit(fees_track - rec.last_fees_per_member)?;
                    rec.fee_balance = add64(rec.fee_balance, fee_credit, "fee balance")?;
                }
                if bootstrap_track > rec.last_bootstrap_per_member {
                    bootstrap_credit =
                        scaled_credit(bootstrap_track - rec.last_bootstrap_per_member)?;
                    rec.bootstrap_balance =
                        add64(rec.bootstrap_balance, bootstrap_credit, "bootstrap balance")?;
                }
                if fee_credit > 0 || bootstrap_credit > 0 {
                    assigned = Some((fee_credit, bootstrap_credit));
                }
            }
            rec.last_fees_per_member = next_fees_track;
            rec.last_bootstrap_per_member = next_bootstrap_track;
            rec.certified = next_certified;
        }
        if let Some((fee_credit, bootstrap_credit)) = assigned {
            self.events.push(FeesBootstrapEvent::FeesAndBootstrapAssigned {
                guardian: guardian.to_string(),
                fee_amount: to_external(fee_credit),
                bootstrap_amount: to_external(bootstrap_credit),
            });
        }
        Ok(())
    }

    /// Full settlement of one guardian using the committee's current view.
    fn settle_member(&mut self, guardian: &str, now: u64) -> Result<()> {
        let (stats, info) = {
            let committee = self.committee()?.read();
            (
                committee.get_committee_stats(),
                committee.get_member_info(guardian),
            )
        };
        self.advance_totals(stats.general_size, stats.certified_size, now)?;
        let certified = self.guardian_fees_and_bootstrap(guardian).certified;
        self.settle_guardian(guardian, info.in_committee, certified, info.certified)
    }

    /// Hypothetical track values at `now` without mutating state, including
    /// the outstanding (un-pulled) wallet fees.
    fn projected_tracks(
        &self,
        certified: bool,
        general_size: u32,
        certified_size: u32,
        now: u64,
    ) -> Result<(u128, u128)> {
        let mut fees_track = if certified {
            self.state.certified_fees_per_member
        } else {
            self.state.general_fees_per_member
        };
        let mut bootstrap_track = if certified {
            self.state.certified_bootstrap_per_member
        } else {
            self.state.general_bootstrap_per_member
        };
        if !self.state.active {
            return Ok((fees_track, bootstrap_track));
        }

        if now > self.state.last_assigned {
            let elapsed = now - self.state.last_assigned;
            let general_delta =
                per_member_delta(self.settings.general_annual_bootstrap, elapsed)?;
            bootstrap_track = add128(bootstrap_track, general_delta, "bootstrap per member")?;
            if certified {
                bootstrap_track = add128(
                    bootstrap_track,
                    per_member_delta(self.settings.certified_annual_bootstrap, elapsed)?,
                    "bootstrap per member",
                )?;
            }
        }

        let general_pending = {
            let wallet = self
                .general_fees_wallet
                .as_ref()
                .ok_or(CoreError::NotWired("general fees wallet"))?;
            let outstanding = wallet
                .read()
                .outstanding_fees(now, now)
                .map_err(CoreError::Collaborator)?;
            to_internal(outstanding).map_err(RewardsError::Core)?
        };
        let general_available =
            add64(self.state.general_fees_residue, general_pending, "fees residue")?;
        if general_size > 0 && general_available > 0 {
            fees_track = add128(
                fees_track,
                mul128(general_available as u128, TOKEN_BASE, "fees per member")?
                    / general_size as u128,
                "fees per member",
            )?;
        }
        if certified {
            let certified_pending = {
                let wallet = self
                    .certified_fees_wallet
                    .as_ref()
                    .ok_or(CoreError::NotWired("certified fees wallet"))?;
                let outstanding = wallet
                    .read()
                    .outstanding_fees(now, now)
                    .map_err(CoreError::Collaborator)?;
                to_internal(outstanding).map_err(RewardsError::Core)?
            };
            let certified_available = add64(
                self.state.certified_fees_residue,
                certified_pending,
                "fees residue",
            )?;
            if certified_size > 0 && certified_available > 0 {
                fees_track = add128(
                    fees_track,
                    mul128(certified_available as u128, TOKEN_BASE, "fees per member")?
                        / certified_size as u128,
                    "fees per member",
                )?;
            }
        }
        Ok((fees_track, bootstrap_track))
    }

    // ---- handle accessors ----

    fn committee(&self) -> Result<&Shared<dyn Committee>> {
        Ok(self
            .committee
            .as_ref()
            .ok_or(CoreError::NotWired("committee"))?)
    }

    fn fee_token(&self) -> Result<&Shared<dyn Token>> {
        Ok(self
            .fee_token
            .as_ref()
            .ok_or(CoreError::NotWired("fee token"))?)
    }

    fn bootstrap_token(&self) -> Result<&Shared<dyn Token>> {
        Ok(self
            .bootstrap_token
            .as_ref()
            .ok_or(CoreError::NotWired("bootstrap token"))?)
    }
}
