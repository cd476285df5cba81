//! Delegation ledger state and operations

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use meridian_core::error::CoreError;
use meridian_core::interfaces::{
    Address, Committee, DelegationChangeListener, DelegationsView, StakeBalances, VOID_ADDRESS,
};
use meridian_core::registry::Shared;
use meridian_core::units::{add64, sub64, to_external, to_internal};
use meridian_core::AccessControl;

use crate::error::{DelegationsError, Result};
use crate::events::DelegationEvent;

/// Per-owner delegation record. An owner with no explicit delegate is
/// implicitly self-delegating. Stake is internal units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeOwnerRecord {
    pub delegate: Option<Address>,
    pub own_stake: u64,
}

impl StakeOwnerRecord {
    fn is_untouched(&self) -> bool {
        self.delegate.is_none() && self.own_stake == 0
    }
}

/// Collaborator handles, swapped atomically on registry changes.
pub struct DelegationsDeps {
    pub committee: Shared<dyn Committee>,
    pub rewards: Shared<dyn DelegationChangeListener>,
    pub stake_balances: Shared<dyn StakeBalances>,
}

/// The delegation ledger.
///
/// Invariants, maintained incrementally on every mutation:
/// - `total_delegated_stake` equals the sum of `own_stake` over all
///   self-delegating owners (the void delegation excluded).
/// - `uncapped_stake[d]` equals the sum of `own_stake` over all owners
///   currently delegating to `d`.
pub struct DelegationsLedger {
    contract_address: Address,
    access: AccessControl,
    /// Single authorized caller of stake-change notifications.
    staking_handler: Address,
    stake_owners: HashMap<Address, StakeOwnerRecord>,
    uncapped_stake: HashMap<Address, u64>,
    total_delegated_stake: u64,
    import_finalized: bool,
    committee: Option<Shared<dyn Committee>>,
    rewards: Option<Shared<dyn DelegationChangeListener>>,
    stake_balances: Option<Shared<dyn StakeBalances>>,
    events: Vec<DelegationEvent>,
}

impl DelegationsLedger {
    pub fn new(contract_address: &str, access: AccessControl, staking_handler: &str) -> Self {
        let mut stake_owners = HashMap::new();
        // The void delegation is pre-initialized and can never be re-pointed;
        // stake delegated to it is parked outside governance.
        stake_owners.insert(
            VOID_ADDRESS.to_string(),
            StakeOwnerRecord {
                delegate: Some(VOID_ADDRESS.to_string()),
                own_stake: 0,
            },
        );
        Self {
            contract_address: contract_address.to_string(),
            access,
            staking_handler: staking_handler.to_string(),
            stake_owners,
            uncapped_stake: HashMap::new(),
            total_delegated_stake: 0,
            import_finalized: false,
            committee: None,
            rewards: None,
            stake_balances: None,
            events: Vec::new(),
        }
    }

    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    /// Swap the collaborator handles (registry change).
    pub fn rewire(&mut self, deps: DelegationsDeps) {
        self.committee = Some(deps.committee);
        self.rewards = Some(deps.rewards);
        self.stake_balances = Some(deps.stake_balances);
    }

    /// Update the address authorized to report stake changes.
    pub fn set_staking_handler(&mut self, caller: &str, handler: &str) -> Result<()> {
        self.access.only_admin(caller)?;
        self.staking_handler = handler.to_string();
        Ok(())
    }

    // ---- queries ----

    /// The owner's current delegate, resolving implicit self-delegation.
    pub fn get_delegation(&self, addr: &str) -> Address {
        match self.stake_owners.get(addr).and_then(|r| r.delegate.clone()) {
            Some(delegate) => delegate,
            None => addr.to_string(),
        }
    }

    /// Delegate and own stake (external units) of an owner.
    pub fn get_delegation_info(&self, addr: &str) -> (Address, u128) {
        (self.get_delegation(addr), to_external(self.own_stake(addr)))
    }

    /// Stake delegated to `addr`, external units; zero unless self-delegating.
    pub fn get_delegated_stake(&self, addr: &str) -> u128 {
        to_external(self.governance_stake(addr))
    }

    /// Network-wide total of self-delegated stake, external units.
    pub fn get_total_delegated_stake(&self) -> u128 {
        to_external(self.total_delegated_stake)
    }

    pub fn import_is_finalized(&self) -> bool {
        self.import_finalized
    }

    pub fn events(&self) -> &[DelegationEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<DelegationEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- mutations ----

    /// Reassign `from`'s delegation to `to`.
    ///
    /// Settles the reward ledger for both the previous and the new delegate
    /// with pre-change weights before any aggregate moves.
    pub fn delegate(&mut self, from: &str, to: &str, now: u64) -> Result<()> {
        if to.is_empty() || from.is_empty() {
            return Err(DelegationsError::ZeroAddress);
        }
        if from == VOID_ADDRESS {
            return Err(DelegationsError::VoidDelegation);
        }

        let prev = self.get_delegation(from);
        let own_stake = self.own_stake(from);

        self.notify_delegation_will_change(
            &prev,
            self.uncapped(&prev),
            from,
            own_stake,
            to,
            self.uncapped(to),
            now,
        )?;

        if prev == to {
            // Re-affirmation: no stake moves, no aggregate changes.
            self.stake_owners
                .entry(from.to_string())
                .or_default()
                .delegate = Some(to.to_string());
            self.events.push(DelegationEvent::Delegated {
                from: from.to_string(),
                to: to.to_string(),
            });
            return Ok(());
        }

        // Governance stakes under the pre-change delegation state.
        let prev_gov_before = self.governance_stake(&prev);
        let to_gov_before = self.governance_stake(to);

        self.stake_owners
            .entry(from.to_string())
            .or_default()
            .delegate = Some(to.to_string());

        let prev_uncapped = sub64(self.uncapped(&prev), own_stake, "delegated stake")?;
        self.uncapped_stake.insert(prev.clone(), prev_uncapped);
        let to_uncapped = add64(self.uncapped(to), own_stake, "delegated stake")?;
        self.uncapped_stake.insert(to.to_string(), to_uncapped);

        let prev_gov_after = self.governance_stake(&prev);
        let to_gov_after = self.governance_stake(to);

        let total = sub64(
            self.total_delegated_stake,
            prev_gov_before,
            "total delegated stake",
        )?;
        let total = sub64(total, to_gov_before, "total delegated stake")?;
        let total = add64(total, prev_gov_after, "total delegated stake")?;
        let total = add64(total, to_gov_after, "total delegated stake")?;
        self.total_delegated_stake = total;

        self.notify_committee(&prev)?;
        self.notify_committee(to)?;

        debug!(
            "delegation changed: {} -> {} (was {}), moved {} internal units, total {}",
            from, to, prev, own_stake, self.total_delegated_stake
        );

        self.events.push(DelegationEvent::Delegated {
            from: from.to_string(),
            to: to.to_string(),
        });
        if own_stake > 0 {
            self.push_stake_changed_event(&prev, from, 0);
            self.push_stake_changed_event(to, from, own_stake);
        }
        Ok(())
    }

    /// Stake-change notification from the staking contract: `owner`'s stake
    /// is now `new_stake` external units.
    pub fn stake_change(
        &mut self,
        caller: &str,
        owner: &str,
        new_stake: u128,
        now: u64,
    ) -> Result<()> {
        AccessControl::only_designated(caller, &self.staking_handler, "staking contract")
            .map_err(DelegationsError::Core)?;
        self.apply_stake_change(owner, new_stake, now)
    }

    /// Batched stake-change notifications, processed owner by owner.
    pub fn stake_change_batch(
        &mut self,
        caller: &str,
        updates: &[(Address, u128)],
        now: u64,
    ) -> Result<()> {
        AccessControl::only_designated(caller, &self.staking_handler, "staking contract")
            .map_err(DelegationsError::Core)?;
        // Reject width overflows up front so the batch fails before any
        // owner has been applied.
        for (_, new_stake) in updates {
            to_internal(*new_stake).map_err(DelegationsError::Core)?;
        }
        for (owner, new_stake) in updates {
            self.apply_stake_change(owner, *new_stake, now)?;
        }
        Ok(())
    }

    fn apply_stake_change(&mut self, owner: &str, new_stake: u128, now: u64) -> Result<()> {
        if owner == VOID_ADDRESS {
            return Err(DelegationsError::VoidDelegation);
        }
        let new_internal = to_internal(new_stake).map_err(DelegationsError::Core)?;
        let prev_internal = self.own_stake(owner);
        if new_internal == prev_internal {
            return Ok(());
        }

        let delegate = self.get_delegation(owner);
        let uncapped_before = self.uncapped(&delegate);

        self.notify_delegation_will_change(
            &delegate,
            uncapped_before,
            owner,
            prev_internal,
            &delegate,
            uncapped_before,
            now,
        )?;

        let self_delegating = self.is_self_delegating(&delegate);
        if new_internal > prev_internal {
            let delta = new_internal - prev_internal;
            let uncapped = add64(uncapped_before, delta, "delegated stake")?;
            self.uncapped_stake.insert(delegate.clone(), uncapped);
            if self_delegating {
                self.total_delegated_stake =
                    add64(self.total_delegated_stake, delta, "total delegated stake")?;
            }
        } else {
            let delta = prev_internal - new_internal;
            let uncapped = sub64(uncapped_before, delta, "delegated stake")?;
            self.uncapped_stake.insert(delegate.clone(), uncapped);
            if self_delegating {
                self.total_delegated_stake =
                    sub64(self.total_delegated_stake, delta, "total delegated stake")?;
            }
        }
        self.stake_owners
            .entry(owner.to_string())
            .or_default()
            .own_stake = new_internal;

        self.notify_committee(&delegate)?;

        debug!(
            "stake changed: {} {} -> {} internal units (delegate {}, total {})",
            owner, prev_internal, new_internal, delegate, self.total_delegated_stake
        );

        self.push_stake_changed_event(&delegate, owner, new_internal);
        Ok(())
    }

    /// One-time bulk migration of delegations from a predecessor system.
    ///
    /// Every `from` address must be untouched; the network total is updated
    /// once for the whole batch.
    pub fn import_delegations(
        &mut self,
        caller: &str,
        from: &[Address],
        to: &str,
        notify: bool,
        _now: u64,
    ) -> Result<()> {
        self.access.only_admin(caller)?;
        if self.import_finalized {
            return Err(DelegationsError::ImportFinalized);
        }
        if to.is_empty() {
            return Err(DelegationsError::ZeroAddress);
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut imported: Vec<(Address, u64)> = Vec::with_capacity(from.len());
        {
            let stake_balances = self
                .stake_balances
                .as_ref()
                .ok_or(CoreError::NotWired("staking"))?;
            let stake_balances = stake_balances.read();
            for owner in from {
                if owner.is_empty() {
                    return Err(DelegationsError::ZeroAddress);
                }
                if owner == VOID_ADDRESS {
                    return Err(DelegationsError::VoidDelegation);
                }
                if !seen.insert(owner.as_str())
                    || !self
                        .stake_owners
                        .get(owner)
                        .map(StakeOwnerRecord::is_untouched)
                        .unwrap_or(true)
                {
                    return Err(DelegationsError::AlreadyInitialized(owner.clone()));
                }
                let stake = to_internal(stake_balances.get_stake_balance_of(owner))
                    .map_err(DelegationsError::Core)?;
                imported.push((owner.clone(), stake));
            }
        }

        let to_gov_before = self.governance_stake(to);
        let mut batch_stake: u64 = 0;
        for (_, stake) in &imported {
            batch_stake = add64(batch_stake, *stake, "imported stake")?;
        }
        let to_uncapped = add64(self.uncapped(to), batch_stake, "delegated stake")?;

        for (owner, stake) in &imported {
            self.stake_owners.insert(
                owner.clone(),
                StakeOwnerRecord {
                    delegate: Some(to.to_string()),
                    own_stake: *stake,
                },
            );
            self.events.push(DelegationEvent::Delegated {
                from: owner.clone(),
                to: to.to_string(),
            });
        }
        self.uncapped_stake.insert(to.to_string(), to_uncapped);

        let to_gov_after = self.governance_stake(to);
        let total = sub64(
            self.total_delegated_stake,
            to_gov_before,
            "total delegated stake",
        )?;
        self.total_delegated_stake = add64(total, to_gov_after, "total delegated stake")?;

        debug!(
            "imported {} delegations to {} ({} internal units)",
            imported.len(),
            to,
            batch_stake
        );

        self.events.push(DelegationEvent::DelegationsImported {
            from: from.to_vec(),
            to: to.to_string(),
        });
        if notify {
            self.notify_committee(to)?;
        }
        Ok(())
    }

    /// One-way latch: permanently close the import path.
    pub fn finalize_delegation_import(&mut self, caller: &str) -> Result<()> {
        self.access.only_admin(caller)?;
        if self.import_finalized {
            return Ok(());
        }
        self.import_finalized = true;
        self.events.push(DelegationEvent::DelegationImportFinalized);
        Ok(())
    }

    // ---- internals ----

    fn own_stake(&self, addr: &str) -> u64 {
        self.stake_owners.get(addr).map(|r| r.own_stake).unwrap_or(0)
    }

    fn uncapped(&self, addr: &str) -> u64 {
        self.uncapped_stake.get(addr).copied().unwrap_or(0)
    }

    fn is_self_delegating(&self, addr: &str) -> bool {
        addr != VOID_ADDRESS && self.get_delegation(addr) == addr
    }

    fn governance_stake(&self, addr: &str) -> u64 {
        if self.is_self_delegating(addr) {
            self.uncapped(addr)
        } else {
            0
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn notify_delegation_will_change(
        &self,
        guardian: &str,
        delegated_stake: u64,
        delegator: &str,
        delegator_stake: u64,
        next_guardian: &str,
        next_guardian_delegated_stake: u64,
        now: u64,
    ) -> Result<()> {
        let rewards = self
            .rewards
            .as_ref()
            .ok_or(CoreError::NotWired("staking rewards"))?;
        rewards
            .write()
            .delegation_will_change(
                guardian,
                delegated_stake,
                delegator,
                delegator_stake,
                next_guardian,
                next_guardian_delegated_stake,
                now,
            )
            .map_err(CoreError::Collaborator)?;
        Ok(())
    }

    fn notify_committee(&self, delegate: &str) -> Result<()> {
        let committee = self
            .committee
            .as_ref()
            .ok_or(CoreError::NotWired("committee"))?;
        committee.write().member_weight_change(
            delegate,
            self.governance_stake(delegate),
            self.total_delegated_stake,
        );
        Ok(())
    }

    fn push_stake_changed_event(&mut self, delegate: &str, owner: &str, owner_stake: u64) {
        let self_stake = if self.is_self_delegating(delegate) {
            self.own_stake(delegate)
        } else {
            0
        };
        self.events.push(DelegationEvent::DelegatedStakeChanged {
            delegate: delegate.to_string(),
            self_stake: to_external(self_stake),
            delegated_stake: to_external(self.uncapped(delegate)),
            delegators: vec![owner.to_string()],
            delegator_stakes: vec![to_external(owner_stake)],
        });
    }
}

impl DelegationsView for DelegationsLedger {
    fn effective_delegate_of(&self, addr: &str) -> Address {
        self.get_delegation(addr)
    }

    fn own_stake_of(&self, addr: &str) -> u64 {
        self.own_stake(addr)
    }

    fn uncapped_stake_of(&self, addr: &str) -> u64 {
        self.uncapped(addr)
    }
}
