//! In-memory collaborators for tests and local tooling
//!
//! Reference implementations of the collaborator interfaces, used by the
//! ledger crates' test suites to wire a full economy without a chain.

use std::collections::HashMap;

use crate::interfaces::{
    Address, Committee, CommitteeStats, DelegationChangeListener, GuardianRegistry, MemberInfo,
    StakeBalances, Token,
};

/// Mintable fungible token with allowance tracking.
#[derive(Debug, Clone, Default)]
pub struct InMemoryToken {
    balances: HashMap<Address, u128>,
    allowances: HashMap<(Address, Address), u128>,
}

impl InMemoryToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, addr: &str, amount: u128) {
        *self.balances.entry(addr.to_string()).or_default() += amount;
    }

    pub fn allowance(&self, owner: &str, spender: &str) -> u128 {
        self.allowances
            .get(&(owner.to_string(), spender.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn move_balance(&mut self, from: &str, to: &str, amount: u128) -> Result<(), String> {
        let from_balance = self.balances.get(from).copied().unwrap_or(0);
        if from_balance < amount {
            return Err(format!(
                "insufficient balance: {} has {}, needs {}",
                from, from_balance, amount
            ));
        }
        self.balances.insert(from.to_string(), from_balance - amount);
        *self.balances.entry(to.to_string()).or_default() += amount;
        Ok(())
    }
}

impl Token for InMemoryToken {
    fn transfer(&mut self, from: &str, to: &str, amount: u128) -> Result<(), String> {
        self.move_balance(from, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: &str,
        owner: &str,
        to: &str,
        amount: u128,
    ) -> Result<(), String> {
        let key = (owner.to_string(), spender.to_string());
        let allowed = self.allowances.get(&key).copied().unwrap_or(0);
        if allowed < amount {
            return Err(format!(
                "insufficient allowance: {} allowed {} to spend {}, needs {}",
                owner, spender, allowed, amount
            ));
        }
        self.move_balance(owner, to, amount)?;
        self.allowances.insert(key, allowed - amount);
        Ok(())
    }

    fn approve(&mut self, owner: &str, spender: &str, amount: u128) -> Result<(), String> {
        self.allowances
            .insert((owner.to_string(), spender.to_string()), amount);
        Ok(())
    }

    fn balance_of(&self, addr: &str) -> u128 {
        self.balances.get(addr).copied().unwrap_or(0)
    }
}

/// Committee with settable stats and membership, recording weight-change
/// notifications from the delegation ledger.
#[derive(Debug, Clone, Default)]
pub struct FixedCommittee {
    stats: CommitteeStats,
    members: HashMap<Address, MemberInfo>,
    pub weight_changes: Vec<(Address, u64, u64)>,
}

impl FixedCommittee {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stats(&mut self, general_size: u32, certified_size: u32, total_weight: u64) {
        self.stats = CommitteeStats {
            general_size,
            certified_size,
            total_weight,
        };
    }

    pub fn set_member(&mut self, addr: &str, in_committee: bool, weight: u64, certified: bool) {
        self.members.insert(
            addr.to_string(),
            MemberInfo {
                in_committee,
                weight,
                certified,
            },
        );
    }
}

impl Committee for FixedCommittee {
    fn get_committee_stats(&self) -> CommitteeStats {
        self.stats
    }

    fn get_member_info(&self, addr: &str) -> MemberInfo {
        self.members.get(addr).copied().unwrap_or_default()
    }

    fn member_weight_change(&mut self, addr: &str, effective_stake: u64, total_delegated: u64) {
        self.weight_changes
            .push((addr.to_string(), effective_stake, total_delegated));
    }
}

/// Staking contract with settable balances. Reward distributions are
/// credited immediately; the matching stake-change notifications are queued
/// in `pending_stake_changes` for the embedding test to deliver as the
/// follow-up transaction.
#[derive(Debug, Clone, Default)]
pub struct RecordingStaking {
    balances: HashMap<Address, u128>,
    pub distributions: Vec<(u128, Vec<Address>, Vec<u128>)>,
    pub pending_stake_changes: Vec<(Address, u128)>,
}

impl RecordingStaking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stake_balance(&mut self, addr: &str, amount: u128) {
        self.balances.insert(addr.to_string(), amount);
    }
}

impl StakeBalances for RecordingStaking {
    fn get_stake_balance_of(&self, addr: &str) -> u128 {
        self.balances.get(addr).copied().unwrap_or(0)
    }

    fn distribute_rewards(
        &mut self,
        total: u128,
        recipients: &[Address],
        amounts: &[u128],
    ) -> Result<(), String> {
        if recipients.len() != amounts.len() {
            return Err("recipients/amounts length mismatch".to_string());
        }
        if amounts.iter().sum::<u128>() != total {
            return Err("amounts do not sum to total".to_string());
        }
        for (recipient, amount) in recipients.iter().zip(amounts) {
            let balance = self.balances.entry(recipient.clone()).or_default();
            *balance += amount;
            self.pending_stake_changes.push((recipient.clone(), *balance));
        }
        self.distributions
            .push((total, recipients.to_vec(), amounts.to_vec()));
        Ok(())
    }
}

/// Guardian registry resolving every caller to itself unless overridden.
#[derive(Debug, Clone, Default)]
pub struct StaticGuardianRegistry {
    overrides: HashMap<Address, Address>,
}

impl StaticGuardianRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_guardian(&mut self, caller: &str, guardian: &str) {
        self.overrides
            .insert(caller.to_string(), guardian.to_string());
    }
}

impl GuardianRegistry for StaticGuardianRegistry {
    fn resolve_guardian_address(&self, caller: &str) -> Option<Address> {
        Some(
            self.overrides
                .get(caller)
                .cloned()
                .unwrap_or_else(|| caller.to_string()),
        )
    }
}

/// Delegation-change listener that records every notification.
#[derive(Debug, Clone, Default)]
pub struct RecordingDelegationListener {
    pub notifications: Vec<DelegationWillChange>,
}

/// One recorded `delegation_will_change` notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationWillChange {
    pub guardian: Address,
    pub delegated_stake: u64,
    pub delegator: Address,
    pub delegator_stake: u64,
    pub next_guardian: Address,
    pub next_guardian_delegated_stake: u64,
    pub now: u64,
}

impl RecordingDelegationListener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DelegationChangeListener for RecordingDelegationListener {
    fn delegation_will_change(
        &mut self,
        guardian: &str,
        delegated_stake: u64,
        delegator: &str,
        delegator_stake: u64,
        next_guardian: &str,
        next_guardian_delegated_stake: u64,
        now: u64,
    ) -> Result<(), String> {
        self.notifications.push(DelegationWillChange {
            guardian: guardian.to_string(),
            delegated_stake,
            delegator: delegator.to_string(),
            delegator_stake,
            next_guardian: next_guardian.to_string(),
            next_guardian_delegated_stake,
            now,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_transfer_and_allowance() {
        let mut token = InMemoryToken::new();
        token.mint("alice", 1000);

        token.transfer("alice", "bob", 400).unwrap();
        assert_eq!(token.balance_of("alice"), 600);
        assert_eq!(token.balance_of("bob"), 400);

        // Spending without allowance fails
        assert!(token.transfer_from("carol", "alice", "carol", 100).is_err());

        token.approve("alice", "carol", 250).unwrap();
        token.transfer_from("carol", "alice", "carol", 100).unwrap();
        assert_eq!(token.balance_of("carol"), 100);
        assert_eq!(token.allowance("alice", "carol"), 150);
    }

    #[test]
    fn test_token_rejects_overdraft() {
        let mut token = InMemoryToken::new();
        token.mint("alice", 10);
        assert!(token.transfer("alice", "bob", 11).is_err());
        assert_eq!(token.balance_of("alice"), 10);
    }

    #[test]
    fn test_staking_distribution_queues_notifications() {
        let mut staking = RecordingStaking::new();
        staking.set_stake_balance("g1", 500);

        staking
            .distribute_rewards(300, &["g1".to_string(), "d1".to_string()], &[200, 100])
            .unwrap();

        assert_eq!(staking.get_stake_balance_of("g1"), 700);
        assert_eq!(staking.get_stake_balance_of("d1"), 100);
        assert_eq!(
            staking.pending_stake_changes,
            vec![("g1".to_string(), 700), ("d1".to_string(), 100)]
        );
    }

    #[test]
    fn test_guardian_registry_defaults_to_identity() {
        let mut registry = StaticGuardianRegistry::new();
        assert_eq!(
            registry.resolve_guardian_address("g1"),
            Some("g1".to_string())
        );
        registry.set_guardian("agent", "g1");
        assert_eq!(
            registry.resolve_guardian_address("agent"),
            Some("g1".to_string())
        );
    }
}
