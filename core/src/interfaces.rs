//! Collaborator contract interfaces
//!
//! The ledgers only ever see these traits; the embedding node decides what
//! stands behind them (live contracts or the in-memory `testkit`). Weights
//! and stakes crossing these seams are internal milli-token units; token
//! amounts are external 18-decimal units.
//!
//! Collaborators report failures as strings; ledger code maps them to
//! `CoreError::Collaborator` and aborts the surrounding transaction.

use serde::{Deserialize, Serialize};

/// Account address. The empty string is the zero address.
pub type Address = String;

/// Reserved dummy delegate target. Stake delegated to it is parked outside
/// governance; the address itself never counts as self-delegating.
pub const VOID_ADDRESS: &str = "void";

/// Size and weight of the current committee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeStats {
    pub general_size: u32,
    pub certified_size: u32,
    /// Sum of member weights, internal units.
    pub total_weight: u64,
}

/// Committee view of a single member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub in_committee: bool,
    /// Internal units.
    pub weight: u64,
    pub certified: bool,
}

/// The committee/elections contract.
pub trait Committee: Send + Sync {
    fn get_committee_stats(&self) -> CommitteeStats;

    fn get_member_info(&self, addr: &str) -> MemberInfo;

    /// Notification that a delegate's effective stake or the network total
    /// changed, consumed for candidate ranking.
    fn member_weight_change(&mut self, addr: &str, effective_stake: u64, total_delegated: u64);
}

/// The staking contract: external stake balances and reward re-staking.
pub trait StakeBalances: Send + Sync {
    /// External units.
    fn get_stake_balance_of(&self, addr: &str) -> u128;

    /// Stake `amounts[i]` on behalf of `recipients[i]`. The staking contract
    /// issues its own stake-change notifications to the delegation ledger in
    /// a follow-up transaction.
    fn distribute_rewards(
        &mut self,
        total: u128,
        recipients: &[Address],
        amounts: &[u128],
    ) -> Result<(), String>;
}

/// The guardian registry: maps agent/orbs addresses back to guardians.
pub trait GuardianRegistry: Send + Sync {
    fn resolve_guardian_address(&self, caller: &str) -> Option<Address>;
}

/// Standard fungible token surface.
///
/// `transfer_from` moves `amount` from `owner` to `to`, spending the
/// allowance `owner` granted to `spender`.
pub trait Token: Send + Sync {
    fn transfer(&mut self, from: &str, to: &str, amount: u128) -> Result<(), String>;

    fn transfer_from(
        &mut self,
        spender: &str,
        owner: &str,
        to: &str,
        amount: u128,
    ) -> Result<(), String>;

    fn approve(&mut self, owner: &str, spender: &str, amount: u128) -> Result<(), String>;

    fn balance_of(&self, addr: &str) -> u128;
}

/// Read surface of the delegation ledger consumed by the reward ledger.
pub trait DelegationsView: Send + Sync {
    /// The owner's delegate, resolving implicit self-delegation.
    fn effective_delegate_of(&self, addr: &str) -> Address;

    /// The owner's own stake, internal units.
    fn own_stake_of(&self, addr: &str) -> u64;

    /// Total stake delegated to `addr` (its own included when
    /// self-delegating), internal units.
    fn uncapped_stake_of(&self, addr: &str) -> u64;
}

/// Reward-ledger notification fired by the delegation ledger *before* a
/// delegation edge or stake value changes, so accrued rewards settle under
/// pre-change weights. All stakes are the pre-change values, internal units.
pub trait DelegationChangeListener: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn delegation_will_change(
        &mut self,
        guardian: &str,
        delegated_stake: u64,
        delegator: &str,
        delegator_stake: u64,
        next_guardian: &str,
        next_guardian_delegated_stake: u64,
        now: u64,
    ) -> Result<(), String>;
}

/// Fee bucket pool surface consumed by the reward ledger.
pub trait FeeBucketSource: Send + Sync {
    /// Collect the time-elapsed portion of the buckets; tokens are
    /// transferred to `caller`. Returns the collected external amount.
    fn collect_fees(&mut self, caller: &str, now: u64) -> Result<u128, String>;

    /// Read-only projection of what a collection at `as_of` would yield.
    fn outstanding_fees(&self, as_of: u64, now: u64) -> Result<u128, String>;
}
