//! Reward ledger events
//!
//! Amounts in events are external token units.

use meridian_core::Address;
use serde::{Deserialize, Serialize};

use crate::fees_bootstrap::RewardToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakingRewardsEvent {
    GuardianStakingRewardsAssigned {
        guardian: Address,
        amount: u128,
        delegators_amount: u128,
    },
    DelegatorStakingRewardsAssigned {
        delegator: Address,
        guardian: Address,
        amount: u128,
    },
    StakingRewardsClaimed {
        addr: Address,
        guardian_amount: u128,
        delegator_amount: u128,
    },
    StakingRewardsDistributed {
        distributor: Address,
        from_block: u64,
        to_block: u64,
        split_pm: u64,
        tx_index: u64,
        to: Vec<Address>,
        amounts: Vec<u128>,
    },
    AnnualStakingRewardsRateChanged {
        rate_pm: u64,
        annual_cap: u128,
    },
    DefaultDelegatorsShareChanged {
        share_pm: u64,
    },
    MaxDelegatorsShareChanged {
        share_pm: u64,
    },
    GuardianDelegatorsShareChanged {
        guardian: Address,
        share_pm: u64,
    },
    RewardDistributionActivated {
        start_time: u64,
    },
    RewardDistributionDeactivated {
        at: u64,
    },
    StakingRewardsBalanceMigrated {
        addr: Address,
        guardian_amount: u128,
        delegator_amount: u128,
        to: Address,
    },
    StakingRewardsBalanceMigrationAccepted {
        from: Address,
        addr: Address,
        guardian_amount: u128,
        delegator_amount: u128,
    },
    EmergencyWithdrawal {
        caller: Address,
        amount: u128,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeesBootstrapEvent {
    FeesAndBootstrapAssigned {
        guardian: Address,
        fee_amount: u128,
        bootstrap_amount: u128,
    },
    FeesWithdrawn {
        guardian: Address,
        amount: u128,
    },
    BootstrapWithdrawn {
        guardian: Address,
        amount: u128,
    },
    GeneralCommitteeAnnualBootstrapChanged {
        annual_amount: u128,
    },
    CertifiedCommitteeAnnualBootstrapChanged {
        annual_amount: u128,
    },
    RewardDistributionActivated {
        start_time: u64,
    },
    RewardDistributionDeactivated {
        at: u64,
    },
    FeesAndBootstrapBalanceMigrated {
        addr: Address,
        fee_amount: u128,
        bootstrap_amount: u128,
        to: Address,
    },
    FeesAndBootstrapBalanceMigrationAccepted {
        from: Address,
        addr: Address,
        fee_amount: u128,
        bootstrap_amount: u128,
    },
    EmergencyWithdrawal {
        caller: Address,
        token: RewardToken,
        amount: u128,
    },
}
