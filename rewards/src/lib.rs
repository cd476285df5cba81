//! Meridian Reward Ledger
//!
//! Two structurally parallel sub-ledgers driven by committee membership,
//! certification, stake-change and delegation-change notifications:
//! - Staking rewards: a per-unit-of-weight accumulator with an annual cap,
//!   split between guardians and their delegators.
//! - Fees and bootstrap rewards: per-member accumulators over the general
//!   and certified committees, fed by the fee bucket pools and by annual
//!   bootstrap allowances.
//!
//! Accrual is pull-based: the global accumulators only advance when an
//! operation touches them. Every membership or weight transition must
//! settle the affected members before the new state applies.

pub mod accumulator;
pub mod distribution;
pub mod error;
pub mod events;
pub mod fees_bootstrap;
pub mod staking;

pub use distribution::DistributionBatch;
pub use error::{Result, RewardsError};
pub use events::{FeesBootstrapEvent, StakingRewardsEvent};
pub use fees_bootstrap::{
    FeesAndBootstrap, FeesAndBootstrapDeps, FeesAndBootstrapLedger, FeesAndBootstrapState,
    FeesAndBootstrapSettings, RewardToken,
};
pub use staking::{
    DelegatorStakingRewards, GuardianStakingRewards, StakingRewardsDeps, StakingRewardsLedger,
    StakingRewardsSettings, StakingRewardsState,
};
