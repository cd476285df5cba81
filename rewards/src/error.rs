//! Reward ledger error types

use meridian_core::error::CoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewardsError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("reward distribution is active")]
    DistributionActive,

    #[error("reward distribution is not active")]
    DistributionInactive,

    #[error("cannot migrate to the currently-registered contract")]
    SelfMigration,

    #[error("zero amount")]
    ZeroAmount,

    #[error("batch length mismatch: {0} vs {1}")]
    LengthMismatch(usize, usize),

    #[error("amounts sum to {actual}, expected {expected}")]
    TotalMismatch { expected: u128, actual: u128 },

    #[error("amount {0} is not aligned to the accounting granularity")]
    AmountNotGranular(u128),

    #[error("no guardian registered for caller {0}")]
    GuardianNotRegistered(String),

    #[error("delegators share {0} exceeds the allowed maximum")]
    InvalidSplit(u64),

    #[error("delegator amounts {actual} exceed the allowed share {allowed}")]
    DelegatorsShareExceeded { allowed: u128, actual: u128 },

    #[error("insufficient rewards balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u128, available: u128 },

    #[error("distribution batch rejected: {0}")]
    BatchSequence(String),
}

pub type Result<T> = std::result::Result<T, RewardsError>;
