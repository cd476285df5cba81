//! Fee bucket pool error types

use meridian_core::error::CoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeesWalletError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("zero amount")]
    ZeroAmount,

    #[error("bucket at {bucket_start} is earlier than the current bucket at {current_bucket}")]
    BackdatedBucket {
        bucket_start: u64,
        current_bucket: u64,
    },

    #[error("timestamp {0} is not aligned to a bucket boundary")]
    MisalignedBucket(u64),

    #[error("bucket at {0} is empty")]
    EmptyBucket(u64),

    #[error("projection time {as_of} is before the current time {now}")]
    InvalidAsOf { as_of: u64, now: u64 },

    #[error("cannot migrate to the currently-registered contract")]
    SelfMigration,
}

pub type Result<T> = std::result::Result<T, FeesWalletError>;
