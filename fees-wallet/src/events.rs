//! Fee bucket pool events
//!
//! Amounts are external token units.

use meridian_core::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeesWalletEvent {
    FeesAdded {
        bucket_start: u64,
        added: u128,
        total: u128,
    },
    FeesWithdrawnFromBucket {
        bucket_start: u64,
        withdrawn: u128,
        remaining: u128,
    },
    BucketMigrated {
        bucket_start: u64,
        amount: u128,
        to: Address,
    },
    BucketMigrationAccepted {
        from: Address,
        bucket_start: u64,
        amount: u128,
    },
    EmergencyWithdrawal {
        caller: Address,
        amount: u128,
    },
}
