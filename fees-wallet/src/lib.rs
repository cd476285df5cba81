//! Meridian Fee Bucket Pool
//!
//! A time-bucketed prepaid-fee ledger. Lump deposits are amortized into
//! fixed-width time buckets; the time-elapsed portion is released on demand
//! to the reward ledger. Within a bucket, each collection recognizes the
//! linear share of what is left, so an uncollected bucket's balance
//! converges exactly to zero by the bucket's end regardless of how unevenly
//! collection calls are spaced.

pub mod error;
pub mod events;
pub mod wallet;

pub use error::{FeesWalletError, Result};
pub use events::FeesWalletEvent;
pub use wallet::{FeesWallet, MAX_BUCKET_ITERATIONS};
