//! Meridian Delegation Ledger
//!
//! Maps every stake owner to exactly one delegate and maintains, per
//! delegate, the total stake delegated to it, plus the network-wide total
//! of self-delegated ("governance") stake. Aggregates are maintained
//! incrementally with before/after delta algebra and are never recomputed
//! from scratch.

pub mod error;
pub mod events;
pub mod ledger;

pub use error::{DelegationsError, Result};
pub use events::DelegationEvent;
pub use ledger::{DelegationsDeps, DelegationsLedger, StakeOwnerRecord};
