//! Meridian PoS Economy - Shared Core
//!
//! Common pieces used by the ledger crates:
//! - Token unit constants and the granularity codec
//! - Collaborator contract interfaces (committee, staking, guardians, token)
//! - Role-based access control
//! - Shared handles for contract wiring
//! - In-memory collaborators for tests (`testkit`)

pub mod access;
pub mod error;
pub mod interfaces;
pub mod registry;
pub mod testkit;
pub mod units;

pub use access::AccessControl;
pub use error::CoreError;
pub use interfaces::{
    Address, Committee, CommitteeStats, DelegationChangeListener, DelegationsView,
    FeeBucketSource, GuardianRegistry, MemberInfo, StakeBalances, Token, VOID_ADDRESS,
};
pub use registry::{shared, Shared};

/// Economic constants
pub mod constants {
    /// External token base unit (18 decimal places)
    pub const TOKEN_BASE: u128 = 1_000_000_000_000_000_000;

    /// Internal accounting granularity: one internal unit is 0.001 token
    pub const GRANULARITY: u128 = 1_000_000_000_000_000;

    /// Percent-mille base (100000 = 100%)
    pub const PERCENT_MILLE_BASE: u64 = 100_000;

    /// Seconds in a reward year (365 days)
    pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

    /// Fee bucket width in seconds (30 days)
    pub const BUCKET_LENGTH: u64 = 30 * 24 * 60 * 60;
}
