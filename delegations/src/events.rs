//! Delegation ledger events
//!
//! Every mutating entry point appends events carrying the after-change
//! values needed to reconstruct the ledger's history off-chain. Amounts are
//! external token units.

use meridian_core::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelegationEvent {
    Delegated {
        from: Address,
        to: Address,
    },
    DelegatedStakeChanged {
        delegate: Address,
        /// The delegate's own stake when self-delegating, zero otherwise.
        self_stake: u128,
        /// Total stake currently delegated to this delegate.
        delegated_stake: u128,
        delegators: Vec<Address>,
        delegator_stakes: Vec<u128>,
    },
    DelegationsImported {
        from: Vec<Address>,
        to: Address,
    },
    DelegationImportFinalized,
}
