//! Shared handles for contract wiring
//!
//! Every ledger holds `Shared<dyn Trait>` handles to its collaborators and
//! exposes a `rewire`-style setter, so an external orchestrator can swap
//! handles whenever the contract registry changes. The execution model is
//! one transaction at a time; the locks serialize nothing beyond that.

use parking_lot::RwLock;
use std::sync::Arc;

/// A rewireable handle to a collaborator contract.
pub type Shared<T> = Arc<RwLock<T>>;

/// Wrap a collaborator in a shared handle.
pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}
