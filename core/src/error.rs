//! Errors shared by the ledger crates

use thiserror::Error;

/// Failures that can surface from any ledger operation.
///
/// Every variant is fatal: the calling transaction must be aborted with no
/// state change. Ledger code performs all mutations only after every check
/// and checked-arithmetic step has passed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    #[error("amount {0} does not fit the internal accounting width")]
    AmountTooLarge(u128),

    #[error("caller {caller} is not the {role}")]
    Unauthorized { caller: String, role: &'static str },

    #[error("collaborator not wired: {0}")]
    NotWired(&'static str),

    #[error("collaborator call failed: {0}")]
    Collaborator(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
