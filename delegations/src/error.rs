//! Delegation ledger error types

use meridian_core::error::CoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelegationsError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("cannot delegate to the zero address")]
    ZeroAddress,

    #[error("the void delegation cannot be changed")]
    VoidDelegation,

    #[error("delegation import is finalized")]
    ImportFinalized,

    #[error("address {0} already has stake or a delegation")]
    AlreadyInitialized(String),

    #[error("batch length mismatch: {0} vs {1}")]
    LengthMismatch(usize, usize),
}

pub type Result<T> = std::result::Result<T, DelegationsError>;
