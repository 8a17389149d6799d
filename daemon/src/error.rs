use thiserror::Error;

use crate::{chain::ChainError, storage::StorageError};

/// Closed error taxonomy of the backend core.
///
/// The embedding HTTP layer maps these onto response statuses; nothing in
/// the core branches on error message text.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{entity} not found: {reference}")]
    NotFound {
        entity: &'static str,
        reference: String,
    },

    #[error("ambiguous lookup: {matches} users share the first name {name}")]
    AmbiguousLookup { name: String, matches: usize },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("member {member} already voted {kind:?} on proposal {proposal}")]
    DuplicateApproval {
        proposal: u64,
        member: String,
        kind: custos_common::multisig::ApprovalKind,
    },

    // Retryable once the lock has elapsed
    #[error("time lock active: {time_remaining}s remaining")]
    TimeLockActive { time_remaining: u64 },

    #[error("removal of member {member} would leave {remaining} active members, below threshold {threshold}")]
    QuorumBlocked {
        member: String,
        remaining: usize,
        threshold: u8,
    },

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, reference: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            reference: reference.to_string(),
        }
    }

    /// Whether the caller can retry the same request later unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::TimeLockActive { .. }
                | CoreError::Chain(ChainError::RateLimited)
                | CoreError::Chain(ChainError::Timeout)
        )
    }
}
