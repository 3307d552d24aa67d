//! # Error Types
//!
//! Lifecycle errors are contract violations: the caller asked a machine for
//! a change its table or its current state does not allow. They abort the
//! triggering operation and leave the machine untouched.

use thiserror::Error;

/// Rejection of a lifecycle operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The `(from, to)` pair is not in the machine's transition table.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// A lifecycle call reached an include machine that was already disposed.
    #[error("cannot {operation}: include file is disposed")]
    Disposed {
        /// The rejected operation.
        operation: &'static str,
    },

    /// An operation that requires a specific state was called from another.
    #[error("cannot {operation} while {actual} (requires {expected})")]
    UnexpectedState {
        /// The rejected operation.
        operation: &'static str,
        /// Required state.
        expected: String,
        /// Current state.
        actual: String,
    },
}

impl LifecycleError {
    /// Build an [`InvalidTransition`](Self::InvalidTransition) from any two
    /// displayable states.
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
