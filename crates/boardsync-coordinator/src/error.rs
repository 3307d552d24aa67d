//! # Coordinator Errors
//!
//! Every error is delivered to the submitter of the request that caused it.
//! None of them stop the worker: after a failed pipeline the coordinator is
//! forced back to `Stable` and the next queued request runs.

use thiserror::Error;

use boardsync_core::{CoordinatorState, LifecycleError};

/// Failure of a change request.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// A coordinator or file machine transition was not in its table.
    #[error(transparent)]
    Transition(#[from] LifecycleError),

    /// A caller-supplied phase callback returned an error.
    #[error("{phase} callback failed: {source}")]
    Callback {
        /// The phase whose callback failed.
        phase: CoordinatorState,
        /// The callback's error.
        #[source]
        source: anyhow::Error,
    },

    /// The request was discarded by `force_reset` before it completed.
    #[error("change request {request_id} was abandoned before completion")]
    Abandoned {
        /// Identifier assigned at submission.
        request_id: u64,
    },

    /// The worker is gone and cannot accept requests.
    #[error("coordinator worker is not running")]
    Shutdown,

    /// The coordinator was constructed outside a Tokio runtime.
    #[error("coordinator requires a Tokio runtime")]
    NoRuntime,
}

impl CoordinatorError {
    pub(crate) fn callback(phase: CoordinatorState, source: anyhow::Error) -> Self {
        Self::Callback { phase, source }
    }

    /// Whether this is a transition-table violation.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            Self::Transition(LifecycleError::InvalidTransition { .. })
        )
    }
}
