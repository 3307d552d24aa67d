//! # boardsync-coordinator — Change Coordination
//!
//! Serializes competing change sources (file watcher, board edits, save
//! completion, conflict decisions) for one board into a single ordered
//! pipeline over the primary file machine and its include machines.
//!
//! ## Guarantees
//!
//! - **Single flight.** One worker task runs one pipeline at a time, under
//!   an async execution lock that also spans a [`MainCoordinator::force_reset`].
//! - **FIFO.** Requests start in submission order. A request never starts
//!   before the previous one has finished, conflict short-circuits and
//!   failures included.
//! - **Isolated failures.** Each request's error reaches only its own
//!   [`PendingChange`]. The coordinator returns to `Stable` and carries on.
//!
//! ```no_run
//! use boardsync_core::ChangeSource;
//! use boardsync_coordinator::{ChangeEvent, CoordinatorConfig, MainCoordinator};
//!
//! # async fn run() -> Result<(), boardsync_coordinator::CoordinatorError> {
//! let coordinator = MainCoordinator::new(CoordinatorConfig::default())?;
//! let outcome = coordinator
//!     .handle_change(ChangeEvent::new(ChangeSource::UserEdit).on_update_ui(|| async { Ok(()) }))
//!     .await?;
//! assert!(!outcome.conflict);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod includes;

pub use config::{CoordinatorConfig, DEFAULT_COORDINATOR_HISTORY};
pub use coordinator::{
    ActiveOperation, ChangeOutcome, CoordinatorContext, CoordinatorSnapshot, MainCoordinator,
    PendingChange,
};
pub use error::CoordinatorError;
pub use event::{ChangeEvent, PhaseFuture};
pub use includes::{IncludeFileRef, IncludeSnapshot, SharedFileMachine, SharedIncludeMachine};
