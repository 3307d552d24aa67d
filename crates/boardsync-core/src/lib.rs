//! # boardsync-core — Shared Lifecycle Vocabulary
//!
//! Defines the states, transition tables, records and errors used by every
//! other boardsync crate. It depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Closed state enums.** `FileState`, `IncludeFileState` and
//!    `CoordinatorState` are exhaustive enums. Their transition tables are
//!    `match` expressions over `(from, to)` pairs, so adding a state forces
//!    every table to be revisited.
//!
//! 2. **One include state type.** `IncludeFileState` is a superset of
//!    `FileState` rather than a subclass. Its table delegates shared edges to
//!    the file table.
//!
//! 3. **Bounded, append-only history.** `TransitionHistory` evicts oldest
//!    first and flags table-bypassing restores as `forced`.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `boardsync-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod analysis;
pub mod config;
pub mod error;
pub mod record;
pub mod state;
pub mod temporal;

pub use analysis::{ChangeAnalysis, ChangeSource, IncludeFileType, SwitchedInclude};
pub use config::{MachineConfig, DEFAULT_MAX_HISTORY};
pub use error::LifecycleError;
pub use record::{TransitionHistory, TransitionRecord};
pub use state::{
    CacheState, ChangeKind, ConflictResolution, CoordinatorState, FileState, IncludeFileState,
    LifecycleState,
};
pub use temporal::Timestamp;
