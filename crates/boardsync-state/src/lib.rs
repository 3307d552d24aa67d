//! # boardsync-state — File Lifecycle State Machines
//!
//! Implements the per-file machines that track what the editor knows about
//! each document on the board.
//!
//! ## State Machines
//!
//! - **File** (`machine.rs`): `Idle → Loading → Loaded ⇄ Dirty`, with
//!   `Saving` and `Conflicted` branches, cache validity, a single-level
//!   rollback point, and bounded transition history.
//!
//! - **Include file** (`include.rs`): the same machine parameterised over
//!   `IncludeFileState`, adding `SwitchingOut → Unloading → Disposed` and
//!   `Idle → Reloading → Loaded`, with a rollback-or-demote policy for
//!   failed reloads.
//!
//! ## Design
//!
//! There is no inheritance between the two machines. `FileMachine<S>` holds
//! the shared operations for any state type that converts from `FileState`;
//! the include-only operations live in `impl FileMachine<IncludeFileState>`,
//! so `FileMachine<FileState>` has no `begin_switch()` method and calling it
//! is a compile error:
//!
//! ```compile_fail
//! use boardsync_state::FileStateMachine;
//!
//! let mut main = FileStateMachine::default();
//! // ERROR: no method named `begin_switch` found for `FileMachine<FileState>`
//! main.begin_switch(false).unwrap();
//! ```
//!
//! All operations are synchronous. Contract violations return
//! [`LifecycleError`](boardsync_core::LifecycleError) and leave the machine
//! untouched.

pub mod include;
pub mod machine;

pub use include::IncludeFileStateMachine;
pub use machine::{FileContext, FileMachine, FileStateMachine};
