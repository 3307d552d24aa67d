//! # Include File State Machine
//!
//! Include files are secondary documents referenced from the primary board
//! (a column or task whose content lives in another file). The reference can
//! be re-pointed at runtime, so on top of the file lifecycle an include
//! machine can be switched out, unloaded, disposed, and reloaded.
//!
//! ## Additional transitions
//!
//! ```text
//! Loaded, Dirty → SwitchingOut
//! SwitchingOut  → Unloading, Loaded
//! Unloading     → Disposed
//! Reloading     → Loaded
//! Idle          → Reloading
//! Disposed      → (none)
//! ```
//!
//! ## Failure policy
//!
//! A failed reload with `auto_rollback` configured and a content snapshot
//! available rolls back silently. Otherwise the machine is demoted to `Idle`
//! with an invalid cache and the caller retries explicitly.

use boardsync_core::{CacheState, IncludeFileState, LifecycleError, LifecycleState};

use crate::machine::FileMachine;

/// The machine for an include file.
pub type IncludeFileStateMachine = FileMachine<IncludeFileState>;

impl FileMachine<IncludeFileState> {
    /// Whether the machine has been released.
    pub fn is_disposed(&self) -> bool {
        self.context.state == IncludeFileState::Disposed
    }

    /// Whether the include can be switched out right now (`Loaded` or `Dirty`).
    pub fn can_switch(&self) -> bool {
        matches!(
            self.context.state,
            IncludeFileState::Loaded | IncludeFileState::Dirty
        )
    }

    /// Start replacing this include with another file.
    pub fn begin_switch(&mut self, has_unsaved_changes: bool) -> Result<(), LifecycleError> {
        self.ensure_not_disposed("begin switch")?;
        let reason = if has_unsaved_changes {
            "switching out with unsaved changes"
        } else {
            "switching out"
        };
        self.transition(IncludeFileState::SwitchingOut, Some(reason), None)
    }

    /// Abandon a switch, returning to the state held before it began
    /// (`Loaded` if none was recorded).
    pub fn cancel_switch(&mut self) -> Result<(), LifecycleError> {
        self.require(IncludeFileState::SwitchingOut, "cancel switch")?;
        let target = self
            .context
            .previous_state
            .unwrap_or(IncludeFileState::Loaded);
        if self.context.state.can_transition_to(target) {
            self.transition(target, Some("switch cancelled"), None)
        } else {
            // SwitchingOut -> Dirty has no table edge.
            let from = self.restore(target, "switch cancelled");
            self.context.previous_state = Some(from);
            Ok(())
        }
    }

    /// Commit to the switch and start releasing content.
    pub fn confirm_switch(&mut self) -> Result<(), LifecycleError> {
        self.require(IncludeFileState::SwitchingOut, "confirm switch")?;
        self.transition(IncludeFileState::Unloading, Some("switch confirmed"), None)
    }

    /// Finish releasing content. Invalidates the cache and disposes the machine.
    pub fn complete_unload(&mut self) -> Result<(), LifecycleError> {
        self.require(IncludeFileState::Unloading, "complete unload")?;
        self.context.cache_state = CacheState::Invalid;
        self.transition(IncludeFileState::Disposed, Some("unloaded"), None)
    }

    /// Start re-reading the file. Invalidates the cache.
    ///
    /// Requires `Idle`, unless `auto_rollback` is configured, in which case
    /// the reload is forced from any non-terminal state.
    pub fn begin_reload(&mut self) -> Result<(), LifecycleError> {
        self.ensure_not_disposed("begin reload")?;
        let state = self.context.state;
        if state == IncludeFileState::Idle {
            self.transition(IncludeFileState::Reloading, Some("reload started"), None)?;
        } else if self.config.auto_rollback {
            let from = self.restore(IncludeFileState::Reloading, "forced reload");
            self.context.previous_state = Some(from);
        } else {
            return Err(LifecycleError::UnexpectedState {
                operation: "begin reload",
                expected: IncludeFileState::Idle.to_string(),
                actual: state.to_string(),
            });
        }
        self.context.cache_state = CacheState::Invalid;
        Ok(())
    }

    /// Finish re-reading the file. Validates the cache.
    pub fn complete_reload(&mut self) -> Result<(), LifecycleError> {
        self.require(IncludeFileState::Reloading, "complete reload")?;
        self.transition(IncludeFileState::Loaded, Some("reload completed"), None)?;
        self.context.cache_state = CacheState::Valid;
        Ok(())
    }

    /// Record a reload failure and recover.
    ///
    /// With `auto_rollback` and a content snapshot, rolls back to the previous
    /// state. Otherwise the machine is forced to `Idle` with an invalid cache.
    pub fn fail_reload(&mut self, error: impl Into<String>) -> Result<(), LifecycleError> {
        self.ensure_not_disposed("fail reload")?;
        let error = error.into();
        tracing::warn!(
            file = self.label().unwrap_or("-"),
            state = %self.context.state,
            error = %error,
            "include reload failed"
        );
        self.context.last_error = Some(error);

        if self.config.auto_rollback && self.context.previous_content.is_some() && self.rollback() {
            return Ok(());
        }

        if self.context.state != IncludeFileState::Idle {
            let from = self.restore(IncludeFileState::Idle, "reload failed");
            self.context.previous_state = Some(from);
        }
        self.context.cache_state = CacheState::Invalid;
        Ok(())
    }

    /// Recycle the machine (disposed or not) for a new file identity.
    pub fn reset_for_reuse(&mut self) {
        tracing::debug!(
            file = self.label().unwrap_or("-"),
            state = %self.context.state,
            "include machine reset for reuse"
        );
        self.reset();
    }

    fn ensure_not_disposed(&self, operation: &'static str) -> Result<(), LifecycleError> {
        if self.is_disposed() {
            return Err(LifecycleError::Disposed { operation });
        }
        Ok(())
    }

    fn require(
        &self,
        expected: IncludeFileState,
        operation: &'static str,
    ) -> Result<(), LifecycleError> {
        self.ensure_not_disposed(operation)?;
        if self.context.state != expected {
            return Err(LifecycleError::UnexpectedState {
                operation,
                expected: expected.to_string(),
                actual: self.context.state.to_string(),
            });
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
