//! # File State Machine
//!
//! Tracks the lifecycle of one file: loading, saving, unsaved edits and
//! conflicts with on-disk content, alongside the validity of the file's
//! rendered representation.
//!
//! ## Transitions
//!
//! ```text
//! Idle        → Loading
//! Loading     → Loaded, Idle
//! Loaded      → Dirty, Saving, Conflicted, Loading
//! Dirty       → Saving, Loaded, Conflicted
//! Saving      → Loaded, Dirty
//! Conflicted  → Loaded, Dirty
//! ```
//!
//! ## Design
//!
//! [`FileMachine`] is generic over its state type. The primary document uses
//! `FileMachine<FileState>`; include files use `FileMachine<IncludeFileState>`
//! and gain the switch/unload/reload operations from a state-specific impl
//! block in [`crate::include`]. Every operation below works on both, since
//! `IncludeFileState` converts losslessly from `FileState`.
//!
//! Validated changes go through [`FileMachine::transition`]. The only way to
//! bypass the table is [`FileMachine::force_restore`] (and [`FileMachine::rollback`],
//! which uses it); those are recorded with `forced: true`.

use serde::{Deserialize, Serialize};

use boardsync_core::{
    CacheState, ChangeKind, ConflictResolution, FileState, LifecycleError, LifecycleState,
    MachineConfig, TransitionHistory, TransitionRecord,
};

/// The machine for a primary document.
pub type FileStateMachine = FileMachine<FileState>;

/// Everything a file machine knows about its file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContext<S> {
    /// Current lifecycle state.
    pub state: S,
    /// Validity of the rendered representation.
    pub cache_state: CacheState,
    /// Change kind carried by the most recent transition that had one.
    pub last_change_kind: Option<ChangeKind>,
    /// State before the most recent transition (single-level rollback).
    pub previous_state: Option<S>,
    /// Content snapshot saved by [`FileMachine::save_rollback_point`].
    pub previous_content: Option<String>,
    /// Most recent operational failure.
    pub last_error: Option<String>,
    /// Bounded transition log.
    pub history: TransitionHistory<S>,
}

impl<S: LifecycleState + From<FileState>> FileContext<S> {
    fn new(max_history: usize) -> Self {
        Self {
            state: S::from(FileState::Idle),
            cache_state: CacheState::Invalid,
            last_change_kind: None,
            previous_state: None,
            previous_content: None,
            last_error: None,
            history: TransitionHistory::new(max_history),
        }
    }
}

/// Lifecycle tracker for a single file.
#[derive(Debug, Clone)]
pub struct FileMachine<S: LifecycleState> {
    pub(crate) context: FileContext<S>,
    pub(crate) config: MachineConfig,
    label: Option<String>,
}

impl<S> Default for FileMachine<S>
where
    S: LifecycleState + From<FileState>,
{
    fn default() -> Self {
        Self::new(MachineConfig::default())
    }
}

impl<S> FileMachine<S>
where
    S: LifecycleState + From<FileState>,
{
    /// A machine in `Idle` with an invalid cache and empty history.
    pub fn new(config: MachineConfig) -> Self {
        Self {
            context: FileContext::new(config.max_history),
            config,
            label: None,
        }
    }

    /// Attach a label (usually the file's relative path) used in log output.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// Current lifecycle state.
    pub fn state(&self) -> S {
        self.context.state
    }

    /// Validity of the rendered representation.
    pub fn cache_state(&self) -> CacheState {
        self.context.cache_state
    }

    /// Loaded with a valid cache.
    pub fn is_stable(&self) -> bool {
        self.context.state == S::from(FileState::Loaded)
            && self.context.cache_state == CacheState::Valid
    }

    /// Whether edits may be applied (`Loaded` or `Dirty`).
    pub fn can_modify(&self) -> bool {
        self.is_in(FileState::Loaded) || self.is_in(FileState::Dirty)
    }

    /// Whether the file has unsaved edits.
    pub fn is_dirty(&self) -> bool {
        self.is_in(FileState::Dirty)
    }

    /// The full context.
    pub fn context(&self) -> &FileContext<S> {
        &self.context
    }

    /// An owned copy of the context, for diagnostics.
    pub fn snapshot(&self) -> FileContext<S> {
        self.context.clone()
    }

    /// The bounded transition log.
    pub fn history(&self) -> &TransitionHistory<S> {
        &self.context.history
    }

    /// The saved rollback content, if any.
    pub fn previous_content(&self) -> Option<&str> {
        self.context.previous_content.as_deref()
    }

    /// The most recent recorded failure, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.context.last_error.as_deref()
    }

    /// The configuration this machine was built with.
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// The log label, if one was attached.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    // ── Core transition ──────────────────────────────────────────────

    /// Move to `to` if the transition table allows it.
    ///
    /// On rejection the context is left untouched.
    pub fn transition(
        &mut self,
        to: S,
        reason: Option<&str>,
        change_kind: Option<ChangeKind>,
    ) -> Result<(), LifecycleError> {
        let from = self.context.state;
        if !from.can_transition_to(to) {
            return Err(LifecycleError::invalid_transition(from, to));
        }

        self.context.previous_state = Some(from);
        self.context.state = to;
        if change_kind.is_some() {
            self.context.last_change_kind = change_kind;
        }
        self.context.history.push(TransitionRecord::new(
            from,
            to,
            reason.map(str::to_string),
            change_kind,
        ));
        tracing::debug!(
            file = self.label.as_deref().unwrap_or("-"),
            from = %from,
            to = %to,
            reason = reason.unwrap_or(""),
            "file transition"
        );
        Ok(())
    }

    /// Set the state directly, bypassing the transition table.
    ///
    /// This is the escape hatch behind rollback and failed reloads. The
    /// change is recorded as forced. A machine in a terminal state refuses.
    pub fn force_restore(&mut self, to: S, reason: &str) -> Result<(), LifecycleError> {
        if self.context.state.is_terminal() {
            return Err(LifecycleError::Disposed {
                operation: "force restore",
            });
        }
        let from = self.restore(to, reason);
        self.context.previous_state = Some(from);
        Ok(())
    }

    /// Unconditional restore; returns the state left behind.
    pub(crate) fn restore(&mut self, to: S, reason: &str) -> S {
        let from = self.context.state;
        self.context.state = to;
        self.context
            .history
            .push(TransitionRecord::forced(from, to, reason));
        tracing::warn!(
            file = self.label.as_deref().unwrap_or("-"),
            from = %from,
            to = %to,
            reason,
            "forced state restore"
        );
        from
    }

    // ── Load / save ──────────────────────────────────────────────────

    /// Start reading the file. Invalidates the cache.
    pub fn begin_load(&mut self, change_kind: Option<ChangeKind>) -> Result<(), LifecycleError> {
        self.transition(S::from(FileState::Loading), Some("load started"), change_kind)?;
        self.context.cache_state = CacheState::Invalid;
        Ok(())
    }

    /// Finish reading the file. Validates the cache.
    pub fn complete_load(&mut self) -> Result<(), LifecycleError> {
        self.transition(S::from(FileState::Loaded), Some("load completed"), None)?;
        self.context.cache_state = CacheState::Valid;
        Ok(())
    }

    /// Start writing the file.
    pub fn begin_save(&mut self) -> Result<(), LifecycleError> {
        self.transition(
            S::from(FileState::Saving),
            Some("save started"),
            Some(ChangeKind::Internal),
        )
    }

    /// Finish writing the file. Validates the cache.
    pub fn complete_save(&mut self) -> Result<(), LifecycleError> {
        self.transition(S::from(FileState::Loaded), Some("save completed"), None)?;
        self.context.cache_state = CacheState::Valid;
        Ok(())
    }

    // ── Dirty tracking ───────────────────────────────────────────────

    /// `Loaded → Dirty`. Does nothing in any other state.
    ///
    /// Returns whether the machine moved.
    pub fn mark_dirty(&mut self, change_kind: ChangeKind) -> bool {
        if !self.is_in(FileState::Loaded) {
            return false;
        }
        self.transition(S::from(FileState::Dirty), Some("modified"), Some(change_kind))
            .is_ok()
    }

    /// `Dirty → Loaded`. Does nothing in any other state.
    ///
    /// Returns whether the machine moved.
    pub fn mark_clean(&mut self) -> bool {
        if !self.is_in(FileState::Dirty) {
            return false;
        }
        self.transition(S::from(FileState::Loaded), Some("changes discarded"), None)
            .is_ok()
    }

    // ── Conflicts ────────────────────────────────────────────────────

    /// Mark the in-memory and on-disk content as diverged. Invalidates the cache.
    pub fn enter_conflict(&mut self, reason: Option<&str>) -> Result<(), LifecycleError> {
        self.transition(
            S::from(FileState::Conflicted),
            Some(reason.unwrap_or("conflict detected")),
            Some(ChangeKind::External),
        )?;
        self.context.cache_state = CacheState::Invalid;
        Ok(())
    }

    /// Leave `Conflicted`.
    ///
    /// `KeepLocal` keeps the edits (→ `Dirty`, cache untouched); `UseRemote`
    /// and `Merged` land in `Loaded` with a valid cache.
    pub fn resolve_conflict(&mut self, resolution: ConflictResolution) -> Result<(), LifecycleError> {
        let reason = format!("conflict resolved: {resolution}");
        match resolution {
            ConflictResolution::KeepLocal => {
                self.transition(S::from(FileState::Dirty), Some(&reason), None)
            }
            ConflictResolution::UseRemote | ConflictResolution::Merged => {
                self.transition(S::from(FileState::Loaded), Some(&reason), None)?;
                self.context.cache_state = CacheState::Valid;
                Ok(())
            }
        }
    }

    // ── Rollback ─────────────────────────────────────────────────────

    /// Remember `content` so a failed operation can restore it.
    pub fn save_rollback_point(&mut self, content: impl Into<String>) {
        self.context.previous_content = Some(content.into());
    }

    /// Restore the state held before the most recent transition.
    ///
    /// Returns `false` and changes nothing when no previous state is
    /// recorded or the machine is terminal. The restore bypasses the
    /// transition table and consumes the recorded previous state.
    pub fn rollback(&mut self) -> bool {
        let Some(target) = self.context.previous_state else {
            return false;
        };
        if self.context.state.is_terminal() {
            tracing::warn!(
                file = self.label.as_deref().unwrap_or("-"),
                state = %self.context.state,
                "rollback refused in terminal state"
            );
            return false;
        }
        self.restore(target, "rollback");
        self.context.previous_state = None;
        true
    }

    /// Back to `Idle` with an invalid cache and empty history.
    pub fn reset(&mut self) {
        self.context = FileContext::new(self.config.max_history);
    }

    pub(crate) fn is_in(&self, state: FileState) -> bool {
        self.context.state == S::from(state)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
