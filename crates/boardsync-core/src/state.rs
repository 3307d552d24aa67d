//! # Lifecycle States and Transition Tables
//!
//! Closed enumerations for every lifecycle tracked by boardsync, each paired
//! with an exhaustive `match`-based transition table.
//!
//! ## File lifecycle
//!
//! ```text
//! Idle ──▶ Loading ──▶ Loaded ◀──▶ Dirty
//!             │          │  ▲        │
//!             ▼          │  │        ▼
//!           Idle         │  └──── Saving
//!                        ▼
//!                   Conflicted ──▶ Loaded | Dirty
//! ```
//!
//! ## Include lifecycle
//!
//! Superset of the file lifecycle for documents that can be swapped out at
//! runtime:
//!
//! ```text
//! Loaded | Dirty ──▶ SwitchingOut ──▶ Unloading ──▶ Disposed (terminal)
//!                         │
//!                         └──▶ Loaded (cancelled)
//!
//! Idle ──▶ Reloading ──▶ Loaded
//! ```
//!
//! ## Coordinator lifecycle
//!
//! ```text
//! Stable ──▶ DetectingChanges ──▶ Analyzing ──▶ CoordinatingIncludes ──▶ UpdatingUI ──▶ Stable
//!                                     │                                     ▲
//!                                     ├─────────────────────────────────────┘
//!                                     └──▶ ConflictResolution ──▶ Stable
//! ```

use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// A closed set of lifecycle states with a static transition table.
///
/// Implemented by [`FileState`], [`IncludeFileState`] and
/// [`CoordinatorState`]. Machines never consult anything but
/// [`can_transition_to`](LifecycleState::can_transition_to) when validating
/// a transition.
pub trait LifecycleState: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static {
    /// Every variant, in declaration order.
    const ALL: &'static [Self];

    /// The canonical state name (e.g., `"LOADED"`).
    fn name(&self) -> &'static str;

    /// Whether `(self, to)` is present in the transition table.
    fn can_transition_to(&self, to: Self) -> bool;

    /// Whether this state has no outgoing transitions.
    fn is_terminal(&self) -> bool {
        Self::ALL.iter().all(|to| !self.can_transition_to(*to))
    }

    /// All states reachable from `self` in one validated step.
    fn successors(&self) -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|to| self.can_transition_to(*to))
            .collect()
    }
}

// ─── File State ──────────────────────────────────────────────────────

/// Lifecycle state of a single tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    /// Nothing loaded yet.
    Idle,
    /// Content is being read.
    Loading,
    /// Content is loaded and matches the file on disk.
    Loaded,
    /// Content has unsaved in-memory modifications.
    Dirty,
    /// A save is in flight.
    Saving,
    /// In-memory and on-disk content diverged.
    Conflicted,
}

impl FileState {
    /// Whether edits may be applied in this state.
    pub fn can_modify(&self) -> bool {
        matches!(self, Self::Loaded | Self::Dirty)
    }
}

impl LifecycleState for FileState {
    const ALL: &'static [Self] = &[
        Self::Idle,
        Self::Loading,
        Self::Loaded,
        Self::Dirty,
        Self::Saving,
        Self::Conflicted,
    ];

    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Loading => "LOADING",
            Self::Loaded => "LOADED",
            Self::Dirty => "DIRTY",
            Self::Saving => "SAVING",
            Self::Conflicted => "CONFLICTED",
        }
    }

    fn can_transition_to(&self, to: Self) -> bool {
        use FileState::{Conflicted, Dirty, Idle, Loaded, Loading, Saving};
        matches!(
            (self, to),
            (Idle, Loading)
                | (Loading, Loaded | Idle)
                | (Loaded, Dirty | Saving | Conflicted | Loading)
                | (Dirty, Saving | Loaded | Conflicted)
                | (Saving, Loaded | Dirty)
                | (Conflicted, Loaded | Dirty)
        )
    }
}

impl Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Include File State ──────────────────────────────────────────────

/// Lifecycle state of an include file: the file states plus the
/// switch/unload/reload states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncludeFileState {
    /// Nothing loaded yet.
    Idle,
    /// Content is being read.
    Loading,
    /// Content is loaded and matches the file on disk.
    Loaded,
    /// Content has unsaved in-memory modifications.
    Dirty,
    /// A save is in flight.
    Saving,
    /// In-memory and on-disk content diverged.
    Conflicted,
    /// The include is about to be replaced by another file.
    SwitchingOut,
    /// The replaced include is releasing its content.
    Unloading,
    /// Content is being re-read after a switch or failure.
    Reloading,
    /// The machine has been released (terminal).
    Disposed,
}

impl IncludeFileState {
    /// The equivalent file state, if this is not an include-only state.
    pub fn as_file_state(&self) -> Option<FileState> {
        match self {
            Self::Idle => Some(FileState::Idle),
            Self::Loading => Some(FileState::Loading),
            Self::Loaded => Some(FileState::Loaded),
            Self::Dirty => Some(FileState::Dirty),
            Self::Saving => Some(FileState::Saving),
            Self::Conflicted => Some(FileState::Conflicted),
            Self::SwitchingOut | Self::Unloading | Self::Reloading | Self::Disposed => None,
        }
    }

    /// Whether edits may be applied in this state.
    pub fn can_modify(&self) -> bool {
        matches!(self, Self::Loaded | Self::Dirty)
    }
}

impl From<FileState> for IncludeFileState {
    fn from(state: FileState) -> Self {
        match state {
            FileState::Idle => Self::Idle,
            FileState::Loading => Self::Loading,
            FileState::Loaded => Self::Loaded,
            FileState::Dirty => Self::Dirty,
            FileState::Saving => Self::Saving,
            FileState::Conflicted => Self::Conflicted,
        }
    }
}

impl LifecycleState for IncludeFileState {
    const ALL: &'static [Self] = &[
        Self::Idle,
        Self::Loading,
        Self::Loaded,
        Self::Dirty,
        Self::Saving,
        Self::Conflicted,
        Self::SwitchingOut,
        Self::Unloading,
        Self::Reloading,
        Self::Disposed,
    ];

    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Loading => "LOADING",
            Self::Loaded => "LOADED",
            Self::Dirty => "DIRTY",
            Self::Saving => "SAVING",
            Self::Conflicted => "CONFLICTED",
            Self::SwitchingOut => "SWITCHING_OUT",
            Self::Unloading => "UNLOADING",
            Self::Reloading => "RELOADING",
            Self::Disposed => "DISPOSED",
        }
    }

    fn can_transition_to(&self, to: Self) -> bool {
        use IncludeFileState::{Dirty, Disposed, Idle, Loaded, Reloading, SwitchingOut, Unloading};
        let include_only = matches!(
            (self, to),
            (Loaded | Dirty, SwitchingOut)
                | (SwitchingOut, Unloading | Loaded)
                | (Unloading, Disposed)
                | (Reloading, Loaded)
                | (Idle, Reloading)
        );
        if include_only {
            return true;
        }
        match (self.as_file_state(), to.as_file_state()) {
            (Some(from), Some(to)) => from.can_transition_to(to),
            _ => false,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Disposed)
    }
}

impl Display for IncludeFileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Coordinator State ───────────────────────────────────────────────

/// Phase of the coordinator's change-handling pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinatorState {
    /// No pipeline is running.
    Stable,
    /// A change request has been accepted.
    DetectingChanges,
    /// The change analyzer is running.
    Analyzing,
    /// Include switches/reloads are being driven.
    CoordinatingIncludes,
    /// The board representation is being refreshed.
    #[serde(rename = "UPDATING_UI")]
    UpdatingUI,
    /// A conflicting external change is being resolved.
    ConflictResolution,
}

impl LifecycleState for CoordinatorState {
    const ALL: &'static [Self] = &[
        Self::Stable,
        Self::DetectingChanges,
        Self::Analyzing,
        Self::CoordinatingIncludes,
        Self::UpdatingUI,
        Self::ConflictResolution,
    ];

    fn name(&self) -> &'static str {
        match self {
            Self::Stable => "STABLE",
            Self::DetectingChanges => "DETECTING_CHANGES",
            Self::Analyzing => "ANALYZING",
            Self::CoordinatingIncludes => "COORDINATING_INCLUDES",
            Self::UpdatingUI => "UPDATING_UI",
            Self::ConflictResolution => "CONFLICT_RESOLUTION",
        }
    }

    fn can_transition_to(&self, to: Self) -> bool {
        use CoordinatorState::{
            Analyzing, ConflictResolution, CoordinatingIncludes, DetectingChanges, Stable,
            UpdatingUI,
        };
        matches!(
            (self, to),
            (Stable, DetectingChanges | ConflictResolution)
                | (DetectingChanges, Analyzing | Stable)
                | (Analyzing, CoordinatingIncludes | UpdatingUI | ConflictResolution | Stable)
                | (CoordinatingIncludes, UpdatingUI | Stable)
                | (UpdatingUI, Stable)
                | (ConflictResolution, Stable | DetectingChanges)
        )
    }
}

impl Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Cache State ─────────────────────────────────────────────────────

/// Whether the derived/rendered representation of a file can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheState {
    /// Rendered representation matches the content.
    Valid,
    /// Rendered representation must be recomputed.
    Invalid,
    /// Part of the representation is stale.
    Partial,
}

impl Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Partial => "PARTIAL",
        })
    }
}

// ─── Change Kind ─────────────────────────────────────────────────────

/// What triggered a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Card or text content changed.
    Content,
    /// Columns/rows were added, removed or reordered.
    Structure,
    /// Include references changed.
    Includes,
    /// The file changed outside the editor.
    External,
    /// The editor itself changed the file.
    Internal,
}

impl Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Content => "content",
            Self::Structure => "structure",
            Self::Includes => "includes",
            Self::External => "external",
            Self::Internal => "internal",
        })
    }
}

// ─── Conflict Resolution ─────────────────────────────────────────────

/// How a conflicted file was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    /// Keep the in-memory edits; the file stays dirty.
    KeepLocal,
    /// Discard in-memory edits in favour of the on-disk content.
    UseRemote,
    /// Both sides were merged into the loaded content.
    Merged,
}

impl Display for ConflictResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::KeepLocal => "keep-local",
            Self::UseRemote => "use-remote",
            Self::Merged => "merged",
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
