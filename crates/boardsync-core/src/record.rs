//! # Transition Records and Bounded History
//!
//! Every machine keeps an append-only log of the transitions it performed.
//! The log is bounded: once it holds more than its configured maximum, the
//! oldest entries are evicted first.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::state::{ChangeKind, LifecycleState};
use crate::temporal::Timestamp;

/// Record of a single state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord<S> {
    /// State before the change.
    pub from: S,
    /// State after the change.
    pub to: S,
    /// When the change happened (UTC).
    pub timestamp: Timestamp,
    /// Human-readable reason, if the caller supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// What triggered the change, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_kind: Option<ChangeKind>,
    /// `true` when the change bypassed the transition table
    /// (rollback, forced reload, emergency reset).
    #[serde(default)]
    pub forced: bool,
}

impl<S: LifecycleState> TransitionRecord<S> {
    /// A validated transition recorded now.
    pub fn new(from: S, to: S, reason: Option<String>, change_kind: Option<ChangeKind>) -> Self {
        Self {
            from,
            to,
            timestamp: Timestamp::now(),
            reason,
            change_kind,
            forced: false,
        }
    }

    /// A table-bypassing restore recorded now.
    pub fn forced(from: S, to: S, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            timestamp: Timestamp::now(),
            reason: Some(reason.into()),
            change_kind: None,
            forced: true,
        }
    }
}

/// FIFO-bounded transition log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionHistory<S> {
    max_entries: usize,
    entries: VecDeque<TransitionRecord<S>>,
}

impl<S: LifecycleState> TransitionHistory<S> {
    /// An empty history holding at most `max_entries` records.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: VecDeque::with_capacity(max_entries.min(64)),
        }
    }

    /// Append a record, evicting the oldest entries past the bound.
    pub fn push(&mut self, record: TransitionRecord<S>) {
        self.entries.push_back(record);
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no records are retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The configured bound.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// The most recent record.
    pub fn latest(&self) -> Option<&TransitionRecord<S>> {
        self.entries.back()
    }

    /// Records from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &TransitionRecord<S>> + '_ {
        self.entries.iter()
    }

    /// Owned copy of the records, oldest first.
    pub fn to_vec(&self) -> Vec<TransitionRecord<S>> {
        self.entries.iter().cloned().collect()
    }

    /// Drop every record, keeping the bound.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
