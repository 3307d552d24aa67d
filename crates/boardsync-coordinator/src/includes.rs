//! # Include Registry
//!
//! Keyed collection of the include files referenced by the primary document.
//! Each entry owns a shared handle to its include machine so phase callbacks
//! can drive switch/unload/reload sequences directly.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use boardsync_core::{IncludeFileState, IncludeFileType, MachineConfig};
use boardsync_state::{FileContext, FileStateMachine, IncludeFileStateMachine};

/// Shared handle to the primary document's machine.
pub type SharedFileMachine = Arc<Mutex<FileStateMachine>>;

/// Shared handle to one include file's machine.
pub type SharedIncludeMachine = Arc<Mutex<IncludeFileStateMachine>>;

/// One registered include file.
#[derive(Debug, Clone)]
pub struct IncludeFileRef {
    /// Path as written in the primary document; the registry key.
    pub relative_path: String,
    /// Resolved location on disk.
    pub absolute_path: PathBuf,
    /// How the primary document references the file.
    pub file_type: IncludeFileType,
    /// The file's lifecycle machine.
    pub state_machine: SharedIncludeMachine,
}

impl IncludeFileRef {
    fn new(
        relative_path: String,
        file_type: IncludeFileType,
        absolute_path: PathBuf,
        config: MachineConfig,
    ) -> Self {
        let machine = IncludeFileStateMachine::new(config).with_label(relative_path.clone());
        Self {
            relative_path,
            absolute_path,
            file_type,
            state_machine: Arc::new(Mutex::new(machine)),
        }
    }

    /// Current state of the include machine.
    pub fn state(&self) -> IncludeFileState {
        self.state_machine.lock().state()
    }
}

/// Serializable view of an include entry.
#[derive(Debug, Clone, Serialize)]
pub struct IncludeSnapshot {
    /// Registry key.
    pub relative_path: String,
    /// Resolved location on disk.
    pub absolute_path: PathBuf,
    /// How the primary document references the file.
    pub file_type: IncludeFileType,
    /// The machine's context at snapshot time.
    pub context: FileContext<IncludeFileState>,
}

#[derive(Debug, Default)]
pub(crate) struct IncludeRegistry {
    entries: RwLock<BTreeMap<String, IncludeFileRef>>,
}

impl IncludeRegistry {
    /// Insert a fresh entry unless `relative_path` is already present.
    pub(crate) fn register(
        &self,
        relative_path: &str,
        file_type: IncludeFileType,
        absolute_path: PathBuf,
        config: MachineConfig,
    ) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(relative_path) {
            return false;
        }
        entries.insert(
            relative_path.to_string(),
            IncludeFileRef::new(relative_path.to_string(), file_type, absolute_path, config),
        );
        true
    }

    pub(crate) fn remove(&self, relative_path: &str) -> Option<IncludeFileRef> {
        self.entries.write().remove(relative_path)
    }

    pub(crate) fn get(&self, relative_path: &str) -> Option<IncludeFileRef> {
        self.entries.read().get(relative_path).cloned()
    }

    pub(crate) fn paths(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether any registered include has unsaved edits.
    pub(crate) fn any_dirty(&self) -> bool {
        self.entries
            .read()
            .values()
            .any(|entry| entry.state_machine.lock().is_dirty())
    }

    pub(crate) fn snapshot(&self) -> Vec<IncludeSnapshot> {
        self.entries
            .read()
            .values()
            .map(|entry| IncludeSnapshot {
                relative_path: entry.relative_path.clone(),
                absolute_path: entry.absolute_path.clone(),
                file_type: entry.file_type,
                context: entry.state_machine.lock().snapshot(),
            })
            .collect()
    }
}
