//! # Change Analysis Records
//!
//! Vocabulary exchanged between the coordinator and the external change
//! analyzer: where a change came from, what it touched, and which include
//! files were swapped.

use serde::{Deserialize, Serialize};

/// Which part of the editor raised a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeSource {
    /// The file-system watcher saw an external edit.
    FileWatcher,
    /// A structural or content edit made on the board.
    UserEdit,
    /// A save completed.
    Save,
    /// A conflict-resolution decision was taken.
    ConflictResolution,
    /// An include reference was pointed at another file.
    IncludeSwitch,
    /// Undo of a board edit.
    Undo,
    /// Redo of a board edit.
    Redo,
}

impl std::fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::FileWatcher => "file-watcher",
            Self::UserEdit => "user-edit",
            Self::Save => "save",
            Self::ConflictResolution => "conflict-resolution",
            Self::IncludeSwitch => "include-switch",
            Self::Undo => "undo",
            Self::Redo => "redo",
        })
    }
}

/// How an include file is referenced from the primary document.
///
/// Carried for callers only; the state machines ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncludeFileType {
    /// A whole column is sourced from the file.
    Column,
    /// A single task's body is sourced from the file.
    Task,
    /// A plain include.
    Regular,
}

impl std::fmt::Display for IncludeFileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Column => "column",
            Self::Task => "task",
            Self::Regular => "regular",
        })
    }
}

/// One include reference that now points at a different file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchedInclude {
    /// Path the reference pointed at before the change.
    pub old_path: String,
    /// Path the reference points at now.
    pub new_path: String,
    /// Kind of include being switched.
    pub include_type: IncludeFileType,
}

/// What changed, as reported by the external analyzer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangeAnalysis {
    /// The primary document's content changed.
    pub has_main_content_change: bool,
    /// The primary document's board structure changed.
    pub has_main_structure_change: bool,
    /// At least one include file's content changed.
    pub has_include_content_change: bool,
    /// At least one include reference was switched.
    pub has_switched_includes: bool,
    /// The switched references.
    pub switched_includes: Vec<SwitchedInclude>,
    /// Relative paths of includes whose content changed.
    pub changed_includes: Vec<String>,
    /// The change is the echo of a save the user initiated.
    pub is_legitimate_save: bool,
}

impl ChangeAnalysis {
    /// Whether this change could overwrite unsaved edits: an external
    /// structural change that is not a save echo.
    pub fn is_potential_conflict(&self) -> bool {
        !self.is_legitimate_save && self.has_main_structure_change
    }

    /// Whether any include file is affected.
    pub fn touches_includes(&self) -> bool {
        self.has_include_content_change
            || self.has_switched_includes
            || !self.switched_includes.is_empty()
            || !self.changed_includes.is_empty()
    }
}
