//! # Change Events
//!
//! A [`ChangeEvent`] describes one change request: where it came from, what
//! it claims to touch, and the phase callbacks that do the actual work. The
//! coordinator never inspects file content itself; it only calls these
//! callbacks in pipeline order.
//!
//! ```no_run
//! use boardsync_core::{ChangeAnalysis, ChangeSource};
//! use boardsync_coordinator::ChangeEvent;
//!
//! let event = ChangeEvent::new(ChangeSource::FileWatcher)
//!     .with_main_change(true)
//!     .on_analyze(|| async {
//!         Ok(ChangeAnalysis {
//!             has_main_content_change: true,
//!             ..Default::default()
//!         })
//!     })
//!     .on_update_ui(|| async { Ok(()) });
//! # drop(event);
//! ```

use std::future::Future;
use std::pin::Pin;

use boardsync_core::{ChangeAnalysis, ChangeSource};

/// Boxed future returned by a phase callback.
pub type PhaseFuture<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'static>>;

pub(crate) type AnalyzeCallback = Box<dyn FnOnce() -> PhaseFuture<ChangeAnalysis> + Send>;
pub(crate) type AnalysisCallback = Box<dyn FnOnce(ChangeAnalysis) -> PhaseFuture<()> + Send>;
pub(crate) type RefreshCallback = Box<dyn FnOnce() -> PhaseFuture<()> + Send>;

/// Descriptor of one change request.
pub struct ChangeEvent {
    /// Which part of the editor raised the change.
    pub source: ChangeSource,
    /// The primary document changed.
    pub main_changed: bool,
    /// Content of one or more include files changed.
    pub includes_changed: bool,
    /// One or more include references were switched.
    pub includes_switched: bool,
    pub(crate) on_analyze: Option<AnalyzeCallback>,
    pub(crate) on_coordinate_includes: Option<AnalysisCallback>,
    pub(crate) on_update_ui: Option<RefreshCallback>,
    pub(crate) on_conflict: Option<AnalysisCallback>,
}

impl ChangeEvent {
    /// An event with no flags and no callbacks.
    pub fn new(source: ChangeSource) -> Self {
        Self {
            source,
            main_changed: false,
            includes_changed: false,
            includes_switched: false,
            on_analyze: None,
            on_coordinate_includes: None,
            on_update_ui: None,
            on_conflict: None,
        }
    }

    /// Set whether the primary document changed.
    pub fn with_main_change(mut self, changed: bool) -> Self {
        self.main_changed = changed;
        self
    }

    /// Set whether include content changed.
    pub fn with_include_changes(mut self, changed: bool) -> Self {
        self.includes_changed = changed;
        self
    }

    /// Set whether include references were switched.
    pub fn with_switched_includes(mut self, switched: bool) -> Self {
        self.includes_switched = switched;
        self
    }

    /// Analyzer run during `Analyzing`.
    pub fn on_analyze<F, Fut>(mut self, callback: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<ChangeAnalysis>> + Send + 'static,
    {
        self.on_analyze = Some(Box::new(move || -> PhaseFuture<ChangeAnalysis> {
            Box::pin(callback())
        }));
        self
    }

    /// Include orchestration run during `CoordinatingIncludes`. Only invoked
    /// when an analysis was produced.
    pub fn on_coordinate_includes<F, Fut>(mut self, callback: F) -> Self
    where
        F: FnOnce(ChangeAnalysis) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_coordinate_includes = Some(Box::new(
            move |analysis: ChangeAnalysis| -> PhaseFuture<()> { Box::pin(callback(analysis)) },
        ));
        self
    }

    /// Board refresh run during `UpdatingUI`.
    pub fn on_update_ui<F, Fut>(mut self, callback: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_update_ui = Some(Box::new(move || -> PhaseFuture<()> {
            Box::pin(callback())
        }));
        self
    }

    /// Conflict handler run during `ConflictResolution`.
    pub fn on_conflict<F, Fut>(mut self, callback: F) -> Self
    where
        F: FnOnce(ChangeAnalysis) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_conflict = Some(Box::new(
            move |analysis: ChangeAnalysis| -> PhaseFuture<()> { Box::pin(callback(analysis)) },
        ));
        self
    }

    /// Whether the event asks for the include coordination phase.
    pub fn touches_includes(&self) -> bool {
        self.includes_changed || self.includes_switched
    }
}

impl std::fmt::Debug for ChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeEvent")
            .field("source", &self.source)
            .field("main_changed", &self.main_changed)
            .field("includes_changed", &self.includes_changed)
            .field("includes_switched", &self.includes_switched)
            .field("on_analyze", &self.on_analyze.is_some())
            .field("on_coordinate_includes", &self.on_coordinate_includes.is_some())
            .field("on_update_ui", &self.on_update_ui.is_some())
            .field("on_conflict", &self.on_conflict.is_some())
            .finish()
    }
}
