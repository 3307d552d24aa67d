//! # Main Coordinator
//!
//! Serializes every change request for one board through a single worker
//! task. Requests arrive on an unbounded FIFO channel; the worker takes the
//! execution lock, runs the pipeline for one request, answers that request's
//! responder and only then pulls the next one.
//!
//! ## Pipeline
//!
//! ```text
//! Stable → DetectingChanges → Analyzing ─┬→ ConflictResolution → Stable
//!                                         ├→ CoordinatingIncludes → UpdatingUI → Stable
//!                                         └→ UpdatingUI → Stable
//! ```
//!
//! The conflict branch is taken when the analysis reports a structural change
//! that is not the echo of a save while the primary file or any include has
//! unsaved edits. The include branch is taken when the request says include
//! content changed or include references were switched.
//!
//! ## Failure
//!
//! An invalid coordinator transition or a failed callback aborts the request.
//! The error is sent to that request's submitter only; the coordinator is
//! forced back to `Stable` (recorded as a forced transition) and the worker
//! continues with the backlog.
//!
//! ## Re-entrancy
//!
//! Callbacks may submit further requests through a cloned coordinator; those
//! are queued behind the running one. A callback that awaits its own nested
//! request never completes, and the backlog stalls until
//! [`MainCoordinator::force_reset`].

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use boardsync_core::{
    ChangeAnalysis, ChangeSource, CoordinatorState, FileState, IncludeFileState, IncludeFileType,
    LifecycleError, LifecycleState, Timestamp, TransitionHistory, TransitionRecord,
};
use boardsync_state::{FileContext, FileStateMachine};

use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::event::ChangeEvent;
use crate::includes::{IncludeFileRef, IncludeRegistry, IncludeSnapshot, SharedFileMachine};

// ─── Context ─────────────────────────────────────────────────────────

/// The request currently being processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveOperation {
    /// Identifier assigned at submission.
    pub request_id: u64,
    /// Where the change came from.
    pub source: ChangeSource,
    /// When the pipeline started.
    pub started_at: Timestamp,
}

/// Coordinator state, current request and transition log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinatorContext {
    /// Current pipeline phase.
    pub state: CoordinatorState,
    /// The request holding the execution lock, if any.
    pub current_operation: Option<ActiveOperation>,
    /// Bounded log of coordinator transitions.
    pub history: TransitionHistory<CoordinatorState>,
}

impl CoordinatorContext {
    fn new(max_history: usize) -> Self {
        Self {
            state: CoordinatorState::Stable,
            current_operation: None,
            history: TransitionHistory::new(max_history),
        }
    }
}

/// Result of one completed change request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeOutcome {
    /// Identifier assigned at submission.
    pub request_id: u64,
    /// The analyzer's report, when an analyzer was supplied.
    pub analysis: Option<ChangeAnalysis>,
    /// The request was routed to conflict resolution.
    pub conflict: bool,
    /// Every state the coordinator entered, in order.
    pub phases: Vec<CoordinatorState>,
}

/// Serializable view of the coordinator and every machine it owns.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorSnapshot {
    pub coordinator: CoordinatorContext,
    /// The primary document's machine.
    pub main: FileContext<FileState>,
    /// Registered includes, sorted by relative path.
    pub includes: Vec<IncludeSnapshot>,
}

// ─── Pending result ──────────────────────────────────────────────────

type Responder = oneshot::Sender<Result<ChangeOutcome, CoordinatorError>>;

/// Deferred result of a submitted change request.
///
/// Resolves once the worker has finished this particular request. Resolves
/// to [`CoordinatorError::Abandoned`] when the request was discarded by
/// [`MainCoordinator::force_reset`].
#[derive(Debug)]
#[must_use = "a change request's result is only observable by awaiting it"]
pub struct PendingChange {
    request_id: u64,
    receiver: oneshot::Receiver<Result<ChangeOutcome, CoordinatorError>>,
}

impl PendingChange {
    /// Identifier assigned at submission.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }
}

impl Future for PendingChange {
    type Output = Result<ChangeOutcome, CoordinatorError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let request_id = self.request_id;
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| {
                received.unwrap_or_else(|_| Err(CoordinatorError::Abandoned { request_id }))
            })
    }
}

// ─── Shared core ─────────────────────────────────────────────────────

struct QueuedChange {
    request_id: u64,
    event: ChangeEvent,
    responder: Responder,
}

struct CoordinatorCore {
    config: CoordinatorConfig,
    context: Mutex<CoordinatorContext>,
    main_file: SharedFileMachine,
    includes: IncludeRegistry,
    /// Held for the whole of one pipeline run.
    execution: tokio::sync::Mutex<()>,
    /// Submitted and not yet answered, including the running request.
    pending: AtomicUsize,
    /// Bumped by every reset; a worker only settles requests of its own
    /// generation.
    generation: Mutex<u64>,
    next_request_id: AtomicU64,
}

impl CoordinatorCore {
    fn new(config: CoordinatorConfig) -> Self {
        let main = FileStateMachine::new(config.machine.clone()).with_label("main");
        Self {
            context: Mutex::new(CoordinatorContext::new(config.max_history)),
            main_file: Arc::new(Mutex::new(main)),
            includes: IncludeRegistry::default(),
            execution: tokio::sync::Mutex::new(()),
            pending: AtomicUsize::new(0),
            generation: Mutex::new(0),
            next_request_id: AtomicU64::new(1),
            config,
        }
    }

    fn transition(&self, to: CoordinatorState, reason: &str) -> Result<(), CoordinatorError> {
        let mut context = self.context.lock();
        let from = context.state;
        if !from.can_transition_to(to) {
            return Err(LifecycleError::invalid_transition(from, to).into());
        }
        context.state = to;
        context
            .history
            .push(TransitionRecord::new(from, to, Some(reason.to_string()), None));
        tracing::debug!(from = %from, to = %to, reason, "coordinator transition");
        Ok(())
    }

    fn advance(
        &self,
        phases: &mut Vec<CoordinatorState>,
        to: CoordinatorState,
        reason: &str,
    ) -> Result<(), CoordinatorError> {
        self.transition(to, reason)?;
        phases.push(to);
        Ok(())
    }

    /// Put the coordinator in `Stable` without consulting the table.
    fn force_stable(&self, reason: &str) {
        let mut context = self.context.lock();
        let from = context.state;
        if from == CoordinatorState::Stable {
            return;
        }
        context.state = CoordinatorState::Stable;
        context.history.push(TransitionRecord::forced(
            from,
            CoordinatorState::Stable,
            reason,
        ));
        tracing::warn!(from = %from, reason, "coordinator forced to STABLE");
    }

    fn has_unsaved_changes(&self) -> bool {
        self.main_file.lock().is_dirty() || self.includes.any_dirty()
    }

    fn release_pending(&self) {
        let _ = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn current_generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Answer a request on behalf of the worker started in `generation`.
    ///
    /// A worker left behind by [`MainCoordinator::force_reset`] neither
    /// touches the pending count nor answers; its submitter sees
    /// `Abandoned` once the responder drops.
    fn finish_request(
        &self,
        generation: u64,
        request_id: u64,
        responder: Responder,
        result: Result<ChangeOutcome, CoordinatorError>,
    ) {
        let current = self.generation.lock();
        if *current != generation {
            tracing::debug!(request_id, generation, "stale worker dropped its result");
            return;
        }
        self.release_pending();
        if responder.send(result).is_err() {
            tracing::debug!(request_id, "submitter dropped its pending result");
        }
    }

    async fn run_pipeline(
        &self,
        request_id: u64,
        event: ChangeEvent,
    ) -> Result<ChangeOutcome, CoordinatorError> {
        let touches_includes = event.touches_includes();
        let ChangeEvent {
            source,
            main_changed,
            on_analyze,
            on_coordinate_includes,
            on_update_ui,
            on_conflict,
            ..
        } = event;

        tracing::debug!(
            request_id,
            source = %source,
            main_changed,
            touches_includes,
            "change request started"
        );

        let mut phases = Vec::new();
        let mut analysis = None;

        self.advance(
            &mut phases,
            CoordinatorState::DetectingChanges,
            &format!("change from {source}"),
        )?;
        self.advance(&mut phases, CoordinatorState::Analyzing, "analyzing change")?;
        if let Some(analyze) = on_analyze {
            let report = analyze()
                .await
                .map_err(|err| CoordinatorError::callback(CoordinatorState::Analyzing, err))?;
            analysis = Some(report);
        }

        if let Some(report) = analysis.as_ref() {
            if report.is_potential_conflict() && self.has_unsaved_changes() {
                self.advance(
                    &mut phases,
                    CoordinatorState::ConflictResolution,
                    "structural change over unsaved edits",
                )?;
                if let Some(resolve) = on_conflict {
                    resolve(report.clone()).await.map_err(|err| {
                        CoordinatorError::callback(CoordinatorState::ConflictResolution, err)
                    })?;
                }
                self.advance(&mut phases, CoordinatorState::Stable, "conflict handled")?;
                return Ok(ChangeOutcome {
                    request_id,
                    analysis,
                    conflict: true,
                    phases,
                });
            }
        }

        if touches_includes {
            self.advance(
                &mut phases,
                CoordinatorState::CoordinatingIncludes,
                "coordinating includes",
            )?;
            if let (Some(coordinate), Some(report)) = (on_coordinate_includes, analysis.as_ref()) {
                coordinate(report.clone()).await.map_err(|err| {
                    CoordinatorError::callback(CoordinatorState::CoordinatingIncludes, err)
                })?;
            }
        }

        self.advance(&mut phases, CoordinatorState::UpdatingUI, "refreshing board")?;
        if let Some(refresh) = on_update_ui {
            refresh()
                .await
                .map_err(|err| CoordinatorError::callback(CoordinatorState::UpdatingUI, err))?;
        }
        self.advance(&mut phases, CoordinatorState::Stable, "change applied")?;

        Ok(ChangeOutcome {
            request_id,
            analysis,
            conflict: false,
            phases,
        })
    }
}

// ─── Worker ──────────────────────────────────────────────────────────

struct Worker {
    sender: mpsc::UnboundedSender<QueuedChange>,
    task: JoinHandle<()>,
}

impl Worker {
    fn spawn(runtime: &Handle, core: Arc<CoordinatorCore>, generation: u64) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let task = runtime.spawn(run_worker(core, generation, receiver));
        Self { sender, task }
    }
}

async fn run_worker(
    core: Arc<CoordinatorCore>,
    generation: u64,
    mut receiver: mpsc::UnboundedReceiver<QueuedChange>,
) {
    while let Some(QueuedChange {
        request_id,
        event,
        responder,
    }) = receiver.recv().await
    {
        let source = event.source;
        let result = {
            let _running = core.execution.lock().await;
            let started_at = Timestamp::now();
            core.context.lock().current_operation = Some(ActiveOperation {
                request_id,
                source,
                started_at,
            });

            let result = core.run_pipeline(request_id, event).await;
            if core.current_generation() != generation {
                // Reset already restored the coordinator.
                return;
            }
            if let Err(err) = &result {
                tracing::warn!(request_id, error = %err, "change request failed");
                core.force_stable("pipeline failed");
            }

            core.context.lock().current_operation = None;
            tracing::debug!(
                request_id,
                elapsed_ms = Timestamp::now().since(&started_at).num_milliseconds(),
                ok = result.is_ok(),
                "change request finished"
            );
            result
        };

        core.finish_request(generation, request_id, responder, result);
    }
}

// ─── Coordinator ─────────────────────────────────────────────────────

/// Owner of the primary file machine and the include registry, and the
/// single entry point for change requests.
///
/// Cloning is cheap; clones share the same worker and machines.
#[derive(Clone)]
pub struct MainCoordinator {
    core: Arc<CoordinatorCore>,
    worker: Arc<Mutex<Worker>>,
    runtime: Handle,
}

impl std::fmt::Debug for MainCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainCoordinator")
            .field("state", &self.state())
            .field("includes", &self.core.includes.len())
            .field("pending", &self.pending_requests())
            .finish()
    }
}

impl MainCoordinator {
    /// Start a coordinator on the current Tokio runtime.
    pub fn new(config: CoordinatorConfig) -> Result<Self, CoordinatorError> {
        let runtime = Handle::try_current().map_err(|_| CoordinatorError::NoRuntime)?;
        Ok(Self::with_handle(config, runtime))
    }

    /// Start a coordinator whose worker runs on `runtime`.
    pub fn with_handle(config: CoordinatorConfig, runtime: Handle) -> Self {
        let core = Arc::new(CoordinatorCore::new(config));
        let worker = Worker::spawn(&runtime, Arc::clone(&core), 0);
        Self {
            core,
            worker: Arc::new(Mutex::new(worker)),
            runtime,
        }
    }

    // ── Change requests ──────────────────────────────────────────────

    /// Queue a change request and return its deferred result.
    ///
    /// The request's position in the backlog is fixed when this returns,
    /// whether or not the result is ever awaited.
    pub fn submit(&self, event: ChangeEvent) -> Result<PendingChange, CoordinatorError> {
        let request_id = self.core.next_request_id.fetch_add(1, Ordering::SeqCst);
        let (responder, receiver) = oneshot::channel();
        let queued = QueuedChange {
            request_id,
            event,
            responder,
        };

        let worker = self.worker.lock();
        self.core.pending.fetch_add(1, Ordering::SeqCst);
        if worker.sender.send(queued).is_err() {
            self.core.release_pending();
            return Err(CoordinatorError::Shutdown);
        }
        Ok(PendingChange {
            request_id,
            receiver,
        })
    }

    /// Submit a change request and wait for its pipeline to finish.
    pub async fn handle_change(&self, event: ChangeEvent) -> Result<ChangeOutcome, CoordinatorError> {
        self.submit(event)?.await
    }

    /// Move the coordinator directly, subject to its transition table.
    ///
    /// Lets a conflict UI park the coordinator in `ConflictResolution`
    /// outside a pipeline; the next request then starts from there. Calling
    /// this while a request is running makes that request's next phase
    /// transition fail.
    pub fn transition(&self, to: CoordinatorState, reason: &str) -> Result<(), CoordinatorError> {
        self.core.transition(to, reason)
    }

    // ── Include registry ─────────────────────────────────────────────

    /// Register an include file. Returns `false`, leaving the existing entry
    /// untouched, when `relative_path` is already registered.
    pub fn register_include_file(
        &self,
        relative_path: &str,
        file_type: IncludeFileType,
        absolute_path: impl Into<PathBuf>,
    ) -> bool {
        let absolute_path = absolute_path.into();
        let inserted = self.core.includes.register(
            relative_path,
            file_type,
            absolute_path.clone(),
            self.core.config.machine.clone(),
        );
        if inserted {
            tracing::info!(
                path = relative_path,
                file_type = %file_type,
                absolute_path = %absolute_path.display(),
                "include file registered"
            );
        }
        inserted
    }

    /// Remove an include file, completing an in-progress unload first.
    ///
    /// Disposal failures are logged and otherwise ignored. Returns whether
    /// the path was registered.
    pub fn unregister_include_file(&self, relative_path: &str) -> bool {
        let Some(entry) = self.core.includes.remove(relative_path) else {
            return false;
        };
        let mut machine = entry.state_machine.lock();
        if machine.state() == IncludeFileState::Unloading {
            if let Err(err) = machine.complete_unload() {
                tracing::warn!(path = relative_path, error = %err, "include disposal failed");
            }
        }
        tracing::info!(
            path = relative_path,
            state = %machine.state(),
            "include file unregistered"
        );
        true
    }

    /// The registered include at `relative_path`.
    pub fn include_file(&self, relative_path: &str) -> Option<IncludeFileRef> {
        self.core.includes.get(relative_path)
    }

    /// Registered include paths in sorted order.
    pub fn include_paths(&self) -> Vec<String> {
        self.core.includes.paths()
    }

    /// Shared handle to the primary document's machine.
    pub fn main_file(&self) -> SharedFileMachine {
        Arc::clone(&self.core.main_file)
    }

    // ── Observability ────────────────────────────────────────────────

    /// Current pipeline phase.
    pub fn state(&self) -> CoordinatorState {
        self.core.context.lock().state
    }

    /// Whether no pipeline phase is in progress.
    pub fn is_stable(&self) -> bool {
        self.state() == CoordinatorState::Stable
    }

    /// Copy of the coordinator's transition log.
    pub fn history(&self) -> TransitionHistory<CoordinatorState> {
        self.core.context.lock().history.clone()
    }

    /// Copy of the full coordinator context.
    pub fn context(&self) -> CoordinatorContext {
        self.core.context.lock().clone()
    }

    /// Whether a pipeline currently holds the execution lock.
    pub fn is_processing(&self) -> bool {
        self.core.execution.try_lock().is_err()
    }

    /// Requests submitted and not yet answered, the running one included.
    pub fn pending_requests(&self) -> usize {
        self.core.pending.load(Ordering::SeqCst)
    }

    /// Whether the primary file or any include has unsaved edits.
    pub fn has_unsaved_changes(&self) -> bool {
        self.core.has_unsaved_changes()
    }

    /// Configuration the coordinator was started with.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.core.config
    }

    /// Point-in-time view of the coordinator and every machine it owns.
    ///
    /// Each machine is locked separately, so the view is not atomic across
    /// machines while a pipeline is running.
    pub fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            coordinator: self.context(),
            main: self.core.main_file.lock().snapshot(),
            includes: self.core.includes.snapshot(),
        }
    }

    // ── Recovery ─────────────────────────────────────────────────────

    /// Emergency recovery.
    ///
    /// Aborts the running pipeline, discards the backlog (their submitters
    /// observe [`CoordinatorError::Abandoned`]), forces the coordinator to
    /// `Stable`, resets the primary file machine and starts a new worker.
    /// Include machines are left as they are.
    pub fn force_reset(&self) {
        let abandoned = {
            let mut worker = self.worker.lock();
            worker.task.abort();
            let (generation, abandoned) = {
                let mut generation = self.core.generation.lock();
                *generation += 1;
                (*generation, self.core.pending.swap(0, Ordering::SeqCst))
            };
            *worker = Worker::spawn(&self.runtime, Arc::clone(&self.core), generation);
            abandoned
        };

        self.core.force_stable("force reset");
        self.core.context.lock().current_operation = None;
        self.core.main_file.lock().reset();
        tracing::info!(abandoned, "coordinator force reset");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    use boardsync_core::{ChangeKind, ConflictResolution};

    fn coordinator() -> MainCoordinator {
        MainCoordinator::new(CoordinatorConfig::default()).unwrap()
    }

    fn structural_change() -> ChangeAnalysis {
        ChangeAnalysis {
            has_main_structure_change: true,
            ..Default::default()
        }
    }

    fn load_main(coordinator: &MainCoordinator) {
        let main = coordinator.main_file();
        let mut main = main.lock();
        main.begin_load(None).unwrap();
        main.complete_load().unwrap();
    }

    fn flag() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    // ── Example scenarios ────────────────────────────────────────────

    #[tokio::test]
    async fn test_structural_change_without_dirty_files_runs_all_phases() {
        let coordinator = coordinator();
        load_main(&coordinator);
        let conflict_called = flag();
        let ui_called = flag();

        let seen_conflict = Arc::clone(&conflict_called);
        let seen_ui = Arc::clone(&ui_called);
        let event = ChangeEvent::new(ChangeSource::FileWatcher)
            .with_main_change(true)
            .with_include_changes(true)
            .on_analyze(|| async { Ok(structural_change()) })
            .on_conflict(move |_| async move {
                seen_conflict.store(true, Ordering::SeqCst);
                Ok(())
            })
            .on_update_ui(move || async move {
                seen_ui.store(true, Ordering::SeqCst);
                Ok(())
            });

        let outcome = coordinator.handle_change(event).await.unwrap();
        assert!(!outcome.conflict);
        assert_eq!(
            outcome.phases,
            vec![
                CoordinatorState::DetectingChanges,
                CoordinatorState::Analyzing,
                CoordinatorState::CoordinatingIncludes,
                CoordinatorState::UpdatingUI,
                CoordinatorState::Stable,
            ]
        );
        assert!(!conflict_called.load(Ordering::SeqCst));
        assert!(ui_called.load(Ordering::SeqCst));
        assert!(coordinator.is_stable());
        assert_eq!(coordinator.history().len(), 5);
    }

    #[tokio::test]
    async fn test_structural_change_over_dirty_main_routes_to_conflict() {
        let coordinator = coordinator();
        load_main(&coordinator);
        assert!(coordinator.main_file().lock().mark_dirty(ChangeKind::Content));

        let conflicts = Arc::new(AtomicUsize::new(0));
        let ui_called = flag();
        let coordinate_called = flag();
        let main = coordinator.main_file();

        let seen_conflicts = Arc::clone(&conflicts);
        let seen_ui = Arc::clone(&ui_called);
        let seen_coordinate = Arc::clone(&coordinate_called);
        let event = ChangeEvent::new(ChangeSource::FileWatcher)
            .with_main_change(true)
            .with_include_changes(true)
            .on_analyze(|| async { Ok(structural_change()) })
            .on_conflict(move |analysis| async move {
                assert!(analysis.has_main_structure_change);
                seen_conflicts.fetch_add(1, Ordering::SeqCst);
                let mut main = main.lock();
                main.enter_conflict(Some("external edit"))?;
                main.resolve_conflict(ConflictResolution::UseRemote)?;
                Ok(())
            })
            .on_coordinate_includes(move |_| async move {
                seen_coordinate.store(true, Ordering::SeqCst);
                Ok(())
            })
            .on_update_ui(move || async move {
                seen_ui.store(true, Ordering::SeqCst);
                Ok(())
            });

        let outcome = coordinator.handle_change(event).await.unwrap();
        assert!(outcome.conflict);
        assert_eq!(
            outcome.phases,
            vec![
                CoordinatorState::DetectingChanges,
                CoordinatorState::Analyzing,
                CoordinatorState::ConflictResolution,
                CoordinatorState::Stable,
            ]
        );
        assert_eq!(conflicts.load(Ordering::SeqCst), 1);
        assert!(!ui_called.load(Ordering::SeqCst));
        assert!(!coordinate_called.load(Ordering::SeqCst));
        assert!(coordinator.main_file().lock().is_stable());
        assert!(coordinator.is_stable());
    }

    // ── Conflict rule ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_dirty_include_also_triggers_conflict() {
        let coordinator = coordinator();
        coordinator.register_include_file("backlog.md", IncludeFileType::Column, "/b/backlog.md");
        {
            let include = coordinator.include_file("backlog.md").unwrap();
            let mut machine = include.state_machine.lock();
            machine.begin_load(None).unwrap();
            machine.complete_load().unwrap();
            machine.mark_dirty(ChangeKind::Content);
        }
        assert!(coordinator.has_unsaved_changes());

        let event = ChangeEvent::new(ChangeSource::FileWatcher)
            .on_analyze(|| async { Ok(structural_change()) });
        let outcome = coordinator.handle_change(event).await.unwrap();
        assert!(outcome.conflict);
    }

    #[tokio::test]
    async fn test_legitimate_save_never_conflicts() {
        let coordinator = coordinator();
        load_main(&coordinator);
        coordinator.main_file().lock().mark_dirty(ChangeKind::Structure);

        let event = ChangeEvent::new(ChangeSource::Save).on_analyze(|| async {
            Ok(ChangeAnalysis {
                has_main_structure_change: true,
                is_legitimate_save: true,
                ..Default::default()
            })
        });
        let outcome = coordinator.handle_change(event).await.unwrap();
        assert!(!outcome.conflict);
        assert_eq!(
            outcome.phases,
            vec![
                CoordinatorState::DetectingChanges,
                CoordinatorState::Analyzing,
                CoordinatorState::UpdatingUI,
                CoordinatorState::Stable,
            ]
        );
    }

    #[tokio::test]
    async fn test_without_analyzer_there_is_no_conflict_check() {
        let coordinator = coordinator();
        load_main(&coordinator);
        coordinator.main_file().lock().mark_dirty(ChangeKind::Content);
        let coordinate_called = flag();
        let seen = Arc::clone(&coordinate_called);

        let event = ChangeEvent::new(ChangeSource::IncludeSwitch)
            .with_switched_includes(true)
            .on_coordinate_includes(move |_| async move {
                seen.store(true, Ordering::SeqCst);
                Ok(())
            });
        let outcome = coordinator.handle_change(event).await.unwrap();
        assert!(!outcome.conflict);
        assert!(outcome.analysis.is_none());
        assert!(outcome.phases.contains(&CoordinatorState::CoordinatingIncludes));
        assert!(!coordinate_called.load(Ordering::SeqCst));
    }

    // ── Failure handling ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_callback_failure_reaches_submitter_and_recovers() {
        let coordinator = coordinator();
        let event = ChangeEvent::new(ChangeSource::UserEdit)
            .on_analyze(|| async { Err(anyhow::anyhow!("parser exploded")) });

        let err = coordinator.handle_change(event).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Callback {
                phase: CoordinatorState::Analyzing,
                ..
            }
        ));
        assert!(coordinator.is_stable());
        assert!(coordinator.context().current_operation.is_none());
        let last = coordinator.history().latest().cloned().unwrap();
        assert!(last.forced);
        assert_eq!(last.from, CoordinatorState::Analyzing);

        let outcome = coordinator
            .handle_change(ChangeEvent::new(ChangeSource::UserEdit))
            .await
            .unwrap();
        assert_eq!(outcome.phases.last(), Some(&CoordinatorState::Stable));
    }

    #[tokio::test]
    async fn test_invalid_transition_reaches_submitter() {
        let coordinator = coordinator();
        let meddler = coordinator.clone();
        let event = ChangeEvent::new(ChangeSource::UserEdit).on_analyze(move || async move {
            meddler.transition(CoordinatorState::UpdatingUI, "jumped ahead")?;
            Ok(ChangeAnalysis::default())
        });

        let err = coordinator.handle_change(event).await.unwrap_err();
        assert!(err.is_invalid_transition());
        assert_eq!(err.to_string(), "invalid transition: UPDATING_UI -> UPDATING_UI");
        assert!(coordinator.is_stable());
    }

    #[tokio::test]
    async fn test_manual_transition_follows_table() {
        let coordinator = coordinator();
        let err = coordinator
            .transition(CoordinatorState::UpdatingUI, "skip")
            .unwrap_err();
        assert!(err.is_invalid_transition());

        coordinator
            .transition(CoordinatorState::ConflictResolution, "user opened conflict dialog")
            .unwrap();
        let outcome = coordinator
            .handle_change(ChangeEvent::new(ChangeSource::ConflictResolution))
            .await
            .unwrap();
        assert_eq!(outcome.phases[0], CoordinatorState::DetectingChanges);
        assert!(coordinator.is_stable());
    }

    // ── Registry ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_register_include_is_idempotent() {
        let coordinator = coordinator();
        assert!(coordinator.register_include_file("a.md", IncludeFileType::Task, "/b/a.md"));
        assert!(!coordinator.register_include_file("a.md", IncludeFileType::Column, "/c/a.md"));
        let entry = coordinator.include_file("a.md").unwrap();
        assert_eq!(entry.file_type, IncludeFileType::Task);
        assert_eq!(entry.absolute_path, PathBuf::from("/b/a.md"));
        assert_eq!(coordinator.include_paths(), vec!["a.md".to_string()]);
    }

    #[tokio::test]
    async fn test_unregister_completes_pending_unload() {
        let coordinator = coordinator();
        coordinator.register_include_file("old.md", IncludeFileType::Column, "/b/old.md");
        let entry = coordinator.include_file("old.md").unwrap();
        {
            let mut machine = entry.state_machine.lock();
            machine.begin_load(None).unwrap();
            machine.complete_load().unwrap();
            machine.begin_switch(false).unwrap();
            machine.confirm_switch().unwrap();
            assert_eq!(machine.state(), IncludeFileState::Unloading);
        }

        assert!(coordinator.unregister_include_file("old.md"));
        assert_eq!(entry.state(), IncludeFileState::Disposed);
        assert!(coordinator.include_file("old.md").is_none());
        assert!(!coordinator.unregister_include_file("old.md"));
    }

    #[tokio::test]
    async fn test_unregister_leaves_other_states_alone() {
        let coordinator = coordinator();
        coordinator.register_include_file("x.md", IncludeFileType::Regular, "/b/x.md");
        let entry = coordinator.include_file("x.md").unwrap();
        assert!(coordinator.unregister_include_file("x.md"));
        assert_eq!(entry.state(), IncludeFileState::Idle);
    }

    // ── Observability ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_snapshot_serializes() {
        let coordinator = coordinator();
        coordinator.register_include_file("a.md", IncludeFileType::Column, "/b/a.md");
        coordinator
            .handle_change(ChangeEvent::new(ChangeSource::Undo))
            .await
            .unwrap();

        let json = serde_json::to_value(coordinator.snapshot()).unwrap();
        assert_eq!(json["coordinator"]["state"], "STABLE");
        assert_eq!(json["main"]["state"], "IDLE");
        assert_eq!(json["includes"][0]["relative_path"], "a.md");
        assert_eq!(json["includes"][0]["file_type"], "column");
        assert_eq!(coordinator.pending_requests(), 0);
        assert!(!coordinator.is_processing());
    }

    #[tokio::test]
    async fn test_coordinator_history_is_bounded() {
        let config = CoordinatorConfig {
            max_history: 3,
            ..Default::default()
        };
        let coordinator = MainCoordinator::new(config).unwrap();
        for _ in 0..2 {
            coordinator
                .handle_change(ChangeEvent::new(ChangeSource::Redo))
                .await
                .unwrap();
        }
        let history = coordinator.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history.latest().unwrap().to, CoordinatorState::Stable);
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        assert!(matches!(
            MainCoordinator::new(CoordinatorConfig::default()),
            Err(CoordinatorError::NoRuntime)
        ));
    }
}
