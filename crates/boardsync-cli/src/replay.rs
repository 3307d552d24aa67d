//! # Replay Subcommand
//!
//! Runs a scripted scenario through a fresh [`MainCoordinator`] and prints
//! what happened to every step and the final state of every machine.
//!
//! ## Scenario format
//!
//! ```yaml
//! includes:
//!   - path: backlog.md
//!     type: column
//! steps:
//!   - step: main
//!     op: begin_load
//!   - step: main
//!     op: complete_load
//!   - step: main
//!     op: mark_dirty
//!     kind: content
//!   - step: change
//!     source: file-watcher
//!     main_changed: true
//!     analysis:
//!       hasMainStructureChange: true
//!     resolution: use-remote
//!   - step: include
//!     path: backlog.md
//!     op: confirm_switch
//!     expect_error: true
//! ```
//!
//! A `change` step's conflict handler resolves every dirty file with
//! `resolution` (when given). `fail_phase` makes that phase's callback
//! fail. Steps marked `expect_error` pass only when they fail.
//!
//! The command exits with 0 when every step met its expectation and 1
//! otherwise.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

use boardsync_coordinator::{
    ChangeEvent, ChangeOutcome, CoordinatorConfig, CoordinatorSnapshot, MainCoordinator,
};
use boardsync_core::{
    ChangeAnalysis, ChangeKind, ChangeSource, ConflictResolution, CoordinatorState, FileState,
    IncludeFileState, IncludeFileType, LifecycleError, LifecycleState,
};
use boardsync_state::FileMachine;

/// Arguments for the `boardsync replay` subcommand.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Scenario file (YAML).
    pub scenario: PathBuf,

    /// Output format for the replay report.
    #[arg(long, value_enum, default_value = "text")]
    pub format: ReportFormat,
}

/// Output format for the replay report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable summary.
    Text,
    /// Pretty-printed JSON.
    Json,
}

// ─── Scenario ────────────────────────────────────────────────────────

/// A parsed scenario file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Include files registered before the first step.
    pub includes: Vec<IncludeSpec>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncludeSpec {
    pub path: String,
    #[serde(rename = "type", default = "default_include_type")]
    pub file_type: IncludeFileType,
    /// Defaults to `path`.
    #[serde(default)]
    pub absolute_path: Option<PathBuf>,
}

fn default_include_type() -> IncludeFileType {
    IncludeFileType::Regular
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: StepAction,
    #[serde(default)]
    pub expect_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepAction {
    /// Drive the primary file machine.
    Main(MachineStep),
    /// Drive a registered include machine.
    Include(IncludeStep),
    /// Submit a change request and wait for it.
    Change(ChangeStep),
    Register(IncludeSpec),
    Unregister { path: String },
    /// Move the coordinator directly.
    Transition { to: CoordinatorState },
    ForceReset,
}

/// One file machine operation.
#[derive(Debug, Clone, Deserialize)]
pub struct MachineStep {
    pub op: FileOp,
    #[serde(default)]
    pub kind: Option<ChangeKind>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub resolution: Option<ConflictResolution>,
    /// Snapshot for `save_rollback_point`.
    #[serde(default)]
    pub content: Option<String>,
    /// Failure text for `fail_reload`.
    #[serde(default)]
    pub error: Option<String>,
    /// Argument of `begin_switch`.
    #[serde(default)]
    pub unsaved: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncludeStep {
    pub path: String,
    #[serde(flatten)]
    pub machine: MachineStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOp {
    BeginLoad,
    CompleteLoad,
    BeginSave,
    CompleteSave,
    MarkDirty,
    MarkClean,
    EnterConflict,
    ResolveConflict,
    SaveRollbackPoint,
    Rollback,
    Reset,
    BeginSwitch,
    CancelSwitch,
    ConfirmSwitch,
    CompleteUnload,
    BeginReload,
    CompleteReload,
    FailReload,
    ResetForReuse,
}

impl FileOp {
    fn name(self) -> &'static str {
        match self {
            Self::BeginLoad => "begin_load",
            Self::CompleteLoad => "complete_load",
            Self::BeginSave => "begin_save",
            Self::CompleteSave => "complete_save",
            Self::MarkDirty => "mark_dirty",
            Self::MarkClean => "mark_clean",
            Self::EnterConflict => "enter_conflict",
            Self::ResolveConflict => "resolve_conflict",
            Self::SaveRollbackPoint => "save_rollback_point",
            Self::Rollback => "rollback",
            Self::Reset => "reset",
            Self::BeginSwitch => "begin_switch",
            Self::CancelSwitch => "cancel_switch",
            Self::ConfirmSwitch => "confirm_switch",
            Self::CompleteUnload => "complete_unload",
            Self::BeginReload => "begin_reload",
            Self::CompleteReload => "complete_reload",
            Self::FailReload => "fail_reload",
            Self::ResetForReuse => "reset_for_reuse",
        }
    }
}

/// A change request with canned callbacks.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeStep {
    pub source: ChangeSource,
    #[serde(default)]
    pub main_changed: bool,
    #[serde(default)]
    pub includes_changed: bool,
    #[serde(default)]
    pub includes_switched: bool,
    /// Returned by the analyzer. No analyzer is installed when absent.
    #[serde(default)]
    pub analysis: Option<ChangeAnalysis>,
    /// Applied to every dirty file by the conflict handler.
    #[serde(default)]
    pub resolution: Option<ConflictResolution>,
    /// Phase whose callback fails.
    #[serde(default)]
    pub fail_phase: Option<CoordinatorState>,
}

// ─── Report ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub description: String,
    pub expect_error: bool,
    /// Error text when the step failed.
    pub error: Option<String>,
    /// Present for `change` steps that completed.
    pub outcome: Option<ChangeOutcome>,
    /// Whether the step met its expectation.
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub steps: Vec<StepReport>,
    pub snapshot: CoordinatorSnapshot,
}

impl ReplayReport {
    /// Whether every step met its expectation.
    pub fn passed(&self) -> bool {
        self.steps.iter().all(|step| step.passed)
    }
}

// ─── Execution ───────────────────────────────────────────────────────

/// Execute the replay subcommand.
pub fn run_replay(args: &ReplayArgs, config: &CoordinatorConfig) -> Result<u8> {
    let scenario = load_scenario(&args.scenario)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let report = runtime.block_on(replay(&scenario, config.clone()))?;

    match args.format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Text => print!("{}", render_text(&report)),
    }
    Ok(if report.passed() { 0 } else { 1 })
}

/// Parse a scenario file.
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("invalid scenario {}", path.display()))
}

/// Run `scenario` against a fresh coordinator.
pub async fn replay(scenario: &Scenario, config: CoordinatorConfig) -> Result<ReplayReport> {
    let coordinator = MainCoordinator::new(config)?;
    for include in &scenario.includes {
        register(&coordinator, include);
    }

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let description = describe(&step.action);
        let (error, outcome) = match run_step(&coordinator, &step.action).await {
            Ok(outcome) => (None, outcome),
            Err(err) => (Some(format!("{err:#}")), None),
        };
        let passed = error.is_some() == step.expect_error;
        if !passed {
            tracing::warn!(index, step = %description, error = ?error, "step did not meet expectation");
        }
        steps.push(StepReport {
            index,
            description,
            expect_error: step.expect_error,
            error,
            outcome,
            passed,
        });
    }

    Ok(ReplayReport {
        steps,
        snapshot: coordinator.snapshot(),
    })
}

fn register(coordinator: &MainCoordinator, include: &IncludeSpec) -> bool {
    let absolute_path = include
        .absolute_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(&include.path));
    coordinator.register_include_file(&include.path, include.file_type, absolute_path)
}

async fn run_step(coordinator: &MainCoordinator, action: &StepAction) -> Result<Option<ChangeOutcome>> {
    match action {
        StepAction::Main(step) => {
            let main = coordinator.main_file();
            let mut machine = main.lock();
            apply_main(&mut machine, step)?;
            Ok(None)
        }
        StepAction::Include(step) => {
            let Some(include) = coordinator.include_file(&step.path) else {
                bail!("include file not registered: {}", step.path);
            };
            let mut machine = include.state_machine.lock();
            apply_include(&mut machine, &step.machine)?;
            Ok(None)
        }
        StepAction::Change(step) => {
            let outcome = coordinator.handle_change(change_event(coordinator, step)).await?;
            Ok(Some(outcome))
        }
        StepAction::Register(include) => {
            if !register(coordinator, include) {
                bail!("include file already registered: {}", include.path);
            }
            Ok(None)
        }
        StepAction::Unregister { path } => {
            if !coordinator.unregister_include_file(path) {
                bail!("include file not registered: {path}");
            }
            Ok(None)
        }
        StepAction::Transition { to } => {
            coordinator.transition(*to, "scenario step")?;
            Ok(None)
        }
        StepAction::ForceReset => {
            coordinator.force_reset();
            Ok(None)
        }
    }
}

/// Operations shared by both machine kinds. Returns `None` for
/// include-only operations.
fn apply_common<S>(machine: &mut FileMachine<S>, step: &MachineStep) -> Option<Result<()>>
where
    S: LifecycleState + From<FileState>,
{
    let result: Result<(), LifecycleError> = match step.op {
        FileOp::BeginLoad => machine.begin_load(step.kind),
        FileOp::CompleteLoad => machine.complete_load(),
        FileOp::BeginSave => machine.begin_save(),
        FileOp::CompleteSave => machine.complete_save(),
        FileOp::MarkDirty => {
            return Some(expect_moved(
                machine.mark_dirty(step.kind.unwrap_or(ChangeKind::Content)),
                step.op,
                machine.state(),
            ));
        }
        FileOp::MarkClean => {
            return Some(expect_moved(machine.mark_clean(), step.op, machine.state()));
        }
        FileOp::EnterConflict => machine.enter_conflict(step.reason.as_deref()),
        FileOp::ResolveConflict => {
            let Some(resolution) = step.resolution else {
                return Some(Err(anyhow::anyhow!("resolve_conflict needs a resolution")));
            };
            machine.resolve_conflict(resolution)
        }
        FileOp::SaveRollbackPoint => {
            machine.save_rollback_point(step.content.clone().unwrap_or_default());
            Ok(())
        }
        FileOp::Rollback => {
            return Some(expect_moved(machine.rollback(), step.op, machine.state()));
        }
        FileOp::Reset => {
            machine.reset();
            Ok(())
        }
        _ => return None,
    };
    Some(result.map_err(Into::into))
}

fn expect_moved<S: LifecycleState>(moved: bool, op: FileOp, state: S) -> Result<()> {
    if !moved {
        bail!("{} had no effect in {state}", op.name());
    }
    Ok(())
}

fn apply_main(machine: &mut FileMachine<FileState>, step: &MachineStep) -> Result<()> {
    match apply_common(machine, step) {
        Some(result) => result,
        None => bail!("{} is only valid for include files", step.op.name()),
    }
}

fn apply_include(machine: &mut FileMachine<IncludeFileState>, step: &MachineStep) -> Result<()> {
    if let Some(result) = apply_common(machine, step) {
        return result;
    }
    let result = match step.op {
        FileOp::BeginSwitch => machine.begin_switch(step.unsaved),
        FileOp::CancelSwitch => machine.cancel_switch(),
        FileOp::ConfirmSwitch => machine.confirm_switch(),
        FileOp::CompleteUnload => machine.complete_unload(),
        FileOp::BeginReload => machine.begin_reload(),
        FileOp::CompleteReload => machine.complete_reload(),
        FileOp::FailReload => {
            machine.fail_reload(step.error.clone().unwrap_or_else(|| "reload failed".into()))
        }
        FileOp::ResetForReuse => {
            machine.reset_for_reuse();
            Ok(())
        }
        other => bail!("unsupported include operation {}", other.name()),
    };
    result.map_err(Into::into)
}

fn change_event(coordinator: &MainCoordinator, step: &ChangeStep) -> ChangeEvent {
    let fail = step.fail_phase;
    let mut event = ChangeEvent::new(step.source)
        .with_main_change(step.main_changed)
        .with_include_changes(step.includes_changed)
        .with_switched_includes(step.includes_switched)
        .on_coordinate_includes(move |_| async move {
            canned_result(fail, CoordinatorState::CoordinatingIncludes)
        })
        .on_update_ui(move || async move { canned_result(fail, CoordinatorState::UpdatingUI) });

    if let Some(analysis) = step.analysis.clone() {
        event = event.on_analyze(move || async move {
            canned_result(fail, CoordinatorState::Analyzing)?;
            Ok(analysis)
        });
    }

    let resolver = coordinator.clone();
    let resolution = step.resolution;
    event.on_conflict(move |_| async move {
        canned_result(fail, CoordinatorState::ConflictResolution)?;
        if let Some(resolution) = resolution {
            resolve_dirty_files(&resolver, resolution)?;
        }
        Ok(())
    })
}

fn canned_result(fail: Option<CoordinatorState>, phase: CoordinatorState) -> Result<()> {
    if fail == Some(phase) {
        bail!("scripted failure");
    }
    Ok(())
}

fn resolve_dirty_files(coordinator: &MainCoordinator, resolution: ConflictResolution) -> Result<()> {
    {
        let main = coordinator.main_file();
        let mut main = main.lock();
        if main.is_dirty() {
            main.enter_conflict(Some("external change over unsaved edits"))?;
            main.resolve_conflict(resolution)?;
        }
    }
    for path in coordinator.include_paths() {
        let Some(include) = coordinator.include_file(&path) else {
            continue;
        };
        let mut machine = include.state_machine.lock();
        if machine.is_dirty() {
            machine.enter_conflict(Some("external change over unsaved edits"))?;
            machine.resolve_conflict(resolution)?;
        }
    }
    Ok(())
}

// ─── Rendering ───────────────────────────────────────────────────────

fn describe(action: &StepAction) -> String {
    match action {
        StepAction::Main(step) => format!("main {}", step.op.name()),
        StepAction::Include(step) => format!("include {} {}", step.path, step.machine.op.name()),
        StepAction::Change(step) => format!("change from {}", step.source),
        StepAction::Register(include) => format!("register {} ({})", include.path, include.file_type),
        StepAction::Unregister { path } => format!("unregister {path}"),
        StepAction::Transition { to } => format!("coordinator -> {to}"),
        StepAction::ForceReset => "force reset".to_string(),
    }
}

/// Human-readable report.
pub fn render_text(report: &ReplayReport) -> String {
    let mut out = String::new();
    for step in &report.steps {
        let mark = if step.passed { "ok" } else { "FAIL" };
        let mut line = format!("[{mark:>4}] {:>3}  {}", step.index + 1, step.description);
        if let Some(outcome) = &step.outcome {
            let phases: Vec<String> = outcome.phases.iter().map(ToString::to_string).collect();
            line.push_str(&format!(": {}", phases.join(" → ")));
            if outcome.conflict {
                line.push_str(" (conflict)");
            }
        }
        if let Some(error) = &step.error {
            let expected = if step.expect_error { "expected error" } else { "error" };
            line.push_str(&format!(": {expected}: {error}"));
        }
        out.push_str(&line);
        out.push('\n');
    }

    let snapshot = &report.snapshot;
    out.push('\n');
    out.push_str(&format!(
        "Coordinator: {} ({} transitions)\n",
        snapshot.coordinator.state,
        snapshot.coordinator.history.len()
    ));
    out.push_str(&format!(
        "Main file:   {} cache {}\n",
        snapshot.main.state, snapshot.main.cache_state
    ));
    for include in &snapshot.includes {
        out.push_str(&format!(
            "Include {} [{}]: {} cache {}\n",
            include.relative_path, include.file_type, include.context.state, include.context.cache_state
        ));
    }
    out
}
