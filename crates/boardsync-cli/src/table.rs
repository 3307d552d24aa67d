//! # Table Subcommand
//!
//! Prints the transition table of one of the lifecycle machines, one state
//! per line with its permitted successors.

use anyhow::Result;
use clap::{Args, ValueEnum};

use boardsync_core::{CoordinatorState, FileState, IncludeFileState, LifecycleState};

/// Arguments for the `boardsync table` subcommand.
#[derive(Args, Debug)]
pub struct TableArgs {
    /// Which machine's table to print.
    #[arg(long, value_enum, default_value = "file")]
    pub machine: MachineKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MachineKind {
    File,
    Include,
    Coordinator,
}

/// Execute the table subcommand.
pub fn run_table(args: &TableArgs) -> Result<u8> {
    print!("{}", render(args.machine));
    Ok(0)
}

pub fn render(machine: MachineKind) -> String {
    match machine {
        MachineKind::File => render_table::<FileState>(),
        MachineKind::Include => render_table::<IncludeFileState>(),
        MachineKind::Coordinator => render_table::<CoordinatorState>(),
    }
}

fn render_table<S: LifecycleState>() -> String {
    let width = S::ALL.iter().map(|s| s.name().len()).max().unwrap_or(0);
    let mut out = String::new();
    for state in S::ALL {
        let successors = state.successors();
        let targets = if successors.is_empty() {
            "(terminal)".to_string()
        } else {
            successors
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(", ")
        };
        out.push_str(&format!("{:<width$} → {targets}\n", state.name()));
    }
    out
}
