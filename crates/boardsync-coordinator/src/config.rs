//! Coordinator configuration.

use serde::{Deserialize, Serialize};

use boardsync_core::MachineConfig;

/// Default bound on the coordinator's own transition history.
pub const DEFAULT_COORDINATOR_HISTORY: usize = 100;

/// Settings for a [`MainCoordinator`](crate::MainCoordinator) and the file
/// machines it creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Maximum number of coordinator transition records retained.
    pub max_history: usize,
    /// Configuration handed to the primary and every include machine.
    pub machine: MachineConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_COORDINATOR_HISTORY,
            machine: MachineConfig::default(),
        }
    }
}
