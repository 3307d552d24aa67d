//! Per-machine configuration.

use serde::{Deserialize, Serialize};

/// Default bound on a file machine's transition history.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Settings shared by file and include machines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Maximum number of transition records retained.
    pub max_history: usize,
    /// Roll back to the last snapshot when an include reload fails, and allow
    /// reloads to be forced from any non-terminal state.
    pub auto_rollback: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            auto_rollback: false,
        }
    }
}

impl MachineConfig {
    /// Same settings with automatic rollback enabled.
    pub fn with_auto_rollback(mut self) -> Self {
        self.auto_rollback = true;
        self
    }

    /// Same settings with a different history bound.
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: MachineConfig = serde_yaml::from_str("auto_rollback: true").unwrap();
        assert!(config.auto_rollback);
        assert_eq!(config.max_history, DEFAULT_MAX_HISTORY);
    }
}
