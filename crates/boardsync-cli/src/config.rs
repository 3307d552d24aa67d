//! # Configuration Loading
//!
//! The coordinator configuration comes from an optional YAML file (the
//! global `--config` flag), then environment overrides:
//!
//! - `BOARDSYNC_MAX_HISTORY` bounds the coordinator history and every file
//!   machine's history.
//! - `BOARDSYNC_AUTO_ROLLBACK` (`true`/`false`, `1`/`0`) toggles the
//!   include reload rollback policy.
//!
//! Missing fields in the file keep their defaults.

use std::path::Path;

use anyhow::{bail, Context, Result};

use boardsync_coordinator::CoordinatorConfig;

pub const ENV_MAX_HISTORY: &str = "BOARDSYNC_MAX_HISTORY";
pub const ENV_AUTO_ROLLBACK: &str = "BOARDSYNC_AUTO_ROLLBACK";

/// Load the configuration from `path` (if any) and the process environment.
pub fn load_config(path: Option<&Path>) -> Result<CoordinatorConfig> {
    let config = match path {
        Some(path) => read_config_file(path)?,
        None => CoordinatorConfig::default(),
    };
    apply_env_overrides(config, |key| std::env::var(key).ok())
}

fn read_config_file(path: &Path) -> Result<CoordinatorConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(CoordinatorConfig::default());
    }
    serde_yaml::from_str(&content)
        .with_context(|| format!("invalid config file {}", path.display()))
}

/// Apply overrides looked up through `lookup`.
pub fn apply_env_overrides<F>(mut config: CoordinatorConfig, lookup: F) -> Result<CoordinatorConfig>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(ENV_MAX_HISTORY) {
        let max_history: usize = raw
            .trim()
            .parse()
            .with_context(|| format!("{ENV_MAX_HISTORY} must be a non-negative integer, got {raw:?}"))?;
        config.max_history = max_history;
        config.machine.max_history = max_history;
    }
    if let Some(raw) = lookup(ENV_AUTO_ROLLBACK) {
        config.machine.auto_rollback = parse_flag(ENV_AUTO_ROLLBACK, &raw)?;
    }
    tracing::debug!(
        max_history = config.max_history,
        machine_max_history = config.machine.max_history,
        auto_rollback = config.machine.auto_rollback,
        "configuration loaded"
    );
    Ok(config)
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{key} must be true or false, got {raw:?}"),
    }
}
