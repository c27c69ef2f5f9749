// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tracing subscriber setup for the CLI

use anyhow::{Context, Result};
use std::path::PathBuf;

use chorus_core::domain::coordinator_config::CoordinatorConfigManifest;

pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// `--log-level` / `CHORUS_LOG_LEVEL` first, then `spec.observability.logging.level`.
pub fn resolve_log_level(flag: Option<&str>, config: Option<&CoordinatorConfigManifest>) -> String {
    flag.or_else(|| config.and_then(|c| c.log_level()))
        .unwrap_or(DEFAULT_LOG_LEVEL)
        .to_string()
}

/// Level for this invocation. A config that fails to load falls back to the
/// default here; the command itself reports the load error.
pub fn log_level_for(flag: Option<&str>, config_path: Option<PathBuf>) -> String {
    if flag.is_some() {
        return resolve_log_level(flag, None);
    }
    let config = CoordinatorConfigManifest::load_or_default(config_path).ok();
    resolve_log_level(None, config.as_ref())
}

/// Initialize tracing subscriber for logging
pub fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_with_level(level: &str) -> CoordinatorConfigManifest {
        let yaml = format!(
            "apiVersion: chorus.dev/v1\nkind: CoordinatorConfig\nmetadata:\n  name: t\nspec:\n  observability:\n    logging:\n      level: {level}\n"
        );
        CoordinatorConfigManifest::from_yaml_str(&yaml).unwrap()
    }

    #[test]
    fn test_flag_wins_over_config() {
        let config = manifest_with_level("debug");
        assert_eq!(resolve_log_level(Some("trace"), Some(&config)), "trace");
    }

    #[test]
    fn test_config_level_used_without_flag() {
        let config = manifest_with_level("debug");
        assert_eq!(resolve_log_level(None, Some(&config)), "debug");
    }

    #[test]
    fn test_default_when_nothing_configured() {
        assert_eq!(resolve_log_level(None, None), DEFAULT_LOG_LEVEL);
        let config = CoordinatorConfigManifest::default();
        assert_eq!(resolve_log_level(None, Some(&config)), DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_level_read_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chorus-config.yaml");
        manifest_with_level("error").to_yaml_file(&path).unwrap();

        assert_eq!(log_level_for(None, Some(path.clone())), "error");
        assert_eq!(log_level_for(Some("info"), Some(path)), "info");
    }
}
