// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedded coordinator bootstrap
//!
//! Builds a [`Coordinator`] in-process from the discovered configuration,
//! picks the audit-log backend and registers the configured workers.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use chorus_core::domain::audit_log::AuditLog;
use chorus_core::domain::contribution::WorkerKind;
use chorus_core::domain::coordinator_config::{CoordinatorConfigManifest, WorkerConfig};
use chorus_core::infrastructure::audit_log::{InMemoryAuditLog, JsonlAuditLog};
use chorus_core::Coordinator;

pub struct EmbeddedCoordinator {
    pub coordinator: Arc<Coordinator>,
    pub config: CoordinatorConfigManifest,
    /// JSONL file backing the audit log, if any
    pub audit_path: Option<PathBuf>,
}

impl EmbeddedCoordinator {
    pub async fn bootstrap(config_path: Option<PathBuf>, audit_log: Option<PathBuf>) -> Result<Self> {
        let config = CoordinatorConfigManifest::load_or_default(config_path)
            .context("Failed to load configuration")?;
        Self::from_config(config, audit_log).await
    }

    pub async fn from_config(config: CoordinatorConfigManifest, audit_log: Option<PathBuf>) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;

        let audit_path = audit_log.or_else(|| config.spec.audit.path.clone());
        let audit: Arc<dyn AuditLog> = match &audit_path {
            Some(path) => Arc::new(open_audit_log(path).await?),
            None => {
                debug!("No audit log path configured; using in-memory audit log");
                Arc::new(InMemoryAuditLog::new())
            }
        };

        let coordinator = Arc::new(Coordinator::new(config.spec.orchestration.clone(), audit));

        let workers = if config.spec.workers.is_empty() {
            default_ensemble()
        } else {
            config.spec.workers.clone()
        };
        let registered = coordinator
            .register_workers(&workers)
            .context("Failed to register workers")?;
        info!(workers = registered.len(), "Embedded coordinator ready");

        Ok(Self {
            coordinator,
            config,
            audit_path,
        })
    }
}

async fn open_audit_log(path: &Path) -> Result<JsonlAuditLog> {
    JsonlAuditLog::open(path)
        .await
        .with_context(|| format!("Failed to open audit log at {:?}", path))
}

/// One worker of each built-in kind.
pub fn default_ensemble() -> Vec<WorkerConfig> {
    [
        WorkerKind::Synthesizer,
        WorkerKind::Planner,
        WorkerKind::CreativeModulator,
        WorkerKind::SequenceAnalyzer,
    ]
    .into_iter()
    .map(|kind| WorkerConfig {
        id: format!("{}-1", kind.tag()),
        kind,
    })
    .collect()
}
