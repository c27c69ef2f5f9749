// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Orchestration Records and Results
//!
//! Value types produced by one `run_orchestration` call:
//!
//! - [`OrchestrationRecord`]: immutable audit entry, appended once per run.
//! - [`OrchestrationResult`]: the caller-facing view of the same run plus the
//!   recent log tail.
//! - [`CoordinatorError`]: typed rejections that abort a run before any side
//!   effect.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::contribution::Contribution;
use crate::domain::state::StateVector;
use crate::domain::worker::{WorkerError, WorkerId, WorkerOutput, WorkerSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrchestrationId(pub Uuid);

impl OrchestrationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for OrchestrationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrchestrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationRequest {
    pub task: String,
    /// Explicit worker selection; unknown ids are skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_ids: Option<Vec<String>>,
    /// Refinement pass: lower coherence seed and dissonance probability.
    #[serde(default)]
    pub refine: bool,
}

impl OrchestrationRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Default::default()
        }
    }

    pub fn with_workers<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.worker_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn refine(mut self, refine: bool) -> Self {
        self.refine = refine;
        self
    }
}

/// Per-worker result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerOutcome {
    Success(WorkerOutput),
    Failure { error: WorkerError },
}

impl WorkerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkerOutcome::Success(_))
    }

    pub fn output(&self) -> Option<&WorkerOutput> {
        match self {
            WorkerOutcome::Success(output) => Some(output),
            WorkerOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&WorkerError> {
        match self {
            WorkerOutcome::Success(_) => None,
            WorkerOutcome::Failure { error } => Some(error),
        }
    }
}

impl From<Result<WorkerOutput, WorkerError>> for WorkerOutcome {
    fn from(result: Result<WorkerOutput, WorkerError>) -> Self {
        match result {
            Ok(output) => WorkerOutcome::Success(output),
            Err(error) => WorkerOutcome::Failure { error },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedContribution {
    pub worker_id: WorkerId,
    /// Normalised share of the total resonance of all successful workers.
    pub weight: f64,
    pub resonance: f64,
    pub contribution: Contribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedResult {
    pub summary: String,
    /// Highest weight first.
    pub contributions: Vec<WeightedContribution>,
    pub aggregate_coherence: f64,
    pub stability: f64,
}

/// Trace of a dissonance excursion and its correction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DissonanceReport {
    /// Coherence when dissonance was detected.
    pub onset: f64,
    /// Coherence after the drop.
    pub trough: f64,
    pub perturbation: f64,
    pub correction: f64,
    /// Coherence after recovery.
    pub recovered: f64,
}

/// Immutable audit entry for one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationRecord {
    pub id: OrchestrationId,
    pub task: String,
    pub task_state: StateVector,
    pub task_coherence: f64,
    pub workers_used: Vec<WorkerId>,
    pub outcomes: BTreeMap<WorkerId, WorkerOutcome>,
    pub unified: UnifiedResult,
    /// Resonance multiplier in effect while this run updated coherence.
    pub resonance: f64,
    pub final_coherence: f64,
    pub dissonance: Option<DissonanceReport>,
    pub refine: bool,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl OrchestrationRecord {
    pub fn failure_count(&self) -> usize {
        self.outcomes.values().filter(|o| !o.is_success()).count()
    }

    pub fn dissonance_detected(&self) -> bool {
        self.dissonance.is_some()
    }

    pub fn log_line(&self) -> String {
        format!(
            "{} run={} workers={} failures={} coherence={:.3} dissonance={} duration={}ms",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.id.short(),
            self.workers_used.len(),
            self.failure_count(),
            self.final_coherence,
            self.dissonance_detected(),
            self.duration_ms
        )
    }
}

/// Caller-facing result of `run_orchestration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub orchestration_id: OrchestrationId,
    pub task: String,
    pub workers_used: Vec<WorkerId>,
    pub per_worker_results: BTreeMap<WorkerId, WorkerOutcome>,
    pub unified_result: UnifiedResult,
    pub final_coherence: f64,
    pub dissonance_detected: bool,
    pub dissonance: Option<DissonanceReport>,
    pub duration_ms: u64,
    pub log_tail: Vec<String>,
}

impl OrchestrationResult {
    pub fn from_record(record: &OrchestrationRecord, log_tail: Vec<String>) -> Self {
        Self {
            orchestration_id: record.id,
            task: record.task.clone(),
            workers_used: record.workers_used.clone(),
            per_worker_results: record.outcomes.clone(),
            unified_result: record.unified.clone(),
            final_coherence: record.final_coherence,
            dissonance_detected: record.dissonance_detected(),
            dissonance: record.dissonance,
            duration_ms: record.duration_ms,
            log_tail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub worker_count: usize,
    /// Workers whose lock was free at snapshot time.
    pub workers: Vec<WorkerSnapshot>,
    pub coherence: f64,
    pub resonance: f64,
    pub busy: bool,
    /// Only `true` while a run is between detection and recovery.
    pub dissonant: bool,
    pub run_count: u64,
    pub log_tail: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub window: usize,
    pub mean_coherence: f64,
    pub mean_duration_ms: f64,
    pub performance: f64,
    pub previous_resonance: f64,
    pub resonance: f64,
    pub adjusted: bool,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Another orchestration run is in progress; retry later")]
    Busy,

    #[error("Task description is empty")]
    EmptyTask,

    #[error("No workers available for this task")]
    NoWorkersAvailable,

    #[error("Worker already registered: {0}")]
    DuplicateWorker(String),

    #[error("Worker id cannot be blank")]
    InvalidWorkerId,

    #[error("Unknown worker: {0}")]
    UnknownWorker(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contribution::Contribution;

    fn record_with(outcomes: BTreeMap<WorkerId, WorkerOutcome>) -> OrchestrationRecord {
        OrchestrationRecord {
            id: OrchestrationId::new(),
            task: "plan".to_string(),
            task_state: StateVector::ZERO,
            task_coherence: 0.5,
            workers_used: outcomes.keys().cloned().collect(),
            outcomes,
            unified: UnifiedResult {
                summary: String::new(),
                contributions: vec![],
                aggregate_coherence: 0.0,
                stability: 0.0,
            },
            resonance: 1.0,
            final_coherence: 0.42,
            dissonance: None,
            refine: false,
            duration_ms: 7,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_outcome_from_result() {
        let err: WorkerOutcome = Err(WorkerError::Fault("x".to_string())).into();
        assert!(!err.is_success());
        assert_eq!(err.error(), Some(&WorkerError::Fault("x".to_string())));
        assert!(err.output().is_none());
    }

    #[test]
    fn test_log_line_counts_failures() {
        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            WorkerId::new("a"),
            WorkerOutcome::Success(WorkerOutput {
                contribution: Contribution::Note { tag: "t".to_string(), summary: "s".to_string() },
                resonance: 0.7,
                coherence: 0.6,
            }),
        );
        outcomes.insert(
            WorkerId::new("b"),
            WorkerOutcome::Failure { error: WorkerError::TimedOut(10) },
        );
        let record = record_with(outcomes);

        let line = record.log_line();
        assert!(line.contains("workers=2"));
        assert!(line.contains("failures=1"));
        assert!(line.contains("coherence=0.420"));
        assert!(line.contains("duration=7ms"));
    }

    #[test]
    fn test_record_json_roundtrip() {
        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            WorkerId::new("b"),
            WorkerOutcome::Failure { error: WorkerError::InvalidInput("empty".to_string()) },
        );
        let record = record_with(outcomes);

        let json = serde_json::to_string(&record).unwrap();
        let parsed: OrchestrationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["outcomes"]["b"]["status"], "failure");
        assert_eq!(value["outcomes"]["b"]["error"]["kind"], "invalid_input");
    }

    #[test]
    fn test_request_builder() {
        let request = OrchestrationRequest::new("analyze").with_workers(["a1", "p1"]).refine(true);
        assert_eq!(request.worker_ids, Some(vec!["a1".to_string(), "p1".to_string()]));
        assert!(request.refine);
    }
}
