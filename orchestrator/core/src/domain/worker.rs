// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Worker Aggregate
//!
//! A [`Worker`] is an independently executable unit owned by the coordinator
//! registry. It carries a [`StateVector`], a coherence scalar measured against
//! [`StateVector::REFERENCE`], and a bounded [`PerformanceHistory`].
//!
//! ## Lifecycle
//!
//! `Idle → Executing → Idle`. [`Worker::execute`] never unwinds: kind
//! failures, injected faults and panics raised while performing are all
//! converted into a [`WorkerError`] and the worker is returned to `Idle`.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::contribution::{self, Contribution, WorkerKind};
use crate::domain::state::{self, StateVector};

/// Performance reported before a worker has any history.
pub const NEUTRAL_PERFORMANCE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate `<kind>-<8 hex chars>`.
    pub fn generate(kind: &WorkerKind) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", kind.tag(), &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Executing,
}

/// Fault attached to a worker for chaos drills.
///
/// A fault stays in effect for every execution until it is cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WorkerFault {
    /// Fail immediately with the given reason.
    Fail { reason: String },
    /// Block for `millis` before performing normally.
    Stall { millis: u64 },
    /// Panic while performing.
    Panic { reason: String },
}

#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum WorkerError {
    #[error("Invalid task input: {0}")]
    InvalidInput(String),
    #[error("Injected fault: {0}")]
    Fault(String),
    #[error("Worker panicked: {0}")]
    Panicked(String),
    #[error("Worker did not finish within {0} ms")]
    TimedOut(u64),
}

/// Tunables applied to every worker the coordinator creates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerProfile {
    /// Ring-buffer capacity of the performance history.
    pub history_capacity: usize,
    /// Number of most recent scores averaged by [`Worker::performance_metric`].
    pub performance_window: usize,
    /// Blend weight pulling the worker state toward each executed task.
    pub state_drift: f64,
}

impl Default for WorkerProfile {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            performance_window: 10,
            state_drift: 0.25,
        }
    }
}

/// Fixed-capacity, most-recent-last score buffer.
#[derive(Debug, Clone)]
pub struct PerformanceHistory {
    scores: VecDeque<f64>,
    capacity: usize,
}

impl PerformanceHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            scores: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, score: f64) {
        if self.scores.len() == self.capacity {
            self.scores.pop_front();
        }
        self.scores.push_back(state::clamp_unit(score));
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.scores.back().copied()
    }

    /// Mean of the last `window` scores, `None` when empty.
    pub fn recent_mean(&self, window: usize) -> Option<f64> {
        let window = window.max(1).min(self.scores.len());
        if window == 0 {
            return None;
        }
        let sum: f64 = self.scores.iter().rev().take(window).sum();
        Some(sum / window as f64)
    }
}

/// Successful result of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutput {
    pub contribution: Contribution,
    /// Coherence between the worker's pre-execution state and the task state.
    pub resonance: f64,
    /// Worker coherence after its state drifted toward the task.
    pub coherence: f64,
}

/// Read-only view used by status reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub id: WorkerId,
    pub kind: WorkerKind,
    pub status: WorkerStatus,
    pub coherence: f64,
    pub performance: f64,
    pub tasks_completed: u64,
    pub faulted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Worker {
    id: WorkerId,
    kind: WorkerKind,
    state: StateVector,
    coherence: f64,
    history: PerformanceHistory,
    status: WorkerStatus,
    tasks_completed: u64,
    fault: Option<WorkerFault>,
    profile: WorkerProfile,
    created_at: DateTime<Utc>,
}

impl Worker {
    /// Create an idle worker whose initial state is derived from its kind and id.
    pub fn new(id: WorkerId, kind: WorkerKind, profile: WorkerProfile) -> Self {
        let initial = state::encode(&format!("{}:{}", kind.tag(), id));
        let mut worker = Self {
            id,
            kind,
            state: StateVector::ZERO,
            coherence: 0.0,
            history: PerformanceHistory::with_capacity(profile.history_capacity),
            status: WorkerStatus::Idle,
            tasks_completed: 0,
            fault: None,
            profile,
            created_at: Utc::now(),
        };
        worker.update_state(initial);
        worker
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn kind(&self) -> &WorkerKind {
        &self.kind
    }

    pub fn state(&self) -> &StateVector {
        &self.state
    }

    pub fn coherence(&self) -> f64 {
        self.coherence
    }

    pub fn status(&self) -> WorkerStatus {
        self.status
    }

    pub fn history(&self) -> &PerformanceHistory {
        &self.history
    }

    pub fn tasks_completed(&self) -> u64 {
        self.tasks_completed
    }

    pub fn fault(&self) -> Option<&WorkerFault> {
        self.fault.as_ref()
    }

    pub fn set_fault(&mut self, fault: Option<WorkerFault>) {
        self.fault = fault;
    }

    /// Replace the state and recompute coherence against the reference vector.
    pub fn update_state(&mut self, new_state: StateVector) {
        self.state = new_state;
        self.coherence = state::coherence(&self.state, &StateVector::REFERENCE);
    }

    /// Mean of the recent performance window, [`NEUTRAL_PERFORMANCE`] when empty.
    pub fn performance_metric(&self) -> f64 {
        self.history
            .recent_mean(self.profile.performance_window)
            .unwrap_or(NEUTRAL_PERFORMANCE)
    }

    /// Execute `task`.
    ///
    /// Always records a performance score (the resonance on success, `0.0` on
    /// failure) and drifts the state toward the task, whatever the outcome.
    pub fn execute(&mut self, task: &str) -> Result<WorkerOutput, WorkerError> {
        self.status = WorkerStatus::Executing;

        let task_state = state::encode(task);
        let resonance = state::coherence(&self.state, &task_state);

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.perform(task))) {
            Ok(result) => result,
            Err(payload) => Err(WorkerError::Panicked(panic_message(payload.as_ref()))),
        };

        self.history.push(if outcome.is_ok() { resonance } else { 0.0 });
        let drifted = self.state.blend(&task_state, self.profile.state_drift);
        self.update_state(drifted);
        self.status = WorkerStatus::Idle;

        let contribution = outcome?;
        self.tasks_completed += 1;
        Ok(WorkerOutput {
            contribution,
            resonance,
            coherence: self.coherence,
        })
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            id: self.id.clone(),
            kind: self.kind.clone(),
            status: self.status,
            coherence: self.coherence,
            performance: self.performance_metric(),
            tasks_completed: self.tasks_completed,
            faulted: self.fault.is_some(),
            created_at: self.created_at,
        }
    }

    fn perform(&self, task: &str) -> Result<Contribution, WorkerError> {
        match &self.fault {
            Some(WorkerFault::Fail { reason }) => return Err(WorkerError::Fault(reason.clone())),
            Some(WorkerFault::Stall { millis }) => std::thread::sleep(Duration::from_millis(*millis)),
            Some(WorkerFault::Panic { reason }) => panic!("{}", reason),
            None => {}
        }
        contribution::perform(&self.kind, task, &self.state)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
