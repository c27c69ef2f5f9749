// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::contribution::WorkerKind;
use crate::domain::orchestration::OrchestrationId;
use crate::domain::worker::{WorkerError, WorkerId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    WorkerRegistered {
        worker_id: WorkerId,
        kind: WorkerKind,
        system_coherence: f64,
        registered_at: DateTime<Utc>,
    },
    WorkerRemoved {
        worker_id: WorkerId,
        system_coherence: f64,
        removed_at: DateTime<Utc>,
    },
    RunStarted {
        orchestration_id: OrchestrationId,
        workers: Vec<WorkerId>,
        refine: bool,
        started_at: DateTime<Utc>,
    },
    WorkerCompleted {
        orchestration_id: OrchestrationId,
        worker_id: WorkerId,
        resonance: f64,
    },
    WorkerFailed {
        orchestration_id: OrchestrationId,
        worker_id: WorkerId,
        error: WorkerError,
    },
    DissonanceDetected {
        orchestration_id: OrchestrationId,
        onset: f64,
        trough: f64,
        detected_at: DateTime<Utc>,
    },
    HarmonyRestored {
        orchestration_id: OrchestrationId,
        coherence: f64,
        restored_at: DateTime<Utc>,
    },
    RunCompleted {
        orchestration_id: OrchestrationId,
        final_coherence: f64,
        failures: usize,
        duration_ms: u64,
        completed_at: DateTime<Utc>,
    },
    ParametersOptimized {
        previous_resonance: f64,
        resonance: f64,
        performance: f64,
        optimized_at: DateTime<Utc>,
    },
}

impl OrchestrationEvent {
    /// Run this event belongs to, if any.
    pub fn orchestration_id(&self) -> Option<OrchestrationId> {
        match self {
            OrchestrationEvent::RunStarted { orchestration_id, .. }
            | OrchestrationEvent::WorkerCompleted { orchestration_id, .. }
            | OrchestrationEvent::WorkerFailed { orchestration_id, .. }
            | OrchestrationEvent::DissonanceDetected { orchestration_id, .. }
            | OrchestrationEvent::HarmonyRestored { orchestration_id, .. }
            | OrchestrationEvent::RunCompleted { orchestration_id, .. } => Some(*orchestration_id),
            OrchestrationEvent::WorkerRegistered { .. }
            | OrchestrationEvent::WorkerRemoved { .. }
            | OrchestrationEvent::ParametersOptimized { .. } => None,
        }
    }
}
