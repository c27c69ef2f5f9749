// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Coordinator Service
//!
//! Owns the worker registry and the system coherence loop, and runs one
//! orchestration at a time.
//!
//! ## Run pipeline
//!
//! ```text
//! busy CAS ─▶ validate ─▶ encode ─▶ select ─▶ seed coherence
//!    ─▶ spawn_blocking per worker (shared deadline)
//!    ─▶ synthesize ─▶ stability check ─▶ dissonance recovery | harmonise
//!    ─▶ adapt resonance ─▶ audit append ─▶ clear busy ─▶ RunCompleted
//! ```
//!
//! Rejections (`Busy`, `EmptyTask`, `NoWorkersAvailable`) happen before the
//! seed step and leave the coordinator untouched. The seeded coherence lives
//! in the run until the final coherence is committed, so a run whose future
//! is dropped mid-dispatch leaves coherence and resonance as they were.
//!
//! ## Locking
//!
//! Registry, coherence, resonance and history share one
//! `parking_lot::Mutex<CoordinatorState>` that is never held across an
//! `.await`. Each worker has its own mutex, locked for the duration of an
//! execution by the blocking thread running it. Everything else only
//! `try_lock`s workers, so a worker orphaned by the run deadline is reported
//! as unavailable instead of stalling the caller.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::application::selection::{self, Candidate, SelectionPolicy};
use crate::application::synthesis;
use crate::domain::audit_log::{AuditLog, AuditLogError};
use crate::domain::chance::{ChanceSource, SeededChance};
use crate::domain::contribution::WorkerKind;
use crate::domain::coordinator_config::{OrchestrationSettings, WorkerConfig};
use crate::domain::events::OrchestrationEvent;
use crate::domain::orchestration::{
    CoordinatorError, CoordinatorStatus, OptimizationReport, OrchestrationId, OrchestrationRecord,
    OrchestrationRequest, OrchestrationResult, WorkerOutcome,
};
use crate::domain::state::{self, StateVector, NEUTRAL_COHERENCE};
use crate::domain::worker::{panic_message, Worker, WorkerError, WorkerFault, WorkerId, WorkerSnapshot};
use crate::infrastructure::event_bus::EventBus;

struct CoordinatorState {
    workers: BTreeMap<WorkerId, Arc<Mutex<Worker>>>,
    coherence: f64,
    resonance: f64,
    history: VecDeque<OrchestrationRecord>,
    run_count: u64,
}

impl CoordinatorState {
    /// `clamp(mean(worker coherence) * resonance)`; unchanged when no worker can be read.
    fn recompute_coherence(&mut self) {
        let coherences: Vec<f64> = self
            .workers
            .values()
            .filter_map(|w| w.try_lock().map(|w| w.coherence()))
            .collect();
        if coherences.is_empty() {
            return;
        }
        self.coherence = state::clamp_unit(synthesis::mean(&coherences) * self.resonance);
    }
}

pub struct Coordinator {
    settings: OrchestrationSettings,
    state: Mutex<CoordinatorState>,
    busy: AtomicBool,
    dissonant: AtomicBool,
    chance: Mutex<Box<dyn ChanceSource>>,
    audit_log: Arc<dyn AuditLog>,
    event_bus: EventBus,
}

impl Coordinator {
    pub fn new(settings: OrchestrationSettings, audit_log: Arc<dyn AuditLog>) -> Self {
        let chance: Box<dyn ChanceSource> = match settings.rng_seed {
            Some(seed) => Box::new(SeededChance::from_seed(seed)),
            None => Box::new(SeededChance::from_entropy()),
        };

        Self {
            state: Mutex::new(CoordinatorState {
                workers: BTreeMap::new(),
                coherence: NEUTRAL_COHERENCE,
                resonance: settings.initial_resonance,
                history: VecDeque::with_capacity(settings.history_capacity.min(1024)),
                run_count: 0,
            }),
            settings,
            busy: AtomicBool::new(false),
            dissonant: AtomicBool::new(false),
            chance: Mutex::new(chance),
            audit_log,
            event_bus: EventBus::with_default_capacity(),
        }
    }

    /// Replace the dissonance trigger.
    pub fn with_chance_source(self, chance: Box<dyn ChanceSource>) -> Self {
        *self.chance.lock() = chance;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn settings(&self) -> &OrchestrationSettings {
        &self.settings
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn coherence(&self) -> f64 {
        self.state.lock().coherence
    }

    pub fn resonance(&self) -> f64 {
        self.state.lock().resonance
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Set and cleared inside a single run with no suspension point between,
    /// so this reads `false` outside a run. The excursion itself is observable
    /// through `DissonanceDetected` and `HarmonyRestored` on the event bus.
    pub fn is_dissonant(&self) -> bool {
        self.dissonant.load(Ordering::Acquire)
    }

    pub fn worker_count(&self) -> usize {
        self.state.lock().workers.len()
    }

    /// In-memory run history, oldest first.
    pub fn history(&self) -> Vec<OrchestrationRecord> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Register a worker. Without an id one is generated from the kind.
    pub fn create_worker(&self, kind: WorkerKind, id: Option<&str>) -> Result<WorkerId, CoordinatorError> {
        let worker_id = match id {
            Some(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(CoordinatorError::InvalidWorkerId);
                }
                WorkerId::new(trimmed)
            }
            None => WorkerId::generate(&kind),
        };

        let system_coherence = {
            let mut state = self.state.lock();
            if state.workers.contains_key(&worker_id) {
                return Err(CoordinatorError::DuplicateWorker(worker_id.to_string()));
            }
            let worker = Worker::new(worker_id.clone(), kind.clone(), self.settings.worker_profile());
            state.workers.insert(worker_id.clone(), Arc::new(Mutex::new(worker)));
            state.recompute_coherence();
            state.coherence
        };

        info!(worker_id = %worker_id, kind = %kind, system_coherence, "Registered worker");
        metrics::gauge!("chorus_system_coherence").set(system_coherence);
        self.event_bus.publish(OrchestrationEvent::WorkerRegistered {
            worker_id: worker_id.clone(),
            kind,
            system_coherence,
            registered_at: Utc::now(),
        });

        Ok(worker_id)
    }

    /// Register every configured worker, stopping at the first rejection.
    pub fn register_workers(&self, workers: &[WorkerConfig]) -> Result<Vec<WorkerId>, CoordinatorError> {
        workers
            .iter()
            .map(|w| self.create_worker(w.kind.clone(), Some(&w.id)))
            .collect()
    }

    /// Remove a worker; `false` when the id is unknown.
    pub fn remove_worker(&self, id: &str) -> bool {
        let worker_id = WorkerId::new(id.trim());
        let system_coherence = {
            let mut state = self.state.lock();
            if state.workers.remove(&worker_id).is_none() {
                return false;
            }
            state.recompute_coherence();
            state.coherence
        };

        info!(worker_id = %worker_id, system_coherence, "Removed worker");
        self.event_bus.publish(OrchestrationEvent::WorkerRemoved {
            worker_id,
            system_coherence,
            removed_at: Utc::now(),
        });
        true
    }

    /// Attach or clear a fault. `false` when the worker is unknown or mid-execution.
    pub fn inject_fault(&self, id: &str, fault: Option<WorkerFault>) -> bool {
        let Some(worker) = self.worker_handle(id) else {
            return false;
        };
        let Some(mut worker) = worker.try_lock() else {
            warn!(worker_id = %id, "Cannot change fault while worker is executing");
            return false;
        };
        debug!(worker_id = %id, fault = ?fault, "Updating worker fault");
        worker.set_fault(fault);
        true
    }

    /// Strict lookup; a worker that is mid-execution reports `Busy`.
    pub fn worker_snapshot(&self, id: &str) -> Result<WorkerSnapshot, CoordinatorError> {
        let worker = self
            .worker_handle(id)
            .ok_or_else(|| CoordinatorError::UnknownWorker(id.to_string()))?;
        let snapshot = worker.try_lock().map(|w| w.snapshot());
        snapshot.ok_or(CoordinatorError::Busy)
    }

    fn worker_handle(&self, id: &str) -> Option<Arc<Mutex<Worker>>> {
        self.state.lock().workers.get(&WorkerId::new(id.trim())).cloned()
    }

    pub async fn run_orchestration(
        &self,
        request: OrchestrationRequest,
    ) -> Result<OrchestrationResult, CoordinatorError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Rejecting orchestration request: coordinator busy");
            metrics::counter!("chorus_orchestration_rejections_total", "reason" => "busy").increment(1);
            return Err(CoordinatorError::Busy);
        }
        let busy_guard = scopeguard::guard((), |_| self.busy.store(false, Ordering::Release));

        let started = Instant::now();
        let task = request.task.trim();
        if task.is_empty() {
            metrics::counter!("chorus_orchestration_rejections_total", "reason" => "empty_task").increment(1);
            return Err(CoordinatorError::EmptyTask);
        }

        let task_state = state::encode(task);
        let task_coherence = state::coherence(&task_state, &StateVector::REFERENCE);

        let selected = self.select_workers(task, &task_state, request.worker_ids.as_deref());
        if selected.is_empty() {
            warn!("No workers available for task");
            metrics::counter!("chorus_orchestration_rejections_total", "reason" => "no_workers").increment(1);
            return Err(CoordinatorError::NoWorkersAvailable);
        }

        let orchestration_id = OrchestrationId::new();
        let workers_used: Vec<WorkerId> = selected.iter().map(|(id, _)| id.clone()).collect();

        // committed to the shared state only once the run completes
        let (seed, resonance) = {
            let state = self.state.lock();
            let seed = if request.refine {
                self.settings
                    .seed_coherence
                    .min(state.coherence * self.settings.refine_decay)
            } else {
                self.settings.seed_coherence
            };
            (seed, state.resonance)
        };

        info!(
            orchestration_id = %orchestration_id,
            workers = workers_used.len(),
            refine = request.refine,
            "Starting orchestration run"
        );
        self.event_bus.publish(OrchestrationEvent::RunStarted {
            orchestration_id,
            workers: workers_used.clone(),
            refine: request.refine,
            started_at: Utc::now(),
        });

        let outcomes = self.dispatch(orchestration_id, task, selected).await;
        let unified = synthesis::synthesize(&outcomes);

        let checked = synthesis::stability_check(&unified, seed, resonance, &self.settings);

        let probability = if request.refine {
            self.settings.refine_dissonance_probability
        } else {
            self.settings.dissonance_probability
        };
        let roll = self.chance.lock().roll();

        let (final_coherence, dissonance) = if roll < probability {
            let report = synthesis::recover(checked, resonance, &self.settings);
            self.dissonant.store(true, Ordering::Release);
            warn!(
                orchestration_id = %orchestration_id,
                onset = report.onset,
                trough = report.trough,
                "Dissonance detected"
            );
            metrics::counter!("chorus_dissonance_events_total").increment(1);
            self.event_bus.publish(OrchestrationEvent::DissonanceDetected {
                orchestration_id,
                onset: report.onset,
                trough: report.trough,
                detected_at: Utc::now(),
            });

            self.dissonant.store(false, Ordering::Release);
            info!(
                orchestration_id = %orchestration_id,
                coherence = report.recovered,
                "Harmony restored"
            );
            self.event_bus.publish(OrchestrationEvent::HarmonyRestored {
                orchestration_id,
                coherence: report.recovered,
                restored_at: Utc::now(),
            });
            (report.recovered, Some(report))
        } else {
            (synthesis::harmonize(checked, self.settings.harmonization_rate), None)
        };

        let next_resonance =
            synthesis::adapt_resonance(resonance, unified.aggregate_coherence, &self.settings);

        let duration_ms = started.elapsed().as_millis() as u64;
        let record = OrchestrationRecord {
            id: orchestration_id,
            task: task.to_string(),
            task_state,
            task_coherence,
            workers_used,
            outcomes,
            unified,
            resonance,
            final_coherence,
            dissonance,
            refine: request.refine,
            duration_ms,
            timestamp: Utc::now(),
        };

        {
            let mut state = self.state.lock();
            state.coherence = final_coherence;
            state.resonance = next_resonance;
        }

        if let Err(e) = self.append_audit(&record).await {
            warn!(orchestration_id = %orchestration_id, error = %e, "Failed to append audit record");
        }

        {
            let mut state = self.state.lock();
            if state.history.len() >= self.settings.history_capacity {
                state.history.pop_front();
            }
            state.history.push_back(record.clone());
            state.run_count += 1;
        }

        let log_tail = self.log_tail().await;
        drop(busy_guard);

        let failures = record.failure_count();
        info!(
            orchestration_id = %orchestration_id,
            final_coherence,
            failures,
            duration_ms,
            "Orchestration run completed"
        );
        self.event_bus.publish(OrchestrationEvent::RunCompleted {
            orchestration_id,
            final_coherence,
            failures,
            duration_ms,
            completed_at: Utc::now(),
        });
        metrics::counter!("chorus_orchestration_runs_total").increment(1);
        metrics::histogram!("chorus_orchestration_duration_ms").record(duration_ms as f64);
        metrics::gauge!("chorus_system_coherence").set(final_coherence);

        Ok(OrchestrationResult::from_record(&record, log_tail))
    }

    fn select_workers(
        &self,
        task: &str,
        task_state: &StateVector,
        explicit: Option<&[String]>,
    ) -> Vec<(WorkerId, Arc<Mutex<Worker>>)> {
        let handles: Vec<(WorkerId, Arc<Mutex<Worker>>)> = {
            let state = self.state.lock();
            state
                .workers
                .iter()
                .map(|(id, worker)| (id.clone(), Arc::clone(worker)))
                .collect()
        };

        let mut candidates = Vec::with_capacity(handles.len());
        for (id, worker) in &handles {
            match worker.try_lock() {
                Some(worker) => candidates.push(Candidate::of(&worker)),
                None => debug!(worker_id = %id, "Worker still executing; unavailable for selection"),
            }
        }

        let policy = SelectionPolicy {
            affinity_bonus: self.settings.affinity_bonus,
            affinity_threshold: self.settings.affinity_threshold,
            fallback_top_n: self.settings.fallback_top_n,
        };
        let selection = selection::select(&candidates, explicit, task, task_state, &policy);

        for id in &selection.skipped {
            warn!(worker_id = %id, "Skipping unknown or unavailable worker");
        }
        if selection.fallback && !selection.workers.is_empty() {
            debug!("No worker cleared the affinity threshold; using performance fallback");
        }

        selection
            .workers
            .into_iter()
            .filter_map(|id| {
                handles
                    .iter()
                    .find(|(candidate, _)| *candidate == id)
                    .map(|(_, worker)| (id, Arc::clone(worker)))
            })
            .collect()
    }

    /// Fan the task out and collect every outcome by the run deadline.
    async fn dispatch(
        &self,
        orchestration_id: OrchestrationId,
        task: &str,
        selected: Vec<(WorkerId, Arc<Mutex<Worker>>)>,
    ) -> BTreeMap<WorkerId, WorkerOutcome> {
        let deadline_ms = self.settings.run_deadline_ms;
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);

        let pending = selected.into_iter().map(|(id, worker)| {
            let task = task.to_string();
            let handle = tokio::task::spawn_blocking(move || worker.lock().execute(&task));
            async move {
                let result = match tokio::time::timeout_at(deadline, handle).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_error)) if join_error.is_panic() => {
                        Err(WorkerError::Panicked(panic_message(join_error.into_panic().as_ref())))
                    }
                    Ok(Err(join_error)) => Err(WorkerError::Panicked(join_error.to_string())),
                    Err(_) => Err(WorkerError::TimedOut(deadline_ms)),
                };
                (id, result)
            }
        });

        let mut outcomes = BTreeMap::new();
        for (worker_id, result) in futures::future::join_all(pending).await {
            match &result {
                Ok(output) => {
                    debug!(worker_id = %worker_id, resonance = output.resonance, "Worker completed");
                    self.event_bus.publish(OrchestrationEvent::WorkerCompleted {
                        orchestration_id,
                        worker_id: worker_id.clone(),
                        resonance: output.resonance,
                    });
                }
                Err(error) => {
                    warn!(worker_id = %worker_id, error = %error, "Worker failed");
                    metrics::counter!("chorus_worker_failures_total").increment(1);
                    self.event_bus.publish(OrchestrationEvent::WorkerFailed {
                        orchestration_id,
                        worker_id: worker_id.clone(),
                        error: error.clone(),
                    });
                }
            }
            outcomes.insert(worker_id, WorkerOutcome::from(result));
        }
        outcomes
    }

    async fn append_audit(&self, record: &OrchestrationRecord) -> Result<(), AuditLogError> {
        let timeout_ms = self.settings.audit_timeout_ms;
        tokio::time::timeout(Duration::from_millis(timeout_ms), self.audit_log.append(record))
            .await
            .map_err(|_| AuditLogError::TimedOut(timeout_ms))?
    }

    /// Recent log lines from the audit log, falling back to in-memory history.
    async fn log_tail(&self) -> Vec<String> {
        let n = self.settings.log_tail;
        let timeout = Duration::from_millis(self.settings.audit_timeout_ms);

        match tokio::time::timeout(timeout, self.audit_log.tail(n)).await {
            Ok(Ok(records)) if !records.is_empty() => {
                return records.iter().map(OrchestrationRecord::log_line).collect();
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to read audit log tail"),
            Err(_) => warn!("Audit log tail timed out"),
        }

        let state = self.state.lock();
        let start = state.history.len().saturating_sub(n);
        state.history.iter().skip(start).map(OrchestrationRecord::log_line).collect()
    }

    pub async fn get_status(&self) -> CoordinatorStatus {
        let (worker_count, workers, coherence, resonance, run_count) = {
            let state = self.state.lock();
            let workers: Vec<WorkerSnapshot> = state
                .workers
                .values()
                .filter_map(|w| w.try_lock().map(|w| w.snapshot()))
                .collect();
            (
                state.workers.len(),
                workers,
                state.coherence,
                state.resonance,
                state.run_count,
            )
        };

        CoordinatorStatus {
            worker_count,
            workers,
            coherence,
            resonance,
            busy: self.is_busy(),
            dissonant: self.is_dissonant(),
            run_count,
            log_tail: self.log_tail().await,
        }
    }

    /// Nudge the resonance multiplier toward the best recent run.
    pub fn optimize_parameters(&self) -> OptimizationReport {
        let report = {
            let mut state = self.state.lock();
            let current = state.resonance;
            let window: Vec<&OrchestrationRecord> = state
                .history
                .iter()
                .rev()
                .take(self.settings.optimize_window)
                .collect();

            if window.is_empty() {
                return OptimizationReport {
                    window: 0,
                    mean_coherence: 0.0,
                    mean_duration_ms: 0.0,
                    performance: 0.0,
                    previous_resonance: current,
                    resonance: current,
                    adjusted: false,
                };
            }

            let coherences: Vec<f64> = window.iter().map(|r| r.final_coherence).collect();
            let durations: Vec<f64> = window.iter().map(|r| r.duration_ms as f64).collect();
            let mean_coherence = synthesis::mean(&coherences);
            let mean_duration_ms = synthesis::mean(&durations);
            let performance = synthesis::performance_score(mean_coherence, mean_duration_ms);

            let best_resonance = window
                .iter()
                .max_by(|a, b| {
                    let pa = synthesis::performance_score(a.final_coherence, a.duration_ms as f64);
                    let pb = synthesis::performance_score(b.final_coherence, b.duration_ms as f64);
                    pa.total_cmp(&pb)
                })
                .map(|r| r.resonance)
                .unwrap_or(current);

            let next = synthesis::bound_resonance(
                current + self.settings.optimize_step * (best_resonance - current),
                &self.settings,
            );

            let report = OptimizationReport {
                window: window.len(),
                mean_coherence,
                mean_duration_ms,
                performance,
                previous_resonance: current,
                resonance: next,
                adjusted: true,
            };
            state.resonance = next;
            report
        };

        info!(
            previous = report.previous_resonance,
            resonance = report.resonance,
            performance = report.performance,
            window = report.window,
            "Optimised resonance multiplier"
        );
        self.event_bus.publish(OrchestrationEvent::ParametersOptimized {
            previous_resonance: report.previous_resonance,
            resonance: report.resonance,
            performance: report.performance,
            optimized_at: Utc::now(),
        });
        report
    }
}
