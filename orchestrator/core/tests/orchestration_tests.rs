// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;

use chorus_core::application::synthesis;
use chorus_core::domain::audit_log::AuditLog;
use chorus_core::domain::chance::FixedChance;
use chorus_core::domain::contribution::WorkerKind;
use chorus_core::domain::coordinator_config::OrchestrationSettings;
use chorus_core::domain::events::OrchestrationEvent;
use chorus_core::domain::orchestration::{CoordinatorError, OrchestrationRequest};
use chorus_core::domain::worker::{WorkerError, WorkerFault, WorkerId};
use chorus_core::infrastructure::audit_log::{InMemoryAuditLog, JsonlAuditLog};
use chorus_core::Coordinator;

fn coordinator_with(audit_log: Arc<dyn AuditLog>, chance: FixedChance) -> Coordinator {
    Coordinator::new(OrchestrationSettings::default(), audit_log).with_chance_source(Box::new(chance))
}

#[tokio::test]
async fn test_end_to_end_planner_and_analyzer() {
    let audit_log = Arc::new(InMemoryAuditLog::new());
    let coordinator = coordinator_with(audit_log.clone(), FixedChance::never());
    coordinator.create_worker(WorkerKind::Planner, Some("p1")).unwrap();
    coordinator.create_worker(WorkerKind::SequenceAnalyzer, Some("a1")).unwrap();

    let result = coordinator
        .run_orchestration(OrchestrationRequest::new("plan a rollout and analyze recent metrics"))
        .await
        .unwrap();

    assert!(result.workers_used.contains(&WorkerId::new("p1")));
    assert!(result.workers_used.contains(&WorkerId::new("a1")));
    assert_eq!(result.per_worker_results.len(), 2);
    assert!(result.per_worker_results.values().all(|o| o.is_success()));
    assert!((0.0..=1.0).contains(&result.final_coherence));
    assert!(!result.dissonance_detected);
    assert_eq!(result.unified_result.contributions.len(), 2);

    assert_eq!(audit_log.len().await.unwrap(), 1);
    assert_eq!(result.log_tail.len(), 1);
    assert_eq!(coordinator.history().len(), 1);
    assert_eq!(coordinator.coherence(), result.final_coherence);
    assert!(!coordinator.is_busy());
}

#[tokio::test]
async fn test_partial_failure_is_isolated() {
    let audit_log = Arc::new(InMemoryAuditLog::new());
    let coordinator = coordinator_with(audit_log.clone(), FixedChance::never());
    for (id, kind) in [
        ("p1", WorkerKind::Planner),
        ("s1", WorkerKind::Synthesizer),
        ("a1", WorkerKind::SequenceAnalyzer),
    ] {
        coordinator.create_worker(kind, Some(id)).unwrap();
    }
    assert!(coordinator.inject_fault("s1", Some(WorkerFault::Fail { reason: "drill".to_string() })));

    let result = coordinator
        .run_orchestration(
            OrchestrationRequest::new("design and plan a data pipeline").with_workers(["p1", "s1", "a1"]),
        )
        .await
        .unwrap();

    assert_eq!(
        result.workers_used,
        vec![WorkerId::new("p1"), WorkerId::new("s1"), WorkerId::new("a1")]
    );
    let failures: Vec<_> = result
        .per_worker_results
        .iter()
        .filter_map(|(id, o)| o.error().map(|e| (id.clone(), e.clone())))
        .collect();
    assert_eq!(failures, vec![(WorkerId::new("s1"), WorkerError::Fault("drill".to_string()))]);

    let contributors: Vec<_> = result
        .unified_result
        .contributions
        .iter()
        .map(|c| c.worker_id.clone())
        .collect();
    assert_eq!(contributors.len(), 2);
    assert!(!contributors.contains(&WorkerId::new("s1")));
    assert_eq!(audit_log.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_all_failures_still_record_a_run() {
    let audit_log = Arc::new(InMemoryAuditLog::new());
    let coordinator = coordinator_with(audit_log.clone(), FixedChance::never());
    coordinator.create_worker(WorkerKind::SequenceAnalyzer, Some("a1")).unwrap();

    let result = coordinator
        .run_orchestration(OrchestrationRequest::new("?!").with_workers(["a1"]))
        .await
        .unwrap();

    assert!(matches!(
        result.per_worker_results[&WorkerId::new("a1")].error(),
        Some(WorkerError::InvalidInput(_))
    ));
    assert_eq!(result.unified_result.contributions.len(), 0);
    assert_eq!(result.unified_result.aggregate_coherence, 0.0);
    assert_eq!(audit_log.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_registration_is_rejected() {
    let coordinator = coordinator_with(Arc::new(InMemoryAuditLog::new()), FixedChance::never());
    coordinator.create_worker(WorkerKind::Planner, Some("p1")).unwrap();
    let coherence = coordinator.coherence();

    let err = coordinator.create_worker(WorkerKind::Planner, Some("p1")).unwrap_err();

    assert_eq!(err, CoordinatorError::DuplicateWorker("p1".to_string()));
    assert_eq!(coordinator.worker_count(), 1);
    assert_eq!(coordinator.coherence(), coherence);
}

#[tokio::test]
async fn test_empty_task_leaves_state_untouched() {
    let audit_log = Arc::new(InMemoryAuditLog::new());
    let coordinator = coordinator_with(audit_log.clone(), FixedChance::never());
    coordinator.create_worker(WorkerKind::Planner, Some("p1")).unwrap();
    let coherence = coordinator.coherence();
    let mut events = coordinator.event_bus().subscribe();

    let err = coordinator
        .run_orchestration(OrchestrationRequest::new("   "))
        .await
        .unwrap_err();

    assert_eq!(err, CoordinatorError::EmptyTask);
    assert!(!coordinator.is_busy());
    assert_eq!(coordinator.coherence(), coherence);
    assert_eq!(audit_log.len().await.unwrap(), 0);
    assert!(coordinator.history().is_empty());
    assert!(events.drain().is_empty());
}

#[tokio::test]
async fn test_no_workers_available() {
    let coordinator = coordinator_with(Arc::new(InMemoryAuditLog::new()), FixedChance::never());

    let err = coordinator
        .run_orchestration(OrchestrationRequest::new("plan a launch"))
        .await
        .unwrap_err();
    assert_eq!(err, CoordinatorError::NoWorkersAvailable);

    coordinator.create_worker(WorkerKind::Planner, Some("p1")).unwrap();
    let err = coordinator
        .run_orchestration(OrchestrationRequest::new("plan a launch").with_workers(["ghost"]))
        .await
        .unwrap_err();
    assert_eq!(err, CoordinatorError::NoWorkersAvailable);
    assert!(!coordinator.is_busy());
    assert!(coordinator.history().is_empty());
}

#[tokio::test]
async fn test_dissonance_is_recovered_within_the_run() {
    let coordinator = coordinator_with(Arc::new(InMemoryAuditLog::new()), FixedChance::always());
    coordinator.create_worker(WorkerKind::Planner, Some("p1")).unwrap();
    coordinator.create_worker(WorkerKind::Synthesizer, Some("s1")).unwrap();
    let mut events = coordinator.event_bus().subscribe();

    let result = coordinator
        .run_orchestration(OrchestrationRequest::new("design a system and plan the rollout"))
        .await
        .unwrap();

    let events = events.drain();
    let detected = events
        .iter()
        .position(|e| matches!(e, OrchestrationEvent::DissonanceDetected { .. }))
        .expect("dissonance event published");
    let restored = events
        .iter()
        .position(|e| matches!(e, OrchestrationEvent::HarmonyRestored { .. }))
        .expect("harmony event published");
    let completed = events
        .iter()
        .position(|e| matches!(e, OrchestrationEvent::RunCompleted { .. }))
        .expect("completion event published");
    assert!(detected < restored && restored < completed);

    let trough = match &events[detected] {
        OrchestrationEvent::DissonanceDetected { trough, orchestration_id, .. } => {
            assert_eq!(*orchestration_id, result.orchestration_id);
            *trough
        }
        _ => unreachable!(),
    };

    assert!(result.dissonance_detected);
    let report = result.dissonance.unwrap();
    assert_eq!(report.trough, trough);
    assert!(result.final_coherence > trough);
    assert!((0.0..=1.0).contains(&result.final_coherence));
    assert!(!coordinator.is_dissonant());
}

#[tokio::test]
async fn test_zero_probability_never_triggers_dissonance() {
    let settings = OrchestrationSettings {
        dissonance_probability: 0.0,
        ..Default::default()
    };
    let coordinator = Coordinator::new(settings, Arc::new(InMemoryAuditLog::new()))
        .with_chance_source(Box::new(FixedChance::always()));
    coordinator.create_worker(WorkerKind::Planner, Some("p1")).unwrap();

    let result = coordinator
        .run_orchestration(OrchestrationRequest::new("plan the week"))
        .await
        .unwrap();
    assert!(!result.dissonance_detected);
}

#[tokio::test]
async fn test_refine_uses_decayed_seed_and_refine_probability() {
    let settings = OrchestrationSettings {
        seed_coherence: 0.9,
        ..Default::default()
    };
    let coordinator = Coordinator::new(settings.clone(), Arc::new(InMemoryAuditLog::new()))
        .with_chance_source(Box::new(FixedChance(0.2)));
    coordinator.create_worker(WorkerKind::Planner, Some("p1")).unwrap();
    coordinator.create_worker(WorkerKind::SequenceAnalyzer, Some("a1")).unwrap();

    // 0.2 is below the normal probability (0.25)
    let resonance = coordinator.resonance();
    let normal = coordinator
        .run_orchestration(OrchestrationRequest::new("plan and analyze the rollout"))
        .await
        .unwrap();
    assert!(normal.dissonance_detected);
    let expected_onset = synthesis::stability_check(&normal.unified_result, 0.9, resonance, &settings);
    assert!((normal.dissonance.unwrap().onset - expected_onset).abs() < 1e-12);

    // but above the refine probability (0.10), and the seed decays from the current coherence
    let coherence = coordinator.coherence();
    let resonance = coordinator.resonance();
    let refined = coordinator
        .run_orchestration(OrchestrationRequest::new("plan and analyze the rollout").refine(true))
        .await
        .unwrap();
    assert!(!refined.dissonance_detected);
    let seed = 0.9_f64.min(coherence * settings.refine_decay);
    let expected = synthesis::harmonize(
        synthesis::stability_check(&refined.unified_result, seed, resonance, &settings),
        settings.harmonization_rate,
    );
    assert!((refined.final_coherence - expected).abs() < 1e-12);
    assert!(coordinator.history()[1].refine);
}

#[tokio::test]
async fn test_coherence_stays_bounded_across_runs() {
    let coordinator = coordinator_with(Arc::new(InMemoryAuditLog::new()), FixedChance(0.2));
    coordinator.create_worker(WorkerKind::Planner, Some("p1")).unwrap();
    coordinator.create_worker(WorkerKind::CreativeModulator, Some("c1")).unwrap();

    for round in 0..12 {
        let request = OrchestrationRequest::new("brainstorm a story and plan it").refine(round % 2 == 1);
        let result = coordinator.run_orchestration(request).await.unwrap();
        assert!((0.0..=1.0).contains(&result.final_coherence));
        let resonance = coordinator.resonance();
        let settings = coordinator.settings();
        assert!(resonance >= settings.resonance_min && resonance <= settings.resonance_max);
    }
    assert_eq!(coordinator.history().len(), 12);
    assert_eq!(coordinator.get_status().await.run_count, 12);
}

#[tokio::test]
async fn test_optimize_moves_resonance_toward_best_run() {
    let coordinator = coordinator_with(Arc::new(InMemoryAuditLog::new()), FixedChance::never());
    coordinator.create_worker(WorkerKind::Planner, Some("p1")).unwrap();
    coordinator.create_worker(WorkerKind::SequenceAnalyzer, Some("a1")).unwrap();

    for task in ["plan a rollout", "analyze metric trends", "plan and measure the migration"] {
        coordinator
            .run_orchestration(OrchestrationRequest::new(task))
            .await
            .unwrap();
    }

    let history = coordinator.history();
    let best = history
        .iter()
        .max_by(|a, b| {
            synthesis::performance_score(a.final_coherence, a.duration_ms as f64)
                .total_cmp(&synthesis::performance_score(b.final_coherence, b.duration_ms as f64))
        })
        .unwrap()
        .resonance;
    let before = coordinator.resonance();
    let mut events = coordinator.event_bus().subscribe();

    let report = coordinator.optimize_parameters();

    assert!(report.adjusted);
    assert_eq!(report.window, 3);
    assert_eq!(report.previous_resonance, before);
    assert_eq!(coordinator.resonance(), report.resonance);
    assert!((report.resonance - best).abs() <= (before - best).abs() + 1e-12);
    assert!(matches!(
        events.try_recv(),
        Ok(OrchestrationEvent::ParametersOptimized { .. })
    ));
}

#[tokio::test]
async fn test_status_reports_registry_and_log_tail() {
    let coordinator = coordinator_with(Arc::new(InMemoryAuditLog::new()), FixedChance::never());
    coordinator.create_worker(WorkerKind::Planner, Some("p1")).unwrap();
    coordinator.create_worker(WorkerKind::Custom("reviewer".to_string()), Some("r1")).unwrap();

    let status = coordinator.get_status().await;
    assert_eq!(status.worker_count, 2);
    assert_eq!(status.workers.len(), 2);
    assert!(status.log_tail.is_empty());
    assert!(!status.busy);

    coordinator
        .run_orchestration(OrchestrationRequest::new("reviewer please plan a check").with_workers(["r1"]))
        .await
        .unwrap();

    let status = coordinator.get_status().await;
    assert_eq!(status.run_count, 1);
    assert_eq!(status.log_tail.len(), 1);
    assert!(status.log_tail[0].contains("workers=1"));
    let reviewer = status.workers.iter().find(|w| w.id == WorkerId::new("r1")).unwrap();
    assert_eq!(reviewer.tasks_completed, 1);
}

#[tokio::test]
async fn test_jsonl_audit_log_records_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");

    let audit_log = Arc::new(JsonlAuditLog::open(&path).await.unwrap());
    let coordinator = coordinator_with(audit_log, FixedChance::never());
    coordinator.create_worker(WorkerKind::Planner, Some("p1")).unwrap();
    let result = coordinator
        .run_orchestration(OrchestrationRequest::new("plan the release"))
        .await
        .unwrap();

    let reopened = JsonlAuditLog::open(&path).await.unwrap();
    let records = reopened.tail(10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, result.orchestration_id);
    assert_eq!(records[0].final_coherence, result.final_coherence);
}
