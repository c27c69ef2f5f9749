// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Synthesis and the coherence update loop.
//!
//! Pure arithmetic shared by the coordinator: turning per-worker outcomes into
//! a [`UnifiedResult`], the stability check, dissonance recovery, the idle
//! harmonisation nudge and resonance adaptation. Every function returns values
//! clamped to their documented range.

use std::collections::BTreeMap;

use crate::domain::coordinator_config::OrchestrationSettings;
use crate::domain::orchestration::{DissonanceReport, UnifiedResult, WeightedContribution, WorkerOutcome};
use crate::domain::state::clamp_unit;
use crate::domain::worker::{WorkerId, WorkerOutput};

pub const NO_CONTRIBUTIONS_SUMMARY: &str = "No worker produced a contribution";

/// Fuse successful outcomes into one result.
///
/// Weights are resonances normalised to sum to one (equal shares when every
/// resonance is zero); contributions are ordered by weight, then worker id.
pub fn synthesize(outcomes: &BTreeMap<WorkerId, WorkerOutcome>) -> UnifiedResult {
    let successes: Vec<(&WorkerId, &WorkerOutput)> = outcomes
        .iter()
        .filter_map(|(id, outcome)| outcome.output().map(|output| (id, output)))
        .collect();

    if successes.is_empty() {
        return UnifiedResult {
            summary: NO_CONTRIBUTIONS_SUMMARY.to_string(),
            contributions: Vec::new(),
            aggregate_coherence: 0.0,
            stability: 0.0,
        };
    }

    let resonances: Vec<f64> = successes.iter().map(|(_, o)| o.resonance).collect();
    let total: f64 = resonances.iter().sum();
    let equal_share = 1.0 / successes.len() as f64;

    let mut contributions: Vec<WeightedContribution> = successes
        .iter()
        .map(|(id, output)| WeightedContribution {
            worker_id: (*id).clone(),
            weight: if total > 0.0 { output.resonance / total } else { equal_share },
            resonance: output.resonance,
            contribution: output.contribution.clone(),
        })
        .collect();
    contributions.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| a.worker_id.cmp(&b.worker_id))
    });

    let stability = stability(&resonances);
    let aggregate_coherence = clamp_unit((mean(&resonances) + stability) / 2.0);

    let summary = contributions
        .iter()
        .map(|c| format!("[{} {:.2}] {}", c.worker_id, c.weight, c.contribution.summary()))
        .collect::<Vec<_>>()
        .join("\n");

    UnifiedResult {
        summary,
        contributions,
        aggregate_coherence,
        stability,
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Agreement between workers: `1 - std_dev`, clamped.
pub fn stability(resonances: &[f64]) -> f64 {
    clamp_unit(1.0 - population_std_dev(resonances))
}

/// Post-synthesis coherence, weighting the unified result against the current value.
pub fn stability_check(
    unified: &UnifiedResult,
    current: f64,
    resonance: f64,
    settings: &OrchestrationSettings,
) -> f64 {
    let blended = settings.aggregate_weight * unified.aggregate_coherence
        + settings.stability_weight * unified.stability
        + settings.continuity_weight * current;
    clamp_unit(blended * resonance)
}

/// Drop coherence to the dissonance trough and correct it in one step.
pub fn recover(onset: f64, resonance: f64, settings: &OrchestrationSettings) -> DissonanceReport {
    let onset = clamp_unit(onset);
    let trough = clamp_unit(onset * (1.0 - settings.dissonance_drop));
    let perturbation = onset - trough;
    let correction = settings.recovery_gain * resonance / (1.0 + perturbation);
    let recovered = clamp_unit(trough + correction * (1.0 - trough));

    DissonanceReport {
        onset,
        trough,
        perturbation,
        correction,
        recovered,
    }
}

/// Close `rate` of the remaining gap to full coherence.
pub fn harmonize(coherence: f64, rate: f64) -> f64 {
    clamp_unit(coherence + rate * (1.0 - coherence))
}

/// Move the resonance multiplier toward `0.5 + aggregate`.
pub fn adapt_resonance(current: f64, aggregate: f64, settings: &OrchestrationSettings) -> f64 {
    let target = 0.5 + aggregate;
    let next = current + settings.resonance_adaptation * (target - current);
    bound_resonance(next, settings)
}

pub fn bound_resonance(value: f64, settings: &OrchestrationSettings) -> f64 {
    if !value.is_finite() {
        return settings.initial_resonance;
    }
    value.clamp(settings.resonance_min, settings.resonance_max)
}

/// Throughput-adjusted score of one run: `coherence / (1 + seconds)`.
pub fn performance_score(coherence: f64, duration_ms: f64) -> f64 {
    coherence / (1.0 + duration_ms.max(0.0) / 1_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contribution::Contribution;
    use crate::domain::worker::WorkerError;

    fn success(resonance: f64) -> WorkerOutcome {
        WorkerOutcome::Success(WorkerOutput {
            contribution: Contribution::Note {
                tag: "t".to_string(),
                summary: format!("note {resonance}"),
            },
            resonance,
            coherence: 0.5,
        })
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_synthesize_weights_by_resonance() {
        let mut outcomes = BTreeMap::new();
        outcomes.insert(WorkerId::new("a"), success(0.2));
        outcomes.insert(WorkerId::new("b"), success(0.6));
        outcomes.insert(
            WorkerId::new("c"),
            WorkerOutcome::Failure { error: WorkerError::Fault("x".to_string()) },
        );

        let unified = synthesize(&outcomes);

        assert_eq!(unified.contributions.len(), 2);
        assert_eq!(unified.contributions[0].worker_id, WorkerId::new("b"));
        assert!(approx(unified.contributions[0].weight, 0.75));
        assert!(approx(unified.contributions[1].weight, 0.25));

        // mean 0.4, std 0.2 -> stability 0.8, aggregate 0.6
        assert!(approx(unified.stability, 0.8));
        assert!(approx(unified.aggregate_coherence, 0.6));
        assert!(unified.summary.lines().next().unwrap().starts_with("[b 0.75]"));
    }

    #[test]
    fn test_synthesize_without_successes() {
        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            WorkerId::new("a"),
            WorkerOutcome::Failure { error: WorkerError::TimedOut(5) },
        );

        let unified = synthesize(&outcomes);

        assert!(unified.contributions.is_empty());
        assert_eq!(unified.aggregate_coherence, 0.0);
        assert_eq!(unified.stability, 0.0);
        assert_eq!(unified.summary, NO_CONTRIBUTIONS_SUMMARY);
    }

    #[test]
    fn test_zero_resonance_gets_equal_shares() {
        let mut outcomes = BTreeMap::new();
        outcomes.insert(WorkerId::new("a"), success(0.0));
        outcomes.insert(WorkerId::new("b"), success(0.0));

        let unified = synthesize(&outcomes);
        assert!(unified.contributions.iter().all(|c| approx(c.weight, 0.5)));
        assert_eq!(unified.contributions[0].worker_id, WorkerId::new("a"));
    }

    #[test]
    fn test_stability_check_is_bounded() {
        let settings = OrchestrationSettings::default();
        let unified = UnifiedResult {
            summary: String::new(),
            contributions: vec![],
            aggregate_coherence: 1.0,
            stability: 1.0,
        };
        assert_eq!(stability_check(&unified, 1.0, 1.5, &settings), 1.0);
        assert!(approx(stability_check(&unified, 0.0, 1.0, &settings), 0.7));
    }

    #[test]
    fn test_recovery_lands_above_trough() {
        let settings = OrchestrationSettings::default();
        let report = recover(0.6, 1.0, &settings);

        assert!(approx(report.trough, 0.42));
        assert!(approx(report.perturbation, 0.18));
        assert!(report.recovered > report.trough);
        assert!(report.recovered <= 1.0);
    }

    #[test]
    fn test_harmonize_and_resonance_bounds() {
        assert!(approx(harmonize(0.5, 0.2), 0.6));
        assert_eq!(harmonize(1.0, 0.2), 1.0);

        let settings = OrchestrationSettings::default();
        let adapted = adapt_resonance(1.0, 0.9, &settings);
        assert!(adapted > 1.0 && adapted < 1.4);
        assert_eq!(bound_resonance(9.0, &settings), settings.resonance_max);
        assert_eq!(bound_resonance(f64::NAN, &settings), settings.initial_resonance);
    }

    #[test]
    fn test_performance_score_penalises_duration() {
        assert_eq!(performance_score(0.8, 0.0), 0.8);
        assert!(approx(performance_score(0.8, 1_000.0), 0.4));
    }
}
