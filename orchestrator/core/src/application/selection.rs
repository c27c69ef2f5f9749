// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Worker selection for one orchestration run.
//!
//! Selection is a pure function over [`Candidate`] snapshots taken from the
//! registry, so the coordinator can decide the worker set without touching
//! any state. Workers that are mid-execution never become candidates.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::domain::contribution::WorkerKind;
use crate::domain::state::{self, StateVector};
use crate::domain::worker::{Worker, WorkerId};

/// Registry view of one available worker.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: WorkerId,
    pub kind: WorkerKind,
    pub state: StateVector,
    pub coherence: f64,
    pub performance: f64,
}

impl Candidate {
    pub fn of(worker: &Worker) -> Self {
        Self {
            id: worker.id().clone(),
            kind: worker.kind().clone(),
            state: *worker.state(),
            coherence: worker.coherence(),
            performance: worker.performance_metric(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionPolicy {
    pub affinity_bonus: f64,
    pub affinity_threshold: f64,
    pub fallback_top_n: usize,
}

/// Outcome of selection, including the explicit ids that were skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub workers: Vec<WorkerId>,
    pub skipped: Vec<String>,
    /// Set when no candidate cleared the affinity threshold.
    pub fallback: bool,
}

/// Choose workers for a task.
///
/// `candidates` must be sorted by id. Explicit ids win over affinity scoring.
pub fn select(
    candidates: &[Candidate],
    explicit: Option<&[String]>,
    task: &str,
    task_state: &StateVector,
    policy: &SelectionPolicy,
) -> Selection {
    match explicit {
        Some(ids) => select_explicit(candidates, ids),
        None => select_by_affinity(candidates, task, task_state, policy),
    }
}

/// Requested ids in order, de-duplicated, restricted to available candidates.
pub fn select_explicit(candidates: &[Candidate], requested: &[String]) -> Selection {
    let mut seen = HashSet::new();
    let mut selection = Selection::default();

    for raw in requested {
        let id = raw.trim();
        if !seen.insert(id) {
            continue;
        }
        match candidates.iter().find(|c| c.id.as_str() == id) {
            Some(candidate) => selection.workers.push(candidate.id.clone()),
            None => selection.skipped.push(id.to_string()),
        }
    }

    selection
}

/// Affinity score: state coherence with the task, plus the bonus on a keyword hit.
pub fn affinity_score(
    candidate: &Candidate,
    task_lower: &str,
    task_state: &StateVector,
    policy: &SelectionPolicy,
) -> f64 {
    let base = state::coherence(&candidate.state, task_state);
    if candidate.kind.has_affinity(task_lower) {
        base + policy.affinity_bonus
    } else {
        base
    }
}

pub fn select_by_affinity(
    candidates: &[Candidate],
    task: &str,
    task_state: &StateVector,
    policy: &SelectionPolicy,
) -> Selection {
    let task_lower = task.to_lowercase();

    let mut scored: Vec<(f64, &Candidate)> = candidates
        .iter()
        .map(|c| (affinity_score(c, &task_lower, task_state, policy), c))
        .filter(|(score, _)| *score >= policy.affinity_threshold)
        .collect();

    if !scored.is_empty() {
        scored.sort_by(|a, b| by_score_then_id(a.0, &a.1.id, b.0, &b.1.id));
        return Selection {
            workers: scored.into_iter().map(|(_, c)| c.id.clone()).collect(),
            skipped: Vec::new(),
            fallback: false,
        };
    }

    let mut ranked: Vec<(f64, &Candidate)> =
        candidates.iter().map(|c| (c.performance + c.coherence, c)).collect();
    ranked.sort_by(|a, b| by_score_then_id(a.0, &a.1.id, b.0, &b.1.id));

    Selection {
        workers: ranked
            .into_iter()
            .take(policy.fallback_top_n)
            .map(|(_, c)| c.id.clone())
            .collect(),
        skipped: Vec::new(),
        fallback: true,
    }
}

fn by_score_then_id(score_a: f64, id_a: &WorkerId, score_b: f64, id_b: &WorkerId) -> Ordering {
    score_b.total_cmp(&score_a).then_with(|| id_a.cmp(id_b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::worker::WorkerProfile;

    fn candidate(id: &str, kind: WorkerKind) -> Candidate {
        Candidate::of(&Worker::new(WorkerId::new(id), kind, WorkerProfile::default()))
    }

    fn policy() -> SelectionPolicy {
        SelectionPolicy {
            affinity_bonus: 0.75,
            affinity_threshold: 0.75,
            fallback_top_n: 2,
        }
    }

    fn ids(selection: &Selection) -> Vec<&str> {
        selection.workers.iter().map(|id| id.as_str()).collect()
    }

    #[test]
    fn test_explicit_selection_keeps_order_and_dedups() {
        let candidates = vec![
            candidate("a1", WorkerKind::SequenceAnalyzer),
            candidate("p1", WorkerKind::Planner),
        ];
        let requested = vec![
            "p1".to_string(),
            "ghost".to_string(),
            "a1".to_string(),
            "p1".to_string(),
        ];

        let selection = select_explicit(&candidates, &requested);

        assert_eq!(ids(&selection), vec!["p1", "a1"]);
        assert_eq!(selection.skipped, vec!["ghost".to_string()]);
        assert!(!selection.fallback);
    }

    #[test]
    fn test_keyword_match_always_qualifies() {
        let candidates = vec![
            candidate("a1", WorkerKind::SequenceAnalyzer),
            candidate("c1", WorkerKind::CreativeModulator),
            candidate("p1", WorkerKind::Planner),
        ];
        let task = "plan a rollout and analyze recent metrics";
        let task_state = state::encode(task);

        let selection = select_by_affinity(&candidates, task, &task_state, &policy());

        assert!(!selection.fallback);
        assert!(selection.workers.contains(&WorkerId::new("p1")));
        assert!(selection.workers.contains(&WorkerId::new("a1")));
    }

    #[test]
    fn test_affinity_results_sorted_by_score() {
        let candidates = vec![
            candidate("a1", WorkerKind::SequenceAnalyzer),
            candidate("p1", WorkerKind::Planner),
        ];
        let task = "plan a rollout and analyze recent metrics";
        let task_state = state::encode(task);
        let lower = task.to_lowercase();

        let selection = select_by_affinity(&candidates, task, &task_state, &policy());
        let scores: Vec<f64> = selection
            .workers
            .iter()
            .map(|id| {
                let c = candidates.iter().find(|c| &c.id == id).unwrap();
                affinity_score(c, &lower, &task_state, &policy())
            })
            .collect();

        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_fallback_takes_top_n_by_performance_and_coherence() {
        let candidates = vec![
            candidate("c1", WorkerKind::CreativeModulator),
            candidate("c2", WorkerKind::CreativeModulator),
            candidate("c3", WorkerKind::CreativeModulator),
        ];
        let strict = SelectionPolicy {
            affinity_threshold: 10.0,
            ..policy()
        };
        let task = "zzz";
        let selection = select_by_affinity(&candidates, task, &state::encode(task), &strict);

        assert!(selection.fallback);
        assert_eq!(selection.workers.len(), 2);

        let mut ranked: Vec<&Candidate> = candidates.iter().collect();
        ranked.sort_by(|a, b| {
            by_score_then_id(a.performance + a.coherence, &a.id, b.performance + b.coherence, &b.id)
        });
        assert_eq!(selection.workers[0], ranked[0].id);
        assert_eq!(selection.workers[1], ranked[1].id);
    }

    #[test]
    fn test_no_candidates_selects_nothing() {
        let task = "plan";
        let selection = select(&[], None, task, &state::encode(task), &policy());
        assert!(selection.workers.is_empty());

        let explicit = vec!["p1".to_string()];
        let selection = select(&[], Some(&explicit), task, &state::encode(task), &policy());
        assert!(selection.workers.is_empty());
        assert_eq!(selection.skipped, vec!["p1".to_string()]);
    }

    #[test]
    fn test_ties_break_by_id() {
        let order = by_score_then_id(0.5, &WorkerId::new("b"), 0.5, &WorkerId::new("a"));
        assert_eq!(order, Ordering::Greater);
        let order = by_score_then_id(0.9, &WorkerId::new("b"), 0.5, &WorkerId::new("a"));
        assert_eq!(order, Ordering::Less);
    }
}
