// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Worker Contributions
//!
//! The kind-specific behaviour behind [`crate::domain::worker::Worker::execute`].
//! Every [`WorkerKind`] maps to one pure function producing a typed
//! [`Contribution`]; adding a kind means extending the enum, never matching
//! on free-form strings.
//!
//! | Kind | Contribution |
//! |------|--------------|
//! | `Synthesizer` | `Architecture`: components from salient task terms |
//! | `Planner` | `Plan`: ordered steps split on conjunctions |
//! | `CreativeModulator` | `Variations`: reframings scaled by worker state |
//! | `SequenceAnalyzer` | `Analysis`: statistics over the word-length sequence |
//! | `Custom(tag)` | `Note`: acknowledgement tagged with the custom kind |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::state::{self, StateVector};
use crate::domain::worker::WorkerError;

const MAX_SALIENT_TERMS: usize = 5;
const SUMMARY_PREVIEW_CHARS: usize = 60;
const TREND_TOLERANCE: f64 = 0.5;

const STOPWORDS: &[&str] = &[
    "about", "after", "also", "from", "have", "into", "over", "that", "their", "then", "there",
    "these", "they", "this", "with", "will", "your", "what", "when", "which", "while",
];

/// Closed set of worker kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerKind {
    Synthesizer,
    Planner,
    CreativeModulator,
    SequenceAnalyzer,
    Custom(String),
}

impl WorkerKind {
    pub fn tag(&self) -> &str {
        match self {
            WorkerKind::Synthesizer => "synthesizer",
            WorkerKind::Planner => "planner",
            WorkerKind::CreativeModulator => "creative-modulator",
            WorkerKind::SequenceAnalyzer => "sequence-analyzer",
            WorkerKind::Custom(tag) => tag,
        }
    }

    /// Keyword stems that give this kind selection affinity for a task.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            WorkerKind::Synthesizer => &[
                "architect", "design", "build", "synthes", "system", "integrat", "structure",
            ],
            WorkerKind::Planner => &[
                "plan", "rollout", "roadmap", "schedule", "strategy", "step", "milestone",
            ],
            WorkerKind::CreativeModulator => &[
                "creative", "idea", "imagin", "story", "variation", "brainstorm", "artwork", "music",
            ],
            WorkerKind::SequenceAnalyzer => &[
                "analy", "metric", "statistic", "sequence", "trend", "data", "measure",
            ],
            WorkerKind::Custom(_) => &[],
        }
    }

    /// Whether the (already lower-cased) task mentions this kind.
    ///
    /// Custom kinds match on their own tag.
    pub fn has_affinity(&self, task_lower: &str) -> bool {
        match self {
            WorkerKind::Custom(tag) => {
                let tag = tag.trim().to_lowercase();
                !tag.is_empty() && task_lower.contains(&tag)
            }
            kind => kind.keywords().iter().any(|k| task_lower.contains(k)),
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for WorkerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "" => Err("Worker kind cannot be empty".to_string()),
            "synthesizer" => Ok(WorkerKind::Synthesizer),
            "planner" => Ok(WorkerKind::Planner),
            "creative-modulator" | "creative_modulator" | "modulator" => Ok(WorkerKind::CreativeModulator),
            "sequence-analyzer" | "sequence_analyzer" | "analyzer" => Ok(WorkerKind::SequenceAnalyzer),
            _ => Ok(WorkerKind::Custom(s.trim().to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub order: usize,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    Flat,
}

/// Typed output of one worker execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Contribution {
    Architecture {
        components: Vec<String>,
        summary: String,
    },
    Plan {
        steps: Vec<PlanStep>,
    },
    Variations {
        modulation: f64,
        variations: Vec<String>,
    },
    Analysis {
        sequence: Vec<f64>,
        mean: f64,
        std_dev: f64,
        min: f64,
        max: f64,
        trend: Trend,
    },
    Note {
        tag: String,
        summary: String,
    },
}

impl Contribution {
    /// One-line rendering used when synthesizing the unified result.
    pub fn summary(&self) -> String {
        match self {
            Contribution::Architecture { summary, .. } => summary.clone(),
            Contribution::Plan { steps } => {
                let actions: Vec<String> = steps
                    .iter()
                    .map(|s| format!("{}. {}", s.order, s.action))
                    .collect();
                format!("plan: {}", actions.join(" | "))
            }
            Contribution::Variations { modulation, variations } => {
                format!("{} variations at modulation {:.2}: {}", variations.len(), modulation, variations.join(" | "))
            }
            Contribution::Analysis { sequence, mean, std_dev, min, max, trend } => format!(
                "analysis over {} terms: mean {:.2}, std {:.2}, range [{:.0}, {:.0}], trend {:?}",
                sequence.len(),
                mean,
                std_dev,
                min,
                max,
                trend
            ),
            Contribution::Note { summary, .. } => summary.clone(),
        }
    }
}

/// Run the behaviour for `kind` against `task`.
pub fn perform(kind: &WorkerKind, task: &str, state: &StateVector) -> Result<Contribution, WorkerError> {
    match kind {
        WorkerKind::Synthesizer => Ok(synthesize_architecture(task)),
        WorkerKind::Planner => Ok(draft_plan(task)),
        WorkerKind::CreativeModulator => Ok(modulate(task, state)),
        WorkerKind::SequenceAnalyzer => analyze_sequence(task),
        WorkerKind::Custom(tag) => Ok(Contribution::Note {
            tag: tag.clone(),
            summary: format!("{} reviewed: {}", tag, preview(task)),
        }),
    }
}

fn synthesize_architecture(task: &str) -> Contribution {
    let terms = salient_terms(task);
    let components: Vec<String> = if terms.is_empty() {
        vec!["core-component".to_string()]
    } else {
        terms.iter().map(|t| format!("{}-component", t)).collect()
    };
    let summary = format!(
        "architecture of {} components: {}",
        components.len(),
        components.join(", ")
    );
    Contribution::Architecture { components, summary }
}

fn draft_plan(task: &str) -> Contribution {
    let normalized = task
        .replace(" and then ", ";")
        .replace(" then ", ";")
        .replace(" and ", ";")
        .replace(',', ";");

    let mut steps: Vec<PlanStep> = normalized
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .enumerate()
        .map(|(i, segment)| PlanStep {
            order: i + 1,
            action: segment.to_string(),
        })
        .collect();

    let focus = salient_terms(task)
        .into_iter()
        .next()
        .unwrap_or_else(|| "outcome".to_string());
    steps.push(PlanStep {
        order: steps.len() + 1,
        action: format!("verify {}", focus),
    });

    Contribution::Plan { steps }
}

fn modulate(task: &str, state: &StateVector) -> Contribution {
    let modulation = state::coherence(state, &StateVector::REFERENCE);
    let words: Vec<&str> = task.split_whitespace().collect();
    let inverted: Vec<&str> = words.iter().rev().copied().collect();
    let amplified: Vec<String> = salient_terms(task).iter().map(|t| t.to_uppercase()).collect();

    let variations = vec![
        format!("inverted: {}", inverted.join(" ")),
        format!("amplified: {}", if amplified.is_empty() { "-".to_string() } else { amplified.join(" / ") }),
        format!("muted ({:.2}): {}", modulation, task.trim().to_lowercase()),
    ];

    Contribution::Variations { modulation, variations }
}

fn analyze_sequence(task: &str) -> Result<Contribution, WorkerError> {
    let sequence: Vec<f64> = words(task).map(|w| w.chars().count() as f64).collect();
    if sequence.is_empty() {
        return Err(WorkerError::InvalidInput(
            "task contains no words to derive a sequence from".to_string(),
        ));
    }

    let n = sequence.len() as f64;
    let mean = sequence.iter().sum::<f64>() / n;
    let variance = sequence.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let min = sequence.iter().copied().fold(f64::INFINITY, f64::min);
    let max = sequence.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let trend = if sequence.len() < 2 {
        Trend::Flat
    } else {
        let mid = sequence.len() / 2;
        let head = &sequence[..mid];
        let tail = &sequence[mid..];
        let head_mean = head.iter().sum::<f64>() / head.len() as f64;
        let tail_mean = tail.iter().sum::<f64>() / tail.len() as f64;
        if tail_mean - head_mean > TREND_TOLERANCE {
            Trend::Rising
        } else if head_mean - tail_mean > TREND_TOLERANCE {
            Trend::Falling
        } else {
            Trend::Flat
        }
    };

    Ok(Contribution::Analysis {
        sequence,
        mean,
        std_dev: variance.sqrt(),
        min,
        max,
        trend,
    })
}

/// Alphanumeric words of `text`, punctuation stripped.
fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

/// Lower-cased, de-duplicated terms longer than three characters.
fn salient_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in words(text) {
        let lower = word.to_lowercase();
        if lower.chars().count() <= 3 || STOPWORDS.contains(&lower.as_str()) {
            continue;
        }
        if !terms.contains(&lower) {
            terms.push(lower);
        }
        if terms.len() == MAX_SALIENT_TERMS {
            break;
        }
    }
    terms
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= SUMMARY_PREVIEW_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(SUMMARY_PREVIEW_CHARS).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("planner".parse::<WorkerKind>().unwrap(), WorkerKind::Planner);
        assert_eq!("Analyzer".parse::<WorkerKind>().unwrap(), WorkerKind::SequenceAnalyzer);
        assert_eq!("creative-modulator".parse::<WorkerKind>().unwrap(), WorkerKind::CreativeModulator);
        assert_eq!("reviewer".parse::<WorkerKind>().unwrap(), WorkerKind::Custom("reviewer".to_string()));
        assert!("  ".parse::<WorkerKind>().is_err());
    }

    #[test]
    fn test_keyword_affinity() {
        let task = "plan a rollout and analyze recent metrics";
        assert!(WorkerKind::Planner.has_affinity(task));
        assert!(WorkerKind::SequenceAnalyzer.has_affinity(task));
        assert!(!WorkerKind::CreativeModulator.has_affinity(task));
        assert!(WorkerKind::Custom("rollout".to_string()).has_affinity(task));
        assert!(!WorkerKind::Custom("".to_string()).has_affinity(task));
    }

    #[test]
    fn test_plan_splits_on_conjunctions() {
        let contribution = draft_plan("plan a rollout and analyze recent metrics, then report");
        match contribution {
            Contribution::Plan { steps } => {
                let actions: Vec<&str> = steps.iter().map(|s| s.action.as_str()).collect();
                assert_eq!(
                    actions,
                    vec!["plan a rollout", "analyze recent metrics", "report", "verify plan"]
                );
                assert_eq!(steps.last().map(|s| s.order), Some(4));
            }
            other => panic!("expected plan, got {:?}", other),
        }
    }

    #[test]
    fn test_analysis_statistics() {
        let contribution = analyze_sequence("aa bbbb").unwrap();
        match contribution {
            Contribution::Analysis { sequence, mean, std_dev, min, max, trend } => {
                assert_eq!(sequence, vec![2.0, 4.0]);
                assert_eq!(mean, 3.0);
                assert_eq!(std_dev, 1.0);
                assert_eq!(min, 2.0);
                assert_eq!(max, 4.0);
                assert_eq!(trend, Trend::Rising);
            }
            other => panic!("expected analysis, got {:?}", other),
        }
    }

    #[test]
    fn test_analysis_rejects_wordless_task() {
        let err = analyze_sequence("?! ...").unwrap_err();
        assert!(matches!(err, WorkerError::InvalidInput(_)));
    }

    #[test]
    fn test_architecture_falls_back_to_core_component() {
        match synthesize_architecture("do it") {
            Contribution::Architecture { components, .. } => {
                assert_eq!(components, vec!["core-component".to_string()]);
            }
            other => panic!("expected architecture, got {:?}", other),
        }
    }

    #[test]
    fn test_salient_terms_dedupes_and_caps() {
        let terms = salient_terms("Design design the storage layer, storage cache, index, queue and shards");
        assert_eq!(terms, vec!["design", "storage", "layer", "cache", "index"]);
    }

    #[test]
    fn test_contribution_serializes_with_type_tag() {
        let note = Contribution::Note {
            tag: "reviewer".to_string(),
            summary: "ok".to_string(),
        };
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["type"], "note");
        assert_eq!(json["tag"], "reviewer");
    }
}
