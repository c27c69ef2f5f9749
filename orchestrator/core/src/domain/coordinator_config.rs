// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Coordinator Configuration Types
//
// Defines the configuration schema for a Chorus coordinator, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Orchestration tunables (coherence seeds, affinity, dissonance, resonance)
// - Workers registered at startup
// - Audit log backing and observability settings

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::domain::contribution::WorkerKind;
use crate::domain::worker::WorkerProfile;

pub const API_VERSION: &str = "chorus.dev/v1";
pub const KIND: &str = "CoordinatorConfig";

/// Top-level Kubernetes-style coordinator configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfigManifest {
    /// API version (must be "chorus.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "CoordinatorConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: CoordinatorConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable coordinator name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorConfigSpec {
    #[serde(default)]
    pub orchestration: OrchestrationSettings,

    /// Workers registered when the coordinator boots
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

/// Every tunable of the coordination loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationSettings {
    /// Coherence a normal run starts from
    pub seed_coherence: f64,
    /// Factor applied to the current coherence when a refinement run starts
    pub refine_decay: f64,

    /// Score added when a task mentions a worker kind's keywords
    pub affinity_bonus: f64,
    /// Minimum selection score for affinity-based selection
    pub affinity_threshold: f64,
    /// Workers taken by the performance fallback when nobody clears the threshold
    pub fallback_top_n: usize,

    /// Probability of a dissonance excursion on a normal run
    pub dissonance_probability: f64,
    /// Probability of a dissonance excursion on a refinement run
    pub refine_dissonance_probability: f64,
    /// Fraction of coherence lost at the dissonance trough
    pub dissonance_drop: f64,
    /// Gain of the `resonance / (1 + perturbation)` correction
    pub recovery_gain: f64,
    /// Share of the remaining gap to 1.0 closed when no dissonance occurs
    pub harmonization_rate: f64,

    /// Stability-check weights; must sum to 1.0
    pub aggregate_weight: f64,
    pub stability_weight: f64,
    pub continuity_weight: f64,

    pub initial_resonance: f64,
    pub resonance_min: f64,
    pub resonance_max: f64,
    /// Per-run adaptation rate of the resonance multiplier
    pub resonance_adaptation: f64,

    /// Records considered by `optimize_parameters`
    pub optimize_window: usize,
    /// Share of the distance to the best record's resonance moved per optimisation
    pub optimize_step: f64,

    /// Orchestration records retained in memory
    pub history_capacity: usize,
    pub performance_history_capacity: usize,
    pub performance_window: usize,
    pub state_drift: f64,

    /// Deadline for all workers of one run
    pub run_deadline_ms: u64,
    /// Upper bound on a single audit-log call
    pub audit_timeout_ms: u64,
    /// Log lines returned with results and status
    pub log_tail: usize,

    /// Seed for the dissonance trigger; OS entropy when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            seed_coherence: 0.1,
            refine_decay: 0.5,
            affinity_bonus: 0.75,
            affinity_threshold: 0.75,
            fallback_top_n: 3,
            dissonance_probability: 0.25,
            refine_dissonance_probability: 0.10,
            dissonance_drop: 0.3,
            recovery_gain: 0.5,
            harmonization_rate: 0.2,
            aggregate_weight: 0.4,
            stability_weight: 0.3,
            continuity_weight: 0.3,
            initial_resonance: 1.0,
            resonance_min: 0.5,
            resonance_max: 1.5,
            resonance_adaptation: 0.05,
            optimize_window: 10,
            optimize_step: 0.5,
            history_capacity: 256,
            performance_history_capacity: 100,
            performance_window: 10,
            state_drift: 0.25,
            run_deadline_ms: 30_000,
            audit_timeout_ms: 2_000,
            log_tail: 5,
            rng_seed: None,
        }
    }
}

impl OrchestrationSettings {
    pub fn worker_profile(&self) -> WorkerProfile {
        WorkerProfile {
            history_capacity: self.performance_history_capacity,
            performance_window: self.performance_window,
            state_drift: self.state_drift,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let unit_fields = [
            ("seed_coherence", self.seed_coherence),
            ("refine_decay", self.refine_decay),
            ("dissonance_probability", self.dissonance_probability),
            ("refine_dissonance_probability", self.refine_dissonance_probability),
            ("dissonance_drop", self.dissonance_drop),
            ("recovery_gain", self.recovery_gain),
            ("harmonization_rate", self.harmonization_rate),
            ("aggregate_weight", self.aggregate_weight),
            ("stability_weight", self.stability_weight),
            ("continuity_weight", self.continuity_weight),
            ("resonance_adaptation", self.resonance_adaptation),
            ("optimize_step", self.optimize_step),
            ("state_drift", self.state_drift),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, value);
            }
        }

        if self.dissonance_drop <= 0.0 {
            anyhow::bail!("dissonance_drop must be positive");
        }

        let weight_sum = self.aggregate_weight + self.stability_weight + self.continuity_weight;
        if (weight_sum - 1.0).abs() > 1e-6 {
            anyhow::bail!("Stability weights must sum to 1.0, got {:.4}", weight_sum);
        }

        if !self.affinity_bonus.is_finite() || self.affinity_bonus < 0.0 {
            anyhow::bail!("affinity_bonus must be non-negative");
        }
        if !self.affinity_threshold.is_finite() || self.affinity_threshold < 0.0 {
            anyhow::bail!("affinity_threshold must be non-negative");
        }

        if !(self.resonance_min > 0.0 && self.resonance_min <= self.resonance_max) {
            anyhow::bail!(
                "Resonance bounds must satisfy 0 < min <= max, got [{}, {}]",
                self.resonance_min,
                self.resonance_max
            );
        }
        if self.initial_resonance < self.resonance_min || self.initial_resonance > self.resonance_max {
            anyhow::bail!(
                "initial_resonance {} is outside [{}, {}]",
                self.initial_resonance,
                self.resonance_min,
                self.resonance_max
            );
        }

        let non_zero = [
            ("fallback_top_n", self.fallback_top_n),
            ("optimize_window", self.optimize_window),
            ("history_capacity", self.history_capacity),
            ("performance_history_capacity", self.performance_history_capacity),
            ("performance_window", self.performance_window),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }

        if self.run_deadline_ms == 0 {
            anyhow::bail!("run_deadline_ms must be greater than zero");
        }
        if self.audit_timeout_ms == 0 {
            anyhow::bail!("audit_timeout_ms must be greater than zero");
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Unique worker id
    pub id: String,

    /// Worker kind (synthesizer, planner, creative-modulator, sequence-analyzer, or `!custom <tag>`)
    pub kind: WorkerKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// JSON-lines audit file; in-memory log when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CoordinatorConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "chorus-coordinator".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: CoordinatorConfigSpec::default(),
        }
    }
}

impl CoordinatorConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Log level from `spec.observability.logging`, if configured.
    pub fn log_level(&self) -> Option<&str> {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.as_ref())
            .map(|l| l.level.as_str())
    }

    /// Paths checked by [`Self::discover_config`], in precedence order.
    pub fn discovery_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(path) = std::env::var("CHORUS_CONFIG_PATH") {
            paths.push(PathBuf::from(path));
        }
        paths.push(PathBuf::from("./chorus-config.yaml"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".chorus").join("config.yaml"));
        }
        #[cfg(unix)]
        paths.push(PathBuf::from("/etc/chorus/config.yaml"));
        #[cfg(windows)]
        paths.push(PathBuf::from("C:\\ProgramData\\Chorus\\config.yaml"));
        paths
    }

    /// Discover configuration file using precedence order
    /// 1. CHORUS_CONFIG_PATH environment variable
    /// 2. ./chorus-config.yaml (working directory)
    /// 3. ~/.chorus/config.yaml (user home)
    /// 4. /etc/chorus/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        Self::discovery_paths().into_iter().find(|p| p.exists())
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        let orchestration = &mut self.spec.orchestration;

        if let Ok(val) = std::env::var("CHORUS_RUN_DEADLINE_MS") {
            match val.parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Environment override: CHORUS_RUN_DEADLINE_MS={}", ms);
                    orchestration.run_deadline_ms = ms;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for CHORUS_RUN_DEADLINE_MS: '{}'. Expected milliseconds. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("CHORUS_RNG_SEED") {
            match val.parse::<u64>() {
                Ok(seed) => {
                    tracing::info!("Environment override: CHORUS_RNG_SEED={}", seed);
                    orchestration.rng_seed = Some(seed);
                }
                Err(_) => tracing::warn!(
                    "Invalid value for CHORUS_RNG_SEED: '{}'. Expected an unsigned integer. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("CHORUS_AUDIT_LOG") {
            if !val.trim().is_empty() {
                tracing::info!("Environment override: CHORUS_AUDIT_LOG={}", val);
                self.spec.audit.path = Some(PathBuf::from(val));
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        self.spec.orchestration.validate()?;

        let mut seen = HashSet::new();
        for worker in &self.spec.workers {
            if worker.id.trim().is_empty() {
                anyhow::bail!("Worker id cannot be empty");
            }
            if !seen.insert(worker.id.as_str()) {
                anyhow::bail!("Duplicate worker id in spec.workers: {}", worker.id);
            }
            if let WorkerKind::Custom(tag) = &worker.kind {
                if tag.trim().is_empty() {
                    anyhow::bail!("Custom worker kind for '{}' needs a tag", worker.id);
                }
            }
        }

        Ok(())
    }
}
