//! Configuration system for MedLit.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/medlit/config.toml` and/or `.medlit/config.toml`
//! in the workspace directory. Environment variables use the `MEDLIT_` prefix with `__`
//! separating nested keys (e.g. `MEDLIT_SOURCES__CONTACT_EMAIL`).

use crate::analysis::MedicalDomain;
use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MedlitConfig {
    pub pipeline: PipelineConfig,
    pub sources: SourcesConfig,
    pub retry: RetryConfig,
    pub scoring: ScoringConfig,
    pub preferences: UserPreferences,
    pub cache: CacheConfig,
    /// Optional TOML/JSON file overriding the built-in keyword tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocabulary_path: Option<PathBuf>,
}

impl MedlitConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, message: &str| {
            Err(ConfigError::Invalid {
                field: field.to_string(),
                message: message.to_string(),
            })
        };
        let unit = 0.0..=1.0;
        if self.pipeline.default_max_results == 0 {
            return invalid("pipeline.default_max_results", "must be at least 1");
        }
        if self.pipeline.max_results_per_call == 0 {
            return invalid("pipeline.max_results_per_call", "must be at least 1");
        }
        if !unit.contains(&self.pipeline.min_medical_relevance) {
            return invalid("pipeline.min_medical_relevance", "must be within [0, 1]");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts", "must be at least 1");
        }
        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier < 1.0 {
            return invalid("retry.backoff_multiplier", "must be at least 1.0");
        }
        if !unit.contains(&self.scoring.high_confidence_cutoff) {
            return invalid("scoring.high_confidence_cutoff", "must be within [0, 1]");
        }
        if self.scoring.expert_journal_bonus.is_nan() || self.scoring.expert_journal_bonus < 1.0 {
            return invalid("scoring.expert_journal_bonus", "must be at least 1.0");
        }
        if self.preferences.recency_priority.is_nan() || self.preferences.recency_priority < 0.0 {
            return invalid("preferences.recency_priority", "must not be negative");
        }
        if !unit.contains(&self.preferences.specialty_mismatch_penalty) {
            return invalid("preferences.specialty_mismatch_penalty", "must be within [0, 1]");
        }
        Ok(())
    }
}

/// What to do with a record whose identity key was already seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the first-seen record, drop later duplicates.
    #[default]
    KeepFirst,
    /// Keep the first-seen record but fill its empty fields from later duplicates.
    MergeFields,
}

/// Tier execution and fallback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Result count used when a request does not specify one.
    pub default_max_results: usize,
    /// Upper bound on records requested from one source per call.
    pub max_results_per_call: usize,
    /// A tier needs at least `min(this, max_results)` records to be accepted.
    pub min_satisfying_results: usize,
    /// Records whose medical-relevance sub-score falls below this are dropped.
    pub min_medical_relevance: f64,
    pub duplicate_policy: DuplicatePolicy,
    /// Source used for the emergency query instead of the most reliable one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_source: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_max_results: 20,
            max_results_per_call: 25,
            min_satisfying_results: 5,
            min_medical_relevance: 0.3,
            duplicate_policy: DuplicatePolicy::KeepFirst,
            emergency_source: None,
        }
    }
}

/// Credentials and HTTP settings handed to source connectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Names of the sources to construct. Empty means all known sources.
    pub enabled: Vec<String>,
    /// Contact address sent to APIs with a polite pool (Crossref, OpenAlex, NCBI).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ncbi_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_scholar_api_key: Option<String>,
    /// Per-call timeout enforced by the gateway.
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub response_cache_ttl_secs: u64,
    pub response_cache_max_entries: usize,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: Vec::new(),
            contact_email: None,
            ncbi_api_key: None,
            semantic_scholar_api_key: None,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            response_cache_ttl_secs: 900,
            response_cache_max_entries: 256,
        }
    }
}

impl SourcesConfig {
    /// Whether a source should be constructed.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.is_empty() || self.enabled.iter().any(|n| n == name)
    }
}

/// Retry policy applied by the source gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    /// Add up to 25% jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 8_000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Ranking and insight cut-offs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Score at or above which a result counts as high confidence.
    pub high_confidence_cutoff: f64,
    /// Multiplier for top-tier journals on expert-complexity queries.
    pub expert_journal_bonus: f64,
    /// Age in years within which a record counts as recent.
    pub recent_window_years: i32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            high_confidence_cutoff: 0.7,
            expert_journal_bonus: 1.1,
            recent_window_years: 2,
        }
    }
}

/// How strictly the evidence hierarchy is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceHierarchy {
    Strict,
    #[default]
    Standard,
    Relaxed,
}

impl EvidenceHierarchy {
    /// Multiplier applied to the evidence weight.
    pub fn multiplier(&self) -> f64 {
        match self {
            EvidenceHierarchy::Strict => 1.3,
            EvidenceHierarchy::Standard => 1.0,
            EvidenceHierarchy::Relaxed => 0.7,
        }
    }
}

/// Per-user ranking preferences fed to the adaptive weight engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    /// Multiplier on the recency weight (1.0 = neutral).
    pub recency_priority: f64,
    pub evidence_hierarchy: EvidenceHierarchy,
    /// The user's own specialty, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<MedicalDomain>,
    /// Fraction removed from the medical-relevance weight when the query's
    /// specialty differs from the user's.
    pub specialty_mismatch_penalty: f64,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            recency_priority: 1.0,
            evidence_hierarchy: EvidenceHierarchy::Standard,
            specialty: None,
            specialty_mismatch_penalty: 0.2,
        }
    }
}

/// Term cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 4_096,
        }
    }
}

/// Load configuration by merging defaults, user config, workspace config,
/// environment, and explicit overrides.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&MedlitConfig>,
) -> Result<MedlitConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(MedlitConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("org", "medlit", "medlit") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".medlit").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    figment = figment.merge(Env::prefixed("MEDLIT_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: MedlitConfig = figment
        .extract()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
    config.validate()?;
    Ok(config)
}

/// Check whether any MedLit configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(config_dir) = directories::ProjectDirs::from("org", "medlit", "medlit")
        && config_dir.config_dir().join("config.toml").exists()
    {
        return true;
    }
    workspace.is_some_and(|ws| ws.join(".medlit").join("config.toml").exists())
}
