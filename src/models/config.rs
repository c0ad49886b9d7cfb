use serde::{Deserialize, Serialize};

use super::BlockedPolicy;

/// Per-stage LLM invocation parameters: model identifier and
/// temperature. Every stage that calls the backend looks one of these
/// up by name rather than hardcoding a model string, so a single
/// config document can retune the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLlmConfig {
    pub model: String,
    pub temperature: f64,
}

impl Default for StageLlmConfig {
    fn default() -> Self {
        Self { model: "claude-sonnet-4-20250514".to_string(), temperature: 0.2 }
    }
}

/// Date-sensitive keyword families that trigger C3 (spec.md §4.3).
/// Host-/domain-agnostic: configuration, not code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordFamilies {
    pub death_or_assassination: Vec<String>,
    pub elections: Vec<String>,
    pub legislation_or_executive_action: Vec<String>,
    pub time_bound_events: Vec<String>,
}

impl Default for KeywordFamilies {
    fn default() -> Self {
        Self {
            death_or_assassination: vec!["dead".into(), "died".into(), "killed".into(), "assassinated".into(), "shot".into()],
            elections: vec!["election".into(), "elected".into(), "won the race".into(), "lost the race".into(), "primary".into()],
            legislation_or_executive_action: vec!["signed into law".into(), "executive order".into(), "passed the bill".into(), "vetoed".into()],
            time_bound_events: vec!["resigned".into(), "announced".into(), "took place".into(), "stepped down".into(), "indicted".into()],
        }
    }
}

impl KeywordFamilies {
    pub fn all_keywords(&self) -> impl Iterator<Item = &str> {
        self.death_or_assassination
            .iter()
            .chain(self.elections.iter())
            .chain(self.legislation_or_executive_action.iter())
            .chain(self.time_bound_events.iter())
            .map(String::as_str)
    }

    pub fn matches(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.all_keywords().any(|kw| lowered.contains(&kw.to_lowercase()))
    }
}

/// Sizing parameters for C4 (Diversity Selector) and C5 (Recovery).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Target segments per hour of transcript (default coefficient).
    pub per_hour: f64,
    pub min_n: usize,
    pub max_n: usize,
    /// C5: how many rejected segments to re-examine.
    pub recovery_candidates_m: usize,
    /// C5: at most how many to re-admit.
    pub recovery_admit_k: usize,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self { per_hour: 6.0, min_n: 4, max_n: 20, recovery_candidates_m: 5, recovery_admit_k: 2 }
    }
}

impl SizingConfig {
    pub fn target_n(&self, duration_hours: f64) -> usize {
        let raw = (self.per_hour * duration_hours).round() as i64;
        raw.clamp(self.min_n as i64, self.max_n as i64) as usize
    }
}

/// Retry/backoff policy shared by every stage that calls the LLM
/// backend (spec.md §5 "Retries").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { base_delay_ms: 1_000, backoff_factor: 2.0, max_delay_ms: 30_000, max_attempts: 4 }
    }
}

/// Timeouts, per spec.md §5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub per_call_s: u64,
    pub per_stage_s: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { per_call_s: 120, per_stage_s: 1_800 }
    }
}

/// The single configuration document enumerated in spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub stage1_analyzer: StageLlmConfig,
    pub stage2_filter: StageLlmConfig,
    pub stage3_verifier: StageLlmConfig,
    pub stage4_diversity_classifier: StageLlmConfig,
    pub stage5_recovery: StageLlmConfig,
    pub stage6_structure: StageLlmConfig,
    pub stage6_creative: StageLlmConfig,
    pub stage8_verifier: StageLlmConfig,
    pub stage8_rewriter: StageLlmConfig,
    pub stage9_validator: StageLlmConfig,

    pub concurrency_cap: usize,
    pub sizing: SizingConfig,
    pub keyword_families: KeywordFamilies,
    pub persona_ref: String,
    pub host_rules_ref: String,
    pub words_per_minute: f64,
    pub clip_padding_s: f64,
    pub blocked_policy: BlockedPolicy,
    /// N_max: maximum rewrite attempts per rebuttal (C8).
    pub max_rewrite_attempts: u32,
    /// Rewrite temperatures by attempt number (0-indexed); verification
    /// temperature is held low and lives on `stage8_verifier`.
    pub rewrite_temperatures: Vec<f64>,
    pub max_candidate_segments: usize,
    pub retry: RetryConfig,
    pub timeouts: TimeoutConfig,
    /// Tolerance, in seconds, for quote-timestamp alignment to a
    /// transcript turn boundary (spec.md §4.1 contract).
    pub quote_timestamp_tolerance_s: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage1_analyzer: StageLlmConfig { temperature: 0.1, ..StageLlmConfig::default() },
            stage2_filter: StageLlmConfig { temperature: 0.0, ..StageLlmConfig::default() },
            stage3_verifier: StageLlmConfig { temperature: 0.0, ..StageLlmConfig::default() },
            stage4_diversity_classifier: StageLlmConfig { temperature: 0.0, ..StageLlmConfig::default() },
            stage5_recovery: StageLlmConfig { temperature: 0.2, ..StageLlmConfig::default() },
            stage6_structure: StageLlmConfig { temperature: 0.3, ..StageLlmConfig::default() },
            stage6_creative: StageLlmConfig { temperature: 0.4, ..StageLlmConfig::default() },
            stage8_verifier: StageLlmConfig { temperature: 0.0, ..StageLlmConfig::default() },
            stage8_rewriter: StageLlmConfig { temperature: 0.4, ..StageLlmConfig::default() },
            stage9_validator: StageLlmConfig { temperature: 0.0, ..StageLlmConfig::default() },
            concurrency_cap: 4,
            sizing: SizingConfig::default(),
            keyword_families: KeywordFamilies::default(),
            persona_ref: "persona.md".to_string(),
            host_rules_ref: "host_rules.md".to_string(),
            words_per_minute: 165.0,
            clip_padding_s: 0.0,
            blocked_policy: BlockedPolicy::DropSegment,
            max_rewrite_attempts: 3,
            rewrite_temperatures: vec![0.4, 0.55, 0.7],
            max_candidate_segments: 20,
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            quote_timestamp_tolerance_s: 0.5,
        }
    }
}

impl PipelineConfig {
    /// The rewrite temperature for the given attempt number (1-indexed),
    /// clamped to the last configured value if attempts exceed the list.
    pub fn rewrite_temperature(&self, attempt: u32) -> f64 {
        let idx = (attempt.saturating_sub(1)) as usize;
        self.rewrite_temperatures
            .get(idx)
            .copied()
            .or_else(|| self.rewrite_temperatures.last().copied())
            .unwrap_or(0.5)
    }
}
