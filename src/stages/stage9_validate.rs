use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::llm::{
    build_c8_rewrite_prompt, build_c9_parse_prompt, build_c9_search_prompt, fact_validation_schema, rewrite_schema, with_backoff,
    ContentBackend, SYSTEM_PROMPT_C8_REWRITE, SYSTEM_PROMPT_C9_PARSE, SYSTEM_PROMPT_C9_VALIDATE,
};
use crate::models::{PipelineConfig, RebuttalVerification, Script, ScriptSection, SelectedSegment, Source, VerdictKind};

#[derive(Debug, Serialize)]
pub struct Stage9Result {
    pub checked: usize,
    pub flagged_segments: usize,
    pub rewritten: usize,
    /// The run must be marked degraded if any flagged claim survives the
    /// single targeted rewrite attempt (spec.md §4.9).
    pub degraded: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct FlaggedClaim {
    claim: String,
    verdict: VerdictKind,
    rationale: String,
    #[serde(default)]
    #[allow(dead_code)]
    sources: Vec<Source>,
}

/// Execute Stage 9 (C9): spot-check the rebuttal text this pipeline
/// itself wrote — not the original interview claims — against a fresh
/// grounded search. A flagged confirmed-false claim gets one targeted
/// rewrite, but only if C8 hasn't already spent that segment's entire
/// rewrite budget; if no slot remains, or the rewrite still doesn't
/// clear, the run is marked degraded rather than silently publishing a
/// self-contradicting rebuttal.
pub async fn execute_stage9(
    backend: &dyn ContentBackend,
    script: &mut Script,
    selected: &[SelectedSegment],
    c8_verifications: &[RebuttalVerification],
    persona: &str,
    config: &PipelineConfig,
) -> Result<Stage9Result> {
    let post_clip_ids: Vec<String> = script
        .sections
        .iter()
        .filter_map(|s| match s {
            ScriptSection::PostClip { segment_id, .. } => Some(segment_id.clone()),
            _ => None,
        })
        .collect();

    let mut checked = 0;
    let mut flagged_segments = 0;
    let mut rewritten = 0;
    let mut degraded = false;

    for segment_id in post_clip_ids {
        let rebuttal_text = script
            .sections
            .iter()
            .find_map(|s| match s {
                ScriptSection::PostClip { segment_id: id, rebuttal_text, .. } if *id == segment_id => Some(rebuttal_text.clone()),
                _ => None,
            })
            .unwrap_or_default();
        if rebuttal_text.trim().is_empty() {
            continue;
        }
        checked += 1;

        let flagged = spot_check(backend, &rebuttal_text, config).await?;
        let false_claims: Vec<&FlaggedClaim> = flagged.iter().filter(|c| c.verdict == VerdictKind::ConfirmedFalse).collect();
        if false_claims.is_empty() {
            continue;
        }

        flagged_segments += 1;
        warn!("Stage 9: {} rebuttal has {} self-asserted claim(s) that do not hold up", segment_id, false_claims.len());

        let Some(selected_segment) = selected.iter().find(|s| s.segment_id() == segment_id) else {
            degraded = true;
            continue;
        };

        let rewrites_used_by_c8 = c8_verifications
            .iter()
            .find(|v| v.segment_id == segment_id)
            .map(|v| v.attempt_count().saturating_sub(1))
            .unwrap_or(0);
        if rewrites_used_by_c8 >= config.max_rewrite_attempts {
            degraded = true;
            warn!("Stage 9: {} has no rewrite budget left after C8, marking run degraded", segment_id);
            continue;
        }

        let failure_reasons: Vec<String> = false_claims.iter().map(|c| format!("{}: {}", c.claim, c.rationale)).collect();
        let rewritten_text = rewrite_once(backend, selected_segment, &rebuttal_text, &failure_reasons, persona, config).await?;
        let recheck = spot_check(backend, &rewritten_text, config).await?;
        let still_false = recheck.iter().any(|c| c.verdict == VerdictKind::ConfirmedFalse);

        for section in &mut script.sections {
            if let ScriptSection::PostClip { segment_id: id, rebuttal_text, .. } = section {
                if *id == segment_id {
                    *rebuttal_text = rewritten_text.clone();
                }
            }
        }
        rewritten += 1;

        if still_false {
            degraded = true;
            warn!("Stage 9: {} still has unresolved claims after targeted rewrite, marking run degraded", segment_id);
        }
    }

    info!(
        "Stage 9: checked {} rebuttals, {} flagged, {} rewritten, degraded={}",
        checked, flagged_segments, rewritten, degraded
    );

    Ok(Stage9Result { checked, flagged_segments, rewritten, degraded })
}

async fn spot_check(backend: &dyn ContentBackend, rebuttal_text: &str, config: &PipelineConfig) -> Result<Vec<FlaggedClaim>> {
    let search_prompt = format!("{SYSTEM_PROMPT_C9_VALIDATE}\n\n{}", build_c9_search_prompt(rebuttal_text));
    let (research_text, _sources) = with_backoff(&config.retry, "stage9.search", || {
        backend.generate_with_web_search(&search_prompt, config.stage9_validator.temperature)
    })
    .await
    .context("Stage 9: spot-check web search failed")?;

    let schema = fact_validation_schema();
    let parse_prompt = format!("{SYSTEM_PROMPT_C9_PARSE}\n\n{}", build_c9_parse_prompt(&research_text));
    let raw = with_backoff(&config.retry, "stage9.parse", || backend.generate_structured(&parse_prompt, &schema, config.stage9_validator.temperature))
        .await
        .context("Stage 9: spot-check parse failed")?;

    let claims = raw.get("flagged_claims").cloned().context("Stage 9: response missing 'flagged_claims'")?;
    serde_json::from_value(claims).context("Stage 9: failed to deserialize flagged claims")
}

async fn rewrite_once(
    backend: &dyn ContentBackend,
    selected_segment: &SelectedSegment,
    previous_text: &str,
    failure_reasons: &[String],
    persona: &str,
    config: &PipelineConfig,
) -> Result<String> {
    let schema = rewrite_schema();
    let prompt = format!(
        "{SYSTEM_PROMPT_C8_REWRITE}\n\n{}",
        build_c8_rewrite_prompt(&selected_segment.segment, &selected_segment.verification, previous_text, failure_reasons, persona)
    );
    let raw = with_backoff(&config.retry, &format!("stage9.rewrite.{}", selected_segment.segment_id()), || {
        backend.generate_structured(&prompt, &schema, config.stage8_rewriter.temperature)
    })
    .await
    .context("Stage 9: targeted rewrite call failed")?;

    Ok(raw.get("rebuttal_text").and_then(|v| v.as_str()).unwrap_or(previous_text).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ArtifactRef;
    use crate::models::{ContextRange, HarmCategory, ScriptMetadata, Segment, VerificationVerdict};
    use async_trait::async_trait;
    use serde_json::json;

    struct FlagsOnceBackend;

    #[async_trait]
    impl ContentBackend for FlagsOnceBackend {
        async fn generate_text(&self, _: &str, _: f64, _: u32) -> Result<String> {
            unreachable!()
        }
        async fn generate_structured(&self, prompt: &str, _: &serde_json::Value, _: f64) -> Result<serde_json::Value> {
            if prompt.contains("rewriting a rebuttal") {
                return Ok(json!({"rebuttal_text": "a corrected rebuttal with an accurate figure"}));
            }
            if prompt.contains("studies show a 40% increase") {
                Ok(json!({"flagged_claims": [{"claim": "40% increase", "verdict": "confirmed_true", "rationale": "the figure is accurate now", "sources": []}]}))
            } else {
                Ok(json!({"flagged_claims": [{"claim": "40% increase", "verdict": "confirmed_false", "rationale": "the real figure is 12%", "sources": []}]}))
            }
        }
        async fn generate_with_web_search(&self, prompt: &str, _: f64) -> Result<(String, Vec<Source>)> {
            Ok((prompt.to_string(), vec![]))
        }
        async fn upload_artifact(&self, _: &str, _: &str) -> Result<ArtifactRef> {
            unreachable!()
        }
        async fn generate_with_artifact(&self, _: &ArtifactRef, _: &str, _: &serde_json::Value, _: f64) -> Result<serde_json::Value> {
            unreachable!()
        }
    }

    fn script_with_claim() -> Script {
        Script {
            metadata: ScriptMetadata::default(),
            sections: vec![
                ScriptSection::PreClip { segment_id: "seg_1".into(), text: "setup".into(), est_duration_s: 5.0 },
                ScriptSection::ClipRef { segment_id: "seg_1".into(), source_start: 0.0, source_end: 10.0 },
                ScriptSection::PostClip {
                    segment_id: "seg_1".into(),
                    rebuttal_text: "studies show a 40% increase, which is simply untrue".into(),
                    est_duration_s: 5.0,
                    citations: vec![],
                },
            ],
        }
    }

    fn selected() -> Vec<SelectedSegment> {
        vec![SelectedSegment {
            segment: Segment {
                segment_id: "seg_1".into(),
                title: "claim".into(),
                primary_speaker: "guest".into(),
                severity_hint: 0.5,
                harm_category: HarmCategory::default(),
                rhetorical_strategies: vec![],
                societal_impacts: vec![],
                confidence: 0.8,
                reasoning: "r".into(),
                clip_context_description: "c".into(),
                quotes: vec![],
                context_range: ContextRange { start: 0.0, end: 10.0 },
                duration_seconds: 10.0,
            },
            verification: VerificationVerdict { kind: VerdictKind::ConfirmedFalse, sources: vec![], rationale: "r".into() },
            diversity_topic: "topic".into(),
            selection_rank: 0,
            recovery_flag: false,
        }]
    }

    fn c8_verification(segment_id: &str, attempts: u32) -> RebuttalVerification {
        RebuttalVerification {
            segment_id: segment_id.to_string(),
            attempts: (1..=attempts)
                .map(|n| crate::models::RebuttalAttempt {
                    attempt: n,
                    rebuttal_text: "text".into(),
                    temperature: 0.4,
                    gate_results: vec![],
                    passed: n == attempts,
                })
                .collect(),
            status: crate::models::RebuttalStatus::Accepted { attempts },
        }
    }

    #[tokio::test]
    async fn flagged_claim_is_rewritten_and_clears_on_recheck() {
        let backend = FlagsOnceBackend;
        let mut script = script_with_claim();
        let config = PipelineConfig::default();

        let result = execute_stage9(&backend, &mut script, &selected(), &[], "persona", &config).await.unwrap();
        assert_eq!(result.checked, 1);
        assert_eq!(result.flagged_segments, 1);
        assert_eq!(result.rewritten, 1);
        assert!(!result.degraded);

        let final_text = script
            .sections
            .iter()
            .find_map(|s| match s {
                ScriptSection::PostClip { rebuttal_text, .. } => Some(rebuttal_text.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(final_text, "a corrected rebuttal with an accurate figure");
    }

    #[tokio::test]
    async fn clean_rebuttal_needs_no_rewrite() {
        struct CleanBackend;
        #[async_trait]
        impl ContentBackend for CleanBackend {
            async fn generate_text(&self, _: &str, _: f64, _: u32) -> Result<String> {
                unreachable!()
            }
            async fn generate_structured(&self, _: &str, _: &serde_json::Value, _: f64) -> Result<serde_json::Value> {
                Ok(json!({"flagged_claims": []}))
            }
            async fn generate_with_web_search(&self, prompt: &str, _: f64) -> Result<(String, Vec<Source>)> {
                Ok((prompt.to_string(), vec![]))
            }
            async fn upload_artifact(&self, _: &str, _: &str) -> Result<ArtifactRef> {
                unreachable!()
            }
            async fn generate_with_artifact(&self, _: &ArtifactRef, _: &str, _: &serde_json::Value, _: f64) -> Result<serde_json::Value> {
                unreachable!()
            }
        }

        let backend = CleanBackend;
        let mut script = script_with_claim();
        let config = PipelineConfig::default();
        let result = execute_stage9(&backend, &mut script, &selected(), &[], "persona", &config).await.unwrap();
        assert_eq!(result.flagged_segments, 0);
        assert_eq!(result.rewritten, 0);
        assert!(!result.degraded);
    }

    #[tokio::test]
    async fn flagged_claim_with_no_c8_budget_remaining_skips_rewrite_and_degrades() {
        let backend = FlagsOnceBackend;
        let mut script = script_with_claim();
        let config = PipelineConfig::default();
        // C8 already spent every rewrite slot on this segment.
        let c8_verifications = vec![c8_verification("seg_1", config.max_rewrite_attempts + 1)];

        let result = execute_stage9(&backend, &mut script, &selected(), &c8_verifications, "persona", &config).await.unwrap();
        assert_eq!(result.flagged_segments, 1);
        assert_eq!(result.rewritten, 0, "no rewrite slot remains, C9 must not spend one");
        assert!(result.degraded);

        let final_text = script
            .sections
            .iter()
            .find_map(|s| match s {
                ScriptSection::PostClip { rebuttal_text, .. } => Some(rebuttal_text.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(final_text, "studies show a 40% increase, which is simply untrue", "unrewritten text must be left untouched");
    }
}
