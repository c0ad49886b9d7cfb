use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::llm::{build_c1_user_prompt, segment_list_schema, validate_all, with_backoff, ContentBackend, SYSTEM_PROMPT_C1_ANALYZER};
use crate::models::{EpisodeMetadata, EpisodeResources, PipelineConfig, Segment, Transcript};

/// Output of the Transcript Analyzer (C1): the raw candidate list before
/// any admission gating.
#[derive(Debug)]
pub struct Stage1Result {
    pub segments: Vec<Segment>,
    /// Segments the model produced that failed mechanical validation
    /// even after the one permitted correction retry, and were dropped.
    pub dropped_invalid: usize,
}

/// Execute Stage 1 (C1): upload the full transcript as an artifact, ask
/// the model to identify candidate segments against the host's rules,
/// and mechanically validate every quote before anything downstream
/// sees it. One correction retry is permitted per spec.md §4.1; segments
/// still invalid afterward are dropped rather than propagated.
pub async fn execute_stage1(
    backend: &dyn ContentBackend,
    transcript: &Transcript,
    metadata: &EpisodeMetadata,
    resources: &EpisodeResources,
    config: &PipelineConfig,
) -> Result<Stage1Result> {
    let transcript_text = transcript.full_text();
    let artifact = with_backoff(&config.retry, "stage1.upload_transcript", || {
        backend.upload_artifact(&transcript_text, "transcript.txt")
    })
    .await
    .context("Stage 1: failed to upload transcript artifact")?;

    let schema = segment_list_schema();
    let prompt = build_c1_user_prompt(metadata, &resources.analysis_rules);
    let full_prompt = format!("{SYSTEM_PROMPT_C1_ANALYZER}\n\n{prompt}");

    let raw = with_backoff(&config.retry, "stage1.analyze", || {
        backend.generate_with_artifact(&artifact, &full_prompt, &schema, config.stage1_analyzer.temperature)
    })
    .await
    .context("Stage 1: analysis call failed")?;

    let mut segments = parse_segments(&raw)?;
    info!("Stage 1: model proposed {} candidate segments", segments.len());

    let mut validations = validate_all(&segments, transcript, config.quote_timestamp_tolerance_s);
    if !validations.is_empty() {
        warn!("Stage 1: {} segments failed validation, attempting one correction retry", validations.len());
        let feedback = crate::llm::format_correction_feedback(&validations);
        let retry_prompt = format!("{full_prompt}\n\n# Correction needed\n{feedback}");
        let retried = with_backoff(&config.retry, "stage1.analyze_retry", || {
            backend.generate_with_artifact(&artifact, &retry_prompt, &schema, config.stage1_analyzer.temperature)
        })
        .await
        .context("Stage 1: correction retry call failed")?;
        segments = parse_segments(&retried)?;
        validations = validate_all(&segments, transcript, config.quote_timestamp_tolerance_s);
    }

    let invalid_ids: std::collections::HashSet<String> = validations.iter().map(|v| v.segment_id.clone()).collect();
    let dropped_invalid = invalid_ids.len();
    if dropped_invalid > 0 {
        warn!("Stage 1: dropping {} segments still invalid after correction retry", dropped_invalid);
    }
    segments.retain(|s| !invalid_ids.contains(&s.segment_id));

    if segments.len() > config.max_candidate_segments {
        info!("Stage 1: capping {} candidates to {}", segments.len(), config.max_candidate_segments);
        segments.truncate(config.max_candidate_segments);
    }

    Ok(Stage1Result { segments, dropped_invalid })
}

fn parse_segments(raw: &serde_json::Value) -> Result<Vec<Segment>> {
    let segments = raw
        .get("segments")
        .cloned()
        .context("Stage 1: response missing 'segments' field")?;
    serde_json::from_value(segments).context("Stage 1: failed to deserialize segment list")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ArtifactRef;
    use crate::models::transcript::TranscriptTurn;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentBackend for FakeBackend {
        async fn generate_text(&self, _: &str, _: f64, _: u32) -> Result<String> {
            unreachable!()
        }
        async fn generate_structured(&self, _: &str, _: &serde_json::Value, _: f64) -> Result<serde_json::Value> {
            unreachable!()
        }
        async fn generate_with_web_search(&self, _: &str, _: f64) -> Result<(String, Vec<crate::models::Source>)> {
            unreachable!()
        }
        async fn upload_artifact(&self, _: &str, _: &str) -> Result<ArtifactRef> {
            Ok(ArtifactRef("file_123".to_string()))
        }
        async fn generate_with_artifact(
            &self,
            _: &ArtifactRef,
            _: &str,
            _: &serde_json::Value,
            _: f64,
        ) -> Result<serde_json::Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                // First attempt: a fabricated quote that must fail validation.
                Ok(json!({
                    "segments": [{
                        "segment_id": "seg_1",
                        "title": "Bad claim",
                        "primary_speaker": "guest",
                        "severity_hint": 0.7,
                        "harm_category": {"primary": "misinformation", "subtypes": []},
                        "rhetorical_strategies": [],
                        "societal_impacts": [],
                        "confidence": 0.8,
                        "reasoning": "r",
                        "clip_context_description": "c",
                        "quotes": [{"timestamp": 5.0, "speaker": "guest", "quote": "fabricated text not in transcript"}],
                        "context_range": {"start": 5.0, "end": 10.0},
                        "duration_seconds": 5.0
                    }]
                }))
            } else {
                Ok(json!({"segments": []}))
            }
        }
    }

    fn transcript() -> Transcript {
        Transcript {
            turns: vec![TranscriptTurn {
                start: 5.0,
                end: 10.0,
                speaker_id: "guest".into(),
                speaker_label: None,
                text: "real transcript text".into(),
            }],
        }
    }

    #[tokio::test]
    async fn invalid_segment_is_dropped_after_retry() {
        let backend = FakeBackend { calls: AtomicUsize::new(0) };
        let metadata = EpisodeMetadata {
            host_name: "Host".into(),
            guest_name: "Guest".into(),
            episode_title: "Ep 1".into(),
            host_profile_ref: None,
            analysis_rules_ref: "rules.md".into(),
        };
        let resources = EpisodeResources { analysis_rules: "rules".into(), host_profile: None, persona: "persona".into() };
        let config = PipelineConfig::default();

        let result = execute_stage1(&backend, &transcript(), &metadata, &resources, &config).await.unwrap();
        assert_eq!(result.segments.len(), 0);
        assert_eq!(result.dropped_invalid, 1);
    }
}
