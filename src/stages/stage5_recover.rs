use anyhow::{Context, Result};
use tracing::info;

use super::stage3_verify::verify_single_segment;
use crate::llm::{build_c5_recovery_prompt, recovery_verdict_schema, with_backoff, ContentBackend, SYSTEM_PROMPT_C5_RECOVERY};
use crate::models::{PipelineConfig, Segment, SegmentVerdict, SelectedSegment};

#[derive(Debug)]
pub struct Stage5Result {
    pub evaluated: usize,
    pub admitted: usize,
}

/// Execute Stage 5 (C5): re-examine the top-M C2 rejections eligible for
/// recovery (gates 2, 4, 5 only — gate 1 and 3 rejections never recover),
/// admit at most K under a relaxed second opinion, verify each admitted
/// segment (it skipped C3 the first time through), and fold it into the
/// existing C4 selection — displacing the lowest-quality entries if the
/// target count would otherwise be exceeded.
pub async fn execute_stage5(
    backend: &dyn ContentBackend,
    rejected: &[(Segment, SegmentVerdict)],
    selected: &mut Vec<SelectedSegment>,
    target_n: usize,
    config: &PipelineConfig,
) -> Result<Stage5Result> {
    let mut eligible: Vec<&(Segment, SegmentVerdict)> = rejected
        .iter()
        .filter(|(_, v)| v.failed_gate.map(|g| g.is_recoverable()).unwrap_or(false))
        .collect();

    eligible.sort_by(|a, b| {
        let score_a = a.0.confidence + a.0.severity_hint;
        let score_b = b.0.confidence + b.0.severity_hint;
        score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
    });
    eligible.truncate(config.sizing.recovery_candidates_m);
    let evaluated = eligible.len();

    let mut admitted_segments = Vec::new();
    for (segment, verdict) in eligible {
        if admitted_segments.len() >= config.sizing.recovery_admit_k {
            break;
        }
        let reason = verdict
            .gate_results
            .last()
            .map(|r| r.reason.clone())
            .unwrap_or_else(|| "rejected by admission gate".to_string());

        if second_opinion_readmits(backend, segment, &reason, config).await? {
            admitted_segments.push(segment.clone());
        }
    }

    let admitted = admitted_segments.len();
    info!("Stage 5: evaluated {} rejections, admitted {}", evaluated, admitted);

    for segment in admitted_segments {
        let verification = verify_single_segment(backend, &segment, config)
            .await
            .with_context(|| format!("Stage 5: verification failed for recovered segment {}", segment.segment_id))?;
        if verification.must_be_excluded() {
            info!("Stage 5: recovered segment {} confirmed true on verification, discarding", segment.segment_id);
            continue;
        }
        let topic = segment.harm_category.primary.to_lowercase();
        selected.push(SelectedSegment {
            segment,
            verification,
            diversity_topic: topic,
            selection_rank: usize::MAX,
            recovery_flag: true,
        });
    }

    if selected.len() > target_n {
        selected.sort_by(|a, b| b.quality_score().partial_cmp(&a.quality_score()).unwrap_or(std::cmp::Ordering::Equal));
        selected.truncate(target_n);
    }
    for (rank, s) in selected.iter_mut().enumerate() {
        s.selection_rank = rank;
    }

    Ok(Stage5Result { evaluated, admitted })
}

async fn second_opinion_readmits(backend: &dyn ContentBackend, segment: &Segment, rejection_reason: &str, config: &PipelineConfig) -> Result<bool> {
    let schema = recovery_verdict_schema();
    let prompt = format!("{SYSTEM_PROMPT_C5_RECOVERY}\n\n{}", build_c5_recovery_prompt(segment, rejection_reason));
    let raw = with_backoff(&config.retry, &format!("stage5.{}", segment.segment_id), || {
        backend.generate_structured(&prompt, &schema, config.stage5_recovery.temperature)
    })
    .await
    .with_context(|| format!("Stage 5: second-opinion call failed for {}", segment.segment_id))?;

    Ok(raw.get("readmit").and_then(|v| v.as_bool()).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ArtifactRef;
    use crate::models::{ContextRange, GateResult, HarmCategory, SegmentGate, VerdictKind, VerificationVerdict};
    use async_trait::async_trait;
    use serde_json::json;

    struct FakeBackend;

    #[async_trait]
    impl ContentBackend for FakeBackend {
        async fn generate_text(&self, _: &str, _: f64, _: u32) -> Result<String> {
            unreachable!()
        }
        async fn generate_structured(&self, prompt: &str, _: &serde_json::Value, _: f64) -> Result<serde_json::Value> {
            if prompt.contains("SECOND_OPINION") {
                Ok(json!({"readmit": true, "reason": "worth rebutting after all"}))
            } else {
                Ok(json!({"kind": "unverified", "sources": [], "rationale": "no clear determination"}))
            }
        }
        async fn generate_with_web_search(&self, _: &str, _: f64) -> Result<(String, Vec<crate::models::Source>)> {
            unreachable!()
        }
        async fn upload_artifact(&self, _: &str, _: &str) -> Result<ArtifactRef> {
            unreachable!()
        }
        async fn generate_with_artifact(&self, _: &ArtifactRef, _: &str, _: &serde_json::Value, _: f64) -> Result<serde_json::Value> {
            unreachable!()
        }
    }

    fn rejected_segment(id: &str) -> (Segment, SegmentVerdict) {
        let segment = Segment {
            segment_id: id.to_string(),
            title: "SECOND_OPINION candidate".into(),
            primary_speaker: "guest".into(),
            severity_hint: 0.6,
            harm_category: HarmCategory { primary: "topic".into(), subtypes: vec![] },
            rhetorical_strategies: vec![],
            societal_impacts: vec![],
            confidence: 0.7,
            reasoning: "r".into(),
            clip_context_description: "c".into(),
            quotes: vec![],
            context_range: ContextRange { start: 0.0, end: 1.0 },
            duration_seconds: 1.0,
        };
        let verdict = SegmentVerdict {
            segment_id: id.to_string(),
            gate_results: vec![GateResult::new("context_sufficiency", false, "not enough context")],
            survived: false,
            failed_gate: Some(SegmentGate::ContextSufficiency),
        };
        (segment, verdict)
    }

    #[tokio::test]
    async fn recoverable_rejection_is_readmitted_and_verified() {
        let backend = FakeBackend;
        let config = PipelineConfig::default();
        let rejected = vec![rejected_segment("seg_rej")];
        let mut selected: Vec<SelectedSegment> = vec![];

        let result = execute_stage5(&backend, &rejected, &mut selected, 5, &config).await.unwrap();
        assert_eq!(result.admitted, 1);
        assert_eq!(selected.len(), 1);
        assert!(selected[0].recovery_flag);
        assert_eq!(selected[0].verification.kind, VerdictKind::Unverified);
    }

    #[tokio::test]
    async fn non_recoverable_gate_is_never_offered_a_second_opinion() {
        let backend = FakeBackend;
        let config = PipelineConfig::default();
        let mut seg = rejected_segment("seg_rej");
        seg.1.failed_gate = Some(SegmentGate::Rebuttability);
        let mut selected: Vec<SelectedSegment> = vec![];

        let result = execute_stage5(&backend, &[seg], &mut selected, 5, &config).await.unwrap();
        assert_eq!(result.evaluated, 0);
        assert_eq!(result.admitted, 0);
    }
}
