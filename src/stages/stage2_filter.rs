use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::llm::{build_c2_user_prompt, gate_verdict_schema, with_backoff, ContentBackend, SYSTEM_PROMPT_C2_GATES};
use crate::models::{GateResult, PipelineConfig, Segment, SegmentGate, SegmentVerdict};

#[derive(Debug)]
pub struct Stage2Result {
    pub verdicts: Vec<SegmentVerdict>,
    /// Segments that survived all five gates, in input order.
    pub survived: Vec<Segment>,
}

/// Execute Stage 2 (C2): evaluate the five admission gates for every
/// candidate segment. Calls fan out concurrently, bounded by
/// `config.concurrency_cap`, but results are reassembled in input order
/// so downstream stages see a deterministic sequence.
pub async fn execute_stage2(backend: &dyn ContentBackend, segments: &[Segment], config: &PipelineConfig) -> Result<Stage2Result> {
    let cap = config.concurrency_cap.max(1);

    let indexed: Vec<(usize, SegmentVerdict)> = stream::iter(segments.iter().enumerate())
        .map(|(idx, segment)| async move {
            let verdict = evaluate_segment(backend, segment, config).await;
            (idx, verdict)
        })
        .buffer_unordered(cap)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .map(|(idx, result)| match result {
            Ok(verdict) => (idx, verdict),
            Err(e) => {
                warn!("Stage 2: segment {} failed gating entirely, treating as rejected: {e}", segments[idx].segment_id);
                (idx, SegmentVerdict {
                    segment_id: segments[idx].segment_id.clone(),
                    gate_results: vec![GateResult::new("rebuttability", false, format!("gate evaluation error: {e}"))],
                    survived: false,
                    failed_gate: Some(SegmentGate::Rebuttability),
                })
            }
        })
        .collect();

    let mut indexed = indexed;
    indexed.sort_by_key(|(idx, _)| *idx);
    let verdicts: Vec<SegmentVerdict> = indexed.into_iter().map(|(_, v)| v).collect();

    let survived: Vec<Segment> = segments
        .iter()
        .zip(verdicts.iter())
        .filter(|(_, v)| v.survived)
        .map(|(s, _)| s.clone())
        .collect();

    info!("Stage 2: {}/{} segments survived admission gating", survived.len(), segments.len());

    Ok(Stage2Result { verdicts, survived })
}

async fn evaluate_segment(backend: &dyn ContentBackend, segment: &Segment, config: &PipelineConfig) -> Result<SegmentVerdict> {
    let schema = gate_verdict_schema();
    let prompt = format!("{SYSTEM_PROMPT_C2_GATES}\n\n{}", build_c2_user_prompt(segment));

    let raw = with_backoff(&config.retry, &format!("stage2.{}", segment.segment_id), || {
        backend.generate_structured(&prompt, &schema, config.stage2_filter.temperature)
    })
    .await
    .with_context(|| format!("Stage 2: gate evaluation failed for {}", segment.segment_id))?;

    let gates = raw.get("gates").cloned().context("Stage 2: response missing 'gates'")?;
    let gates: Vec<RawGate> = serde_json::from_value(gates).context("Stage 2: failed to deserialize gate list")?;

    let mut by_id: std::collections::HashMap<String, RawGate> = gates.into_iter().map(|g| (g.gate_id.clone(), g)).collect();

    let ordered: Vec<(SegmentGate, GateResult)> = SegmentGate::ORDER
        .iter()
        .filter_map(|gate| {
            let key = gate_key(*gate);
            by_id.remove(key).map(|g| {
                let mut result = GateResult::new(g.gate_id, g.passed, g.reason);
                if let Some(evidence) = g.evidence {
                    result = result.with_evidence(evidence);
                }
                (*gate, result)
            })
        })
        .collect();

    Ok(SegmentVerdict::from_gate_results(segment.segment_id.clone(), ordered))
}

fn gate_key(gate: SegmentGate) -> &'static str {
    match gate {
        SegmentGate::Rebuttability => "rebuttability",
        SegmentGate::Verifiability => "verifiability",
        SegmentGate::AccuracyAtRisk => "accuracy_at_risk",
        SegmentGate::Harm => "harm",
        SegmentGate::ContextSufficiency => "context_sufficiency",
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct RawGate {
    gate_id: String,
    passed: bool,
    reason: String,
    #[serde(default)]
    evidence: Option<String>,
}
