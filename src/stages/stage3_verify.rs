use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::llm::{
    build_c3_parse_prompt, build_c3_search_prompt, verification_verdict_schema, with_backoff, ContentBackend,
    SYSTEM_PROMPT_C3_PARSE, SYSTEM_PROMPT_C3_VERIFY,
};
use crate::models::{PipelineConfig, Segment, VerificationVerdict};

#[derive(Debug)]
pub struct Stage3Result {
    pub verified: Vec<(Segment, VerificationVerdict)>,
    /// Segments whose claim turned out to be true and were removed per
    /// spec.md §4.3 — a confirmed-true claim must never reach the script.
    pub removed_confirmed_true: usize,
}

/// Execute Stage 3 (C3): for every segment whose quotes trip the
/// date-sensitive keyword families, run a grounded web-search check
/// followed by a structured parse of the result. Segments that don't
/// trip any keyword family are marked not-applicable without a call.
pub async fn execute_stage3(backend: &dyn ContentBackend, segments: &[Segment], config: &PipelineConfig) -> Result<Stage3Result> {
    let cap = config.concurrency_cap.max(1);

    let results: Vec<(usize, VerificationVerdict)> = stream::iter(segments.iter().enumerate())
        .map(|(idx, segment)| async move {
            let verdict = verify_segment(backend, segment, config).await.unwrap_or_else(|e| {
                warn!("Stage 3: verification failed for {}, treating as unverified: {e}", segment.segment_id);
                VerificationVerdict {
                    kind: crate::models::VerdictKind::Unverified,
                    sources: vec![],
                    rationale: format!("verification call failed: {e}"),
                }
            });
            (idx, verdict)
        })
        .buffer_unordered(cap)
        .collect::<Vec<_>>()
        .await;

    let mut results = results;
    results.sort_by_key(|(idx, _)| *idx);

    let mut verified = Vec::new();
    let mut removed_confirmed_true = 0;
    for (idx, verdict) in results {
        if verdict.must_be_excluded() {
            removed_confirmed_true += 1;
            info!("Stage 3: removing {} — claim confirmed true", segments[idx].segment_id);
            continue;
        }
        verified.push((segments[idx].clone(), verdict));
    }

    Ok(Stage3Result { verified, removed_confirmed_true })
}

/// Exposed for C5: a recovered segment never passed through C3, so it
/// must be verified individually before it can be inserted into the
/// selection.
pub async fn verify_single_segment(backend: &dyn ContentBackend, segment: &Segment, config: &PipelineConfig) -> Result<VerificationVerdict> {
    verify_segment(backend, segment, config).await
}

async fn verify_segment(backend: &dyn ContentBackend, segment: &Segment, config: &PipelineConfig) -> Result<VerificationVerdict> {
    let trigger_quote = segment
        .quotes
        .iter()
        .find(|q| config.keyword_families.matches(&q.quote))
        .or_else(|| if config.keyword_families.matches(&segment.title) { segment.quotes.first() } else { None });

    let Some(quote) = trigger_quote else {
        return Ok(VerificationVerdict::not_applicable());
    };

    let search_prompt = format!("{SYSTEM_PROMPT_C3_VERIFY}\n\n{}", build_c3_search_prompt(segment, quote));
    let (research_text, sources) = with_backoff(&config.retry, &format!("stage3.search.{}", segment.segment_id), || {
        backend.generate_with_web_search(&search_prompt, config.stage3_verifier.temperature)
    })
    .await
    .with_context(|| format!("Stage 3: web search failed for {}", segment.segment_id))?;

    let schema = verification_verdict_schema();
    let parse_prompt = format!("{SYSTEM_PROMPT_C3_PARSE}\n\n{}", build_c3_parse_prompt(&research_text));
    let raw = with_backoff(&config.retry, &format!("stage3.parse.{}", segment.segment_id), || {
        backend.generate_structured(&parse_prompt, &schema, config.stage3_verifier.temperature)
    })
    .await
    .with_context(|| format!("Stage 3: verdict parse failed for {}", segment.segment_id))?;

    let mut verdict: VerificationVerdict = serde_json::from_value(raw).context("Stage 3: failed to deserialize verdict")?;
    if verdict.sources.is_empty() {
        verdict.sources = sources;
    }
    if !verdict.has_required_sources() {
        warn!("Stage 3: {} verdict {:?} has no retrievable sources, downgrading to unverified", segment.segment_id, verdict.kind);
        verdict = VerificationVerdict {
            kind: crate::models::VerdictKind::Unverified,
            sources: vec![],
            rationale: format!("downgraded: grounded search returned no sources for a {:?} verdict", verdict.kind),
        };
    }
    Ok(verdict)
}
