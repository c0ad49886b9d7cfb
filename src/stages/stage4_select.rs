use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::info;

use crate::llm::{build_c4_topic_prompt, diversity_topic_schema, with_backoff, ContentBackend, SYSTEM_PROMPT_C4_TOPIC};
use crate::models::{PipelineConfig, Segment, SelectedSegment, VerificationVerdict};

#[derive(Debug)]
pub struct Stage4Result {
    pub selected: Vec<SelectedSegment>,
    /// Verified-but-not-selected segments, kept so C5 can restrict its
    /// recovery candidate pool to genuine C2/C4 rejections later if
    /// needed; currently C5 draws from C2 rejections directly.
    pub not_selected: Vec<(Segment, VerificationVerdict)>,
}

/// Execute Stage 4 (C4): assign a diversity topic to every verified
/// segment, cap how many of one topic can appear (`ceil(N/topics) + 1`),
/// and fill the target count `N` with a quality-ranked round-robin across
/// topics. Deterministic — no random tie-breaking, per spec.md's
/// non-goals.
pub async fn execute_stage4(
    backend: &dyn ContentBackend,
    verified: &[(Segment, VerificationVerdict)],
    duration_hours: f64,
    config: &PipelineConfig,
) -> Result<Stage4Result> {
    let n = config.sizing.target_n(duration_hours);

    let mut topics = Vec::with_capacity(verified.len());
    for (segment, _) in verified {
        topics.push(assign_topic(backend, segment, &topics, config).await?);
    }

    let mut by_topic: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, topic) in topics.iter().enumerate() {
        by_topic.entry(topic.clone()).or_default().push(idx);
    }
    for indices in by_topic.values_mut() {
        indices.sort_by(|&a, &b| {
            let qa = quality(&verified[a]);
            let qb = quality(&verified[b]);
            qb.partial_cmp(&qa).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    let topic_count = by_topic.len().max(1);
    let topic_cap = (n as f64 / topic_count as f64).ceil() as usize + 1;

    let mut topic_keys: Vec<String> = by_topic.keys().cloned().collect();
    topic_keys.sort();

    let mut taken: HashMap<String, usize> = HashMap::new();
    let mut cursors: HashMap<String, usize> = HashMap::new();
    let mut chosen_indices: Vec<usize> = Vec::new();

    'outer: loop {
        let mut progressed = false;
        for key in &topic_keys {
            if chosen_indices.len() >= n {
                break 'outer;
            }
            let cursor = cursors.entry(key.clone()).or_insert(0);
            let used = *taken.get(key).unwrap_or(&0);
            if used >= topic_cap {
                continue;
            }
            if let Some(&idx) = by_topic[key].get(*cursor) {
                chosen_indices.push(idx);
                *cursor += 1;
                *taken.entry(key.clone()).or_insert(0) += 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    let selected: Vec<SelectedSegment> = chosen_indices
        .iter()
        .enumerate()
        .map(|(rank, &idx)| SelectedSegment {
            segment: verified[idx].0.clone(),
            verification: verified[idx].1.clone(),
            diversity_topic: topics[idx].clone(),
            selection_rank: rank,
            recovery_flag: false,
        })
        .collect();

    let chosen_set: std::collections::HashSet<usize> = chosen_indices.into_iter().collect();
    let not_selected: Vec<(Segment, VerificationVerdict)> = verified
        .iter()
        .enumerate()
        .filter(|(idx, _)| !chosen_set.contains(idx))
        .map(|(_, pair)| pair.clone())
        .collect();

    info!("Stage 4: selected {}/{} segments (target N={}) across {} topics", selected.len(), verified.len(), n, topic_count);

    Ok(Stage4Result { selected, not_selected })
}

fn quality(pair: &(Segment, VerificationVerdict)) -> f64 {
    let strength = pair.1.kind.strength() as f64;
    pair.0.confidence * 10.0 + strength * 3.0 + pair.0.severity_hint
}

/// A segment's harm category is itself a topic signal; reuse it directly
/// to avoid an LLM call in the common case. Only ambiguous (empty)
/// categories fall back to the classifier, given the existing candidate
/// labels so new labels aren't invented needlessly.
async fn assign_topic(backend: &dyn ContentBackend, segment: &Segment, so_far: &[String], config: &PipelineConfig) -> Result<String> {
    if !segment.harm_category.primary.trim().is_empty() {
        return Ok(segment.harm_category.primary.to_lowercase());
    }

    let mut candidates: Vec<String> = so_far.to_vec();
    candidates.sort();
    candidates.dedup();

    let schema = diversity_topic_schema();
    let prompt = format!("{SYSTEM_PROMPT_C4_TOPIC}\n\n{}", build_c4_topic_prompt(segment, &candidates));
    let raw = with_backoff(&config.retry, &format!("stage4.topic.{}", segment.segment_id), || {
        backend.generate_structured(&prompt, &schema, config.stage4_diversity_classifier.temperature)
    })
    .await
    .with_context(|| format!("Stage 4: topic classification failed for {}", segment.segment_id))?;

    Ok(raw.get("topic").and_then(|v| v.as_str()).unwrap_or("uncategorized").to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ArtifactRef;
    use crate::models::{ContextRange, HarmCategory, VerdictKind};
    use async_trait::async_trait;

    struct FakeBackend;

    #[async_trait]
    impl ContentBackend for FakeBackend {
        async fn generate_text(&self, _: &str, _: f64, _: u32) -> Result<String> {
            unreachable!()
        }
        async fn generate_structured(&self, _: &str, _: &serde_json::Value, _: f64) -> Result<serde_json::Value> {
            unreachable!("all segments have a non-empty harm category in this test")
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

    fn segment(id: &str, topic: &str, confidence: f64) -> (Segment, VerificationVerdict) {
        (
            Segment {
                segment_id: id.to_string(),
                title: id.to_string(),
                primary_speaker: "guest".into(),
                severity_hint: 0.5,
                harm_category: HarmCategory { primary: topic.to_string(), subtypes: vec![] },
                rhetorical_strategies: vec![],
                societal_impacts: vec![],
                confidence,
                reasoning: "r".into(),
                clip_context_description: "c".into(),
                quotes: vec![],
                context_range: ContextRange { start: 0.0, end: 1.0 },
                duration_seconds: 1.0,
            },
            VerificationVerdict { kind: VerdictKind::Unverified, sources: vec![], rationale: "r".into() },
        )
    }

    #[tokio::test]
    async fn one_dominant_topic_is_capped() {
        let backend = FakeBackend;
        let mut config = PipelineConfig::default();
        config.sizing.min_n = 4;
        config.sizing.max_n = 20;
        config.sizing.per_hour = 6.0;

        // 8 segments on "elections", 2 on "health" — N should land at 6
        // for a 1-hour episode, and "elections" must not dominate all 6.
        let mut verified: Vec<(Segment, VerificationVerdict)> = (0..8).map(|i| segment(&format!("e{i}"), "elections", 0.9 - (i as f64) * 0.01)).collect();
        verified.extend((0..2).map(|i| segment(&format!("h{i}"), "health", 0.95)));

        let result = execute_stage4(&backend, &verified, 1.0, &config).await.unwrap();
        let elections_count = result.selected.iter().filter(|s| s.diversity_topic == "elections").count();
        let health_count = result.selected.iter().filter(|s| s.diversity_topic == "health").count();

        assert_eq!(result.selected.len(), 6);
        assert_eq!(health_count, 2, "both minority-topic segments should be admitted");
        assert!(elections_count < 8, "majority topic must be capped below its full pool size");
    }
}
