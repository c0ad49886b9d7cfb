use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::llm::{
    build_c6_creative_prompt, build_c6_structure_prompt, creative_script_schema, structure_plan_schema, with_backoff,
    ContentBackend, SYSTEM_PROMPT_C6_CREATIVE, SYSTEM_PROMPT_C6_STRUCTURE,
};
use crate::models::{CreativeScript, PipelineConfig, Script, ScriptMetadata, ScriptSection, SelectedSegment, StructurePlan};

fn words_to_seconds(text: &str, words_per_minute: f64) -> f64 {
    let count = text.split_whitespace().count() as f64;
    if words_per_minute <= 0.0 {
        0.0
    } else {
        count / words_per_minute * 60.0
    }
}

/// Every artifact Stage 6 produces: the two intermediate LLM outputs
/// (persisted separately per spec.md §6's `structure_plan.json` /
/// `creative_script.json`) plus the assembled `Script`.
#[derive(Debug)]
pub struct Stage6Result {
    pub structure: StructurePlan,
    pub creative: CreativeScript,
    pub script: Script,
}

/// Execute Stage 6 (C6): the two-step Script Generator. Step 6a produces
/// ordering/timing without prose; step 6b fills in speakable text against
/// that plan. The final `Script` is assembled here from both outputs plus
/// each segment's clip boundaries.
pub async fn execute_stage6(
    backend: &dyn ContentBackend,
    selected: &[SelectedSegment],
    persona: &str,
    transcript_range: (f64, f64),
    config: &PipelineConfig,
) -> Result<Stage6Result> {
    let structure = build_structure_plan(backend, selected, persona, config).await?;
    let creative = build_creative_script(backend, &structure, selected, persona, config).await?;
    let script = assemble_script(&structure, &creative, selected, transcript_range, config);

    Ok(Stage6Result { structure, creative, script })
}

/// Assemble the final `Script` from a structure plan and creative script
/// that are already in hand — used both by `execute_stage6` after its two
/// LLM calls and when resuming a run from cached `Processing/` artifacts
/// without re-invoking the backend.
pub fn assemble_script(
    structure: &StructurePlan,
    creative: &CreativeScript,
    selected: &[SelectedSegment],
    transcript_range: (f64, f64),
    config: &PipelineConfig,
) -> Script {
    for dropped in &structure.dropped {
        warn!("Stage 6: structure plan dropped {} — {}", dropped.segment_id, dropped.justification);
    }

    let mut sections = Vec::new();
    sections.push(ScriptSection::Intro {
        text: creative.intro_text.clone(),
        est_duration_s: words_to_seconds(&creative.intro_text, config.words_per_minute),
    });

    let mut entries = structure.entries.clone();
    entries.sort_by_key(|e| e.order);

    for entry in &entries {
        let Some(selected_segment) = selected.iter().find(|s| s.segment_id() == entry.segment_id) else {
            warn!("Stage 6: structure plan referenced unknown segment {}, skipping", entry.segment_id);
            continue;
        };
        let Some(clip_text) = creative.clip_texts.iter().find(|c| c.segment_id == entry.segment_id) else {
            warn!("Stage 6: creative script missing text for {}, skipping", entry.segment_id);
            continue;
        };

        let source_start = (selected_segment.segment.context_range.start - entry.clip_padding_s).max(transcript_range.0);
        let source_end = (selected_segment.segment.context_range.end + entry.clip_padding_s).min(transcript_range.1);

        sections.push(ScriptSection::PreClip {
            segment_id: entry.segment_id.clone(),
            text: clip_text.pre_clip_text.clone(),
            est_duration_s: words_to_seconds(&clip_text.pre_clip_text, config.words_per_minute),
        });
        sections.push(ScriptSection::ClipRef { segment_id: entry.segment_id.clone(), source_start, source_end });
        sections.push(ScriptSection::PostClip {
            segment_id: entry.segment_id.clone(),
            rebuttal_text: clip_text.post_clip_rebuttal_text.clone(),
            est_duration_s: words_to_seconds(&clip_text.post_clip_rebuttal_text, config.words_per_minute),
            citations: selected_segment.verification.sources.clone(),
        });
    }

    sections.push(ScriptSection::Outro {
        text: creative.outro_text.clone(),
        est_duration_s: words_to_seconds(&creative.outro_text, config.words_per_minute),
    });

    let total_est_duration_s = sections.iter().map(|s| s.duration_seconds()).sum();
    let script = Script {
        metadata: ScriptMetadata {
            total_est_duration_s,
            target_audience: creative.target_audience.clone(),
            key_themes: creative.key_themes.clone(),
        },
        sections,
    };

    info!("Stage 6: assembled script with {} sections, est. {:.0}s", script.sections.len(), script.metadata.total_est_duration_s);
    script
}

async fn build_structure_plan(backend: &dyn ContentBackend, selected: &[SelectedSegment], persona: &str, config: &PipelineConfig) -> Result<StructurePlan> {
    let schema = structure_plan_schema();
    let prompt = format!("{SYSTEM_PROMPT_C6_STRUCTURE}\n\n{}", build_c6_structure_prompt(selected, persona));
    let raw = with_backoff(&config.retry, "stage6.structure", || backend.generate_structured(&prompt, &schema, config.stage6_structure.temperature))
        .await
        .context("Stage 6: structure plan call failed")?;
    serde_json::from_value(raw).context("Stage 6: failed to deserialize structure plan")
}

async fn build_creative_script(
    backend: &dyn ContentBackend,
    structure: &StructurePlan,
    selected: &[SelectedSegment],
    persona: &str,
    config: &PipelineConfig,
) -> Result<CreativeScript> {
    let schema = creative_script_schema();
    let prompt = format!("{SYSTEM_PROMPT_C6_CREATIVE}\n\n{}", build_c6_creative_prompt(structure, selected, persona));
    let raw = with_backoff(&config.retry, "stage6.creative", || backend.generate_structured(&prompt, &schema, config.stage6_creative.temperature))
        .await
        .context("Stage 6: creative script call failed")?;
    serde_json::from_value(raw).context("Stage 6: failed to deserialize creative script")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ArtifactRef;
    use crate::models::{ContextRange, HarmCategory, Segment, VerdictKind, VerificationVerdict};
    use async_trait::async_trait;
    use serde_json::json;

    struct FakeBackend;

    #[async_trait]
    impl ContentBackend for FakeBackend {
        async fn generate_text(&self, _: &str, _: f64, _: u32) -> Result<String> {
            unreachable!()
        }
        async fn generate_structured(&self, prompt: &str, _: &serde_json::Value, _: f64) -> Result<serde_json::Value> {
            if prompt.contains("structure planner") {
                Ok(json!({
                    "hook_segment_id": "seg_1",
                    "entries": [{"segment_id": "seg_1", "order": 0, "pre_clip_est_s": 5.0, "post_clip_est_s": 10.0, "clip_padding_s": 1.0}],
                    "dropped": [],
                    "intro_stub": "intro",
                    "outro_stub": "outro"
                }))
            } else {
                Ok(json!({
                    "intro_text": "Welcome back to the show.",
                    "outro_text": "That is all for today.",
                    "target_audience": "general",
                    "key_themes": ["accountability"],
                    "clip_texts": [{"segment_id": "seg_1", "pre_clip_text": "Here is what was said.", "post_clip_rebuttal_text": "That claim does not hold up."}]
                }))
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

    fn selected_segment() -> SelectedSegment {
        SelectedSegment {
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
                context_range: ContextRange { start: 10.0, end: 20.0 },
                duration_seconds: 10.0,
            },
            verification: VerificationVerdict { kind: VerdictKind::ConfirmedFalse, sources: vec![], rationale: "r".into() },
            diversity_topic: "topic".into(),
            selection_rank: 0,
            recovery_flag: false,
        }
    }

    #[tokio::test]
    async fn builds_a_well_formed_script() {
        let backend = FakeBackend;
        let config = PipelineConfig::default();
        let selected = vec![selected_segment()];
        let result = execute_stage6(&backend, &selected, "persona text", (0.0, 100.0), &config).await.unwrap();
        let script = result.script;

        assert!(script.validate((0.0, 100.0)).is_empty(), "{:?}", script.validate((0.0, 100.0)));
        assert_eq!(script.segment_ids().len(), 1);
    }
}
