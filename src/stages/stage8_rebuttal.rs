use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::llm::{
    build_c8_rewrite_prompt, build_c8_verify_prompt, rebuttal_gate_schema, rewrite_schema, with_backoff, ContentBackend,
    SYSTEM_PROMPT_C8_REWRITE, SYSTEM_PROMPT_C8_VERIFY,
};
use crate::models::{BlockedPolicy, GateResult, PipelineConfig, RebuttalAttempt, RebuttalGate, RebuttalStatus, RebuttalVerification, Script, ScriptSection, SelectedSegment};

#[derive(Debug)]
pub struct Stage8Result {
    pub verifications: Vec<RebuttalVerification>,
    /// True only when `BlockedPolicy::FailRun` fired — the caller must
    /// withhold the script entirely rather than publish it.
    pub fatal: bool,
}

/// Execute Stage 8 (C8): verify every `PostClip` rebuttal against the
/// four gates, and when a gate fails, rewrite with escalating temperature
/// up to `max_rewrite_attempts` before applying the configured
/// `BlockedPolicy`. Mutates `script` in place with the final accepted
/// text (or removes the segment's triple if blocked-and-dropped).
pub async fn execute_stage8(
    backend: &dyn ContentBackend,
    script: &mut Script,
    selected: &[SelectedSegment],
    persona: &str,
    config: &PipelineConfig,
) -> Result<Stage8Result> {
    let mut verifications = Vec::new();
    let mut blocked_segments = Vec::new();

    let post_clip_ids: Vec<String> = script
        .sections
        .iter()
        .filter_map(|s| match s {
            ScriptSection::PostClip { segment_id, .. } => Some(segment_id.clone()),
            _ => None,
        })
        .collect();

    for segment_id in post_clip_ids {
        let Some(selected_segment) = selected.iter().find(|s| s.segment_id() == segment_id) else {
            warn!("Stage 8: no selected-segment record for {}, skipping verification", segment_id);
            continue;
        };

        let initial_text = script
            .sections
            .iter()
            .find_map(|s| match s {
                ScriptSection::PostClip { segment_id: id, rebuttal_text, .. } if *id == segment_id => Some(rebuttal_text.clone()),
                _ => None,
            })
            .unwrap_or_default();

        let verification = verify_and_rewrite(backend, selected_segment, initial_text, persona, config).await?;

        match &verification.status {
            RebuttalStatus::Accepted { .. } => {
                if let Some(final_text) = verification.final_text() {
                    update_rebuttal_text(script, &segment_id, final_text);
                }
            }
            RebuttalStatus::Blocked { attempts } => {
                warn!("Stage 8: {} blocked after {} attempts", segment_id, attempts);
                blocked_segments.push(segment_id.clone());
            }
        }

        verifications.push(verification);
    }

    let fatal = !blocked_segments.is_empty() && config.blocked_policy == BlockedPolicy::FailRun;
    if !fatal {
        for segment_id in &blocked_segments {
            if config.blocked_policy == BlockedPolicy::DropSegment {
                drop_segment_triple(script, segment_id);
            }
        }
    }

    info!("Stage 8: verified {} rebuttals, {} blocked, fatal={}", verifications.len(), blocked_segments.len(), fatal);

    Ok(Stage8Result { verifications, fatal })
}

async fn verify_and_rewrite(
    backend: &dyn ContentBackend,
    selected_segment: &SelectedSegment,
    initial_text: String,
    persona: &str,
    config: &PipelineConfig,
) -> Result<RebuttalVerification> {
    let mut attempts = Vec::new();
    let mut current_text = initial_text;
    let mut attempt_number: u32 = 1;

    loop {
        let gate_results = verify_gates(backend, selected_segment, &current_text, persona, config).await?;
        let passed = gate_results.iter().all(|r| r.passed);
        let temperature = if attempt_number == 1 { config.stage8_verifier.temperature } else { config.rewrite_temperature(attempt_number - 1) };

        attempts.push(RebuttalAttempt { attempt: attempt_number, rebuttal_text: current_text.clone(), temperature, gate_results: gate_results.clone(), passed });

        if passed {
            return Ok(RebuttalVerification { segment_id: selected_segment.segment_id().to_string(), attempts, status: RebuttalStatus::Accepted { attempts: attempt_number } });
        }

        // `attempt_number - 1` is how many rewrites have actually been tried so
        // far; the initial, un-rewritten draft doesn't consume a rewrite slot.
        let rewrites_so_far = attempt_number - 1;
        if rewrites_so_far >= config.max_rewrite_attempts {
            return Ok(RebuttalVerification { segment_id: selected_segment.segment_id().to_string(), attempts, status: RebuttalStatus::Blocked { attempts: attempt_number } });
        }

        let failure_reasons: Vec<String> = gate_results.iter().filter(|r| !r.passed).map(|r| format!("{}: {}", r.gate_id, r.reason)).collect();
        let rewrite_temperature = config.rewrite_temperature(attempt_number);
        current_text = rewrite_rebuttal(backend, selected_segment, &current_text, &failure_reasons, persona, rewrite_temperature, config).await?;
        attempt_number += 1;
    }
}

async fn verify_gates(backend: &dyn ContentBackend, selected_segment: &SelectedSegment, rebuttal_text: &str, persona: &str, config: &PipelineConfig) -> Result<Vec<GateResult>> {
    let schema = rebuttal_gate_schema();
    let prompt = format!(
        "{SYSTEM_PROMPT_C8_VERIFY}\n\n{}",
        build_c8_verify_prompt(&selected_segment.segment, &selected_segment.verification, rebuttal_text, persona)
    );
    let raw = with_backoff(&config.retry, &format!("stage8.verify.{}", selected_segment.segment_id()), || {
        backend.generate_structured(&prompt, &schema, config.stage8_verifier.temperature)
    })
    .await
    .context("Stage 8: gate verification call failed")?;

    let gates = raw.get("gates").cloned().context("Stage 8: response missing 'gates'")?;
    let gates: Vec<RawGate> = serde_json::from_value(gates).context("Stage 8: failed to deserialize gate list")?;
    let mut by_id: std::collections::HashMap<String, RawGate> = gates.into_iter().map(|g| (g.gate_id.clone(), g)).collect();

    Ok(RebuttalGate::ORDER
        .iter()
        .filter_map(|gate| by_id.remove(gate_key(*gate)).map(|g| GateResult::new(g.gate_id, g.passed, g.reason)))
        .collect())
}

async fn rewrite_rebuttal(
    backend: &dyn ContentBackend,
    selected_segment: &SelectedSegment,
    previous_text: &str,
    failure_reasons: &[String],
    persona: &str,
    temperature: f64,
    config: &PipelineConfig,
) -> Result<String> {
    let schema = rewrite_schema();
    let prompt = format!(
        "{SYSTEM_PROMPT_C8_REWRITE}\n\n{}",
        build_c8_rewrite_prompt(&selected_segment.segment, &selected_segment.verification, previous_text, failure_reasons, persona)
    );
    let raw = with_backoff(&config.retry, &format!("stage8.rewrite.{}", selected_segment.segment_id()), || {
        backend.generate_structured(&prompt, &schema, temperature)
    })
    .await
    .context("Stage 8: rewrite call failed")?;

    Ok(raw.get("rebuttal_text").and_then(|v| v.as_str()).unwrap_or(previous_text).to_string())
}

fn gate_key(gate: RebuttalGate) -> &'static str {
    match gate {
        RebuttalGate::Grounded => "grounded",
        RebuttalGate::OnTarget => "on_target",
        RebuttalGate::ToneConsistent => "tone_consistent",
        RebuttalGate::Safe => "safe",
    }
}

fn update_rebuttal_text(script: &mut Script, segment_id: &str, new_text: &str) {
    for section in &mut script.sections {
        if let ScriptSection::PostClip { segment_id: id, rebuttal_text, .. } = section {
            if id == segment_id {
                *rebuttal_text = new_text.to_string();
            }
        }
    }
}

fn drop_segment_triple(script: &mut Script, segment_id: &str) {
    script.sections.retain(|s| s.segment_id() != Some(segment_id));
}

#[derive(Debug, Clone, serde::Deserialize)]
struct RawGate {
    gate_id: String,
    passed: bool,
    reason: String,
}
