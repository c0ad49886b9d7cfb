use tracing::{info, warn};

use crate::models::{Script, ScriptInvariantViolation};

/// Outcome of the Output Quality Gate (C7): either the script is
/// structurally sound, or the run must stop — this stage never tries to
/// repair a violation itself, it only detects and reports.
#[derive(Debug)]
pub enum Stage7Outcome {
    Pass,
    Fatal(Vec<ScriptInvariantViolation>),
}

/// Execute Stage 7 (C7): a purely mechanical invariant check, no LLM
/// call. Lenient-defaults optional metadata (an empty `target_audience`
/// is filled in rather than treated as an error) but any invariant
/// violation from `Script::validate` is fatal.
pub fn execute_stage7(script: &mut Script, transcript_range: (f64, f64)) -> Stage7Outcome {
    if script.metadata.target_audience.trim().is_empty() {
        script.metadata.target_audience = "general audience".to_string();
    }
    script.metadata.total_est_duration_s = script.computed_total_duration();

    let violations = script.validate(transcript_range);
    if violations.is_empty() {
        info!("Stage 7: script passed the output quality gate ({} sections)", script.sections.len());
        Stage7Outcome::Pass
    } else {
        warn!("Stage 7: script failed the output quality gate with {} violation(s): {:?}", violations.len(), violations);
        Stage7Outcome::Fatal(violations)
    }
}
