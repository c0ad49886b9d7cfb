use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::io::{write_artifact, write_script};
use crate::llm::ContentBackend;
use crate::models::{
    BlockedPolicy, EpisodeMetadata, EpisodeResources, PipelineConfig, RunLog, Script, SegmentLogEntry, Segment, SegmentVerdict,
    SelectedSegment, Transcript, VerificationVerdict,
};
use crate::stages::{
    assemble_script, execute_stage1, execute_stage2, execute_stage3, execute_stage4, execute_stage5, execute_stage6, execute_stage7,
    execute_stage8, execute_stage9, Stage7Outcome,
};

/// Load a previously written `Processing/*.json` artifact if present, so
/// `run_pipeline` can resume after the last stage's artifact was deleted
/// without re-running earlier, already-verified work (spec.md §8
/// "round-trip / idempotence").
fn load_artifact<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("failed to parse existing artifact {:?}, recomputing: {e}", path);
            None
        }
    }
}

/// The per-episode working directory laid out per spec.md §6: `Input/`,
/// `Processing/` (one artifact per stage), `Output/Scripts/`.
pub struct EpisodeWorkDir {
    root: PathBuf,
}

impl EpisodeWorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root.join("Input")
    }

    pub fn processing_dir(&self) -> PathBuf {
        self.root.join("Processing")
    }

    pub fn output_script_path(&self) -> PathBuf {
        self.root.join("Output/Scripts/verified_unified_script.json")
    }

    pub fn run_summary_path(&self) -> PathBuf {
        self.root.join("Output/run_summary.txt")
    }

    fn artifact(&self, name: &str) -> PathBuf {
        self.processing_dir().join(name)
    }
}

/// Outcome of a full pipeline run: either the verified script plus its
/// run log, or the stage at which it stopped and the artifacts written
/// so far (spec.md §7: "On failure: the last successful artifact's
/// path, the failing stage, and a machine-readable error record
/// sufficient to resume").
pub enum PipelineOutcome {
    Completed { script: Script, run_log: RunLog },
    StoppedAt { stage: &'static str, run_log: RunLog, reason: String },
}

/// Run the full C1→C9 pipeline against a loaded transcript and episode
/// context, writing a durable artifact after every stage so the run can
/// be inspected or resumed offline.
pub async fn run_pipeline(
    backend: &dyn ContentBackend,
    work_dir: &EpisodeWorkDir,
    transcript: &Transcript,
    metadata: &EpisodeMetadata,
    resources: &EpisodeResources,
    config: &PipelineConfig,
) -> Result<PipelineOutcome> {
    let mut run_log = RunLog { episode_title: metadata.episode_title.clone(), ..Default::default() };

    let Some(transcript_range) = transcript.time_range() else {
        run_log.final_script_empty = true;
        return Ok(PipelineOutcome::StoppedAt { stage: "c1", run_log, reason: "transcript has no turns".to_string() });
    };

    let c1_path = work_dir.artifact("pass1_analysis.json");
    let segments: Vec<Segment> = match load_artifact::<Vec<Segment>>(&c1_path) {
        Some(cached) => {
            let n: usize = cached.len();
            info!("C1: resuming from existing artifact ({} segments)", n);
            cached
        }
        None => {
            info!("C1: analyzing transcript ({} turns)", transcript.turns.len());
            let stage1 = execute_stage1(backend, transcript, metadata, resources, config).await.context("C1 failed")?;
            write_artifact(&stage1.segments, &c1_path)?;
            stage1.segments
        }
    };
    run_log.candidates_from_c1 = segments.len();
    if segments.is_empty() {
        run_log.final_script_empty = true;
        return Ok(PipelineOutcome::StoppedAt { stage: "c1", run_log, reason: "no candidate segments survived analysis".to_string() });
    }

    let c2_path = work_dir.artifact("binary_filter_results.json");
    let verdicts: Vec<SegmentVerdict> = match load_artifact(&c2_path) {
        Some(cached) => {
            info!("C2: resuming from existing artifact");
            cached
        }
        None => {
            info!("C2: filtering {} candidates", segments.len());
            let stage2 = execute_stage2(backend, &segments, config).await.context("C2 failed")?;
            write_artifact(&stage2.verdicts, &c2_path)?;
            stage2.verdicts
        }
    };
    let survived: Vec<Segment> = segments.iter().filter(|s| verdicts.iter().any(|v| v.segment_id == s.segment_id && v.survived)).cloned().collect();
    run_log.survived_c2 = survived.len();
    for verdict in &verdicts {
        run_log.entry_mut(&verdict.segment_id).gate_verdict = Some(if verdict.survived { "survived".to_string() } else { format!("{:?}", verdict.failed_gate) });
    }
    let rejected: Vec<_> = segments
        .iter()
        .filter_map(|s| verdicts.iter().find(|v| v.segment_id == s.segment_id && !v.survived).map(|v| (s.clone(), v.clone())))
        .collect();

    let c3_path = work_dir.artifact("recent_events_verification.json");
    let verified: Vec<(Segment, VerificationVerdict)> = match load_artifact(&c3_path) {
        Some(cached) => {
            info!("C3: resuming from existing artifact");
            cached
        }
        None => {
            info!("C3: verifying {} survivors", survived.len());
            let stage3 = execute_stage3(backend, &survived, config).await.context("C3 failed")?;
            write_artifact(&stage3.verified, &c3_path)?;
            run_log.confirmed_true_removed = stage3.removed_confirmed_true;
            stage3.verified
        }
    };
    if run_log.confirmed_true_removed == 0 && verified.len() < survived.len() {
        run_log.confirmed_true_removed = survived.len() - verified.len();
    }
    for (segment, verdict) in &verified {
        run_log.entry_mut(&segment.segment_id).verification_verdict = Some(format!("{:?}", verdict.kind));
    }

    let c4_path = work_dir.artifact("diversity_selection.json");
    let mut selected: Vec<SelectedSegment> = match load_artifact(&c4_path) {
        Some(cached) => {
            info!("C4: resuming from existing artifact");
            cached
        }
        None => {
            info!("C4: selecting from {} verified segments", verified.len());
            let stage4 = execute_stage4(backend, &verified, transcript.duration_hours(), config).await.context("C4 failed")?;
            write_artifact(&stage4.selected, &c4_path)?;
            stage4.selected
        }
    };
    run_log.selected_by_c4 = selected.len();

    let target_n = config.sizing.target_n(transcript.duration_hours());

    let c5_path = work_dir.artifact("false_negative_recovery.json");
    if c5_path.exists() {
        info!("C5: resuming from existing artifact");
        if let Some(cached) = load_artifact(&c5_path) {
            selected = cached;
        }
    } else {
        info!("C5: recovering from {} rejections", rejected.len());
        let stage5 = execute_stage5(backend, &rejected, &mut selected, target_n, config).await.context("C5 failed")?;
        write_artifact(&selected, &c5_path)?;
        run_log.recovered_by_c5 = stage5.admitted;
    }
    for s in &selected {
        let entry = run_log.entry_mut(s.segment_id());
        entry.recovered = s.recovery_flag;
        entry.included_in_script = true;
    }

    if selected.is_empty() {
        run_log.final_script_empty = true;
        return Ok(PipelineOutcome::StoppedAt { stage: "c5", run_log, reason: "no segments survived selection and recovery".to_string() });
    }

    let structure_path = work_dir.artifact("structure_plan.json");
    let creative_path = work_dir.artifact("creative_script.json");
    let cached_c6 = load_artifact(&structure_path).zip(load_artifact(&creative_path));
    let mut script: Script = match cached_c6 {
        Some((structure, creative)) => {
            info!("C6: resuming from existing artifacts");
            assemble_script(&structure, &creative, &selected, transcript_range, config)
        }
        None => {
            info!("C6: generating script for {} segments", selected.len());
            let stage6 = execute_stage6(backend, &selected, &resources.persona, transcript_range, config).await.context("C6 failed")?;
            write_artifact(&stage6.structure, &structure_path)?;
            write_artifact(&stage6.creative, &creative_path)?;
            stage6.script
        }
    };

    info!("C7: validating script invariants");
    match execute_stage7(&mut script, transcript_range) {
        Stage7Outcome::Pass => {}
        Stage7Outcome::Fatal(violations) => {
            let reason = format!("{} invariant violation(s): {:?}", violations.len(), violations);
            return Ok(PipelineOutcome::StoppedAt { stage: "c7", run_log, reason });
        }
    }

    info!("C8: verifying rebuttals");
    let stage8 = execute_stage8(backend, &mut script, &selected, &resources.persona, config).await.context("C8 failed")?;
    write_artifact(&stage8.verifications, &work_dir.artifact("rebuttal_verification.json"))?;
    run_log.rebuttals_rewritten = stage8.verifications.iter().filter(|v| v.attempt_count() > 1).count();
    run_log.rebuttals_blocked = stage8.verifications.iter().filter(|v| matches!(v.status, crate::models::RebuttalStatus::Blocked { .. })).count();
    for verification in &stage8.verifications {
        let entry = run_log.entry_mut(&verification.segment_id);
        entry.rewrite_attempts = verification.attempt_count().saturating_sub(1);
        entry.blocked = matches!(verification.status, crate::models::RebuttalStatus::Blocked { .. });
        if entry.blocked && config.blocked_policy == BlockedPolicy::DropSegment {
            entry.included_in_script = false;
        }
    }

    if stage8.fatal {
        let reason = format!("{} blocked rebuttal(s) under fail_run policy", run_log.rebuttals_blocked);
        return Ok(PipelineOutcome::StoppedAt { stage: "c8", run_log, reason });
    }

    info!("C9: spot-checking rebuttal claims");
    let stage9 = execute_stage9(backend, &mut script, &selected, &stage8.verifications, &resources.persona, config)
        .await
        .context("C9 failed")?;
    write_artifact(&stage9, &work_dir.artifact("external_fact_validation.json")).ok();
    run_log.degraded = stage9.degraded;

    if script.segment_ids().is_empty() {
        run_log.final_script_empty = true;
        warn!("pipeline completed with an empty script");
    }

    write_script(&script, &work_dir.output_script_path())?;
    Ok(PipelineOutcome::Completed { script, run_log })
}

/// Report the furthest stage with a persisted artifact in `work_dir`,
/// for `inspect` to summarize a run without re-executing it. `run_pipeline`
/// itself re-derives this per stage and resumes from it directly; C8 and
/// C9 are always re-run on resume since their effect is a mutation of the
/// in-memory script rather than a cacheable standalone value.
pub fn latest_completed_stage(work_dir: &EpisodeWorkDir) -> Option<&'static str> {
    const STAGE_ARTIFACTS: [(&str, &str); 9] = [
        ("c1", "pass1_analysis.json"),
        ("c2", "binary_filter_results.json"),
        ("c3", "recent_events_verification.json"),
        ("c4", "diversity_selection.json"),
        ("c5", "false_negative_recovery.json"),
        ("c6", "creative_script.json"),
        ("c7", "creative_script.json"),
        ("c8", "rebuttal_verification.json"),
        ("c9", "external_fact_validation.json"),
    ];

    STAGE_ARTIFACTS.iter().rev().find(|(_, file)| work_dir.artifact(file).exists()).map(|(stage, _)| *stage)
}

/// Load an existing output script from disk, for `inspect`-style
/// commands that report on a completed run without re-executing it.
pub fn load_script(path: &Path) -> Result<Script> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read script: {:?}", path))?;
    serde_json::from_str(&content).context("failed to parse script JSON")
}

pub fn ensure_work_dirs(work_dir: &EpisodeWorkDir) -> Result<()> {
    std::fs::create_dir_all(work_dir.input_dir())?;
    std::fs::create_dir_all(work_dir.processing_dir())?;
    std::fs::create_dir_all(work_dir.output_script_path().parent().unwrap())?;
    if !work_dir.processing_dir().exists() {
        bail!("failed to create processing directory");
    }
    Ok(())
}
