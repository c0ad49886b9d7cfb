use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::models::{RunLog, Script};

/// Write any stage artifact (the `Processing/*.json` files from spec.md
/// §6) as pretty-printed JSON, creating parent directories as needed.
pub fn write_artifact<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create directory: {:?}", parent))?;
    }
    let file = std::fs::File::create(path).with_context(|| format!("failed to create file: {:?}", path))?;
    serde_json::to_writer_pretty(file, value).context("failed to write artifact JSON")?;
    Ok(())
}

/// Write the final `verified_unified_script.json`.
pub fn write_script(script: &Script, path: &Path) -> Result<()> {
    write_artifact(script, path)
}

/// Human-readable run summary: counts per stage, how many segments
/// were recovered, how many rebuttals needed rewrites, how many were
/// BLOCKED (spec.md §7 "User-visible behavior").
pub struct RunSummary<'a> {
    run_log: &'a RunLog,
}

impl<'a> RunSummary<'a> {
    pub fn new(run_log: &'a RunLog) -> Self {
        Self { run_log }
    }

    pub fn format(&self) -> String {
        let log = self.run_log;
        let mut out = String::new();
        out.push_str(&format!("Run summary: {}\n", log.episode_title));
        out.push_str("=============================\n");
        out.push_str(&format!("Candidates from C1:        {}\n", log.candidates_from_c1));
        out.push_str(&format!("Survived C2:               {}\n", log.survived_c2));
        out.push_str(&format!("Removed (confirmed true):  {}\n", log.confirmed_true_removed));
        out.push_str(&format!("Selected by C4:            {}\n", log.selected_by_c4));
        out.push_str(&format!("Recovered by C5:           {}\n", log.recovered_by_c5));
        out.push_str(&format!("Rebuttals rewritten:       {}\n", log.rebuttals_rewritten));
        out.push_str(&format!("Rebuttals blocked:         {}\n", log.rebuttals_blocked));
        out.push_str(&format!("Final script empty:        {}\n", log.final_script_empty));
        out.push_str(&format!("Degraded:                  {}\n", log.degraded));

        if !log.segments.is_empty() {
            out.push('\n');
            out.push_str("Per-segment detail\n");
            out.push_str("-------------------\n");
            for entry in &log.segments {
                out.push_str(&format!(
                    "{}: gate={:?} verification={:?} recovered={} rewrites={} blocked={} included={}\n",
                    entry.segment_id,
                    entry.gate_verdict.as_deref().unwrap_or("-"),
                    entry.verification_verdict.as_deref().unwrap_or("-"),
                    entry.recovered,
                    entry.rewrite_attempts,
                    entry.blocked,
                    entry.included_in_script,
                ));
                for note in &entry.notes {
                    out.push_str(&format!("    note: {}\n", note));
                }
            }
        }

        out
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("failed to create directory: {:?}", parent))?;
        }
        std::fs::write(path, self.format()).with_context(|| format!("failed to write run summary: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScriptMetadata, ScriptSection, SegmentLogEntry};
    use tempfile::tempdir;

    #[test]
    fn summary_reports_stage_counts() {
        let log = RunLog {
            episode_title: "Episode 42".into(),
            candidates_from_c1: 10,
            survived_c2: 6,
            confirmed_true_removed: 1,
            selected_by_c4: 5,
            recovered_by_c5: 1,
            rebuttals_rewritten: 2,
            rebuttals_blocked: 0,
            segments: vec![SegmentLogEntry { segment_id: "seg_1".into(), included_in_script: true, ..Default::default() }],
            final_script_empty: false,
            degraded: false,
        };
        let summary = RunSummary::new(&log).format();
        assert!(summary.contains("Selected by C4:            5"));
        assert!(summary.contains("seg_1"));
    }

    #[test]
    fn write_script_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Output/Scripts/verified_unified_script.json");
        let script = Script {
            metadata: ScriptMetadata::default(),
            sections: vec![ScriptSection::Intro { text: "hi".into(), est_duration_s: 1.0 }],
        };
        write_script(&script, &path).unwrap();
        assert!(path.exists());
    }
}
