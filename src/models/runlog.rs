use serde::{Deserialize, Serialize};

/// A structured, append-only record of what happened to one segment
/// across the pipeline, for audit and for the run summary described in
/// spec.md §7 ("User-visible behavior").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SegmentLogEntry {
    pub segment_id: String,
    #[serde(default)]
    pub gate_verdict: Option<String>,
    #[serde(default)]
    pub verification_verdict: Option<String>,
    #[serde(default)]
    pub recovered: bool,
    #[serde(default)]
    pub rewrite_attempts: u32,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub included_in_script: bool,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunLog {
    pub episode_title: String,
    pub candidates_from_c1: usize,
    pub survived_c2: usize,
    pub confirmed_true_removed: usize,
    pub selected_by_c4: usize,
    pub recovered_by_c5: usize,
    pub rebuttals_rewritten: usize,
    pub rebuttals_blocked: usize,
    pub segments: Vec<SegmentLogEntry>,
    pub final_script_empty: bool,
    pub degraded: bool,
}

impl RunLog {
    pub fn entry_mut(&mut self, segment_id: &str) -> &mut SegmentLogEntry {
        if let Some(idx) = self.segments.iter().position(|e| e.segment_id == segment_id) {
            &mut self.segments[idx]
        } else {
            self.segments.push(SegmentLogEntry { segment_id: segment_id.to_string(), ..Default::default() });
            self.segments.last_mut().unwrap()
        }
    }
}
