use serde::{Deserialize, Serialize};

use super::GateResult;

/// Terminal or in-progress state of a single `PostClip`'s self-correction
/// loop (C8).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RebuttalStatus {
    Accepted { attempts: u32 },
    /// Exhausted `N_max` rewrite attempts without passing all four
    /// gates. A BLOCKED rebuttal must never be treated as accepted —
    /// the orchestrator applies the configured `BlockedPolicy`.
    Blocked { attempts: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuttalAttempt {
    pub attempt: u32,
    pub rebuttal_text: String,
    pub temperature: f64,
    pub gate_results: Vec<GateResult>,
    pub passed: bool,
}

/// Full verification record for one segment's rebuttal, including every
/// rewrite attempt, for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuttalVerification {
    pub segment_id: String,
    pub attempts: Vec<RebuttalAttempt>,
    pub status: RebuttalStatus,
}

impl RebuttalVerification {
    pub fn final_text(&self) -> Option<&str> {
        self.attempts.last().map(|a| a.rebuttal_text.as_str())
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// What happens to a script containing a BLOCKED rebuttal.
/// `drop_segment` removes the segment's triple and renumbers remaining
/// sections; `fail_run` withholds the final script entirely. Treating a
/// BLOCKED rebuttal as "passed with warning" is not a representable
/// value of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedPolicy {
    DropSegment,
    FailRun,
}
