use serde::{Deserialize, Serialize};

/// Identifies one of the five C2 gates (or, reused by C8, one of the
/// four rebuttal gates). Kept as a restricted enum rather than a free
/// string to reduce hallucination in LLM-produced verdicts, matching
/// the teacher crate's `ReasonCode` pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentGate {
    Rebuttability,
    Verifiability,
    AccuracyAtRisk,
    Harm,
    ContextSufficiency,
}

impl SegmentGate {
    /// C2 gates run in this fixed order; rejection happens on first
    /// `passed = false`.
    pub const ORDER: [SegmentGate; 5] = [
        SegmentGate::Rebuttability,
        SegmentGate::Verifiability,
        SegmentGate::AccuracyAtRisk,
        SegmentGate::Harm,
        SegmentGate::ContextSufficiency,
    ];

    /// Gate 1 never recovers: a segment failing Rebuttability is
    /// excluded from C5's False-Negative Recovery candidate pool.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, SegmentGate::Rebuttability | SegmentGate::AccuracyAtRisk)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuttalGate {
    Grounded,
    OnTarget,
    ToneConsistent,
    Safe,
}

impl RebuttalGate {
    pub const ORDER: [RebuttalGate; 4] = [
        RebuttalGate::Grounded,
        RebuttalGate::OnTarget,
        RebuttalGate::ToneConsistent,
        RebuttalGate::Safe,
    ];
}

/// The outcome of one gate evaluation, with a human-readable reason and
/// optional supporting evidence (a quote excerpt, a source snippet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub gate_id: String,
    pub passed: bool,
    pub reason: String,
    #[serde(default)]
    pub evidence: Option<String>,
}

impl GateResult {
    pub fn new(gate_id: impl Into<String>, passed: bool, reason: impl Into<String>) -> Self {
        Self { gate_id: gate_id.into(), passed, reason: reason.into(), evidence: None }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }
}

/// Final per-segment outcome of C2: the ordered gate trail plus which
/// gate (if any) caused rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentVerdict {
    pub segment_id: String,
    pub gate_results: Vec<GateResult>,
    pub survived: bool,
    /// The gate that caused rejection, if `survived` is false.
    #[serde(default)]
    pub failed_gate: Option<SegmentGate>,
}

impl SegmentVerdict {
    /// Build a verdict from an ordered sequence of gate results,
    /// stopping at (and recording) the first failure.
    pub fn from_gate_results(segment_id: impl Into<String>, results: Vec<(SegmentGate, GateResult)>) -> Self {
        let mut trail = Vec::with_capacity(results.len());
        let mut failed_gate = None;
        for (gate, result) in results {
            let passed = result.passed;
            trail.push(result);
            if !passed {
                failed_gate = Some(gate);
                break;
            }
        }
        Self {
            segment_id: segment_id.into(),
            survived: failed_gate.is_none(),
            gate_results: trail,
            failed_gate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_stops_at_first_failing_gate() {
        let results = vec![
            (SegmentGate::Rebuttability, GateResult::new("rebuttability", true, "ok")),
            (SegmentGate::Verifiability, GateResult::new("verifiability", false, "no named entity")),
            (SegmentGate::AccuracyAtRisk, GateResult::new("accuracy_at_risk", true, "should not run")),
        ];
        let verdict = SegmentVerdict::from_gate_results("seg_1", results);
        assert!(!verdict.survived);
        assert_eq!(verdict.failed_gate, Some(SegmentGate::Verifiability));
        assert_eq!(verdict.gate_results.len(), 2, "gates after the failure must not be recorded");
    }

    #[test]
    fn gate_one_is_not_recoverable() {
        assert!(!SegmentGate::Rebuttability.is_recoverable());
        assert!(!SegmentGate::AccuracyAtRisk.is_recoverable());
        assert!(SegmentGate::Verifiability.is_recoverable());
        assert!(SegmentGate::Harm.is_recoverable());
        assert!(SegmentGate::ContextSufficiency.is_recoverable());
    }
}
