use serde::{Deserialize, Serialize};

use super::{Segment, VerificationVerdict};

/// A segment that survived C2/C3 and was chosen by C4 (or recovered by
/// C5), annotated with the bookkeeping the selector needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedSegment {
    pub segment: Segment,
    pub verification: VerificationVerdict,
    pub diversity_topic: String,
    pub selection_rank: usize,
    #[serde(default)]
    pub recovery_flag: bool,
}

impl SelectedSegment {
    pub fn segment_id(&self) -> &str {
        &self.segment.segment_id
    }

    /// Composite quality signal used to rank within a topic bucket:
    /// C2 confidence weighted by C3 verdict strength and a normalized
    /// severity term. Severity is a hint (spec.md §9) so it is given
    /// the smallest weight of the three terms.
    pub fn quality_score(&self) -> f64 {
        let verdict_strength = self.verification.kind.strength() as f64;
        self.segment.confidence * 10.0 + verdict_strength * 3.0 + self.segment.severity_hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContextRange, HarmCategory, VerdictKind};

    fn segment(confidence: f64, severity: f64) -> Segment {
        Segment {
            segment_id: "s".to_string(),
            title: "t".to_string(),
            primary_speaker: "host".to_string(),
            severity_hint: severity,
            harm_category: HarmCategory::default(),
            rhetorical_strategies: vec![],
            societal_impacts: vec![],
            confidence,
            reasoning: String::new(),
            clip_context_description: String::new(),
            quotes: vec![],
            context_range: ContextRange { start: 0.0, end: 1.0 },
            duration_seconds: 1.0,
        }
    }

    #[test]
    fn confirmed_false_outranks_unverified_at_equal_confidence() {
        let a = SelectedSegment {
            segment: segment(0.8, 0.5),
            verification: VerificationVerdict { kind: VerdictKind::ConfirmedFalse, sources: vec![], rationale: String::new() },
            diversity_topic: "topic".into(),
            selection_rank: 0,
            recovery_flag: false,
        };
        let b = SelectedSegment {
            segment: segment(0.8, 0.5),
            verification: VerificationVerdict { kind: VerdictKind::Unverified, sources: vec![], rationale: String::new() },
            diversity_topic: "topic".into(),
            selection_rank: 0,
            recovery_flag: false,
        };
        assert!(a.quality_score() > b.quality_score());
    }
}
