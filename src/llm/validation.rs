use crate::models::{Segment, Transcript};

/// Structural/grounding problems found in a single Pass 1 segment. This is
/// mechanical (no LLM call) validation distinct from C2's gate judgment —
/// it exists to catch a model hallucinating a quote or timestamp, which no
/// amount of gate reasoning downstream could recover from.
#[derive(Debug, Clone)]
pub struct SegmentValidation {
    pub segment_id: String,
    pub errors: Vec<String>,
}

impl SegmentValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a single segment against the source transcript.
pub fn validate_segment(segment: &Segment, transcript: &Transcript, quote_timestamp_tolerance_s: f64) -> SegmentValidation {
    let mut errors = Vec::new();

    if segment.quotes.is_empty() {
        errors.push("segment has no quotes".to_string());
    }

    if !segment.quotes_are_grounded(transcript, quote_timestamp_tolerance_s) {
        errors.push("one or more quotes are not verbatim-and-timestamp matches in the transcript".to_string());
    }

    if !segment.quotes_are_ordered() {
        errors.push("quotes are not in chronological order".to_string());
    }

    if !segment.is_context_range_valid() {
        errors.push(format!(
            "context_range [{:.1}, {:.1}] is empty or inverted",
            segment.context_range.start, segment.context_range.end
        ));
    }

    if let Some((lo, hi)) = transcript.time_range() {
        if segment.context_range.start < lo - quote_timestamp_tolerance_s || segment.context_range.end > hi + quote_timestamp_tolerance_s {
            errors.push("context_range falls outside the transcript's time range".to_string());
        }
    }

    if !(0.0..=1.0).contains(&segment.severity_hint) {
        errors.push(format!("severity_hint {} is outside [0,1]", segment.severity_hint));
    }

    if !(0.0..=1.0).contains(&segment.confidence) {
        errors.push(format!("confidence {} is outside [0,1]", segment.confidence));
    }

    SegmentValidation { segment_id: segment.segment_id.clone(), errors }
}

/// Validate every segment in a candidate list, returning only the ones
/// with at least one error.
pub fn validate_all(segments: &[Segment], transcript: &Transcript, quote_timestamp_tolerance_s: f64) -> Vec<SegmentValidation> {
    segments
        .iter()
        .map(|s| validate_segment(s, transcript, quote_timestamp_tolerance_s))
        .filter(|v| !v.is_valid())
        .collect()
}

/// Whether the single permitted error-correction retry (spec.md §4.1)
/// should be attempted for this candidate list.
pub fn needs_retry(validations: &[SegmentValidation]) -> bool {
    !validations.is_empty()
}

/// Build the text to feed back into a correction retry prompt.
pub fn format_correction_feedback(validations: &[SegmentValidation]) -> String {
    let mut out = String::from("The following segments failed validation and must be fixed or dropped:\n");
    for v in validations {
        out.push_str(&format!("- {}: {}\n", v.segment_id, v.errors.join("; ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContextRange, HarmCategory, Quote};
    use crate::models::transcript::TranscriptTurn;

    fn sample_transcript() -> Transcript {
        Transcript {
            turns: vec![
                TranscriptTurn { start: 0.0, end: 5.0, speaker_id: "host".into(), speaker_label: Some("Host".into()), text: "Welcome to the show.".into() },
                TranscriptTurn { start: 5.0, end: 12.0, speaker_id: "guest".into(), speaker_label: Some("Guest".into()), text: "Charlie Kirk is dead, everyone knows that.".into() },
            ],
        }
    }

    fn sample_segment() -> Segment {
        Segment {
            segment_id: "seg_1".into(),
            title: "Claim about Charlie Kirk".into(),
            primary_speaker: "Guest".into(),
            severity_hint: 0.8,
            harm_category: HarmCategory::default(),
            rhetorical_strategies: vec![],
            societal_impacts: vec![],
            confidence: 0.9,
            reasoning: "Factual claim about a named person's status".into(),
            clip_context_description: "Guest asserts Charlie Kirk is dead".into(),
            quotes: vec![Quote { timestamp: 5.0, speaker: "Guest".into(), quote: "Charlie Kirk is dead".into() }],
            context_range: ContextRange { start: 5.0, end: 12.0 },
            duration_seconds: 7.0,
        }
    }

    #[test]
    fn well_formed_segment_is_valid() {
        let transcript = sample_transcript();
        let result = validate_segment(&sample_segment(), &transcript, 0.5);
        assert!(result.is_valid(), "unexpected errors: {:?}", result.errors);
    }

    #[test]
    fn fabricated_quote_fails_grounding() {
        let transcript = sample_transcript();
        let mut segment = sample_segment();
        segment.quotes[0].quote = "Charlie Kirk was assassinated yesterday".into();
        let result = validate_segment(&segment, &transcript, 0.5);
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("grounded")));
    }

    #[test]
    fn inverted_context_range_is_rejected() {
        let transcript = sample_transcript();
        let mut segment = sample_segment();
        segment.context_range = ContextRange { start: 12.0, end: 5.0 };
        let result = validate_segment(&segment, &transcript, 0.5);
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("inverted")));
    }

    #[test]
    fn needs_retry_reflects_presence_of_errors() {
        assert!(!needs_retry(&[]));
        let bad = SegmentValidation { segment_id: "x".into(), errors: vec!["bad".into()] };
        assert!(needs_retry(&[bad]));
    }
}
