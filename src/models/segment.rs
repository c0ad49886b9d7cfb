use serde::{Deserialize, Serialize};

/// A harm category assigned by Pass 1, with optional finer-grained
/// subtypes (e.g. primary="health_misinformation", subtypes=["vaccine"]).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HarmCategory {
    pub primary: String,
    #[serde(default)]
    pub subtypes: Vec<String>,
}

/// A single extracted quote. `timestamp` is seconds from transcript
/// origin and must match a transcript turn boundary to within 0.5s;
/// `quote` must be a verbatim substring of that turn's text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub timestamp: f64,
    pub speaker: String,
    pub quote: String,
}

/// The span of transcript time a segment's argument needs to be
/// followed without the full episode. Invariant:
/// `start <= min(quote.timestamp)` and `end >= max(quote.timestamp)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContextRange {
    pub start: f64,
    pub end: f64,
}

/// A candidate segment produced by the Transcript Analyzer (C1).
///
/// Segments are immutable once created: downstream stages annotate by
/// writing a new artifact, never by mutating a `Segment` in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub segment_id: String,
    pub title: String,
    pub primary_speaker: String,
    /// The model's self-reported severity; per spec.md §9 this is a
    /// hint, never ground truth, and downstream quality scoring must
    /// not treat it as authoritative.
    pub severity_hint: f64,
    pub harm_category: HarmCategory,
    #[serde(default)]
    pub rhetorical_strategies: Vec<String>,
    #[serde(default)]
    pub societal_impacts: Vec<String>,
    pub confidence: f64,
    pub reasoning: String,
    pub clip_context_description: String,
    pub quotes: Vec<Quote>,
    pub context_range: ContextRange,
    pub duration_seconds: f64,
}

impl Segment {
    /// `context_range.start <= min(quote.timestamp)` and
    /// `context_range.end >= max(quote.timestamp)`; quotes are ordered
    /// by timestamp.
    pub fn is_context_range_valid(&self) -> bool {
        if self.quotes.is_empty() {
            return true;
        }
        let min_ts = self
            .quotes
            .iter()
            .map(|q| q.timestamp)
            .fold(f64::INFINITY, f64::min);
        let max_ts = self
            .quotes
            .iter()
            .map(|q| q.timestamp)
            .fold(f64::NEG_INFINITY, f64::max);
        self.context_range.start <= min_ts && self.context_range.end >= max_ts
    }

    pub fn quotes_are_ordered(&self) -> bool {
        self.quotes.windows(2).all(|w| w[0].timestamp <= w[1].timestamp)
    }

    /// Every quote must be a verbatim substring of the transcript and
    /// timestamp-aligned within `tolerance_s` of a turn boundary.
    pub fn quotes_are_grounded(
        &self,
        transcript: &crate::models::Transcript,
        tolerance_s: f64,
    ) -> bool {
        self.quotes
            .iter()
            .all(|q| transcript.verify_quote(&q.quote, q.timestamp, tolerance_s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_segment() -> Segment {
        Segment {
            segment_id: "seg_001".to_string(),
            title: "Claim about vaccines".to_string(),
            primary_speaker: "host".to_string(),
            severity_hint: 0.8,
            harm_category: HarmCategory {
                primary: "health_misinformation".to_string(),
                subtypes: vec!["vaccine".to_string()],
            },
            rhetorical_strategies: vec!["false_equivalence".to_string()],
            societal_impacts: vec!["public_health".to_string()],
            confidence: 0.9,
            reasoning: "host asserts a specific, checkable causal claim".to_string(),
            clip_context_description: "host explaining his theory".to_string(),
            quotes: vec![
                Quote { timestamp: 120.0, speaker: "host".to_string(), quote: "vaccines cause autism".to_string() },
                Quote { timestamp: 125.0, speaker: "host".to_string(), quote: "it's a fact".to_string() },
            ],
            context_range: ContextRange { start: 115.0, end: 130.0 },
            duration_seconds: 15.0,
        }
    }

    #[test]
    fn context_range_bounds_quotes() {
        let seg = sample_segment();
        assert!(seg.is_context_range_valid());
        assert!(seg.quotes_are_ordered());
    }

    #[test]
    fn context_range_violated_when_too_narrow() {
        let mut seg = sample_segment();
        seg.context_range.end = 122.0;
        assert!(!seg.is_context_range_valid());
    }

    #[test]
    fn out_of_order_quotes_detected() {
        let mut seg = sample_segment();
        seg.quotes.swap(0, 1);
        assert!(!seg.quotes_are_ordered());
    }
}
