use serde::{Deserialize, Serialize};

/// A single turn in a diarized transcript.
///
/// Timestamps are seconds from transcript origin. The transcript's
/// timestamps are the single source of truth for every downstream
/// reference (quotes, context ranges, clip boundaries).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptTurn {
    pub start: f64,
    pub end: f64,
    pub speaker_id: String,
    #[serde(default)]
    pub speaker_label: Option<String>,
    pub text: String,
}

impl TranscriptTurn {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// The diarized transcript: an ordered, immutable sequence of turns.
///
/// Conceptually "lazy, finite, restartable" per the external contract —
/// in practice every turn is already materialized from the input JSON
/// file, but callers must treat it as read-only and iterate rather than
/// index into it wherever possible, since future backends may stream it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Transcript {
    pub turns: Vec<TranscriptTurn>,
}

impl Transcript {
    pub fn iter(&self) -> impl Iterator<Item = &TranscriptTurn> {
        self.turns.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Total duration in seconds, from the first turn's start to the
    /// last turn's end.
    pub fn duration_seconds(&self) -> f64 {
        match (self.turns.first(), self.turns.last()) {
            (Some(first), Some(last)) => (last.end - first.start).max(0.0),
            _ => 0.0,
        }
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_seconds() / 3600.0
    }

    /// The full text of the transcript, turn by turn, for inclusion as
    /// an uploaded artifact in the C1 call.
    pub fn full_text(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            out.push_str(&format!(
                "[{:.2}-{:.2}] {}: {}\n",
                turn.start, turn.end, turn.speaker_id, turn.text
            ));
        }
        out
    }

    /// Check that `quote` is a verbatim substring of some turn's text,
    /// and that `timestamp` falls within `tolerance_s` of that turn's
    /// start/end boundary. Used by C1 validation (spec contract: quotes
    /// verbatim, timestamps aligned to within 0.5s).
    pub fn verify_quote(&self, quote: &str, timestamp: f64, tolerance_s: f64) -> bool {
        self.turns.iter().any(|turn| {
            turn.text.contains(quote)
                && timestamp >= turn.start - tolerance_s
                && timestamp <= turn.end + tolerance_s
        })
    }

    /// Whether `t` lies within the transcript's overall time range.
    pub fn contains_timestamp(&self, t: f64) -> bool {
        match (self.turns.first(), self.turns.last()) {
            (Some(first), Some(last)) => t >= first.start && t <= last.end,
            _ => false,
        }
    }

    pub fn time_range(&self) -> Option<(f64, f64)> {
        match (self.turns.first(), self.turns.last()) {
            (Some(first), Some(last)) => Some((first.start, last.end)),
            _ => None,
        }
    }
}
