use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::Source;

/// One section of the final script. `ClipRef` carries only timestamps;
/// every other variant carries speakable text synthesized by TTS
/// downstream of this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptSection {
    Intro { text: String, est_duration_s: f64 },
    PreClip { segment_id: String, text: String, est_duration_s: f64 },
    ClipRef { segment_id: String, source_start: f64, source_end: f64 },
    PostClip {
        segment_id: String,
        rebuttal_text: String,
        est_duration_s: f64,
        #[serde(default)]
        citations: Vec<Source>,
    },
    Outro { text: String, est_duration_s: f64 },
}

impl ScriptSection {
    pub fn segment_id(&self) -> Option<&str> {
        match self {
            ScriptSection::PreClip { segment_id, .. }
            | ScriptSection::ClipRef { segment_id, .. }
            | ScriptSection::PostClip { segment_id, .. } => Some(segment_id),
            ScriptSection::Intro { .. } | ScriptSection::Outro { .. } => None,
        }
    }

    /// Estimated playback duration of this section: the speakable
    /// estimate for prose sections, or `source_end - source_start` for
    /// a clip.
    pub fn duration_seconds(&self) -> f64 {
        match self {
            ScriptSection::Intro { est_duration_s, .. }
            | ScriptSection::PreClip { est_duration_s, .. }
            | ScriptSection::PostClip { est_duration_s, .. }
            | ScriptSection::Outro { est_duration_s, .. } => *est_duration_s,
            ScriptSection::ClipRef { source_start, source_end, .. } => source_end - source_start,
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            ScriptSection::PreClip { .. } => 0,
            ScriptSection::ClipRef { .. } => 1,
            ScriptSection::PostClip { .. } => 2,
            ScriptSection::Intro { .. } | ScriptSection::Outro { .. } => 255,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScriptMetadata {
    pub total_est_duration_s: f64,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub key_themes: Vec<String>,
}

/// The final, invariant-checked artifact consumed by audio and clip
/// assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub metadata: ScriptMetadata,
    pub sections: Vec<ScriptSection>,
}

/// A single invariant violation found by `Script::validate`. C7 uses
/// these to decide fatal rejection; property tests assert the list is
/// empty for any script this crate emits.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptInvariantViolation {
    MissingTriple { segment_id: String },
    OutOfOrderTriple { segment_id: String },
    BadClipRange { segment_id: String, source_start: f64, source_end: f64 },
    ClipOutsideTranscript { segment_id: String },
    DuplicateSegment { segment_id: String },
}

impl Script {
    /// Sum of per-section estimates plus the playback duration of every
    /// `ClipRef`. Must equal `metadata.total_est_duration_s`.
    pub fn computed_total_duration(&self) -> f64 {
        self.sections.iter().map(|s| s.duration_seconds()).sum()
    }

    /// Check every invariant from spec.md §3: each segment_id appears
    /// exactly once as a PreClip/ClipRef/PostClip triple, in that order,
    /// with no duplicates and valid clip ranges within `transcript_range`.
    pub fn validate(&self, transcript_range: (f64, f64)) -> Vec<ScriptInvariantViolation> {
        let mut violations = Vec::new();
        let mut seen_segments: HashSet<&str> = HashSet::new();

        let mut by_segment: std::collections::HashMap<&str, Vec<(usize, &ScriptSection)>> =
            std::collections::HashMap::new();
        for (idx, section) in self.sections.iter().enumerate() {
            if let Some(id) = section.segment_id() {
                by_segment.entry(id).or_default().push((idx, section));
            }
        }

        for (segment_id, entries) in &by_segment {
            if !seen_segments.insert(segment_id) {
                violations.push(ScriptInvariantViolation::DuplicateSegment { segment_id: segment_id.to_string() });
            }

            if entries.len() != 3 {
                violations.push(ScriptInvariantViolation::MissingTriple { segment_id: segment_id.to_string() });
                continue;
            }

            let mut sorted = entries.clone();
            sorted.sort_by_key(|(idx, _)| *idx);
            let kinds: Vec<u8> = sorted.iter().map(|(_, s)| s.kind_rank()).collect();
            if kinds != [0, 1, 2] {
                violations.push(ScriptInvariantViolation::OutOfOrderTriple { segment_id: segment_id.to_string() });
            }

            for (_, section) in &sorted {
                if let ScriptSection::ClipRef { source_start, source_end, .. } = section {
                    if source_start >= source_end {
                        violations.push(ScriptInvariantViolation::BadClipRange {
                            segment_id: segment_id.to_string(),
                            source_start: *source_start,
                            source_end: *source_end,
                        });
                    }
                    if *source_start < transcript_range.0 || *source_end > transcript_range.1 {
                        violations.push(ScriptInvariantViolation::ClipOutsideTranscript {
                            segment_id: segment_id.to_string(),
                        });
                    }
                }
            }
        }

        // Duplicate detection above only catches segments whose id maps
        // to more than 3 sections sharing that id; also catch repeated
        // identical (type, segment_id) pairs directly.
        let mut counts: std::collections::HashMap<(&str, u8), usize> = std::collections::HashMap::new();
        for section in &self.sections {
            if let Some(id) = section.segment_id() {
                *counts.entry((id, section.kind_rank())).or_default() += 1;
            }
        }
        for ((segment_id, _), count) in counts {
            if count > 1 {
                let violation = ScriptInvariantViolation::DuplicateSegment { segment_id: segment_id.to_string() };
                if !violations.contains(&violation) {
                    violations.push(violation);
                }
            }
        }

        violations
    }

    pub fn segment_ids(&self) -> HashSet<&str> {
        self.sections.iter().filter_map(|s| s.segment_id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(id: &str, start: f64, end: f64) -> Vec<ScriptSection> {
        vec![
            ScriptSection::PreClip { segment_id: id.to_string(), text: "setup".into(), est_duration_s: 5.0 },
            ScriptSection::ClipRef { segment_id: id.to_string(), source_start: start, source_end: end },
            ScriptSection::PostClip { segment_id: id.to_string(), rebuttal_text: "rebuttal".into(), est_duration_s: 10.0, citations: vec![] },
        ]
    }

    #[test]
    fn well_formed_script_has_no_violations() {
        let mut sections = vec![ScriptSection::Intro { text: "hi".into(), est_duration_s: 3.0 }];
        sections.extend(triple("seg_1", 10.0, 20.0));
        sections.push(ScriptSection::Outro { text: "bye".into(), est_duration_s: 3.0 });
        let script = Script { metadata: ScriptMetadata::default(), sections };
        assert!(script.validate((0.0, 100.0)).is_empty());
    }

    #[test]
    fn missing_post_clip_is_a_violation() {
        let mut sections = vec![];
        sections.extend(triple("seg_1", 10.0, 20.0));
        sections.pop(); // drop the PostClip
        let script = Script { metadata: ScriptMetadata::default(), sections };
        let violations = script.validate((0.0, 100.0));
        assert!(violations.contains(&ScriptInvariantViolation::MissingTriple { segment_id: "seg_1".into() }));
    }

    #[test]
    fn clip_range_must_be_increasing_and_in_bounds() {
        let sections = triple("seg_1", 50.0, 40.0);
        let script = Script { metadata: ScriptMetadata::default(), sections };
        let violations = script.validate((0.0, 100.0));
        assert!(violations.iter().any(|v| matches!(v, ScriptInvariantViolation::BadClipRange { .. })));
    }

    #[test]
    fn clip_outside_transcript_range_is_a_violation() {
        let sections = triple("seg_1", 10.0, 20.0);
        let script = Script { metadata: ScriptMetadata::default(), sections };
        let violations = script.validate((15.0, 100.0));
        assert!(violations.iter().any(|v| matches!(v, ScriptInvariantViolation::ClipOutsideTranscript { .. })));
    }

    #[test]
    fn total_duration_sums_sections() {
        let sections = vec![
            ScriptSection::Intro { text: "hi".into(), est_duration_s: 3.0 },
            ScriptSection::ClipRef { segment_id: "s".into(), source_start: 0.0, source_end: 10.0 },
        ];
        let script = Script { metadata: ScriptMetadata::default(), sections };
        assert_eq!(script.computed_total_duration(), 13.0);
    }
}
