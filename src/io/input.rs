use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::{EpisodeMetadata, EpisodeResources, Transcript, TranscriptTurn};

#[derive(Debug, Deserialize)]
struct RawTranscriptInput {
    segments: Vec<RawTranscriptSegment>,
}

#[derive(Debug, Deserialize)]
struct RawTranscriptSegment {
    start: f64,
    end: f64,
    speaker: String,
    text: String,
}

/// Parse a diarized-transcript JSON file (spec.md §6: `segments: [{
/// start, end, speaker, text }]`) into a `Transcript`.
pub fn parse_transcript_file(path: &Path) -> Result<Transcript> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read transcript file: {:?}", path))?;
    parse_transcript_json(&content)
}

pub fn parse_transcript_json(json: &str) -> Result<Transcript> {
    let raw: RawTranscriptInput = serde_json::from_str(json).context("failed to parse transcript JSON")?;
    let turns = raw
        .segments
        .into_iter()
        .map(|s| TranscriptTurn { start: s.start, end: s.end, speaker_id: s.speaker, speaker_label: None, text: s.text })
        .collect();
    Ok(Transcript { turns })
}

/// Load episode metadata (`host_name`, `guest_name`, `episode_title`,
/// plus the rules/profile references) from a JSON file.
pub fn load_episode_metadata(path: &Path) -> Result<EpisodeMetadata> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read episode metadata file: {:?}", path))?;
    serde_json::from_str(&content).context("failed to parse episode metadata JSON")
}

/// Resolve `EpisodeMetadata`'s references plus the pipeline's persona
/// document into the free-text resources the LLM-facing stages need.
/// `base_dir` anchors relative references (`Input/`).
pub fn load_episode_resources(metadata: &EpisodeMetadata, persona_path: &Path, base_dir: &Path) -> Result<EpisodeResources> {
    let analysis_rules = read_text_resource(&base_dir.join(&metadata.analysis_rules_ref))?;
    let host_profile = metadata
        .host_profile_ref
        .as_ref()
        .map(|rel| read_text_resource(&base_dir.join(rel)))
        .transpose()?;
    let persona = read_text_resource(persona_path)?;

    Ok(EpisodeResources { analysis_rules, host_profile, persona })
}

fn read_text_resource(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read resource document: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_segments_into_turns() {
        let json = r#"{
            "segments": [
                {"start": 0.0, "end": 4.5, "speaker": "host", "text": "Welcome back to the show."},
                {"start": 4.5, "end": 12.0, "speaker": "guest", "text": "Thanks for having me."}
            ]
        }"#;

        let transcript = parse_transcript_json(json).unwrap();
        assert_eq!(transcript.turns.len(), 2);
        assert_eq!(transcript.turns[0].speaker_id, "host");
        assert_eq!(transcript.turns[1].text, "Thanks for having me.");
        assert_eq!(transcript.duration_seconds(), 12.0);
    }

    #[test]
    fn empty_segment_list_is_a_valid_empty_transcript() {
        let json = r#"{"segments": []}"#;
        let transcript = parse_transcript_json(json).unwrap();
        assert!(transcript.is_empty());
    }

    #[test]
    fn episode_metadata_round_trips_from_json() {
        let json = r#"{
            "host_name": "Jordan Reid",
            "guest_name": "Alex Rivers",
            "episode_title": "Episode 42",
            "analysis_rules_ref": "rules.md"
        }"#;
        let metadata: EpisodeMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.host_name, "Jordan Reid");
        assert!(metadata.host_profile_ref.is_none());
    }
}
