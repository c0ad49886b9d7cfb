use serde::{Deserialize, Serialize};

/// Episode-level metadata plus opaque references to the free-text
/// resources (host rules, persona) that drive every LLM-facing stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    pub host_name: String,
    pub guest_name: String,
    pub episode_title: String,
    /// Reference to the host/guest profile document (opaque path or id).
    #[serde(default)]
    pub host_profile_ref: Option<String>,
    /// Reference to the host-specific analysis rules document.
    pub analysis_rules_ref: String,
}

/// Free-text resources resolved from the references above. Kept
/// separate from `EpisodeMetadata` because the metadata is small and
/// serialized into every artifact, while these documents are large and
/// only needed by the stages that actually prompt an LLM.
#[derive(Debug, Clone, Default)]
pub struct EpisodeResources {
    pub analysis_rules: String,
    pub host_profile: Option<String>,
    pub persona: String,
}
