use serde::{Deserialize, Serialize};

/// Step 6a output: ordering and timing without prose. The creative
/// script step (6b) fills in speakable text against this plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructurePlan {
    pub hook_segment_id: Option<String>,
    pub entries: Vec<StructureEntry>,
    #[serde(default)]
    pub dropped: Vec<DroppedSegment>,
    pub intro_stub: String,
    pub outro_stub: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureEntry {
    pub segment_id: String,
    pub order: usize,
    pub pre_clip_est_s: f64,
    pub post_clip_est_s: f64,
    pub clip_padding_s: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroppedSegment {
    pub segment_id: String,
    pub justification: String,
}

impl StructurePlan {
    /// All entries plus the hook must reference segments the caller
    /// supplied; callers validate against the selected-segment id set.
    pub fn referenced_segment_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.segment_id.as_str()).collect()
    }
}

/// Step 6b output: speakable prose for every section named in the
/// structure plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreativeScript {
    pub intro_text: String,
    pub outro_text: String,
    pub clip_texts: Vec<ClipText>,
    pub target_audience: String,
    pub key_themes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipText {
    pub segment_id: String,
    pub pre_clip_text: String,
    pub post_clip_rebuttal_text: String,
}
