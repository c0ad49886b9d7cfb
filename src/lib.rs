pub mod io;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod stages;

pub use io::{load_episode_metadata, load_episode_resources, parse_transcript_file, write_artifact, write_script, RunSummary};
pub use llm::{AnthropicBackend, AnthropicConfig, ArtifactRef, ContentBackend};
pub use models::{EpisodeMetadata, EpisodeResources, PipelineConfig, RunLog, Script, Transcript};
pub use orchestrator::{ensure_work_dirs, latest_completed_stage, load_script, run_pipeline, EpisodeWorkDir, PipelineOutcome};
pub use stages::{
    execute_stage1, execute_stage2, execute_stage3, execute_stage4, execute_stage5, execute_stage6, execute_stage7, execute_stage8,
    execute_stage9, Stage7Outcome,
};
