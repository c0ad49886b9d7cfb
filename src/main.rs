use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rebuttal_pipeline::{
    ensure_work_dirs, latest_completed_stage, load_episode_metadata, load_episode_resources, load_script, parse_transcript_file,
    run_pipeline, AnthropicBackend, AnthropicConfig, EpisodeWorkDir, PipelineConfig, PipelineOutcome, RunSummary,
};

#[derive(Parser)]
#[command(name = "rebuttal-pipeline")]
#[command(author, version, about = "Fact-checking commentary script pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full C1-C9 pipeline for one episode.
    Run {
        /// Diarized transcript JSON (segments: [{start, end, speaker, text}]).
        #[arg(long)]
        transcript: PathBuf,

        /// Episode metadata JSON (host_name, guest_name, episode_title, rules/profile refs).
        #[arg(long)]
        metadata: PathBuf,

        /// Persona/voice document for the script generator and rebuttal rewriter.
        #[arg(long)]
        persona: PathBuf,

        /// Directory containing the referenced analysis-rules / host-profile documents.
        #[arg(long)]
        resources_dir: PathBuf,

        /// Per-episode working directory (Input/, Processing/, Output/ are created under it).
        #[arg(long)]
        work_dir: PathBuf,

        /// Pipeline configuration JSON; defaults are used if omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Verbose output.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Report on a previously completed or interrupted run.
    Inspect {
        /// The same working directory passed to `run`.
        #[arg(long)]
        work_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { transcript, metadata, persona, resources_dir, work_dir, config, verbose } => {
            setup_logging(verbose);
            run(transcript, metadata, persona, resources_dir, work_dir, config).await
        }
        Commands::Inspect { work_dir } => inspect(work_dir),
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

async fn run(
    transcript_path: PathBuf,
    metadata_path: PathBuf,
    persona_path: PathBuf,
    resources_dir: PathBuf,
    work_dir_path: PathBuf,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let work_dir = EpisodeWorkDir::new(work_dir_path);
    ensure_work_dirs(&work_dir).context("failed to set up episode working directory")?;

    info!("Loading transcript from {:?}", transcript_path);
    let transcript = parse_transcript_file(&transcript_path).context("failed to parse transcript")?;
    info!("Loaded {} turns, {:.1} hours", transcript.turns.len(), transcript.duration_hours());

    let metadata = load_episode_metadata(&metadata_path).context("failed to load episode metadata")?;
    let resources = load_episode_resources(&metadata, &persona_path, &resources_dir).context("failed to load episode resources")?;

    let config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path).with_context(|| format!("failed to read config: {:?}", path))?;
            serde_json::from_str(&content).context("failed to parse config JSON")?
        }
        None => PipelineConfig::default(),
    };

    let backend = AnthropicBackend::new(AnthropicConfig::from_env()?);

    let outcome = run_pipeline(&backend, &work_dir, &transcript, &metadata, &resources, &config).await?;

    match outcome {
        PipelineOutcome::Completed { script, run_log } => {
            let summary = RunSummary::new(&run_log);
            summary.write_file(&work_dir.run_summary_path())?;
            println!("{}", summary.format());
            info!("Completed: {} sections written to {:?}", script.sections.len(), work_dir.output_script_path());
            Ok(())
        }
        PipelineOutcome::StoppedAt { stage, run_log, reason } => {
            let summary = RunSummary::new(&run_log);
            summary.write_file(&work_dir.run_summary_path())?;
            println!("{}", summary.format());
            anyhow::bail!("pipeline stopped at stage {}: {}", stage, reason);
        }
    }
}

fn inspect(work_dir_path: PathBuf) -> Result<()> {
    let work_dir = EpisodeWorkDir::new(work_dir_path);

    match latest_completed_stage(&work_dir) {
        Some(stage) => println!("Furthest completed stage: {}", stage),
        None => println!("No stage artifacts found in this working directory."),
    }

    let output_path = work_dir.output_script_path();
    if output_path.exists() {
        let script = load_script(&output_path)?;
        println!("Final script: {} sections, {:.0}s estimated runtime", script.sections.len(), script.metadata.total_est_duration_s);
    } else {
        println!("No final script written yet.");
    }

    let summary_path = work_dir.run_summary_path();
    if summary_path.exists() {
        let summary = std::fs::read_to_string(&summary_path)?;
        println!("\n{}", summary);
    }

    Ok(())
}
