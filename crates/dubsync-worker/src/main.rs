//! Dubbing track assembly binary.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dubsync_models::{normalize_transcript, DubbingRules, Schedule, Segment, TranscriptSegment};
use dubsync_worker::metrics::init_metrics;
use dubsync_worker::rules::load_dubbing_rules;
use dubsync_worker::{DubbingPipeline, SegmentStore, SyncMode, WorkerConfig};

/// Loose-sync dubbing track assembly
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Write a Prometheus text dump of the collected metrics here on exit
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply rules and compute the loose-sync schedule without rendering
    Schedule {
        /// Segment sequence (JSON array)
        #[arg(long)]
        segments: PathBuf,
        /// Rules document (dubbing-rules.json)
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Use the reference trigger set (first segment and speaker changes only)
        #[arg(long)]
        reference: bool,
        /// Write the schedule here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Compute the schedule and render the dubbed track
    Assemble {
        /// Segment sequence (JSON array)
        #[arg(long)]
        segments: PathBuf,
        /// Output audio file
        #[arg(long)]
        output: PathBuf,
        /// Rules document (dubbing-rules.json)
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Background track blended under the speech
        #[arg(long)]
        background: Option<PathBuf>,
        /// Length of the source recording in seconds
        #[arg(long)]
        total_duration: Option<f64>,
        /// Also write the schedule here
        #[arg(long)]
        schedule_out: Option<PathBuf>,
    },

    /// Reconcile a fresh segment sequence with the persisted one and save the result
    Reconcile {
        /// Fresh segment sequence (JSON array)
        #[arg(long)]
        fresh: PathBuf,
        /// Treat the fresh file as raw transcription output
        #[arg(long)]
        transcript: bool,
        /// Directory holding the persisted state
        #[arg(long)]
        dir: PathBuf,
        #[arg(long)]
        video_id: String,
        /// On a count mismatch, discard the persisted sequence
        #[arg(long)]
        overwrite: bool,
    },

    /// Print the JSON schema of an input or output document
    Schema {
        #[arg(value_enum)]
        kind: SchemaKind,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SchemaKind {
    Segments,
    Rules,
    Schedule,
}

#[derive(Serialize)]
struct ReconcileReport {
    path: PathBuf,
    outcome: &'static str,
    segments: usize,
    existing_synthesis: Option<Vec<PathBuf>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    let metrics = match &cli.metrics_out {
        Some(_) => Some(init_metrics().context("Failed to install metrics recorder")?),
        None => None,
    };

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    match cli.command {
        Commands::Schedule {
            segments,
            rules,
            reference,
            out,
        } => {
            let mut config = config;
            if reference {
                config.sync_mode = SyncMode::Reference;
            }
            let pipeline = DubbingPipeline::with_ffmpeg(config, load_rules(rules.as_deref()));
            let plan = pipeline.plan(read_segments(&segments)?).await;
            write_json(out.as_deref(), &plan.schedule)?;
        }
        Commands::Assemble {
            segments,
            output,
            rules,
            background,
            total_duration,
            schedule_out,
        } => {
            let pipeline = DubbingPipeline::with_ffmpeg(config, load_rules(rules.as_deref()));
            let outcome = pipeline
                .run(
                    read_segments(&segments)?,
                    background.as_deref(),
                    total_duration,
                    &output,
                )
                .await
                .context("Assembly failed")?;

            if let Some(path) = schedule_out.as_deref() {
                write_json(Some(path), &outcome.schedule)?;
            }
            write_json(None, &outcome)?;
        }
        Commands::Reconcile {
            fresh,
            transcript,
            dir,
            video_id,
            overwrite,
        } => {
            let fresh = if transcript {
                let raw: Vec<TranscriptSegment> = read_json(&fresh)?;
                normalize_transcript(raw)
            } else {
                read_segments(&fresh)?
            };

            let store = SegmentStore::new(dir, &video_id);
            let reconciled = store
                .reconcile(fresh, overwrite || config.overwrite_segments)
                .await
                .context("Failed to reconcile segments")?;
            let segments = store.adopt_existing_clips(reconciled.segments);
            store
                .save(&segments)
                .await
                .context("Failed to save segments")?;

            let report = ReconcileReport {
                path: store.path().to_path_buf(),
                outcome: reconciled.outcome.as_str(),
                segments: segments.len(),
                existing_synthesis: store.existing_synthesis(&segments),
            };
            write_json(None, &report)?;
        }
        Commands::Schema { kind } => {
            let schema = match kind {
                SchemaKind::Segments => schemars::schema_for!(Vec<Segment>),
                SchemaKind::Rules => schemars::schema_for!(DubbingRules),
                SchemaKind::Schedule => schemars::schema_for!(Schedule),
            };
            write_json(None, &schema)?;
        }
    }

    if let (Some(path), Some(handle)) = (cli.metrics_out.as_deref(), metrics) {
        std::fs::write(path, handle.render())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    Ok(())
}

/// Initialize tracing with colored output for dev, JSON for production.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("dubsync=info".parse()?);

    // Logs go to stderr so stdout carries only JSON results
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

fn load_rules(path: Option<&Path>) -> DubbingRules {
    path.map(load_dubbing_rules).unwrap_or_default()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn read_segments(path: &Path) -> anyhow::Result<Vec<Segment>> {
    read_json(path)
}

fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{}", json);
            Ok(())
        }
    }
}
