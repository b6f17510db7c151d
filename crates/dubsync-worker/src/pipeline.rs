//! Dubbing pipeline orchestration.
//!
//! Segment rules, text rules, probe prefetch and loose-sync placement, then
//! the layered mix. When the mix cannot be produced the clips are joined back
//! to back instead, and the outcome says which strategy produced the file.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn, Instrument};

use dubsync_media::{
    concatenate_clips, ClipProber, FfmpegRunner, FfprobeProber, MediaError, MixAssembler,
    MixRenderer, MixReport,
};
use dubsync_models::{DubbingRules, LooseSyncConfig, RunId, Schedule, Segment};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::RunLogger;
use crate::metrics;
use crate::rules::{apply_segment_rules, apply_text_rules_to_segments};
use crate::timing::{prefetch_durations, schedule_segments};

/// Which strategy produced the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyStrategy {
    /// Layered mix with per-clip delays
    Mixed,
    /// Back-to-back concatenation after the mix failed
    Concatenated,
}

impl AssemblyStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssemblyStrategy::Mixed => "mixed",
            AssemblyStrategy::Concatenated => "concatenated",
        }
    }
}

/// Segments after the rule engine, and their placement.
#[derive(Debug, Clone)]
pub struct Plan {
    pub segments: Vec<Segment>,
    pub timing: LooseSyncConfig,
    pub schedule: Schedule,
}

/// Result of a full pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct AssemblyOutcome {
    pub run_id: String,
    pub strategy: AssemblyStrategy,
    pub output: PathBuf,
    pub schedule: Schedule,
    /// Present when the layered mix succeeded
    pub mix_report: Option<MixReport>,
    /// Why the mix failed, when the concatenation fallback was used
    pub mix_error: Option<String>,
    /// Clips joined by the fallback
    pub clips_concatenated: Option<usize>,
}

/// Runs the dubbing stages for one segment sequence.
pub struct DubbingPipeline {
    config: WorkerConfig,
    rules: DubbingRules,
    prober: Arc<dyn ClipProber>,
    renderer: Arc<dyn MixRenderer>,
}

impl DubbingPipeline {
    pub fn new(
        config: WorkerConfig,
        rules: DubbingRules,
        prober: Arc<dyn ClipProber>,
        renderer: Arc<dyn MixRenderer>,
    ) -> Self {
        Self {
            config,
            rules,
            prober,
            renderer,
        }
    }

    /// Pipeline backed by the FFprobe/FFmpeg binaries, with the configured timeouts.
    pub fn with_ffmpeg(config: WorkerConfig, rules: DubbingRules) -> Self {
        let prober = FfprobeProber::new().with_timeout(config.probe_timeout.as_secs().max(1));
        let renderer = FfmpegRunner::new().with_timeout(config.mix_timeout.as_secs().max(1));
        Self::new(config, rules, Arc::new(prober), Arc::new(renderer))
    }

    /// Run every stage up to the schedule, without rendering.
    pub async fn plan(&self, segments: Vec<Segment>) -> Plan {
        let logger = RunLogger::new(&RunId::new(), "plan");
        let span = logger.create_span();
        self.plan_with(&logger, segments).instrument(span).await
    }

    /// Plan, then render `output`, falling back to concatenation if the mix fails.
    pub async fn run(
        &self,
        segments: Vec<Segment>,
        background: Option<&Path>,
        total_duration: Option<f64>,
        output: &Path,
    ) -> WorkerResult<AssemblyOutcome> {
        let logger = RunLogger::new(&RunId::new(), "assemble");
        let span = logger.create_span();
        self.run_with(&logger, segments, background, total_duration, output)
            .instrument(span)
            .await
    }

    async fn run_with(
        &self,
        logger: &RunLogger,
        segments: Vec<Segment>,
        background: Option<&Path>,
        total_duration: Option<f64>,
        output: &Path,
    ) -> WorkerResult<AssemblyOutcome> {
        logger.log_start(&format!("Assembling {} segments", segments.len()));

        let plan = self.plan_with(logger, segments).await;
        if plan.schedule.is_empty() {
            logger.log_error("No renderable segments");
            return Err(MediaError::NoRenderableSegments.into());
        }

        let outcome = self
            .assemble(logger, plan.schedule, background, total_duration, output)
            .await?;

        logger.log_completion(&format!(
            "{} segments, {:.1}% synced, strategy {}",
            outcome.schedule.len(),
            outcome.schedule.summary.sync_rate * 100.0,
            outcome.strategy.as_str()
        ));
        Ok(outcome)
    }

    async fn plan_with(&self, logger: &RunLogger, segments: Vec<Segment>) -> Plan {
        let timing = self.config.loose_sync_config(&self.rules.audio_settings);
        self.log_settings(&timing);

        let segments = apply_segment_rules(segments, &self.rules.segment_rules);
        let segments = apply_text_rules_to_segments(
            segments,
            &self.config.target_language,
            &self.rules.text_rules,
        );
        logger.log_progress("Rules applied");

        let durations = prefetch_durations(
            &segments,
            self.prober.as_ref(),
            self.config.max_probe_parallel,
            self.config.probe_timeout,
        )
        .await;
        let schedule = schedule_segments(&segments, &durations, &timing);

        logger.log_progress(&format!(
            "Scheduled {} of {} segments ({} synced)",
            schedule.len(),
            segments.len(),
            schedule.summary.synced_segments
        ));

        Plan {
            segments,
            timing,
            schedule,
        }
    }

    async fn assemble(
        &self,
        logger: &RunLogger,
        schedule: Schedule,
        background: Option<&Path>,
        total_duration: Option<f64>,
        output: &Path,
    ) -> WorkerResult<AssemblyOutcome> {
        let assembler =
            MixAssembler::new(self.renderer.clone(), self.rules.audio_settings.clone());

        let started = Instant::now();
        let mixed = match tokio::time::timeout(
            self.config.mix_timeout,
            assembler.assemble(&schedule.entries, background, total_duration, output),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MediaError::Timeout(self.config.mix_timeout.as_secs())),
        };

        let mix_error = match mixed {
            Ok(report) => {
                metrics::record_assembly(
                    AssemblyStrategy::Mixed.as_str(),
                    true,
                    started.elapsed().as_secs_f64(),
                );
                return Ok(AssemblyOutcome {
                    run_id: logger.run_id().to_string(),
                    strategy: AssemblyStrategy::Mixed,
                    output: output.to_path_buf(),
                    schedule,
                    mix_report: Some(report),
                    mix_error: None,
                    clips_concatenated: None,
                });
            }
            Err(e) => {
                metrics::record_assembly(
                    AssemblyStrategy::Mixed.as_str(),
                    false,
                    started.elapsed().as_secs_f64(),
                );
                logger.log_warning(&format!("Mix failed, falling back to concatenation: {}", e));
                e
            }
        };

        let clips: Vec<PathBuf> = schedule
            .iter()
            .map(|entry| entry.audio_file.clone())
            .collect();

        let started = Instant::now();
        let concatenated = match tokio::time::timeout(
            self.config.mix_timeout,
            concatenate_clips(self.renderer.as_ref(), &clips, output),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MediaError::Timeout(self.config.mix_timeout.as_secs())),
        };

        metrics::record_assembly(
            AssemblyStrategy::Concatenated.as_str(),
            concatenated.is_ok(),
            started.elapsed().as_secs_f64(),
        );

        match concatenated {
            Ok(count) => Ok(AssemblyOutcome {
                run_id: logger.run_id().to_string(),
                strategy: AssemblyStrategy::Concatenated,
                output: output.to_path_buf(),
                schedule,
                mix_report: None,
                mix_error: Some(mix_error.to_string()),
                clips_concatenated: Some(count),
            }),
            Err(e) => {
                logger.log_error(&format!("Concatenation fallback failed: {}", e));
                Err(WorkerError::assembly_failed(format!(
                    "mix failed ({}); concatenation failed ({})",
                    mix_error, e
                )))
            }
        }
    }

    fn log_settings(&self, timing: &LooseSyncConfig) {
        let settings = &self.rules.audio_settings;
        info!(
            mode = %self.config.sync_mode,
            min_gap_secs = settings.min_gap_secs(),
            effective_gap_secs = timing.min_gap,
            crossfade_ms = settings.crossfade_duration,
            global_crossfade = settings.global_crossfade,
            background_volume = settings.background_volume,
            vocal_volume = settings.vocal_volume,
            audio_quality = %settings.audio_quality,
            "Audio settings"
        );
        if !settings.prevent_overlaps {
            warn!("preventOverlaps=false is ignored, clips never overlap");
        }
    }
}
