//! Multi-track mix assembly.
//!
//! Turns a schedule into one FFmpeg render: every clip is pre-attenuated and
//! delayed to its start offset, the clips are summed onto a speech bus, and
//! the bus is optionally blended with a background track.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use dubsync_models::{clip_is_readable, AudioSettings, MixEncoding, ScheduledSegment};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::build_mix_graph;
use crate::fs_utils::{ensure_parent_dir, move_file, partial_path, remove_if_exists};

/// Smallest output accepted as a real render.
pub const MIN_OUTPUT_BYTES: u64 = 1000;

/// Executes a prepared FFmpeg command.
#[async_trait]
pub trait MixRenderer: Send + Sync {
    async fn render(&self, cmd: &FfmpegCommand) -> MediaResult<()>;
}

#[async_trait]
impl MixRenderer for FfmpegRunner {
    async fn render(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run(cmd).await
    }
}

/// Outcome of a successful assembly.
#[derive(Debug, Clone, Serialize)]
pub struct MixReport {
    pub output: PathBuf,
    /// Speech clips that made it into the render
    pub inputs_mixed: usize,
    /// Schedule indices whose clip disappeared before rendering
    pub dropped_clips: Vec<usize>,
    pub has_background: bool,
    pub output_bytes: u64,
    /// How far the schedule runs past the requested total duration
    pub overrun_secs: Option<f64>,
    pub filter_graph: String,
}

/// Builds and renders the layered dubbing mix.
pub struct MixAssembler {
    renderer: Arc<dyn MixRenderer>,
    settings: AudioSettings,
    encoding: MixEncoding,
}

impl MixAssembler {
    /// Create an assembler encoding at the settings' bitrate.
    pub fn new(renderer: Arc<dyn MixRenderer>, settings: AudioSettings) -> Self {
        let encoding = MixEncoding::from_settings(&settings);
        Self {
            renderer,
            settings,
            encoding,
        }
    }

    /// Render `entries` (and the optional background) into `output`.
    ///
    /// `total_duration` is advisory: a schedule that runs past it is still
    /// rendered, and the overrun is reported.
    pub async fn assemble(
        &self,
        entries: &[ScheduledSegment],
        background: Option<&Path>,
        total_duration: Option<f64>,
        output: &Path,
    ) -> MediaResult<MixReport> {
        let mut clips = Vec::with_capacity(entries.len());
        let mut dropped_clips = Vec::new();

        for entry in entries {
            if clip_is_readable(&entry.audio_file) {
                clips.push(entry);
            } else {
                warn!(
                    segment = entry.index,
                    path = %entry.audio_file.display(),
                    "Clip disappeared after scheduling, dropping it from the mix"
                );
                dropped_clips.push(entry.index);
            }
        }

        if clips.is_empty() {
            return Err(MediaError::NoRenderableSegments);
        }

        let background = match background {
            Some(path) if clip_is_readable(path) => Some(path),
            Some(path) => {
                warn!(
                    path = %path.display(),
                    "Background track not found, mixing speech only"
                );
                None
            }
            None => {
                debug!("No background track supplied, mixing speech only");
                None
            }
        };

        let delays: Vec<u64> = clips.iter().map(|c| c.delay_ms()).collect();
        let graph = build_mix_graph(
            &delays,
            self.settings.vocal_volume,
            background.map(|_| self.settings.background_volume),
        );

        let partial = partial_path(output);
        ensure_parent_dir(&partial).await?;

        let mut cmd = FfmpegCommand::new(&partial);
        for clip in &clips {
            cmd = cmd.input(&clip.audio_file);
        }
        if let Some(path) = background {
            cmd = cmd.input(path);
        }
        let cmd = cmd
            .filter_complex(graph.filter.clone())
            .map(graph.map_label())
            .output_args(self.encoding.to_ffmpeg_args());

        info!(
            clips = clips.len(),
            dropped = dropped_clips.len(),
            background = background.is_some(),
            output = %output.display(),
            "Rendering dubbing mix"
        );

        if let Err(e) = self.renderer.render(&cmd).await {
            remove_if_exists(&partial).await;
            return Err(e);
        }

        let output_bytes = match tokio::fs::metadata(&partial).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                return Err(MediaError::ffmpeg_failed(
                    "Render finished without producing an output file",
                    None,
                    None,
                ))
            }
        };

        if output_bytes < MIN_OUTPUT_BYTES {
            remove_if_exists(&partial).await;
            return Err(MediaError::OutputTooSmall {
                path: output.to_path_buf(),
                bytes: output_bytes,
                minimum: MIN_OUTPUT_BYTES,
            });
        }

        if let Err(e) = move_file(&partial, output).await {
            remove_if_exists(&partial).await;
            return Err(e);
        }

        let span = clips
            .iter()
            .map(|c| c.end_time())
            .fold(0.0_f64, f64::max);
        let overrun_secs = total_duration
            .filter(|total| total.is_finite() && span > *total)
            .map(|total| span - total);

        if let Some(overrun) = overrun_secs {
            warn!(
                overrun_secs = overrun,
                span_secs = span,
                "Dubbed speech runs past the requested total duration"
            );
        }

        info!(
            output = %output.display(),
            bytes = output_bytes,
            "Dubbing mix written"
        );

        Ok(MixReport {
            output: output.to_path_buf(),
            inputs_mixed: clips.len(),
            dropped_clips,
            has_background: background.is_some(),
            output_bytes,
            overrun_secs,
            filter_graph: graph.filter,
        })
    }
}
