//! Persisted segment state.
//!
//! One JSON file per video holds the working segment sequence between runs,
//! so translations, rendered clips and manual edits survive re-invocation.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use dubsync_models::{clip_is_readable, Segment};

use crate::error::StoreError;

/// How a fresh sequence was reconciled with the persisted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing persisted; the fresh sequence is used as-is
    NoPersistedState,
    /// Equal counts; translations and clips were carried over
    Merged,
    /// Count mismatch, overwrite off; the persisted sequence replaced the fresh one
    PreservedPersisted,
    /// Count mismatch, overwrite on; the persisted sequence was discarded
    Recomputed,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::NoPersistedState => "no_persisted_state",
            ReconcileOutcome::Merged => "merged",
            ReconcileOutcome::PreservedPersisted => "preserved_persisted",
            ReconcileOutcome::Recomputed => "recomputed",
        }
    }
}

/// Result of [`SegmentStore::reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub segments: Vec<Segment>,
    pub outcome: ReconcileOutcome,
}

/// Segment sequence persisted at `<dir>/<video_id>_segments.json`.
#[derive(Debug, Clone)]
pub struct SegmentStore {
    dir: PathBuf,
    path: PathBuf,
}

impl SegmentStore {
    pub fn new(dir: impl Into<PathBuf>, video_id: &str) -> Self {
        let dir = dir.into();
        let path = dir.join(format!("{}_segments.json", video_id));
        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the sequence as pretty JSON, replacing any previous file atomically.
    pub async fn save(&self, segments: &[Segment]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(segments)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(StoreError::io(&self.path, e));
        }

        info!(
            path = %self.path.display(),
            segments = segments.len(),
            "Saved segment state"
        );
        Ok(())
    }

    /// Load the persisted sequence, or `None` if nothing was saved yet.
    pub async fn load(&self) -> Result<Option<Vec<Segment>>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::corrupt(&self.path, e))
    }

    /// Reconcile a freshly built sequence with the persisted one.
    ///
    /// On a count mismatch `overwrite` decides which side wins; the choice is
    /// always explicit in the returned outcome.
    pub async fn reconcile(
        &self,
        mut fresh: Vec<Segment>,
        overwrite: bool,
    ) -> Result<Reconciled, StoreError> {
        let Some(persisted) = self.load().await? else {
            info!(path = %self.path.display(), "No existing segments file found");
            return Ok(Reconciled {
                segments: fresh,
                outcome: ReconcileOutcome::NoPersistedState,
            });
        };

        if persisted.len() == fresh.len() {
            let mut carried = 0usize;
            for (current, existing) in fresh.iter_mut().zip(persisted) {
                let mut touched = false;
                if !existing.translated_text.is_empty() {
                    current.translated_text = existing.translated_text;
                    touched = true;
                }
                if existing.audio_file.is_some() {
                    current.audio_file = existing.audio_file;
                    touched = true;
                }
                if touched {
                    carried += 1;
                }
            }
            info!(
                segments = fresh.len(),
                carried, "Reusing existing translations from segments file"
            );
            return Ok(Reconciled {
                segments: fresh,
                outcome: ReconcileOutcome::Merged,
            });
        }

        warn!(
            existing = persisted.len(),
            current = fresh.len(),
            overwrite,
            "Segment count mismatch"
        );

        if overwrite {
            Ok(Reconciled {
                segments: fresh,
                outcome: ReconcileOutcome::Recomputed,
            })
        } else {
            info!("Using existing segments (overwrite disabled, preserving manual edits)");
            Ok(Reconciled {
                segments: persisted,
                outcome: ReconcileOutcome::PreservedPersisted,
            })
        }
    }

    /// Point each segment without a readable clip at an existing conventional one.
    ///
    /// Run before [`SegmentStore::save`] so clips found on disk are recorded in
    /// the persisted state and the sequence is schedulable as saved.
    pub fn adopt_existing_clips(&self, mut segments: Vec<Segment>) -> Vec<Segment> {
        let mut adopted = 0usize;
        for (idx, segment) in segments.iter_mut().enumerate() {
            if segment.is_renderable() {
                continue;
            }
            if let Some(path) = self.resolve_clip(idx, segment) {
                segment.audio_file = Some(path);
                adopted += 1;
            }
        }
        if adopted > 0 {
            info!(adopted, "Recorded existing clips in segment state");
        }
        segments
    }

    /// Clip paths for every segment if synthesis already ran to completion.
    ///
    /// Each segment resolves to its `audio_file`, or failing that to the
    /// conventional `chunk_<idx>.mp3` in the store directory.
    pub fn existing_synthesis(&self, segments: &[Segment]) -> Option<Vec<PathBuf>> {
        if segments.is_empty() {
            return None;
        }

        let mut clips = Vec::with_capacity(segments.len());
        let mut missing = Vec::new();

        for (idx, segment) in segments.iter().enumerate() {
            match self.resolve_clip(idx, segment) {
                Some(path) => clips.push(path),
                None => missing.push(idx),
            }
        }

        if !missing.is_empty() {
            info!(missing = ?missing, "Synthesis incomplete, clips missing");
            return None;
        }

        info!(clips = clips.len(), "All audio files found, reusing existing synthesis");
        Some(clips)
    }

    fn resolve_clip(&self, idx: usize, segment: &Segment) -> Option<PathBuf> {
        if let Some(path) = segment.clip_path().filter(|p| clip_is_readable(p)) {
            return Some(path.to_path_buf());
        }
        let conventional = self.dir.join(format!("chunk_{:03}.mp3", idx));
        clip_is_readable(&conventional).then_some(conventional)
    }
}
