//! Schedule produced by the loose-sync timing calculator.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Why a segment attempted to jump to its original start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncReason {
    /// First renderable segment
    FirstSegment,
    /// Speaker differs from the previous renderable segment
    SpeakerChange,
    /// Natural flow would drift past the configured bound
    MaxDrift,
    /// Periodic forced resync
    Periodic,
}

impl SyncReason {
    /// Wire name of the reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncReason::FirstSegment => "first_segment",
            SyncReason::SpeakerChange => "speaker_change",
            SyncReason::MaxDrift => "max_drift",
            SyncReason::Periodic => "periodic",
        }
    }
}

impl fmt::Display for SyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Placement decision for one renderable segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScheduledSegment {
    /// Position of the segment in the input sequence
    pub index: usize,
    pub audio_file: PathBuf,
    pub speaker: String,
    pub original_start: f64,
    /// Offset in the output track (seconds)
    pub start_time: f64,
    /// Clip duration (seconds)
    pub duration: f64,
    /// Whether the segment was placed at its original start
    pub synced: bool,
    /// Trigger of the sync attempt, kept even when the attempt was abandoned
    pub sync_reason: Option<SyncReason>,
    /// `start_time - original_start`; positive means later than the original
    pub drift: f64,
    /// Whether the crossfade window shortened the gap
    #[serde(default)]
    pub crossfade: bool,
    /// False when the duration is the `end - start` fallback
    #[serde(default = "default_true")]
    pub duration_probed: bool,
}

fn default_true() -> bool {
    true
}

impl ScheduledSegment {
    /// End of the clip in the output track.
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// A sync was attempted but rejected by the safety rule.
    pub fn sync_abandoned(&self) -> bool {
        self.sync_reason.is_some() && !self.synced
    }

    /// Delay in whole milliseconds, truncated, for the mix graph.
    pub fn delay_ms(&self) -> u64 {
        (self.start_time.max(0.0) * 1000.0) as u64
    }
}

/// Aggregate statistics over a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct TimingSummary {
    pub total_segments: usize,
    pub synced_segments: usize,
    /// Synced share in `0.0..=1.0`
    pub sync_rate: f64,
    /// Count per reason, over synced entries only
    pub sync_reasons: BTreeMap<String, usize>,
    pub abandoned_syncs: usize,
    /// Largest positive drift, or 0
    pub max_positive_drift: f64,
    /// Most negative drift, or 0
    pub max_negative_drift: f64,
    /// End of the last clip
    pub total_span: f64,
}

impl TimingSummary {
    /// Compute statistics for a list of entries.
    pub fn from_entries(entries: &[ScheduledSegment]) -> Self {
        let mut summary = TimingSummary {
            total_segments: entries.len(),
            ..Default::default()
        };

        for entry in entries {
            if entry.synced {
                summary.synced_segments += 1;
                if let Some(reason) = entry.sync_reason {
                    *summary
                        .sync_reasons
                        .entry(reason.as_str().to_string())
                        .or_insert(0) += 1;
                }
            } else if entry.sync_abandoned() {
                summary.abandoned_syncs += 1;
            }

            summary.max_positive_drift = summary.max_positive_drift.max(entry.drift);
            summary.max_negative_drift = summary.max_negative_drift.min(entry.drift);
            summary.total_span = summary.total_span.max(entry.end_time());
        }

        if summary.total_segments > 0 {
            summary.sync_rate = summary.synced_segments as f64 / summary.total_segments as f64;
        }

        summary
    }
}

/// Ordered placement decisions plus their summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Schedule {
    pub entries: Vec<ScheduledSegment>,
    pub summary: TimingSummary,
}

impl Schedule {
    /// Build a schedule, computing its summary.
    pub fn new(entries: Vec<ScheduledSegment>) -> Self {
        let summary = TimingSummary::from_entries(&entries);
        Self { entries, summary }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduledSegment> {
        self.entries.iter()
    }

    /// Index of the first entry that starts before its predecessor ends.
    pub fn first_overlap(&self) -> Option<usize> {
        self.entries
            .windows(2)
            .position(|pair| pair[1].start_time < pair[0].end_time())
            .map(|i| i + 1)
    }
}
