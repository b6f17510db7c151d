//! Shared data models for the dubsync timing core.
//!
//! This crate provides Serde-serializable types for:
//! - Dialogue segments and transcript normalization
//! - Segment and text rules loaded from the rules document
//! - Audio and loose-sync settings
//! - Schedule entries and timing summaries

pub mod rules;
pub mod run;
pub mod schedule;
pub mod segment;
pub mod settings;

// Re-export common types
pub use rules::{ActionType, DetectionMethod, DubbingRules, RulePriority, SegmentRule, TextRule};
pub use run::RunId;
pub use schedule::{Schedule, ScheduledSegment, SyncReason, TimingSummary};
pub use segment::{
    clip_is_readable, normalize_transcript, Segment, TranscriptSegment, Word, DEFAULT_SPEAKER,
};
pub use settings::{AudioSettings, CrossfadeWindow, LooseSyncConfig, MixEncoding};
