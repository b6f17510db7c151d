//! Dubbing track assembly worker.
//!
//! This crate provides:
//! - Rule engine for segment timing rules and text substitutions
//! - Loose-sync timing calculator
//! - Segment store with reconciliation of persisted state
//! - Pipeline orchestration with the concatenation fallback

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod rules;
pub mod store;
pub mod timing;

pub use config::{SyncMode, WorkerConfig};
pub use error::{StoreError, WorkerError, WorkerResult};
pub use logging::RunLogger;
pub use pipeline::{AssemblyOutcome, AssemblyStrategy, DubbingPipeline, Plan};
pub use store::{ReconcileOutcome, Reconciled, SegmentStore};
pub use timing::{calculate_loose_sync_timing, prefetch_durations, schedule_segments, ProbedDuration};
