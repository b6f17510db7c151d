//! FFmpeg CLI wrapper for dubbing track assembly.
//!
//! This crate provides:
//! - Type-safe, multi-input FFmpeg command building
//! - Clip probing through FFprobe behind the [`ClipProber`] trait
//! - The layered dubbing mix ([`MixAssembler`]) and its concatenation fallback

pub mod command;
pub mod concat;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod mix;
pub mod probe;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use concat::concatenate_clips;
pub use error::{MediaError, MediaResult};
pub use filters::{build_mix_graph, MixGraph, SPEECH_PRE_GAIN};
pub use fs_utils::move_file;
pub use mix::{MixAssembler, MixRenderer, MixReport, MIN_OUTPUT_BYTES};
pub use probe::{get_duration, probe_audio, AudioInfo, ClipProber, FfprobeProber};
