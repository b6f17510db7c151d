//! Audio and loose-sync settings.
//!
//! [`AudioSettings`] is the editor-facing settings object (camelCase JSON,
//! milliseconds). [`LooseSyncConfig`] is the timing calculator's own view,
//! in seconds, derived from it.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default crossfade window (milliseconds)
pub const DEFAULT_CROSSFADE_MS: f64 = 150.0;
/// Default minimum gap requested by the editor (milliseconds)
pub const DEFAULT_MIN_GAP_MS: f64 = 100.0;
/// Default background track gain
pub const DEFAULT_BACKGROUND_VOLUME: f64 = 0.8;
/// Default speech bus gain
pub const DEFAULT_VOCAL_VOLUME: f64 = 1.0;
/// Default output bitrate
pub const DEFAULT_AUDIO_QUALITY: &str = "128k";
/// Default output codec
pub const DEFAULT_AUDIO_CODEC: &str = "libmp3lame";

/// Gap placed between consecutive clips in natural flow (seconds)
pub const LOOSE_SYNC_MIN_GAP: f64 = 0.15;
/// Headroom required before a clip may jump to its original start (seconds)
pub const LOOSE_SYNC_SAFETY_BUFFER: f64 = 0.05;
/// Periodic resync interval used by the enhanced variant
pub const ENHANCED_SYNC_EVERY_N: usize = 3;
/// Drift beyond which the enhanced variant forces a resync (seconds)
pub const ENHANCED_FORCE_SYNC_THRESHOLD: f64 = 1.5;

fn default_crossfade_ms() -> f64 {
    DEFAULT_CROSSFADE_MS
}
fn default_true() -> bool {
    true
}
fn default_min_gap_ms() -> f64 {
    DEFAULT_MIN_GAP_MS
}
fn default_background_volume() -> f64 {
    DEFAULT_BACKGROUND_VOLUME
}
fn default_vocal_volume() -> f64 {
    DEFAULT_VOCAL_VOLUME
}
fn default_audio_quality() -> String {
    DEFAULT_AUDIO_QUALITY.to_string()
}

/// Settings consumed by the rule engine and the mix assembler.
///
/// Unknown keys are ignored and missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AudioSettings {
    /// Crossfade every segment, not only priority ones
    #[serde(default)]
    pub global_crossfade: bool,

    /// Crossfade window in milliseconds
    #[serde(default = "default_crossfade_ms")]
    pub crossfade_duration: f64,

    /// Kept for compatibility; placement never overlaps regardless
    #[serde(default = "default_true")]
    pub prevent_overlaps: bool,

    /// Editor's minimum gap in milliseconds
    #[serde(default = "default_min_gap_ms")]
    pub min_gap: f64,

    /// Gain applied to the background track
    #[serde(default = "default_background_volume")]
    pub background_volume: f64,

    /// Gain applied to the mixed speech bus
    #[serde(default = "default_vocal_volume")]
    pub vocal_volume: f64,

    /// Output bitrate (e.g. "128k", "192k")
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            global_crossfade: false,
            crossfade_duration: DEFAULT_CROSSFADE_MS,
            prevent_overlaps: true,
            min_gap: DEFAULT_MIN_GAP_MS,
            background_volume: DEFAULT_BACKGROUND_VOLUME,
            vocal_volume: DEFAULT_VOCAL_VOLUME,
            audio_quality: DEFAULT_AUDIO_QUALITY.to_string(),
        }
    }
}

impl AudioSettings {
    /// Crossfade window in seconds, never negative.
    pub fn crossfade_secs(&self) -> f64 {
        (self.crossfade_duration / 1000.0).max(0.0)
    }

    /// Editor's minimum gap in seconds, never negative.
    pub fn min_gap_secs(&self) -> f64 {
        (self.min_gap / 1000.0).max(0.0)
    }
}

/// Crossfade window applied to natural-flow placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CrossfadeWindow {
    /// Window length in seconds; half of it is taken out of the gap
    pub duration: f64,
    /// Apply to every segment instead of only priority ones
    pub global: bool,
}

/// Configuration for the loose-sync timing calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LooseSyncConfig {
    /// Gap between consecutive clips in natural flow (seconds)
    pub min_gap: f64,

    /// Headroom required before jumping to an original start (seconds)
    pub safety_buffer: f64,

    /// Attempt a resync whenever the speaker changes
    pub sync_on_speaker_change: bool,

    /// Attempt a resync on every Nth renderable segment
    pub sync_every_n_segments: Option<usize>,

    /// Attempt a resync once natural flow would drift further than this (seconds)
    pub max_drift_seconds: Option<f64>,

    /// Shrink the gap for crossfaded segments
    pub crossfade: Option<CrossfadeWindow>,

    /// Widen the gap to the segments' own pause buffers
    pub respect_segment_buffers: bool,
}

impl Default for LooseSyncConfig {
    fn default() -> Self {
        Self {
            min_gap: LOOSE_SYNC_MIN_GAP,
            safety_buffer: LOOSE_SYNC_SAFETY_BUFFER,
            sync_on_speaker_change: true,
            sync_every_n_segments: None,
            max_drift_seconds: None,
            crossfade: None,
            respect_segment_buffers: false,
        }
    }
}

impl LooseSyncConfig {
    /// The richer trigger set used by final assembly.
    pub fn enhanced(settings: &AudioSettings) -> Self {
        Self {
            sync_every_n_segments: Some(ENHANCED_SYNC_EVERY_N),
            max_drift_seconds: Some(ENHANCED_FORCE_SYNC_THRESHOLD),
            crossfade: Some(CrossfadeWindow {
                duration: settings.crossfade_secs(),
                global: settings.global_crossfade,
            }),
            ..Self::default()
        }
    }

    /// Builder-style setter for periodic resync.
    pub fn with_sync_every(mut self, n: usize) -> Self {
        self.sync_every_n_segments = Some(n);
        self
    }

    /// Builder-style setter for the drift bound.
    pub fn with_max_drift(mut self, seconds: f64) -> Self {
        self.max_drift_seconds = Some(seconds);
        self
    }

    /// Builder-style setter for the crossfade window.
    pub fn with_crossfade(mut self, duration: f64, global: bool) -> Self {
        self.crossfade = Some(CrossfadeWindow { duration, global });
        self
    }

    /// Builder-style setter for buffer-aware gaps.
    pub fn with_segment_buffers(mut self, enabled: bool) -> Self {
        self.respect_segment_buffers = enabled;
        self
    }
}

/// Output encoding for the assembled track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MixEncoding {
    /// Audio codec (e.g. "libmp3lame", "aac")
    pub audio_codec: String,
    /// Audio bitrate
    pub audio_bitrate: String,
    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for MixEncoding {
    fn default() -> Self {
        Self {
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_QUALITY.to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl MixEncoding {
    /// Encoding for the settings' bitrate with the default codec.
    pub fn from_settings(settings: &AudioSettings) -> Self {
        Self {
            audio_bitrate: settings.audio_quality.clone(),
            ..Self::default()
        }
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ];
        args.extend(self.extra_args.clone());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults_and_unknown_keys() {
        let settings: AudioSettings = serde_json::from_str(
            r#"{"vocalVolume": 1.4, "autoDetectPauses": true, "maxStretch": 120}"#,
        )
        .unwrap();
        assert_eq!(settings.vocal_volume, 1.4);
        assert_eq!(settings.background_volume, 0.8);
        assert_eq!(settings.crossfade_duration, 150.0);
        assert!(settings.prevent_overlaps);
        assert_eq!(settings.audio_quality, "128k");
    }

    #[test]
    fn test_millisecond_conversions() {
        let settings = AudioSettings {
            crossfade_duration: 300.0,
            min_gap: -20.0,
            ..Default::default()
        };
        assert!((settings.crossfade_secs() - 0.3).abs() < 1e-9);
        assert_eq!(settings.min_gap_secs(), 0.0);
    }

    #[test]
    fn test_reference_config() {
        let config = LooseSyncConfig::default();
        assert_eq!(config.min_gap, 0.15);
        assert_eq!(config.safety_buffer, 0.05);
        assert!(config.sync_every_n_segments.is_none());
        assert!(config.max_drift_seconds.is_none());
        assert!(config.crossfade.is_none());
    }

    #[test]
    fn test_enhanced_config_from_settings() {
        let settings = AudioSettings {
            global_crossfade: true,
            crossfade_duration: 200.0,
            ..Default::default()
        };
        let config = LooseSyncConfig::enhanced(&settings);
        assert_eq!(config.sync_every_n_segments, Some(3));
        assert_eq!(config.max_drift_seconds, Some(1.5));
        let window = config.crossfade.unwrap();
        assert!(window.global);
        assert!((window.duration - 0.2).abs() < 1e-9);
        assert_eq!(config.min_gap, LOOSE_SYNC_MIN_GAP);
    }

    #[test]
    fn test_mix_encoding_args() {
        let settings = AudioSettings {
            audio_quality: "192k".to_string(),
            ..Default::default()
        };
        let args = MixEncoding::from_settings(&settings).to_ffmpeg_args();
        assert_eq!(args, vec!["-c:a", "libmp3lame", "-b:a", "192k"]);
    }
}
