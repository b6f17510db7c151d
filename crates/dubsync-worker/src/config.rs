//! Worker configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dubsync_models::{AudioSettings, LooseSyncConfig};

/// Which trigger set the timing calculator uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// First segment and speaker changes only
    Reference,
    /// Adds periodic resync, the drift bound and crossfade windows
    #[default]
    Enhanced,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Reference => "reference",
            SyncMode::Enhanced => "enhanced",
        }
    }

    /// Timing configuration for this mode.
    pub fn loose_sync_config(&self, settings: &AudioSettings) -> LooseSyncConfig {
        match self {
            SyncMode::Reference => LooseSyncConfig::default(),
            SyncMode::Enhanced => LooseSyncConfig::enhanced(settings),
        }
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reference" | "basic" => Ok(SyncMode::Reference),
            "enhanced" => Ok(SyncMode::Enhanced),
            other => Err(format!("unknown sync mode: {}", other)),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Work directory for persisted segments and rendered clips
    pub work_dir: PathBuf,
    /// Timeout for a single clip probe
    pub probe_timeout: Duration,
    /// Timeout for the mix render
    pub mix_timeout: Duration,
    /// Maximum concurrent FFprobe processes
    pub max_probe_parallel: usize,
    /// Timing trigger set
    pub sync_mode: SyncMode,
    /// Language code text rules are filtered against
    pub target_language: String,
    /// Discard persisted segments when their count differs from fresh ones
    pub overwrite_segments: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/dubsync"),
            probe_timeout: Duration::from_secs(10),
            mix_timeout: Duration::from_secs(1800), // 30 minutes
            max_probe_parallel: 8,
            sync_mode: SyncMode::Enhanced,
            target_language: "es".to_string(),
            overwrite_segments: false,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup; unparseable values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            work_dir: lookup("DUBSYNC_WORK_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            probe_timeout: lookup("DUBSYNC_PROBE_TIMEOUT_SECS")
                .and_then(|s| s.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.probe_timeout),
            mix_timeout: lookup("DUBSYNC_MIX_TIMEOUT_SECS")
                .and_then(|s| s.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.mix_timeout),
            max_probe_parallel: lookup("DUBSYNC_MAX_PROBE_PARALLEL")
                .and_then(|s| s.trim().parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_probe_parallel),
            sync_mode: lookup("DUBSYNC_SYNC_MODE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sync_mode),
            target_language: lookup("DUBSYNC_TARGET_LANGUAGE")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.target_language),
            overwrite_segments: lookup("DUBSYNC_OVERWRITE_SEGMENTS")
                .and_then(|s| parse_flag(&s))
                .unwrap_or(defaults.overwrite_segments),
        }
    }

    /// Timing configuration for the configured mode.
    pub fn loose_sync_config(&self, settings: &AudioSettings) -> LooseSyncConfig {
        self.sync_mode.loose_sync_config(settings)
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
