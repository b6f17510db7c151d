//! FFprobe audio information.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Audio file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Audio codec
    pub codec: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u32,
    /// File size in bytes
    pub size: u64,
    /// Bitrate in bits/second
    pub bitrate: u64,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    duration: Option<String>,
}

/// Probe an audio file for information.
pub async fn probe_audio(path: impl AsRef<Path>) -> MediaResult<AudioInfo> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            format!("FFprobe failed for {}", path.display()),
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
        ));
    }

    parse_probe_output(&output.stdout)
}

/// Turn FFprobe's JSON report into [`AudioInfo`].
fn parse_probe_output(stdout: &[u8]) -> MediaResult<AudioInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let audio_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .ok_or_else(|| MediaError::invalid_audio("No audio stream found"))?;

    // Container duration first, stream duration as a fallback
    let duration = probe
        .format
        .duration
        .as_deref()
        .or(audio_stream.duration.as_deref())
        .and_then(|d| d.trim().parse::<f64>().ok())
        .ok_or_else(|| MediaError::invalid_audio("Duration not reported"))?;

    if !duration.is_finite() || duration < 0.0 {
        return Err(MediaError::invalid_audio(format!(
            "Invalid duration: {}",
            duration
        )));
    }

    let size = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let bitrate = probe
        .format
        .bit_rate
        .as_ref()
        .and_then(|b| b.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(AudioInfo {
        duration,
        codec: audio_stream.codec_name.clone().unwrap_or_default(),
        sample_rate: audio_stream
            .sample_rate
            .as_ref()
            .and_then(|r| r.parse().ok())
            .unwrap_or(0),
        channels: audio_stream.channels.unwrap_or(0),
        size,
        bitrate,
    })
}

/// Get audio duration in seconds.
pub async fn get_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let info = probe_audio(path).await?;
    Ok(info.duration)
}

/// Source of clip durations for the timing calculator.
#[async_trait]
pub trait ClipProber: Send + Sync {
    /// Duration of the clip at `path`, in seconds.
    async fn duration(&self, path: &Path) -> MediaResult<f64>;
}

/// [`ClipProber`] backed by the `ffprobe` binary.
#[derive(Debug, Clone, Default)]
pub struct FfprobeProber {
    timeout_secs: Option<u64>,
}

impl FfprobeProber {
    pub fn new() -> Self {
        Self { timeout_secs: None }
    }

    /// Set a per-probe timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

#[async_trait]
impl ClipProber for FfprobeProber {
    async fn duration(&self, path: &Path) -> MediaResult<f64> {
        match self.timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), get_duration(path))
                .await
                .map_err(|_| MediaError::Timeout(secs))?,
            None => get_duration(path).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_audio_report() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "mp3", "sample_rate": "24000", "channels": 1}
            ],
            "format": {"duration": "1.812000", "size": "29373", "bit_rate": "129683"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert!((info.duration - 1.812).abs() < 1e-9);
        assert_eq!(info.codec, "mp3");
        assert_eq!(info.sample_rate, 24000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.size, 29373);
    }

    #[test]
    fn test_stream_duration_fallback() {
        let json = br#"{
            "streams": [{"codec_type": "audio", "duration": "2.5"}],
            "format": {}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.duration, 2.5);
    }

    #[test]
    fn test_rejects_missing_audio_or_duration() {
        let video_only = br#"{"streams": [{"codec_type": "video"}], "format": {"duration": "3.0"}}"#;
        assert!(matches!(
            parse_probe_output(video_only),
            Err(MediaError::InvalidAudio(_))
        ));

        let no_duration = br#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "N/A"}}"#;
        assert!(matches!(
            parse_probe_output(no_duration),
            Err(MediaError::InvalidAudio(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = probe_audio(dir.path().join("missing.mp3")).await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
