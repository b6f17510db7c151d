//! Dialogue segment model.
//!
//! A [`Segment`] is one translated utterance. It is created from transcription
//! output, edited by the rule engine, given a rendered clip by synthesis and
//! finally read by the timing calculator and the mix assembler.

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Speaker label used when diarization produced nothing.
pub const DEFAULT_SPEAKER: &str = "SPEAKER_UNKNOWN";
/// Default synthesis speed multiplier.
pub const DEFAULT_SPEED: f64 = 1.0;
/// Default silence before a clip (seconds).
pub const DEFAULT_BUFFER_BEFORE: f64 = 0.2;
/// Default silence after a clip (seconds).
pub const DEFAULT_BUFFER_AFTER: f64 = 0.3;
/// Default scheduling priority.
pub const DEFAULT_PRIORITY: i32 = 1;
/// Priority at and above which a segment is crossfaded.
pub const CROSSFADE_PRIORITY: i32 = 2;

/// Word-level record from the transcriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Word {
    #[serde(default)]
    pub word: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,

    /// Fields this model does not interpret, kept so persisted words round-trip.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One unit of translated dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SegmentRecord")]
pub struct Segment {
    /// Original start in the source recording (seconds)
    pub start: f64,
    /// Original end in the source recording (seconds)
    pub end: f64,
    pub original_text: String,
    /// Empty until translation fills it
    pub translated_text: String,
    /// `end - start`, advisory only
    pub target_duration: f64,
    pub words: Option<Vec<Word>>,
    /// Rendered speech clip, once synthesized
    pub audio_file: Option<PathBuf>,
    pub adjusted_speed: f64,
    pub buffer_before: f64,
    pub buffer_after: f64,
    pub priority: i32,
    pub speaker: String,
}

/// Wire shape of a segment: only the original window is required.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct SegmentRecord {
    start: f64,
    end: f64,
    #[serde(default)]
    original_text: String,
    #[serde(default)]
    translated_text: String,
    #[serde(default)]
    target_duration: Option<f64>,
    #[serde(default)]
    words: Option<Vec<Word>>,
    #[serde(default)]
    audio_file: Option<PathBuf>,
    #[serde(default)]
    adjusted_speed: Option<f64>,
    #[serde(default)]
    buffer_before: Option<f64>,
    #[serde(default)]
    buffer_after: Option<f64>,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    speaker: Option<String>,
}

impl From<SegmentRecord> for Segment {
    fn from(record: SegmentRecord) -> Self {
        Self {
            start: record.start,
            end: record.end,
            original_text: record.original_text,
            translated_text: record.translated_text,
            target_duration: record
                .target_duration
                .unwrap_or(record.end - record.start),
            words: record.words,
            audio_file: record.audio_file,
            adjusted_speed: record.adjusted_speed.unwrap_or(DEFAULT_SPEED),
            buffer_before: record.buffer_before.unwrap_or(DEFAULT_BUFFER_BEFORE),
            buffer_after: record.buffer_after.unwrap_or(DEFAULT_BUFFER_AFTER),
            priority: record.priority.unwrap_or(DEFAULT_PRIORITY),
            speaker: record.speaker.unwrap_or_else(|| DEFAULT_SPEAKER.to_string()),
        }
    }
}

impl JsonSchema for Segment {
    fn schema_name() -> String {
        "Segment".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        SegmentRecord::json_schema(gen)
    }
}

impl Segment {
    /// Create a segment for an original window with default timing attributes.
    pub fn new(start: f64, end: f64, original_text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            original_text: original_text.into(),
            translated_text: String::new(),
            target_duration: end - start,
            words: None,
            audio_file: None,
            adjusted_speed: DEFAULT_SPEED,
            buffer_before: DEFAULT_BUFFER_BEFORE,
            buffer_after: DEFAULT_BUFFER_AFTER,
            priority: DEFAULT_PRIORITY,
            speaker: DEFAULT_SPEAKER.to_string(),
        }
    }

    /// Builder-style setter for the speaker label.
    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = speaker.into();
        self
    }

    /// Builder-style setter for the rendered clip.
    pub fn with_audio_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.audio_file = Some(path.into());
        self
    }

    /// Builder-style setter for the translated text.
    pub fn with_translation(mut self, text: impl Into<String>) -> Self {
        self.translated_text = text.into();
        self
    }

    /// Duration to assume when the rendered clip cannot be probed.
    ///
    /// Degenerate windows (`end <= start`) yield zero.
    pub fn duration_fallback(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Rendered clip path, if one was recorded.
    pub fn clip_path(&self) -> Option<&Path> {
        self.audio_file.as_deref()
    }

    /// Whether the rendered clip exists and can be opened for reading.
    pub fn is_renderable(&self) -> bool {
        self.clip_path().map(clip_is_readable).unwrap_or(false)
    }

    /// Whether this segment is marked for crossfade treatment.
    pub fn wants_crossfade(&self) -> bool {
        self.priority >= CROSSFADE_PRIORITY
    }

    /// Short text preview for log lines.
    pub fn preview(&self) -> String {
        self.original_text.chars().take(50).collect()
    }
}

/// Check that a clip path is a regular file we can open.
pub fn clip_is_readable(path: &Path) -> bool {
    File::open(path)
        .and_then(|f| f.metadata())
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Raw utterance as produced by the transcription stage.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct TranscriptSegment {
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub words: Vec<Word>,
}

impl TranscriptSegment {
    /// Resolve the speaker: segment label first, then the majority word label.
    fn resolve_speaker(&self) -> String {
        match self.speaker.as_deref() {
            Some(speaker) if !speaker.is_empty() && speaker != DEFAULT_SPEAKER => {
                speaker.to_string()
            }
            _ => majority_word_speaker(&self.words).unwrap_or_else(|| DEFAULT_SPEAKER.to_string()),
        }
    }
}

/// Most frequent word-level speaker; ties go to the one seen first.
fn majority_word_speaker(words: &[Word]) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for speaker in words.iter().filter_map(|w| w.speaker.as_deref()) {
        match counts.iter_mut().find(|(s, _)| *s == speaker) {
            Some((_, count)) => *count += 1,
            None => counts.push((speaker, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (speaker, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((speaker, count));
        }
    }
    best.map(|(s, _)| s.to_string())
}

/// Turn transcription output into segments, one per utterance.
pub fn normalize_transcript(raw: Vec<TranscriptSegment>) -> Vec<Segment> {
    raw.into_iter()
        .map(|seg| {
            let start = seg.start.unwrap_or(0.0);
            let end = seg.end.unwrap_or(start + 1.0);
            let speaker = seg.resolve_speaker();
            let words = if seg.words.is_empty() {
                None
            } else {
                Some(seg.words)
            };

            Segment {
                words,
                speaker,
                ..Segment::new(start, end, seg.text)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, speaker: Option<&str>) -> Word {
        Word {
            word: text.to_string(),
            speaker: speaker.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_minimal_record_gets_defaults() {
        let seg: Segment = serde_json::from_str(r#"{"start": 1.5, "end": 4.0}"#).unwrap();
        assert_eq!(seg.target_duration, 2.5);
        assert_eq!(seg.adjusted_speed, 1.0);
        assert_eq!(seg.buffer_before, 0.2);
        assert_eq!(seg.buffer_after, 0.3);
        assert_eq!(seg.priority, 1);
        assert_eq!(seg.speaker, DEFAULT_SPEAKER);
        assert!(seg.audio_file.is_none());
        assert!(seg.translated_text.is_empty());
    }

    #[test]
    fn test_persisted_sequence_round_trips() {
        let mut seg = Segment::new(0.1, 2.345_678_9, "Hello there")
            .with_speaker("SPEAKER_01")
            .with_translation("Hola")
            .with_audio_file("/tmp/chunk_000.mp3");
        seg.buffer_after = 0.45;
        seg.adjusted_speed = 1.2;
        seg.priority = 2;
        seg.words = Some(vec![Word {
            word: "Hello".to_string(),
            start: Some(0.1),
            end: Some(0.6),
            score: Some(0.98),
            speaker: Some("SPEAKER_01".to_string()),
            extra: BTreeMap::from([("probability".to_string(), serde_json::json!(0.5))]),
        }]);

        let json = serde_json::to_string_pretty(&vec![seg.clone()]).unwrap();
        let back: Vec<Segment> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![seg]);
        assert_eq!(serde_json::to_string_pretty(&back).unwrap(), json);
    }

    #[test]
    fn test_degenerate_window_fallback() {
        let seg = Segment::new(3.0, 3.0, "");
        assert_eq!(seg.duration_fallback(), 0.0);
        let seg = Segment::new(3.0, 2.0, "");
        assert_eq!(seg.duration_fallback(), 0.0);
    }

    #[test]
    fn test_renderable_requires_existing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let clip = dir.path().join("chunk_000.mp3");
        std::fs::write(&clip, b"ID3").unwrap();

        assert!(!Segment::new(0.0, 1.0, "a").is_renderable());
        assert!(!Segment::new(0.0, 1.0, "a")
            .with_audio_file(dir.path().join("missing.mp3"))
            .is_renderable());
        assert!(!Segment::new(0.0, 1.0, "a")
            .with_audio_file(dir.path())
            .is_renderable());
        assert!(Segment::new(0.0, 1.0, "a").with_audio_file(&clip).is_renderable());
    }

    #[test]
    fn test_normalize_prefers_segment_speaker() {
        let raw = vec![TranscriptSegment {
            start: Some(0.5),
            end: Some(3.2),
            text: "Hello".to_string(),
            speaker: Some("SPEAKER_02".to_string()),
            words: vec![word("Hello", Some("SPEAKER_00"))],
        }];
        let segments = normalize_transcript(raw);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].speaker, "SPEAKER_02");
        assert!((segments[0].target_duration - 2.7).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_uses_majority_word_speaker() {
        let raw = vec![TranscriptSegment {
            start: Some(1.0),
            end: None,
            text: "a b c".to_string(),
            speaker: None,
            words: vec![
                word("a", Some("SPEAKER_01")),
                word("b", Some("SPEAKER_00")),
                word("c", Some("SPEAKER_00")),
                word("d", None),
            ],
        }];
        let segments = normalize_transcript(raw);
        assert_eq!(segments[0].speaker, "SPEAKER_00");
        assert_eq!(segments[0].end, 2.0);
        assert_eq!(segments[0].original_text, "a b c");
    }

    #[test]
    fn test_majority_tie_goes_to_first_seen() {
        let words = vec![word("a", Some("B")), word("b", Some("A"))];
        assert_eq!(majority_word_speaker(&words).as_deref(), Some("B"));
        assert_eq!(majority_word_speaker(&[]), None);
    }

    #[test]
    fn test_normalize_without_any_speaker() {
        let segments = normalize_transcript(vec![TranscriptSegment::default()]);
        assert_eq!(segments[0].speaker, DEFAULT_SPEAKER);
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[0].end, 1.0);
        assert!(segments[0].words.is_none());
    }
}
