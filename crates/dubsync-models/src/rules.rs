//! Rule records from the dubbing rules document.
//!
//! The document is produced by an external editor and has the shape
//! `{ "textRules": [...], "segmentRules": [...], "audioSettings": {...} }`.
//! Every key is optional.

use schemars::JsonSchema;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::settings::AudioSettings;

/// Predicate a segment rule evaluates against a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    /// Original text contains the value
    TextContains,
    /// Original text starts with the value
    TextStarts,
    /// Original text ends with the value
    TextEnds,
    /// Target duration is below the value (seconds)
    DurationLess,
    /// Target duration is above the value (seconds)
    DurationMore,
    /// Word count is at most the value
    WordCount,
    /// Unknown method name; never matches
    #[default]
    #[serde(other)]
    Unsupported,
}

/// Mutation a segment rule applies to a matching segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    /// Add milliseconds to the trailing pause
    ExtendPause,
    /// Remove milliseconds from the trailing pause, floored at zero
    ReducePause,
    /// Overwrite the synthesis speed factor
    AdjustSpeed,
    /// Mark the segment for crossfade treatment
    Crossfade,
    /// Unknown action name; never mutates
    #[default]
    #[serde(other)]
    Unsupported,
}

/// Timing/priority rule applied per segment before scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct SegmentRule {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub detection_method: DetectionMethod,

    /// Raw predicate value, parsed at evaluation time
    #[serde(default, deserialize_with = "string_or_number")]
    pub detection_value: String,

    #[serde(default)]
    pub action_type: ActionType,

    /// Raw action value such as `"150ms"` or `"1.2x"`
    #[serde(default, deserialize_with = "string_or_number")]
    pub action_value: String,
}

impl SegmentRule {
    /// Create a rule from its parts.
    pub fn new(
        name: impl Into<String>,
        detection_method: DetectionMethod,
        detection_value: impl Into<String>,
        action_type: ActionType,
        action_value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            detection_method,
            detection_value: detection_value.into(),
            action_type,
            action_value: action_value.into(),
        }
    }
}

/// Ordering class for text rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum RulePriority {
    High,
    Low,
    /// Also used for missing or unknown priority names
    #[default]
    #[serde(other)]
    Medium,
}

impl RulePriority {
    /// Sort rank: high rules run first.
    pub fn rank(self) -> u8 {
        match self {
            RulePriority::High => 0,
            RulePriority::Medium => 1,
            RulePriority::Low => 2,
        }
    }
}

/// Editors write numeric rule values both as `"3"` and as `3`.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

/// Priority names are matched exactly; anything else ranks as medium.
fn lenient_priority<'de, D>(deserializer: D) -> Result<RulePriority, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(name) => match name.as_str() {
            "high" => RulePriority::High,
            "low" => RulePriority::Low,
            _ => RulePriority::Medium,
        },
        _ => RulePriority::Medium,
    })
}

/// Language selector that matches every target language.
pub const ALL_LANGUAGES: &str = "all";

fn default_language() -> String {
    ALL_LANGUAGES.to_string()
}

/// Substitution applied to translated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TextRule {
    #[serde(default)]
    pub original: String,

    #[serde(default)]
    pub replacement: String,

    /// Target language code, or `"all"`
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub case_sensitive: bool,

    #[serde(default, deserialize_with = "lenient_priority")]
    pub priority: RulePriority,
}

impl TextRule {
    /// Create a case-insensitive rule for every language at medium priority.
    pub fn new(original: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            replacement: replacement.into(),
            language: default_language(),
            case_sensitive: false,
            priority: RulePriority::Medium,
        }
    }

    /// Builder-style setter for priority.
    pub fn with_priority(mut self, priority: RulePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder-style setter for the language selector.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Builder-style setter for case sensitivity.
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Whether this rule is active for the given target language.
    pub fn applies_to(&self, language: &str) -> bool {
        self.language == ALL_LANGUAGES || self.language == language
    }
}

/// The full rules document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct DubbingRules {
    #[serde(default)]
    pub text_rules: Vec<TextRule>,

    #[serde(default)]
    pub segment_rules: Vec<SegmentRule>,

    #[serde(default)]
    pub audio_settings: AudioSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_rule_wire_names() {
        let rule: SegmentRule = serde_json::from_str(
            r#"{"name":"pause","detectionMethod":"text-ends","detectionValue":"?",
                "actionType":"extend-pause","actionValue":"150ms"}"#,
        )
        .unwrap();
        assert_eq!(rule.detection_method, DetectionMethod::TextEnds);
        assert_eq!(rule.action_type, ActionType::ExtendPause);
        assert_eq!(rule.action_value, "150ms");
    }

    #[test]
    fn test_unknown_vocabulary_maps_to_unsupported() {
        let rule: SegmentRule = serde_json::from_str(
            r#"{"detectionMethod":"regex","actionType":"explode"}"#,
        )
        .unwrap();
        assert_eq!(rule.detection_method, DetectionMethod::Unsupported);
        assert_eq!(rule.action_type, ActionType::Unsupported);
        assert!(rule.name.is_empty());
    }

    #[test]
    fn test_text_rule_defaults() {
        let rule: TextRule =
            serde_json::from_str(r#"{"original":"AI","replacement":"ei ai"}"#).unwrap();
        assert_eq!(rule.language, "all");
        assert!(!rule.case_sensitive);
        assert_eq!(rule.priority, RulePriority::Medium);
        assert!(rule.applies_to("es"));

        let rule: TextRule =
            serde_json::from_str(r#"{"original":"a","replacement":"b","priority":"urgent"}"#)
                .unwrap();
        assert_eq!(rule.priority, RulePriority::Medium);
    }

    #[test]
    fn test_numeric_values_are_accepted() {
        let rule: SegmentRule = serde_json::from_str(
            r#"{"name":"short","detectionMethod":"word-count","detectionValue":3,
                "actionType":"adjust-speed","actionValue":1.25}"#,
        )
        .unwrap();
        assert_eq!(rule.detection_value, "3");
        assert_eq!(rule.action_value, "1.25");

        let rule: SegmentRule =
            serde_json::from_str(r#"{"detectionValue":null,"actionValue":"150ms"}"#).unwrap();
        assert!(rule.detection_value.is_empty());

        assert!(serde_json::from_str::<SegmentRule>(r#"{"detectionValue":["?"]}"#).is_err());
    }

    #[test]
    fn test_non_string_priority_is_medium() {
        let rule: TextRule =
            serde_json::from_str(r#"{"original":"a","replacement":"b","priority":1}"#).unwrap();
        assert_eq!(rule.priority, RulePriority::Medium);

        let rule: TextRule =
            serde_json::from_str(r#"{"original":"a","replacement":"b","priority":"low"}"#)
                .unwrap();
        assert_eq!(rule.priority, RulePriority::Low);
    }

    #[test]
    fn test_priority_rank_order() {
        assert!(RulePriority::High.rank() < RulePriority::Medium.rank());
        assert!(RulePriority::Medium.rank() < RulePriority::Low.rank());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let rules: DubbingRules = serde_json::from_str("{}").unwrap();
        assert!(rules.text_rules.is_empty());
        assert!(rules.segment_rules.is_empty());
        assert_eq!(rules.audio_settings, AudioSettings::default());
    }

    #[test]
    fn test_language_filter() {
        let rule = TextRule::new("x", "y").with_language("fr");
        assert!(rule.applies_to("fr"));
        assert!(!rule.applies_to("es"));
    }
}
