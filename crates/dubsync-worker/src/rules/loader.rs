//! Rules document loading.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};

use dubsync_models::{AudioSettings, DubbingRules};

/// Load the rules document at `path`.
///
/// A missing file, an unreadable file or malformed JSON all yield the default
/// (empty) rules; loading never fails. Within a well-formed document each rule
/// and each audio setting is taken on its own, so one bad entry is skipped
/// with a warning instead of discarding the rest.
pub fn load_dubbing_rules(path: impl AsRef<Path>) -> DubbingRules {
    let path = path.as_ref();

    if !path.exists() {
        info!(path = %path.display(), "No rules file found, using defaults");
        return DubbingRules::default();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), "Error reading rules file, using defaults: {}", e);
            return DubbingRules::default();
        }
    };

    let mut document = match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(document)) => document,
        Ok(_) => {
            warn!(path = %path.display(), "Rules file is not a JSON object, using defaults");
            return DubbingRules::default();
        }
        Err(e) => {
            warn!(path = %path.display(), "Error parsing rules file, using defaults: {}", e);
            return DubbingRules::default();
        }
    };

    let rules = DubbingRules {
        text_rules: parse_rule_list(document.remove("textRules"), "textRules"),
        segment_rules: parse_rule_list(document.remove("segmentRules"), "segmentRules"),
        audio_settings: parse_audio_settings(document.remove("audioSettings")),
    };

    info!(
        path = %path.display(),
        text_rules = rules.text_rules.len(),
        segment_rules = rules.segment_rules.len(),
        "Loaded dubbing rules"
    );
    rules
}

fn parse_rule_list<T: DeserializeOwned>(value: Option<Value>, key: &str) -> Vec<T> {
    let items = match value {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            warn!(key, "Rule list is not an array, ignoring it");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!(key, index, "Skipping invalid rule: {}", e);
                None
            }
        })
        .collect()
}

fn parse_audio_settings(value: Option<Value>) -> AudioSettings {
    let fields = match value {
        None | Some(Value::Null) => return AudioSettings::default(),
        Some(Value::Object(fields)) => fields,
        Some(_) => {
            warn!("audioSettings is not an object, using defaults");
            return AudioSettings::default();
        }
    };

    if let Ok(settings) = serde_json::from_value(Value::Object(fields.clone())) {
        return settings;
    }

    // Keep every key that parses on its own
    let mut accepted = Map::new();
    for (key, field) in fields {
        let single = Value::Object(Map::from_iter([(key.clone(), field.clone())]));
        match serde_json::from_value::<AudioSettings>(single) {
            Ok(_) => {
                accepted.insert(key, field);
            }
            Err(e) => warn!(key = %key, "Ignoring invalid audio setting: {}", e),
        }
    }
    serde_json::from_value(Value::Object(accepted)).unwrap_or_default()
}
