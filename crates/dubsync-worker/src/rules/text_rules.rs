//! Text substitution on translated text.

use regex::{NoExpand, RegexBuilder};
use tracing::{debug, info, warn};

use dubsync_models::{Segment, TextRule};

use crate::metrics;

/// Apply the substitutions active for `language` to `text`.
///
/// Rules run in priority order (high, medium, low; stable within a class).
/// Rules with an empty `original` or `replacement` are skipped. Replacement
/// text is inserted literally.
pub fn apply_text_rules(text: &str, language: &str, rules: &[TextRule]) -> String {
    if rules.is_empty() {
        return text.to_string();
    }

    let mut ordered: Vec<&TextRule> = rules.iter().collect();
    ordered.sort_by_key(|rule| rule.priority.rank());

    let mut modified = text.to_string();
    let mut applied = Vec::new();

    for rule in ordered {
        if !rule.applies_to(language) || rule.original.is_empty() || rule.replacement.is_empty() {
            continue;
        }

        if rule.case_sensitive {
            if modified.contains(&rule.original) {
                modified = modified.replace(&rule.original, &rule.replacement);
                applied.push(rule.original.as_str());
            }
            continue;
        }

        let pattern = match RegexBuilder::new(&regex::escape(&rule.original))
            .case_insensitive(true)
            .build()
        {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!(original = %rule.original, "Skipping text rule: {}", e);
                continue;
            }
        };

        if pattern.is_match(&modified) {
            modified = pattern
                .replace_all(&modified, NoExpand(&rule.replacement))
                .into_owned();
            applied.push(rule.original.as_str());
        }
    }

    if !applied.is_empty() {
        metrics::record_rule_mutation("text", applied.len() as u64);
        debug!("Applied text rules: {}", applied.join(", "));
    }

    modified
}

/// Apply text rules to every non-empty translation and hand the sequence back.
pub fn apply_text_rules_to_segments(
    mut segments: Vec<Segment>,
    language: &str,
    rules: &[TextRule],
) -> Vec<Segment> {
    if rules.is_empty() {
        return segments;
    }

    let mut changed = 0usize;
    for segment in segments.iter_mut() {
        if segment.translated_text.is_empty() {
            continue;
        }
        let rewritten = apply_text_rules(&segment.translated_text, language, rules);
        if rewritten != segment.translated_text {
            segment.translated_text = rewritten;
            changed += 1;
        }
    }

    info!(
        rules = rules.len(),
        language,
        changed,
        "Text rules applied"
    );

    segments
}
