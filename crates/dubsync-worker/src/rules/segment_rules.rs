//! Timing/priority rules evaluated per segment.

use tracing::{debug, info};

use dubsync_models::segment::CROSSFADE_PRIORITY;
use dubsync_models::{ActionType, DetectionMethod, Segment, SegmentRule};

use crate::metrics;

/// Apply `rules` to every segment, in list order, and hand the sequence back.
///
/// A segment may match several rules; each matching rule is applied in turn.
/// Malformed thresholds or action values make a rule a no-op.
pub fn apply_segment_rules(mut segments: Vec<Segment>, rules: &[SegmentRule]) -> Vec<Segment> {
    if rules.is_empty() {
        return segments;
    }

    let mut mutations = 0usize;
    for segment in segments.iter_mut() {
        for rule in rules {
            if !segment_matches(segment, rule) {
                continue;
            }
            if apply_action(segment, rule) {
                mutations += 1;
                metrics::record_rule_mutation("segment", 1);
                debug!(
                    rule = %rule.name,
                    "Applied rule '{}' to segment: {}...",
                    rule.name,
                    segment.preview()
                );
            }
        }
    }

    info!(
        rules = rules.len(),
        segments = segments.len(),
        mutations,
        "Segment rules applied"
    );

    segments
}

/// Evaluate a rule's detection predicate against a segment.
pub fn segment_matches(segment: &Segment, rule: &SegmentRule) -> bool {
    let value = rule.detection_value.as_str();
    let text = segment.original_text.to_lowercase();

    match rule.detection_method {
        DetectionMethod::TextContains => text.contains(&value.to_lowercase()),
        DetectionMethod::TextStarts => text.starts_with(&value.to_lowercase()),
        DetectionMethod::TextEnds => text.ends_with(&value.to_lowercase()),
        DetectionMethod::DurationLess => {
            parse_float(value).is_some_and(|threshold| segment.target_duration < threshold)
        }
        DetectionMethod::DurationMore => {
            parse_float(value).is_some_and(|threshold| segment.target_duration > threshold)
        }
        DetectionMethod::WordCount => value.trim().parse::<i64>().is_ok_and(|threshold| {
            (segment.original_text.split_whitespace().count() as i64) <= threshold
        }),
        DetectionMethod::Unsupported => false,
    }
}

/// Apply a rule's action; returns whether the segment was touched.
pub fn apply_action(segment: &mut Segment, rule: &SegmentRule) -> bool {
    let value = rule.action_value.as_str();

    match rule.action_type {
        ActionType::ExtendPause => match parse_with_suffix(value, "ms") {
            Some(ms) => {
                segment.buffer_after += ms / 1000.0;
                true
            }
            None => false,
        },
        ActionType::ReducePause => match parse_with_suffix(value, "ms") {
            Some(ms) => {
                segment.buffer_after = (segment.buffer_after - ms / 1000.0).max(0.0);
                true
            }
            None => false,
        },
        ActionType::AdjustSpeed => match parse_with_suffix(value, "x") {
            Some(factor) => {
                segment.adjusted_speed = factor;
                true
            }
            None => false,
        },
        ActionType::Crossfade => {
            segment.priority = CROSSFADE_PRIORITY;
            true
        }
        ActionType::Unsupported => false,
    }
}

/// Parse a finite float, tolerating surrounding whitespace.
fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a finite float that may carry a unit suffix (`"150ms"`, `"1.2x"`).
fn parse_with_suffix(raw: &str, suffix: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix(suffix).unwrap_or(trimmed);
    parse_float(number)
}
