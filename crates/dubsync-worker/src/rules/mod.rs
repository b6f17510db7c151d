//! Rule engine: segment timing rules, text substitutions and the rules file.

mod loader;
mod segment_rules;
mod text_rules;

pub use loader::load_dubbing_rules;
pub use segment_rules::{apply_action, apply_segment_rules, segment_matches};
pub use text_rules::{apply_text_rules, apply_text_rules_to_segments};
