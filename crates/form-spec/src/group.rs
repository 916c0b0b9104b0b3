//! Repetition bookkeeping for group questions.
//!
//! A group's sub-schema is answered 0..`max_number` times. Instance 0
//! submits unsuffixed field keys; instances >= 1 append `_<index>`. Gaps
//! left by removed instances are preserved, never compacted.

use std::collections::BTreeSet;

use regex::Regex;
use serde_json::{Map, Value};

use crate::answers::Submission;
use crate::spec::QuestionDef;

/// Matches a sub-question's base key and every `_<index>` variant.
pub fn indexed_key_pattern(form_key: &str) -> Option<Regex> {
    Regex::new(&format!("^{}(_([0-9]+))?$", regex::escape(form_key))).ok()
}

/// Instance indices present in the submission for `group`. An index
/// counts as submitted even when its value is empty.
pub fn submitted_indices(group: &QuestionDef, submission: &Submission) -> BTreeSet<u32> {
    let mut indices = BTreeSet::new();
    let patterns: Vec<Regex> = group
        .questions
        .iter()
        .filter_map(|sub| indexed_key_pattern(&sub.form_key()))
        .collect();
    for key in submission.keys() {
        for pattern in &patterns {
            if let Some(captures) = pattern.captures(key) {
                let index = captures
                    .get(2)
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                    .unwrap_or(0);
                indices.insert(index);
            }
        }
    }
    indices
}

/// Extract every submitted instance of `group` into `index ->
/// {sub-question name -> raw value}` maps. Each instance is a complete
/// record across all sub-questions; unanswered ones (and sub-formulas,
/// which are resolved later) appear as null.
pub fn extract_instances(
    group: &QuestionDef,
    submission: &Submission,
) -> Vec<(u32, Map<String, Value>)> {
    submitted_indices(group, submission)
        .into_iter()
        .map(|index| {
            let mut instance = Map::new();
            for sub in &group.questions {
                let value = sub.extract_raw(submission, index).unwrap_or(Value::Null);
                instance.insert(sub.name.clone(), value);
            }
            (index, instance)
        })
        .collect()
}

/// Instance indices recorded in an already-extracted group `user_input`
/// object, in numeric order (string keys would sort `"10"` before `"2"`).
pub fn recorded_indices(user_input: &Value) -> Vec<u32> {
    let mut indices: Vec<u32> = user_input
        .as_object()
        .map(|instances| {
            instances
                .keys()
                .filter_map(|key| key.parse::<u32>().ok())
                .collect()
        })
        .unwrap_or_default();
    indices.sort_unstable();
    indices
}
