use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::spec::QuestionDef;

/// Flat submitted key/value map. A checkbox question submits several
/// values under one key, so every key holds a list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submission {
    values: BTreeMap<String, Vec<String>>,
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut submission = Self::new();
        for (key, value) in pairs {
            submission.append(key, value);
        }
        submission
    }

    /// Add one value under `key`, keeping any already present.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.entry(key.into()).or_default().push(value.into());
    }

    /// First submitted value for `key`, if the key was submitted at all.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Every submitted value for `key` (checkbox extraction).
    pub fn get_all(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Structured result of extracting a submission against a schema.
///
/// Each entry echoes the authored schema fields for the question plus a
/// `user_input` member; group entries hold an object keyed by stringified
/// instance index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerRecord {
    entries: Map<String, Value>,
}

impl AnswerRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(entries) => Some(Self { entries }),
            _ => None,
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: Map<String, Value>) {
        self.entries.insert(name.into(), Value::Object(entry));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn user_input(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).and_then(|entry| entry.get("user_input"))
    }

    pub fn set_user_input(&mut self, name: &str, value: Value) {
        if let Some(Value::Object(entry)) = self.entries.get_mut(name) {
            entry.insert("user_input".into(), value);
        }
    }

    /// Write one sub-question value inside a group instance, creating the
    /// instance object when needed.
    pub fn set_group_user_input(&mut self, group: &str, index: u32, sub_name: &str, value: Value) {
        let Some(Value::Object(entry)) = self.entries.get_mut(group) else {
            return;
        };
        let instances = entry
            .entry("user_input")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(instances) = instances {
            let instance = instances
                .entry(index.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(instance) = instance {
                instance.insert(sub_name.into(), value);
            }
        }
    }

    pub fn group_user_input(&self, group: &str, index: u32, sub_name: &str) -> Option<&Value> {
        self.user_input(group)?
            .get(index.to_string())?
            .get(sub_name)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.entries.clone())
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.entries).unwrap_or_else(|_| "{}".into())
    }
}

/// Per-name initial inputs recovered from a stored answer record, used to
/// pre-populate a re-render in the edit flow. Group entries become arrays
/// of per-instance objects in index order.
pub fn initial_inputs_from_record(record: &Value) -> BTreeMap<String, Value> {
    let mut inputs = BTreeMap::new();
    let Some(entries) = record.as_object() else {
        return inputs;
    };
    for (name, entry) in entries {
        let Some(user_input) = entry.get("user_input") else {
            continue;
        };
        let is_group = entry.get("type").and_then(Value::as_str) == Some("group");
        if is_group {
            if let Some(instances) = user_input.as_object() {
                // Instance keys sort numerically, not as strings.
                let mut indices: Vec<u32> =
                    instances.keys().filter_map(|key| key.parse().ok()).collect();
                indices.sort_unstable();
                let values: Vec<Value> = indices
                    .iter()
                    .filter_map(|index| instances.get(&index.to_string()).cloned())
                    .collect();
                inputs.insert(name.clone(), Value::Array(values));
            }
        } else {
            inputs.insert(name.clone(), user_input.clone());
        }
    }
    inputs
}

/// One structural or semantic problem found in an authored schema.
/// `validate()` collects every problem in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct SchemaError {
    /// Name of the offending question, when one can be attributed.
    pub question: Option<String>,
    pub code: String,
    pub message: String,
}

impl SchemaError {
    pub fn new(question: Option<&str>, code: &str, message: impl Into<String>) -> Self {
        Self {
            question: question.map(str::to_string),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Required questions were left unanswered. Carries the partially-built
/// record (with blanks filled in for the offenders) so the caller can
/// re-render the form with everything already entered preserved.
#[derive(Debug, Clone, Error)]
#[error("{} required question(s) left unanswered", questions.len())]
pub struct RequiredUnanswered {
    pub record: AnswerRecord,
    pub questions: Vec<QuestionDef>,
}
