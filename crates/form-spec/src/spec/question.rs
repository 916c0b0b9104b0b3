use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed set of question kinds. Wire names follow the authored schema
/// format (`textbox`/`textarea` for the free-text kinds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Number,
    Float,
    #[serde(rename = "textbox")]
    Text,
    #[serde(rename = "textarea")]
    TextArea,
    Radio,
    Checkbox,
    Dropdown,
    Group,
    Formula,
}

impl QuestionKind {
    pub fn wire_name(&self) -> &'static str {
        match self {
            QuestionKind::Number => "number",
            QuestionKind::Float => "float",
            QuestionKind::Text => "textbox",
            QuestionKind::TextArea => "textarea",
            QuestionKind::Radio => "radio",
            QuestionKind::Checkbox => "checkbox",
            QuestionKind::Dropdown => "dropdown",
            QuestionKind::Group => "group",
            QuestionKind::Formula => "formula",
        }
    }

    pub fn has_choices(&self) -> bool {
        matches!(
            self,
            QuestionKind::Radio | QuestionKind::Checkbox | QuestionKind::Dropdown
        )
    }

    /// Kinds whose extracted value can feed a formula or a counter.
    pub fn is_numeric(&self) -> bool {
        matches!(self, QuestionKind::Number | QuestionKind::Float)
    }
}

/// One question definition within a dynamic form schema.
///
/// Optional fields mirror the authored JSON one-to-one and stay `None` when
/// absent, so serializing a definition back out reproduces the authored
/// object (extraction echoes these fields into the answer record).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(
        rename = "max-width",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub max_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxlength: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumable: Option<String>,
    /// Absent means required; the schema may opt a question out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_add_button_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<QuestionDef>,
    /// Authored fields this engine does not interpret, preserved for the
    /// answer-record echo.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QuestionDef {
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(true)
    }

    /// Submitted-field key for this question (instance 0). Instances >= 1
    /// append `_<index>`.
    pub fn form_key(&self) -> String {
        form_key(&self.name)
    }

    pub fn indexed_form_key(&self, index: u32) -> String {
        let base = self.form_key();
        if index == 0 {
            base
        } else {
            format!("{base}_{index}")
        }
    }

    pub fn float_precision(&self) -> u32 {
        self.precision.unwrap_or(2)
    }

    pub fn add_button_label(&self) -> &str {
        self.group_add_button_name.as_deref().unwrap_or("Add")
    }

    /// Pull this question's raw value out of a submission, `None` when the
    /// field is absent or blank. Checkbox gathers every checked value;
    /// Group and Formula have no direct extraction (the repetition layer
    /// and the formula engine produce those values).
    pub fn extract_raw(
        &self,
        submission: &crate::answers::Submission,
        index: u32,
    ) -> Option<Value> {
        match self.kind {
            QuestionKind::Group | QuestionKind::Formula => None,
            QuestionKind::Checkbox => {
                let checked: Vec<Value> = submission
                    .get_all(&self.indexed_form_key(index))
                    .iter()
                    .filter(|value| !value.is_empty())
                    .map(|value| Value::String(value.clone()))
                    .collect();
                if checked.is_empty() {
                    None
                } else {
                    Some(Value::Array(checked))
                }
            }
            _ => submission
                .get(&self.indexed_form_key(index))
                .filter(|value| !value.trim().is_empty())
                .map(|value| Value::String(value.to_string())),
        }
    }

    /// The authored object, for echoing into the answer record.
    pub fn echo(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Derive a form key from a question name: lowercased, alphanumerics kept,
/// runs of anything else collapsed to a single underscore. `"Pair of
/// trays"` becomes `pair_of_trays`.
pub fn form_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_separator = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    out
}
