//! Widget descriptions for an external renderer.
//!
//! The engine never produces markup; it produces label, widget, and
//! constraint data that a renderer turns into HTML or any other surface.
//! Only instance 0 of a group is rendered eagerly - later instances are
//! fetched on demand through [`render_group_instance`], keeping the
//! initial payload small.

use serde::Serialize;
use serde_json::Value;

use crate::spec::{QuestionDef, QuestionKind, form_key};

/// Input widget an external renderer should produce for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    NumberInput,
    FloatInput,
    TextInput,
    TextArea,
    RadioList,
    CheckboxList,
    Dropdown,
    /// Formula values are always computed; the widget is a read-only
    /// placeholder the renderer may hide entirely.
    Hidden,
    Group,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChoiceOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// Label, widget, and constraint data for one rendered question.
#[derive(Debug, Clone, Serialize)]
pub struct RenderQuestion {
    pub name: String,
    /// Submitted-field key, already carrying the `_<index>` suffix for
    /// group instances past the first.
    pub form_key: String,
    pub kind: QuestionKind,
    pub widget: WidgetKind,
    pub title: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxlength: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<ChoiceOption>>,
    /// Group repetition metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_button: Option<String>,
    /// Rendered group instances (instance 0, plus one per initial-data
    /// instance in the edit flow). Each entry is `(index, sub-questions)`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<(u32, Vec<RenderQuestion>)>,
}

/// Everything an external renderer needs for one form.
#[derive(Debug, Clone, Serialize)]
pub struct RenderPayload {
    pub questions: Vec<RenderQuestion>,
}

/// Build the render payload for instance 0 of every question, in schema
/// order. `initial` holds per-name previously-submitted inputs, which win
/// over schema defaults.
pub fn build_render_payload(
    questions: &[QuestionDef],
    initial: &std::collections::BTreeMap<String, Value>,
) -> RenderPayload {
    RenderPayload {
        questions: questions
            .iter()
            .map(|question| render_question(question, initial.get(&question.name), 0))
            .collect(),
    }
}

/// Render one instance of a group's sub-schema for the external
/// "add another instance" endpoint. `group_name` may be the declared name
/// or its form key. Returns `None` when no such group exists.
pub fn render_group_instance(
    questions: &[QuestionDef],
    group_name: &str,
    index: u32,
    initial: Option<&Value>,
) -> Option<Vec<RenderQuestion>> {
    let group = questions.iter().find(|question| {
        question.kind == QuestionKind::Group
            && (question.name == group_name || question.form_key() == form_key(group_name))
    })?;
    Some(render_instance(group, index, initial))
}

fn render_instance(group: &QuestionDef, index: u32, initial: Option<&Value>) -> Vec<RenderQuestion> {
    group
        .questions
        .iter()
        .map(|sub| {
            let sub_initial = initial.and_then(|data| data.get(&sub.name));
            render_question(sub, sub_initial, index)
        })
        .collect()
}

fn render_question(question: &QuestionDef, initial: Option<&Value>, index: u32) -> RenderQuestion {
    // Initial data always has precedence over the schema default.
    let default = initial
        .filter(|value| !value.is_null())
        .or(question.default_value.as_ref())
        .cloned();

    let widget = widget_kind(question.kind);
    let pattern = match question.kind {
        // At most `precision` fractional digits.
        QuestionKind::Float => Some(format!(
            r"^\s*\d*(\.\d{{1,{}}})?\s*$",
            question.float_precision()
        )),
        _ => question.pattern.clone(),
    };

    let choices = question.choices.as_ref().map(|choices| {
        choices
            .iter()
            .enumerate()
            .map(|(i, choice)| ChoiceOption {
                value: choice.clone(),
                label: question
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(i))
                    .unwrap_or(choice)
                    .clone(),
                selected: is_selected(default.as_ref(), choice),
            })
            .collect()
    });

    let instances = if question.kind == QuestionKind::Group {
        group_instances(question, initial)
    } else {
        Vec::new()
    };

    RenderQuestion {
        name: question.name.clone(),
        form_key: question.indexed_form_key(index),
        kind: question.kind,
        widget,
        title: question.title.clone(),
        required: question.is_required(),
        help: question.help.clone(),
        default: if question.kind == QuestionKind::Group {
            None
        } else {
            default
        },
        placeholder: question.placeholder.clone(),
        prefix: question.prefix.clone(),
        suffix: question.suffix.clone(),
        pattern,
        min: question.min,
        max: question.max,
        step: question.step,
        maxlength: question.maxlength,
        rows: question.rows,
        max_width: question.max_width,
        choices,
        max_number: question.max_number,
        add_button: if question.kind == QuestionKind::Group {
            Some(question.add_button_label().to_string())
        } else {
            None
        },
        instances,
    }
}

/// Instance 0 is always rendered; the edit flow renders one instance per
/// entry of the stored initial data instead.
fn group_instances(group: &QuestionDef, initial: Option<&Value>) -> Vec<(u32, Vec<RenderQuestion>)> {
    match initial.and_then(Value::as_array) {
        Some(entries) if !entries.is_empty() => entries
            .iter()
            .enumerate()
            .map(|(i, data)| (i as u32, render_instance(group, i as u32, Some(data))))
            .collect(),
        _ => vec![(0, render_instance(group, 0, None))],
    }
}

fn widget_kind(kind: QuestionKind) -> WidgetKind {
    match kind {
        QuestionKind::Number => WidgetKind::NumberInput,
        QuestionKind::Float => WidgetKind::FloatInput,
        QuestionKind::Text => WidgetKind::TextInput,
        QuestionKind::TextArea => WidgetKind::TextArea,
        QuestionKind::Radio => WidgetKind::RadioList,
        QuestionKind::Checkbox => WidgetKind::CheckboxList,
        QuestionKind::Dropdown => WidgetKind::Dropdown,
        QuestionKind::Formula => WidgetKind::Hidden,
        QuestionKind::Group => WidgetKind::Group,
    }
}

fn is_selected(default: Option<&Value>, choice: &str) -> bool {
    match default {
        Some(Value::String(value)) => value == choice,
        Some(Value::Array(values)) => values
            .iter()
            .any(|value| value.as_str() == Some(choice)),
        _ => false,
    }
}

/// Structured JSON view of the payload for transports that want plain
/// values rather than typed structs.
pub fn render_json_ui(payload: &RenderPayload) -> Value {
    serde_json::to_value(payload).unwrap_or(Value::Null)
}

/// Human-friendly text rendering, used by the CLI preview.
pub fn render_text(payload: &RenderPayload) -> String {
    let mut lines = Vec::new();
    for question in &payload.questions {
        push_question_text(question, 0, &mut lines);
    }
    lines.join("\n")
}

fn push_question_text(question: &RenderQuestion, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    let mut entry = format!("{indent}- {} ({})", question.title, question.form_key);
    if question.required && question.widget != WidgetKind::Group {
        entry.push_str(" [required]");
    }
    if let Some(choices) = &question.choices {
        let labels: Vec<&str> = choices.iter().map(|choice| choice.label.as_str()).collect();
        entry.push_str(&format!(" (choices: {})", labels.join("|")));
    }
    if let Some(default) = &question.default {
        entry.push_str(&format!(" = {default}"));
    }
    lines.push(entry);
    for (index, instance) in &question.instances {
        lines.push(format!("{indent}  instance {index}:"));
        for sub in instance {
            push_question_text(sub, depth + 2, lines);
        }
    }
}
