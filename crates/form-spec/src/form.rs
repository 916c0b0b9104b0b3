//! The dynamic form facade: parse a schema, validate it, render it,
//! extract a submission, and compute post-processing deltas.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::answers::{
    AnswerRecord, RequiredUnanswered, SchemaError, Submission, initial_inputs_from_record,
};
use crate::formula::{self, QuestionIndex};
use crate::group;
use crate::render::{RenderPayload, RenderQuestion, build_render_payload, render_group_instance};
use crate::spec::{QuestionDef, QuestionKind};
use crate::validate::{ValidationContext, validate};

/// Externally-owned inventory mutation. The engine computes one total per
/// consumable-linked question and issues a single withdrawal; invoking
/// this at most once per submission is the caller's responsibility.
pub trait ConsumableSink {
    fn withdraw(&mut self, consumable: &str, quantity: i64);
}

/// A schema plus optional initial answers (the edit flow feeds a stored
/// answer record back in to pre-populate the next render).
#[derive(Debug, Clone, Default)]
pub struct DynamicForm {
    questions: Vec<QuestionDef>,
    parse_errors: Vec<SchemaError>,
    initial: BTreeMap<String, Value>,
}

impl DynamicForm {
    /// Parse a schema from its authored JSON text. JSON syntax errors fail
    /// construction; per-question problems (unknown kind, missing
    /// required members) are kept for [`DynamicForm::validate`] to report
    /// all at once. An empty or blank schema text is an empty form.
    pub fn new(schema_json: &str, initial_record: Option<&Value>) -> Result<Self, SchemaError> {
        let mut form = Self::default();
        if let Some(record) = initial_record {
            form.initial = initial_inputs_from_record(record);
        }
        if schema_json.trim().is_empty() {
            return Ok(form);
        }

        let parsed: Value = serde_json::from_str(schema_json).map_err(|err| {
            SchemaError::new(None, "invalid_json", format!("schema is not valid JSON: {err}"))
        })?;
        let Value::Array(items) = parsed else {
            return Err(SchemaError::new(
                None,
                "invalid_schema",
                "schema must be a JSON array of question objects",
            ));
        };

        for item in items {
            let name = item
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string);
            match serde_json::from_value::<QuestionDef>(item) {
                Ok(question) => form.questions.push(question),
                Err(err) => form.parse_errors.push(SchemaError::new(
                    name.as_deref(),
                    "invalid_question",
                    format!("invalid question definition: {err}"),
                )),
            }
        }
        Ok(form)
    }

    pub fn from_questions(questions: Vec<QuestionDef>) -> Self {
        Self {
            questions,
            ..Self::default()
        }
    }

    pub fn questions(&self) -> &[QuestionDef] {
        &self.questions
    }

    /// Collect every structural and semantic problem in one pass, never
    /// just the first. An empty result gates schema save.
    pub fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<SchemaError> {
        let mut errors = self.parse_errors.clone();
        errors.extend(validate(&self.questions, ctx));
        errors
    }

    /// Widget payload for instance 0 of every question, in schema order.
    pub fn render(&self) -> RenderPayload {
        build_render_payload(&self.questions, &self.initial)
    }

    /// On-demand payload for one further instance of a group's sub-schema
    /// (the "add another" endpoint).
    pub fn render_group_instance(&self, group_name: &str, index: u32) -> Option<Vec<RenderQuestion>> {
        render_group_instance(&self.questions, group_name, index, None)
    }

    /// Extract a submission into an answer record and resolve every
    /// formula. Missing optional input never errors; missing required
    /// input returns [`RequiredUnanswered`] carrying the blank-filled
    /// record plus the offending questions so the caller can re-render.
    pub fn extract(&self, submission: &Submission) -> Result<AnswerRecord, RequiredUnanswered> {
        let mut record = AnswerRecord::new();

        for question in &self.questions {
            let mut entry = question.echo();
            match question.kind {
                QuestionKind::Group => {
                    let mut instances = Map::new();
                    for (index, instance) in group::extract_instances(question, submission) {
                        instances.insert(index.to_string(), Value::Object(instance));
                    }
                    entry.insert("user_input".into(), Value::Object(instances));
                }
                // Resolved below, like any other formula output.
                QuestionKind::Formula => {}
                _ => {
                    if let Some(value) = question.extract_raw(submission, 0) {
                        entry.insert("user_input".into(), value);
                    }
                }
            }
            record.insert(question.name.clone(), entry);
        }

        let index = QuestionIndex::build(&self.questions);
        formula::resolve_into_record(&index, &mut record);

        let unanswered = self.fill_unanswered_required(&mut record);
        if unanswered.is_empty() {
            Ok(record)
        } else {
            Err(RequiredUnanswered {
                record,
                questions: unanswered,
            })
        }
    }

    /// Blank-fill required questions that extraction left unanswered and
    /// return them. Formula questions are exempt: their value is computed,
    /// not entered.
    fn fill_unanswered_required(&self, record: &mut AnswerRecord) -> Vec<QuestionDef> {
        let mut unanswered = Vec::new();
        for question in &self.questions {
            match question.kind {
                QuestionKind::Formula => {}
                QuestionKind::Group => {
                    for sub in &question.questions {
                        if sub.kind == QuestionKind::Formula || !sub.is_required() {
                            continue;
                        }
                        let answered = record
                            .group_user_input(&question.name, 0, &sub.name)
                            .is_some_and(is_answered);
                        if !answered {
                            record.set_group_user_input(
                                &question.name,
                                0,
                                &sub.name,
                                Value::String(String::new()),
                            );
                            unanswered.push(sub.clone());
                        }
                    }
                }
                _ => {
                    if !question.is_required() {
                        continue;
                    }
                    let answered = record
                        .user_input(&question.name)
                        .is_some_and(is_answered);
                    if !answered {
                        record.set_user_input(&question.name, Value::String(String::new()));
                        unanswered.push(question.clone());
                    }
                }
            }
        }
        unanswered
    }

    /// Issue one withdrawal per consumable-linked Number or Formula
    /// question, summing group instances into a single quantity.
    pub fn withdraw_consumables(&self, record: &AnswerRecord, sink: &mut dyn ConsumableSink) {
        for question in &self.questions {
            let entry = record.user_input(&question.name);
            maybe_withdraw(question, entry, sink);
            if question.kind == QuestionKind::Group {
                for sub in &question.questions {
                    // Sub-questions read through the group's instance map.
                    maybe_withdraw(sub, entry, sink);
                }
            }
        }
    }

    /// Total numeric contribution of the named Number/Float question,
    /// direct or aggregated across group instances. The caller adds the
    /// delta to its running counter.
    pub fn counter_delta(&self, record: &AnswerRecord, counter_question: &str) -> f64 {
        let mut total = 0.0;
        for question in &self.questions {
            let entry = record.user_input(&question.name);
            total += counter_contribution(question, entry, counter_question);
            if question.kind == QuestionKind::Group {
                for sub in &question.questions {
                    total += counter_contribution(sub, entry, counter_question);
                }
            }
        }
        total
    }
}

fn is_answered(user_input: &Value) -> bool {
    match user_input {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        // Checkbox: satisfied when at least one box is checked.
        Value::Array(values) => !values.is_empty(),
        _ => true,
    }
}

fn maybe_withdraw(question: &QuestionDef, entry: Option<&Value>, sink: &mut dyn ConsumableSink) {
    if !matches!(question.kind, QuestionKind::Number | QuestionKind::Formula) {
        return;
    }
    let Some(consumable) = question.consumable.as_deref() else {
        return;
    };
    let quantity = match entry {
        Some(Value::Object(instances)) => instances
            .values()
            .filter_map(|instance| instance.get(&question.name))
            .filter_map(as_i64)
            .sum(),
        Some(value) => as_i64(value).unwrap_or(0),
        None => 0,
    };
    if quantity > 0 {
        sink.withdraw(consumable, quantity);
    }
}

fn counter_contribution(question: &QuestionDef, entry: Option<&Value>, counter_question: &str) -> f64 {
    if question.name != counter_question || !question.kind.is_numeric() {
        return 0.0;
    }
    match entry {
        Some(Value::Object(instances)) => instances
            .values()
            .filter_map(|instance| instance.get(&question.name))
            .filter_map(as_f64)
            .sum(),
        Some(value) => as_f64(value).unwrap_or(0.0),
        None => 0.0,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::String(text) => text.trim().parse::<i64>().ok(),
        Value::Number(number) => number.as_i64(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Number(number) => number.as_f64(),
        _ => None,
    }
}
