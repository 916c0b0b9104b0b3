//! Formula resolution: dependency graph construction and topological
//! evaluation.
//!
//! Two scopes exist. A formula nested inside a group sees only sibling
//! sub-question values and is evaluated once per populated instance. A
//! top-level formula sees plain question values, other formulas' resolved
//! values, and group sub-question names as aggregates - the ordered list
//! of that sub-question's values across every populated instance, so
//! `sum(name)` works.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value as Json;
use thiserror::Error;
use tracing::warn;

use crate::answers::AnswerRecord;
use crate::eval::{Bindings, EvaluationError, Expr, Value};
use crate::group;
use crate::spec::{QuestionDef, QuestionKind};

/// A formula (possibly transitively) references itself. Caught at schema
/// validate time by a dry run; submissions never hit this.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circular formula dependency between: {}", names.join(", "))]
pub struct CircularFormulaError {
    pub names: Vec<String>,
}

/// Flattened view of a schema: every question, nested or not, with its
/// enclosing group. Identifiers resolve by declared name or by form key.
pub(crate) struct QuestionIndex<'a> {
    entries: Vec<IndexedQuestion<'a>>,
    by_ident: HashMap<String, usize>,
}

#[derive(Clone, Copy)]
pub(crate) struct IndexedQuestion<'a> {
    pub question: &'a QuestionDef,
    pub group: Option<&'a QuestionDef>,
}

impl<'a> QuestionIndex<'a> {
    pub fn build(questions: &'a [QuestionDef]) -> Self {
        let mut entries = Vec::new();
        let mut by_ident = HashMap::new();
        for question in questions {
            push_entry(&mut entries, &mut by_ident, question, None);
            if question.kind == QuestionKind::Group {
                for sub in &question.questions {
                    push_entry(&mut entries, &mut by_ident, sub, Some(question));
                }
            }
        }
        Self { entries, by_ident }
    }

    pub fn resolve(&self, ident: &str) -> Option<IndexedQuestion<'a>> {
        self.by_ident.get(ident).map(|&i| self.entries[i])
    }

    pub fn entries(&self) -> impl Iterator<Item = IndexedQuestion<'a>> + '_ {
        self.entries.iter().copied()
    }
}

fn push_entry<'a>(
    entries: &mut Vec<IndexedQuestion<'a>>,
    by_ident: &mut HashMap<String, usize>,
    question: &'a QuestionDef,
    group: Option<&'a QuestionDef>,
) {
    let slot = entries.len();
    entries.push(IndexedQuestion { question, group });
    // On duplicate names the first declaration wins; validate() reports
    // the duplicate itself.
    by_ident.entry(question.name.clone()).or_insert(slot);
    by_ident.entry(question.form_key()).or_insert(slot);
}

pub(crate) struct PlannedFormula<'a> {
    pub question: &'a QuestionDef,
    pub group: Option<&'a QuestionDef>,
    pub expr: Expr,
    pub idents: BTreeSet<String>,
}

/// Order every parseable formula so that referenced formulas are always
/// evaluated before their dependents (Kahn's algorithm). Unparseable
/// formula text is skipped here; `validate()` reports it on its own pass.
pub(crate) fn build_plan<'a>(
    index: &QuestionIndex<'a>,
) -> Result<Vec<PlannedFormula<'a>>, CircularFormulaError> {
    let mut nodes: Vec<PlannedFormula<'a>> = Vec::new();
    for entry in index.entries() {
        if entry.question.kind != QuestionKind::Formula {
            continue;
        }
        let Some(text) = entry.question.formula.as_deref() else {
            continue;
        };
        let Ok(expr) = Expr::parse(text) else {
            continue;
        };
        let idents = expr.variables();
        nodes.push(PlannedFormula {
            question: entry.question,
            group: entry.group,
            expr,
            idents,
        });
    }

    let position: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.question.name.as_str(), i))
        .collect();

    // dependents[i] lists the formulas that reference formula i.
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut indegree: Vec<usize> = vec![0; nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for ident in &node.idents {
            let Some(target) = index.resolve(ident) else {
                continue;
            };
            if target.question.kind != QuestionKind::Formula {
                continue;
            }
            if let Some(&j) = position.get(target.question.name.as_str()) {
                dependents[j].push(i);
                indegree[i] += 1;
            }
        }
    }

    let mut ready: Vec<usize> = indegree
        .iter()
        .enumerate()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(i, _)| i)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(node) = ready.pop() {
        order.push(node);
        for &dependent in &dependents[node] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.push(dependent);
            }
        }
    }

    if order.len() < nodes.len() {
        let mut names: Vec<String> = indegree
            .iter()
            .enumerate()
            .filter(|&(_, &deg)| deg > 0)
            .map(|(i, _)| nodes[i].question.name.clone())
            .collect();
        names.sort();
        return Err(CircularFormulaError { names });
    }

    // Reorder the owned nodes into topological order.
    let mut slots: Vec<Option<PlannedFormula<'a>>> = nodes.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect())
}

/// Resolved values kept aside during resolution so later formulas can
/// reference earlier ones without re-parsing the record.
enum Resolved {
    Scalar(Value),
    PerInstance(BTreeMap<u32, Value>),
}

/// Evaluate every formula and write the results into `record` exactly like
/// entered answers. Evaluation failures degrade to null with a warning;
/// one edge-case input must not abort the whole submission.
pub(crate) fn resolve_into_record(index: &QuestionIndex<'_>, record: &mut AnswerRecord) {
    let plan = match build_plan(index) {
        Ok(plan) => plan,
        Err(err) => {
            // Gated at validate time; a stored schema should never cycle.
            warn!(error = %err, "skipping formula resolution");
            return;
        }
    };

    let mut resolved: HashMap<String, Resolved> = HashMap::new();

    for node in &plan {
        match node.group {
            Some(enclosing) => {
                let indices = record
                    .user_input(&enclosing.name)
                    .map(group::recorded_indices)
                    .unwrap_or_default();
                let mut per_instance = BTreeMap::new();
                for instance in indices {
                    let value =
                        resolve_group_instance(node, enclosing, instance, index, record, &resolved);
                    record.set_group_user_input(
                        &enclosing.name,
                        instance,
                        &node.question.name,
                        to_recorded(&value),
                    );
                    per_instance.insert(instance, value);
                }
                resolved.insert(node.question.name.clone(), Resolved::PerInstance(per_instance));
            }
            None => {
                let value = resolve_top_level(node, index, record, &resolved);
                if !value.is_null() {
                    record.set_user_input(&node.question.name, to_recorded(&value));
                }
                resolved.insert(node.question.name.clone(), Resolved::Scalar(value));
            }
        }
    }
}

fn to_recorded(value: &Value) -> Json {
    if value.is_null() {
        Json::Null
    } else {
        Json::String(value.to_string())
    }
}

/// Tracks the blank-input rule: when every scalar input a formula
/// references is blank the formula yields null; otherwise blanks bind as
/// zero so evaluation still proceeds.
struct BlankTracker {
    scalar_deps: usize,
    non_blank: usize,
}

impl BlankTracker {
    fn new() -> Self {
        Self {
            scalar_deps: 0,
            non_blank: 0,
        }
    }

    fn record(&mut self, value: &Option<Value>) {
        self.scalar_deps += 1;
        if value.is_some() {
            self.non_blank += 1;
        }
    }

    fn all_blank(&self) -> bool {
        self.scalar_deps > 0 && self.non_blank == 0
    }
}

fn resolve_group_instance(
    node: &PlannedFormula<'_>,
    enclosing: &QuestionDef,
    instance: u32,
    index: &QuestionIndex<'_>,
    record: &AnswerRecord,
    resolved: &HashMap<String, Resolved>,
) -> Value {
    let mut bindings = Bindings::new();
    let mut blanks = BlankTracker::new();
    for ident in &node.idents {
        let Some(target) = index.resolve(ident) else {
            continue;
        };
        // Group-local formulas see sibling sub-questions only.
        if !target.group.is_some_and(|g| g.name == enclosing.name) {
            continue;
        }
        let value = if target.question.kind == QuestionKind::Formula {
            resolved_instance_value(resolved, &target.question.name, instance)
        } else {
            record
                .group_user_input(&enclosing.name, instance, &target.question.name)
                .and_then(json_to_numeric)
        };
        blanks.record(&value);
        bindings.insert(ident.clone(), value.unwrap_or(Value::Int(0)));
    }
    if blanks.all_blank() {
        return Value::Null;
    }
    evaluate_or_null(node, &bindings)
}

fn resolve_top_level(
    node: &PlannedFormula<'_>,
    index: &QuestionIndex<'_>,
    record: &AnswerRecord,
    resolved: &HashMap<String, Resolved>,
) -> Value {
    let mut bindings = Bindings::new();
    let mut blanks = BlankTracker::new();
    for ident in &node.idents {
        let Some(target) = index.resolve(ident) else {
            continue;
        };
        match target.group {
            // A group sub-question name binds as the aggregate list of its
            // values across populated instances; blank entries drop out.
            Some(enclosing) => {
                let values = if target.question.kind == QuestionKind::Formula {
                    resolved_aggregate(resolved, &target.question.name)
                } else {
                    aggregate_raw(record, enclosing, target.question)
                };
                bindings.insert(ident.clone(), Value::List(values));
            }
            None => {
                let value = if target.question.kind == QuestionKind::Formula {
                    match resolved.get(&target.question.name) {
                        Some(Resolved::Scalar(value)) if !value.is_null() => Some(value.clone()),
                        _ => None,
                    }
                } else {
                    record.user_input(&target.question.name).and_then(json_to_numeric)
                };
                blanks.record(&value);
                bindings.insert(ident.clone(), value.unwrap_or(Value::Int(0)));
            }
        }
    }
    if blanks.all_blank() {
        return Value::Null;
    }
    evaluate_or_null(node, &bindings)
}

fn resolved_instance_value(
    resolved: &HashMap<String, Resolved>,
    name: &str,
    instance: u32,
) -> Option<Value> {
    match resolved.get(name) {
        Some(Resolved::PerInstance(values)) => values
            .get(&instance)
            .filter(|value| !value.is_null())
            .cloned(),
        _ => None,
    }
}

fn resolved_aggregate(resolved: &HashMap<String, Resolved>, name: &str) -> Vec<Value> {
    match resolved.get(name) {
        Some(Resolved::PerInstance(values)) => values
            .values()
            .filter(|value| !value.is_null())
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}

fn aggregate_raw(record: &AnswerRecord, enclosing: &QuestionDef, target: &QuestionDef) -> Vec<Value> {
    let Some(user_input) = record.user_input(&enclosing.name) else {
        return Vec::new();
    };
    group::recorded_indices(user_input)
        .into_iter()
        .filter_map(|instance| {
            record
                .group_user_input(&enclosing.name, instance, &target.name)
                .and_then(json_to_numeric)
        })
        .collect()
}

fn evaluate_or_null(node: &PlannedFormula<'_>, bindings: &Bindings) -> Value {
    match node.expr.eval(bindings) {
        Ok(value) => value,
        Err(err) => {
            log_degraded(&node.question.name, &err);
            Value::Null
        }
    }
}

fn log_degraded(name: &str, err: &EvaluationError) {
    warn!(formula = name, error = %err, "formula evaluation degraded to null");
}

/// Numeric view of a recorded user input. Non-numeric inputs (text,
/// checkbox lists) bind as blank.
fn json_to_numeric(value: &Json) -> Option<Value> {
    match value {
        Json::String(text) => Value::parse_numeric(text),
        Json::Number(number) => {
            if let Some(n) = number.as_i64() {
                Some(Value::Int(n))
            } else {
                number.as_f64().map(Value::Float)
            }
        }
        _ => None,
    }
}
