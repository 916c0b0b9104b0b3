//! One-pass structural and semantic validation of an authored schema.
//!
//! Validation gates schema save: every problem is collected and reported
//! together so the author sees a complete report, and a schema that
//! passes here is trusted at submission time.

use crate::answers::SchemaError;
use crate::eval::Expr;
use crate::formula::{QuestionIndex, build_plan};
use crate::spec::{QuestionDef, QuestionKind};

/// Where the schema will be used. Some kinds are only legal in certain
/// callers: reservation questionnaires cannot repeat groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormContext {
    #[default]
    PostUsage,
    Reservation,
}

/// External inventory lookup for consumable-linked questions.
pub trait ConsumableLookup {
    fn exists(&self, name: &str) -> bool;
}

impl<F: Fn(&str) -> bool> ConsumableLookup for F {
    fn exists(&self, name: &str) -> bool {
        self(name)
    }
}

#[derive(Default)]
pub struct ValidationContext<'a> {
    pub context: FormContext,
    /// When absent, consumable existence is not checked (the caller owns
    /// the inventory).
    pub consumables: Option<&'a dyn ConsumableLookup>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(context: FormContext) -> Self {
        Self {
            context,
            consumables: None,
        }
    }

    pub fn with_consumables(mut self, lookup: &'a dyn ConsumableLookup) -> Self {
        self.consumables = Some(lookup);
        self
    }
}

/// Collect every structural and semantic problem in `questions`.
pub fn validate(questions: &[QuestionDef], ctx: &ValidationContext<'_>) -> Vec<SchemaError> {
    let mut errors = Vec::new();
    let index = QuestionIndex::build(questions);

    for question in questions {
        validate_question(question, None, ctx, &index, &mut errors);
        if question.kind == QuestionKind::Group {
            for sub in &question.questions {
                validate_question(sub, Some(question), ctx, &index, &mut errors);
            }
        }
    }

    check_duplicate_names(questions, &mut errors);

    // Dry-run dependency ordering so cycles fail the save, never a
    // submission.
    if let Err(cycle) = build_plan(&index) {
        errors.push(SchemaError::new(
            cycle.names.first().map(String::as_str),
            "circular_formula",
            cycle.to_string(),
        ));
    }

    errors
}

fn validate_question(
    question: &QuestionDef,
    enclosing: Option<&QuestionDef>,
    ctx: &ValidationContext<'_>,
    index: &QuestionIndex<'_>,
    errors: &mut Vec<SchemaError>,
) {
    let name = question.name.as_str();

    if question.kind.has_choices() {
        match &question.choices {
            None => errors.push(SchemaError::new(
                Some(name),
                "missing_choices",
                format!(
                    "question `{name}` of type {} requires `choices`",
                    question.kind.wire_name()
                ),
            )),
            Some(choices) => {
                if let Some(labels) = &question.labels
                    && labels.len() != choices.len()
                {
                    errors.push(SchemaError::new(
                        Some(name),
                        "labels_mismatch",
                        format!("question `{name}` needs one label for each choice"),
                    ));
                }
            }
        }
    }

    if question.kind == QuestionKind::Group {
        validate_group(question, enclosing, ctx, errors);
    }

    if question.kind == QuestionKind::Formula {
        validate_formula(question, enclosing, index, errors);
    }

    if let Some(consumable) = &question.consumable {
        if !matches!(question.kind, QuestionKind::Number | QuestionKind::Formula) {
            errors.push(SchemaError::new(
                Some(name),
                "consumable_kind",
                format!(
                    "question `{name}`: consumable withdrawals require a number or formula question"
                ),
            ));
        } else if let Some(lookup) = ctx.consumables
            && !lookup.exists(consumable)
        {
            errors.push(SchemaError::new(
                Some(name),
                "unknown_consumable",
                format!("question `{name}`: consumable `{consumable}` could not be found"),
            ));
        }
    }
}

fn validate_group(
    question: &QuestionDef,
    enclosing: Option<&QuestionDef>,
    ctx: &ValidationContext<'_>,
    errors: &mut Vec<SchemaError>,
) {
    let name = question.name.as_str();

    if ctx.context == FormContext::Reservation {
        errors.push(SchemaError::new(
            Some(name),
            "kind_not_allowed",
            format!("question `{name}`: group questions are not allowed in reservation questionnaires"),
        ));
    }
    if enclosing.is_some() {
        errors.push(SchemaError::new(
            Some(name),
            "nested_group",
            format!("question `{name}`: group questions cannot be nested"),
        ));
    }
    match question.max_number {
        None => errors.push(SchemaError::new(
            Some(name),
            "missing_max_number",
            format!("group question `{name}` requires `max_number`"),
        )),
        Some(0) => errors.push(SchemaError::new(
            Some(name),
            "invalid_max_number",
            format!("group question `{name}`: `max_number` must be at least 1"),
        )),
        Some(_) => {}
    }
    if question.questions.is_empty() {
        errors.push(SchemaError::new(
            Some(name),
            "missing_questions",
            format!("group question `{name}` requires a non-empty `questions` array"),
        ));
    }
}

fn validate_formula(
    question: &QuestionDef,
    enclosing: Option<&QuestionDef>,
    index: &QuestionIndex<'_>,
    errors: &mut Vec<SchemaError>,
) {
    let name = question.name.as_str();

    let Some(text) = question.formula.as_deref() else {
        errors.push(SchemaError::new(
            Some(name),
            "missing_formula",
            format!("formula question `{name}` requires `formula`"),
        ));
        return;
    };

    let expr = match Expr::parse(text) {
        Ok(expr) => expr,
        Err(err) => {
            errors.push(SchemaError::new(
                Some(name),
                "formula_syntax",
                format!("formula question `{name}`: {err}"),
            ));
            return;
        }
    };

    // Identifiers resolve only against the declared-name allowlist;
    // undeclared references fail the save instead of surfacing at
    // submission time.
    for ident in expr.variables() {
        match index.resolve(&ident) {
            None => errors.push(SchemaError::new(
                Some(name),
                "unknown_identifier",
                format!("formula `{name}` references `{ident}`, which is not a question name"),
            )),
            Some(target) if target.question.kind == QuestionKind::Group => {
                errors.push(SchemaError::new(
                    Some(name),
                    "group_reference",
                    format!(
                        "formula `{name}` cannot reference group `{ident}` directly; reference one of its sub-questions"
                    ),
                ));
            }
            Some(target) => {
                if let Some(enclosing) = enclosing
                    && !target.group.is_some_and(|g| g.name == enclosing.name)
                {
                    errors.push(SchemaError::new(
                        Some(name),
                        "formula_scope",
                        format!(
                            "formula `{name}` is inside group `{}` and can only reference sibling sub-questions, not `{ident}`",
                            enclosing.name
                        ),
                    ));
                }
            }
        }
    }
}

fn check_duplicate_names(questions: &[QuestionDef], errors: &mut Vec<SchemaError>) {
    let mut seen = std::collections::BTreeMap::new();
    let mut record = |name: &str| {
        *seen.entry(name.to_string()).or_insert(0usize) += 1;
    };
    for question in questions {
        record(&question.name);
        if question.kind == QuestionKind::Group {
            for sub in &question.questions {
                record(&sub.name);
            }
        }
    }
    for (name, count) in seen {
        if count > 1 {
            errors.push(SchemaError::new(
                Some(&name),
                "duplicate_name",
                format!("question names need to be unique; `{name}` is declared {count} times"),
            ));
        }
    }
}
