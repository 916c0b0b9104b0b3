#![allow(missing_docs)]

pub mod answers;
pub mod eval;
pub mod form;
pub mod formula;
pub mod group;
pub mod render;
pub mod spec;
pub mod validate;

pub use answers::{
    AnswerRecord, RequiredUnanswered, SchemaError, Submission, initial_inputs_from_record,
};
pub use eval::{Bindings, EvaluationError, Expr, Value, evaluate, expression_variables};
pub use form::{ConsumableSink, DynamicForm};
pub use formula::CircularFormulaError;
pub use render::{
    ChoiceOption, RenderPayload, RenderQuestion, WidgetKind, build_render_payload,
    render_group_instance, render_json_ui, render_text,
};
pub use spec::{QuestionDef, QuestionKind, form_key};
pub use validate::{ConsumableLookup, FormContext, ValidationContext, validate};
