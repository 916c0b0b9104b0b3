pub mod question;

pub use question::{QuestionDef, QuestionKind, form_key};
