use clap::{Parser, Subcommand, ValueEnum};
use form_spec::{DynamicForm, FormContext, Submission, ValidationContext, render_json_ui, render_text};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Dynamic form schema toolbox",
    long_about = "Validates authored form schemas, previews their rendering, and extracts submissions into answer records"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RenderMode {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Context {
    PostUsage,
    Reservation,
}

impl From<Context> for FormContext {
    fn from(context: Context) -> Self {
        match context {
            Context::PostUsage => FormContext::PostUsage,
            Context::Reservation => FormContext::Reservation,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Validate a form schema and report every problem found.
    Validate {
        /// Path to the schema JSON (an array of question objects).
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        /// Where the schema will be used; reservation questionnaires
        /// reject group questions.
        #[arg(long, value_enum, default_value_t = Context::PostUsage)]
        context: Context,
    },
    /// Preview the rendered form.
    Render {
        /// Path to the schema JSON.
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        /// Optional stored answer record used to pre-populate the form.
        #[arg(long, value_name = "RECORD")]
        initial: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = RenderMode::Text)]
        format: RenderMode,
    },
    /// Extract a submission into an answer record, resolving formulas.
    Extract {
        /// Path to the schema JSON.
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        /// Path to the submission JSON: an object mapping submitted field
        /// keys to a string or an array of strings.
        #[arg(long, value_name = "SUBMISSION")]
        submission: PathBuf,
    },
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Validate { schema, context } => run_validate(schema, context),
        Command::Render {
            schema,
            initial,
            format,
        } => run_render(schema, initial, format),
        Command::Extract { schema, submission } => run_extract(schema, submission),
    }
}

fn load_form(schema_path: &PathBuf, initial: Option<&PathBuf>) -> CliResult<DynamicForm> {
    let schema_json = fs::read_to_string(schema_path)?;
    let initial_record = match initial {
        Some(path) => Some(serde_json::from_str::<Value>(&fs::read_to_string(path)?)?),
        None => None,
    };
    Ok(DynamicForm::new(&schema_json, initial_record.as_ref())?)
}

fn run_validate(schema_path: PathBuf, context: Context) -> CliResult<()> {
    let form = load_form(&schema_path, None)?;
    let errors = form.validate(&ValidationContext::new(context.into()));
    if errors.is_empty() {
        println!("Schema is valid ({} question(s)).", form.questions().len());
        return Ok(());
    }
    for error in &errors {
        match &error.question {
            Some(question) => println!("[{}] {question}: {}", error.code, error.message),
            None => println!("[{}] {}", error.code, error.message),
        }
    }
    Err(format!("schema validation failed with {} error(s)", errors.len()).into())
}

fn run_render(schema_path: PathBuf, initial: Option<PathBuf>, format: RenderMode) -> CliResult<()> {
    let form = load_form(&schema_path, initial.as_ref())?;
    let payload = form.render();
    match format {
        RenderMode::Text => println!("{}", render_text(&payload)),
        RenderMode::Json => println!("{}", serde_json::to_string_pretty(&render_json_ui(&payload))?),
    }
    Ok(())
}

fn run_extract(schema_path: PathBuf, submission_path: PathBuf) -> CliResult<()> {
    let form = load_form(&schema_path, None)?;
    let submitted: Value = serde_json::from_str(&fs::read_to_string(submission_path)?)?;
    let submission = submission_from_json(&submitted)?;

    match form.extract(&submission) {
        Ok(record) => {
            println!("{}", record.to_json_pretty());
            Ok(())
        }
        Err(err) => {
            for question in &err.questions {
                eprintln!("required question left unanswered: {}", question.name);
            }
            Err(err.to_string().into())
        }
    }
}

fn submission_from_json(submitted: &Value) -> CliResult<Submission> {
    let Some(entries) = submitted.as_object() else {
        return Err("submission must be a JSON object of field keys to values".into());
    };
    let mut submission = Submission::new();
    for (key, value) in entries {
        match value {
            Value::String(text) => submission.append(key, text),
            Value::Array(values) => {
                for value in values {
                    match value {
                        Value::String(text) => submission.append(key, text),
                        other => submission.append(key, other.to_string()),
                    }
                }
            }
            Value::Number(number) => submission.append(key, number.to_string()),
            other => {
                return Err(format!("field `{key}` holds an unsupported value: {other}").into());
            }
        }
    }
    Ok(submission)
}
