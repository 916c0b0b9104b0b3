use std::fmt;

use super::EvaluationError;

/// Runtime value produced by the expression interpreter.
///
/// Integers and floats are kept distinct so a formula over integer inputs
/// records an integer result (`"4"` rather than `"4.0"`).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(flag) => *flag,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::List(items) => !items.is_empty(),
        }
    }

    /// Numeric view of the value. Booleans coerce to 0/1 so chained
    /// comparisons and arithmetic over comparison results behave like the
    /// authored formulas expect.
    pub fn as_f64(&self) -> Result<f64, EvaluationError> {
        match self {
            Value::Int(n) => Ok(*n as f64),
            Value::Float(f) => Ok(*f),
            Value::Bool(flag) => Ok(if *flag { 1.0 } else { 0.0 }),
            other => Err(EvaluationError::Type(format!(
                "expected a number, got {}",
                other.kind_name()
            ))),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::List(_) => "list",
        }
    }

    /// Parse a raw submitted string into a numeric value. Integers are
    /// preferred so integer-only formulas stay integral.
    pub fn parse_numeric(raw: &str) -> Option<Value> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(n) = trimmed.parse::<i64>() {
            return Some(Value::Int(n));
        }
        trimmed.parse::<f64>().ok().map(Value::Float)
    }
}

fn write_float(f: f64, out: &mut fmt::Formatter<'_>) -> fmt::Result {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        write!(out, "{f:.1}")
    } else {
        write!(out, "{f}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(out, "null"),
            Value::Bool(flag) => write!(out, "{flag}"),
            Value::Int(n) => write!(out, "{n}"),
            Value::Float(f) => write_float(*f, out),
            Value::List(items) => {
                write!(out, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(out, ", ")?;
                    }
                    write!(out, "{item}")?;
                }
                write!(out, "]")
            }
        }
    }
}
