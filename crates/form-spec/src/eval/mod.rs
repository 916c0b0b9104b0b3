//! Sandboxed evaluation of administrator-authored formula expressions.
//!
//! Formulas are data: they are written by schema authors and executed on
//! every end-user submission. The evaluator therefore owns its entire
//! pipeline (lexer, parser, interpreter) instead of delegating to any
//! general-purpose language runtime. The grammar covers arithmetic,
//! boolean logic, chained comparisons, list indexing/slicing, and a fixed
//! function whitelist; nothing else parses.

mod lexer;
mod parser;
mod value;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

pub use parser::{BinaryOp, BoolOp, CmpOp, Expr, Function, UnaryOp};
pub use value::Value;

/// Variable environment a formula is evaluated against.
pub type Bindings = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),
    #[error("`{0}` is not an allowed function")]
    UnknownFunction(String),
    #[error("`{func}` expects {expected} argument(s), got {got}")]
    Arity {
        func: &'static str,
        expected: &'static str,
        got: usize,
    },
    #[error("type error: {0}")]
    Type(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("list index {0} out of range")]
    IndexOutOfRange(i64),
    #[error("math domain error: {0}")]
    Domain(&'static str),
}

/// Parse and evaluate `expr` against `vars`.
pub fn evaluate(expr: &str, vars: &Bindings) -> Result<Value, EvaluationError> {
    Expr::parse(expr)?.eval(vars)
}

/// The set of free identifiers in `expr`, used to build the formula
/// dependency graph and the validate-time allowlist check.
pub fn expression_variables(expr: &str) -> Result<BTreeSet<String>, EvaluationError> {
    Ok(Expr::parse(expr)?.variables())
}

impl Expr {
    pub fn eval(&self, vars: &Bindings) -> Result<Value, EvaluationError> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(name) => vars
                .get(name)
                .cloned()
                .ok_or_else(|| EvaluationError::UnknownIdentifier(name.clone())),
            Expr::Unary { op, operand } => eval_unary(*op, operand.eval(vars)?),
            Expr::Binary { op, left, right } => {
                eval_binary(*op, left.eval(vars)?, right.eval(vars)?)
            }
            Expr::Compare { first, rest } => {
                let mut left = first.eval(vars)?;
                for (op, operand) in rest {
                    let right = operand.eval(vars)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::BoolChain { op, operands } => {
                let mut last = None;
                for operand in operands {
                    let value = operand.eval(vars)?;
                    match op {
                        BoolOp::And if !value.truthy() => return Ok(value),
                        BoolOp::Or if value.truthy() => return Ok(value),
                        _ => {}
                    }
                    last = Some(value);
                }
                Ok(last.unwrap_or(Value::Bool(matches!(op, BoolOp::And))))
            }
            Expr::Call { func, args } => {
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(arg.eval(vars)?);
                }
                call_function(*func, evaluated)
            }
            Expr::Index { value, index } => {
                let items = expect_list(value.eval(vars)?)?;
                let raw = expect_int(index.eval(vars)?)?;
                let resolved = if raw < 0 { raw + items.len() as i64 } else { raw };
                if resolved < 0 || resolved as usize >= items.len() {
                    return Err(EvaluationError::IndexOutOfRange(raw));
                }
                Ok(items[resolved as usize].clone())
            }
            Expr::Slice {
                value,
                lower,
                upper,
            } => {
                let items = expect_list(value.eval(vars)?)?;
                let len = items.len() as i64;
                let lower = match lower {
                    Some(expr) => clamp_bound(expect_int(expr.eval(vars)?)?, len),
                    None => 0,
                };
                let upper = match upper {
                    Some(expr) => clamp_bound(expect_int(expr.eval(vars)?)?, len),
                    None => len,
                };
                if lower >= upper {
                    return Ok(Value::List(Vec::new()));
                }
                Ok(Value::List(items[lower as usize..upper as usize].to_vec()))
            }
        }
    }
}

fn eval_unary(op: UnaryOp, operand: Value) -> Result<Value, EvaluationError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.truthy())),
        UnaryOp::Plus => match operand {
            Value::Int(_) | Value::Float(_) => Ok(operand),
            other => Err(EvaluationError::Type(format!(
                "cannot apply unary `+` to {}",
                other.kind_name()
            ))),
        },
        UnaryOp::Neg => match operand {
            Value::Int(n) => Ok(Value::Int(-n)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(EvaluationError::Type(format!(
                "cannot negate {}",
                other.kind_name()
            ))),
        },
    }
}

/// Numeric operand pair; integer arithmetic stays integral unless a float
/// is involved.
enum Pair {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn numeric_pair(op_name: &str, left: &Value, right: &Value) -> Result<Pair, EvaluationError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Pair::Ints(*a, *b)),
        _ => {
            let a = left.as_f64().map_err(|_| type_mismatch(op_name, left, right))?;
            let b = right
                .as_f64()
                .map_err(|_| type_mismatch(op_name, left, right))?;
            Ok(Pair::Floats(a, b))
        }
    }
}

fn type_mismatch(op_name: &str, left: &Value, right: &Value) -> EvaluationError {
    EvaluationError::Type(format!(
        "cannot apply `{op_name}` to {} and {}",
        left.kind_name(),
        right.kind_name()
    ))
}

fn eval_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvaluationError> {
    match op {
        BinaryOp::Add => match numeric_pair("+", &left, &right)? {
            Pair::Ints(a, b) => Ok(a
                .checked_add(b)
                .map(Value::Int)
                .unwrap_or(Value::Float(a as f64 + b as f64))),
            Pair::Floats(a, b) => Ok(Value::Float(a + b)),
        },
        BinaryOp::Sub => match numeric_pair("-", &left, &right)? {
            Pair::Ints(a, b) => Ok(a
                .checked_sub(b)
                .map(Value::Int)
                .unwrap_or(Value::Float(a as f64 - b as f64))),
            Pair::Floats(a, b) => Ok(Value::Float(a - b)),
        },
        BinaryOp::Mul => match numeric_pair("*", &left, &right)? {
            Pair::Ints(a, b) => Ok(a
                .checked_mul(b)
                .map(Value::Int)
                .unwrap_or(Value::Float(a as f64 * b as f64))),
            Pair::Floats(a, b) => Ok(Value::Float(a * b)),
        },
        // Division is always real-valued.
        BinaryOp::Div => {
            let a = left.as_f64()?;
            let b = right.as_f64()?;
            if b == 0.0 {
                return Err(EvaluationError::DivisionByZero);
            }
            Ok(Value::Float(a / b))
        }
        BinaryOp::Pow => match numeric_pair("**", &left, &right)? {
            Pair::Ints(a, b) if (0..=u32::MAX as i64).contains(&b) => Ok(a
                .checked_pow(b as u32)
                .map(Value::Int)
                .unwrap_or(Value::Float((a as f64).powf(b as f64)))),
            Pair::Ints(a, b) => Ok(Value::Float((a as f64).powf(b as f64))),
            Pair::Floats(a, b) => Ok(Value::Float(a.powf(b))),
        },
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, EvaluationError> {
    // Equality is structural when either side is not numeric.
    let numeric = matches!(left, Value::Int(_) | Value::Float(_) | Value::Bool(_))
        && matches!(right, Value::Int(_) | Value::Float(_) | Value::Bool(_));
    if !numeric {
        return match op {
            CmpOp::Eq => Ok(left == right),
            CmpOp::Ne => Ok(left != right),
            _ => Err(EvaluationError::Type(format!(
                "cannot order {} and {}",
                left.kind_name(),
                right.kind_name()
            ))),
        };
    }
    let a = left.as_f64()?;
    let b = right.as_f64()?;
    Ok(match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
    })
}

fn expect_list(value: Value) -> Result<Vec<Value>, EvaluationError> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(EvaluationError::Type(format!(
            "expected a list, got {}",
            other.kind_name()
        ))),
    }
}

fn expect_int(value: Value) -> Result<i64, EvaluationError> {
    match value {
        Value::Int(n) => Ok(n),
        other => Err(EvaluationError::Type(format!(
            "expected an integer, got {}",
            other.kind_name()
        ))),
    }
}

fn clamp_bound(bound: i64, len: i64) -> i64 {
    let resolved = if bound < 0 { bound + len } else { bound };
    resolved.clamp(0, len)
}

fn call_function(func: Function, args: Vec<Value>) -> Result<Value, EvaluationError> {
    match func {
        Function::Sum => eval_sum(args),
        Function::Round => eval_round(args),
        Function::Ceil | Function::Floor | Function::Trunc => {
            let value = single_numeric(func, args)?;
            let rounded = match func {
                Function::Ceil => value.ceil(),
                Function::Floor => value.floor(),
                _ => value.trunc(),
            };
            Ok(Value::Int(rounded as i64))
        }
        Function::Abs => {
            let [arg] = exact_args(func, args)?;
            match arg {
                Value::Int(n) => Ok(Value::Int(n.abs())),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(EvaluationError::Type(format!(
                    "`abs` expects a number, got {}",
                    other.kind_name()
                ))),
            }
        }
        Function::Sqrt => {
            let value = single_numeric(func, args)?;
            if value < 0.0 {
                return Err(EvaluationError::Domain("sqrt of a negative number"));
            }
            Ok(Value::Float(value.sqrt()))
        }
    }
}

fn exact_args<const N: usize>(
    func: Function,
    args: Vec<Value>,
) -> Result<[Value; N], EvaluationError> {
    let got = args.len();
    args.try_into().map_err(|_| EvaluationError::Arity {
        func: func.name(),
        expected: "1",
        got,
    })
}

fn single_numeric(func: Function, args: Vec<Value>) -> Result<f64, EvaluationError> {
    let [arg] = exact_args(func, args)?;
    arg.as_f64().map_err(|_| {
        EvaluationError::Type(format!(
            "`{}` expects a number, got {}",
            func.name(),
            arg.kind_name()
        ))
    })
}

fn eval_sum(mut args: Vec<Value>) -> Result<Value, EvaluationError> {
    // `sum(list)` is the common aggregate form; `sum(a, b, c)` also works.
    let items = if args.len() == 1 {
        match args.remove(0) {
            Value::List(items) => items,
            single => vec![single],
        }
    } else {
        args
    };
    let mut int_total: i64 = 0;
    let mut float_total: f64 = 0.0;
    let mut all_ints = true;
    for item in &items {
        match item {
            Value::Int(n) => {
                int_total = int_total.wrapping_add(*n);
                float_total += *n as f64;
            }
            Value::Float(f) => {
                all_ints = false;
                float_total += *f;
            }
            other => {
                return Err(EvaluationError::Type(format!(
                    "`sum` expects numbers, got {}",
                    other.kind_name()
                )));
            }
        }
    }
    if all_ints {
        Ok(Value::Int(int_total))
    } else {
        Ok(Value::Float(float_total))
    }
}

fn eval_round(args: Vec<Value>) -> Result<Value, EvaluationError> {
    match args.as_slice() {
        // Half-away-from-zero, so `round(5.5) == 6`.
        [value] => Ok(Value::Int(value.as_f64()?.round() as i64)),
        [value, Value::Int(digits)] => {
            let factor = 10f64.powi(*digits as i32);
            Ok(Value::Float((value.as_f64()? * factor).round() / factor))
        }
        [_, other] => Err(EvaluationError::Type(format!(
            "`round` digits must be an integer, got {}",
            other.kind_name()
        ))),
        _ => Err(EvaluationError::Arity {
            func: "round",
            expected: "1 or 2",
            got: args.len(),
        }),
    }
}
