use std::collections::BTreeSet;

use super::EvaluationError;
use super::lexer::{Token, tokenize};
use super::value::Value;

/// Parsed expression tree. The grammar is closed: there is no way to name
/// anything outside the caller-supplied environment and the fixed function
/// whitelist, so evaluating untrusted formula text cannot reach host code.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Chained comparison, e.g. `5 > 3 > 1`.
    Compare {
        first: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    BoolChain {
        op: BoolOp,
        operands: Vec<Expr>,
    },
    Call {
        func: Function,
        args: Vec<Expr>,
    },
    Index {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        value: Box<Expr>,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

/// The fixed function whitelist. Anything else is rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sum,
    Round,
    Ceil,
    Floor,
    Abs,
    Trunc,
    Sqrt,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sum" => Function::Sum,
            "round" => Function::Round,
            "ceil" => Function::Ceil,
            "floor" => Function::Floor,
            "abs" => Function::Abs,
            "trunc" => Function::Trunc,
            "sqrt" => Function::Sqrt,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Sum => "sum",
            Function::Round => "round",
            Function::Ceil => "ceil",
            Function::Floor => "floor",
            Function::Abs => "abs",
            Function::Trunc => "trunc",
            Function::Sqrt => "sqrt",
        }
    }
}

impl Expr {
    pub fn parse(input: &str) -> Result<Expr, EvaluationError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        parser.expect_end()?;
        Ok(expr)
    }

    /// Free identifiers referenced by the expression, in sorted order.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut BTreeSet<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Var(name) => {
                names.insert(name.clone());
            }
            Expr::Unary { operand, .. } => operand.collect_variables(names),
            Expr::Binary { left, right, .. } => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
            Expr::Compare { first, rest } => {
                first.collect_variables(names);
                for (_, operand) in rest {
                    operand.collect_variables(names);
                }
            }
            Expr::BoolChain { operands, .. } => {
                for operand in operands {
                    operand.collect_variables(names);
                }
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_variables(names);
                }
            }
            Expr::Index { value, index } => {
                value.collect_variables(names);
                index.collect_variables(names);
            }
            Expr::Slice {
                value,
                lower,
                upper,
            } => {
                value.collect_variables(names);
                if let Some(lower) = lower {
                    lower.collect_variables(names);
                }
                if let Some(upper) = upper {
                    upper.collect_variables(names);
                }
            }
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), EvaluationError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(EvaluationError::Syntax(format!("expected {what}")))
        }
    }

    fn expect_end(&mut self) -> Result<(), EvaluationError> {
        if self.pos < self.tokens.len() {
            Err(EvaluationError::Syntax(
                "unexpected trailing tokens in expression".into(),
            ))
        } else {
            Ok(())
        }
    }

    fn parse_or(&mut self) -> Result<Expr, EvaluationError> {
        let first = self.parse_and()?;
        if self.peek() != Some(&Token::Or) {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat(&Token::Or) {
            operands.push(self.parse_and()?);
        }
        Ok(Expr::BoolChain {
            op: BoolOp::Or,
            operands,
        })
    }

    fn parse_and(&mut self) -> Result<Expr, EvaluationError> {
        let first = self.parse_not()?;
        if self.peek() != Some(&Token::And) {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat(&Token::And) {
            operands.push(self.parse_not()?);
        }
        Ok(Expr::BoolChain {
            op: BoolOp::And,
            operands,
        })
    }

    fn parse_not(&mut self) -> Result<Expr, EvaluationError> {
        if self.eat(&Token::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, EvaluationError> {
        let first = self.parse_arith()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CmpOp::Eq,
                Some(Token::Ne) => CmpOp::Ne,
                Some(Token::Lt) => CmpOp::Lt,
                Some(Token::Le) => CmpOp::Le,
                Some(Token::Gt) => CmpOp::Gt,
                Some(Token::Ge) => CmpOp::Ge,
                _ => break,
            };
            self.pos += 1;
            rest.push((op, self.parse_arith()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn parse_arith(&mut self) -> Result<Expr, EvaluationError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, EvaluationError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvaluationError> {
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Plus,
                    operand: Box::new(operand),
                })
            }
            Some(Token::Minus) => {
                self.pos += 1;
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            _ => self.parse_power(),
        }
    }

    // Right-associative, binding tighter than unary minus on the left
    // (`-2 ** 2` is `-(2 ** 2)`).
    fn parse_power(&mut self) -> Result<Expr, EvaluationError> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::Power) {
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, EvaluationError> {
        let mut value = self.parse_primary()?;
        while self.eat(&Token::LBracket) {
            value = self.parse_subscript(value)?;
        }
        Ok(value)
    }

    fn parse_subscript(&mut self, value: Expr) -> Result<Expr, EvaluationError> {
        let lower = if matches!(self.peek(), Some(Token::Colon)) {
            None
        } else {
            Some(Box::new(self.parse_or()?))
        };
        if self.eat(&Token::Colon) {
            let upper = if matches!(self.peek(), Some(Token::RBracket)) {
                None
            } else {
                Some(Box::new(self.parse_or()?))
            };
            self.expect(Token::RBracket, "`]` after slice")?;
            Ok(Expr::Slice {
                value: Box::new(value),
                lower,
                upper,
            })
        } else {
            let index = lower
                .ok_or_else(|| EvaluationError::Syntax("expected index expression".into()))?;
            self.expect(Token::RBracket, "`]` after index")?;
            Ok(Expr::Index {
                value: Box::new(value),
                index,
            })
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, EvaluationError> {
        match self.advance() {
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::Int(n))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::Float(f))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    let func = Function::from_name(&name)
                        .ok_or(EvaluationError::UnknownFunction(name))?;
                    self.pos += 1;
                    let args = self.parse_args()?;
                    Ok(Expr::Call { func, args })
                } else {
                    Ok(Expr::Var(name))
                }
            }
            _ => Err(EvaluationError::Syntax(
                "expected a literal, identifier, or `(`".into(),
            )),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, EvaluationError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen, "`)` after arguments")?;
            return Ok(args);
        }
    }
}
