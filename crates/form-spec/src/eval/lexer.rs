use super::EvaluationError;

/// Token stream for the restricted formula grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Ident(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Power,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, EvaluationError> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let ch = bytes[pos] as char;
        match ch {
            ' ' | '\t' | '\r' | '\n' => pos += 1,
            '(' => {
                tokens.push(Token::LParen);
                pos += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                pos += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                pos += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                pos += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                pos += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                pos += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                pos += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                pos += 1;
            }
            '*' => {
                if bytes.get(pos + 1) == Some(&b'*') {
                    tokens.push(Token::Power);
                    pos += 2;
                } else {
                    tokens.push(Token::Star);
                    pos += 1;
                }
            }
            '^' => {
                tokens.push(Token::Power);
                pos += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                pos += 1;
            }
            '=' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(Token::Eq);
                    pos += 2;
                } else {
                    return Err(EvaluationError::Syntax(
                        "assignment is not allowed, use `==` for comparison".into(),
                    ));
                }
            }
            '!' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(Token::Ne);
                    pos += 2;
                } else {
                    return Err(EvaluationError::Syntax("unexpected character `!`".into()));
                }
            }
            '<' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(Token::Le);
                    pos += 2;
                } else {
                    tokens.push(Token::Lt);
                    pos += 1;
                }
            }
            '>' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(Token::Ge);
                    pos += 2;
                } else {
                    tokens.push(Token::Gt);
                    pos += 1;
                }
            }
            '0'..='9' | '.' => {
                let (token, next) = lex_number(input, pos)?;
                tokens.push(token);
                pos = next;
            }
            _ if ch.is_ascii_alphabetic() || ch == '_' => {
                let start = pos;
                while pos < bytes.len() {
                    let c = bytes[pos] as char;
                    if c.is_ascii_alphanumeric() || c == '_' {
                        pos += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(keyword_or_ident(&input[start..pos]));
            }
            other => {
                return Err(EvaluationError::Syntax(format!(
                    "unexpected character `{other}`"
                )));
            }
        }
    }

    Ok(tokens)
}

// Formulas were historically authored against a Python evaluator, so the
// capitalized literal spellings remain accepted.
fn keyword_or_ident(word: &str) -> Token {
    match word {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "true" | "True" => Token::True,
        "false" | "False" => Token::False,
        "null" | "None" => Token::Null,
        _ => Token::Ident(word.to_string()),
    }
}

fn lex_number(input: &str, start: usize) -> Result<(Token, usize), EvaluationError> {
    let bytes = input.as_bytes();
    let mut pos = start;
    let mut is_float = false;

    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos < bytes.len() && bytes[pos] == b'.' {
        is_float = true;
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        let mut exp = pos + 1;
        if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
            exp += 1;
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            is_float = true;
            pos = exp;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }

    let text = &input[start..pos];
    if text == "." {
        return Err(EvaluationError::Syntax("unexpected character `.`".into()));
    }
    if is_float {
        let parsed = text
            .parse::<f64>()
            .map_err(|_| EvaluationError::Syntax(format!("invalid number `{text}`")))?;
        Ok((Token::Float(parsed), pos))
    } else {
        match text.parse::<i64>() {
            Ok(parsed) => Ok((Token::Int(parsed), pos)),
            // Out-of-range integer literals degrade to floats.
            Err(_) => {
                let parsed = text
                    .parse::<f64>()
                    .map_err(|_| EvaluationError::Syntax(format!("invalid number `{text}`")))?;
                Ok((Token::Float(parsed), pos))
            }
        }
    }
}
