//! Tokenizer for XPath expressions.

use crate::error::XPathError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Slash,
    DoubleSlash,
    Pipe,
    Plus,
    Minus,
    /// `*` used as a wildcard name test
    Star,
    Multiply,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    At,
    Dot,
    DotDot,
    ColonColon,
    And,
    Or,
    Div,
    Mod,
    Literal(String),
    Number(f64),
    /// A name test or function/axis name: `local`, `p:local`, `p:*`, `*:local`
    Name(String),
    Variable(String),
}

impl Token {
    /// Whether an operator may follow this token (XPath 1.0 §3.7 lexical rule)
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            Token::Name(_)
                | Token::Star
                | Token::Literal(_)
                | Token::Number(_)
                | Token::Variable(_)
                | Token::RParen
                | Token::RBracket
                | Token::Dot
                | Token::DotDot
        )
    }
}

pub(crate) fn tokenize(expr: &str) -> Result<Vec<Token>, XPathError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    let err = |message: String| XPathError::Syntax {
        expr: expr.to_string(),
        message,
    };

    while i < chars.len() {
        let c = chars[i];
        let operator_position = tokens.last().map(Token::ends_operand).unwrap_or(false);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    tokens.push(Token::DoubleSlash);
                    i += 2;
                } else {
                    tokens.push(Token::Slash);
                    i += 1;
                }
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    return Err(err(format!("unexpected '!' at offset {}", i)));
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '@' => {
                tokens.push(Token::At);
                i += 1;
            }
            ':' => {
                if chars.get(i + 1) == Some(&':') {
                    tokens.push(Token::ColonColon);
                    i += 2;
                } else {
                    return Err(err(format!("unexpected ':' at offset {}", i)));
                }
            }
            '"' | '\'' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|ch| *ch == c)
                    .ok_or_else(|| err("unterminated string literal".to_string()))?;
                tokens.push(Token::Literal(chars[i + 1..i + 1 + close].iter().collect()));
                i += close + 2;
            }
            '$' => {
                let (name, next) = read_qname(&chars, i + 1);
                if name.is_empty() {
                    return Err(err(format!("expected variable name at offset {}", i)));
                }
                tokens.push(Token::Variable(name));
                i = next;
            }
            '*' => {
                if operator_position {
                    tokens.push(Token::Multiply);
                    i += 1;
                } else if chars.get(i + 1) == Some(&':') && chars.get(i + 2).map_or(false, |ch| is_name_start(*ch)) {
                    let (local, next) = read_ncname(&chars, i + 2);
                    tokens.push(Token::Name(format!("*:{}", local)));
                    i = next;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '.' => {
                if chars.get(i + 1).map_or(false, |ch| ch.is_ascii_digit()) {
                    let (number, next) = read_number(&chars, i);
                    tokens.push(Token::Number(number));
                    i = next;
                } else if chars.get(i + 1) == Some(&'.') {
                    tokens.push(Token::DotDot);
                    i += 2;
                } else {
                    tokens.push(Token::Dot);
                    i += 1;
                }
            }
            d if d.is_ascii_digit() => {
                let (number, next) = read_number(&chars, i);
                tokens.push(Token::Number(number));
                i = next;
            }
            n if is_name_start(n) => {
                let (name, next) = read_qname(&chars, i);
                let token = if operator_position {
                    match name.as_str() {
                        "and" => Token::And,
                        "or" => Token::Or,
                        "div" => Token::Div,
                        "mod" => Token::Mod,
                        "eq" => Token::Eq,
                        "ne" => Token::NotEq,
                        "lt" => Token::Lt,
                        "le" => Token::Le,
                        "gt" => Token::Gt,
                        "ge" => Token::Ge,
                        _ => return Err(err(format!("expected an operator, found '{}'", name))),
                    }
                } else {
                    Token::Name(name)
                };
                tokens.push(token);
                i = next;
            }
            other => return Err(err(format!("unexpected character '{}' at offset {}", other, i))),
        }
    }

    Ok(tokens)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{b7}')
}

fn read_ncname(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    if end < chars.len() && is_name_start(chars[end]) {
        end += 1;
        while end < chars.len() && is_name_char(chars[end]) {
            end += 1;
        }
    }
    (chars[start..end].iter().collect(), end)
}

/// Read `ncname`, `prefix:ncname` or `prefix:*`. A `::` after the first
/// part is an axis separator and is left for the caller.
fn read_qname(chars: &[char], start: usize) -> (String, usize) {
    let (first, end) = read_ncname(chars, start);
    if first.is_empty() || chars.get(end) != Some(&':') || chars.get(end + 1) == Some(&':') {
        return (first, end);
    }
    match chars.get(end + 1) {
        Some('*') => (format!("{}:*", first), end + 2),
        Some(c) if is_name_start(*c) => {
            let (local, next) = read_ncname(chars, end + 1);
            (format!("{}:{}", first, local), next)
        }
        _ => (first, end),
    }
}

fn read_number(chars: &[char], start: usize) -> (f64, usize) {
    let mut end = start;
    let mut seen_dot = false;
    while end < chars.len() && (chars[end].is_ascii_digit() || (chars[end] == '.' && !seen_dot)) {
        if chars[end] == '.' {
            // `1..` is not a number followed by `..`; XPath numbers never end that way
            if chars.get(end + 1) == Some(&'.') {
                break;
            }
            seen_dot = true;
        }
        end += 1;
    }
    let text: String = chars[start..end].iter().collect();
    (text.parse().unwrap_or(f64::NAN), end)
}
