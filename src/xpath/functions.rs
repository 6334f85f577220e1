//! Core function library: XPath 1.0 plus the XPath 2.0 string and
//! sequence helpers commonly found in Schematron rules.

use regex::{Regex, RegexBuilder};

use super::eval::{evaluate, parse_number, EvalContext, Value};
use super::parser::Expr;
use crate::error::XPathError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Last,
    Position,
    Count,
    LocalName,
    Name,
    NamespaceUri,
    String,
    Concat,
    StartsWith,
    EndsWith,
    Contains,
    SubstringBefore,
    SubstringAfter,
    Substring,
    StringLength,
    NormalizeSpace,
    Translate,
    UpperCase,
    LowerCase,
    Boolean,
    Not,
    True,
    False,
    Number,
    Sum,
    Floor,
    Ceiling,
    Round,
    Exists,
    Empty,
    Matches,
    Replace,
    StringJoin,
    Max,
    Min,
    Avg,
    Current,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        use Function::*;
        Some(match name {
            "last" => Last,
            "position" => Position,
            "count" => Count,
            "local-name" => LocalName,
            "name" => Name,
            "namespace-uri" => NamespaceUri,
            "string" => String,
            "concat" => Concat,
            "starts-with" => StartsWith,
            "ends-with" => EndsWith,
            "contains" => Contains,
            "substring-before" => SubstringBefore,
            "substring-after" => SubstringAfter,
            "substring" => Substring,
            "string-length" => StringLength,
            "normalize-space" => NormalizeSpace,
            "translate" => Translate,
            "upper-case" => UpperCase,
            "lower-case" => LowerCase,
            "boolean" => Boolean,
            "not" => Not,
            "true" => True,
            "false" => False,
            "number" => Number,
            "sum" => Sum,
            "floor" => Floor,
            "ceiling" => Ceiling,
            "round" => Round,
            "exists" => Exists,
            "empty" => Empty,
            "matches" => Matches,
            "replace" => Replace,
            "string-join" => StringJoin,
            "max" => Max,
            "min" => Min,
            "avg" => Avg,
            "current" => Current,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        use Function::*;
        match self {
            Last => "last",
            Position => "position",
            Count => "count",
            LocalName => "local-name",
            Name => "name",
            NamespaceUri => "namespace-uri",
            String => "string",
            Concat => "concat",
            StartsWith => "starts-with",
            EndsWith => "ends-with",
            Contains => "contains",
            SubstringBefore => "substring-before",
            SubstringAfter => "substring-after",
            Substring => "substring",
            StringLength => "string-length",
            NormalizeSpace => "normalize-space",
            Translate => "translate",
            UpperCase => "upper-case",
            LowerCase => "lower-case",
            Boolean => "boolean",
            Not => "not",
            True => "true",
            False => "false",
            Number => "number",
            Sum => "sum",
            Floor => "floor",
            Ceiling => "ceiling",
            Round => "round",
            Exists => "exists",
            Empty => "empty",
            Matches => "matches",
            Replace => "replace",
            StringJoin => "string-join",
            Max => "max",
            Min => "min",
            Avg => "avg",
            Current => "current",
        }
    }

    /// Accepted argument counts (min, max); `None` max is unbounded
    fn arity(self) -> (usize, Option<usize>) {
        use Function::*;
        match self {
            Last | Position | True | False | Current => (0, Some(0)),
            LocalName | Name | NamespaceUri | String | StringLength | NormalizeSpace | Number => (0, Some(1)),
            Count | UpperCase | LowerCase | Boolean | Not | Sum | Floor | Ceiling | Round | Exists | Empty
            | Max | Min | Avg => (1, Some(1)),
            StartsWith | EndsWith | Contains | SubstringBefore | SubstringAfter => (2, Some(2)),
            Substring => (2, Some(3)),
            Translate => (3, Some(3)),
            Matches => (2, Some(3)),
            Replace => (3, Some(4)),
            StringJoin => (1, Some(2)),
            Concat => (2, None),
        }
    }

    /// Static checks: arity, and literal regular expressions compile
    pub(crate) fn check_call(self, args: &[Expr]) -> Result<(), XPathError> {
        let (min, max) = self.arity();
        if args.len() < min || max.map_or(false, |m| args.len() > m) {
            let expected = match max {
                Some(m) if m == min => min.to_string(),
                Some(m) => format!("{}-{}", min, m),
                None => format!("at least {}", min),
            };
            return Err(XPathError::Arity {
                name: self.name().to_string(),
                expected,
                found: args.len(),
            });
        }
        if matches!(self, Function::Matches | Function::Replace) {
            let flags = match args.get(if self == Function::Matches { 2 } else { 3 }) {
                Some(Expr::Literal(f)) => f.as_str(),
                _ => "",
            };
            if let Some(Expr::Literal(pattern)) = args.get(1) {
                build_regex(pattern, flags)?;
            }
        }
        Ok(())
    }

    pub(crate) fn call(self, args: &[Expr], ctx: &EvalContext<'_>) -> Result<Value, XPathError> {
        use Function::*;
        let doc = ctx.doc;
        let string_arg = |i: usize| -> Result<std::string::String, XPathError> {
            match args.get(i) {
                Some(expr) => Ok(evaluate(expr, ctx)?.to_string_value(doc)),
                None => Ok(doc.string_value(ctx.node)),
            }
        };
        let number_arg = |i: usize| -> Result<f64, XPathError> {
            match args.get(i) {
                Some(expr) => Ok(evaluate(expr, ctx)?.to_number(doc)),
                None => Ok(parse_number(&doc.string_value(ctx.node))),
            }
        };
        let nodes_arg = |i: usize| -> Result<Vec<crate::xml::NodeId>, XPathError> {
            match args.get(i) {
                Some(expr) => evaluate(expr, ctx)?.into_nodes(&format!("{}()", self.name())),
                None => Ok(vec![ctx.node]),
            }
        };

        Ok(match self {
            Last => Value::Number(ctx.size as f64),
            Position => Value::Number(ctx.position as f64),
            Count => Value::Number(nodes_arg(0)?.len() as f64),
            LocalName | Name | NamespaceUri => {
                let nodes = nodes_arg(0)?;
                let name = nodes.first().and_then(|n| doc.name(*n));
                Value::String(match (self, name) {
                    (_, None) => std::string::String::new(),
                    (LocalName, Some(q)) => q.local.clone(),
                    (Name, Some(q)) => q.lexical(),
                    (_, Some(q)) => q.namespace.clone().unwrap_or_default(),
                })
            }
            String => Value::String(string_arg(0)?),
            Concat => {
                let mut out = std::string::String::new();
                for i in 0..args.len() {
                    out.push_str(&string_arg(i)?);
                }
                Value::String(out)
            }
            StartsWith => Value::Boolean(string_arg(0)?.starts_with(&string_arg(1)?)),
            EndsWith => Value::Boolean(string_arg(0)?.ends_with(&string_arg(1)?)),
            Contains => Value::Boolean(string_arg(0)?.contains(&string_arg(1)?)),
            SubstringBefore => {
                let s = string_arg(0)?;
                let pat = string_arg(1)?;
                Value::String(s.find(&pat).map(|i| s[..i].to_string()).unwrap_or_default())
            }
            SubstringAfter => {
                let s = string_arg(0)?;
                let pat = string_arg(1)?;
                Value::String(s.find(&pat).map(|i| s[i + pat.len()..].to_string()).unwrap_or_default())
            }
            Substring => {
                let s = string_arg(0)?;
                let start = number_arg(1)?;
                let length = if args.len() > 2 { Some(number_arg(2)?) } else { None };
                Value::String(substring(&s, start, length))
            }
            StringLength => Value::Number(string_arg(0)?.chars().count() as f64),
            NormalizeSpace => Value::String(string_arg(0)?.split_whitespace().collect::<Vec<_>>().join(" ")),
            Translate => {
                let s = string_arg(0)?;
                let from: Vec<char> = string_arg(1)?.chars().collect();
                let to: Vec<char> = string_arg(2)?.chars().collect();
                Value::String(
                    s.chars()
                        .filter_map(|c| match from.iter().position(|f| *f == c) {
                            Some(i) => to.get(i).copied(),
                            None => Some(c),
                        })
                        .collect(),
                )
            }
            UpperCase => Value::String(string_arg(0)?.to_uppercase()),
            LowerCase => Value::String(string_arg(0)?.to_lowercase()),
            Boolean => Value::Boolean(evaluate(&args[0], ctx)?.to_boolean()),
            Not => Value::Boolean(!evaluate(&args[0], ctx)?.to_boolean()),
            True => Value::Boolean(true),
            False => Value::Boolean(false),
            Number => Value::Number(number_arg(0)?),
            Sum => Value::Number(
                nodes_arg(0)?
                    .iter()
                    .map(|n| parse_number(&doc.string_value(*n)))
                    .sum(),
            ),
            Floor => Value::Number(number_arg(0)?.floor()),
            Ceiling => Value::Number(number_arg(0)?.ceil()),
            Round => {
                let n = number_arg(0)?;
                Value::Number(if n.is_finite() { (n + 0.5).floor() } else { n })
            }
            Exists | Empty => {
                let present = match evaluate(&args[0], ctx)? {
                    Value::Nodes(nodes) => !nodes.is_empty(),
                    _ => true,
                };
                Value::Boolean(if self == Exists { present } else { !present })
            }
            Matches => {
                let s = string_arg(0)?;
                let flags = if args.len() > 2 { string_arg(2)? } else { std::string::String::new() };
                let re = build_regex(&string_arg(1)?, &flags)?;
                Value::Boolean(re.is_match(&s))
            }
            Replace => {
                let s = string_arg(0)?;
                let flags = if args.len() > 3 { string_arg(3)? } else { std::string::String::new() };
                let re = build_regex(&string_arg(1)?, &flags)?;
                let replacement = string_arg(2)?;
                Value::String(re.replace_all(&s, replacement.as_str()).into_owned())
            }
            StringJoin => {
                let sep = if args.len() > 1 { string_arg(1)? } else { std::string::String::new() };
                let parts: Vec<std::string::String> = match evaluate(&args[0], ctx)? {
                    Value::Nodes(nodes) => nodes.iter().map(|n| doc.string_value(*n)).collect(),
                    other => vec![other.to_string_value(doc)],
                };
                Value::String(parts.join(&sep))
            }
            Max | Min | Avg => {
                let numbers: Vec<f64> = nodes_arg(0)?
                    .iter()
                    .map(|n| parse_number(&doc.string_value(*n)))
                    .collect();
                if numbers.is_empty() {
                    Value::Number(f64::NAN)
                } else {
                    Value::Number(match self {
                        Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                        Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
                        _ => numbers.iter().sum::<f64>() / numbers.len() as f64,
                    })
                }
            }
            Current => Value::Nodes(vec![ctx.current]),
        })
    }
}

fn build_regex(pattern: &str, flags: &str) -> Result<Regex, XPathError> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            's' => builder.dot_matches_new_line(true),
            'm' => builder.multi_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(XPathError::Regex {
                    pattern: pattern.to_string(),
                    message: format!("unknown flag '{}'", other),
                })
            }
        };
    }
    builder.build().map_err(|e| XPathError::Regex {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// XPath `substring()`: characters at positions p with
/// round(start) <= p < round(start) + round(length), counting from 1.
fn substring(s: &str, start: f64, length: Option<f64>) -> String {
    let round = |n: f64| if n.is_finite() { (n + 0.5).floor() } else { n };
    let first = round(start);
    let last = match length {
        Some(len) => first + round(len),
        None => f64::INFINITY,
    };
    s.chars()
        .enumerate()
        .filter(|(i, _)| {
            let p = (*i + 1) as f64;
            p >= first && p < last
        })
        .map(|(_, c)| c)
        .collect()
}
