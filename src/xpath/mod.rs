//! XPath engine used by compiled check programs
//!
//! Covers XPath 1.0 (all axes, predicates, the core function library) plus
//! `matches`, `replace`, `string-join`, `upper-case`, `lower-case`,
//! `exists`, `empty`, `max`, `min`, `avg`, `current()`, `*:local` name tests
//! and the `eq`/`ne`/`lt`/`le`/`gt`/`ge` operator spellings. Expressions are
//! checked statically when compiled: unknown functions, wrong arity,
//! undeclared namespace prefixes and undefined variables are all compile
//! errors, never run-time ones.

mod eval;
mod functions;
mod lexer;
mod parser;

use std::fmt;

use crate::error::XPathError;
use crate::xml::{Document, NodeId};

pub use eval::{format_number, parse_number, Bindings, EvalContext, Value};
pub use parser::StaticContext;

use parser::{Axis, Expr, NodeTest, PathExpr, PathStart, Step};

/// A compiled XPath expression
#[derive(Debug, Clone, PartialEq)]
pub struct XPath {
    source: String,
    expr: Expr,
}

impl XPath {
    pub fn compile(source: &str, ctx: &StaticContext) -> Result<Self, XPathError> {
        let expr = parser::parse_expr(source, ctx)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Compile a rule context. Relative location paths are anchored
    /// anywhere in the document, so `item` matches every `item` element.
    pub fn compile_pattern(source: &str, ctx: &StaticContext) -> Result<Self, XPathError> {
        let expr = anchor_pattern(parser::parse_expr(source, ctx)?);
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Value, XPathError> {
        eval::evaluate(&self.expr, ctx)
    }

    pub fn evaluate_boolean(&self, ctx: &EvalContext<'_>) -> Result<bool, XPathError> {
        Ok(self.evaluate(ctx)?.to_boolean())
    }

    pub fn evaluate_string(&self, ctx: &EvalContext<'_>) -> Result<String, XPathError> {
        Ok(self.evaluate(ctx)?.to_string_value(ctx.doc))
    }

    /// Nodes selected by this expression from the document root
    pub fn select_from_root(&self, doc: &Document, bindings: &Bindings) -> Result<Vec<NodeId>, XPathError> {
        let ctx = EvalContext::new(doc, doc.root(), bindings);
        self.evaluate(&ctx)?.into_nodes(&format!("'{}'", self.source))
    }
}

impl fmt::Display for XPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn anchor_pattern(expr: Expr) -> Expr {
    match expr {
        Expr::Union(l, r) => Expr::Union(Box::new(anchor_pattern(*l)), Box::new(anchor_pattern(*r))),
        Expr::Path(PathExpr {
            start: PathStart::Context,
            steps,
        }) => {
            let mut anchored = vec![Step {
                axis: Axis::DescendantOrSelf,
                test: NodeTest::Node,
                predicates: Vec::new(),
            }];
            anchored.extend(steps);
            Expr::Path(PathExpr {
                start: PathStart::Root,
                steps: anchored,
            })
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<library xmlns:ex="urn:ex">
  <book id="b1" year="1999"><title>Alpha</title><price>10</price></book>
  <book id="b2" year="2005"><title>  Beta  Gamma </title><price>25.5</price></book>
  <book id="b3"><title/><price>x</price><ex:note>n</ex:note></book>
</library>"#;

    fn eval(expr: &str) -> Value {
        let doc = Document::parse(DOC).unwrap();
        let ctx = StaticContext::new().with_namespace("ex", "urn:ex");
        let xpath = XPath::compile(expr, &ctx).unwrap();
        let bindings = Bindings::new();
        let value = xpath.evaluate(&EvalContext::new(&doc, doc.root(), &bindings)).unwrap();
        match value {
            Value::Nodes(nodes) => Value::String(
                nodes.iter().map(|n| doc.string_value(*n)).collect::<Vec<_>>().join("|"),
            ),
            other => other,
        }
    }

    fn string(expr: &str) -> String {
        match eval(expr) {
            Value::String(s) => s,
            other => panic!("{} gave {:?}", expr, other),
        }
    }

    fn boolean(expr: &str) -> bool {
        match eval(expr) {
            Value::Boolean(b) => b,
            other => panic!("{} gave {:?}", expr, other),
        }
    }

    fn number(expr: &str) -> f64 {
        match eval(expr) {
            Value::Number(n) => n,
            other => panic!("{} gave {:?}", expr, other),
        }
    }

    #[test]
    fn test_paths_and_predicates() {
        assert_eq!(string("/library/book[2]/title"), "  Beta  Gamma ");
        assert_eq!(string("//book[@year > 2000]/@id"), "b2");
        assert_eq!(string("//book[last()]/@id"), "b3");
        assert_eq!(string("//title[. = 'Alpha']/../@id"), "b1");
        assert_eq!(string("//ex:note"), "n");
        assert_eq!(string("//*:note"), "n");
        assert_eq!(string("//book[not(@year)]/@id"), "b3");
        assert_eq!(string("(//book)[1]/@id"), "b1");
    }

    #[test]
    fn test_axes() {
        assert_eq!(string("//price[1]/preceding-sibling::title"), "Alpha|  Beta  Gamma |");
        assert_eq!(string("//book[@id='b1']/following-sibling::book[1]/@id"), "b2");
        assert_eq!(string("//book[@id='b3']/preceding::book[1]/@id"), "b2");
        assert_eq!(string("//title[. = 'Alpha']/ancestor::*[last()]/book[3]/@id"), "b3");
        assert_eq!(number("count(//book[@id='b1']/following::*)"), 7.0);
        assert_eq!(number("count(//book/descendant-or-self::*)"), 10.0);
    }

    #[test]
    fn test_comparisons() {
        assert!(boolean("//price > 20"));
        assert!(boolean("//book/@id = 'b2'"));
        assert!(boolean("//book/@id != 'b2'"));
        assert!(!boolean("//missing = ''"));
        assert!(boolean("1 = true()"));
        assert!(boolean("'1.0' = 1"));
        assert!(boolean("count(//book) eq 3"));
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(string("normalize-space(//book[2]/title)"), "Beta Gamma");
        assert_eq!(string("concat('a', 1, true())"), "a1true");
        assert_eq!(string("substring-before('2024-01-02', '-')"), "2024");
        assert_eq!(string("substring-after('2024-01-02', '-')"), "01-02");
        assert_eq!(string("translate('abc', 'abc', 'AB')"), "AB");
        assert_eq!(string("upper-case('x')"), "X");
        assert_eq!(string("replace('a1b22', '[0-9]+', '#')"), "a#b#");
        assert_eq!(string("string-join(//book/@id, ',')"), "b1,b2,b3");
        assert_eq!(string("name(//ex:note)"), "ex:note");
        assert_eq!(string("local-name(//ex:note)"), "note");
        assert_eq!(string("namespace-uri(//ex:note)"), "urn:ex");
        assert!(boolean("matches(//book[1]/@id, '^b[0-9]$')"));
        assert!(boolean("starts-with('schematron', 'schema')"));
        assert!(boolean("ends-with('schematron', 'tron')"));
        assert_eq!(number("string-length(//book[1]/title)"), 5.0);
    }

    #[test]
    fn test_numeric_functions() {
        assert_eq!(number("sum(//book[position() < 3]/price)"), 35.5);
        assert!(number("sum(//price)").is_nan());
        assert_eq!(number("floor(2.7) + ceiling(2.1) + round(2.5)"), 8.0);
        assert_eq!(number("7 mod 3"), 1.0);
        assert_eq!(number("7 div 2"), 3.5);
        assert_eq!(number("-(3)"), -3.0);
        assert_eq!(number("max(//book/@year)"), 2005.0);
        assert_eq!(number("min(//book/@year)"), 1999.0);
    }

    #[test]
    fn test_exists_and_empty() {
        assert!(boolean("exists(//book)"));
        assert!(boolean("empty(//missing)"));
        assert!(!boolean("boolean(//missing)"));
    }

    #[test]
    fn test_variables() {
        let doc = Document::parse(DOC).unwrap();
        let ctx = StaticContext::new().with_variable("limit");
        let xpath = XPath::compile("count(//price[. > $limit])", &ctx).unwrap();
        let mut bindings = Bindings::new();
        bindings.push("limit", Value::Number(15.0));
        let value = xpath.evaluate(&EvalContext::new(&doc, doc.root(), &bindings)).unwrap();
        assert_eq!(value, Value::Number(1.0));
    }

    #[test]
    fn test_pattern_anchoring() {
        let doc = Document::parse(DOC).unwrap();
        let ctx = StaticContext::new();
        let bindings = Bindings::new();
        let pattern = XPath::compile_pattern("title | @year", &ctx).unwrap();
        assert_eq!(pattern.select_from_root(&doc, &bindings).unwrap().len(), 5);
        let absolute = XPath::compile_pattern("/library", &ctx).unwrap();
        assert_eq!(absolute.select_from_root(&doc, &bindings).unwrap().len(), 1);
    }

    #[test]
    fn test_runtime_type_error() {
        let doc = Document::parse(DOC).unwrap();
        let xpath = XPath::compile("count('x')", &StaticContext::new()).unwrap();
        let bindings = Bindings::new();
        let err = xpath.evaluate(&EvalContext::new(&doc, doc.root(), &bindings)).unwrap_err();
        assert!(matches!(err, XPathError::Type(_)));
    }
}
