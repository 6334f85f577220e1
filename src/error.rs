//! Error types for schema compilation and document validation

use thiserror::Error;

use crate::diagnostics::Severity;
use crate::preprocess::Stage;

/// Result type for crate-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error, combining every failure a caller of the crate can see
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error(transparent)]
    Config(#[from] config_crate::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to parse an XML document into a tree
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XmlError {
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { message: String, position: u64 },

    #[error("Unbound namespace prefix '{prefix}' on <{name}>")]
    UnboundPrefix { prefix: String, name: String },

    #[error("Mismatched end tag: expected </{expected}>, found </{found}>")]
    MismatchedEndTag { expected: String, found: String },

    #[error("Unclosed element <{0}> at end of input")]
    UnexpectedEof(String),

    #[error("Document has more than one root element")]
    MultipleRoots,

    #[error("Document has no root element")]
    EmptyDocument,

    #[error("Document is not valid UTF-8")]
    Encoding,
}

/// Failure to compile or evaluate an XPath expression
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XPathError {
    #[error("Invalid expression '{expr}': {message}")]
    Syntax { expr: String, message: String },

    #[error("Unknown function {0}()")]
    UnknownFunction(String),

    #[error("Function {name}() expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: String,
        found: usize,
    },

    #[error("Undeclared namespace prefix '{0}'")]
    UnboundPrefix(String),

    #[error("Undefined variable ${0}")]
    UndefinedVariable(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Invalid regular expression '{pattern}': {message}")]
    Regex { pattern: String, message: String },
}

/// Failure to fetch a resource through a resolver
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Could not read resource {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Schema compilation errors. Fatal for the owning validator: no partial
/// program is ever produced.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Resource not found: {resource}")]
    ResourceNotFound { resource: String },

    #[error("Could not resolve {resource}: {source}")]
    Resolve {
        resource: String,
        #[source]
        source: ResolveError,
    },

    #[error("Invalid preprocessor program {program}: {reason}")]
    InvalidProgram { program: String, reason: String },

    #[error("Preprocessor program {program} is a {found} program, stage {stage} needs {expected}")]
    ProgramKindMismatch {
        program: String,
        stage: Stage,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Malformed XML in {resource}: {source}")]
    MalformedXml {
        resource: String,
        #[source]
        source: XmlError,
    },

    #[error("{severity} during {stage} of {schema}: {message}")]
    Stage {
        schema: String,
        stage: Stage,
        severity: Severity,
        message: String,
    },
}

impl CompileError {
    pub(crate) fn from_resolve(resource: &str, err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound(path) => CompileError::ResourceNotFound { resource: path },
            other => CompileError::Resolve {
                resource: resource.to_string(),
                source: other,
            },
        }
    }
}

/// Per-document execution errors. Only the document being checked fails;
/// the compiled program stays usable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Document is not well-formed: {0}")]
    MalformedDocument(#[from] XmlError),

    #[error("Evaluation of '{expr}' failed: {source}")]
    Evaluation {
        expr: String,
        #[source]
        source: XPathError,
    },

    #[error("Entry {0} has no metadata to validate")]
    MissingMetadata(String),
}

/// A document was checked successfully but the report is invalid
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ValidationFailure {
    /// Aggregated human-readable message
    pub message: String,
    /// Error messages, in report order
    pub errors: Vec<String>,
    /// Warning messages, in report order (empty when warnings are suppressed)
    pub warnings: Vec<String>,
    /// Batch entry number (1-based) when validating a batch
    pub entry: Option<usize>,
}

/// Outcome of a failed `validate` call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Failed(#[from] ValidationFailure),
}

/// Stops the host ingest pipeline
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct StopProcessing(pub String);
