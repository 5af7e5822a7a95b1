//! Error types surfaced by the bundle.
//!
//! | Failure | Raised by | Meaning |
//! |---------|-----------|---------|
//! | [`CompileError`] | [`Bundle::add_language`](crate::Bundle::add_language) | A template failed to parse; nothing was installed |
//! | [`RenderError::MissingKey`] | [`Bundle::render`](crate::Bundle::render) | Neither the requested nor the default language has the key |
//! | [`RenderError::Execution`] | [`Bundle::render`](crate::Bundle::render) | The template could not be evaluated against the data |
//! | [`BundleError::Sealed`] | registration after [`Bundle::seal`](crate::Bundle::seal) | The bundle no longer accepts changes |

use thiserror::Error;

use crate::funcs::FunctionError;
use crate::key::MessageKey;

/// A template source could not be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("line {line}: {reason}")]
pub struct ParseError {
    /// 1-based line of the template source where parsing stopped.
    pub line: usize,
    /// Human readable description of the problem.
    pub reason: String,
}

impl ParseError {
    pub(crate) fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// Compilation of a language catalog failed.
///
/// Names the first offending entry; no catalog is produced for the language.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("template `{key}` for language `{language}` failed to compile: {source}")]
pub struct CompileError {
    /// Language whose catalog was being compiled.
    pub language: String,
    /// Message whose template failed to parse.
    pub key: MessageKey,
    /// The underlying parse failure.
    #[source]
    pub source: ParseError,
}

/// A compiled template failed while being evaluated.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecError {
    /// A field was looked up on an object that does not have it.
    #[error("line {line}: map has no entry for key `{field}`")]
    MissingField { field: String, line: usize },
    /// A field was looked up on something that is not an object.
    #[error("line {line}: can't evaluate field `{field}` in type {kind}")]
    NotAnObject {
        field: String,
        kind: &'static str,
        line: usize,
    },
    /// `range` was given something it cannot iterate.
    #[error("line {line}: range can't iterate over {kind}")]
    NotIterable { kind: &'static str, line: usize },
    /// `range` was given an integer above the iteration limit.
    #[error("line {line}: range count {count} exceeds the limit of {limit}")]
    RangeTooLarge { count: u64, limit: u64, line: usize },
    /// A built-in function rejected its arguments.
    #[error("line {line}: error calling {name}: {reason}")]
    Builtin {
        name: &'static str,
        reason: String,
        line: usize,
    },
    /// A host function returned an error.
    #[error("line {line}: error calling {name}: {source}")]
    Function {
        name: String,
        #[source]
        source: FunctionError,
        line: usize,
    },
}

/// Rendering a message failed. No partial output is ever returned.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The key is absent from the requested language and the default language.
    #[error("message `{key}` is not registered for `{language}` nor for the default language")]
    MissingKey { language: String, key: MessageKey },
    /// The resolved template could not be evaluated against the data.
    #[error("rendering `{key}` in `{language}` failed: {source}")]
    Execution {
        /// Language whose template was executed.
        language: String,
        key: MessageKey,
        #[source]
        source: ExecError,
    },
    /// The data value could not be converted into a template context.
    #[error("data for `{key}` could not be serialized: {source}")]
    Data {
        key: MessageKey,
        #[source]
        source: serde_json::Error,
    },
}

/// Registration on the bundle failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BundleError {
    /// A catalog did not compile; the language was not installed.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// The bundle was sealed and no longer accepts registrations.
    #[error("bundle is sealed; cannot register {what}")]
    Sealed { what: String },
}

/// A JSON catalog document did not have the expected shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The document root must be an object of key name to template.
    #[error("catalog document must be an object, found {0}")]
    NotAnObject(&'static str),
    /// A key name was not among the declared message keys.
    #[error("catalog entry `{0}` does not name a known message")]
    UnknownKey(String),
    /// A template value was not a string.
    #[error("catalog entry `{0}` must be a string")]
    NotAString(String),
}
