//! The message template language.
//!
//! Templates are plain text with actions between `{{` and `}}`:
//!
//! - `{{.Name}}`, `{{.Txn.Hash}}`, `{{$}}`, `{{$var.Field}}` interpolate data
//! - `{{if .X}}…{{else if .Y}}…{{else}}…{{end}}` branch on truthiness
//! - `{{range .List}}…{{else}}nothing{{end}}` iterates, `$i, $e :=` binds
//! - `{{with .X}}…{{end}}` rebinds `.`
//! - `{{printf "%.2f" .Amount}}` formats numbers
//! - `{{.Name | lower}}` pipes into host functions
//! - `{{- ` and ` -}}` trim surrounding whitespace, `{{/* … */}}` is a comment
//!
//! `range` visits arrays in order and objects in sorted key order, as do
//! printed objects. Ranging over an integer `n` counts from 0 to `n - 1`;
//! counts above one million fail with [`ExecError::RangeTooLarge`].
//!
//! Parsing checks that every called function exists in the
//! [`FunctionRegistry`] and that every variable is declared. A host function
//! registered under a built-in name replaces the built-in.

mod exec;
mod format;
mod lexer;
mod parse;

use serde_json::Value;

use crate::config::MissingKeyPolicy;
use crate::error::{ExecError, ParseError};
use crate::funcs::FunctionRegistry;
use parse::Node;

/// A parsed, immutable message template.
///
/// # Example
///
/// ```rust
/// use intl_bundle::{FunctionRegistry, MissingKeyPolicy, Template};
/// use serde_json::json;
///
/// let functions = FunctionRegistry::new();
/// let template = Template::parse(
///     "Invoice",
///     "Payment request for {{.Sats}} sat{{if .Memo}}: {{.Memo}}{{end}}.",
///     &functions,
/// )
/// .unwrap();
///
/// let text = template
///     .render(&json!({ "Sats": 320, "Memo": "" }), &functions, MissingKeyPolicy::Error)
///     .unwrap();
/// assert_eq!(text, "Payment request for 320 sat.");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    name: String,
    source: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Parses `source`, resolving function names against `functions`.
    pub fn parse(
        name: impl Into<String>,
        source: impl Into<String>,
        functions: &FunctionRegistry,
    ) -> Result<Self, ParseError> {
        let source = source.into();
        let nodes = parse::parse(lexer::lex(&source)?, functions)?;
        Ok(Self {
            name: name.into(),
            source,
            nodes,
        })
    }

    /// Name given at parse time, usually the message key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The source text this template was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the template against `data`.
    ///
    /// `functions` must provide every host function that was available
    /// when the template was parsed. Output is all-or-nothing.
    pub fn render(
        &self,
        data: &Value,
        functions: &FunctionRegistry,
        missing_key: MissingKeyPolicy,
    ) -> Result<String, ExecError> {
        exec::execute(&self.nodes, data, functions, missing_key)
    }
}
