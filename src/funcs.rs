//! The host-supplied function namespace templates may call into.
//!
//! Functions are registered by name before the catalogs that use them are
//! compiled; a template naming a function that is neither built in nor
//! registered fails to compile.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Failure reported by a host function.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FunctionError {
    /// Wrong number of arguments.
    #[error("wrong number of args: want {expected}, got {got}")]
    Arity { expected: usize, got: usize },
    /// An argument had an unusable type.
    #[error("expected {expected}, got {got}")]
    Type { expected: &'static str, got: String },
    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

impl FunctionError {
    /// Checks that exactly `expected` arguments were passed.
    pub fn check_arity(args: &[Value], expected: usize) -> Result<(), Self> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(Self::Arity {
                expected,
                got: args.len(),
            })
        }
    }

    /// Builds a [`FunctionError::Type`] describing `got`.
    pub fn wrong_type(expected: &'static str, got: &Value) -> Self {
        Self::Type {
            expected,
            got: got.to_string(),
        }
    }
}

/// A named callable usable from template bodies.
///
/// Any `Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync` closure
/// implements this trait. Piped values arrive as the last argument.
pub trait Function: Send + Sync {
    /// Invokes the function.
    fn call(&self, args: &[Value]) -> Result<Value, FunctionError>;
}

impl<F> Function for F
where
    F: Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync,
{
    fn call(&self, args: &[Value]) -> Result<Value, FunctionError> {
        self(args)
    }
}

/// Names the template language reserves for its built-in functions.
pub(crate) const BUILTINS: &[&str] = &[
    "and", "or", "not", "len", "index", "eq", "ne", "lt", "le", "gt", "ge", "print", "printf",
    "println",
];

/// Named function registry shared by every catalog of a bundle.
///
/// # Example
///
/// ```rust
/// use intl_bundle::{FunctionError, FunctionRegistry};
/// use serde_json::{json, Value};
///
/// let mut functions = FunctionRegistry::new();
/// functions.register("double", |args: &[Value]| {
///     FunctionError::check_arity(args, 1)?;
///     let n = args[0].as_i64().ok_or_else(|| FunctionError::wrong_type("integer", &args[0]))?;
///     Ok(json!(n * 2))
/// });
///
/// assert!(functions.contains("double"));
/// assert!(functions.contains("printf"));
/// assert!(!functions.contains("triple"));
/// ```
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, Arc<dyn Function>>,
}

impl FunctionRegistry {
    /// Empty registry; only the built-ins are available.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a closure under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        self.register_function(name, function);
    }

    /// Registers any [`Function`] implementation under `name`.
    ///
    /// A function registered under a built-in name such as `len` replaces the
    /// built-in for every template.
    pub fn register_function(&mut self, name: impl Into<String>, function: impl Function + 'static) {
        let name = name.into();
        if BUILTINS.contains(&name.as_str()) {
            debug!("Host function '{}' overrides the built-in", name);
        }
        self.functions.insert(name, Arc::new(function));
    }

    /// Whether templates may call `name`.
    pub fn contains(&self, name: &str) -> bool {
        BUILTINS.contains(&name) || self.functions.contains_key(name)
    }

    /// Looks up a host function. Built-ins are not returned unless overridden.
    pub fn get(&self, name: &str) -> Option<&dyn Function> {
        self.functions.get(name).map(|function| function.as_ref())
    }

    /// Names of the registered host functions, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.functions.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registered_closures_are_callable() {
        let mut functions = FunctionRegistry::new();
        functions.register("answer", |_: &[Value]| Ok(json!(42)));

        let answer = functions.get("answer").unwrap();
        assert_eq!(answer.call(&[]).unwrap(), json!(42));
    }

    #[test]
    fn builtins_are_known_but_not_returned() {
        let functions = FunctionRegistry::new();
        assert!(functions.contains("len"));
        assert!(functions.get("len").is_none());
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut functions = FunctionRegistry::new();
        functions.register("f", |_: &[Value]| Ok(json!(1)));
        functions.register("f", |_: &[Value]| Ok(json!(2)));

        assert_eq!(functions.names().collect::<Vec<_>>(), vec!["f"]);
        assert_eq!(functions.get("f").unwrap().call(&[]).unwrap(), json!(2));
    }

    #[test]
    fn arity_check_reports_counts() {
        let err = FunctionError::check_arity(&[json!(1)], 2).unwrap_err();
        assert_eq!(err, FunctionError::Arity { expected: 2, got: 1 });
    }
}
