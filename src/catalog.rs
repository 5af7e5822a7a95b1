//! Per-language catalogs of compiled templates.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{CompileError, SourceError};
use crate::funcs::FunctionRegistry;
use crate::key::MessageKey;
use crate::template::Template;

/// Compiled templates of one language, indexed by [`MessageKey`].
///
/// Keys iterate in the order they were first supplied to [`Catalog::compile`].
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    language: String,
    templates: HashMap<MessageKey, Template>,
    order: Vec<MessageKey>,
}

impl Catalog {
    /// Compiles every raw template for `language`.
    ///
    /// Compilation is all-or-nothing: the first entry that fails to parse
    /// aborts the whole catalog. When a key is supplied twice the later
    /// template wins.
    ///
    /// # Example
    ///
    /// ```rust
    /// use intl_bundle::{Catalog, FunctionRegistry, MessageKey};
    ///
    /// const YES: MessageKey = MessageKey::new("Yes");
    /// const BROKEN: MessageKey = MessageKey::new("Broken");
    ///
    /// let functions = FunctionRegistry::new();
    /// let catalog = Catalog::compile("es", [(YES, "Sí")], &functions).unwrap();
    /// assert!(catalog.contains(YES));
    ///
    /// let err = Catalog::compile("es", [(YES, "Sí"), (BROKEN, "{{if .X}}")], &functions).unwrap_err();
    /// assert_eq!(err.key, BROKEN);
    /// ```
    pub fn compile<I, S>(
        language: impl Into<String>,
        entries: I,
        functions: &FunctionRegistry,
    ) -> Result<Self, CompileError>
    where
        I: IntoIterator<Item = (MessageKey, S)>,
        S: Into<String>,
    {
        let language = language.into();
        let entries = entries.into_iter();
        let mut templates = HashMap::with_capacity(entries.size_hint().0);
        let mut order = Vec::with_capacity(entries.size_hint().0);

        for (key, source) in entries {
            let template = Template::parse(key.as_str(), source, functions).map_err(|source| {
                CompileError {
                    language: language.clone(),
                    key,
                    source,
                }
            })?;
            if templates.insert(key, template).is_none() {
                order.push(key);
            }
        }

        Ok(Self {
            language,
            templates,
            order,
        })
    }

    /// Language this catalog was compiled for.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// The template for `key`, if this language has one.
    pub fn get(&self, key: MessageKey) -> Option<&Template> {
        self.templates.get(&key)
    }

    pub fn contains(&self, key: MessageKey) -> bool {
        self.templates.contains_key(&key)
    }

    /// Keys in the order they were first supplied.
    pub fn keys(&self) -> impl Iterator<Item = MessageKey> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Reads raw entries from a JSON object mapping key names to templates.
///
/// Only names listed in `known` are accepted, so a typo in a catalog file is
/// reported instead of silently producing an unreachable message. Entries
/// keep the document's order.
///
/// ```rust
/// use intl_bundle::{entries_from_json, MessageKey};
/// use serde_json::json;
///
/// const YES: MessageKey = MessageKey::new("Yes");
/// const NO: MessageKey = MessageKey::new("No");
///
/// let entries = entries_from_json(&json!({ "Yes": "Ja", "No": "Nein" }), &[YES, NO]).unwrap();
/// assert_eq!(entries, vec![(YES, "Ja".to_string()), (NO, "Nein".to_string())]);
/// ```
pub fn entries_from_json(
    document: &Value,
    known: &[MessageKey],
) -> Result<Vec<(MessageKey, String)>, SourceError> {
    let object = match document {
        Value::Object(object) => object,
        Value::Null => return Err(SourceError::NotAnObject("null")),
        Value::Bool(_) => return Err(SourceError::NotAnObject("a boolean")),
        Value::Number(_) => return Err(SourceError::NotAnObject("a number")),
        Value::String(_) => return Err(SourceError::NotAnObject("a string")),
        Value::Array(_) => return Err(SourceError::NotAnObject("an array")),
    };

    object
        .iter()
        .map(|(name, value)| {
            let key = known
                .iter()
                .copied()
                .find(|key| key.as_str() == name)
                .ok_or_else(|| SourceError::UnknownKey(name.clone()))?;
            let template = value
                .as_str()
                .ok_or_else(|| SourceError::NotAString(name.clone()))?;
            Ok((key, template.to_owned()))
        })
        .collect()
}
