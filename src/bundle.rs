//! The per-language catalog store with default-language fallback.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::catalog::Catalog;
use crate::config::BundleConfig;
use crate::error::{BundleError, RenderError};
use crate::funcs::{FunctionError, FunctionRegistry};
use crate::key::MessageKey;
use crate::template::Template;

/// One compiled catalog per language, plus the default language used as fallback.
///
/// A bundle is populated during start-up with [`add_function`](Bundle::add_function)
/// and [`add_language`](Bundle::add_language), optionally [sealed](Bundle::seal),
/// then shared read-only (for example behind an `Arc`) for rendering.
///
/// # Example
///
/// ```rust
/// use intl_bundle::{Bundle, MessageKey};
/// use serde_json::json;
///
/// const GREETING: MessageKey = MessageKey::new("Greeting");
///
/// let mut bundle = Bundle::new("en");
/// bundle.add_language("en", [(GREETING, "Hello, {{.Name}}!")]).unwrap();
/// bundle.add_language("fr", Vec::<(MessageKey, String)>::new()).unwrap();
///
/// // "fr" lacks the message, so the English template is used.
/// let text = bundle.render("fr", GREETING, &json!({ "Name": "Ana" })).unwrap();
/// assert_eq!(text, "Hello, Ana!");
///
/// bundle.add_language("fr", [(GREETING, "Bonjour, {{.Name}}!")]).unwrap();
/// let text = bundle.render("fr", GREETING, &json!({ "Name": "Ana" })).unwrap();
/// assert_eq!(text, "Bonjour, Ana!");
/// ```
#[derive(Debug, Default)]
pub struct Bundle {
    config: BundleConfig,
    catalogs: BTreeMap<String, Catalog>,
    functions: FunctionRegistry,
    sealed: bool,
}

impl Bundle {
    /// Empty bundle falling back to `default_lang`.
    pub fn new(default_lang: impl Into<String>) -> Self {
        Self::with_config(BundleConfig::for_language(default_lang))
    }

    pub fn with_config(config: BundleConfig) -> Self {
        Self {
            config,
            catalogs: BTreeMap::new(),
            functions: FunctionRegistry::new(),
            sealed: false,
        }
    }

    // ---------- Building ----------

    /// Makes `name` callable from templates compiled afterwards.
    ///
    /// Functions must be registered before the languages whose templates
    /// call them.
    pub fn add_function<F>(&mut self, name: impl Into<String>, function: F) -> Result<(), BundleError>
    where
        F: Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        let name = name.into();
        self.ensure_open(|| format!("function `{name}`"))?;
        self.functions.register(name, function);
        Ok(())
    }

    /// Gives `install` mutable access to the function namespace,
    /// e.g. [`helpers::install_standard`](crate::helpers::install_standard).
    pub fn install_functions(
        &mut self,
        install: impl FnOnce(&mut FunctionRegistry),
    ) -> Result<(), BundleError> {
        self.ensure_open(|| "functions".to_string())?;
        install(&mut self.functions);
        Ok(())
    }

    /// Compiles `entries` and installs them as the catalog for `language`.
    ///
    /// Calling this again for the same language replaces the previous catalog
    /// entirely. If any template fails to compile, the error is returned and
    /// the bundle is left exactly as it was.
    pub fn add_language<I, S>(&mut self, language: impl Into<String>, entries: I) -> Result<(), BundleError>
    where
        I: IntoIterator<Item = (MessageKey, S)>,
        S: Into<String>,
    {
        let language = language.into();
        self.ensure_open(|| format!("language `{language}`"))?;

        let catalog = Catalog::compile(language.clone(), entries, &self.functions)?;
        let count = catalog.len();
        if self.catalogs.insert(language.clone(), catalog).is_some() {
            debug!("Replaced catalog for '{}' ({} messages)", language, count);
        } else {
            debug!("Compiled catalog for '{}' ({} messages)", language, count);
        }
        Ok(())
    }

    /// Rejects every further registration. Rendering is unaffected.
    pub fn seal(&mut self) {
        if !self.sealed {
            debug!(languages = self.catalogs.len(), "Bundle sealed");
            self.sealed = true;
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    fn ensure_open(&self, what: impl FnOnce() -> String) -> Result<(), BundleError> {
        if self.sealed {
            return Err(BundleError::Sealed { what: what() });
        }
        Ok(())
    }

    // ---------- Queries ----------

    /// Gets the fallback language code.
    pub fn default_language(&self) -> &str {
        &self.config.default_lang
    }

    /// Registered languages, sorted.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.catalogs.keys().map(String::as_str)
    }

    pub fn catalog(&self, language: &str) -> Option<&Catalog> {
        self.catalogs.get(language)
    }

    /// The function namespace templates are compiled and rendered against.
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Lists, per registered language, the default-language messages it lacks.
    ///
    /// Only keys of the default catalog are considered, so a key that exists
    /// solely in other languages is never reported. Languages missing nothing
    /// are left out of the result, as is every language that was never
    /// registered. Each list follows the default catalog's key order.
    ///
    /// # Example
    ///
    /// ```rust
    /// use intl_bundle::{Bundle, MessageKey};
    ///
    /// const A: MessageKey = MessageKey::new("A");
    /// const B: MessageKey = MessageKey::new("B");
    /// const C: MessageKey = MessageKey::new("C");
    ///
    /// let mut bundle = Bundle::new("en");
    /// bundle.add_language("en", [(A, "a"), (B, "b"), (C, "c")]).unwrap();
    /// bundle.add_language("es", [(A, "a"), (C, "c")]).unwrap();
    ///
    /// let missing = bundle.check_completeness();
    /// assert_eq!(missing.len(), 1);
    /// assert_eq!(missing["es"], vec![B]);
    /// ```
    pub fn check_completeness(&self) -> BTreeMap<String, Vec<MessageKey>> {
        let Some(default) = self.catalogs.get(&self.config.default_lang) else {
            return BTreeMap::new();
        };

        self.catalogs
            .iter()
            .filter_map(|(language, catalog)| {
                let missing: Vec<MessageKey> = default
                    .keys()
                    .filter(|key| !catalog.contains(*key))
                    .collect();
                (!missing.is_empty()).then(|| (language.clone(), missing))
            })
            .collect()
    }

    /// Runs [`check_completeness`](Bundle::check_completeness) and logs one
    /// event per incomplete language. Returns the number of such languages.
    pub fn report_completeness(&self) -> usize {
        let missing = self.check_completeness();
        for (language, keys) in &missing {
            let names: Vec<&str> = keys.iter().map(|key| key.as_str()).collect();
            debug!("Language '{}' is missing {} message(s): {}", language, keys.len(), names.join(", "));
        }
        missing.len()
    }

    // ---------- Rendering ----------

    /// Renders `key` in `language`, falling back to the default language.
    ///
    /// The requested language's own template always takes precedence; the
    /// default catalog is consulted only when the language is unknown or lacks
    /// the key. Output is all-or-nothing.
    pub fn render(&self, language: &str, key: MessageKey, data: &Value) -> Result<String, RenderError> {
        let (resolved, template) = self.resolve(language, key).ok_or_else(|| RenderError::MissingKey {
            language: language.to_string(),
            key,
        })?;

        template
            .render(data, &self.functions, self.config.missing_key)
            .map_err(|source| RenderError::Execution {
                language: resolved.to_string(),
                key,
                source,
            })
    }

    /// Like [`render`](Bundle::render), converting any serializable `data` first.
    ///
    /// ```rust
    /// use intl_bundle::{Bundle, MessageKey};
    /// use serde::Serialize;
    ///
    /// const BALANCE: MessageKey = MessageKey::new("Balance");
    ///
    /// #[derive(Serialize)]
    /// #[serde(rename_all = "PascalCase")]
    /// struct Balance {
    ///     sats: u64,
    /// }
    ///
    /// let mut bundle = Bundle::new("en");
    /// bundle.add_language("en", [(BALANCE, "Balance: {{.Sats}} sat")]).unwrap();
    /// let text = bundle.render_serialize("pt", BALANCE, &Balance { sats: 21 }).unwrap();
    /// assert_eq!(text, "Balance: 21 sat");
    /// ```
    pub fn render_serialize<T>(&self, language: &str, key: MessageKey, data: &T) -> Result<String, RenderError>
    where
        T: Serialize + ?Sized,
    {
        let data = serde_json::to_value(data).map_err(|source| RenderError::Data { key, source })?;
        self.render(language, key, &data)
    }

    fn resolve(&self, language: &str, key: MessageKey) -> Option<(&str, &Template)> {
        self.lookup(language, key).or_else(|| {
            trace!("'{}' has no '{}', using '{}'", language, key, self.config.default_lang);
            self.lookup(&self.config.default_lang, key)
        })
    }

    fn lookup(&self, language: &str, key: MessageKey) -> Option<(&str, &Template)> {
        self.catalogs
            .get(language)
            .and_then(|catalog| catalog.get(key).map(|template| (catalog.language(), template)))
    }
}
