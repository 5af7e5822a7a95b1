//! # intl-bundle
//!
//! Per-language message templates with default-language fallback:
//!
//! - **Compiled Catalogs**: every template is parsed when its language is added
//! - **Atomic Registration**: one broken template rejects the whole language
//! - **Fallback Rendering**: missing translations use the default language
//! - **Completeness Audit**: lists the messages each language still lacks
//! - **Host Functions**: templates call named functions supplied by the host
//! - **Thread Safe**: a built bundle can be shared behind an `Arc`
//!
//! ## Quick Start
//!
//! ```rust
//! use intl_bundle::{helpers, Bundle, MessageKey};
//! use serde_json::json;
//!
//! const GREETING: MessageKey = MessageKey::new("Greeting");
//! const INBOX: MessageKey = MessageKey::new("Inbox");
//!
//! let mut bundle = Bundle::new("en");
//! bundle.install_functions(helpers::install_standard).unwrap();
//! bundle
//!     .add_language(
//!         "en",
//!         [
//!             (GREETING, "Hello, {{.Name}}!"),
//!             (INBOX, "{{.Count}} new message{{s .Count}}"),
//!         ],
//!     )
//!     .unwrap();
//! bundle
//!     .add_language("fr", [(GREETING, "Bonjour, {{.Name}}!")])
//!     .unwrap();
//! bundle.seal();
//!
//! assert_eq!(
//!     bundle.render("fr", GREETING, &json!({ "Name": "Ana" })).unwrap(),
//!     "Bonjour, Ana!"
//! );
//! // "fr" has no Inbox message yet: English is used.
//! assert_eq!(
//!     bundle.render("fr", INBOX, &json!({ "Count": 3 })).unwrap(),
//!     "3 new messages"
//! );
//! assert_eq!(bundle.check_completeness()["fr"], vec![INBOX]);
//! ```
//!
//! ## Features
//!
//! ### Templates
//! Message bodies use a small template language: field interpolation
//! (`{{.Txn.Amount}}`), conditionals, `range` and `with` blocks, variables,
//! pipelines and `printf` formatting. See [`Template`] for the grammar.
//!
//! ### Fallback
//! Lookup order for `render(language, key, data)`:
//! 1. The template registered for `key` in `language`
//! 2. The template registered for `key` in the default language
//! 3. [`RenderError::MissingKey`]; never empty output
//!
//! ### Missing data
//! By default a template reading a field absent from the data fails with
//! [`ExecError::MissingField`]. Set [`MissingKeyPolicy::Zero`] in
//! [`BundleConfig`] to render such fields as empty instead.

mod bundle;
mod catalog;
mod config;
mod error;
mod funcs;
pub mod helpers;
mod key;
mod template;

pub use bundle::Bundle;
pub use catalog::{entries_from_json, Catalog};
pub use config::{BundleConfig, MissingKeyPolicy};
pub use error::{BundleError, CompileError, ExecError, ParseError, RenderError, SourceError};
pub use funcs::{Function, FunctionError, FunctionRegistry};
pub use key::MessageKey;
pub use template::Template;
