//! Bundle configuration.

use serde::Deserialize;

/// What a template does when it reads a field the data object lacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeyPolicy {
    /// Stop rendering with [`ExecError::MissingField`](crate::ExecError::MissingField).
    #[default]
    Error,
    /// Treat the field as `null`: prints nothing and is false in conditions.
    Zero,
}

/// Configuration for a [`Bundle`](crate::Bundle).
///
/// Controls which language is used as fallback and how strictly templates
/// treat absent data.
///
/// # Example
///
/// ```rust
/// use intl_bundle::{Bundle, BundleConfig, MissingKeyPolicy};
///
/// let config = BundleConfig {
///     default_lang: "en".to_string(),
///     missing_key: MissingKeyPolicy::Zero,
/// };
/// let bundle = Bundle::with_config(config);
/// assert_eq!(bundle.default_language(), "en");
/// ```
///
/// It can also be read from any serde format:
///
/// ```rust
/// use intl_bundle::{BundleConfig, MissingKeyPolicy};
///
/// let config: BundleConfig =
///     serde_json::from_str(r#"{ "default_lang": "es", "missing_key": "zero" }"#).unwrap();
/// assert_eq!(config.default_lang, "es");
/// assert_eq!(config.missing_key, MissingKeyPolicy::Zero);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Language used when the requested one lacks a message.
    /// Default: "en"
    pub default_lang: String,
    /// Behaviour for fields missing from the data.
    /// Default: [`MissingKeyPolicy::Error`]
    pub missing_key: MissingKeyPolicy,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            default_lang: "en".to_string(),
            missing_key: MissingKeyPolicy::default(),
        }
    }
}

impl BundleConfig {
    /// Default configuration with another fallback language.
    pub fn for_language(default_lang: impl Into<String>) -> Self {
        Self {
            default_lang: default_lang.into(),
            ..Default::default()
        }
    }
}
