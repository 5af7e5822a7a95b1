//! Symbolic message identifiers.

use std::fmt;

/// Identifier naming one logical user-facing message.
///
/// Keys are identical across every language and are meant to be declared
/// once, as constants, by the host application:
///
/// ```rust
/// use intl_bundle::MessageKey;
///
/// pub const GREETING: MessageKey = MessageKey::new("Greeting");
/// pub const FAREWELL: MessageKey = MessageKey::new("Farewell");
///
/// assert_eq!(GREETING.as_str(), "Greeting");
/// assert_ne!(GREETING, FAREWELL);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageKey(&'static str);

impl MessageKey {
    /// Creates a key from its symbolic name.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The symbolic name of this key.
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl AsRef<str> for MessageKey {
    fn as_ref(&self) -> &str {
        self.0
    }
}
