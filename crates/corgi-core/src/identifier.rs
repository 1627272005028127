//! Identifier management using string interning.
//!
//! Mixin, block, parameter and namespace names are compared constantly while
//! linking, so they are stored as [`Id`]s backed by a process-wide interner.

use std::{
    fmt,
    sync::{Mutex, OnceLock},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use string_interner::{DefaultStringInterner, DefaultSymbol};

/// Global string interner for identifier storage.
///
/// # Thread Safety
///
/// The linker binds files on several threads, so access goes through a `Mutex`.
static INTERNER: OnceLock<Mutex<DefaultStringInterner>> = OnceLock::new();

fn with_interner<R>(f: impl FnOnce(&mut DefaultStringInterner) -> R) -> R {
    let mut interner = INTERNER
        .get_or_init(|| Mutex::new(DefaultStringInterner::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut interner)
}

/// Interned identifier.
///
/// # Examples
///
/// ```
/// use corgi_core::identifier::Id;
///
/// let button = Id::new("Button");
/// assert!(button.is_exported());
/// assert_eq!(button, "Button");
///
/// let helper = Id::new("helper");
/// assert!(!helper.is_exported());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(DefaultSymbol);

impl Id {
    /// Creates an `Id` from a name, interning it if needed.
    pub fn new(name: &str) -> Self {
        Self(with_interner(|interner| interner.get_or_intern(name)))
    }

    /// The name of the default content block, `_`.
    pub fn content_block() -> Self {
        Self::new("_")
    }

    /// Returns the interned string.
    pub fn as_string(&self) -> String {
        with_interner(|interner| interner.resolve(self.0).unwrap_or_default().to_string())
    }

    /// Returns `true` if the first character is upper case.
    ///
    /// Exported mixins may be called from other libraries; unexported ones
    /// only resolve through lexical scopes.
    pub fn is_exported(&self) -> bool {
        with_interner(|interner| {
            interner
                .resolve(self.0)
                .and_then(|name| name.chars().next())
                .is_some_and(char::is_uppercase)
        })
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<&str> for Id {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl PartialEq<str> for Id {
    fn eq(&self, other: &str) -> bool {
        with_interner(|interner| interner.resolve(self.0) == Some(other))
    }
}

impl PartialEq<&str> for Id {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::new(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_name_same_id() {
        assert_eq!(Id::new("card"), Id::new("card"));
        assert_ne!(Id::new("card"), Id::new("Card"));
    }

    #[test]
    fn test_is_exported() {
        assert!(Id::new("Card").is_exported());
        assert!(Id::new("Ärger").is_exported());
        assert!(!Id::new("card").is_exported());
        assert!(!Id::new("_").is_exported());
        assert!(!Id::new("").is_exported());
    }

    #[test]
    fn test_display_and_compare() {
        let id = Id::new("greeting");
        assert_eq!(id.to_string(), "greeting");
        assert_eq!(id, "greeting");
        assert_eq!(Id::content_block(), "_");
    }
}
