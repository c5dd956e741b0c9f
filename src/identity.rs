//! Party identities.

use std::fmt;

/// Opaque identity of a client, worker, verifier or caller.
///
/// The empty identity is the "unset" identity. It never satisfies an
/// authorization check, not even against another unset identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Identity(String);

impl Identity {
    /// Creates an identity, trimming surrounding whitespace.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Identity(name.trim().to_string())
    }

    pub fn unset() -> Self {
        Identity(String::new())
    }

    pub fn is_unset(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Maps the unset identity to `None`.
    pub fn into_option(self) -> Option<Identity> {
        if self.is_unset() {
            None
        } else {
            Some(self)
        }
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Identity::new(name)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unset() {
            f.write_str("<unset>")
        } else {
            f.write_str(&self.0)
        }
    }
}
