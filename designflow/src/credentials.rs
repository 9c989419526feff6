//! Shared API key handle.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A cloneable handle over one API key.
///
/// Clones share the same key, so a key set through any handle is seen by
/// every provider on its next call. The key is read before each request and
/// never validated here; an empty key is sent as-is and rejected upstream.
#[derive(Clone, Default)]
pub struct Credentials {
    api_key: Arc<RwLock<String>>,
}

impl Credentials {
    /// Creates a handle holding `api_key`.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Arc::new(RwLock::new(api_key.into())),
        }
    }

    /// Reads the key from an environment variable, empty when unset.
    #[must_use]
    pub fn from_env(var: &str) -> Self {
        Self::new(std::env::var(var).unwrap_or_default())
    }

    /// Returns the current key.
    #[must_use]
    pub fn get(&self) -> String {
        self.api_key.read().clone()
    }

    /// Replaces the key for every clone of this handle.
    pub fn set(&self, api_key: impl Into<String>) {
        *self.api_key.write() = api_key.into();
    }

    /// Returns true if no key is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.api_key.read().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &if self.is_empty() { "<unset>" } else { "<redacted>" })
            .finish()
    }
}
