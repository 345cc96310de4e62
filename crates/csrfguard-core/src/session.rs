//! Session map handle
//!
//! The host's session layer owns persistence and serialization. It places a
//! [`Session`] into the request extensions before CSRF protection runs and
//! writes it back after the response is produced. CSRF protection only reads
//! and writes string entries through the shared handle.

use dashmap::DashMap;
use std::sync::Arc;

/// Shared, read-write view of the current request's session entries.
///
/// Clones share the same underlying map, so a token written by the CSRF layer
/// is visible to the host's session layer once the response is on its way out.
///
/// # Example
///
/// ```rust
/// use csrfguard_core::Session;
///
/// let session = Session::new();
/// session.insert("csrfToken", "abc");
///
/// let view = session.clone();
/// assert_eq!(view.get("csrfToken").as_deref(), Some("abc"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Session {
    entries: Arc<DashMap<String, String>>,
}

impl Session {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Store `value` under `key`, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Remove the entry stored under `key`.
    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    /// Check whether an entry exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the session has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Session
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let session = Session::new();
        for (key, value) in iter {
            session.insert(key, value);
        }
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_entries() {
        let session = Session::new();
        let other = session.clone();

        other.insert("csrfToken", "value");
        assert_eq!(session.get("csrfToken").as_deref(), Some("value"));

        assert_eq!(session.remove("csrfToken").as_deref(), Some("value"));
        assert!(other.is_empty());
    }

    #[test]
    fn test_from_iter() {
        let session: Session = [("user", "42"), ("csrfToken", "t")].into_iter().collect();
        assert_eq!(session.len(), 2);
        assert!(session.contains_key("user"));
    }
}
