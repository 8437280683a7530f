//! Counter key generation.

use crate::identity::ClientIdentity;

/// A key that uniquely identifies a window counter in the store.
///
/// Rendered as `"<namespace>:<identity>"`, e.g. `request_count:10.0.0.1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// Prefix shared by every counter of one limiter
    pub namespace: String,
    /// The client the counter belongs to
    pub identity: ClientIdentity,
}

impl CounterKey {
    /// Create a new counter key.
    pub fn new(namespace: &str, identity: &ClientIdentity) -> Self {
        Self {
            namespace: namespace.to_string(),
            identity: identity.clone(),
        }
    }

    /// The string the store sees.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.namespace, self.identity)
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}
