//! Ephemeral per-connection client handles

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one joined connection so it can drop echoes of its own
/// broadcasts. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientHandle(String);

impl ClientHandle {
    /// Issue a new random (UUIDv4) handle
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ClientHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ClientHandle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_handles_are_unique() {
        let handles: HashSet<ClientHandle> = (0..1000).map(|_| ClientHandle::generate()).collect();
        assert_eq!(handles.len(), 1000);
    }

    #[test]
    fn test_handle_serializes_as_plain_string() {
        let handle = ClientHandle::from("k3j2h1");
        assert_eq!(serde_json::to_string(&handle).unwrap(), "\"k3j2h1\"");
    }
}
