//! Type definitions for message bus

use serde::{Deserialize, Serialize};
use std::fmt;

/// Publish topic (NATS subject)
///
/// Topics are deterministic per event type; the dispatcher never invents
/// topics at publish time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic(String);

impl Topic {
    /// Create a topic, sanitizing characters NATS subjects reject
    pub fn new(topic: impl AsRef<str>) -> Self {
        Self(sanitize_subject(topic.as_ref()))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Topic::new(s)
    }
}

/// Sanitize string for use in a NATS subject (dots are segment separators
/// and pass through)
fn sanitize_subject(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
