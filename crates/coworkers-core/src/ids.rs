//! Newtype identifiers shared across the framework.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The name of a declared queue, as registered via `QueueRegistry::queue`.
///
/// Queue names are opaque, non-empty strings; the registry is the only
/// place that validates them, so the newtype itself does not reject
/// anything -- it exists to stop a raw `String` from being passed where a
/// queue name, a routing key, or an exchange name is expected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueName(String);

impl QueueName {
    /// Wraps a raw string as a queue name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the queue name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for QueueName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for QueueName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// The broker-issued identifier for a live consumer binding.
///
/// Opaque from this crate's point of view -- it is produced by the
/// transport collaborator's `assert_and_consume` and is only ever handed
/// back to `cancel_consumer`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumerTag(String);

impl ConsumerTag {
    /// Wraps a raw string as a consumer tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the consumer tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A process-local identifier assigned to each inbound message, time-ordered
/// via UUID v7 so it doubles as a correlation key in logs.
///
/// Distinct from the AMQP envelope's own `correlation_id` header, which is
/// set by the publisher and may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Creates a new unique correlation ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_name_round_trips_through_display() {
        let name = QueueName::new("orders.created");
        assert_eq!(name.as_str(), "orders.created");
        assert_eq!(name.to_string(), "orders.created");
    }

    #[test]
    fn correlation_ids_are_unique() {
        let a = CorrelationId::new();
        let b = CorrelationId::new();
        assert_ne!(a, b);
    }
}
