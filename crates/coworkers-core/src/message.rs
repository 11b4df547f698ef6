//! The inbound message type handed to middleware.

use crate::ids::QueueName;
use bytes::Bytes;
use std::collections::HashMap;

/// A message delivered by the broker to a consumer.
///
/// Carries the raw payload plus the AMQP 0-9-1 envelope fields middleware
/// need to make routing, reply, and acknowledgement decisions. The
/// transport collaborator is responsible for populating this from whatever
/// wire representation the underlying client library uses.
#[derive(Debug, Clone)]
pub struct Message {
    /// The queue this message was delivered on.
    pub queue: QueueName,
    /// The raw message body.
    pub content: Bytes,
    /// The broker-assigned delivery tag, used to ack/nack this specific delivery.
    pub delivery_tag: u64,
    /// Whether the broker has redelivered this message after a prior nack/requeue.
    pub redelivered: bool,
    /// The exchange the message was originally published to.
    pub exchange: String,
    /// The routing key the message was published with.
    pub routing_key: String,
    /// The `reply_to` queue/routing-key a responder should publish a reply to, if any.
    pub reply_to: Option<String>,
    /// The publisher-supplied correlation ID, used to match replies to requests.
    pub correlation_id: Option<String>,
    /// Free-form headers attached by the publisher.
    pub headers: HashMap<String, String>,
}

impl Message {
    /// Builds a message from its required fields, with empty headers and no reply metadata.
    #[must_use]
    pub fn new(
        queue: impl Into<QueueName>,
        content: impl Into<Bytes>,
        delivery_tag: u64,
    ) -> Self {
        Self {
            queue: queue.into(),
            content: content.into(),
            delivery_tag,
            redelivered: false,
            exchange: String::new(),
            routing_key: String::new(),
            reply_to: None,
            correlation_id: None,
            headers: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_has_empty_metadata() {
        let msg = Message::new("orders", Bytes::from_static(b"{}"), 1);
        assert_eq!(msg.queue.as_str(), "orders");
        assert!(!msg.redelivered);
        assert!(msg.reply_to.is_none());
        assert!(msg.headers.is_empty());
    }
}
