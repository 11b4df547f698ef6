//! The per-message context threaded through the pipeline.

use coworkers_core::{CorrelationId, Message, QueueName};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::time::Instant;

/// The acknowledgement decision a responder should act on after the
/// pipeline completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AckDecision {
    /// No middleware made an explicit decision; the responder defaults to `ack`.
    #[default]
    Unset,
    /// Acknowledge the message.
    Ack,
    /// Reject the message, optionally requeuing it.
    Nack {
        /// Whether the broker should redeliver the message.
        requeue: bool,
    },
}

/// A reply a middleware wants published back to the message's `reply_to`.
#[derive(Debug, Clone)]
pub struct Reply {
    /// The reply payload.
    pub content: bytes::Bytes,
}

/// Per-message state that flows through the middleware pipeline.
///
/// Carries the inbound [`Message`], a type-erased `state` bag middleware
/// use to pass data to one another, and the pending ack/reply decision the
/// responder reads once the pipeline finishes.
pub struct MessageContext {
    queue: QueueName,
    message: Message,
    correlation_id: CorrelationId,
    started_at: Instant,
    ack_decision: AckDecision,
    reply: Option<Reply>,
    state: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MessageContext {
    /// Creates a fresh context for an inbound message.
    #[must_use]
    pub fn new(queue: QueueName, message: Message) -> Self {
        Self {
            queue,
            message,
            correlation_id: CorrelationId::new(),
            started_at: Instant::now(),
            ack_decision: AckDecision::Unset,
            reply: None,
            state: HashMap::new(),
        }
    }

    /// Returns the queue this message was delivered on.
    #[must_use]
    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    /// Returns the inbound message.
    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Returns the process-local correlation ID assigned to this delivery.
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Returns how long this message has been in the pipeline.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Returns the pending acknowledgement decision.
    #[must_use]
    pub fn ack_decision(&self) -> &AckDecision {
        &self.ack_decision
    }

    /// Records that this message should be acked.
    pub fn ack(&mut self) {
        self.ack_decision = AckDecision::Ack;
    }

    /// Records that this message should be nacked.
    pub fn nack(&mut self, requeue: bool) {
        self.ack_decision = AckDecision::Nack { requeue };
    }

    /// Sets the reply to publish back to `reply_to` once the pipeline finishes.
    pub fn set_reply(&mut self, content: impl Into<bytes::Bytes>) {
        self.reply = Some(Reply {
            content: content.into(),
        });
    }

    /// Returns the pending reply, if any middleware set one.
    #[must_use]
    pub fn reply(&self) -> Option<&Reply> {
        self.reply.as_ref()
    }

    /// Stores a typed value in the per-message state bag.
    pub fn set_state<T: Send + Sync + 'static>(&mut self, value: T) {
        self.state.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed value from the per-message state bag.
    #[must_use]
    pub fn get_state<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.state.get(&TypeId::of::<T>()).and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed value from the per-message state bag.
    pub fn remove_state<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.state
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }
}
