//! The broker transport collaborator interface.
//!
//! Everything in this module is a black box from the rest of the
//! workspace's point of view: a real integration wires a client for its
//! broker (e.g. an AMQP 0-9-1 library) behind [`Transport`]; this crate
//! only defines the shape of that collaborator and, in [`crate::mock`],
//! an in-memory stand-in good enough to drive the lifecycle coordinator's
//! tests without a running broker.

use bytes::Bytes;
use coworkers_core::{ConsumerTag, CoworkersError, Message, QueueName};
use futures_util::stream::BoxStream;
use std::future::Future;
use std::pin::Pin;

/// A boxed future resolving to a transport result.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CoworkersError>> + Send + 'a>>;

/// A stream of inbound deliveries for one consumer.
pub type DeliveryStream = BoxStream<'static, Message>;

/// An opaque handle to a broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(pub(crate) u64);

/// An opaque handle to a logical channel on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(pub(crate) u64);

/// Socket-level options passed through verbatim to [`Transport::create_connection`].
pub type SocketOptions = serde_json::Value;

/// Queue-assertion options passed through verbatim to [`Transport::assert_and_consume`].
pub type QueueOptions = serde_json::Value;

/// Consume options passed through verbatim to [`Transport::assert_and_consume`].
pub type ConsumeOptions = serde_json::Value;

/// Publish options (exchange type, mandatory flag, etc.), passed through verbatim.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// The exchange to publish to; empty string means the default exchange.
    pub exchange: String,
    /// The routing key.
    pub routing_key: String,
    /// The publisher-supplied correlation ID, echoed by replies.
    pub correlation_id: Option<String>,
}

/// The broker transport collaborator.
///
/// Every method is async via a hand-written boxed future, matching the
/// rest of this codebase's trait-object-friendly async style rather than
/// an attribute-macro-based async trait.
pub trait Transport: Send + Sync + 'static {
    /// Opens a connection to the broker at `url`.
    fn create_connection<'a>(
        &'a self,
        url: &'a str,
        socket_options: Option<&'a SocketOptions>,
    ) -> BoxFuture<'a, ConnectionHandle>;

    /// Opens a new channel on an existing connection.
    fn create_channel<'a>(&'a self, connection: &'a ConnectionHandle) -> BoxFuture<'a, ChannelHandle>;

    /// Asserts a queue exists and attaches a consumer to it, returning the
    /// broker-issued consumer tag and a stream of its deliveries.
    fn assert_and_consume<'a>(
        &'a self,
        channel: &'a ChannelHandle,
        queue: &'a QueueName,
        queue_options: Option<&'a QueueOptions>,
        consume_options: Option<&'a ConsumeOptions>,
    ) -> BoxFuture<'a, (ConsumerTag, DeliveryStream)>;

    /// Publishes a message.
    fn publish<'a>(
        &'a self,
        channel: &'a ChannelHandle,
        content: Bytes,
        options: &'a PublishOptions,
    ) -> BoxFuture<'a, ()>;

    /// Acknowledges a delivery.
    fn ack<'a>(&'a self, channel: &'a ChannelHandle, delivery_tag: u64) -> BoxFuture<'a, ()>;

    /// Rejects a delivery, optionally requeuing it.
    fn nack<'a>(&'a self, channel: &'a ChannelHandle, delivery_tag: u64, requeue: bool) -> BoxFuture<'a, ()>;

    /// Cancels a live consumer.
    fn cancel_consumer<'a>(&'a self, channel: &'a ChannelHandle, tag: &'a ConsumerTag) -> BoxFuture<'a, ()>;

    /// Closes a channel.
    fn close_channel<'a>(&'a self, channel: ChannelHandle) -> BoxFuture<'a, ()>;

    /// Closes a connection.
    fn close_connection<'a>(&'a self, connection: ConnectionHandle) -> BoxFuture<'a, ()>;
}
