//! An in-memory [`Transport`] good enough to drive the lifecycle
//! coordinator's tests without a running broker.
//!
//! Mirrors this codebase's existing in-memory HTTP test client: no real
//! network connection, but every call goes through the same interface a
//! production transport would implement.

use crate::transport::{
    BoxFuture, ChannelHandle, ConnectionHandle, ConsumeOptions, DeliveryStream, PublishOptions,
    QueueOptions, SocketOptions, Transport,
};
use bytes::Bytes;
use coworkers_core::{ConsumerTag, CoworkersError, Message, QueueName};
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

#[derive(Default)]
struct State {
    open_connections: HashMap<u64, ()>,
    open_channels: HashMap<u64, u64>,
    consumers: HashMap<String, mpsc::UnboundedSender<Message>>,
    acked: Vec<u64>,
    nacked: Vec<(u64, bool)>,
    published: Vec<(Bytes, PublishOptions)>,
    cancelled_consumers: Vec<String>,
}

/// An in-memory broker double.
///
/// Construct with [`MockTransport::new`]; use [`MockTransport::fail_connect`]
/// to make the next `create_connection` call fail (for exercising the
/// connect-rollback path), [`MockTransport::fail_assert_and_consume`] to fail
/// the next `assert_and_consume` call instead (for exercising rollback of an
/// already-open connection and channels), [`MockTransport::pause_connect`]/
/// [`MockTransport::resume_connect`] to deterministically land a `close`
/// call while a `connect` is still in flight, and
/// [`MockTransport::push_message`] to inject a delivery once a consumer has
/// been attached.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
    next_id: Arc<AtomicU64>,
    fail_connect: Arc<AtomicBool>,
    fail_assert: Arc<AtomicBool>,
    connect_paused: Arc<AtomicBool>,
    connect_notify: Arc<Notify>,
}

impl MockTransport {
    /// Creates a fresh mock transport with no connections or queues.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            next_id: Arc::new(AtomicU64::new(1)),
            fail_connect: Arc::new(AtomicBool::new(false)),
            fail_assert: Arc::new(AtomicBool::new(false)),
            connect_paused: Arc::new(AtomicBool::new(false)),
            connect_notify: Arc::new(Notify::new()),
        }
    }

    /// Makes the next `create_connection` call fail with a transport error.
    pub fn fail_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    /// Makes the next `assert_and_consume` call fail with a transport error,
    /// leaving the connection and both channels already open at the time of
    /// failure.
    pub fn fail_assert_and_consume(&self) {
        self.fail_assert.store(true, Ordering::SeqCst);
    }

    /// Makes the next `create_connection` call block until
    /// [`MockTransport::resume_connect`] is called, instead of resolving
    /// immediately.
    pub fn pause_connect(&self) {
        self.connect_paused.store(true, Ordering::SeqCst);
    }

    /// Releases a `create_connection` call blocked by
    /// [`MockTransport::pause_connect`].
    pub fn resume_connect(&self) {
        self.connect_paused.store(false, Ordering::SeqCst);
        self.connect_notify.notify_one();
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Pushes a message to a queue's attached consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if no consumer is currently attached to `queue`.
    pub fn push_message(&self, queue: &QueueName, message: Message) -> Result<(), CoworkersError> {
        let state = self.state.lock();
        let sender = state.consumers.get(queue.as_str()).ok_or_else(|| {
            CoworkersError::transport(format!("no consumer attached to queue '{queue}'"))
        })?;
        sender
            .send(message)
            .map_err(|_| CoworkersError::transport(format!("consumer for queue '{queue}' has gone away")))
    }

    /// Returns the delivery tags acked so far.
    #[must_use]
    pub fn acked(&self) -> Vec<u64> {
        self.state.lock().acked.clone()
    }

    /// Returns the `(delivery_tag, requeue)` pairs nacked so far.
    #[must_use]
    pub fn nacked(&self) -> Vec<(u64, bool)> {
        self.state.lock().nacked.clone()
    }

    /// Returns every message published so far.
    #[must_use]
    pub fn published(&self) -> Vec<(Bytes, PublishOptions)> {
        self.state.lock().published.clone()
    }

    /// Returns the consumer tags cancelled so far.
    #[must_use]
    pub fn cancelled_consumers(&self) -> Vec<String> {
        self.state.lock().cancelled_consumers.clone()
    }

    /// Returns `true` if any connection is currently open.
    #[must_use]
    pub fn has_open_connection(&self) -> bool {
        !self.state.lock().open_connections.is_empty()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn create_connection<'a>(
        &'a self,
        _url: &'a str,
        _socket_options: Option<&'a SocketOptions>,
    ) -> BoxFuture<'a, ConnectionHandle> {
        Box::pin(async move {
            if self.connect_paused.load(Ordering::SeqCst) {
                self.connect_notify.notified().await;
            }
            if self.fail_connect.swap(false, Ordering::SeqCst) {
                return Err(CoworkersError::transport("mock transport: simulated connect failure"));
            }
            let id = self.next_id();
            self.state.lock().open_connections.insert(id, ());
            Ok(ConnectionHandle(id))
        })
    }

    fn create_channel<'a>(&'a self, connection: &'a ConnectionHandle) -> BoxFuture<'a, ChannelHandle> {
        let connection_id = connection.0;
        Box::pin(async move {
            let id = self.next_id();
            self.state.lock().open_channels.insert(id, connection_id);
            Ok(ChannelHandle(id))
        })
    }

    fn assert_and_consume<'a>(
        &'a self,
        _channel: &'a ChannelHandle,
        queue: &'a QueueName,
        _queue_options: Option<&'a QueueOptions>,
        _consume_options: Option<&'a ConsumeOptions>,
    ) -> BoxFuture<'a, (ConsumerTag, DeliveryStream)> {
        Box::pin(async move {
            if self.fail_assert.swap(false, Ordering::SeqCst) {
                return Err(CoworkersError::transport("mock transport: simulated assert_and_consume failure"));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.state.lock().consumers.insert(queue.as_str().to_string(), tx);
            let tag = ConsumerTag::new(format!("ctag-{}", self.next_id()));
            let stream: DeliveryStream = Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|msg| (msg, rx))
            }));
            Ok((tag, stream))
        })
    }

    fn publish<'a>(&'a self, _channel: &'a ChannelHandle, content: Bytes, options: &'a PublishOptions) -> BoxFuture<'a, ()> {
        let options = options.clone();
        Box::pin(async move {
            self.state.lock().published.push((content, options));
            Ok(())
        })
    }

    fn ack<'a>(&'a self, _channel: &'a ChannelHandle, delivery_tag: u64) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.state.lock().acked.push(delivery_tag);
            Ok(())
        })
    }

    fn nack<'a>(&'a self, _channel: &'a ChannelHandle, delivery_tag: u64, requeue: bool) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.state.lock().nacked.push((delivery_tag, requeue));
            Ok(())
        })
    }

    fn cancel_consumer<'a>(&'a self, _channel: &'a ChannelHandle, tag: &'a ConsumerTag) -> BoxFuture<'a, ()> {
        let tag = tag.as_str().to_string();
        Box::pin(async move {
            self.state.lock().cancelled_consumers.push(tag);
            Ok(())
        })
    }

    fn close_channel<'a>(&'a self, channel: ChannelHandle) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.state.lock().open_channels.remove(&channel.0);
            Ok(())
        })
    }

    fn close_connection<'a>(&'a self, connection: ConnectionHandle) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.state.lock().open_connections.remove(&connection.0);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_then_channel_then_consume_round_trips() {
        let transport = MockTransport::new();
        let conn = transport.create_connection("amqp://local", None).await.unwrap();
        let channel = transport.create_channel(&conn).await.unwrap();
        let queue = QueueName::new("orders");
        let (tag, mut stream) = transport
            .assert_and_consume(&channel, &queue, None, None)
            .await
            .unwrap();
        assert!(tag.as_str().starts_with("ctag-"));

        transport
            .push_message(&queue, Message::new("orders", Bytes::from_static(b"hi"), 1))
            .unwrap();

        let delivered = stream.next().await.unwrap();
        assert_eq!(delivered.content, Bytes::from_static(b"hi"));
    }

    #[tokio::test]
    async fn fail_connect_triggers_transport_error_exactly_once() {
        let transport = MockTransport::new();
        transport.fail_connect();
        let err = transport.create_connection("amqp://local", None).await.unwrap_err();
        assert_eq!(err.kind(), "transport_error");

        let conn = transport.create_connection("amqp://local", None).await.unwrap();
        assert!(transport.has_open_connection());
        transport.close_connection(conn).await.unwrap();
        assert!(!transport.has_open_connection());
    }

    #[tokio::test]
    async fn ack_and_nack_are_recorded() {
        let transport = MockTransport::new();
        let conn = transport.create_connection("amqp://local", None).await.unwrap();
        let channel = transport.create_channel(&conn).await.unwrap();
        transport.ack(&channel, 1).await.unwrap();
        transport.nack(&channel, 2, true).await.unwrap();
        assert_eq!(transport.acked(), vec![1]);
        assert_eq!(transport.nacked(), vec![(2, true)]);
    }
}
