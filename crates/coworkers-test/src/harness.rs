//! The in-memory test harness.

use crate::error::{TestError, TestResult};
use bytes::Bytes;
use coworkers_app::{Application, ErrorEvent, ErrorEvents, Role};
use coworkers_config::AppConfig;
use coworkers_core::{Message, QueueName};
use coworkers_middleware::{BoxedMiddleware, Middleware};
use coworkers_transport::{ConsumeOptions, MockTransport, QueueOptions};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long a harness assertion waits for an asynchronously-dispatched
/// outcome (an ack, a nack, an error event) before giving up.
///
/// Generous relative to the in-memory transport's actual latency -- this
/// bounds a *hang*, not the common case, which resolves in well under a
/// millisecond.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(1);

/// A single-process [`Application`] wired to a [`MockTransport`], with
/// fixture and assertion helpers that fold the "poll until the internally
/// spawned dispatch task catches up" pattern every handler test otherwise
/// repeats by hand.
///
/// # Example
///
/// ```ignore
/// use coworkers_test::TestHarness;
/// use coworkers_middleware::FnMiddleware;
/// use std::sync::Arc;
///
/// #[tokio::test]
/// async fn acks_a_well_formed_message() {
///     let mut harness = TestHarness::single_queue("orders.created");
///     harness.queue_default(vec![Arc::new(FnMiddleware::new("noop", |ctx, next| {
///         Box::pin(async move { next.run(ctx).await })
///     }))]);
///     harness.connect().await.unwrap();
///
///     let tag = harness.deliver("orders.created", "{}").await.unwrap();
///     harness.await_ack(tag, None).await.unwrap();
/// }
/// ```
pub struct TestHarness {
    app: Arc<Application>,
    transport: Arc<MockTransport>,
    errors: ErrorEvents,
    default_queue: Option<QueueName>,
    next_tag: AtomicU64,
}

impl TestHarness {
    /// Builds a harness from an already-constructed configuration.
    ///
    /// Prefer [`TestHarness::single_queue`] unless the scenario needs
    /// cluster-role resolution or non-default config fields.
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let default_queue = config.queue_name.clone();
        let transport = Arc::new(MockTransport::new());
        let (app, errors) = Application::new(config, transport.clone());
        Self {
            app,
            transport,
            errors,
            default_queue,
            next_tag: AtomicU64::new(1),
        }
    }

    /// Builds a single-process harness bound to one queue name, the shape
    /// every handler-pipeline test needs.
    #[must_use]
    pub fn single_queue(name: impl Into<String>) -> Self {
        Self::new(AppConfig {
            cluster: false,
            queue_name: Some(QueueName::new(name.into())),
            ..AppConfig::default()
        })
    }

    /// The application under test.
    #[must_use]
    pub fn app(&self) -> &Arc<Application> {
        &self.app
    }

    /// The in-memory transport backing the application under test.
    #[must_use]
    pub fn transport(&self) -> &Arc<MockTransport> {
        &self.transport
    }

    /// Appends a global middleware ahead of every queue's own middleware.
    pub fn use_middleware<M: Middleware>(&self, middleware: M) {
        self.app.use_middleware(middleware);
    }

    /// Registers a queue entry.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Fixture`] if registration fails (duplicate
    /// name, empty middleware list, schema rejection).
    pub fn queue(
        &self,
        name: impl Into<QueueName>,
        queue_opts: Option<QueueOptions>,
        consume_opts: Option<ConsumeOptions>,
        middleware: Vec<BoxedMiddleware>,
    ) -> TestResult<()> {
        self.app.queue(name, queue_opts, consume_opts, middleware).map_err(TestError::Fixture)
    }

    /// Registers `middleware` against the queue name this harness was
    /// constructed with (via [`TestHarness::single_queue`]), with no
    /// queue-assertion or consume options.
    ///
    /// # Panics
    ///
    /// Panics if this harness was built via [`TestHarness::new`] with no
    /// `queue_name` configured.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Fixture`] if registration fails.
    pub fn queue_default(&self, middleware: Vec<BoxedMiddleware>) -> TestResult<()> {
        let name = self.default_queue.clone().expect("harness has no default queue name configured");
        self.queue(name, None, None, middleware)
    }

    /// Connects to the mock transport and, for a single-process or
    /// cluster-master role, asserts and consumes every registered queue.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Lifecycle`] if `connect` fails.
    pub async fn connect(&self) -> TestResult<()> {
        self.app.connect(Some("amqp://test-harness".to_string()), None).await.map_err(TestError::Lifecycle)
    }

    /// Tears down the application under test.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Lifecycle`] if `close` fails.
    pub async fn close(&self) -> TestResult<()> {
        self.app.close().await.map_err(TestError::Lifecycle)
    }

    /// Returns the resolved role (always [`Role::SingleProcess`] for a
    /// harness built with `cluster: false`, the common case).
    #[must_use]
    pub fn role(&self) -> Role {
        self.app.role()
    }

    /// Pushes a delivery to `queue`'s attached consumer and returns the
    /// delivery tag it was assigned, auto-incrementing from 1.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Delivery`] if no consumer is attached to
    /// `queue` -- call [`TestHarness::connect`] first.
    pub async fn deliver(&self, queue: impl Into<QueueName>, content: impl Into<Bytes>) -> TestResult<u64> {
        let queue = queue.into();
        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
        let message = Message::new(queue.clone(), content.into(), tag);
        self.transport.push_message(&queue, message).map_err(TestError::Delivery)?;
        Ok(tag)
    }

    /// Waits until `delivery_tag` has been acked on the mock transport.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Timeout`] if the ack hasn't landed within
    /// `timeout` (defaults to [`DEFAULT_WAIT`]).
    pub async fn await_ack(&self, delivery_tag: u64, timeout: Option<Duration>) -> TestResult<()> {
        self.wait_until(format!("delivery {delivery_tag} to be acked"), timeout, || {
            self.transport.acked().contains(&delivery_tag)
        })
        .await
    }

    /// Waits until `delivery_tag` has been nacked, returning the `requeue`
    /// flag it was nacked with.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Timeout`] if the nack hasn't landed within
    /// `timeout` (defaults to [`DEFAULT_WAIT`]).
    pub async fn await_nack(&self, delivery_tag: u64, timeout: Option<Duration>) -> TestResult<bool> {
        self.wait_until(format!("delivery {delivery_tag} to be nacked"), timeout, || {
            self.transport.nacked().iter().any(|(tag, _)| *tag == delivery_tag)
        })
        .await?;
        Ok(self.transport.nacked().iter().find(|(tag, _)| *tag == delivery_tag).map(|(_, requeue)| *requeue).unwrap_or(false))
    }

    /// Awaits the next error event from the pipeline/responder sink.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Timeout`] if no event arrives within `timeout`
    /// (defaults to [`DEFAULT_WAIT`]).
    pub async fn next_error(&mut self, timeout: Option<Duration>) -> TestResult<ErrorEvent> {
        let timeout = timeout.unwrap_or(DEFAULT_WAIT);
        match tokio::time::timeout(timeout, self.errors.next()).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(TestError::Timeout("an error event (sink closed instead)".to_string())),
            Err(_) => Err(TestError::Timeout("an error event".to_string())),
        }
    }

    /// Polls `condition` every 5ms until it returns `true` or `timeout`
    /// elapses (defaults to [`DEFAULT_WAIT`]).
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Timeout`] if `condition` never becomes `true`.
    pub async fn wait_until<F: Fn() -> bool>(&self, what: impl Into<String>, timeout: Option<Duration>, condition: F) -> TestResult<()> {
        let timeout = timeout.unwrap_or(DEFAULT_WAIT);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if condition() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(TestError::Timeout(what.into()));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coworkers_core::CoworkersError;
    use coworkers_middleware::FnMiddleware;

    fn noop() -> BoxedMiddleware {
        Arc::new(FnMiddleware::new("noop", |ctx, next| Box::pin(async move { next.run(ctx).await })))
    }

    #[tokio::test]
    async fn acks_a_well_formed_delivery() {
        let harness = TestHarness::single_queue("orders.created");
        harness.queue_default(vec![noop()]).unwrap();
        harness.connect().await.unwrap();

        let tag = harness.deliver("orders.created", "{}").await.unwrap();
        harness.await_ack(tag, None).await.unwrap();
    }

    #[tokio::test]
    async fn reports_a_pipeline_failure_without_acking() {
        let harness = TestHarness::single_queue("orders.created");
        let failing: BoxedMiddleware = Arc::new(FnMiddleware::new("boom", |_ctx, _next| {
            Box::pin(async move { Err(CoworkersError::validation("bad payload")) })
        }));
        harness.queue_default(vec![failing]).unwrap();
        harness.connect().await.unwrap();

        let mut harness = harness;
        let tag = harness.deliver("orders.created", "{}").await.unwrap();
        let event = harness.next_error(None).await.unwrap();

        assert_eq!(event.error.kind(), "validation_error");
        assert!(harness.transport().acked().is_empty());
        assert!(!harness.transport().acked().contains(&tag));
    }

    #[tokio::test]
    async fn deliver_before_connect_reports_no_consumer() {
        let harness = TestHarness::single_queue("orders.created");
        harness.queue_default(vec![noop()]).unwrap();

        let err = harness.deliver("orders.created", "{}").await.unwrap_err();
        assert!(matches!(err, TestError::Delivery(_)));
    }

    #[tokio::test]
    async fn await_ack_times_out_when_nothing_is_delivered() {
        let harness = TestHarness::single_queue("orders.created");
        harness.queue_default(vec![noop()]).unwrap();
        harness.connect().await.unwrap();

        let err = harness.await_ack(1, Some(Duration::from_millis(20))).await.unwrap_err();
        assert!(matches!(err, TestError::Timeout(_)));
    }
}
