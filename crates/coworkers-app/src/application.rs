//! The root entity: configuration, registry, transport handles, and the
//! lifecycle/error-sink plumbing the rest of this crate drives.

use crate::events::{ErrorEvent, ErrorEvents};
use crate::role::Role;
use coworkers_config::AppConfig;
use coworkers_core::{CoworkersResult, QueueName};
use coworkers_middleware::{BoxedMiddleware, Middleware};
use coworkers_registry::QueueRegistry;
use coworkers_transport::{ChannelHandle, ConnectionHandle, ConsumeOptions, QueueOptions, Transport};
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::lifecycle::LifecycleSlot;

/// The root entity of the consumer framework.
///
/// Created once per process via [`Application::new`], then mutated only
/// through the documented operations: [`Application::use_middleware`] and
/// [`Application::queue`] before connecting, [`Application::connect`] and
/// [`Application::close`] across the process lifetime. Every field that
/// changes after construction is behind a narrowly-scoped lock, held only
/// long enough to observe or install a value -- never across an `.await` on
/// a transport call.
pub struct Application {
    pub(crate) config: AppConfig,
    pub(crate) registry: SyncMutex<QueueRegistry>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) role: Role,

    pub(crate) connection: AsyncMutex<Option<ConnectionHandle>>,
    pub(crate) consumer_channel: AsyncMutex<Option<ChannelHandle>>,
    pub(crate) publisher_channel: AsyncMutex<Option<ChannelHandle>>,
    pub(crate) consumer_tags: AsyncMutex<HashMap<QueueName, coworkers_core::ConsumerTag>>,
    pub(crate) consumer_tasks: AsyncMutex<Vec<JoinHandle<()>>>,
    pub(crate) sigint_task: AsyncMutex<Option<JoinHandle<()>>>,

    pub(crate) lifecycle: LifecycleSlot,
    pub(crate) cluster: AsyncMutex<Option<coworkers_cluster::ClusterManager>>,

    pub(crate) error_tx: mpsc::UnboundedSender<ErrorEvent>,
}

impl Application {
    /// Creates an application bound to a transport collaborator, with an
    /// empty registry and no global middleware.
    ///
    /// Returns the application handle alongside the receiving half of its
    /// error sink; drop the receiver if you don't care to observe pipeline
    /// faults programmatically (every fault is also logged via
    /// `tracing::error!`).
    #[must_use]
    pub fn new(config: AppConfig, transport: Arc<dyn Transport>) -> (Arc<Self>, ErrorEvents) {
        let role = Role::resolve(&config);
        let schema = config.schema.clone();
        let (error_tx, error_rx) = mpsc::unbounded_channel();

        let app = Arc::new(Self {
            config,
            registry: SyncMutex::new(QueueRegistry::new(schema)),
            transport,
            role,
            connection: AsyncMutex::new(None),
            consumer_channel: AsyncMutex::new(None),
            publisher_channel: AsyncMutex::new(None),
            consumer_tags: AsyncMutex::new(HashMap::new()),
            consumer_tasks: AsyncMutex::new(Vec::new()),
            sigint_task: AsyncMutex::new(None),
            lifecycle: LifecycleSlot::new(),
            cluster: AsyncMutex::new(None),
            error_tx,
        });

        (app, ErrorEvents { rx: error_rx })
    }

    /// Returns the role this process plays (single-process, cluster
    /// master, or cluster worker).
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the resolved configuration this application was built with.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Appends a global middleware, run ahead of every queue's own
    /// middleware, in registration order.
    pub fn use_middleware<M: Middleware>(&self, middleware: M) {
        self.registry.lock().use_middleware(middleware);
    }

    /// Registers a queue entry.
    ///
    /// # Errors
    ///
    /// See [`coworkers_registry::QueueRegistry::queue`].
    pub fn queue(
        &self,
        name: impl Into<QueueName>,
        queue_opts: Option<QueueOptions>,
        consume_opts: Option<ConsumeOptions>,
        middleware: Vec<BoxedMiddleware>,
    ) -> CoworkersResult<()> {
        self.registry.lock().queue(name, queue_opts, consume_opts, middleware)
    }

    /// Returns the registered queue names, in registration order.
    #[must_use]
    pub fn queue_names(&self) -> Vec<QueueName> {
        self.registry.lock().queue_names()
    }

    /// Emits an error event on the application's sink, also logging it.
    ///
    /// The send only fails if every [`ErrorEvents`] receiver has been
    /// dropped, which is a legitimate "nobody's listening" state, not a
    /// bug -- so the failure is ignored rather than propagated.
    pub(crate) fn emit_error(&self, event: ErrorEvent) {
        tracing::error!(error = %event.error, queue = %event.context.queue(), "coworkers pipeline error");
        let _ = self.error_tx.send(event);
    }

    /// Returns `true` if a broker connection handle is currently held.
    ///
    /// Exposed for health checks and tests; under [`Role::ClusterMaster`]
    /// this must always be `false` (the master never opens broker
    /// resources itself).
    pub async fn has_connection(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Returns `true` if both the consumer and publisher channels are open.
    pub async fn has_channels(&self) -> bool {
        self.consumer_channel.lock().await.is_some() && self.publisher_channel.lock().await.is_some()
    }

    /// Returns the number of queues with a live consumer tag.
    pub async fn consumer_tag_count(&self) -> usize {
        self.consumer_tags.lock().await.len()
    }
}
