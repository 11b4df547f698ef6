//! The `connect`/`close` lifecycle coordinator.
//!
//! A single [`LifecycleSlot`] behind a `tokio::sync::Mutex` makes the
//! mutual exclusion between an in-flight connect and an in-flight close
//! structural rather than conventional: at most one of `Connecting`/
//! `Closing` ever occupies the slot, and every concurrent caller observes
//! (and awaits) the same outcome via a [`futures_util::future::Shared`]
//! future rather than racing the transport itself.

use crate::application::Application;
use crate::handler;
use crate::role::Role;
use coworkers_core::{CoworkersError, CoworkersResult, QueueName};
use coworkers_transport::{ChannelHandle, ConsumeOptions, SocketOptions};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

type Outcome = Shared<BoxFuture<'static, Result<(), CoworkersError>>>;

enum Slot {
    Empty,
    Connecting(Outcome),
    Closing(Outcome),
}

/// The in-flight connect/close slot embedded in [`Application`].
pub(crate) struct LifecycleSlot {
    slot: AsyncMutex<Slot>,
}

impl LifecycleSlot {
    pub(crate) fn new() -> Self {
        Self {
            slot: AsyncMutex::new(Slot::Empty),
        }
    }
}

impl Application {
    /// Connects to the broker (or, under [`Role::ClusterMaster`], starts
    /// the worker fleet) and asserts/consumes every target queue.
    ///
    /// Idempotent and reentrant: a second call while a connect is already
    /// in flight returns the same outcome as the first; a call arriving
    /// while a close is in flight awaits that close and then recurses, or
    /// fails with [`CoworkersError::CancelledByPeer`] if the close failed.
    ///
    /// `url` falls back to the `rabbitmq_url` configured via
    /// [`coworkers_config::ConfigLoader`] (itself defaulted from
    /// `COWORKERS_RABBITMQ_URL`) when not supplied.
    ///
    /// # Errors
    ///
    /// Returns whatever the transport collaborator failed with, a
    /// validation error if no broker URL is available, or
    /// `CancelledByPeer` if a concurrent `close` interrupted this call.
    pub async fn connect(
        self: &Arc<Self>,
        url: Option<String>,
        socket_options: Option<SocketOptions>,
    ) -> CoworkersResult<()> {
        loop {
            let mut guard = self.lifecycle.slot.lock().await;
            match &*guard {
                Slot::Connecting(shared) => {
                    let fut = shared.clone();
                    drop(guard);
                    return fut.await;
                }
                Slot::Closing(shared) => {
                    let fut = shared.clone();
                    drop(guard);
                    match fut.await {
                        Ok(()) => continue,
                        Err(close_err) => {
                            return Err(CoworkersError::connect_cancelled_by_close(Some(close_err)))
                        }
                    }
                }
                Slot::Empty => {
                    if self.is_fully_open().await {
                        return Ok(());
                    }
                    let app = Arc::clone(self);
                    let url = url.clone();
                    let socket_options = socket_options.clone();
                    let fut: BoxFuture<'static, Result<(), CoworkersError>> =
                        Box::pin(async move { run_connect(app, url, socket_options).await });
                    let shared = fut.shared();
                    *guard = Slot::Connecting(shared.clone());
                    drop(guard);

                    let result = shared.await;
                    *self.lifecycle.slot.lock().await = Slot::Empty;
                    return result;
                }
            }
        }
    }

    /// Tears down the broker connection (or stops the worker fleet under
    /// [`Role::ClusterMaster`]).
    ///
    /// Idempotent and reentrant in the same sense as [`Application::connect`].
    ///
    /// # Errors
    ///
    /// Returns whatever transport teardown step failed first, or
    /// `CancelledByPeer` if a concurrent `connect` interrupted this call.
    pub async fn close(self: &Arc<Self>) -> CoworkersResult<()> {
        loop {
            let mut guard = self.lifecycle.slot.lock().await;
            match &*guard {
                Slot::Closing(shared) => {
                    let fut = shared.clone();
                    drop(guard);
                    return fut.await;
                }
                Slot::Connecting(shared) => {
                    let fut = shared.clone();
                    drop(guard);
                    match fut.await {
                        Ok(()) => continue,
                        Err(connect_err) => {
                            return Err(CoworkersError::close_cancelled_by_connect(Some(connect_err)))
                        }
                    }
                }
                Slot::Empty => {
                    if self.is_fully_closed().await {
                        return Ok(());
                    }
                    let app = Arc::clone(self);
                    let fut: BoxFuture<'static, Result<(), CoworkersError>> =
                        Box::pin(async move { app.teardown().await });
                    let shared = fut.shared();
                    *guard = Slot::Closing(shared.clone());
                    drop(guard);

                    let result = shared.await;
                    *self.lifecycle.slot.lock().await = Slot::Empty;
                    return result;
                }
            }
        }
    }

    /// The queues this process should assert/consume: every registered
    /// queue in single-process mode, or just the one bound queue for a
    /// cluster worker.
    pub(crate) fn target_queues(&self) -> Vec<QueueName> {
        match self.role {
            Role::ClusterWorker => self.config.queue_name.iter().cloned().collect(),
            Role::SingleProcess | Role::ClusterMaster => self.queue_names(),
        }
    }

    async fn is_fully_open(&self) -> bool {
        if self.role == Role::ClusterMaster {
            return self.cluster.lock().await.is_some();
        }
        if self.connection.lock().await.is_none() {
            return false;
        }
        if self.consumer_channel.lock().await.is_none() || self.publisher_channel.lock().await.is_none() {
            return false;
        }
        let tags = self.consumer_tags.lock().await;
        self.target_queues().iter().all(|queue| tags.contains_key(queue))
    }

    async fn is_fully_closed(&self) -> bool {
        if self.role == Role::ClusterMaster {
            return self.cluster.lock().await.is_none();
        }
        self.connection.lock().await.is_none()
            && self.consumer_channel.lock().await.is_none()
            && self.publisher_channel.lock().await.is_none()
    }

    /// Releases every resource this application currently holds. Used both
    /// by [`Application::close`] and, directly (bypassing the slot), by a
    /// failed `connect`'s own rollback -- calling the public `close` there
    /// would deadlock waiting on the very connecting future it is rolling
    /// back (see `DESIGN.md`).
    pub(crate) async fn teardown(&self) -> CoworkersResult<()> {
        if self.role == Role::ClusterMaster {
            let manager = self.cluster.lock().await.take();
            if let Some(manager) = manager {
                manager.stop().await?;
            }
            return Ok(());
        }

        let consumer_channel = *self.consumer_channel.lock().await;
        if let Some(channel) = consumer_channel {
            let tags: Vec<_> = self.consumer_tags.lock().await.drain().collect();
            for (queue, tag) in tags {
                if let Err(err) = self.transport.cancel_consumer(&channel, &tag).await {
                    tracing::warn!(%queue, error = %err, "failed to cancel consumer during teardown");
                    return Err(err);
                }
            }
        } else {
            self.consumer_tags.lock().await.clear();
        }

        for task in self.consumer_tasks.lock().await.drain(..) {
            task.abort();
        }

        if let Some(channel) = self.consumer_channel.lock().await.take() {
            self.transport.close_channel(channel).await?;
        }
        if let Some(channel) = self.publisher_channel.lock().await.take() {
            self.transport.close_channel(channel).await?;
        }
        if let Some(connection) = self.connection.lock().await.take() {
            self.transport.close_connection(connection).await?;
        }
        if let Some(handle) = self.sigint_task.lock().await.take() {
            handle.abort();
        }

        Ok(())
    }

    async fn assert_and_consume_one(
        self: &Arc<Self>,
        queue: &QueueName,
        channel: &ChannelHandle,
    ) -> CoworkersResult<()> {
        let (queue_opts, consume_opts, pipeline) = {
            let registry = self.registry.lock();
            let entry = registry
                .get(queue)
                .ok_or_else(|| CoworkersError::validation(format!("queue '{queue}' is not registered")))?;
            let queue_opts = entry.queue_opts.clone();
            let consume_opts = with_prefetch(entry.consume_opts.clone(), self.config.prefetch);
            drop(registry);
            let pipeline = handler::build_pipeline(self, queue)?;
            (queue_opts, consume_opts, pipeline)
        };

        let (tag, stream) = self
            .transport
            .assert_and_consume(channel, queue, queue_opts.as_ref(), consume_opts.as_ref())
            .await?;

        self.consumer_tags.lock().await.insert(queue.clone(), tag);

        let task = handler::spawn_consumer_loop(Arc::clone(self), queue.clone(), Arc::new(pipeline), stream);
        self.consumer_tasks.lock().await.push(task);

        Ok(())
    }

    async fn install_sigint_handler(self: &Arc<Self>) {
        let app = Arc::clone(self);
        let handle = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("SIGINT received, closing coworkers application");
                if let Err(err) = app.close().await {
                    tracing::error!(error = %err, "error while closing application after SIGINT");
                }
            }
        });
        *self.sigint_task.lock().await = Some(handle);
    }
}

fn with_prefetch(consume_opts: Option<ConsumeOptions>, prefetch: Option<u16>) -> Option<ConsumeOptions> {
    let prefetch = prefetch?;
    let mut value = consume_opts.unwrap_or_else(|| serde_json::json!({}));
    if let serde_json::Value::Object(map) = &mut value {
        map.insert("prefetch".to_string(), serde_json::json!(prefetch));
    }
    Some(value)
}

async fn run_connect(
    app: Arc<Application>,
    url: Option<String>,
    socket_options: Option<SocketOptions>,
) -> CoworkersResult<()> {
    if app.role == Role::ClusterMaster {
        return run_connect_master(&app).await;
    }

    if let Err(err) = run_connect_worker(&app, url, socket_options).await {
        tracing::warn!(error = %err, "connect failed; rolling back partially acquired resources");
        if let Err(close_err) = app.teardown().await {
            tracing::warn!(error = %close_err, "rollback after failed connect also failed; surfacing the original connect error");
        }
        return Err(err);
    }
    Ok(())
}

async fn run_connect_master(app: &Arc<Application>) -> CoworkersResult<()> {
    let mut guard = app.cluster.lock().await;
    if guard.is_none() {
        *guard = Some(coworkers_cluster::ClusterManager::new(app.queue_names()));
    }
    let manager = guard.as_ref().expect("cluster manager was just installed");
    manager.start().await
}

async fn run_connect_worker(
    app: &Arc<Application>,
    url: Option<String>,
    socket_options: Option<SocketOptions>,
) -> CoworkersResult<()> {
    let resolved_url = url
        .or_else(|| app.config.rabbitmq_url.clone())
        .ok_or_else(|| CoworkersError::validation("no broker URL supplied and COWORKERS_RABBITMQ_URL is unset"))?;

    let connection = app.transport.create_connection(&resolved_url, socket_options.as_ref()).await?;
    *app.connection.lock().await = Some(connection);

    let (consumer, publisher) = tokio::try_join!(
        app.transport.create_channel(&connection),
        app.transport.create_channel(&connection),
    )?;
    *app.consumer_channel.lock().await = Some(consumer);
    *app.publisher_channel.lock().await = Some(publisher);

    for queue in app.target_queues() {
        app.assert_and_consume_one(&queue, &consumer).await?;
    }

    app.install_sigint_handler().await;
    Ok(())
}
