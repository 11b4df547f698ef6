//! # coworkers
//!
//! **An AMQP 0-9-1 message-consumer framework for the Themis Platform**
//!
//! coworkers lets an operator declare one or more named queues, attach an
//! ordered pipeline of handlers to each, and run the resulting consumer
//! either as a single process or as a fleet of worker processes each bound
//! to one queue.
//!
//! - 🔁 **Two-phase middleware pipeline** -- global and per-queue middleware run downstream then unwind upstream around the handler, the same traversal shape as this platform's HTTP middleware stack.
//! - 🤝 **Reentrant connect/close** -- concurrent lifecycle calls observe one shared outcome instead of racing the broker.
//! - 🧵 **Cluster supervision** -- one real worker process per declared queue, restarted on non-zero exit, escalating SIGINT → SIGTERM → SIGKILL on shutdown.
//! - 🔌 **Transport-agnostic core** -- the broker client lives behind `coworkers_transport::Transport`; wire in a real AMQP client (e.g. `lapin`) without touching the rest of the framework.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use coworkers::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().load()?;
//!     let transport: Arc<dyn Transport> = todo!("wire in a real AMQP client");
//!     let (app, mut errors) = Application::new(config, transport);
//!
//!     app.queue(
//!         "orders.created",
//!         None,
//!         None,
//!         vec![Arc::new(FnMiddleware::new("log", |ctx, next| async move {
//!             next.run(ctx).await
//!         }))],
//!     )?;
//!
//!     app.connect(None, None).await?;
//!     while let Some(event) = errors.next().await {
//!         tracing::error!(error = %event.error, "pipeline fault");
//!     }
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/coworkers/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types (ids, message, error, schema)
pub use coworkers_core as core;

// Re-export the middleware pipeline executor and context
pub use coworkers_middleware as middleware;

// Re-export the queue registry
pub use coworkers_registry as registry;

// Re-export the transport collaborator interface and mock
pub use coworkers_transport as transport;

// Re-export the application root and lifecycle coordinator
pub use coworkers_app as app;

// Re-export the cluster manager
pub use coworkers_cluster as cluster;

// Re-export configuration loading
pub use coworkers_config as config;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use coworkers::prelude::*;
/// ```
pub mod prelude {
    pub use coworkers_app::{Application, ErrorEvent, ErrorEvents, Role};
    pub use coworkers_config::{AppConfig, ConfigLoader, ReconnectPolicy};
    pub use coworkers_core::{
        ConsumerTag, CorrelationId, CoworkersError, CoworkersResult, Message, QueueName,
        QueueSchema,
    };
    pub use coworkers_middleware::{
        AckDecision, FnMiddleware, Middleware, MessageContext, Next, Pipeline, Reply,
    };
    pub use coworkers_transport::{MockTransport, Transport};
}
