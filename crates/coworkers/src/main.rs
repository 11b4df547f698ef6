//! Thin loader binary: reads configuration from the environment, wires a
//! transport, and drives the `connect`/shutdown lifecycle.
//!
//! Queue registration (`use_middleware`/`queue`) is an integrator concern,
//! not this loader's: a real deployment embeds the `coworkers` library in
//! its own binary and registers its own middleware before calling
//! `Application::connect`. This binary exists only so
//! `coworkers_cluster::ClusterManager`'s re-exec-the-current-binary worker
//! model has something runnable to point at in this workspace; it wires
//! `MockTransport` in place of a real broker client, which an integrator
//! replaces with one behind `coworkers_transport::Transport` (e.g. a
//! `lapin`-backed implementation).

use coworkers_app::{Application, Role};
use coworkers_config::ConfigLoader;
use coworkers_transport::MockTransport;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let directive = std::env::var("COWORKERS_LOG").unwrap_or_else(|_| "coworkers=info,warn".to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_new(&directive).unwrap_or_else(|_| "coworkers=info,warn".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match ConfigLoader::new().load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let transport: Arc<dyn coworkers_transport::Transport> = Arc::new(MockTransport::new());
    let (app, mut errors) = Application::new(config, transport);

    tokio::spawn(async move {
        while let Some(event) = errors.next().await {
            tracing::error!(error = %event.error, queue = %event.context.queue(), "unhandled pipeline fault");
        }
    });

    if let Err(err) = app.connect(None, None).await {
        tracing::error!(error = %err, "connect failed");
        return ExitCode::FAILURE;
    }

    if app.role() == Role::ClusterWorker {
        println!("{}", coworkers_cluster::READY_MARKER);
    }

    tracing::info!(role = ?app.role(), "coworkers loader running");
    tokio::signal::ctrl_c().await.ok();

    if let Err(err) = app.close().await {
        tracing::error!(error = %err, "close failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
