//! The message handler factory: builds a per-queue pipeline once at
//! connect time, then dispatches every delivery on that queue through it.

use crate::application::Application;
use crate::events::ErrorEvent;
use coworkers_core::{CoworkersError, Message, QueueName};
use coworkers_middleware::{MessageContext, Pipeline};
use coworkers_transport::DeliveryStream;
use futures_util::StreamExt;
use std::sync::Arc;

/// Flattens the application's global middleware with one queue's own
/// middleware into the sequence the executor walks for every delivery on
/// that queue.
///
/// # Errors
///
/// Returns a validation error if `queue` is not registered; a consumer is
/// only ever opened for a queue asserted through [`Application::queue`] so
/// this is a defensive check rather than an expected failure path.
pub(crate) fn build_pipeline(app: &Application, queue: &QueueName) -> Result<Pipeline, CoworkersError> {
    let registry = app.registry.lock();
    let entry = registry
        .get(queue)
        .ok_or_else(|| CoworkersError::validation(format!("queue '{queue}' is not registered")))?;

    let mut stages = registry.global_middleware().to_vec();
    stages.extend(entry.middleware.iter().cloned());
    Ok(Pipeline::from_stages(stages))
}

/// Spawns the task that polls one queue's delivery stream for its lifetime.
///
/// Each delivery is dispatched on its own task rather than awaited in line:
/// the core does not serialize handler invocations within a queue, matching
/// a broker-level consumer whose prefetch count (not this crate) is the only
/// throttle on concurrent in-flight deliveries.
pub(crate) fn spawn_consumer_loop(
    app: Arc<Application>,
    queue: QueueName,
    pipeline: Arc<Pipeline>,
    mut stream: DeliveryStream,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            let app = Arc::clone(&app);
            let pipeline = Arc::clone(&pipeline);
            let queue = queue.clone();
            tokio::spawn(async move {
                dispatch(app, queue, pipeline, message).await;
            });
        }
    })
}

/// Runs one message through the pipeline and, on success, the responder.
///
/// On pipeline failure, emits an error event and never invokes the
/// responder -- the acknowledgement policy for an unhandled error belongs to
/// whatever error-handling middleware the caller installed (see
/// `coworkers_middleware::templates::nack_on_error`), not to this factory.
async fn dispatch(app: Arc<Application>, queue: QueueName, pipeline: Arc<Pipeline>, message: Message) {
    let mut ctx = MessageContext::new(queue, message);

    let result = pipeline.process(&mut ctx, |_ctx| Box::pin(async { Ok(()) })).await;

    match result {
        Ok(()) => respond_or_report(&app, ctx).await,
        Err(error) => app.emit_error(ErrorEvent { error, context: ctx }),
    }
}

async fn respond_or_report(app: &Arc<Application>, mut ctx: MessageContext) {
    let consumer_channel = *app.consumer_channel.lock().await;
    let publisher_channel = *app.publisher_channel.lock().await;

    let (Some(consumer_channel), Some(publisher_channel)) = (consumer_channel, publisher_channel) else {
        app.emit_error(ErrorEvent {
            error: CoworkersError::transport("no open channel to respond on"),
            context: ctx,
        });
        return;
    };

    if let Err(error) = crate::responder::respond(app.transport.as_ref(), &consumer_channel, &publisher_channel, &mut ctx).await
    {
        app.emit_error(ErrorEvent { error, context: ctx });
    }
}
