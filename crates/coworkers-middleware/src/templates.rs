//! Ready-made middleware a caller may opt into.
//!
//! None of these are installed automatically -- the core's default
//! behavior on an unhandled pipeline error is to emit an `error` event and
//! skip the responder entirely, preserving at-least-once delivery via the
//! broker's own redelivery. A caller who wants a different default ack
//! policy installs one of these as the first global middleware.

use crate::context::MessageContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use coworkers_core::CoworkersError;

/// A middleware that converts any downstream pipeline error into an
/// explicit `nack(requeue)` decision instead of leaving the message
/// unacknowledged.
///
/// Install this first (outermost) so it wraps every other middleware:
///
/// ```ignore
/// app.use_middleware(nack_on_error(true));
/// ```
#[must_use]
pub fn nack_on_error(requeue: bool) -> NackOnError {
    NackOnError { requeue }
}

/// Middleware returned by [`nack_on_error`].
pub struct NackOnError {
    requeue: bool,
}

impl Middleware for NackOnError {
    fn name(&self) -> &'static str {
        "nack_on_error"
    }

    fn enter<'a>(
        &'a self,
        ctx: &'a mut MessageContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), CoworkersError>> {
        Box::pin(async move {
            if let Err(err) = next.run(ctx).await {
                tracing::warn!(error = %err, queue = %ctx.queue(), "nacking message after pipeline error");
                ctx.nack(self.requeue);
                return Ok(());
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AckDecision;
    use crate::pipeline::Pipeline;
    use coworkers_core::{Message, QueueName};

    #[tokio::test]
    async fn nack_on_error_converts_error_into_nack_decision() {
        let pipeline = Pipeline::new().with_stage(nack_on_error(true));
        let mut ctx = MessageContext::new(
            QueueName::new("orders"),
            Message::new("orders", bytes::Bytes::new(), 1),
        );

        let result = pipeline
            .process(&mut ctx, |_ctx| {
                Box::pin(async { Err(CoworkersError::validation("boom")) })
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(ctx.ack_decision(), &AckDecision::Nack { requeue: true });
    }
}
