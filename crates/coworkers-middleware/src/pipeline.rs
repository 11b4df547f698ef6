//! The two-phase middleware pipeline.
//!
//! A [`Pipeline`] flattens an application's global middleware with a
//! queue's own middleware into one ordered sequence and drives it through a
//! downstream/upstream traversal: each middleware's code before its `next`
//! call runs in registration order, then the handler runs, then each
//! middleware's code after its `next` call runs in reverse order.

use crate::context::MessageContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use coworkers_core::CoworkersError;
use std::sync::Arc;

/// A type-erased middleware, shared across every message dispatched to a queue.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An ordered, immutable sequence of middleware.
///
/// Built once per queue by the message handler factory from the
/// application's global middleware followed by the queue's own middleware;
/// reused for every message delivered on that queue.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Builds a pipeline from an already-flattened stage list.
    #[must_use]
    pub fn from_stages(stages: Vec<BoxedMiddleware>) -> Self {
        Self { stages }
    }

    /// Appends a middleware stage.
    #[must_use]
    pub fn with_stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Runs the pipeline for one message, invoking `handler` once the
    /// downstream traversal reaches the end of the chain.
    ///
    /// Returns the first error raised by any middleware or by `handler`.
    /// On error, downstream middleware past the failure point never run,
    /// and upstream halves of middleware that never entered also never run
    /// -- only the already-entered middleware unwind, in reverse order, by
    /// virtue of `?` propagating out through their own `next.run().await?`.
    pub async fn process<H>(&self, ctx: &mut MessageContext, handler: H) -> Result<(), CoworkersError>
    where
        H: FnOnce(&mut MessageContext) -> BoxFuture<'static, Result<(), CoworkersError>> + Send + 'static,
    {
        let chain = self.build_chain(handler);
        chain.run(ctx).await
    }

    /// Builds the chain back-to-front: the handler is the innermost
    /// continuation, each stage wraps the next in reverse registration
    /// order, so running the outermost `Next` enters stage 0 first.
    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut MessageContext) -> BoxFuture<'static, Result<(), CoworkersError>> + Send + 'a,
    {
        let mut next = Next::terminal("handler", handler);
        for middleware in self.stages.iter().rev() {
            next = Next::chain(middleware.as_ref(), next);
        }
        next
    }

    /// Returns the names of the middleware in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|mw| mw.name()).collect()
    }

    /// Returns the number of middleware stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coworkers_core::{Message, QueueName};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn test_ctx() -> MessageContext {
        MessageContext::new(QueueName::new("orders"), Message::new("orders", bytes::Bytes::new(), 1))
    }

    /// Records its downstream entry, then its upstream exit (suffixed with `'`).
    struct OrderTrackingMiddleware {
        name: &'static str,
        order: Arc<StdMutex<Vec<String>>>,
    }

    impl Middleware for OrderTrackingMiddleware {
        fn name(&self) -> &'static str {
            self.name
        }

        fn enter<'a>(
            &'a self,
            ctx: &'a mut MessageContext,
            next: Next<'a>,
        ) -> BoxFuture<'a, Result<(), CoworkersError>> {
            Box::pin(async move {
                self.order.lock().unwrap().push(self.name.to_string());
                next.run(ctx).await?;
                self.order.lock().unwrap().push(format!("{}'", self.name));
                Ok(())
            })
        }
    }

    struct ShortCircuit {
        name: &'static str,
        order: Arc<StdMutex<Vec<String>>>,
    }

    impl Middleware for ShortCircuit {
        fn name(&self) -> &'static str {
            self.name
        }

        fn enter<'a>(
            &'a self,
            _ctx: &'a mut MessageContext,
            _next: Next<'a>,
        ) -> BoxFuture<'a, Result<(), CoworkersError>> {
            Box::pin(async move {
                self.order.lock().unwrap().push(self.name.to_string());
                Ok(())
            })
        }
    }

    struct Raises {
        name: &'static str,
    }

    impl Middleware for Raises {
        fn name(&self) -> &'static str {
            self.name
        }

        fn enter<'a>(
            &'a self,
            _ctx: &'a mut MessageContext,
            _next: Next<'a>,
        ) -> BoxFuture<'a, Result<(), CoworkersError>> {
            Box::pin(async move { Err(CoworkersError::validation("boom")) })
        }
    }

    #[tokio::test]
    async fn pipeline_executes_two_phase_in_order() {
        let order = Arc::new(StdMutex::new(Vec::new()));
        let handler_count = Arc::new(AtomicUsize::new(0));

        let pipeline = Pipeline::new()
            .with_stage(OrderTrackingMiddleware { name: "a", order: order.clone() })
            .with_stage(OrderTrackingMiddleware { name: "b", order: order.clone() })
            .with_stage(OrderTrackingMiddleware { name: "c", order: order.clone() });

        let mut ctx = test_ctx();
        let hc = handler_count.clone();
        pipeline
            .process(&mut ctx, move |_ctx| {
                hc.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(()) })
            })
            .await
            .unwrap();

        assert_eq!(handler_count.load(Ordering::SeqCst), 1);
        let recorded = order.lock().unwrap();
        assert_eq!(*recorded, vec!["a", "b", "c", "c'", "b'", "a'"]);
    }

    #[tokio::test]
    async fn empty_pipeline_runs_only_the_handler() {
        let pipeline = Pipeline::new();
        let mut ctx = test_ctx();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        pipeline
            .process(&mut ctx, move |_ctx| {
                r.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(()) })
            })
            .await
            .unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn middleware_that_never_calls_next_short_circuits_remaining_stages() {
        let order = Arc::new(StdMutex::new(Vec::new()));
        let handler_count = Arc::new(AtomicUsize::new(0));

        let pipeline = Pipeline::new()
            .with_stage(OrderTrackingMiddleware { name: "a", order: order.clone() })
            .with_stage(ShortCircuit { name: "b", order: order.clone() })
            .with_stage(OrderTrackingMiddleware { name: "c", order: order.clone() });

        let mut ctx = test_ctx();
        let hc = handler_count.clone();
        pipeline
            .process(&mut ctx, move |_ctx| {
                hc.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(()) })
            })
            .await
            .unwrap();

        assert_eq!(handler_count.load(Ordering::SeqCst), 0);
        let recorded = order.lock().unwrap();
        assert_eq!(*recorded, vec!["a", "b", "a'"]);
    }

    #[tokio::test]
    async fn pipeline_error_unwinds_without_running_downstream_or_handler() {
        let order = Arc::new(StdMutex::new(Vec::new()));
        let handler_count = Arc::new(AtomicUsize::new(0));

        let pipeline = Pipeline::new()
            .with_stage(OrderTrackingMiddleware { name: "a", order: order.clone() })
            .with_stage(Raises { name: "b" })
            .with_stage(OrderTrackingMiddleware { name: "c", order: order.clone() });

        let mut ctx = test_ctx();
        let hc = handler_count.clone();
        let err = pipeline
            .process(&mut ctx, move |_ctx| {
                hc.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(()) })
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "validation_error");
        assert_eq!(handler_count.load(Ordering::SeqCst), 0);
        let recorded = order.lock().unwrap();
        assert_eq!(*recorded, vec!["a"]);
    }

    #[test]
    fn stage_names_and_count_reflect_registration_order() {
        let order = Arc::new(StdMutex::new(Vec::new()));
        let pipeline = Pipeline::new()
            .with_stage(OrderTrackingMiddleware { name: "a", order: order.clone() })
            .with_stage(OrderTrackingMiddleware { name: "b", order });
        assert_eq!(pipeline.stage_names(), vec!["a", "b"]);
        assert_eq!(pipeline.stage_count(), 2);
    }
}
