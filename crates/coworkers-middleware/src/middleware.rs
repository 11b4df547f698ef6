//! Core middleware trait and the `next` continuation.
//!
//! This module defines the [`Middleware`] trait every pipeline stage
//! implements, and [`Next`], the continuation a middleware calls to hand
//! control to the remainder of the chain.
//!
//! # Design
//!
//! Unlike a plain `FnOnce`-consuming continuation, [`Next`] is safe to hold
//! onto and call through a shared reference: its inner chain lives behind a
//! `Mutex<Option<_>>`, taken exactly once. The first call runs the chain;
//! any later call -- from the same middleware invoking it twice, or from a
//! clone that outlived the first call -- observes an empty slot and fails
//! with [`CoworkersError::PipelineMisuse`] instead of panicking or silently
//! re-running downstream middleware.
//!
//! # Example
//!
//! ```ignore
//! use coworkers_middleware::{Middleware, Next, BoxFuture, MessageContext};
//! use coworkers_core::CoworkersError;
//!
//! struct Logging;
//!
//! impl Middleware for Logging {
//!     fn name(&self) -> &'static str {
//!         "logging"
//!     }
//!
//!     fn enter<'a>(
//!         &'a self,
//!         ctx: &'a mut MessageContext,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Result<(), CoworkersError>> {
//!         Box::pin(async move {
//!             tracing::debug!(queue = %ctx.queue(), "entering");
//!             let result = next.run(ctx).await;
//!             tracing::debug!(queue = %ctx.queue(), "exiting");
//!             result
//!         })
//!     }
//! }
//! ```

use crate::context::MessageContext;
use coworkers_core::CoworkersError;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// A boxed future resolving to a pipeline result.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The core middleware trait.
///
/// Each stage receives the shared [`MessageContext`] and a [`Next`]
/// continuation. A middleware is expected to call `next.run(ctx)` at most
/// once; not calling it at all short-circuits the remainder of the chain.
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this middleware, used in tracing fields
    /// and in the message carried by a `PipelineMisuse` error.
    fn name(&self) -> &'static str;

    /// Runs this middleware's downstream and upstream halves around `next`.
    fn enter<'a>(
        &'a self,
        ctx: &'a mut MessageContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), CoworkersError>>;
}

/// The continuation passed to a middleware, representing "the rest of the pipeline".
///
/// Calling [`Next::run`] drives every remaining downstream middleware (and,
/// at the end of the chain, the handler) and returns once their upstream
/// halves have all completed.
pub struct Next<'a> {
    name: &'static str,
    slot: Arc<Mutex<Option<NextInner<'a>>>>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Terminal(Box<dyn FnOnce(&mut MessageContext) -> BoxFuture<'static, Result<(), CoworkersError>> + Send + 'a>),
}

impl<'a> Next<'a> {
    /// Creates a `Next` that, when run, invokes `middleware` and passes it `next`.
    pub(crate) fn chain(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            name: middleware.name(),
            slot: Arc::new(Mutex::new(Some(NextInner::Chain {
                middleware,
                next: Box::new(next),
            }))),
        }
    }

    /// Creates a terminal `Next` that invokes the message handler.
    pub(crate) fn terminal<F>(name: &'static str, f: F) -> Self
    where
        F: FnOnce(&mut MessageContext) -> BoxFuture<'static, Result<(), CoworkersError>> + Send + 'a,
    {
        Self {
            name,
            slot: Arc::new(Mutex::new(Some(NextInner::Terminal(Box::new(f))))),
        }
    }

    /// Invokes the next middleware or handler in the chain.
    ///
    /// Takes the continuation out of its slot; a second call on the same
    /// `Next` (or a clone of it, see [`Next::clone`]) finds the slot already
    /// empty and returns `Err(CoworkersError::PipelineMisuse)` instead of
    /// running anything twice.
    pub async fn run(&self, ctx: &mut MessageContext) -> Result<(), CoworkersError> {
        let inner = self
            .slot
            .lock()
            .expect("next slot mutex poisoned")
            .take();

        match inner {
            None => Err(CoworkersError::pipeline_misuse(self.name)),
            Some(NextInner::Chain { middleware, next }) => middleware.enter(ctx, *next).await,
            Some(NextInner::Terminal(handler)) => handler(ctx).await,
        }
    }
}

impl Clone for Next<'_> {
    /// Clones the handle to the same underlying continuation slot -- cloning
    /// does not duplicate the work; whichever clone calls `run` first wins,
    /// and the rest observe `PipelineMisuse`.
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            slot: Arc::clone(&self.slot),
        }
    }
}

/// A middleware built from an async closure, for cases that do not warrant
/// a dedicated type.
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F> {
    /// Wraps a closure as a named middleware.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(&mut MessageContext, Next<'_>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CoworkersError>> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn enter<'a>(
        &'a self,
        ctx: &'a mut MessageContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), CoworkersError>> {
        Box::pin(async move { (self.func)(ctx, next).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coworkers_core::{Message, QueueName};

    fn test_ctx() -> MessageContext {
        MessageContext::new(QueueName::new("q"), Message::new("q", bytes::Bytes::new(), 1))
    }

    struct Passthrough;

    impl Middleware for Passthrough {
        fn name(&self) -> &'static str {
            "passthrough"
        }

        fn enter<'a>(
            &'a self,
            ctx: &'a mut MessageContext,
            next: Next<'a>,
        ) -> BoxFuture<'a, Result<(), CoworkersError>> {
            Box::pin(async move { next.run(ctx).await })
        }
    }

    struct DoubleCall;

    impl Middleware for DoubleCall {
        fn name(&self) -> &'static str {
            "double_call"
        }

        fn enter<'a>(
            &'a self,
            ctx: &'a mut MessageContext,
            next: Next<'a>,
        ) -> BoxFuture<'a, Result<(), CoworkersError>> {
            Box::pin(async move {
                next.run(ctx).await?;
                next.run(ctx).await
            })
        }
    }

    #[tokio::test]
    async fn terminal_next_invokes_handler() {
        let mut ctx = test_ctx();
        let next = Next::terminal("handler", |_ctx| Box::pin(async { Ok(()) }));
        assert!(next.run(&mut ctx).await.is_ok());
    }

    #[tokio::test]
    async fn chain_runs_middleware_then_handler() {
        let mw = Passthrough;
        let mut ctx = test_ctx();
        let handler = Next::terminal("handler", |_ctx| Box::pin(async { Ok(()) }));
        let next = Next::chain(&mw, handler);
        assert!(next.run(&mut ctx).await.is_ok());
    }

    #[tokio::test]
    async fn calling_next_twice_yields_pipeline_misuse() {
        let mw = DoubleCall;
        let mut ctx = test_ctx();
        let handler = Next::terminal("handler", |_ctx| Box::pin(async { Ok(()) }));
        let next = Next::chain(&mw, handler);
        let err = next.run(&mut ctx).await.unwrap_err();
        assert_eq!(err.kind(), "pipeline_misuse");
    }
}
