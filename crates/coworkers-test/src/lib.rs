//! # coworkers-test
//!
//! An in-memory test harness for `coworkers` consumers -- no broker
//! required.
//!
//! Mirrors this codebase's existing in-memory HTTP test client: an
//! integrator builds a [`TestHarness`] in place of
//! a real [`coworkers_app::Application`] wired to a production transport,
//! registers the same queues and middleware their service registers, and
//! drives it with fixtures (`deliver`) and assertions (`await_ack`,
//! `await_nack`, `next_error`) instead of hand-rolling a poll loop around
//! [`coworkers_transport::MockTransport`] in every test file.
//!
//! ```ignore
//! use coworkers_test::TestHarness;
//! use coworkers_middleware::FnMiddleware;
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn acks_a_well_formed_message() {
//!     let harness = TestHarness::single_queue("orders.created");
//!     harness
//!         .queue_default(vec![Arc::new(FnMiddleware::new("noop", |ctx, next| {
//!             Box::pin(async move { next.run(ctx).await })
//!         }))])
//!         .unwrap();
//!     harness.connect().await.unwrap();
//!
//!     let tag = harness.deliver("orders.created", "{}").await.unwrap();
//!     harness.await_ack(tag, None).await.unwrap();
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/coworkers-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod harness;

pub use error::{TestError, TestResult};
pub use harness::{TestHarness, DEFAULT_WAIT};
