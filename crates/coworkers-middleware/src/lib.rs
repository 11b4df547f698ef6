//! # coworkers-middleware
//!
//! The two-phase middleware pipeline executor:
//!
//! - [`Middleware`] / [`Next`] -- the trait and continuation every stage implements
//! - [`MessageContext`] -- the per-message state bag threaded through the pipeline
//! - [`Pipeline`] -- the flattened, ordered stage list the message handler factory drives
//!
//! See the [`templates`] module for a couple of ready-made middleware a
//! caller can opt into rather than reimplement.

#![doc(html_root_url = "https://docs.rs/coworkers-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod middleware;
mod pipeline;
pub mod templates;

pub use context::{AckDecision, MessageContext, Reply};
pub use middleware::{BoxFuture, FnMiddleware, Middleware, Next};
pub use pipeline::{BoxedMiddleware, Pipeline};
