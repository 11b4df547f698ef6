//! # coworkers-core
//!
//! Shared types and error kinds for the coworkers consumer framework:
//!
//! - [`QueueName`], [`ConsumerTag`], [`CorrelationId`] -- identifiers threaded through every
//!   other crate in the workspace
//! - [`Message`] -- the inbound AMQP delivery handed to middleware
//! - [`CoworkersError`] -- the standard error type
//! - [`QueueSchema`] -- the optional schema collaborator interface consulted by the queue registry

#![doc(html_root_url = "https://docs.rs/coworkers-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod ids;
mod message;
pub mod schema;

pub use error::{CoworkersError, CoworkersResult};
pub use ids::{ConsumerTag, CorrelationId, QueueName};
pub use message::Message;
pub use schema::{QueueSchema, SchemaQueue};
