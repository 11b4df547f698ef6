//! # coworkers-transport
//!
//! The broker transport collaborator interface ([`Transport`]) plus an
//! in-memory reference implementation ([`mock::MockTransport`]) used by
//! this workspace's own tests and available to integrators writing their
//! own test suites.

#![doc(html_root_url = "https://docs.rs/coworkers-transport/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod mock;
mod transport;

pub use mock::MockTransport;
pub use transport::{
    BoxFuture, ChannelHandle, ConnectionHandle, ConsumeOptions, DeliveryStream, PublishOptions,
    QueueOptions, SocketOptions, Transport,
};
