//! # coworkers-app
//!
//! The application root: wires a configured [`Application`] around a
//! [`coworkers_registry::QueueRegistry`] and a
//! [`coworkers_transport::Transport`] collaborator, and owns the
//! `connect`/`close` lifecycle coordinator.
//!
//! - [`Application`] -- the root entity; construct once via [`Application::new`]
//! - [`Application::connect`] / [`Application::close`] -- the reentrant lifecycle pair
//! - [`Role`] -- whether this process runs standalone, as the cluster master, or as a worker
//! - [`ErrorEvent`] / [`ErrorEvents`] -- the asynchronous fault sink for pipeline and responder errors
//!
//! The message handler factory and responder are internal: they run
//! automatically once [`Application::connect`] asserts and consumes a
//! queue, and are not meant to be driven directly by an integrator.

#![doc(html_root_url = "https://docs.rs/coworkers-app/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod application;
mod events;
mod handler;
mod lifecycle;
mod responder;
mod role;

pub use application::Application;
pub use events::{ErrorEvent, ErrorEvents};
pub use role::Role;
