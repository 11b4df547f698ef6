//! # coworkers-registry
//!
//! The queue registry: validates and stores `{queue name -> (options,
//! middleware)}` entries, plus the application-wide global middleware list
//! that is prepended to every queue's own middleware. Lookup mirrors the
//! operation-index pattern this codebase's HTTP contract resolver uses,
//! keyed by an exact queue name rather than a path template -- there is no
//! pattern matching here, only registration-order storage and O(1) lookup.

#![doc(html_root_url = "https://docs.rs/coworkers-registry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use coworkers_core::{CoworkersError, CoworkersResult, QueueName, QueueSchema};
use coworkers_middleware::BoxedMiddleware;
use std::collections::HashMap;
use std::sync::Arc;

/// A registered queue: its declared name, opaque broker options, and the
/// middleware that runs for messages delivered on it.
pub struct QueueEntry {
    /// The queue name.
    pub name: QueueName,
    /// Opaque queue-assertion options passed through to the transport.
    pub queue_opts: Option<serde_json::Value>,
    /// Opaque consume options passed through to the transport.
    pub consume_opts: Option<serde_json::Value>,
    /// The queue's own middleware, in registration order.
    pub middleware: Vec<BoxedMiddleware>,
}

/// Validates and stores the application's global middleware and its queue entries.
pub struct QueueRegistry {
    global_middleware: Vec<BoxedMiddleware>,
    entries: Vec<QueueEntry>,
    index: HashMap<QueueName, usize>,
    schema: Option<QueueSchema>,
}

impl QueueRegistry {
    /// Creates an empty registry, optionally backed by a schema collaborator.
    #[must_use]
    pub fn new(schema: Option<QueueSchema>) -> Self {
        Self {
            global_middleware: Vec::new(),
            entries: Vec::new(),
            index: HashMap::new(),
            schema,
        }
    }

    /// Appends a global middleware, applied ahead of every queue's own middleware.
    ///
    /// Acceptance of "a resumable value" is enforced by the `Middleware`
    /// trait bound at compile time; there is no further runtime check to
    /// perform here.
    pub fn use_middleware<M: coworkers_middleware::Middleware>(&mut self, middleware: M) {
        self.global_middleware.push(Arc::new(middleware));
    }

    /// Registers a queue entry.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if `name` is empty or no middleware is
    /// supplied, `AlreadyExists` if `name` was already registered, and
    /// `SchemaViolation` if a schema collaborator is present and either the
    /// name does not resolve in it or `queue_opts` was supplied despite the
    /// schema owning queue options.
    pub fn queue(
        &mut self,
        name: impl Into<QueueName>,
        queue_opts: Option<serde_json::Value>,
        consume_opts: Option<serde_json::Value>,
        middleware: Vec<BoxedMiddleware>,
    ) -> CoworkersResult<()> {
        let name = name.into();

        if name.as_str().is_empty() {
            return Err(CoworkersError::validation("queue name must not be empty"));
        }
        if middleware.is_empty() {
            return Err(CoworkersError::validation(format!(
                "queue '{name}' must be registered with at least one middleware"
            )));
        }
        if self.index.contains_key(&name) {
            return Err(CoworkersError::already_exists(name.to_string()));
        }

        if let Some(schema) = &self.schema {
            let declared = schema.resolve(&name).ok_or_else(|| {
                CoworkersError::schema_violation(
                    name.to_string(),
                    "queue name does not resolve in the schema",
                )
            })?;
            if declared.owns_queue_options && queue_opts.is_some() {
                return Err(CoworkersError::schema_violation(
                    name.to_string(),
                    "queue-assertion options are owned by the schema and must not be supplied",
                ));
            }
        }

        let idx = self.entries.len();
        self.index.insert(name.clone(), idx);
        self.entries.push(QueueEntry {
            name,
            queue_opts,
            consume_opts,
            middleware,
        });
        Ok(())
    }

    /// Returns the registered queue names, in registration order.
    #[must_use]
    pub fn queue_names(&self) -> Vec<QueueName> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Looks up a registered queue entry by name.
    #[must_use]
    pub fn get(&self, name: &QueueName) -> Option<&QueueEntry> {
        self.index.get(name).map(|&idx| &self.entries[idx])
    }

    /// Returns the global middleware list, in registration order.
    #[must_use]
    pub fn global_middleware(&self) -> &[BoxedMiddleware] {
        &self.global_middleware
    }
}
