//! The optional schema collaborator consulted by the queue registry.
//!
//! Schema validation itself -- what shape a payload must have -- is out of
//! scope for this crate; only the narrow interface the registry needs is
//! defined here: "does this queue name resolve in the schema, and if so,
//! does it own the queue-assertion options?" The lookup strategy mirrors
//! the operation-index pattern this codebase already uses for its HTTP
//! contract resolver, just keyed by an exact queue name instead of a path
//! template.

use crate::ids::QueueName;
use std::collections::HashMap;

/// A declared queue inside a [`QueueSchema`].
#[derive(Debug, Clone)]
pub struct SchemaQueue {
    /// The queue name as declared in the schema.
    pub name: QueueName,
    /// Whether this schema entry supplies its own queue-assertion options,
    /// meaning a caller of `QueueRegistry::queue` must not pass any.
    pub owns_queue_options: bool,
}

/// A resolver mapping queue names to their schema-declared metadata.
///
/// Built once (typically at application startup) and handed to the queue
/// registry; lookups are O(1) via an index keyed by queue name, the same
/// shape as the existing HTTP contract's `operation_index`.
#[derive(Debug, Clone, Default)]
pub struct QueueSchema {
    queues: Vec<SchemaQueue>,
    index: HashMap<QueueName, usize>,
}

impl QueueSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a queue in the schema, owning its own queue-assertion options.
    #[must_use]
    pub fn with_queue(mut self, name: impl Into<QueueName>) -> Self {
        self.insert(SchemaQueue {
            name: name.into(),
            owns_queue_options: true,
        });
        self
    }

    fn insert(&mut self, queue: SchemaQueue) {
        let idx = self.queues.len();
        self.index.insert(queue.name.clone(), idx);
        self.queues.push(queue);
    }

    /// Resolves a queue name against the schema.
    #[must_use]
    pub fn resolve(&self, name: &QueueName) -> Option<&SchemaQueue> {
        self.index.get(name).map(|&idx| &self.queues[idx])
    }
}
