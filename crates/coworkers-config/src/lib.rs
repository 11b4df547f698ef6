//! # coworkers-config
//!
//! Recognized configuration options for an [`AppConfig`], loaded in layers
//! the same way this codebase's HTTP server config is loaded: built-in
//! defaults, then explicit builder calls, then environment variable
//! overrides applied last by [`ConfigLoader::load`].

#![doc(html_root_url = "https://docs.rs/coworkers-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use coworkers_core::{CoworkersError, CoworkersResult, QueueName, QueueSchema};
use std::env;

/// Overrides `cluster` when set to the string `"true"`.
pub const ENV_CLUSTER: &str = "COWORKERS_CLUSTER";
/// Default for `queue_name` in single-process mode, or the bound queue for a cluster worker.
pub const ENV_QUEUE: &str = "COWORKERS_QUEUE";
/// Injected by the cluster manager into each worker; identifies its index within the queue's pool.
pub const ENV_QUEUE_WORKER_NUM: &str = "COWORKERS_QUEUE_WORKER_NUM";
/// Default broker URL used when `connect` is invoked with only socket options.
pub const ENV_RABBITMQ_URL: &str = "COWORKERS_RABBITMQ_URL";

/// What happens when the transport reports a connection loss that was not
/// requested through an explicit `close()`.
///
/// Only `Never` exists today; this is reserved so a future increment can add
/// an auto-reconnect policy without a breaking config shape change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Treat an unsolicited connection loss the same as any other transport
    /// error: surface it on the error sink and transition to `Closed`.
    #[default]
    Never,
}

/// Recognized configuration for an application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Enables master/worker process supervision. Default `true`.
    pub cluster: bool,
    /// The single queue this process consumes, when clustering is disabled
    /// or when this process is a cluster worker.
    pub queue_name: Option<QueueName>,
    /// Optional schema collaborator constraining queue registration.
    pub schema: Option<QueueSchema>,
    /// Optional per-channel prefetch count applied during `assert_and_consume`.
    pub prefetch: Option<u16>,
    /// Policy for unsolicited connection loss.
    pub reconnect: ReconnectPolicy,
    /// Default broker URL, used when `connect` is called without one.
    pub rabbitmq_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cluster: true,
            queue_name: None,
            schema: None,
            prefetch: None,
            reconnect: ReconnectPolicy::Never,
            rabbitmq_url: None,
        }
    }
}

/// Layered configuration loader: defaults, then builder calls, then environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    config: AppConfig,
}

impl ConfigLoader {
    /// Creates a loader seeded with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether cluster supervision is enabled.
    #[must_use]
    pub fn with_cluster(mut self, cluster: bool) -> Self {
        self.config.cluster = cluster;
        self
    }

    /// Sets the single queue this process consumes.
    #[must_use]
    pub fn with_queue_name(mut self, name: impl Into<QueueName>) -> Self {
        self.config.queue_name = Some(name.into());
        self
    }

    /// Attaches a schema collaborator.
    #[must_use]
    pub fn with_schema(mut self, schema: QueueSchema) -> Self {
        self.config.schema = Some(schema);
        self
    }

    /// Sets the per-channel prefetch count.
    #[must_use]
    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.config.prefetch = Some(prefetch);
        self
    }

    /// Sets the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Sets the default broker URL.
    #[must_use]
    pub fn with_rabbitmq_url(mut self, url: impl Into<String>) -> Self {
        self.config.rabbitmq_url = Some(url.into());
        self
    }

    /// Applies environment variable overrides and validates the result.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if clustering is disabled and no
    /// `queue_name` was supplied by a builder call or by `COWORKERS_QUEUE`.
    pub fn load(mut self) -> CoworkersResult<AppConfig> {
        self.apply_env_overrides();
        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without validating it.
    #[must_use]
    pub fn load_unvalidated(mut self) -> AppConfig {
        self.apply_env_overrides();
        self.config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var(ENV_CLUSTER) {
            if value.eq_ignore_ascii_case("true") {
                self.config.cluster = true;
            }
        }

        if self.config.queue_name.is_none() {
            if let Ok(value) = env::var(ENV_QUEUE) {
                if !value.is_empty() {
                    self.config.queue_name = Some(QueueName::new(value));
                }
            }
        }

        if self.config.rabbitmq_url.is_none() {
            if let Ok(value) = env::var(ENV_RABBITMQ_URL) {
                if !value.is_empty() {
                    self.config.rabbitmq_url = Some(value);
                }
            }
        }
    }
}

impl AppConfig {
    /// Validates that a single-process application carries a queue name.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if `cluster` is `false` and `queue_name` is absent.
    pub fn validate(&self) -> CoworkersResult<()> {
        if !self.cluster && self.queue_name.is_none() {
            return Err(CoworkersError::validation(
                "queue_name is required when cluster is disabled",
            ));
        }
        if self.cluster && self.queue_name.is_some() {
            tracing::warn!("queue_name is ignored when cluster is enabled; the value is only used by cluster workers via COWORKERS_QUEUE");
        }
        Ok(())
    }
}

/// Returns this process's worker index within its queue's pool, as injected
/// by the cluster manager via `COWORKERS_QUEUE_WORKER_NUM`.
#[must_use]
pub fn worker_index_from_env() -> Option<u32> {
    env::var(ENV_QUEUE_WORKER_NUM).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_cluster_with_no_queue_name() {
        let config = AppConfig::default();
        assert!(config.cluster);
        assert!(config.queue_name.is_none());
        assert_eq!(config.reconnect, ReconnectPolicy::Never);
    }

    #[test]
    fn single_process_without_queue_name_fails_validation() {
        let config = ConfigLoader::new().with_cluster(false).config.clone();
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn single_process_with_queue_name_validates() {
        let config = ConfigLoader::new()
            .with_cluster(false)
            .with_queue_name("orders.created")
            .load_unvalidated();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue_name, Some(QueueName::new("orders.created")));
    }

    #[test]
    fn builder_values_round_trip() {
        let config = ConfigLoader::new()
            .with_prefetch(32)
            .with_rabbitmq_url("amqp://localhost")
            .load_unvalidated();
        assert_eq!(config.prefetch, Some(32));
        assert_eq!(config.rabbitmq_url.as_deref(), Some("amqp://localhost"));
    }
}
