//! Determines whether this process is a single-process consumer, the
//! cluster master, or a cluster worker bound to one queue.

use coworkers_config::AppConfig;

/// The role this process plays with respect to cluster supervision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Clustering is disabled; this process owns every registered queue directly.
    SingleProcess,
    /// Clustering is enabled and this process is the master: it never opens
    /// broker resources itself, only supervises worker processes.
    ClusterMaster,
    /// Clustering is enabled and this process is a worker spawned by the
    /// master, bound to exactly one queue.
    ClusterWorker,
}

impl Role {
    /// Resolves the role from configuration and environment.
    ///
    /// A worker is distinguished from the master by `COWORKERS_QUEUE_WORKER_NUM`,
    /// which the cluster manager injects only into the children it spawns
    /// (see [`coworkers_config::worker_index_from_env`]); a master process run
    /// directly by an operator never carries it.
    #[must_use]
    pub fn resolve(config: &AppConfig) -> Self {
        if !config.cluster {
            return Self::SingleProcess;
        }
        if coworkers_config::worker_index_from_env().is_some() {
            Self::ClusterWorker
        } else {
            Self::ClusterMaster
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coworkers_config::ConfigLoader;

    #[test]
    fn single_process_when_cluster_disabled() {
        let config = ConfigLoader::new()
            .with_cluster(false)
            .with_queue_name("orders")
            .load_unvalidated();
        assert_eq!(Role::resolve(&config), Role::SingleProcess);
    }

    #[test]
    fn master_when_cluster_enabled_without_worker_env() {
        // SAFETY-equivalent: no env mutation needed, the var is simply absent in test runs.
        let config = ConfigLoader::new().with_cluster(true).load_unvalidated();
        assert_eq!(Role::resolve(&config), Role::ClusterMaster);
    }
}
