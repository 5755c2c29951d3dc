//! Engine configuration. No env/file loader; the embedding application
//! constructs this programmatically; the crate exposes no CLI surface.
//!
//! The cache root directory is not part of this struct: it belongs to
//! whichever `CachePort` adapter the caller constructs (e.g. `FsCache::new`)
//! and hands to `Workflow::new` alongside this config, keeping the engine's
//! own knobs independent of a specific storage backend.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline applied to each node invocation within a turn.
    pub node_timeout: Duration,
    /// Upper bound on turns `Workflow` runs concurrently across all
    /// sessions, enforced by a semaphore. Turns within one session are
    /// always serialized regardless of this value (see concurrency model).
    pub max_parallel_sessions: usize,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            node_timeout: Duration::from_secs(30),
            max_parallel_sessions: 16,
        }
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    pub fn with_max_parallel_sessions(mut self, max: usize) -> Self {
        self.max_parallel_sessions = max;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::new();
        assert_eq!(config.node_timeout, Duration::from_secs(30));
        assert!(config.max_parallel_sessions > 0);
    }
}
