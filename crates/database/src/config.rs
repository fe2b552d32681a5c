//! Database configuration.

use marrow_index::DEFAULT_ORDER;
use marrow_storage::{BackoffConfig, IsolationLevel};

/// Settings shared by every table and transaction of a database.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Isolation level of transactions started without an explicit one.
    pub default_isolation: IsolationLevel,
    /// Copy entities returned by queries so callers never share the stored
    /// ones. Can be overridden per query.
    pub clone_entities: bool,
    /// Backoff policy of the table locks.
    pub backoff: BackoffConfig,
    /// Node order of ordered indexes.
    pub btree_order: usize,
}

impl DatabaseConfig {
    pub const DEFAULT_BTREE_ORDER: usize = DEFAULT_ORDER;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.default_isolation = isolation;
        self
    }

    pub fn clone_entities(mut self, clone: bool) -> Self {
        self.clone_entities = clone;
        self
    }

    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the B+tree node order. Orders below the tree's minimum are
    /// raised by the index itself.
    pub fn btree_order(mut self, order: usize) -> Self {
        self.btree_order = order;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            default_isolation: IsolationLevel::default(),
            clone_entities: true,
            backoff: BackoffConfig::default(),
            btree_order: Self::DEFAULT_BTREE_ORDER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.default_isolation, IsolationLevel::ReadCommitted);
        assert!(config.clone_entities);
        assert_eq!(config.btree_order, 64);
    }

    #[test]
    fn test_builder() {
        let backoff = BackoffConfig {
            spin_limit: 1,
            yield_limit: 2,
            sleep: Duration::from_micros(10),
        };
        let config = DatabaseConfig::new()
            .default_isolation(IsolationLevel::Serializable)
            .clone_entities(false)
            .backoff(backoff)
            .btree_order(16);
        assert_eq!(config.default_isolation, IsolationLevel::Serializable);
        assert!(!config.clone_entities);
        assert_eq!(config.backoff, backoff);
        assert_eq!(config.btree_order, 16);
    }
}
