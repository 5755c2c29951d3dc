//! Gamebook turn workflow engine.
//!
//! ## Structure
//!
//! - `cache` - namespaced storage/cache port (C1) and its filesystem adapter
//! - `nodes` - narrator, rules, decision, trace (C2-C5)
//! - `workflow` - the turn graph orchestrator (C7)
//! - `config` - programmatic engine configuration
//! - `error` - error types for the cache, node, and workflow layers

pub mod cache;
pub mod config;
pub mod error;
pub mod nodes;
pub mod workflow;

pub use cache::{CacheKey, CachePort, FsCache, Namespace};
pub use config::EngineConfig;
pub use error::{CacheError, EngineError, NodeError};
pub use workflow::{TurnInput, Workflow};
