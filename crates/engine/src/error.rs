//! Error types for the cache, node, and workflow layers.
//!
//! Mirrors the domain crate's convention: one `thiserror` enum per concern,
//! helper constructors, `#[from]` conversions at the seams. Nodes never let
//! these escape the engine boundary, the workflow catches them and folds
//! the message into the returned `GameState` (see §7 of the design).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("path escapes cache base directory: {0}")]
    PathTraversal(String),

    #[error("failed to read {namespace}/{key}: {message}")]
    Read { namespace: String, key: String, message: String },

    #[error("failed to write {namespace}/{key}: {message}")]
    Write { namespace: String, key: String, message: String },

    #[error("failed to deserialize {namespace}/{key}: {message}")]
    Deserialize { namespace: String, key: String, message: String },
}

impl CacheError {
    pub fn path_traversal(path: impl Into<String>) -> Self {
        Self::PathTraversal(path.into())
    }

    pub fn read(namespace: impl Into<String>, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Read {
            namespace: namespace.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn write(namespace: impl Into<String>, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Write {
            namespace: namespace.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn deserialize(namespace: impl Into<String>, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Deserialize {
            namespace: namespace.into(),
            key: key.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("narrator: {0}")]
    Narrator(String),

    #[error("rules: {0}")]
    Rules(String),

    #[error("decision: {0}")]
    Decision(String),

    #[error("trace: {0}")]
    Trace(String),
}

/// Reserved for failures that occur before a `GameState` exists to carry
/// an in-band error (e.g. a future non-filesystem storage adapter's
/// connection failure). `Workflow::turn` never constructs one today,
/// malformed input instead produces an error `GameState` per the
/// propagation policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("malformed start_workflow input: {0}")]
    MalformedInput(String),

    #[error(transparent)]
    Node(#[from] NodeError),
}
