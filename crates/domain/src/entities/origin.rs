//! Node-origin tagging for fan-in merges.
//!
//! Each sub-model produced by a node carries the tag of the node that
//! produced it. The workflow engine's fan-in merge dispatches on this tag
//! rather than on field position, so a mistagged or stale candidate from a
//! concurrent node never clobbers a field it doesn't own.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Origin {
    Narrator,
    Rules,
    Decision,
    #[default]
    Untagged,
}

/// Implemented by sub-models that participate in origin-gated fan-in merges.
pub trait Originated {
    fn origin(&self) -> Origin;
}

/// Take `candidate` only if it is tagged as coming from `expected`; otherwise
/// keep `existing`. Models the "take-from-node=X" merge rule from the state
/// model (narrator owns `narrative`, rules owns `rules`).
pub fn take_from_node<T: Originated + Clone>(
    existing: &Option<T>,
    candidate: &Option<T>,
    expected: Origin,
) -> Option<T> {
    match candidate {
        Some(value) if value.origin() == expected => Some(value.clone()),
        _ => existing.clone(),
    }
}
