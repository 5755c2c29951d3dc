//! The four turn-graph nodes (C2-C5): narrator, rules, decision, trace.
//! Each receives and returns a full `GameState`; only the sub-model it
//! owns is ever set on the value it returns.

pub mod decision;
mod markdown;
pub mod narrator;
pub mod rules;
pub mod trace;
