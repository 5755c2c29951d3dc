//! C5: trace node. Appends a derived [`Action`] to the session's history
//! and persists both the current trace snapshot and a rolling history
//! record, per the dual-write contract.

use std::collections::BTreeMap;

use gamebook_domain::{Action, ActionType, GameState, Trace};
use serde_json::Value;

use crate::cache::{CacheKey, CachePort};
use crate::error::NodeError;

/// Runs the trace node against `state`, which must already carry the
/// decision node's output. `incoming_section` is the section the turn
/// started on, used to detect a `section_change` action.
pub async fn run(
    cache: &dyn CachePort,
    state: &GameState,
    incoming_section: u32,
) -> Result<GameState, NodeError> {
    let now = GameState::now();
    let mut trace = state
        .trace
        .clone()
        .unwrap_or_else(|| Trace::new(state.game_id, state.session_id, now));

    if let Some(action) = derive_action(state, incoming_section, now) {
        trace.push(action);
    }

    let game_id = state.game_id;
    let session_id = state.session_id;

    let snapshot = serde_json::to_string(&trace).map_err(|e| NodeError::Trace(e.to_string()))?;

    // Persistence failures are reported on the returned state, not raised:
    // the turn still completes, it just carries a record of what failed to
    // save.
    let mut persist_error = None;
    if let Err(e) = cache
        .save_cached(&CacheKey::Trace { game_id, session_id }, &snapshot)
        .await
    {
        tracing::warn!(%session_id, error = %e, "trace: failed to persist current trace snapshot");
        persist_error = Some(format!("trace: failed to persist current trace snapshot: {e}"));
    }

    if !trace.history().is_empty() {
        if let Err(e) = cache
            .save_cached(&CacheKey::TraceHistory { game_id, session_id }, &snapshot)
            .await
        {
            tracing::warn!(%session_id, error = %e, "trace: failed to persist rolling history");
            persist_error.get_or_insert_with(|| format!("trace: failed to persist rolling history: {e}"));
        }
    }

    if let Some(message) = persist_error {
        trace.error = Some(message.clone());
        let mut next = GameState::apply_trace(state, trace);
        next.error.get_or_insert(message);
        return Ok(next);
    }

    Ok(GameState::apply_trace(state, trace))
}

fn derive_action(state: &GameState, incoming_section: u32, now: chrono::DateTime<chrono::Utc>) -> Option<Action> {
    if let Some(error) = &state.error {
        let mut details = BTreeMap::new();
        details.insert("message".to_string(), Value::String(error.clone()));
        return Action::new(state.section_number.max(1), ActionType::Error, details, now).ok();
    }

    if let Some(decision) = &state.decision {
        if let Some(next) = decision.next_section {
            if next != incoming_section {
                let mut details = BTreeMap::new();
                details.insert("from".to_string(), Value::from(incoming_section));
                details.insert("to".to_string(), Value::from(next));
                return Action::new(incoming_section, ActionType::SectionChange, details, now).ok();
            }
        }
    }

    if let Some(dice_result) = state.metadata.get("dice_result") {
        let mut details = BTreeMap::new();
        details.insert("roll_result".to_string(), dice_result.clone());
        return Action::new(state.section_number, ActionType::DiceRoll, details, now).ok();
    }

    if let Some(input) = state.player_input.as_deref().filter(|s| !s.trim().is_empty()) {
        let mut details = BTreeMap::new();
        details.insert("input".to_string(), Value::String(input.to_string()));
        return Action::new(state.section_number, ActionType::UserInput, details, now).ok();
    }

    None
}
