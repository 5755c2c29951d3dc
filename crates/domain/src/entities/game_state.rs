//! `GameState`: the single unit of flow between workflow nodes.
//!
//! Immutable after construction. Every transition documented here returns
//! a new instance rather than mutating `self`. The merge operators encode
//! the per-field reducer table from the state model: some fields are
//! "take-last" (the producing node is unambiguous), others are
//! origin-gated ("take-from-node") so a stale or mistagged concurrent
//! candidate can never clobber a field it doesn't own.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::character::Character;
use crate::entities::decision::{AwaitingAction, Decision};
use crate::entities::narrative::Narrative;
use crate::entities::origin::{take_from_node, Origin};
use crate::entities::rules::Rules;
use crate::entities::trace::Trace;
use crate::error::DomainError;
use crate::ids::{GameId, SessionId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub session_id: SessionId,
    pub game_id: GameId,
    pub section_number: u32,
    pub player_input: Option<String>,
    pub narrative: Option<Narrative>,
    pub rules: Option<Rules>,
    pub decision: Option<Decision>,
    pub trace: Option<Trace>,
    pub character: Option<Character>,
    pub error: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    pub should_continue: bool,
}

impl GameState {
    /// `create_initial_state`: a fresh session at section 1, no sub-models.
    pub fn initial(game_id: GameId, session_id: SessionId) -> Self {
        Self {
            session_id,
            game_id,
            section_number: 1,
            player_input: None,
            narrative: None,
            rules: None,
            decision: None,
            trace: None,
            character: None,
            error: None,
            metadata: BTreeMap::new(),
            should_continue: false,
        }
    }

    /// `create_error_state`: preserves identifiers and section number from
    /// `base` (when given), clears node-owned sub-models, and records the
    /// message.
    pub fn error_state(message: impl Into<String>, base: Option<&GameState>) -> Self {
        match base {
            Some(base) => Self {
                session_id: base.session_id,
                game_id: base.game_id,
                section_number: base.section_number,
                player_input: None,
                narrative: None,
                rules: None,
                decision: None,
                trace: base.trace.clone(),
                character: base.character.clone(),
                error: Some(message.into()),
                metadata: base.metadata.clone(),
                should_continue: false,
            },
            None => Self {
                session_id: SessionId::new(),
                game_id: GameId::new(),
                section_number: 1,
                player_input: None,
                narrative: None,
                rules: None,
                decision: None,
                trace: None,
                character: None,
                error: Some(message.into()),
                metadata: BTreeMap::new(),
                should_continue: false,
            },
        }
    }

    /// Fan in the narrator and rules nodes' concurrent outputs. `session_id`,
    /// `game_id`, `section_number`, and `player_input` are carried from
    /// `base` unconditionally (neither concurrent node owns them);
    /// `narrative`/`rules` are origin-gated so one node's output can never
    /// land in the other's field.
    pub fn merge_parallel(base: &GameState, narrator_output: &GameState, rules_output: &GameState) -> Self {
        let narrative = take_from_node(&base.narrative, &narrator_output.narrative, Origin::Narrator);
        let rules = take_from_node(&base.rules, &rules_output.rules, Origin::Rules);
        let error = rules_output
            .error
            .clone()
            .or_else(|| narrator_output.error.clone())
            .or_else(|| base.error.clone());
        Self {
            session_id: base.session_id,
            game_id: base.game_id,
            section_number: base.section_number,
            player_input: base.player_input.clone(),
            narrative,
            rules,
            decision: base.decision.clone(),
            trace: base.trace.clone(),
            character: base.character.clone(),
            error,
            metadata: base.metadata.clone(),
            should_continue: base.should_continue,
        }
    }

    /// Decision is the sole producer of `decision` (take-last); it may also
    /// replace `character` (stat effects) and `error` (routing failure).
    /// Everything else is carried from `base`.
    pub fn apply_decision(base: &GameState, decision: Decision, character: Option<Character>) -> Self {
        let error = decision.error.clone().or_else(|| base.error.clone());
        Self {
            decision: Some(decision),
            character: character.or_else(|| base.character.clone()),
            error,
            ..base.clone()
        }
    }

    /// Trace is the last writer before `end`; it owns `trace` alone.
    pub fn apply_trace(base: &GameState, trace: Trace) -> Self {
        Self {
            trace: Some(trace),
            ..base.clone()
        }
    }

    /// `with_updates`: session/game ids are always preserved; every other
    /// field is replaced only where the caller supplies a value.
    pub fn with_updates(&self, updates: GameStateUpdate) -> Self {
        Self {
            session_id: self.session_id,
            game_id: self.game_id,
            section_number: updates.section_number.unwrap_or(self.section_number),
            player_input: updates.player_input.unwrap_or_else(|| self.player_input.clone()),
            narrative: updates.narrative.or_else(|| self.narrative.clone()),
            rules: updates.rules.or_else(|| self.rules.clone()),
            decision: updates.decision.or_else(|| self.decision.clone()),
            trace: updates.trace.or_else(|| self.trace.clone()),
            character: updates.character.or_else(|| self.character.clone()),
            error: updates.error.unwrap_or_else(|| self.error.clone()),
            metadata: updates.metadata.unwrap_or_else(|| self.metadata.clone()),
            should_continue: updates.should_continue.unwrap_or(self.should_continue),
        }
    }

    /// Enforces the section-number synchronization invariant: every
    /// sub-model that carries its own `section_number` must agree with
    /// `self.section_number`.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.section_number == 0 {
            return Err(DomainError::validation("section_number must be positive"));
        }
        if let Some(narrative) = &self.narrative {
            if narrative.section_number != self.section_number {
                return Err(DomainError::invalid_state_transition(
                    "narrative.section_number does not match GameState.section_number",
                ));
            }
        }
        if let Some(rules) = &self.rules {
            if rules.section_number != self.section_number {
                return Err(DomainError::invalid_state_transition(
                    "rules.section_number does not match GameState.section_number",
                ));
            }
        }
        if let Some(trace) = &self.trace {
            if trace.section_number != 0 && trace.section_number != self.section_number {
                return Err(DomainError::invalid_state_transition(
                    "trace.section_number does not match GameState.section_number",
                ));
            }
            trace.validate()?;
        }
        Ok(())
    }

    /// The engine's single halting decision point: `false` means the turn
    /// ended and the caller must supply missing input (or accept an error)
    /// before the next turn can run.
    pub fn should_continue(&self) -> bool {
        if self.error.is_some() {
            return false;
        }
        let end_game = self
            .metadata
            .get("end_game")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if end_game {
            return false;
        }
        if self.section_number == 0 {
            return false;
        }
        if let Some(decision) = &self.decision {
            if decision.awaiting_action != AwaitingAction::None {
                return false;
            }
        }
        true
    }

    pub fn tag_node(&mut self, node: &str) {
        self.metadata
            .insert("node".to_string(), Value::String(node.to_string()));
    }

    pub fn now() -> chrono::DateTime<Utc> {
        Utc::now()
    }
}

/// Partial update for [`GameState::with_updates`]. `Some(None)` on an
/// `Option<Option<T>>` field clears it; `None` leaves the field untouched.
#[derive(Default)]
pub struct GameStateUpdate {
    pub section_number: Option<u32>,
    pub player_input: Option<Option<String>>,
    pub narrative: Option<Narrative>,
    pub rules: Option<Rules>,
    pub decision: Option<Decision>,
    pub trace: Option<Trace>,
    pub character: Option<Character>,
    pub error: Option<Option<String>>,
    pub metadata: Option<BTreeMap<String, Value>>,
    pub should_continue: Option<bool>,
}
