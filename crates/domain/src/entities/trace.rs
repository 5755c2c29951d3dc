//! Trace node output: the append-only action history for a session.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::character::Character;
use crate::entities::narrative::Narrative;
use crate::entities::rules::Rules;
use crate::error::DomainError;
use crate::ids::{GameId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    UserInput,
    DiceRoll,
    SectionChange,
    CharacterUpdate,
    Error,
}

/// A single recorded event in a session's history. Immutable once built:
/// the only way to add one is [`Trace::push`], which appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub timestamp: DateTime<Utc>,
    pub section: u32,
    pub action_type: ActionType,
    pub details: BTreeMap<String, Value>,
}

impl Action {
    pub fn new(
        section: u32,
        action_type: ActionType,
        details: BTreeMap<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if section == 0 {
            return Err(DomainError::validation("action section must be positive"));
        }
        match action_type {
            ActionType::DiceRoll if !details.contains_key("roll_result") => {
                return Err(DomainError::validation(
                    "dice_roll actions must include 'roll_result' in details",
                ));
            }
            ActionType::UserInput if !details.contains_key("input") => {
                return Err(DomainError::validation(
                    "user_input actions must include 'input' in details",
                ));
            }
            _ => {}
        }
        Ok(Self {
            timestamp: now,
            section,
            action_type,
            details,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub game_id: GameId,
    pub session_id: SessionId,
    pub section_number: u32,
    pub start_time: DateTime<Utc>,
    history: Vec<Action>,
    pub current_narrative: Option<Narrative>,
    pub current_rules: Option<Rules>,
    pub character: Option<Character>,
    pub error: Option<String>,
}

impl Trace {
    pub fn new(game_id: GameId, session_id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            game_id,
            session_id,
            section_number: 0,
            start_time: now,
            history: Vec::new(),
            current_narrative: None,
            current_rules: None,
            character: None,
            error: None,
        }
    }

    pub fn history(&self) -> &[Action] {
        &self.history
    }

    /// Append an action. Never truncates or replaces prior entries.
    pub fn push(&mut self, action: Action) {
        self.history.push(action);
    }

    /// Enforces the co-presence invariant: `current_narrative` and
    /// `current_rules` must both be set or both be absent, and an
    /// error-bearing trace carries neither.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.error.is_some() && (self.current_narrative.is_some() || self.current_rules.is_some())
        {
            return Err(DomainError::invalid_state_transition(
                "error state cannot carry current_narrative or current_rules",
            ));
        }
        if self.current_narrative.is_some() != self.current_rules.is_some() {
            return Err(DomainError::invalid_state_transition(
                "current_narrative and current_rules must both be set or both be absent",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dice_roll_requires_roll_result() {
        let err = Action::new(1, ActionType::DiceRoll, BTreeMap::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn user_input_requires_input_key() {
        let err = Action::new(1, ActionType::UserInput, BTreeMap::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn history_is_append_only() {
        let mut trace = Trace::new(GameId::new(), SessionId::new(), Utc::now());
        let mut details = BTreeMap::new();
        details.insert("input".to_string(), Value::String("north".into()));
        let action = Action::new(1, ActionType::UserInput, details, Utc::now()).unwrap();
        trace.push(action);
        assert_eq!(trace.history().len(), 1);
    }

    #[test]
    fn error_trace_rejects_current_section_presence() {
        let mut trace = Trace::new(GameId::new(), SessionId::new(), Utc::now());
        trace.error = Some("boom".into());
        trace.current_narrative = Some(Narrative::processed(1, "x".into(), Utc::now()));
        trace.current_rules = Some(Rules::error(1, "boom", Utc::now()));
        assert!(trace.validate().is_err());
    }
}
