//! Decision node output: the routing verdict for the current turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::origin::{Origin, Originated};
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AwaitingAction {
    UserInput,
    DiceRoll,
    #[default]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub section_number: u32,
    pub next_section: Option<u32>,
    pub awaiting_action: AwaitingAction,
    pub conditions: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
    #[serde(default)]
    pub origin: Origin,
}

impl Decision {
    pub fn awaiting(
        section_number: u32,
        awaiting_action: AwaitingAction,
        conditions: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            section_number,
            next_section: None,
            awaiting_action,
            conditions,
            timestamp: now,
            error: None,
            origin: Origin::Decision,
        }
    }

    pub fn resolved(
        section_number: u32,
        next_section: u32,
        conditions: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if next_section == 0 {
            return Err(DomainError::validation("next_section must be positive"));
        }
        Ok(Self {
            section_number,
            next_section: Some(next_section),
            awaiting_action: AwaitingAction::None,
            conditions,
            timestamp: now,
            error: None,
            origin: Origin::Decision,
        })
    }

    pub fn error(section_number: u32, message: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            section_number,
            next_section: None,
            awaiting_action: AwaitingAction::None,
            conditions: Vec::new(),
            timestamp: now,
            error: Some(message.into()),
            origin: Origin::Decision,
        }
    }
}

impl Originated for Decision {
    fn origin(&self) -> Origin {
        self.origin
    }
}
