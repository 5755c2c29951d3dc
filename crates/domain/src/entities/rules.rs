//! Rules node output: dice requirements, choices, and routing conditions
//! for the current section.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::origin::{Origin, Originated};
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiceType {
    #[default]
    None,
    Chance,
    Combat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    #[default]
    None,
    UserFirst,
    DiceFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Raw,
    Processed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceType {
    Direct,
    Conditional,
    Dice,
    Mixed,
}

/// A single branch out of the current section.
///
/// Construction is validated against the type-specific field requirements
/// in the state model: a `direct` choice carries only a target, a `dice`
/// choice carries only dice data, `mixed` carries both plus conditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub text: String,
    pub choice_type: ChoiceType,
    pub target_section: Option<u32>,
    pub conditions: Vec<String>,
    pub dice_type: DiceType,
    pub dice_results: BTreeMap<String, u32>,
}

impl Choice {
    pub fn direct(text: impl Into<String>, target_section: u32) -> Result<Self, DomainError> {
        if target_section == 0 {
            return Err(DomainError::validation(
                "direct choice target_section must be positive",
            ));
        }
        Ok(Self {
            text: text.into(),
            choice_type: ChoiceType::Direct,
            target_section: Some(target_section),
            conditions: Vec::new(),
            dice_type: DiceType::None,
            dice_results: BTreeMap::new(),
        })
    }

    pub fn conditional(
        text: impl Into<String>,
        conditions: Vec<String>,
    ) -> Result<Self, DomainError> {
        if conditions.is_empty() {
            return Err(DomainError::validation(
                "conditional choice requires at least one condition",
            ));
        }
        Ok(Self {
            text: text.into(),
            choice_type: ChoiceType::Conditional,
            target_section: None,
            conditions,
            dice_type: DiceType::None,
            dice_results: BTreeMap::new(),
        })
    }

    pub fn dice(
        text: impl Into<String>,
        dice_type: DiceType,
        dice_results: BTreeMap<String, u32>,
    ) -> Result<Self, DomainError> {
        if dice_type == DiceType::None {
            return Err(DomainError::validation(
                "dice choice requires a non-none dice_type",
            ));
        }
        if dice_results.is_empty() {
            return Err(DomainError::validation(
                "dice choice requires at least one dice_results entry",
            ));
        }
        Ok(Self {
            text: text.into(),
            choice_type: ChoiceType::Dice,
            target_section: None,
            conditions: Vec::new(),
            dice_type,
            dice_results,
        })
    }

    pub fn mixed(
        text: impl Into<String>,
        conditions: Vec<String>,
        dice_type: DiceType,
        dice_results: BTreeMap<String, u32>,
    ) -> Result<Self, DomainError> {
        if conditions.is_empty() {
            return Err(DomainError::validation(
                "mixed choice requires at least one condition",
            ));
        }
        if dice_type == DiceType::None || dice_results.is_empty() {
            return Err(DomainError::validation(
                "mixed choice requires dice_type and dice_results",
            ));
        }
        Ok(Self {
            text: text.into(),
            choice_type: ChoiceType::Mixed,
            target_section: None,
            conditions,
            dice_type,
            dice_results,
        })
    }
}

/// Structured rule extraction for one section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rules {
    pub section_number: u32,
    pub dice_type: DiceType,
    pub needs_dice: bool,
    pub needs_user_response: bool,
    pub next_action: NextAction,
    pub conditions: Vec<String>,
    pub choices: Vec<Choice>,
    pub rules_summary: String,
    pub error: Option<String>,
    pub source: String,
    pub source_type: SourceType,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub origin: Origin,
}

pub struct RulesBuilder {
    pub section_number: u32,
    pub dice_type: DiceType,
    pub next_action: NextAction,
    pub conditions: Vec<String>,
    pub choices: Vec<Choice>,
    pub rules_summary: String,
    pub source: String,
    pub last_update: DateTime<Utc>,
}

impl Rules {
    pub fn build(builder: RulesBuilder) -> Result<Self, DomainError> {
        let RulesBuilder {
            section_number,
            dice_type,
            next_action,
            conditions,
            choices,
            rules_summary,
            source,
            last_update,
        } = builder;

        if choices
            .iter()
            .any(|c| matches!(c.choice_type, ChoiceType::Dice | ChoiceType::Mixed))
            && dice_type == DiceType::None
        {
            return Err(DomainError::validation(
                "a dice/mixed choice requires dice_type != none",
            ));
        }

        let needs_dice = dice_type != DiceType::None;
        let needs_user_response = needs_dice || !choices.is_empty();

        match next_action {
            NextAction::UserFirst if !needs_user_response => {
                return Err(DomainError::validation(
                    "next_action=user_first requires needs_user_response",
                ));
            }
            NextAction::DiceFirst if !needs_dice => {
                return Err(DomainError::validation(
                    "next_action=dice_first requires needs_dice",
                ));
            }
            _ => {}
        }

        Ok(Self {
            section_number,
            dice_type,
            needs_dice,
            needs_user_response,
            next_action,
            conditions,
            choices,
            rules_summary,
            error: None,
            source,
            source_type: SourceType::Processed,
            last_update,
            origin: Origin::Rules,
        })
    }

    pub fn error(section_number: u32, message: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            section_number,
            dice_type: DiceType::None,
            needs_dice: false,
            needs_user_response: false,
            next_action: NextAction::None,
            conditions: Vec::new(),
            choices: Vec::new(),
            rules_summary: String::new(),
            error: Some(message.into()),
            source: String::new(),
            source_type: SourceType::Error,
            last_update: now,
            origin: Origin::Rules,
        }
    }
}

impl Originated for Rules {
    fn origin(&self) -> Origin {
        self.origin
    }
}
