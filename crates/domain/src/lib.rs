extern crate self as gamebook_domain;

pub mod entities;
pub mod error;
pub mod ids;

pub use entities::{
    Action, ActionType, AwaitingAction, Character, CharacterStats, Choice, ChoiceType, Decision,
    DiceType, GameState, GameStateUpdate, Inventory, Item, Narrative, NarrativeSourceType,
    NextAction, Origin, Rules, RulesBuilder, RulesSourceType, Trace,
};
pub use error::DomainError;
pub use ids::{GameId, SessionId};
