//! Domain entities: `GameState` and the sub-models owned by each workflow node.

mod character;
mod decision;
mod game_state;
mod narrative;
pub mod origin;
mod rules;
mod trace;

pub use character::{Character, CharacterStats, Inventory, Item};
pub use decision::{AwaitingAction, Decision};
pub use game_state::{GameState, GameStateUpdate};
pub use narrative::{Narrative, SourceType as NarrativeSourceType};
pub use origin::Origin;
pub use rules::{Choice, ChoiceType, DiceType, NextAction, Rules, RulesBuilder, SourceType as RulesSourceType};
pub use trace::{Action, ActionType, Trace};
