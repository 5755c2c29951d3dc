//! C4: decision node. Given the merged narrator+rules state and player
//! input (plus an optional already-rolled dice value), chooses the next
//! section or reports what the turn is still waiting on.

use gamebook_domain::{AwaitingAction, Choice, ChoiceType, Decision, GameState, NextAction};

use crate::error::NodeError;

/// Runs the decision node against `state`, which must already carry the
/// merged narrator/rules outputs for the current section.
pub fn run(state: &GameState) -> Result<GameState, NodeError> {
    let section_number = state.section_number;
    let now = GameState::now();

    if let Some(error) = state.error.clone() {
        let decision = Decision::error(section_number, error, now);
        return Ok(GameState::apply_decision(state, decision, None));
    }

    let Some(rules) = state.rules.clone() else {
        let decision = Decision::error(section_number, "decision node has no rules to act on", now);
        return Ok(GameState::apply_decision(state, decision, None));
    };

    if let Some(error) = rules.error.clone() {
        let decision = Decision::error(section_number, error, now);
        return Ok(GameState::apply_decision(state, decision, None));
    }

    let has_input = state.player_input.as_deref().is_some_and(|s| !s.trim().is_empty());
    let has_dice = dice_result(state).is_some();

    // Explicit ordering, when the rules node specified one.
    match rules.next_action {
        NextAction::UserFirst if !has_input => {
            let decision = Decision::awaiting(section_number, AwaitingAction::UserInput, rules.conditions.clone(), now);
            return Ok(GameState::apply_decision(state, decision, None));
        }
        NextAction::DiceFirst if !has_dice => {
            let decision = Decision::awaiting(section_number, AwaitingAction::DiceRoll, rules.conditions.clone(), now);
            return Ok(GameState::apply_decision(state, decision, None));
        }
        _ => {}
    }

    // No explicit ordering: dice takes precedence over user input.
    if rules.needs_dice && !has_dice {
        let decision = Decision::awaiting(section_number, AwaitingAction::DiceRoll, rules.conditions.clone(), now);
        return Ok(GameState::apply_decision(state, decision, None));
    }
    if rules.needs_user_response && !has_input {
        let decision = Decision::awaiting(section_number, AwaitingAction::UserInput, rules.conditions.clone(), now);
        return Ok(GameState::apply_decision(state, decision, None));
    }

    match resolve_next_section(state, &rules) {
        Ok(next_section) => {
            let decision = Decision::resolved(section_number, next_section, rules.conditions.clone(), now)
                .map_err(|e| NodeError::Decision(e.to_string()))?;
            Ok(GameState::apply_decision(state, decision, None))
        }
        Err(reason) => {
            let decision = Decision::error(section_number, reason, now);
            Ok(GameState::apply_decision(state, decision, None))
        }
    }
}

fn dice_result(state: &GameState) -> Option<u32> {
    state
        .metadata
        .get("dice_result")
        .and_then(|v| v.as_u64())
        .map(|v| v as u32)
}

/// Resolves `next_section` per the ordered policy: matched choice's
/// target, else the matched dice/mixed choice's bucket, else the first
/// rules-derived candidate, else `section_number + 1`.
fn resolve_next_section(state: &GameState, rules: &gamebook_domain::Rules) -> Result<u32, String> {
    if let Some(choice) = matched_choice(state, rules) {
        if let Some(target) = choice.target_section {
            return Ok(target);
        }
        if matches!(choice.choice_type, ChoiceType::Dice | ChoiceType::Mixed) {
            if let Some(value) = dice_result(state) {
                if let Some(section) = resolve_dice_bucket(choice, value) {
                    return Ok(section);
                }
            }
            return Err("dice choice matched but no bucket resolved".to_string());
        }
    }

    if let Some(first) = rules.choices.iter().find_map(|c| c.target_section) {
        return Ok(first);
    }

    let fallback = state.section_number.checked_add(1).ok_or("section_number overflow")?;
    if fallback == 0 {
        return Err("resolved next_section must be positive".to_string());
    }
    Ok(fallback)
}

/// Matches `player_input` against `rules.choices`: an exact text match
/// wins over a 1-based index match.
fn matched_choice<'a>(state: &GameState, rules: &'a gamebook_domain::Rules) -> Option<&'a Choice> {
    let input = state.player_input.as_deref()?.trim();
    if input.is_empty() {
        return None;
    }
    if let Some(choice) = rules.choices.iter().find(|c| c.text.eq_ignore_ascii_case(input)) {
        return Some(choice);
    }
    let index: usize = input.parse().ok()?;
    index.checked_sub(1).and_then(|i| rules.choices.get(i))
}

/// Derives an outcome bucket label from a rolled value and the choice's
/// dice type, then looks it up in `dice_results`. Chance rolls use a
/// single d6; a roll of 4 or higher succeeds. Both dice types (chance and
/// combat) use the same scale: the engine accepts an already-rolled value
/// and has no opinion on how many physical dice produced it.
fn resolve_dice_bucket(choice: &Choice, value: u32) -> Option<u32> {
    let bucket = if value >= 4 { "success" } else { "failure" };
    choice
        .dice_results
        .get(bucket)
        .copied()
        .or_else(|| choice.dice_results.values().next().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamebook_domain::{Choice, DiceType, GameId, Rules, RulesBuilder, SessionId};
    use std::collections::BTreeMap;

    fn base_state() -> GameState {
        GameState::initial(GameId::new(), SessionId::new())
    }

    fn with_rules(rules: Rules) -> GameState {
        let mut state = base_state();
        state.rules = Some(rules);
        state
    }

    #[test]
    fn awaits_user_input_when_needed_and_absent() {
        let choice = Choice::direct("go north", 2).unwrap();
        let rules = Rules::build(RulesBuilder {
            section_number: 1,
            dice_type: DiceType::None,
            next_action: NextAction::None,
            conditions: Vec::new(),
            choices: vec![choice],
            rules_summary: String::new(),
            source: String::new(),
            last_update: GameState::now(),
        })
        .unwrap();
        let state = with_rules(rules);
        let output = run(&state).unwrap();
        assert_eq!(output.decision.unwrap().awaiting_action, AwaitingAction::UserInput);
    }

    #[test]
    fn dice_takes_precedence_when_order_unspecified() {
        let mut results = BTreeMap::new();
        results.insert("success".to_string(), 10);
        let choice = Choice::dice("fight", DiceType::Combat, results).unwrap();
        let rules = Rules::build(RulesBuilder {
            section_number: 1,
            dice_type: DiceType::Combat,
            next_action: NextAction::None,
            conditions: Vec::new(),
            choices: vec![choice],
            rules_summary: String::new(),
            source: String::new(),
            last_update: GameState::now(),
        })
        .unwrap();
        let mut state = with_rules(rules);
        state.player_input = Some("1".to_string());
        let output = run(&state).unwrap();
        assert_eq!(output.decision.unwrap().awaiting_action, AwaitingAction::DiceRoll);
    }

    #[test]
    fn resolves_direct_choice_by_index() {
        let choice = Choice::direct("go north", 2).unwrap();
        let rules = Rules::build(RulesBuilder {
            section_number: 1,
            dice_type: DiceType::None,
            next_action: NextAction::None,
            conditions: Vec::new(),
            choices: vec![choice],
            rules_summary: String::new(),
            source: String::new(),
            last_update: GameState::now(),
        })
        .unwrap();
        let mut state = with_rules(rules);
        state.player_input = Some("1".to_string());
        let output = run(&state).unwrap();
        assert_eq!(output.decision.unwrap().next_section, Some(2));
    }

    #[test]
    fn resolves_dice_choice_once_roll_is_present() {
        let mut results = BTreeMap::new();
        results.insert("success".to_string(), 145);
        results.insert("failure".to_string(), 278);
        let choice = Choice::dice("fight", DiceType::Combat, results).unwrap();
        let rules = Rules::build(RulesBuilder {
            section_number: 1,
            dice_type: DiceType::Combat,
            next_action: NextAction::None,
            conditions: Vec::new(),
            choices: vec![choice],
            rules_summary: String::new(),
            source: String::new(),
            last_update: GameState::now(),
        })
        .unwrap();
        let mut state = with_rules(rules);
        state.player_input = Some("1".to_string());
        state.metadata.insert("dice_result".to_string(), serde_json::json!(9));
        let output = run(&state).unwrap();
        assert_eq!(output.decision.unwrap().next_section, Some(145));
    }

    #[test]
    fn rules_error_propagates_to_decision_error() {
        let rules = Rules::error(1, "extraction failed", GameState::now());
        let state = with_rules(rules);
        let output = run(&state).unwrap();
        let decision = output.decision.unwrap();
        assert!(decision.error.is_some());
        assert!(!output.should_continue());
    }

    #[test]
    fn falls_back_to_section_plus_one_with_no_choices() {
        let rules = Rules::build(RulesBuilder {
            section_number: 1,
            dice_type: DiceType::None,
            next_action: NextAction::None,
            conditions: Vec::new(),
            choices: Vec::new(),
            rules_summary: String::new(),
            source: String::new(),
            last_update: GameState::now(),
        })
        .unwrap();
        let state = with_rules(rules);
        let output = run(&state).unwrap();
        assert_eq!(output.decision.unwrap().next_section, Some(2));
    }
}
