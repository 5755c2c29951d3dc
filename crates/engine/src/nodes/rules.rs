//! C3: rules node. Derives a structured [`Rules`] record for the current
//! section via keyword-directed text extraction, with a cache-hit
//! short-circuit and a byte-faithful markdown round-trip.

use gamebook_domain::{Choice, DiceType, GameState, NextAction, Origin, Rules, RulesBuilder};
use regex_lite::Regex;

use crate::cache::{CacheKey, CachePort};
use crate::error::NodeError;
use crate::nodes::markdown;

const DICE_KEYWORDS: &[&str] = &["jet de dés", "lancer les dés", "faire un jet"];
const COMBAT_KEYWORDS: &[&str] = &["combat", "affronter", "battre", "vaincre", "habileté", "endurance"];
const CHANCE_KEYWORDS: &[&str] = &["chance", "tentez votre chance", "test de chance"];

/// Runs the rules node against `state`, returning a `GameState` carrying a
/// rules-tagged [`Rules`] for `state.section_number`.
pub async fn run(cache: &dyn CachePort, state: &GameState) -> Result<GameState, NodeError> {
    let section_number = state.section_number;

    let cached_key = CacheKey::CachedRules(section_number);
    if let Some(markdown) = cache
        .get_cached(&cached_key)
        .await
        .map_err(|e| NodeError::Rules(e.to_string()))?
    {
        match markdown::parse_rules(section_number, &markdown) {
            Ok(rules) => return Ok(with_rules(state, rules)),
            Err(reason) => {
                tracing::warn!(section_number, %reason, "rules: cache entry failed to parse, falling back to raw");
            }
        }
    }

    let raw_rules_key = CacheKey::RawRules(section_number);
    let dedicated = cache
        .load_raw(&raw_rules_key)
        .await
        .map_err(|e| NodeError::Rules(e.to_string()))?;

    let content = match dedicated {
        Some(text) => text,
        None => {
            // No dedicated rules file for this section: fall back to the
            // same raw section text the narrator node reads, not its
            // formatted output (the two nodes run concurrently off the
            // same pre-fan-out state and never see each other's result).
            match cache
                .load_raw(&CacheKey::Section(section_number))
                .await
                .map_err(|e| NodeError::Rules(e.to_string()))?
            {
                Some(text) if !text.is_empty() => text,
                _ => {
                    let rules = Rules::error(section_number, "no content available for rule extraction", GameState::now());
                    return Ok(with_rules(state, rules));
                }
            }
        }
    };

    let rules = match extract_rules(section_number, &content) {
        Ok(rules) => rules,
        Err(reason) => Rules::error(section_number, reason, GameState::now()),
    };

    if rules.error.is_none() {
        let serialized = markdown::serialize_rules(&rules);
        if let Err(e) = cache.save_cached(&cached_key, &serialized).await {
            tracing::warn!(section_number, error = %e, "rules: failed to cache extracted rules");
        }
    }

    Ok(with_rules(state, rules))
}

fn with_rules(state: &GameState, rules: Rules) -> GameState {
    debug_assert_eq!(rules.origin, Origin::Rules);
    let mut next = state.clone();
    next.rules = Some(rules);
    next
}

/// Keyword-directed structural extraction: no LLM involved, just the
/// deterministic cue lists and a section-number scan over the raw text.
fn extract_rules(section_number: u32, content: &str) -> Result<Rules, String> {
    let lowered = content.to_lowercase();
    let has_dice = DICE_KEYWORDS.iter().any(|kw| lowered.contains(kw));
    let has_combat = COMBAT_KEYWORDS.iter().any(|kw| lowered.contains(kw));
    let has_chance = CHANCE_KEYWORDS.iter().any(|kw| lowered.contains(kw));

    let dice_type = if has_combat {
        DiceType::Combat
    } else if has_chance || has_dice {
        DiceType::Chance
    } else {
        DiceType::None
    };

    let candidates = candidate_sections(content);
    let choices = build_choices(dice_type, &candidates).map_err(|e| e.to_string())?;

    let builder = RulesBuilder {
        section_number,
        dice_type,
        next_action: NextAction::None,
        conditions: Vec::new(),
        choices,
        rules_summary: summarize(content),
        source: content.to_string(),
        last_update: GameState::now(),
    };
    Rules::build(builder).map_err(|e| e.to_string())
}

/// When a section has no dice cue, every candidate target becomes its own
/// direct choice. When it does, the candidates are bucketed into a single
/// dice choice (`success`/`failure`, in order of appearance) rather than
/// offered as independent branches; a dice outcome selects among them.
fn build_choices(dice_type: DiceType, candidates: &[u32]) -> Result<Vec<Choice>, gamebook_domain::DomainError> {
    if dice_type == DiceType::None || candidates.len() < 2 {
        return candidates
            .iter()
            .map(|&target| Choice::direct(format!("Go to section {target}"), target))
            .collect();
    }

    let mut results = std::collections::BTreeMap::new();
    let labels = ["success", "failure"];
    for (label, &target) in labels.iter().zip(candidates.iter()) {
        results.insert(label.to_string(), target);
    }
    for (idx, &target) in candidates.iter().skip(labels.len()).enumerate() {
        results.insert(format!("outcome_{}", idx + labels.len() + 1), target);
    }

    Ok(vec![Choice::dice("Resolve by dice roll", dice_type, results)?])
}

/// Pulls candidate next-section numbers out of phrases like "section 12",
/// "go to 4", and `[[7]]` tokens, in order of first appearance, deduped.
fn candidate_sections(content: &str) -> Vec<u32> {
    static PHRASE_PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    static BRACKET_PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();

    let phrase = PHRASE_PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:section|go to|allez à|allez a)\s+(\d+)").expect("static pattern compiles")
    });
    let bracket = BRACKET_PATTERN.get_or_init(|| Regex::new(r"\[\[\s*(\d+)\s*\]\]").expect("static pattern compiles"));

    let mut seen = Vec::new();
    for pattern in [phrase, bracket] {
        for captures in pattern.captures_iter(content) {
            if let Some(number) = captures.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
                if !seen.contains(&number) {
                    seen.push(number);
                }
            }
        }
    }
    seen
}

fn summarize(content: &str) -> String {
    content
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .chars()
        .take(160)
        .collect()
}
