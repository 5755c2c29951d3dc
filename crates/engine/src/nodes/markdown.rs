//! Structured markdown codec for cached [`Rules`] entries. The format
//! fixed by the external interfaces contract: a `# Rules for Section N`
//! header followed by exactly five `##` sections (Metadata, Analysis,
//! Choices, Summary, Error). Missing any of the five is a parse failure,
//! which the rules node treats as a cache miss rather than an error.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gamebook_domain::{Choice, ChoiceType, DiceType, NextAction, Rules, RulesBuilder};

const SECTIONS: [&str; 5] = ["Metadata", "Analysis", "Choices", "Summary", "Error"];

pub fn serialize_rules(rules: &Rules) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Rules for Section {}\n\n", rules.section_number));

    out.push_str("## Metadata\n");
    out.push_str(&format!("- Dice_Type: {}\n", dice_type_str(rules.dice_type)));
    out.push_str(&format!("- Next_Action: {}\n", next_action_str(rules.next_action)));
    out.push_str(&format!("- Source: {}\n", single_line(&rules.source)));
    out.push_str(&format!("- Last_Update: {}\n\n", rules.last_update.to_rfc3339()));

    out.push_str("## Analysis\n");
    for condition in &rules.conditions {
        out.push_str(&format!("- {condition}\n"));
    }
    out.push('\n');

    out.push_str("## Choices\n");
    for choice in &rules.choices {
        out.push_str(&serialize_choice(choice));
    }
    out.push('\n');

    out.push_str("## Summary\n");
    out.push_str(&rules.rules_summary);
    out.push_str("\n\n");

    out.push_str("## Error\n");
    if let Some(error) = &rules.error {
        out.push_str(error);
        out.push('\n');
    }

    out
}

fn serialize_choice(choice: &Choice) -> String {
    let mut block = format!("* {} (Type: {})\n", choice.text, choice_type_str(choice.choice_type));
    if !choice.conditions.is_empty() {
        block.push_str(&format!("  - Conditions: {}\n", choice.conditions.join(", ")));
    }
    if choice.dice_type != DiceType::None {
        block.push_str(&format!("  - Dice_Type: {}\n", dice_type_str(choice.dice_type)));
    }
    if !choice.dice_results.is_empty() {
        let entries: Vec<String> = choice
            .dice_results
            .iter()
            .map(|(label, section)| format!("'{label}': {section}"))
            .collect();
        block.push_str(&format!("  - Dice_Results: {{{}}}\n", entries.join(", ")));
    }
    if let Some(target) = choice.target_section {
        block.push_str(&format!("  - Target: Section {target}\n"));
    }
    block
}

pub fn parse_rules(section_number: u32, markdown: &str) -> Result<Rules, String> {
    let sections = split_sections(markdown)?;

    let metadata = sections.get("Metadata").ok_or("missing Metadata section")?;
    let dice_type = field(metadata, "Dice_Type")
        .map(parse_dice_type)
        .transpose()?
        .unwrap_or(DiceType::None);
    let next_action = field(metadata, "Next_Action")
        .map(parse_next_action)
        .transpose()?
        .unwrap_or(NextAction::None);
    let source = field(metadata, "Source").unwrap_or_default();
    let last_update = field(metadata, "Last_Update")
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let analysis = sections.get("Analysis").ok_or("missing Analysis section")?;
    let conditions: Vec<String> = analysis
        .lines()
        .filter_map(|line| line.trim().strip_prefix("- ").map(str::to_string))
        .collect();

    let choices_block = sections.get("Choices").ok_or("missing Choices section")?;
    let choices = parse_choices(choices_block)?;

    let summary = sections.get("Summary").ok_or("missing Summary section")?.trim().to_string();

    let error_block = sections.get("Error").ok_or("missing Error section")?;
    let error = {
        let trimmed = error_block.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    };

    if let Some(message) = error {
        return Ok(Rules::error(section_number, message, last_update));
    }

    Rules::build(RulesBuilder {
        section_number,
        dice_type,
        next_action,
        conditions,
        choices,
        rules_summary: summary,
        source,
        last_update,
    })
    .map_err(|e| e.to_string())
}

fn split_sections(markdown: &str) -> Result<BTreeMap<String, String>, String> {
    let mut map = BTreeMap::new();
    let mut current: Option<&str> = None;
    let mut buffer = String::new();

    for line in markdown.lines() {
        if let Some(name) = line.strip_prefix("## ") {
            if let Some(name) = current.take() {
                map.insert(name.to_string(), std::mem::take(&mut buffer));
            }
            current = Some(name.trim());
        } else if current.is_some() {
            buffer.push_str(line);
            buffer.push('\n');
        }
    }
    if let Some(name) = current {
        map.insert(name.to_string(), buffer);
    }

    for required in SECTIONS {
        if !map.contains_key(required) {
            return Err(format!("missing {required} section"));
        }
    }
    Ok(map)
}

fn field(body: &str, key: &str) -> Option<String> {
    let prefix = format!("- {key}: ");
    body.lines()
        .find_map(|line| line.trim().strip_prefix(prefix.as_str()).map(str::to_string))
}

fn parse_choices(block: &str) -> Result<Vec<Choice>, String> {
    let mut choices = Vec::new();
    let mut lines = block.lines().peekable();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix("* ") else {
            continue;
        };
        let (text, choice_type) = parse_choice_header(rest)?;

        let mut conditions = Vec::new();
        let mut dice_type = DiceType::None;
        let mut dice_results = BTreeMap::new();
        let mut target_section = None;

        while let Some(next) = lines.peek() {
            let next_trimmed = next.trim();
            if next_trimmed.starts_with("* ") || next_trimmed.is_empty() {
                break;
            }
            let sub = lines.next().unwrap().trim();
            if let Some(value) = sub.strip_prefix("- Conditions: ") {
                conditions = value.split(',').map(|s| s.trim().to_string()).collect();
            } else if let Some(value) = sub.strip_prefix("- Dice_Type: ") {
                dice_type = parse_dice_type(value.to_string())?;
            } else if let Some(value) = sub.strip_prefix("- Dice_Results: ") {
                dice_results = parse_dice_results(value)?;
            } else if let Some(value) = sub.strip_prefix("- Target: Section ") {
                target_section = value.trim().parse().ok();
            }
        }

        let choice = match choice_type {
            ChoiceType::Direct => Choice::direct(
                text,
                target_section.ok_or("direct choice missing Target")?,
            ),
            ChoiceType::Conditional => Choice::conditional(text, conditions),
            ChoiceType::Dice => Choice::dice(text, dice_type, dice_results),
            ChoiceType::Mixed => Choice::mixed(text, conditions, dice_type, dice_results),
        }
        .map_err(|e| e.to_string())?;
        choices.push(choice);
    }

    Ok(choices)
}

fn parse_choice_header(rest: &str) -> Result<(String, ChoiceType), String> {
    let open = rest.rfind(" (Type: ").ok_or("choice header missing Type annotation")?;
    let text = rest[..open].to_string();
    let type_part = &rest[open + " (Type: ".len()..];
    let type_part = type_part.strip_suffix(')').ok_or("choice header missing closing paren")?;
    Ok((text, parse_choice_type(type_part)?))
}

fn parse_dice_results(raw: &str) -> Result<BTreeMap<String, u32>, String> {
    let inner = raw.trim().trim_start_matches('{').trim_end_matches('}');
    let mut map = BTreeMap::new();
    for entry in inner.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let mut parts = entry.splitn(2, ':');
        let label = parts.next().ok_or("malformed dice_results entry")?.trim().trim_matches('\'');
        let value = parts.next().ok_or("malformed dice_results entry")?.trim();
        map.insert(
            label.to_string(),
            value.parse::<u32>().map_err(|_| "malformed dice_results value".to_string())?,
        );
    }
    Ok(map)
}

fn dice_type_str(dice_type: DiceType) -> &'static str {
    match dice_type {
        DiceType::None => "none",
        DiceType::Chance => "chance",
        DiceType::Combat => "combat",
    }
}

fn parse_dice_type(raw: String) -> Result<DiceType, String> {
    match raw.trim() {
        "none" => Ok(DiceType::None),
        "chance" => Ok(DiceType::Chance),
        "combat" => Ok(DiceType::Combat),
        other => Err(format!("unknown dice_type: {other}")),
    }
}

fn next_action_str(next_action: NextAction) -> &'static str {
    match next_action {
        NextAction::None => "none",
        NextAction::UserFirst => "user_first",
        NextAction::DiceFirst => "dice_first",
    }
}

fn parse_next_action(raw: String) -> Result<NextAction, String> {
    match raw.trim() {
        "none" => Ok(NextAction::None),
        "user_first" => Ok(NextAction::UserFirst),
        "dice_first" => Ok(NextAction::DiceFirst),
        other => Err(format!("unknown next_action: {other}")),
    }
}

fn choice_type_str(choice_type: ChoiceType) -> &'static str {
    match choice_type {
        ChoiceType::Direct => "direct",
        ChoiceType::Conditional => "conditional",
        ChoiceType::Dice => "dice",
        ChoiceType::Mixed => "mixed",
    }
}

fn parse_choice_type(raw: &str) -> Result<ChoiceType, String> {
    match raw.trim() {
        "direct" => Ok(ChoiceType::Direct),
        "conditional" => Ok(ChoiceType::Conditional),
        "dice" => Ok(ChoiceType::Dice),
        "mixed" => Ok(ChoiceType::Mixed),
        other => Err(format!("unknown choice type: {other}")),
    }
}

fn single_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamebook_domain::Choice;

    fn sample_rules() -> Rules {
        let choice = Choice::direct("Go north", 2).unwrap();
        Rules::build(RulesBuilder {
            section_number: 1,
            dice_type: DiceType::None,
            next_action: NextAction::None,
            conditions: vec!["has_key".to_string()],
            choices: vec![choice],
            rules_summary: "A quiet crossroads.".to_string(),
            source: "raw text".to_string(),
            last_update: Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn round_trips_through_serialize_and_parse() {
        let rules = sample_rules();
        let markdown = serialize_rules(&rules);
        let parsed = parse_rules(1, &markdown).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.choices[0].target_section, Some(2));
        assert_eq!(parsed.conditions, vec!["has_key".to_string()]);
        assert_eq!(parsed.rules_summary, "A quiet crossroads.");
    }

    #[test]
    fn missing_section_is_a_parse_failure() {
        let broken = "# Rules for Section 1\n\n## Metadata\n\n## Analysis\n";
        assert!(parse_rules(1, broken).is_err());
    }

    #[test]
    fn dice_choice_round_trips_with_results() {
        let mut results = BTreeMap::new();
        results.insert("success".to_string(), 145);
        results.insert("failure".to_string(), 278);
        let choice = Choice::dice("Fight the dragon", DiceType::Combat, results).unwrap();
        let rules = Rules::build(RulesBuilder {
            section_number: 4,
            dice_type: DiceType::Combat,
            next_action: NextAction::None,
            conditions: Vec::new(),
            choices: vec![choice],
            rules_summary: "A dragon blocks the path.".to_string(),
            source: "raw".to_string(),
            last_update: Utc::now(),
        })
        .unwrap();

        let markdown = serialize_rules(&rules);
        let parsed = parse_rules(4, &markdown).unwrap();
        assert_eq!(parsed.choices[0].dice_results.get("success"), Some(&145));
        assert_eq!(parsed.choices[0].dice_results.get("failure"), Some(&278));
    }
}
