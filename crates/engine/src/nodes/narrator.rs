//! C2: narrator node. Loads and formats the raw markdown for the current
//! section, caching the formatted form for subsequent turns.

use gamebook_domain::{GameState, Narrative, Origin};

use crate::cache::{CacheKey, CachePort};
use crate::error::NodeError;

/// Runs the narrator node against `state`, returning a `GameState` carrying
/// a narrator-tagged `Narrative` for `state.section_number`.
pub async fn run(cache: &dyn CachePort, state: &GameState) -> Result<GameState, NodeError> {
    let section_number = state.section_number;

    let cached_key = CacheKey::CachedSection(section_number);
    if let Some(content) = cache
        .get_cached(&cached_key)
        .await
        .map_err(|e| NodeError::Narrator(e.to_string()))?
    {
        let narrative = Narrative::processed(section_number, content, GameState::now());
        return Ok(with_narrative(state, narrative));
    }

    let raw_key = CacheKey::Section(section_number);
    let raw = cache
        .load_raw(&raw_key)
        .await
        .map_err(|e| NodeError::Narrator(e.to_string()))?;

    let Some(raw_content) = raw else {
        let narrative = Narrative::error(
            section_number,
            format!("Section {section_number} not found"),
            GameState::now(),
        );
        return Ok(with_narrative(state, narrative));
    };

    let formatted = format_section(&raw_content);

    // Cache save failures are logged, never fatal to the turn.
    if let Err(e) = cache.save_cached(&cached_key, &formatted).await {
        tracing::warn!(section_number, error = %e, "narrator: failed to cache formatted section");
    }

    let narrative = Narrative::processed(section_number, formatted, GameState::now());
    Ok(with_narrative(state, narrative))
}

/// Clones `state` with `narrative` attached, carrying its narrator-origin
/// tag through untouched. The workflow engine is the one that reconciles
/// this against the rules node's output via `GameState::merge_parallel`.
fn with_narrative(state: &GameState, narrative: Narrative) -> GameState {
    debug_assert_eq!(narrative.origin, Origin::Narrator);
    let mut next = state.clone();
    next.narrative = Some(narrative);
    next
}

/// Converts raw markdown into HTML-equivalent markup: `#`/`##` headings
/// become `<h1>`/`<h2>`, `*emphasis*` spans become `<em>`, and ordinary
/// prose lines are wrapped in `<p>`. Choice tokens (`[[n]]`, `* text`
/// bullets) are preserved untouched. This is the deterministic fallback
/// path; there is no external formatter call here.
fn format_section(raw: &str) -> String {
    static EMPHASIS: std::sync::OnceLock<regex_lite::Regex> = std::sync::OnceLock::new();
    let emphasis = EMPHASIS.get_or_init(|| regex_lite::Regex::new(r"\*([^*\n]+)\*").expect("static pattern compiles"));

    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("## ") {
            out.push_str("<h2>");
            out.push_str(heading);
            out.push_str("</h2>");
        } else if let Some(heading) = trimmed.strip_prefix("# ") {
            out.push_str("<h1>");
            out.push_str(heading);
            out.push_str("</h1>");
        } else if trimmed.starts_with("* ") || trimmed.contains("[[") {
            out.push_str(trimmed);
        } else if trimmed.is_empty() {
            // keep blank lines as section breaks, no wrapping needed
        } else {
            out.push_str("<p>");
            out.push_str(&emphasis.replace_all(trimmed, "<em>$1</em>"));
            out.push_str("</p>");
        }
        out.push('\n');
    }
    out
}
