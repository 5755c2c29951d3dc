//! C7: the turn workflow engine. `start -> {narrator, rules} -> decision
//! -> trace -> end`. Narrator and rules fan out concurrently; decision
//! depends on both; trace is the last writer before the turn ends.

use std::sync::Arc;

use dashmap::DashMap;
use gamebook_domain::{GameId, GameState, Narrative, Rules, SessionId};
use tokio::sync::{Mutex, Semaphore};

use crate::cache::{CacheKey, CachePort};
use crate::config::EngineConfig;
use crate::error::{EngineError, NodeError};
use crate::nodes;

/// Caller-supplied input to [`Workflow::turn`]. Mirrors the `start_workflow`
/// mapping-or-state contract: a mapping's `next_section` is a one-shot
/// migration of the prior turn's decision into the new turn's
/// `section_number`.
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub session_id: Option<SessionId>,
    pub game_id: Option<GameId>,
    pub section_number: Option<u32>,
    pub next_section: Option<u32>,
    pub player_input: Option<String>,
    pub dice_result: Option<u32>,
}

pub struct Workflow {
    cache: Arc<dyn CachePort>,
    config: EngineConfig,
    turn_locks: DashMap<SessionId, Arc<Mutex<()>>>,
    session_slots: Semaphore,
}

impl Workflow {
    /// Sweeps stale per-session entries past their TTL before the engine
    /// starts serving turns, mirroring `cache_manager.py::create_session_dir`'s
    /// startup cleanup, adapted to this engine's keyed, multi-session
    /// storage model rather than its singleton "current session" one (see
    /// DESIGN.md). A sweep failure is logged and never fatal to startup.
    pub async fn new(cache: Arc<dyn CachePort>, config: EngineConfig) -> Self {
        if let Err(e) = cache.evict_expired().await {
            tracing::warn!(error = %e, "startup: failed to sweep stale session entries");
        }

        let session_slots = Semaphore::new(config.max_parallel_sessions);
        Self {
            cache,
            config,
            turn_locks: DashMap::new(),
            session_slots,
        }
    }

    /// `start`: builds the `GameState` for a new turn, generating
    /// `session_id`/`game_id` only when the caller supplied neither.
    /// Per-turn sub-models (`narrative`, `rules`, `decision`) are always
    /// cleared; `trace` and `character` carry forward from `previous`.
    pub fn start(&self, previous: Option<GameState>, input: TurnInput) -> GameState {
        let base = previous.unwrap_or_else(|| {
            let session_id = input.session_id.unwrap_or_default();
            let game_id = input.game_id.unwrap_or_default();
            GameState::initial(game_id, session_id)
        });

        let section_number = input
            .next_section
            .or(input.section_number)
            .unwrap_or(base.section_number);

        let mut next = GameState {
            session_id: base.session_id,
            game_id: base.game_id,
            section_number,
            player_input: input.player_input,
            narrative: None,
            rules: None,
            decision: None,
            trace: base.trace,
            character: base.character,
            error: None,
            metadata: base.metadata.clone(),
            should_continue: false,
        };

        match input.dice_result {
            Some(value) => {
                next.metadata.insert("dice_result".to_string(), serde_json::json!(value));
            }
            None => {
                next.metadata.remove("dice_result");
            }
        }
        next.tag_node("start");
        next
    }

    /// Runs one full turn: `start` (via the caller, already folded into
    /// `state`), narrator ∥ rules, decision, trace, `end`. Turns for the
    /// same `session_id` are strictly serialized; different sessions run
    /// independently.
    pub async fn turn(&self, previous: Option<GameState>, input: TurnInput) -> Result<GameState, EngineError> {
        let _permit = self
            .session_slots
            .acquire()
            .await
            .expect("session_slots semaphore is never closed");

        let state = self.start(previous, input);
        let session_id = state.session_id;
        let lock = self.turn_lock(session_id);
        let _guard = lock.lock().await;

        if let Err(e) = state.validate() {
            let error_state = GameState::error_state(e.to_string(), Some(&state));
            self.persist_state(&error_state).await;
            return Ok(error_state);
        }

        let incoming_section = state.section_number;
        self.persist_state(&state).await;

        let joined = tokio::time::timeout(self.config.node_timeout, async {
            tokio::join!(
                nodes::narrator::run(self.cache.as_ref(), &state),
                nodes::rules::run(self.cache.as_ref(), &state),
            )
        })
        .await;

        let (narrator_output, rules_output) = match joined {
            Ok((narrator_result, rules_result)) => (
                narrator_result.unwrap_or_else(|e| narrator_node_error(&state, e)),
                rules_result.unwrap_or_else(|e| rules_node_error(&state, e)),
            ),
            Err(_) => {
                tracing::warn!(%session_id, "turn deadline exceeded, cancelling narrator/rules fan-out");
                let error_state = GameState::error_state("turn deadline exceeded", Some(&state));
                let traced = self.trace_best_effort(&error_state, incoming_section).await;
                self.persist_state(&traced).await;
                return Ok(traced);
            }
        };

        let mut merged = GameState::merge_parallel(&state, &narrator_output, &rules_output);
        if let Err(e) = merged.validate() {
            merged.error = Some(e.to_string());
        }

        let decided = nodes::decision::run(&merged)
            .unwrap_or_else(|e| GameState::error_state(e.to_string(), Some(&merged)));

        let mut traced = self.trace_best_effort(&decided, incoming_section).await;
        let continues = traced.should_continue();
        traced.should_continue = continues;
        traced.tag_node("end");
        self.persist_state(&traced).await;

        Ok(traced)
    }

    async fn trace_best_effort(&self, state: &GameState, incoming_section: u32) -> GameState {
        match nodes::trace::run(self.cache.as_ref(), state, incoming_section).await {
            Ok(traced) => traced,
            Err(e) => {
                tracing::warn!(error = %e, "trace node failed, returning untraced state");
                state.clone()
            }
        }
    }

    async fn persist_state(&self, state: &GameState) {
        let key = CacheKey::State {
            game_id: state.game_id,
            section_number: state.section_number,
        };
        match serde_json::to_string(state) {
            Ok(json) => {
                if let Err(e) = self.cache.save_cached(&key, &json).await {
                    tracing::warn!(error = %e, "failed to persist state snapshot");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize state snapshot"),
        }
    }

    fn turn_lock(&self, session_id: SessionId) -> Arc<Mutex<()>> {
        self.turn_locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Folds a genuine narrator `Err` into an origin-tagged `Narrative::error`
/// on an otherwise-unchanged clone of `state`, so the rules side of the
/// fan-out still lands in `merge_parallel` instead of being discarded
/// wholesale (scenario 6 of the testable properties: the other node's
/// output survives a sibling's failure).
fn narrator_node_error(state: &GameState, e: NodeError) -> GameState {
    let message = e.to_string();
    let mut next = state.clone();
    next.narrative = Some(Narrative::error(state.section_number, message.clone(), GameState::now()));
    next.error = Some(message);
    next
}

/// Rules-side counterpart of [`narrator_node_error`].
fn rules_node_error(state: &GameState, e: NodeError) -> GameState {
    let message = e.to_string();
    let mut next = state.clone();
    next.rules = Some(Rules::error(state.section_number, message.clone(), GameState::now()));
    next.error = Some(message);
    next
}
