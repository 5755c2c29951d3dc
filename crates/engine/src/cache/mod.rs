//! C1: namespaced key/value storage and raw-content loading.
//!
//! `CachePort` is the seam nodes depend on; [`fs::FsCache`] is the only
//! adapter shipped here (a filesystem-backed implementation). The port
//! itself is storage-agnostic, a future adapter (e.g. a KV database) only
//! needs to implement this trait.

mod fs;

pub use fs::FsCache;

use async_trait::async_trait;
use gamebook_domain::{GameId, SessionId};

use crate::error::CacheError;

/// One of the eight storage areas the core writes to or reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Sections,
    RawRules,
    CachedSections,
    CachedRules,
    State,
    Trace,
    TraceHistory,
    Character,
}

impl Namespace {
    /// Optional time-to-live applied by the fs adapter via file mtime.
    /// `None` means entries never expire on their own. Only the two
    /// namespaces the external interfaces table marks "optional" ever
    /// carry one; everything else is `None`.
    pub(crate) fn ttl(self) -> Option<std::time::Duration> {
        match self {
            Namespace::State | Namespace::Trace => Some(std::time::Duration::from_secs(24 * 60 * 60)),
            _ => None,
        }
    }
}

/// A fully-addressed location within a namespace. Keeping this as a closed
/// enum (rather than a raw string key) means a malformed path can only ever
/// be built by constructing one of these variants, and the fs adapter's
/// path-traversal guard is defense in depth rather than the only guard.
#[derive(Debug, Clone)]
pub enum CacheKey {
    Section(u32),
    RawRules(u32),
    CachedSection(u32),
    CachedRules(u32),
    State { game_id: GameId, section_number: u32 },
    Trace { game_id: GameId, session_id: SessionId },
    TraceHistory { game_id: GameId, session_id: SessionId },
    Character { game_id: GameId },
}

impl CacheKey {
    pub fn namespace(&self) -> Namespace {
        match self {
            CacheKey::Section(_) => Namespace::Sections,
            CacheKey::RawRules(_) => Namespace::RawRules,
            CacheKey::CachedSection(_) => Namespace::CachedSections,
            CacheKey::CachedRules(_) => Namespace::CachedRules,
            CacheKey::State { .. } => Namespace::State,
            CacheKey::Trace { .. } => Namespace::Trace,
            CacheKey::TraceHistory { .. } => Namespace::TraceHistory,
            CacheKey::Character { .. } => Namespace::Character,
        }
    }

    /// Relative path (from the cache base directory) for this key, using
    /// the file layout fixed by the external interfaces contract.
    fn relative_path(&self) -> String {
        match self {
            CacheKey::Section(n) => format!("sections/{n}.md"),
            CacheKey::RawRules(n) => format!("rules/section_{n}_rule.md"),
            CacheKey::CachedSection(n) => format!("cache/sections/{n}.md"),
            CacheKey::CachedRules(n) => format!("cache/rules/section_{n}_rules.md"),
            CacheKey::State { game_id, section_number } => {
                format!("cache/games/{game_id}/states/section_{section_number}.json")
            }
            CacheKey::Trace { game_id, session_id } => {
                format!("cache/games/{game_id}/traces/{session_id}.json")
            }
            CacheKey::TraceHistory { game_id, session_id } => {
                format!("cache/games/{game_id}/traces/history/{session_id}.json")
            }
            CacheKey::Character { game_id } => format!("cache/games/{game_id}/character.md"),
        }
    }
}

/// Namespaced K/V store with raw-content loading. All operations are
/// async; writes to the same key are serialized by the adapter, reads are
/// not. Cross-key ordering is never guaranteed.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CachePort: Send + Sync {
    /// Returns the cached value for `key`, or `None` if missing or expired
    /// (the two are indistinguishable to the caller).
    async fn get_cached(&self, key: &CacheKey) -> Result<Option<String>, CacheError>;

    /// Overwrites the cached value for `key`. No partial writes are ever
    /// observable by a concurrent reader.
    async fn save_cached(&self, key: &CacheKey, value: &str) -> Result<(), CacheError>;

    /// Loads source content for `key`. Never writes.
    async fn load_raw(&self, key: &CacheKey) -> Result<Option<String>, CacheError>;

    async fn exists_raw(&self, key: &CacheKey) -> Result<bool, CacheError>;

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError>;

    async fn clear(&self, namespace: Namespace) -> Result<(), CacheError>;

    /// Proactively sweeps entries past their namespace TTL, independent of
    /// `get_cached`'s lazy (read-time) expiry check. Called once at engine
    /// startup so a long-idle deployment doesn't carry an unbounded amount
    /// of stale per-session state on disk between reads.
    async fn evict_expired(&self) -> Result<(), CacheError>;
}
