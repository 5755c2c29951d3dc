use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::{CacheKey, CachePort, Namespace};
use crate::error::CacheError;

/// Filesystem-backed [`CachePort`]. Each key maps to one file under
/// `base_dir`, in the layout fixed by the external interfaces contract.
/// Writes to the same key are serialized through a per-key mutex; reads
/// bypass it entirely.
pub struct FsCache {
    base_dir: PathBuf,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FsCache {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_locks: DashMap::new(),
        }
    }

    fn resolve(&self, key: &CacheKey) -> Result<PathBuf, CacheError> {
        let relative = key.relative_path();
        if relative.split('/').any(|segment| segment == "..") {
            return Err(CacheError::path_traversal(relative));
        }
        Ok(self.base_dir.join(relative))
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let key = path.to_string_lossy().into_owned();
        self.write_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl CachePort for FsCache {
    async fn get_cached(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let path = self.resolve(key)?;
        if let Some(ttl) = key.namespace().ttl() {
            match tokio::fs::metadata(&path).await {
                Ok(meta) => {
                    let age = meta.modified().ok().and_then(|m| m.elapsed().ok());
                    if age.is_some_and(|age| age > ttl) {
                        return Ok(None);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(_) => {}
            }
        }
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::read(
                format!("{:?}", key.namespace()),
                path.display().to_string(),
                e.to_string(),
            )),
        }
    }

    async fn save_cached(&self, key: &CacheKey, value: &str) -> Result<(), CacheError> {
        let path = self.resolve(key)?;
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CacheError::write(format!("{:?}", key.namespace()), path.display().to_string(), e.to_string())
            })?;
        }
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, value).await.map_err(|e| {
            CacheError::write(format!("{:?}", key.namespace()), path.display().to_string(), e.to_string())
        })?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
            CacheError::write(format!("{:?}", key.namespace()), path.display().to_string(), e.to_string())
        })?;
        Ok(())
    }

    async fn load_raw(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        self.get_cached(key).await
    }

    async fn exists_raw(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) | Err(_) if !path.exists() => Ok(()),
            Err(e) => Err(CacheError::write(
                format!("{:?}", key.namespace()),
                path.display().to_string(),
                e.to_string(),
            )),
        }
    }

    async fn clear(&self, namespace: Namespace) -> Result<(), CacheError> {
        let dir = self.base_dir.join(namespace_dir(namespace));
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) | Err(_) if !dir.exists() => Ok(()),
            Err(e) => Err(CacheError::write(
                format!("{namespace:?}"),
                dir.display().to_string(),
                e.to_string(),
            )),
        }
    }

    async fn evict_expired(&self) -> Result<(), CacheError> {
        let games_dir = self.base_dir.join("cache/games");
        let mut games = match tokio::fs::read_dir(&games_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(CacheError::read("games", games_dir.display().to_string(), e.to_string())),
        };

        while let Some(game_entry) = games
            .next_entry()
            .await
            .map_err(|e| CacheError::read("games", games_dir.display().to_string(), e.to_string()))?
        {
            if !game_entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let game_dir = game_entry.path();
            sweep_stale_json(&game_dir.join("states"), Namespace::State.ttl()).await?;
            sweep_stale_json(&game_dir.join("traces"), Namespace::Trace.ttl()).await?;
        }
        Ok(())
    }
}

/// Removes `.json` files directly under `dir` whose mtime age exceeds
/// `ttl`. Non-recursive: a `traces/history/` subdirectory is a directory
/// entry, not a `.json` file, so it is skipped without special-casing.
async fn sweep_stale_json(dir: &Path, ttl: Option<std::time::Duration>) -> Result<(), CacheError> {
    let Some(ttl) = ttl else { return Ok(()) };
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(CacheError::read("session-sweep", dir.display().to_string(), e.to_string())),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CacheError::read("session-sweep", dir.display().to_string(), e.to_string()))?
    {
        if entry.file_type().await.map(|t| !t.is_file()).unwrap_or(true) {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else { continue };
        let age = metadata.modified().ok().and_then(|m| m.elapsed().ok());
        if age.is_some_and(|age| age > ttl) {
            let _ = tokio::fs::remove_file(&path).await;
        }
    }
    Ok(())
}

fn namespace_dir(namespace: Namespace) -> &'static str {
    match namespace {
        Namespace::Sections => "sections",
        Namespace::RawRules => "rules",
        Namespace::CachedSections => "cache/sections",
        Namespace::CachedRules => "cache/rules",
        Namespace::State => "cache/games",
        Namespace::Trace => "cache/games",
        Namespace::TraceHistory => "cache/games",
        Namespace::Character => "cache/games",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamebook_domain::{GameId, SessionId};

    #[tokio::test]
    async fn missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        let result = cache.get_cached(&CacheKey::Section(999)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        cache
            .save_cached(&CacheKey::CachedSection(1), "# Section 1")
            .await
            .unwrap();
        let result = cache.get_cached(&CacheKey::CachedSection(1)).await.unwrap();
        assert_eq!(result.as_deref(), Some("# Section 1"));
    }

    #[tokio::test]
    async fn per_game_keys_nest_under_game_id() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        let game_id = GameId::new();
        let session_id = SessionId::new();
        cache
            .save_cached(
                &CacheKey::Trace { game_id, session_id },
                "{}",
            )
            .await
            .unwrap();
        assert!(cache
            .exists_raw(&CacheKey::Trace { game_id, session_id })
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn delete_is_idempotent_on_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        assert!(cache.delete(&CacheKey::Section(42)).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_writes_to_same_key_do_not_corrupt_content() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FsCache::new(dir.path()));
        let mut handles = Vec::new();
        for i in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .save_cached(&CacheKey::CachedSection(1), &format!("writer-{i}"))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let result = cache.get_cached(&CacheKey::CachedSection(1)).await.unwrap();
        assert!(result.unwrap().starts_with("writer-"));
    }

    #[tokio::test]
    async fn evict_expired_is_a_noop_when_no_games_have_been_written() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        assert!(cache.evict_expired().await.is_ok());
    }

    #[tokio::test]
    async fn evict_expired_keeps_entries_within_their_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        let game_id = GameId::new();
        let session_id = SessionId::new();

        cache
            .save_cached(&CacheKey::State { game_id, section_number: 1 }, "{}")
            .await
            .unwrap();
        cache
            .save_cached(&CacheKey::Trace { game_id, session_id }, "{}")
            .await
            .unwrap();

        cache.evict_expired().await.unwrap();

        assert!(cache
            .exists_raw(&CacheKey::State { game_id, section_number: 1 })
            .await
            .unwrap());
        assert!(cache.exists_raw(&CacheKey::Trace { game_id, session_id }).await.unwrap());
    }
}
