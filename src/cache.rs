//! TTL'd cache of resolved branch trees.
//!
//! Repeated lookups for the same app id tend to arrive within minutes of
//! each other; the cache keeps the last successful tree per (repo, app id)
//! so those lookups skip the listing call entirely.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::tree::Tree;

/// How long a cached tree stays valid.
pub const CACHE_TTL_SECS: i64 = 600;

/// A cached tree lookup.
#[derive(Debug, Clone)]
pub struct CachedTree {
    pub tree: Tree,
    /// The ref the tree was resolved from (the app id branch).
    pub branch: String,
}

/// Entry counts for `cache stats`.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub total: usize,
    pub live: usize,
}

/// Database holding cached tree listings.
pub struct TreeCache {
    conn: Connection,
}

impl TreeCache {
    /// Open or create the cache database under the user cache directory.
    pub fn open() -> Result<Self> {
        let cache_path = Self::cache_path()?;

        if let Some(parent) = cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&cache_path)
            .with_context(|| format!("Failed to open tree cache: {}", cache_path.display()))?;

        let cache = Self { conn };
        cache.init_schema()?;

        Ok(cache)
    }

    /// In-memory cache, used by tests and `--no-cache` runs that still
    /// want hit-once semantics within a single invocation.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    fn cache_path() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .context("Could not determine cache directory")?
            .join("manifetch");
        Ok(cache_dir.join("tree_cache.db"))
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tree_cache (
                -- Primary key: repo coordinate + app id
                cache_key TEXT PRIMARY KEY,

                repo TEXT NOT NULL,
                app_id TEXT NOT NULL,
                branch TEXT NOT NULL,

                -- Tree listing (JSON)
                tree_json TEXT NOT NULL,

                -- Timestamps
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tree_cache_expiry
                ON tree_cache(expires_at);
            "#,
        )?;

        Ok(())
    }

    fn cache_key(repo: &str, appid: &str) -> String {
        format!("{}::{}", repo.to_lowercase(), appid)
    }

    /// Get the cached tree for (repo, app id), if present and unexpired.
    pub fn get(&self, repo: &str, appid: &str) -> Result<Option<CachedTree>> {
        let key = Self::cache_key(repo, appid);
        let now = chrono::Utc::now().timestamp();

        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT tree_json, branch FROM tree_cache
                 WHERE cache_key = ?1 AND expires_at > ?2",
                params![key, now],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((tree_json, branch)) => {
                let tree: Tree = serde_json::from_str(&tree_json)
                    .with_context(|| format!("Failed to parse cached tree for {}", repo))?;
                debug!("tree cache hit for {}::{}", repo, appid);
                Ok(Some(CachedTree { tree, branch }))
            }
            None => Ok(None),
        }
    }

    /// Store a tree for (repo, app id), replacing any previous entry.
    pub fn put(&self, repo: &str, appid: &str, branch: &str, tree: &Tree) -> Result<()> {
        let key = Self::cache_key(repo, appid);
        let tree_json = serde_json::to_string(tree)?;
        let now = chrono::Utc::now().timestamp();

        self.conn.execute(
            r#"
            INSERT INTO tree_cache
                (cache_key, repo, app_id, branch, tree_json, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(cache_key) DO UPDATE SET
                branch = ?4,
                tree_json = ?5,
                created_at = ?6,
                expires_at = ?7
            "#,
            params![key, repo, appid, branch, tree_json, now, now + CACHE_TTL_SECS],
        )?;

        debug!("cached tree for {}::{}", repo, appid);
        Ok(())
    }

    /// Delete expired rows. Returns how many were dropped.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let dropped = self
            .conn
            .execute("DELETE FROM tree_cache WHERE expires_at <= ?1", params![now])?;
        if dropped > 0 {
            debug!("purged {} expired tree cache entries", dropped);
        }
        Ok(dropped)
    }

    /// Delete every row. Returns how many were dropped.
    pub fn clear(&self) -> Result<usize> {
        let dropped = self.conn.execute("DELETE FROM tree_cache", [])?;
        info!("cleared {} tree cache entries", dropped);
        Ok(dropped)
    }

    /// Age every row past its TTL. Test hook for expiry behavior.
    #[cfg(test)]
    pub(crate) fn force_expire_all(&self) -> Result<()> {
        let past = chrono::Utc::now().timestamp() - 1;
        self.conn
            .execute("UPDATE tree_cache SET expires_at = ?1", params![past])?;
        Ok(())
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let now = chrono::Utc::now().timestamp();
        let total: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM tree_cache", [], |row| row.get(0))?;
        let live: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tree_cache WHERE expires_at > ?1",
            params![now],
            |row| row.get(0),
        )?;
        Ok(CacheStats {
            total: total as usize,
            live: live as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeEntry;

    fn sample_tree() -> Tree {
        Tree::new(vec![TreeEntry {
            path: "game.manifest".to_string(),
            entry_type: "blob".to_string(),
            size: Some(128),
        }])
    }

    #[test]
    fn test_put_and_get() {
        let cache = TreeCache::open_in_memory().unwrap();
        cache
            .put("Owner/Repo", "123456", "123456", &sample_tree())
            .unwrap();

        let hit = cache.get("Owner/Repo", "123456").unwrap().unwrap();
        assert_eq!(hit.branch, "123456");
        assert_eq!(hit.tree.tree.len(), 1);
        assert_eq!(hit.tree.tree[0].path, "game.manifest");
    }

    #[test]
    fn test_key_is_case_insensitive_on_repo() {
        let cache = TreeCache::open_in_memory().unwrap();
        cache
            .put("Owner/Repo", "123", "123", &sample_tree())
            .unwrap();
        assert!(cache.get("owner/repo", "123").unwrap().is_some());
    }

    #[test]
    fn test_miss_on_other_key() {
        let cache = TreeCache::open_in_memory().unwrap();
        cache.put("a/b", "123", "123", &sample_tree()).unwrap();
        assert!(cache.get("a/b", "456").unwrap().is_none());
        assert!(cache.get("c/d", "123").unwrap().is_none());
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = TreeCache::open_in_memory().unwrap();
        cache.put("a/b", "123", "123", &sample_tree()).unwrap();

        cache.force_expire_all().unwrap();

        assert!(cache.get("a/b", "123").unwrap().is_none());
        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.stats().unwrap().total, 0);
    }

    #[test]
    fn test_put_overwrites() {
        let cache = TreeCache::open_in_memory().unwrap();
        cache.put("a/b", "123", "123", &sample_tree()).unwrap();

        let bigger = Tree::new(vec![
            TreeEntry {
                path: "one".to_string(),
                entry_type: "blob".to_string(),
                size: None,
            },
            TreeEntry {
                path: "two".to_string(),
                entry_type: "blob".to_string(),
                size: None,
            },
        ]);
        cache.put("a/b", "123", "123", &bigger).unwrap();

        let hit = cache.get("a/b", "123").unwrap().unwrap();
        assert_eq!(hit.tree.tree.len(), 2);
        assert_eq!(cache.stats().unwrap().total, 1);
    }

    #[test]
    fn test_clear() {
        let cache = TreeCache::open_in_memory().unwrap();
        cache.put("a/b", "1", "1", &sample_tree()).unwrap();
        cache.put("a/b", "2", "2", &sample_tree()).unwrap();
        assert_eq!(cache.clear().unwrap(), 2);
        assert_eq!(cache.stats().unwrap().total, 0);
    }
}
