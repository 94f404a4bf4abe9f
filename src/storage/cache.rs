//! Local Profile Cache
//!
//! Durable cache behind the offline-first contract: every profile write
//! lands here before any network is attempted, and reads are served from
//! here whenever possible. SQLite with connection pooling, WAL mode, and a
//! version-stamped schema.
//!
//! Each record row keeps the digest of the copy the remote last confirmed;
//! `needs_sync` compares it against the current record so the sync layer
//! can find unpushed local edits after a crash or offline stretch.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};

use crate::types::{LoomError, ProfileRecord, Result, ResultExt, UserId};

/// Shared cache handle for async contexts.
pub type SharedCache = Arc<ProfileCache>;

/// Current schema version stamped into `user_version`
const SCHEMA_VERSION: u32 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profile_records (
    user_id       TEXT PRIMARY KEY,
    record        TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    synced_digest TEXT
);
"#;

const POOL_MAX_CONNECTIONS: u32 = 8;
const POOL_TIMEOUT_SECS: u64 = 30;

/// Thread-safe profile cache with connection pooling
pub struct ProfileCache {
    pool: Pool<SqliteConnectionManager>,
}

impl ProfileCache {
    /// Open (or create) the cache at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let manager =
            SqliteConnectionManager::file(path.as_ref()).with_init(Self::configure_connection);

        let pool = Pool::builder()
            .max_size(POOL_MAX_CONNECTIONS)
            .connection_timeout(Duration::from_secs(POOL_TIMEOUT_SECS))
            .build(manager)
            .map_err(|e| LoomError::Storage(format!("failed to create connection pool: {}", e)))?;

        let cache = Self { pool };
        cache.initialize()?;
        Ok(cache)
    }

    /// Open an in-memory cache for testing or throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(Self::configure_connection);

        // a single connection so every pool checkout sees the same memory db
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| LoomError::Storage(format!("failed to create in-memory pool: {}", e)))?;

        let cache = Self { pool };
        cache.initialize()?;
        Ok(cache)
    }

    fn configure_connection(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| LoomError::Storage(format!("failed to acquire cache connection: {}", e)))
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;

        let stored_version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);
        if stored_version > SCHEMA_VERSION {
            return Err(LoomError::Storage(format!(
                "cache schema v{} is newer than this build supports (v{})",
                stored_version, SCHEMA_VERSION
            )));
        }

        conn.execute_batch(SCHEMA)
            .with_context("failed to initialize cache schema")?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .with_context("failed to stamp schema version")?;
        Ok(())
    }

    /// Write a record, replacing any previous copy for the same user.
    ///
    /// The upsert is a single statement so readers never observe a partial
    /// record. The last-synced digest survives the overwrite; `needs_sync`
    /// reports true until the new content is pushed.
    pub fn put(&self, id: &UserId, record: &ProfileRecord) -> Result<()> {
        let serialized = serde_json::to_string(record)
            .with_context_fn(|| format!("failed to serialize record for {}", id))?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO profile_records (user_id, record, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                 record = excluded.record,
                 updated_at = excluded.updated_at",
            params![id.as_str(), serialized, record.updated_at.to_rfc3339()],
        )
        .with_context_fn(|| format!("failed to write record for {}", id))?;

        tracing::debug!(user_id = %id, "record cached");
        Ok(())
    }

    /// Read a record. A missing row is `None`; a corrupted row is an error.
    pub fn get(&self, id: &UserId) -> Result<Option<ProfileRecord>> {
        let conn = self.conn()?;
        let serialized: Option<String> = conn
            .query_row(
                "SELECT record FROM profile_records WHERE user_id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .with_context_fn(|| format!("failed to read record for {}", id))?;

        match serialized {
            Some(raw) => {
                let record = serde_json::from_str(&raw)
                    .with_context_fn(|| format!("corrupted cached record for {}", id))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Remove a record. Removing an absent record is not an error.
    pub fn delete(&self, id: &UserId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM profile_records WHERE user_id = ?1",
            params![id.as_str()],
        )
        .with_context_fn(|| format!("failed to delete record for {}", id))?;
        Ok(())
    }

    /// Record the digest of the copy the remote store has confirmed
    pub fn mark_synced(&self, id: &UserId, digest: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE profile_records SET synced_digest = ?2 WHERE user_id = ?1",
            params![id.as_str(), digest],
        )
        .with_context_fn(|| format!("failed to mark record synced for {}", id))?;
        Ok(())
    }

    /// Whether the cached record differs from the copy the remote last saw.
    ///
    /// A missing record never needs sync; a record that was never pushed
    /// always does.
    pub fn needs_sync(&self, id: &UserId) -> Result<bool> {
        let conn = self.conn()?;
        let row: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT record, synced_digest FROM profile_records WHERE user_id = ?1",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .with_context_fn(|| format!("failed to read sync state for {}", id))?;

        let Some((raw, synced_digest)) = row else {
            return Ok(false);
        };
        let record: ProfileRecord = serde_json::from_str(&raw)
            .with_context_fn(|| format!("corrupted cached record for {}", id))?;

        Ok(synced_digest.as_deref() != Some(record_digest(&record)?.as_str()))
    }
}

/// Digest of a record's canonical JSON form, for dirty tracking
pub fn record_digest(record: &ProfileRecord) -> Result<String> {
    let canonical = serde_json::to_vec(record)
        .with_context("failed to serialize record for digest")?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_with_goal(goal: &str) -> ProfileRecord {
        let mut payload = serde_json::Map::new();
        payload.insert("goal".to_string(), json!(goal));
        ProfileRecord::new(payload)
    }

    #[test]
    fn test_put_then_get_round_trips() {
        let cache = ProfileCache::open_in_memory().unwrap();
        let id = UserId::from("user-1");
        let record = record_with_goal("strength");

        cache.put(&id, &record).unwrap();
        let loaded = cache.get(&id).unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_get_missing_is_none() {
        let cache = ProfileCache::open_in_memory().unwrap();
        assert!(cache.get(&UserId::from("nobody")).unwrap().is_none());
    }

    #[test]
    fn test_put_replaces_previous_record() {
        let cache = ProfileCache::open_in_memory().unwrap();
        let id = UserId::from("user-1");

        cache.put(&id, &record_with_goal("strength")).unwrap();
        cache.put(&id, &record_with_goal("endurance")).unwrap();

        let loaded = cache.get(&id).unwrap().unwrap();
        assert_eq!(loaded.payload["goal"], "endurance");
    }

    #[test]
    fn test_delete_removes_record() {
        let cache = ProfileCache::open_in_memory().unwrap();
        let id = UserId::from("user-1");

        cache.put(&id, &record_with_goal("strength")).unwrap();
        cache.delete(&id).unwrap();
        assert!(cache.get(&id).unwrap().is_none());

        // deleting again is fine
        cache.delete(&id).unwrap();
    }

    #[test]
    fn test_needs_sync_tracks_digest() {
        let cache = ProfileCache::open_in_memory().unwrap();
        let id = UserId::from("user-1");
        let record = record_with_goal("strength");

        // absent record: nothing to push
        assert!(!cache.needs_sync(&id).unwrap());

        // fresh write: never pushed
        cache.put(&id, &record).unwrap();
        assert!(cache.needs_sync(&id).unwrap());

        // confirmed by the remote
        cache
            .mark_synced(&id, &record_digest(&record).unwrap())
            .unwrap();
        assert!(!cache.needs_sync(&id).unwrap());

        // local edit goes dirty again
        cache.put(&id, &record_with_goal("endurance")).unwrap();
        assert!(cache.needs_sync(&id).unwrap());
    }

    #[test]
    fn test_digest_is_stable_and_content_sensitive() {
        let record = record_with_goal("strength");
        assert_eq!(
            record_digest(&record).unwrap(),
            record_digest(&record.clone()).unwrap()
        );

        let other = record_with_goal("endurance");
        assert_ne!(
            record_digest(&record).unwrap(),
            record_digest(&other).unwrap()
        );
    }

    #[test]
    fn test_cache_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("planloom.db");
        let id = UserId::from("user-1");
        let record = record_with_goal("strength");

        {
            let cache = ProfileCache::open(&path).unwrap();
            cache.put(&id, &record).unwrap();
        }

        let cache = ProfileCache::open(&path).unwrap();
        assert_eq!(cache.get(&id).unwrap().unwrap(), record);
    }
}
