//! Sync Repository
//!
//! Offline-first persistence for profile records. Every write lands in the
//! local cache before the network is touched; the remote leg is best effort
//! and its failures never break the operation. A record that could not be
//! pushed stays marked dirty until a later `reconcile` succeeds.
//!
//! Concurrent operations on the same user id are serialized through a
//! per-id async mutex, so interleaved saves cannot tear a record. Last
//! writer wins by completion order.
//!
//! When a push finds a strictly newer remote copy, the server wins: the
//! remote record is adopted into the cache and the caller is told via
//! `SyncOutcome::Conflict`.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::remote::SharedRemote;
use crate::ai::{RetryOrchestrator, RetryPolicy};
use crate::storage::{SharedCache, record_digest};
use crate::types::{ProfileRecord, Result, UserId};

/// How a save (or reconcile push) ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Saved locally; the remote copy is stale or absent until a later reconcile
    LocalOnly,
    /// Local and remote both hold this record
    Synced,
    /// A strictly newer remote copy existed and was adopted instead
    Conflict,
}

/// Cache-first repository with best-effort remote replication
pub struct SyncRepository {
    cache: SharedCache,
    remote: SharedRemote,
    orchestrator: RetryOrchestrator,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SyncRepository {
    pub fn new(cache: SharedCache, remote: SharedRemote, policy: RetryPolicy) -> Self {
        Self {
            cache,
            remote,
            orchestrator: RetryOrchestrator::new(policy),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Repository with the stock remote-store retry profile
    pub fn with_defaults(cache: SharedCache, remote: SharedRemote) -> Self {
        Self::new(cache, remote, RetryPolicy::remote_store())
    }

    /// Save a record. The local write always happens and is the only leg
    /// that can fail the call; the remote leg degrades to `LocalOnly`.
    pub async fn save(&self, id: &UserId, record: &ProfileRecord) -> Result<SyncOutcome> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        self.cache.put(id, record)?;

        match self.push_record(id, record).await {
            Ok(outcome) => Ok(outcome),
            // classified failures are remote-leg failures; the record is
            // durable locally and stays dirty
            Err(err) if err.failure().is_some() => {
                warn!(user_id = %id, error = %err, "remote save failed, record stays local-only");
                Ok(SyncOutcome::LocalOnly)
            }
            Err(err) => Err(err),
        }
    }

    /// Read a record: cache hit wins, a miss consults the remote store and
    /// populates the cache. Remote trouble on a miss reads as `None`.
    pub async fn get(&self, id: &UserId) -> Result<Option<ProfileRecord>> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        if let Some(record) = self.cache.get(id)? {
            return Ok(Some(record));
        }

        match self.fetch_with_retry(id).await {
            Ok(Some(record)) => {
                self.cache.put(id, &record)?;
                self.cache.mark_synced(id, &record_digest(&record)?)?;
                debug!(user_id = %id, "cache populated from remote");
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                warn!(user_id = %id, error = %err, "remote fetch failed on cache miss");
                Ok(None)
            }
        }
    }

    /// Delete a record locally and, best effort, remotely. A failed remote
    /// delete is logged and dropped, not queued.
    pub async fn delete(&self, id: &UserId) -> Result<()> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        self.cache.delete(id)?;

        if let Err(err) = self.remove_with_retry(id).await {
            warn!(user_id = %id, error = %err, "remote delete failed, dropped");
        }
        Ok(())
    }

    /// Push the cached record if it has unsynced changes. Returns `true`
    /// when the record is clean afterwards (or there was nothing to do),
    /// `false` when the caller should reschedule. Never raises.
    pub async fn reconcile(&self, id: &UserId) -> bool {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let dirty = match self.cache.needs_sync(id) {
            Ok(dirty) => dirty,
            Err(err) => {
                warn!(user_id = %id, error = %err, "reconcile could not read sync state");
                return false;
            }
        };
        if !dirty {
            return true;
        }

        let record = match self.cache.get(id) {
            Ok(Some(record)) => record,
            Ok(None) => return true,
            Err(err) => {
                warn!(user_id = %id, error = %err, "reconcile could not load record");
                return false;
            }
        };

        match self.push_record(id, &record).await {
            Ok(outcome) => {
                debug!(user_id = %id, outcome = ?outcome, "reconcile caught up");
                true
            }
            Err(err) => {
                warn!(user_id = %id, error = %err, "reconcile failed, will retry later");
                false
            }
        }
    }

    /// Push `record`, adopting the remote copy when it is strictly newer.
    /// Classified errors are remote failures; anything else is local.
    async fn push_record(&self, id: &UserId, record: &ProfileRecord) -> Result<SyncOutcome> {
        if let Some(remote_record) = self.fetch_with_retry(id).await? {
            if remote_record.is_newer_than(record) {
                self.cache.put(id, &remote_record)?;
                self.cache
                    .mark_synced(id, &record_digest(&remote_record)?)?;
                debug!(user_id = %id, "remote copy was newer, adopted it");
                return Ok(SyncOutcome::Conflict);
            }
        }

        self.store_with_retry(id, record).await?;
        self.cache.mark_synced(id, &record_digest(record)?)?;
        Ok(SyncOutcome::Synced)
    }

    async fn fetch_with_retry(&self, id: &UserId) -> Result<Option<ProfileRecord>> {
        let remote = &self.remote;
        self.orchestrator
            .run("remote-fetch", move || async move {
                remote.fetch(id).await
            })
            .await
    }

    async fn store_with_retry(&self, id: &UserId, record: &ProfileRecord) -> Result<()> {
        let remote = &self.remote;
        self.orchestrator
            .run("remote-store", move || async move {
                remote.store(id, record).await
            })
            .await
    }

    async fn remove_with_retry(&self, id: &UserId) -> Result<()> {
        let remote = &self.remote;
        self.orchestrator
            .run("remote-remove", move || async move {
                remote.remove(id).await
            })
            .await
    }

    /// The mutex guarding this id, created on first use
    async fn lock_for(&self, id: &UserId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(id.as_str().to_string()).or_default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ProfileCache;
    use crate::sync::remote::RemoteStore;
    use crate::types::{FailureKind, LoomError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    /// In-memory remote that can be taken offline or told to rate-limit
    struct FakeRemote {
        records: std::sync::Mutex<HashMap<String, ProfileRecord>>,
        online: AtomicBool,
        rate_limited_stores: AtomicU32,
        fetch_calls: AtomicU32,
        store_calls: AtomicU32,
        store_active: AtomicU32,
        store_max_active: AtomicU32,
        store_delay: Duration,
    }

    impl FakeRemote {
        fn new() -> Self {
            Self {
                records: std::sync::Mutex::new(HashMap::new()),
                online: AtomicBool::new(true),
                rate_limited_stores: AtomicU32::new(0),
                fetch_calls: AtomicU32::new(0),
                store_calls: AtomicU32::new(0),
                store_active: AtomicU32::new(0),
                store_max_active: AtomicU32::new(0),
                store_delay: Duration::ZERO,
            }
        }

        /// Reject the next `n` store calls with a rate-limit failure
        fn rate_limit_next_stores(&self, n: u32) {
            self.rate_limited_stores.store(n, Ordering::SeqCst);
        }

        fn with_store_delay(delay: Duration) -> Self {
            Self {
                store_delay: delay,
                ..Self::new()
            }
        }

        fn set_online(&self, online: bool) {
            self.online.store(online, Ordering::SeqCst);
        }

        fn seed(&self, id: &str, record: ProfileRecord) {
            self.records
                .lock()
                .unwrap()
                .insert(id.to_string(), record);
        }

        fn stored(&self, id: &str) -> Option<ProfileRecord> {
            self.records.lock().unwrap().get(id).cloned()
        }

        fn check_online(&self) -> Result<()> {
            if self.online.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(LoomError::api(
                    FailureKind::TransportFailure,
                    "remote unreachable",
                ))
            }
        }
    }

    #[async_trait]
    impl RemoteStore for FakeRemote {
        async fn fetch(&self, id: &UserId) -> Result<Option<ProfileRecord>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.check_online()?;
            Ok(self.records.lock().unwrap().get(id.as_str()).cloned())
        }

        async fn store(&self, id: &UserId, record: &ProfileRecord) -> Result<()> {
            self.store_calls.fetch_add(1, Ordering::SeqCst);
            self.check_online()?;
            if self
                .rate_limited_stores
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(LoomError::api(FailureKind::RateLimited, "slow down"));
            }

            let active = self.store_active.fetch_add(1, Ordering::SeqCst) + 1;
            self.store_max_active.fetch_max(active, Ordering::SeqCst);
            if !self.store_delay.is_zero() {
                tokio::time::sleep(self.store_delay).await;
            }
            self.store_active.fetch_sub(1, Ordering::SeqCst);

            self.records
                .lock()
                .unwrap()
                .insert(id.as_str().to_string(), record.clone());
            Ok(())
        }

        async fn remove(&self, id: &UserId) -> Result<()> {
            self.check_online()?;
            self.records.lock().unwrap().remove(id.as_str());
            Ok(())
        }
    }

    fn record_with_goal(goal: &str) -> ProfileRecord {
        let mut payload = serde_json::Map::new();
        payload.insert("goal".to_string(), json!(goal));
        ProfileRecord::new(payload)
    }

    fn repository(remote: Arc<FakeRemote>) -> SyncRepository {
        let cache = Arc::new(ProfileCache::open_in_memory().unwrap());
        SyncRepository::with_defaults(cache, remote)
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_with_remote_up_is_synced() {
        let remote = Arc::new(FakeRemote::new());
        let repo = repository(Arc::clone(&remote));
        let id = UserId::from("user-1");
        let record = record_with_goal("strength");

        let outcome = repo.save(&id, &record).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Synced);
        assert_eq!(remote.stored("user-1").unwrap(), record);
        assert!(!repo.cache.needs_sync(&id).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_with_remote_down_keeps_record_locally() {
        let remote = Arc::new(FakeRemote::new());
        remote.set_online(false);
        let repo = repository(Arc::clone(&remote));
        let id = UserId::from("user-1");
        let record = record_with_goal("strength");

        let outcome = repo.save(&id, &record).await.unwrap();

        assert_eq!(outcome, SyncOutcome::LocalOnly);
        assert_eq!(repo.cache.get(&id).unwrap().unwrap(), record);
        assert!(repo.cache.needs_sync(&id).unwrap());
        assert!(remote.stored("user-1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_prefers_cache_over_remote() {
        let remote = Arc::new(FakeRemote::new());
        let repo = repository(Arc::clone(&remote));
        let id = UserId::from("user-1");

        repo.save(&id, &record_with_goal("strength")).await.unwrap();
        let fetches_after_save = remote.fetch_calls.load(Ordering::SeqCst);

        let loaded = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.payload["goal"], "strength");
        assert_eq!(remote.fetch_calls.load(Ordering::SeqCst), fetches_after_save);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_miss_populates_cache_from_remote() {
        let remote = Arc::new(FakeRemote::new());
        let record = record_with_goal("endurance");
        remote.seed("user-1", record.clone());
        let repo = repository(Arc::clone(&remote));
        let id = UserId::from("user-1");

        let loaded = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded, record);

        // populated and clean; a second read stays local
        assert!(!repo.cache.needs_sync(&id).unwrap());
        let fetches = remote.fetch_calls.load(Ordering::SeqCst);
        repo.get(&id).await.unwrap().unwrap();
        assert_eq!(remote.fetch_calls.load(Ordering::SeqCst), fetches);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_miss_with_remote_down_is_none() {
        let remote = Arc::new(FakeRemote::new());
        remote.set_online(false);
        let repo = repository(Arc::clone(&remote));

        let loaded = repo.get(&UserId::from("user-1")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_with_remote_down_still_deletes_locally() {
        let remote = Arc::new(FakeRemote::new());
        let repo = repository(Arc::clone(&remote));
        let id = UserId::from("user-1");

        repo.save(&id, &record_with_goal("strength")).await.unwrap();
        remote.set_online(false);

        repo.delete(&id).await.unwrap();
        assert!(repo.cache.get(&id).unwrap().is_none());
        // the remote copy stays; failed deletes are dropped, not queued
        assert!(remote.stored("user-1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_pushes_dirty_record_once_remote_returns() {
        let remote = Arc::new(FakeRemote::new());
        remote.set_online(false);
        let repo = repository(Arc::clone(&remote));
        let id = UserId::from("user-1");
        let record = record_with_goal("strength");

        assert_eq!(
            repo.save(&id, &record).await.unwrap(),
            SyncOutcome::LocalOnly
        );

        remote.set_online(true);
        assert!(repo.reconcile(&id).await);
        assert_eq!(remote.stored("user-1").unwrap(), record);
        assert!(!repo.cache.needs_sync(&id).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_with_nothing_to_do_is_true() {
        let remote = Arc::new(FakeRemote::new());
        let repo = repository(Arc::clone(&remote));

        assert!(repo.reconcile(&UserId::from("unknown")).await);
        assert_eq!(remote.fetch_calls.load(Ordering::SeqCst), 0);
        assert_eq!(remote.store_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_with_remote_down_reports_false() {
        let remote = Arc::new(FakeRemote::new());
        remote.set_online(false);
        let repo = repository(Arc::clone(&remote));
        let id = UserId::from("user-1");

        repo.save(&id, &record_with_goal("strength")).await.unwrap();
        assert!(!repo.reconcile(&id).await);
        assert!(repo.cache.needs_sync(&id).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_remote_is_not_hammered() {
        let remote = Arc::new(FakeRemote::new());
        let repo = repository(Arc::clone(&remote));
        let id = UserId::from("user-1");
        let record = record_with_goal("strength");

        // The remote-store profile treats a rate limit as terminal for the
        // attempt, so the caller is released instead of waiting it out.
        remote.rate_limit_next_stores(2);
        assert_eq!(
            repo.save(&id, &record).await.unwrap(),
            SyncOutcome::LocalOnly
        );
        assert_eq!(remote.store_calls.load(Ordering::SeqCst), 1);
        assert!(repo.cache.needs_sync(&id).unwrap());

        // Still limited: reconcile gives up the same way.
        assert!(!repo.reconcile(&id).await);
        assert_eq!(remote.store_calls.load(Ordering::SeqCst), 2);

        // Limit lifted: the next sweep catches up.
        assert!(repo.reconcile(&id).await);
        assert_eq!(remote.stored("user-1").unwrap(), record);
        assert!(!repo.cache.needs_sync(&id).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_remote_copy_wins_as_conflict() {
        let remote = Arc::new(FakeRemote::new());
        let mut newer_payload = serde_json::Map::new();
        newer_payload.insert("goal".to_string(), json!("remote wins"));
        let newer = ProfileRecord::with_updated_at(
            newer_payload,
            chrono::Utc::now() + chrono::Duration::seconds(120),
        );
        remote.seed("user-1", newer.clone());

        let repo = repository(Arc::clone(&remote));
        let id = UserId::from("user-1");

        let outcome = repo.save(&id, &record_with_goal("local")).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Conflict);
        // the cache now holds the adopted remote copy, clean
        let cached = repo.cache.get(&id).unwrap().unwrap();
        assert_eq!(cached.payload["goal"], "remote wins");
        assert!(!repo.cache.needs_sync(&id).unwrap());
        // the remote copy was not overwritten
        assert_eq!(remote.stored("user-1").unwrap(), newer);
    }

    #[tokio::test(start_paused = true)]
    async fn test_saves_for_the_same_id_are_serialized() {
        let remote = Arc::new(FakeRemote::with_store_delay(Duration::from_secs(1)));
        let repo = Arc::new(repository(Arc::clone(&remote)));
        let id = UserId::from("user-1");

        let mut handles = Vec::new();
        for n in 0..4 {
            let repo = Arc::clone(&repo);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                // execution order is up to the scheduler, so a save can
                // land behind a newer one and resolve as Conflict
                repo.save(&id, &record_with_goal(&format!("goal-{n}")))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(remote.store_max_active.load(Ordering::SeqCst), 1);
        // whatever the interleaving, both sides converge on one record
        let cached = repo.cache.get(&id).unwrap().unwrap();
        assert_eq!(remote.stored("user-1").unwrap(), cached);
    }
}
