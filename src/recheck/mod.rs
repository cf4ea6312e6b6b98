// SPDX-License-Identifier: MIT
//! Post-publish recheck scheduling.
//!
//! Publishing corrective content only matters if it moves the business's
//! standing, so each publish schedules a share-of-voice re-check 14 days
//! out. The backing store is an advisory cache with a 15-day TTL (one day
//! of grace past the target) — losing it loses a scheduled re-check, never
//! data integrity, so every operation here degrades to a no-op instead of
//! failing the pipeline.

pub mod memory;

pub use memory::InMemoryRecheckStore;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Task key prefix and the companion index set holding pending draft ids.
const TASK_KEY_PREFIX: &str = "sov_recheck:";
const PENDING_SET_KEY: &str = "sov_recheck:pending";

/// Days between publish and re-check, and the storage TTL. The extra TTL
/// day lets a late poll still find a due task.
const RECHECK_DELAY_DAYS: i64 = 14;
const RECHECK_TTL_DAYS: i64 = 15;

// ─── Store contract ───────────────────────────────────────────────────────────

/// Minimal expiring key-value + set-membership contract. Any store with
/// these primitives (Redis, Upstash, the in-memory backend) qualifies.
#[async_trait]
pub trait RecheckStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn del(&self, key: &str) -> Result<()>;
    async fn sadd(&self, set: &str, member: &str) -> Result<()>;
    async fn smembers(&self, set: &str) -> Result<Vec<String>>;
    async fn srem(&self, set: &str, member: &str) -> Result<()>;
}

/// Backend for environments without an expiring store: every write
/// vanishes, every read is empty. The pipeline runs unchanged, minus the
/// delayed re-checks.
pub struct NoopRecheckStore;

#[async_trait]
impl RecheckStore for NoopRecheckStore {
    async fn set(&self, _key: &str, _value: &str, _ttl_seconds: i64) -> Result<()> {
        Ok(())
    }
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }
    async fn del(&self, _key: &str) -> Result<()> {
        Ok(())
    }
    async fn sadd(&self, _set: &str, _member: &str) -> Result<()> {
        Ok(())
    }
    async fn smembers(&self, _set: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn srem(&self, _set: &str, _member: &str) -> Result<()> {
        Ok(())
    }
}

// ─── Task ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecheckPayload {
    pub draft_id: String,
    pub location_id: String,
    pub target_query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecheckTask {
    pub task_type: String,
    pub target_date: DateTime<Utc>,
    pub payload: RecheckPayload,
}

fn task_key(draft_id: &str) -> String {
    format!("{TASK_KEY_PREFIX}{draft_id}")
}

// ─── Scheduler ────────────────────────────────────────────────────────────────

pub struct RecheckScheduler {
    store: Arc<dyn RecheckStore>,
}

impl RecheckScheduler {
    pub fn new(store: Arc<dyn RecheckStore>) -> Self {
        Self { store }
    }

    /// Schedule a re-check 14 days out. A draft with no target query has
    /// nothing to re-verify — that is a no-op, not an error. Store failures
    /// are absorbed.
    pub async fn schedule(&self, draft_id: &str, location_id: &str, target_query: &str) {
        self.schedule_at(draft_id, location_id, target_query, Utc::now())
            .await
    }

    pub async fn schedule_at(
        &self,
        draft_id: &str,
        location_id: &str,
        target_query: &str,
        now: DateTime<Utc>,
    ) {
        if target_query.trim().is_empty() {
            debug!(draft_id, "no target query — skipping recheck scheduling");
            return;
        }

        let task = RecheckTask {
            task_type: "sov_recheck".to_string(),
            target_date: now + Duration::days(RECHECK_DELAY_DAYS),
            payload: RecheckPayload {
                draft_id: draft_id.to_string(),
                location_id: location_id.to_string(),
                target_query: target_query.to_string(),
            },
        };
        let value = match serde_json::to_string(&task) {
            Ok(v) => v,
            Err(e) => {
                warn!(draft_id, err = %e, "failed to encode recheck task");
                return;
            }
        };

        let ttl = Duration::days(RECHECK_TTL_DAYS).num_seconds();
        if let Err(e) = self.store.set(&task_key(draft_id), &value, ttl).await {
            warn!(draft_id, err = %e, "recheck store unreachable — skipping schedule");
            return;
        }
        if let Err(e) = self.store.sadd(PENDING_SET_KEY, draft_id).await {
            warn!(draft_id, err = %e, "failed to index recheck task");
        }
    }

    /// All tasks whose target date has passed. Index entries whose task
    /// has expired (or no longer parses) are removed along the way, so a
    /// stale index heals itself. Store failure yields an empty list.
    pub async fn get_pending_rechecks(&self) -> Vec<RecheckTask> {
        self.get_pending_rechecks_at(Utc::now()).await
    }

    pub async fn get_pending_rechecks_at(&self, now: DateTime<Utc>) -> Vec<RecheckTask> {
        let ids = match self.store.smembers(PENDING_SET_KEY).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(err = %e, "recheck store unreachable — no pending rechecks");
                return Vec::new();
            }
        };

        let mut due = Vec::new();
        for draft_id in ids {
            let entry = match self.store.get(&task_key(&draft_id)).await {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(draft_id = %draft_id, err = %e, "recheck store read failed — skipping");
                    continue;
                }
            };
            let Some(raw) = entry else {
                // Task expired out from under its index entry.
                let _ = self.store.srem(PENDING_SET_KEY, &draft_id).await;
                continue;
            };
            let task: RecheckTask = match serde_json::from_str(&raw) {
                Ok(task) => task,
                Err(e) => {
                    warn!(draft_id = %draft_id, err = %e, "dropping unparseable recheck task");
                    let _ = self.store.srem(PENDING_SET_KEY, &draft_id).await;
                    continue;
                }
            };
            if task.target_date <= now {
                due.push(task);
            }
        }
        due
    }

    /// Remove a consumed task and its index entry. Absorbs store failures.
    pub async fn complete_recheck(&self, draft_id: &str) {
        if let Err(e) = self.store.del(&task_key(draft_id)).await {
            warn!(draft_id, err = %e, "failed to delete recheck task");
        }
        if let Err(e) = self.store.srem(PENDING_SET_KEY, draft_id).await {
            warn!(draft_id, err = %e, "failed to unindex recheck task");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn scheduler() -> (Arc<InMemoryRecheckStore>, RecheckScheduler) {
        let store = Arc::new(InMemoryRecheckStore::new());
        (store.clone(), RecheckScheduler::new(store))
    }

    #[tokio::test]
    async fn round_trip_with_clock_advance() {
        let (_store, scheduler) = scheduler();
        let now = Utc::now();
        scheduler.schedule_at("d1", "l1", "best bbq in midtown", now).await;

        // Immediately after scheduling: not yet due.
        assert!(scheduler.get_pending_rechecks_at(now).await.is_empty());

        // Past the 14-day target: exactly one task, for d1.
        let later = now + Duration::days(14) + Duration::hours(1);
        let due = scheduler.get_pending_rechecks_at(later).await;
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].payload.draft_id, "d1");
        assert_eq!(due[0].task_type, "sov_recheck");
        assert_eq!(due[0].target_date, now + Duration::days(14));

        // Completion removes it for good.
        scheduler.complete_recheck("d1").await;
        assert!(scheduler.get_pending_rechecks_at(later).await.is_empty());
    }

    #[tokio::test]
    async fn empty_query_writes_nothing() {
        let (store, scheduler) = scheduler();
        scheduler.schedule_at("d1", "l1", "", Utc::now()).await;
        scheduler.schedule_at("d2", "l1", "   ", Utc::now()).await;

        assert_eq!(store.get("sov_recheck:d1").await.unwrap(), None);
        assert!(store.smembers(PENDING_SET_KEY).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_index_entry_is_healed() {
        let (store, scheduler) = scheduler();
        // Index points at a task that never made it into the store.
        store.sadd(PENDING_SET_KEY, "ghost").await.unwrap();

        assert!(scheduler
            .get_pending_rechecks_at(Utc::now() + Duration::days(30))
            .await
            .is_empty());
        assert!(store.smembers(PENDING_SET_KEY).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn noop_store_never_surfaces_tasks() {
        let scheduler = RecheckScheduler::new(Arc::new(NoopRecheckStore));
        scheduler.schedule_at("d1", "l1", "query", Utc::now()).await;
        assert!(scheduler
            .get_pending_rechecks_at(Utc::now() + Duration::days(30))
            .await
            .is_empty());
        scheduler.complete_recheck("d1").await;
    }

    /// Store that fails every operation — scheduling must absorb it all.
    struct BrokenStore;

    #[async_trait]
    impl RecheckStore for BrokenStore {
        async fn set(&self, _: &str, _: &str, _: i64) -> Result<()> {
            Err(anyhow!("connection refused"))
        }
        async fn get(&self, _: &str) -> Result<Option<String>> {
            Err(anyhow!("connection refused"))
        }
        async fn del(&self, _: &str) -> Result<()> {
            Err(anyhow!("connection refused"))
        }
        async fn sadd(&self, _: &str, _: &str) -> Result<()> {
            Err(anyhow!("connection refused"))
        }
        async fn smembers(&self, _: &str) -> Result<Vec<String>> {
            Err(anyhow!("connection refused"))
        }
        async fn srem(&self, _: &str, _: &str) -> Result<()> {
            Err(anyhow!("connection refused"))
        }
    }

    #[tokio::test]
    async fn unreachable_store_degrades_to_noop() {
        let scheduler = RecheckScheduler::new(Arc::new(BrokenStore));
        scheduler.schedule_at("d1", "l1", "query", Utc::now()).await;
        assert!(scheduler.get_pending_rechecks().await.is_empty());
        scheduler.complete_recheck("d1").await;
    }
}
