//! In-memory recheck store — TTL-evicting maps behind a mutex.
//!
//! Default backend for single-process deployments and tests. Entries are
//! evicted lazily on read once their TTL passes.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::RecheckStore;

#[derive(Default)]
pub struct InMemoryRecheckStore {
    entries: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
    sets: Mutex<HashMap<String, HashSet<String>>>,
}

impl InMemoryRecheckStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecheckStore for InMemoryRecheckStore {
    async fn set(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<()> {
        let expires_at = Utc::now() + Duration::seconds(ttl_seconds);
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at <= Utc::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<()> {
        self.sets
            .lock()
            .await
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn smembers(&self, set: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .lock()
            .await
            .get(set)
            .map(|members| {
                let mut v: Vec<String> = members.iter().cloned().collect();
                v.sort();
                v
            })
            .unwrap_or_default())
    }

    async fn srem(&self, set: &str, member: &str) -> Result<()> {
        if let Some(members) = self.sets.lock().await.get_mut(set) {
            members.remove(member);
        }
        Ok(())
    }
}
