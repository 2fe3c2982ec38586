//! Time-bounded cache in front of the read-mostly backend queries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pmbot_core::{current_unix_timestamp_ms, window_elapsed, BotError};

use crate::models::{Commit, Fetched, LinkOutcome, MemberStats, Project, Task};
use crate::ProjectBackend;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    stored_unix_ms: u64,
    value: T,
}

/// Keyed TTL cache. Entries older than the TTL are treated as missing.
#[derive(Debug)]
pub struct QueryCache<T> {
    ttl_ms: u64,
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> QueryCache<T> {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl_ms,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str, now_unix_ms: u64) -> Option<T> {
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(key)?;
        if self.ttl_ms == 0 || window_elapsed(entry.stored_unix_ms, self.ttl_ms, now_unix_ms) {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn put(&self, key: &str, value: T, now_unix_ms: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key.to_string(),
                CacheEntry {
                    stored_unix_ms: now_unix_ms,
                    value,
                },
            );
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Wraps a backend and caches project and recent-task listings.
///
/// Partial results are never cached so a later call can recover the rows that
/// failed to decode.
pub struct CachedBackend<B> {
    inner: B,
    projects: QueryCache<Fetched<Project>>,
    tasks: QueryCache<Fetched<Task>>,
}

impl<B: ProjectBackend> CachedBackend<B> {
    pub fn new(inner: B, ttl_ms: u64) -> Self {
        Self {
            inner,
            projects: QueryCache::new(ttl_ms),
            tasks: QueryCache::new(ttl_ms),
        }
    }

    pub fn invalidate(&self) {
        self.projects.clear();
        self.tasks.clear();
    }

    pub fn into_shared(self) -> Arc<dyn ProjectBackend>
    where
        B: 'static,
    {
        Arc::new(self)
    }
}

#[async_trait]
impl<B: ProjectBackend> ProjectBackend for CachedBackend<B> {
    async fn list_projects(&self) -> Result<Fetched<Project>, BotError> {
        let now = current_unix_timestamp_ms();
        if let Some(cached) = self.projects.get("projects", now) {
            tracing::debug!("project list served from cache");
            return Ok(cached);
        }
        let fetched = self.inner.list_projects().await?;
        if !fetched.is_partial() {
            self.projects.put("projects", fetched.clone(), now);
        }
        Ok(fetched)
    }

    async fn recent_tasks(&self, hours: u32) -> Result<Fetched<Task>, BotError> {
        let key = format!("tasks:{hours}");
        let now = current_unix_timestamp_ms();
        if let Some(cached) = self.tasks.get(&key, now) {
            return Ok(cached);
        }
        let fetched = self.inner.recent_tasks(hours).await?;
        if !fetched.is_partial() {
            self.tasks.put(&key, fetched.clone(), now);
        }
        Ok(fetched)
    }

    async fn member_stats(&self, project_id: &str, hours: u32) -> Result<Fetched<MemberStats>, BotError> {
        self.inner.member_stats(project_id, hours).await
    }

    async fn incomplete_tasks(&self, project_id: &str) -> Result<Fetched<Task>, BotError> {
        self.inner.incomplete_tasks(project_id).await
    }

    async fn recent_commits(&self, project_id: &str, hours: u32) -> Result<Fetched<Commit>, BotError> {
        self.inner.recent_commits(project_id, hours).await
    }

    async fn link_account(&self, discord_id: &str, email: &str) -> Result<LinkOutcome, BotError> {
        self.invalidate();
        self.inner.link_account(discord_id, email).await
    }
}
