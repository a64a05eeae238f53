//! Cache store backends
//!
//! The build algorithm is decoupled from storage mechanics behind the
//! `CacheStore` trait: an in-memory implementation ships for tests and
//! small deployments, persistent backends are caller-supplied. The store
//! never refreshes entries on its own — staleness is reported at read time
//! and the caller decides when to rebuild.

use crate::cache::StudentValidationCacheEntry;
use crate::error::Result;
use crate::types::StudentId;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Cache store trait defining all required operations
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Retrieve a student's cache entry, if one exists
    async fn get(&self, student: &StudentId) -> Result<Option<StudentValidationCacheEntry>>;

    /// Store one entry, replacing any previous one for the student
    async fn put(&self, entry: StudentValidationCacheEntry) -> Result<()>;

    /// Store a batch of entries as one replace operation
    async fn put_many(&self, entries: Vec<StudentValidationCacheEntry>) -> Result<()>;

    /// Drop a student's entry
    async fn invalidate(&self, student: &StudentId) -> Result<()>;

    /// Drop every entry
    async fn invalidate_all(&self) -> Result<()>;

    /// Age of a student's entry since it was built, if one exists
    async fn age_of(&self, student: &StudentId) -> Result<Option<Duration>>;
}

/// Result of a TTL-checked cache read
#[derive(Debug, Clone, PartialEq)]
pub enum CacheRead {
    /// Entry exists and is younger than the TTL
    Fresh(StudentValidationCacheEntry),
    /// Entry exists but has outlived the TTL; the caller decides whether
    /// to rebuild
    Stale(StudentValidationCacheEntry),
    Miss,
}

/// Read an entry and report its staleness against a caller-supplied TTL.
///
/// Never triggers a rebuild — staleness is information, not an action.
pub async fn read_with_ttl<S: CacheStore + ?Sized>(
    store: &S,
    student: &StudentId,
    ttl: Duration,
) -> Result<CacheRead> {
    match store.get(student).await? {
        None => Ok(CacheRead::Miss),
        Some(entry) => {
            let age = Utc::now() - entry.built_at;
            if age <= ttl {
                Ok(CacheRead::Fresh(entry))
            } else {
                Ok(CacheRead::Stale(entry))
            }
        }
    }
}

/// In-memory cache store
///
/// Keyed writes with no cross-key ordering requirement; `put_many` takes
/// the write lock once so a batch lands atomically with respect to
/// readers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<StudentId, StudentValidationCacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, student: &StudentId) -> Result<Option<StudentValidationCacheEntry>> {
        Ok(self.entries.read().await.get(student).cloned())
    }

    async fn put(&self, entry: StudentValidationCacheEntry) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(entry.student_id.clone(), entry);
        Ok(())
    }

    async fn put_many(&self, entries: Vec<StudentValidationCacheEntry>) -> Result<()> {
        let mut guard = self.entries.write().await;
        for entry in entries {
            guard.insert(entry.student_id.clone(), entry);
        }
        Ok(())
    }

    async fn invalidate(&self, student: &StudentId) -> Result<()> {
        self.entries.write().await.remove(student);
        Ok(())
    }

    async fn invalidate_all(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn age_of(&self, student: &StudentId) -> Result<Option<Duration>> {
        Ok(self
            .entries
            .read()
            .await
            .get(student)
            .map(|e| Utc::now() - e.built_at))
    }
}
