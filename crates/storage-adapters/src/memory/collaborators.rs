//! In-process cache, media, audit, authorization and firewall adapters.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use domains::{
    AuditCategory, AuditEntry, AuditLogLine, AuditLogReader, AuditSink, Authorizer, BoardId,
    CacheStore, DomainError, EdgeFirewall, LocalFiles, ObjectStore, Result, UserId,
};

fn recorded<T: Clone>(log: &Mutex<Vec<T>>) -> Vec<T> {
    log.lock().map(|items| items.clone()).unwrap_or_default()
}

fn push<T>(log: &Mutex<Vec<T>>, item: T) {
    if let Ok(mut items) = log.lock() {
        items.push(item);
    }
}

/// Key/value cache that records every delete batch it receives.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, String>,
    batches: Mutex<Vec<Vec<String>>>,
    failing: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Every delete call so far, in order.
    pub fn delete_batches(&self) -> Vec<Vec<String>> {
        recorded(&self.batches)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn delete(&self, keys: &[String]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::internal("cache unavailable"));
        }
        for key in keys {
            self.entries.remove(key);
        }
        push(&self.batches, keys.to_vec());
        Ok(())
    }
}

/// Object storage keyed by path.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashSet<String>,
    deletes: Mutex<Vec<String>>,
    failing: DashSet<String>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: impl Into<String>) {
        self.objects.insert(path.into());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.contains(path)
    }

    /// Paths a delete was attempted for, including failed attempts.
    pub fn delete_attempts(&self) -> Vec<String> {
        recorded(&self.deletes)
    }

    /// Deletes of `path` fail from now on.
    pub fn fail_path(&self, path: impl Into<String>) {
        self.failing.insert(path.into());
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn delete(&self, path: &str) -> Result<()> {
        push(&self.deletes, path.to_string());
        if self.failing.contains(path) {
            return Err(DomainError::internal(format!("cannot delete {path}")));
        }
        self.objects.remove(path);
        Ok(())
    }
}

/// Local media mirror without touching disk.
#[derive(Default)]
pub struct MemoryFiles {
    files: DashSet<PathBuf>,
    removals: Mutex<Vec<PathBuf>>,
    failing: DashSet<PathBuf>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: impl Into<PathBuf>) {
        self.files.insert(path.into());
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.files.contains(path.as_ref())
    }

    pub fn removal_attempts(&self) -> Vec<PathBuf> {
        recorded(&self.removals)
    }

    pub fn fail_path(&self, path: impl Into<PathBuf>) {
        self.failing.insert(path.into());
    }
}

#[async_trait]
impl LocalFiles for MemoryFiles {
    async fn remove_if_exists(&self, path: &Path) -> Result<()> {
        push(&self.removals, path.to_path_buf());
        if self.failing.contains(path) {
            return Err(DomainError::internal(format!("cannot remove {}", path.display())));
        }
        self.files.remove(path);
        Ok(())
    }
}

/// Audit trail kept in memory. Also serves the read side.
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    users: DashMap<UserId, String>,
    failing: AtomicBool,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_user(&self, user: UserId, name: impl Into<String>) {
        self.users.insert(user, name.into());
    }

    /// Everything submitted so far, in submission order.
    pub fn submitted(&self) -> Vec<AuditEntry> {
        recorded(&self.entries)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn matching(&self, board: BoardId, category: AuditCategory) -> Vec<AuditEntry> {
        let mut found: Vec<AuditEntry> = self
            .submitted()
            .into_iter()
            .filter(|e| e.board_id == board && e.category == category)
            .collect();
        // newest first; later appends win ties
        found.reverse();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        found
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn submit(&self, entry: &AuditEntry) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::internal("audit sink unavailable"));
        }
        push(&self.entries, entry.clone());
        Ok(())
    }
}

#[async_trait]
impl AuditLogReader for MemoryAuditLog {
    async fn count(&self, board: BoardId, category: AuditCategory) -> Result<i64> {
        Ok(self.matching(board, category).len() as i64)
    }

    async fn entries(
        &self,
        board: BoardId,
        category: AuditCategory,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuditLogLine>> {
        let skip = usize::try_from(offset).unwrap_or(0);
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .matching(board, category)
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|e| AuditLogLine {
                user_id: e.actor,
                user_name: self
                    .users
                    .get(&e.actor)
                    .map(|name| name.clone())
                    .unwrap_or_else(|| format!("user {}", e.actor)),
                time: e.timestamp,
                action: e.action,
                detail: e.detail,
            })
            .collect())
    }
}

/// Fixed grant list.
#[derive(Debug, Default, Clone)]
pub struct StaticAuthorizer {
    allow_all: bool,
    grants: HashSet<(UserId, BoardId)>,
}

impl StaticAuthorizer {
    pub fn allow_all() -> Self {
        Self { allow_all: true, grants: HashSet::new() }
    }

    pub fn granting(grants: impl IntoIterator<Item = (UserId, BoardId)>) -> Self {
        Self { allow_all: false, grants: grants.into_iter().collect() }
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn check(&self, actor: UserId, board: BoardId) -> Result<bool> {
        Ok(self.allow_all || self.grants.contains(&(actor, board)))
    }
}

/// Records block requests instead of calling a CDN.
#[derive(Default)]
pub struct RecordingFirewall {
    blocked: Mutex<Vec<(String, String)>>,
}

impl RecordingFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    /// (ip, note) pairs in submission order.
    pub fn blocked(&self) -> Vec<(String, String)> {
        recorded(&self.blocked)
    }
}

#[async_trait]
impl EdgeFirewall for RecordingFirewall {
    async fn block_ip(&self, ip: &str, note: &str) -> Result<()> {
        push(&self.blocked, (ip.to_string(), note.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn cache_delete_of_missing_keys_is_fine() {
        let cache = MemoryCache::new();
        cache.put("index:1", "<html>");
        let keys = vec!["index:1".to_string(), "thread:1:7".to_string()];

        cache.delete(&keys).await.unwrap();
        cache.delete(&keys).await.unwrap();

        assert!(!cache.contains("index:1"));
        assert_eq!(cache.delete_batches().len(), 2);
    }

    #[tokio::test]
    async fn audit_reader_pages_newest_first() {
        let log = MemoryAuditLog::new();
        log.name_user(2, "janitor");
        let start = Utc::now();
        for n in 0..3 {
            log.submit(&AuditEntry {
                actor: 2,
                board_id: 1,
                category: AuditCategory::ModLog,
                ip: None,
                timestamp: start + Duration::seconds(n),
                action: "Closed Thread".into(),
                detail: format!("thread {n}"),
            })
            .await
            .unwrap();
        }

        assert_eq!(log.count(1, AuditCategory::ModLog).await.unwrap(), 3);
        assert_eq!(log.count(1, AuditCategory::UserLog).await.unwrap(), 0);

        let page = log.entries(1, AuditCategory::ModLog, 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].detail, "thread 1");
        assert_eq!(page[0].user_name, "janitor");
    }

    #[tokio::test]
    async fn static_grants_are_per_board() {
        let auth = StaticAuthorizer::granting([(2, 1)]);
        assert!(auth.check(2, 1).await.unwrap());
        assert!(!auth.check(2, 3).await.unwrap());
        assert!(StaticAuthorizer::allow_all().check(9, 9).await.unwrap());
    }
}
