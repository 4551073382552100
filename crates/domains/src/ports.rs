//! # Ports
//!
//! Collaborator contracts consumed by the moderation engine. Adapters in
//! `storage-adapters` implement these; tests use the generated mocks or the
//! in-memory adapters.

use std::path::Path;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{
    AuditCategory, AuditEntry, AuditLogLine, BannedFile, BannedIp, BlobRef, BoardId, ImageId,
    PostNum, PostStatus, Tag, TagId, Thread, ThreadId, UserId,
};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Relational store contract.
///
/// Read methods return `Ok(None)` when the identity does not exist in the
/// given board; the engine decides that this is a `NotFound`. Every other
/// failure is reported as `DomainError::Internal`.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ModerationStore: Send + Sync {
    async fn thread(&self, board: BoardId, thread: ThreadId) -> Result<Option<Thread>>;

    async fn post_status(
        &self,
        board: BoardId,
        thread: ThreadId,
        post: PostNum,
    ) -> Result<Option<PostStatus>>;

    /// Address the post was made from
    async fn post_ip(
        &self,
        board: BoardId,
        thread: ThreadId,
        post: PostNum,
    ) -> Result<Option<String>>;

    /// Content hash of the image attached to the post
    async fn post_file_hash(
        &self,
        board: BoardId,
        thread: ThreadId,
        post: PostNum,
    ) -> Result<Option<String>>;

    async fn tag(&self, board: BoardId, tag: TagId) -> Result<Option<Tag>>;

    /// Whether a tag other than `excluding` already uses `name` in `board`.
    ///
    /// This is a plain read: nothing stops a concurrent writer from taking
    /// the name between this check and `update_tag`.
    async fn tag_name_in_use(&self, board: BoardId, name: &str, excluding: TagId)
        -> Result<bool>;

    async fn set_thread_closed(&self, board: BoardId, thread: ThreadId, closed: bool)
        -> Result<()>;

    async fn set_thread_sticky(&self, board: BoardId, thread: ThreadId, sticky: bool)
        -> Result<()>;

    async fn set_thread_deleted(&self, board: BoardId, thread: ThreadId, deleted: bool)
        -> Result<()>;

    /// Idempotent insert. Returns `false` when the (board, ip) pair was
    /// already banned; that is not an error.
    async fn insert_banned_ip(&self, ban: &BannedIp) -> Result<bool>;

    /// Idempotent insert keyed on (board, hash).
    async fn insert_banned_file(&self, ban: &BannedFile) -> Result<bool>;

    async fn delete_tag(&self, board: BoardId, tag: TagId) -> Result<()>;

    async fn delete_image_tag(&self, board: BoardId, image: ImageId, tag: TagId) -> Result<()>;

    async fn update_tag(&self, board: BoardId, tag: TagId, name: &str, tag_type: i64)
        -> Result<()>;

    /// Opens an explicit transaction for cascading writes.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
}

/// Statements that must share one transaction.
///
/// Dropping an uncommitted transaction discards its writes.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait StoreTransaction: Send {
    /// Locks the thread row for the rest of the transaction.
    /// Returns `false` when the thread is gone.
    async fn lock_thread(&mut self, board: BoardId, thread: ThreadId) -> Result<bool>;

    /// Current soft-delete flag of a post, read after `lock_thread` so a
    /// delete committed since the resolver's read is visible.
    async fn post_deleted(&mut self, thread: ThreadId, post: PostNum) -> Result<Option<bool>>;

    async fn live_post_count(&mut self, thread: ThreadId) -> Result<i64>;

    async fn set_post_deleted(&mut self, thread: ThreadId, post: PostNum, deleted: bool)
        -> Result<()>;

    async fn mark_thread_deleted(&mut self, board: BoardId, thread: ThreadId) -> Result<()>;

    /// Recomputes the thread's last-post timestamp from the newest remaining
    /// post (only live ones when `live_only`). Leaves it untouched when no
    /// post qualifies.
    async fn refresh_last_post(&mut self, board: BoardId, thread: ThreadId, live_only: bool)
        -> Result<()>;

    async fn post_image(&mut self, thread: ThreadId, post: PostNum) -> Result<Option<BlobRef>>;

    async fn delete_post(&mut self, thread: ThreadId, post: PostNum) -> Result<()>;

    async fn thread_images(&mut self, board: BoardId, thread: ThreadId) -> Result<Vec<BlobRef>>;

    /// Removes the thread row together with its posts, images and tag mappings.
    async fn delete_thread(&mut self, board: BoardId, thread: ThreadId) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

/// Read-through cache. Deleting a missing key is not an error.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn delete(&self, keys: &[String]) -> Result<()>;
}

/// Remote object storage. Deleting a missing object is not an error.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn delete(&self, path: &str) -> Result<()>;
}

/// Local mirror of the media directories.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait LocalFiles: Send + Sync {
    /// Never errors on a missing path.
    async fn remove_if_exists(&self, path: &Path) -> Result<()>;
}

/// External authorization policy. The engine only consumes the verdict.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn check(&self, actor: UserId, board: BoardId) -> Result<bool>;
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn submit(&self, entry: &AuditEntry) -> Result<()>;
}

/// Read side of the audit trail.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait AuditLogReader: Send + Sync {
    async fn count(&self, board: BoardId, category: AuditCategory) -> Result<i64>;

    /// Newest first.
    async fn entries(
        &self,
        board: BoardId,
        category: AuditCategory,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuditLogLine>>;
}

/// CDN-level firewall that can block an address in front of the site.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait EdgeFirewall: Send + Sync {
    async fn block_ip(&self, ip: &str, note: &str) -> Result<()>;
}
