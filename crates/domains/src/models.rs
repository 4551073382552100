//! # Domain Models
//!
//! These structs represent the persisted entities the moderation engine
//! reads and mutates. Identifiers are the store's integer keys; zero is never
//! a valid identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type BoardId = i64;
pub type ThreadId = i64;
/// Sequence number of a post within its thread
pub type PostNum = i64;
pub type TagId = i64;
pub type ImageId = i64;
pub type UserId = i64;

/// The shared account unauthenticated visitors post under.
pub const ANONYMOUS_USER: UserId = 1;

/// Whoever is performing a moderation action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    /// Client address recorded in the audit trail when known
    pub ip: Option<String>,
}

impl Actor {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, ip: None }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }
}

/// A thread row as the resolver sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub board_id: BoardId,
    pub thread_id: ThreadId,
    pub title: String,
    pub deleted: bool,
    pub closed: bool,
    pub sticky: bool,
    /// Timestamp used for bump ordering
    pub last_post: Option<DateTime<Utc>>,
}

/// A post row. `image` is severed permanently by a purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub thread_id: ThreadId,
    pub num: PostNum,
    pub deleted: bool,
    pub posted_at: DateTime<Utc>,
    pub ip: String,
    pub image: Option<ImageRef>,
}

/// Media attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub image_id: ImageId,
    /// Content hash, the value a file ban is keyed on
    pub hash: String,
    pub file: String,
    pub thumbnail: String,
}

impl ImageRef {
    pub fn blob(&self) -> BlobRef {
        BlobRef {
            file: self.file.clone(),
            thumbnail: self.thumbnail.clone(),
        }
    }
}

/// What the resolver reports for a single post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStatus {
    pub thread_title: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub tag_id: TagId,
    pub board_id: BoardId,
    /// Sanitized display name, unique per board among other tags
    pub name: String,
    pub tag_type: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageTagMapping {
    pub image_id: ImageId,
    pub tag_id: TagId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannedIp {
    pub board_id: BoardId,
    pub ip: String,
    pub reason: String,
    pub actor: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannedFile {
    pub board_id: BoardId,
    pub hash: String,
    pub reason: String,
    pub actor: UserId,
}

/// Filenames of removed media, handed to the blob reclaimer after commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobRef {
    pub file: String,
    pub thumbnail: String,
}

/// Which trail an audit entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditCategory {
    /// Public board log
    UserLog,
    /// Staff-only moderation log
    ModLog,
}

impl AuditCategory {
    /// Stored column value
    pub fn code(self) -> i16 {
        match self {
            Self::UserLog => 1,
            Self::ModLog => 2,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::UserLog),
            2 => Some(Self::ModLog),
            _ => None,
        }
    }
}

/// Immutable, append-only record of a moderation action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: UserId,
    pub board_id: BoardId,
    pub category: AuditCategory,
    pub ip: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub detail: String,
}

/// One line of an audit log page, joined with the actor's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogLine {
    pub user_id: UserId,
    pub user_name: String,
    pub time: DateTime<Utc>,
    pub action: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPage {
    pub board_id: BoardId,
    pub category: AuditCategory,
    pub current_page: i64,
    pub per_page: i64,
    pub total: i64,
    pub pages: i64,
    pub entries: Vec<AuditLogLine>,
}
