//! Shared fixtures: one board wired entirely to in-memory adapters.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use domains::{
    Actor, Authorizer, ImageId, ImageRef, ModerationStore, Post, PostNum, Tag, TagId, Thread,
    ThreadId,
};
use services::{EngineSettings, ModerationDeps, ModerationService};
use storage_adapters::memory::{
    MemoryAuditLog, MemoryCache, MemoryFiles, MemoryObjectStore, MemoryStore, RecordingFirewall,
    StaticAuthorizer,
};

pub const BOARD: i64 = 1;
pub const MODERATOR: i64 = 2;

pub struct Harness {
    pub store: MemoryStore,
    pub cache: Arc<MemoryCache>,
    pub objects: Arc<MemoryObjectStore>,
    pub files: Arc<MemoryFiles>,
    pub audit: Arc<MemoryAuditLog>,
    pub firewall: Arc<RecordingFirewall>,
    pub engine: ModerationService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_authorizer(StaticAuthorizer::allow_all())
    }

    pub fn with_authorizer(authorizer: impl Authorizer + 'static) -> Self {
        Self::build(authorizer, |store| Arc::new(store))
    }

    /// The engine sees the store through `wrap`; `h.store` stays the
    /// unwrapped memory store for seeding and snapshots.
    pub fn wrapping(wrap: impl FnOnce(MemoryStore) -> Arc<dyn ModerationStore>) -> Self {
        Self::build(StaticAuthorizer::allow_all(), wrap)
    }

    fn build(
        authorizer: impl Authorizer + 'static,
        wrap: impl FnOnce(MemoryStore) -> Arc<dyn ModerationStore>,
    ) -> Self {
        let store = MemoryStore::new();
        let cache = Arc::new(MemoryCache::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let files = Arc::new(MemoryFiles::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let firewall = Arc::new(RecordingFirewall::new());

        let deps = ModerationDeps {
            store: wrap(store.clone()),
            cache: cache.clone(),
            objects: objects.clone(),
            files: files.clone(),
            authorizer: Arc::new(authorizer),
            audit: audit.clone(),
            firewall: Some(firewall.clone()),
        };
        let engine = ModerationService::new(deps, EngineSettings::default());

        Self { store, cache, objects, files, audit, firewall, engine }
    }

    /// Waits for audit, reclaim and firewall jobs to drain.
    pub async fn settle(&self) {
        self.engine.pool().wait_idle().await;
    }
}

pub fn moderator() -> Actor {
    Actor::new(MODERATOR).with_ip("203.0.113.9")
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
}

pub fn thread(id: ThreadId, title: &str) -> Thread {
    Thread {
        board_id: BOARD,
        thread_id: id,
        title: title.to_string(),
        deleted: false,
        closed: false,
        sticky: false,
        last_post: None,
    }
}

pub fn post(thread: ThreadId, num: PostNum) -> Post {
    Post {
        thread_id: thread,
        num,
        deleted: false,
        posted_at: at(num * 60),
        ip: format!("198.51.100.{num}"),
        image: None,
    }
}

pub fn image(id: ImageId) -> ImageRef {
    ImageRef {
        image_id: id,
        hash: format!("sha256-{id}"),
        file: format!("{id}.png"),
        thumbnail: format!("{id}s.jpg"),
    }
}

pub fn tag(id: TagId, name: &str) -> Tag {
    Tag { tag_id: id, board_id: BOARD, name: name.to_string(), tag_type: 1 }
}

/// Seeds a live thread with posts `1..=posts`.
pub async fn seed_thread(store: &MemoryStore, id: ThreadId, title: &str, posts: PostNum) {
    store.insert_thread(thread(id, title)).await;
    for num in 1..=posts {
        store.insert_post(post(id, num)).await;
    }
}

/// Every key the thread-content template produces for `thread`.
pub fn thread_content_keys(thread: ThreadId) -> Vec<String> {
    vec![
        format!("index:{BOARD}"),
        format!("directory:{BOARD}"),
        format!("thread:{BOARD}:{thread}"),
        format!("post:{BOARD}:{thread}"),
        format!("tags:{BOARD}"),
        format!("image:{BOARD}"),
        format!("new:{BOARD}"),
        format!("popular:{BOARD}"),
        format!("favorited:{BOARD}"),
    ]
}
