//! In-process relational store.
//!
//! A transaction takes the state lock for its whole lifetime and works on a
//! copy, so concurrent transactions serialize and a rollback (or drop) simply
//! discards the copy.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use tokio::sync::{Mutex, OwnedMutexGuard};

use domains::{
    BannedFile, BannedIp, BlobRef, BoardId, DomainError, ImageId, ImageTagMapping,
    ModerationStore, Post, PostNum, PostStatus, Result, StoreTransaction, Tag, TagId, Thread,
    ThreadId,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    threads: BTreeMap<ThreadId, Thread>,
    posts: BTreeMap<(ThreadId, PostNum), Post>,
    tags: BTreeMap<TagId, Tag>,
    tagmap: BTreeSet<(ImageId, TagId)>,
    banned_ips: BTreeMap<(BoardId, String), BannedIp>,
    banned_files: BTreeMap<(BoardId, String), BannedFile>,
}

impl MemoryState {
    fn thread_in(&self, board: BoardId, thread: ThreadId) -> Option<&Thread> {
        self.threads.get(&thread).filter(|t| t.board_id == board)
    }

    fn post_in(&self, board: BoardId, thread: ThreadId, post: PostNum) -> Option<&Post> {
        self.thread_in(board, thread)?;
        self.posts.get(&(thread, post))
    }

    fn drop_image_mappings(&mut self, image: ImageId) {
        self.tagmap.retain(|(i, _)| *i != image);
    }
}

#[derive(Default)]
struct Shared {
    state: Arc<Mutex<MemoryState>>,
    /// Statement names that fail on their next call
    failing: DashSet<&'static str>,
    writes: AtomicUsize,
}

impl Shared {
    fn check(&self, statement: &'static str) -> Result<()> {
        if self.failing.remove(statement).is_some() {
            return Err(DomainError::internal(format!("injected failure in {statement}")));
        }
        Ok(())
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Cloning shares the same underlying state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The named statement (a port method name) fails once.
    pub fn fail_next(&self, statement: &'static str) {
        self.shared.failing.insert(statement);
    }

    /// Committed write statements so far.
    pub fn writes(&self) -> usize {
        self.shared.writes.load(Ordering::SeqCst)
    }

    pub async fn insert_thread(&self, thread: Thread) {
        self.shared.state.lock().await.threads.insert(thread.thread_id, thread);
    }

    pub async fn insert_post(&self, post: Post) {
        self.shared.state.lock().await.posts.insert((post.thread_id, post.num), post);
    }

    pub async fn insert_tag(&self, tag: Tag) {
        self.shared.state.lock().await.tags.insert(tag.tag_id, tag);
    }

    pub async fn map_image_tag(&self, image: ImageId, tag: TagId) {
        self.shared.state.lock().await.tagmap.insert((image, tag));
    }

    pub async fn thread_snapshot(&self, board: BoardId, thread: ThreadId) -> Option<Thread> {
        self.shared.state.lock().await.thread_in(board, thread).cloned()
    }

    pub async fn post_snapshot(&self, thread: ThreadId, post: PostNum) -> Option<Post> {
        self.shared.state.lock().await.posts.get(&(thread, post)).cloned()
    }

    pub async fn tag_snapshot(&self, tag: TagId) -> Option<Tag> {
        self.shared.state.lock().await.tags.get(&tag).cloned()
    }

    pub async fn image_tags(&self) -> Vec<ImageTagMapping> {
        self.shared
            .state
            .lock()
            .await
            .tagmap
            .iter()
            .map(|(image_id, tag_id)| ImageTagMapping { image_id: *image_id, tag_id: *tag_id })
            .collect()
    }

    pub async fn banned_ips(&self) -> Vec<BannedIp> {
        self.shared.state.lock().await.banned_ips.values().cloned().collect()
    }

    pub async fn banned_files(&self) -> Vec<BannedFile> {
        self.shared.state.lock().await.banned_files.values().cloned().collect()
    }
}

#[async_trait]
impl ModerationStore for MemoryStore {
    async fn thread(&self, board: BoardId, thread: ThreadId) -> Result<Option<Thread>> {
        self.shared.check("thread")?;
        Ok(self.shared.state.lock().await.thread_in(board, thread).cloned())
    }

    async fn post_status(
        &self,
        board: BoardId,
        thread: ThreadId,
        post: PostNum,
    ) -> Result<Option<PostStatus>> {
        self.shared.check("post_status")?;
        let state = self.shared.state.lock().await;
        let Some(found) = state.post_in(board, thread, post) else {
            return Ok(None);
        };
        let title = state.thread_in(board, thread).map(|t| t.title.clone()).unwrap_or_default();
        Ok(Some(PostStatus { thread_title: title, deleted: found.deleted }))
    }

    async fn post_ip(
        &self,
        board: BoardId,
        thread: ThreadId,
        post: PostNum,
    ) -> Result<Option<String>> {
        self.shared.check("post_ip")?;
        let state = self.shared.state.lock().await;
        Ok(state.post_in(board, thread, post).map(|p| p.ip.clone()))
    }

    async fn post_file_hash(
        &self,
        board: BoardId,
        thread: ThreadId,
        post: PostNum,
    ) -> Result<Option<String>> {
        self.shared.check("post_file_hash")?;
        let state = self.shared.state.lock().await;
        Ok(state
            .post_in(board, thread, post)
            .and_then(|p| p.image.as_ref())
            .map(|i| i.hash.clone()))
    }

    async fn tag(&self, board: BoardId, tag: TagId) -> Result<Option<Tag>> {
        self.shared.check("tag")?;
        let state = self.shared.state.lock().await;
        Ok(state.tags.get(&tag).filter(|t| t.board_id == board).cloned())
    }

    async fn tag_name_in_use(&self, board: BoardId, name: &str, excluding: TagId) -> Result<bool> {
        self.shared.check("tag_name_in_use")?;
        let state = self.shared.state.lock().await;
        Ok(state
            .tags
            .values()
            .any(|t| t.board_id == board && t.name == name && t.tag_id != excluding))
    }

    async fn set_thread_closed(&self, board: BoardId, thread: ThreadId, closed: bool) -> Result<()> {
        self.shared.check("set_thread_closed")?;
        let mut state = self.shared.state.lock().await;
        if let Some(t) = state.threads.get_mut(&thread).filter(|t| t.board_id == board) {
            t.closed = closed;
        }
        self.shared.wrote();
        Ok(())
    }

    async fn set_thread_sticky(&self, board: BoardId, thread: ThreadId, sticky: bool) -> Result<()> {
        self.shared.check("set_thread_sticky")?;
        let mut state = self.shared.state.lock().await;
        if let Some(t) = state.threads.get_mut(&thread).filter(|t| t.board_id == board) {
            t.sticky = sticky;
        }
        self.shared.wrote();
        Ok(())
    }

    async fn set_thread_deleted(&self, board: BoardId, thread: ThreadId, deleted: bool) -> Result<()> {
        self.shared.check("set_thread_deleted")?;
        let mut state = self.shared.state.lock().await;
        if let Some(t) = state.threads.get_mut(&thread).filter(|t| t.board_id == board) {
            t.deleted = deleted;
        }
        self.shared.wrote();
        Ok(())
    }

    async fn insert_banned_ip(&self, ban: &BannedIp) -> Result<bool> {
        self.shared.check("insert_banned_ip")?;
        let mut state = self.shared.state.lock().await;
        let key = (ban.board_id, ban.ip.clone());
        if state.banned_ips.contains_key(&key) {
            return Ok(false);
        }
        state.banned_ips.insert(key, ban.clone());
        self.shared.wrote();
        Ok(true)
    }

    async fn insert_banned_file(&self, ban: &BannedFile) -> Result<bool> {
        self.shared.check("insert_banned_file")?;
        let mut state = self.shared.state.lock().await;
        let key = (ban.board_id, ban.hash.clone());
        if state.banned_files.contains_key(&key) {
            return Ok(false);
        }
        state.banned_files.insert(key, ban.clone());
        self.shared.wrote();
        Ok(true)
    }

    async fn delete_tag(&self, board: BoardId, tag: TagId) -> Result<()> {
        self.shared.check("delete_tag")?;
        let mut state = self.shared.state.lock().await;
        if state.tags.get(&tag).is_some_and(|t| t.board_id == board) {
            state.tags.remove(&tag);
            state.tagmap.retain(|(_, t)| *t != tag);
        }
        self.shared.wrote();
        Ok(())
    }

    async fn delete_image_tag(&self, board: BoardId, image: ImageId, tag: TagId) -> Result<()> {
        self.shared.check("delete_image_tag")?;
        let mut state = self.shared.state.lock().await;
        if state.tags.get(&tag).is_some_and(|t| t.board_id == board) {
            state.tagmap.remove(&(image, tag));
        }
        self.shared.wrote();
        Ok(())
    }

    async fn update_tag(&self, board: BoardId, tag: TagId, name: &str, tag_type: i64) -> Result<()> {
        self.shared.check("update_tag")?;
        let mut state = self.shared.state.lock().await;
        if let Some(t) = state.tags.get_mut(&tag).filter(|t| t.board_id == board) {
            t.name = name.to_string();
            t.tag_type = tag_type;
        }
        self.shared.wrote();
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        self.shared.check("begin")?;
        let guard = Arc::clone(&self.shared.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard: Some(guard),
            working,
            writes: 0,
            shared: Arc::clone(&self.shared),
        }))
    }
}

pub struct MemoryTransaction {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    working: MemoryState,
    writes: usize,
    shared: Arc<Shared>,
}

impl MemoryTransaction {
    fn open(&self, statement: &'static str) -> Result<()> {
        if self.guard.is_none() {
            return Err(DomainError::internal("transaction already finished"));
        }
        self.shared.check(statement)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_thread(&mut self, board: BoardId, thread: ThreadId) -> Result<bool> {
        self.open("lock_thread")?;
        Ok(self.working.thread_in(board, thread).is_some())
    }

    async fn post_deleted(&mut self, thread: ThreadId, post: PostNum) -> Result<Option<bool>> {
        self.open("post_deleted")?;
        Ok(self.working.posts.get(&(thread, post)).map(|p| p.deleted))
    }

    async fn live_post_count(&mut self, thread: ThreadId) -> Result<i64> {
        self.open("live_post_count")?;
        let count = self
            .working
            .posts
            .values()
            .filter(|p| p.thread_id == thread && !p.deleted)
            .count();
        Ok(count as i64)
    }

    async fn set_post_deleted(&mut self, thread: ThreadId, post: PostNum, deleted: bool) -> Result<()> {
        self.open("set_post_deleted")?;
        if let Some(p) = self.working.posts.get_mut(&(thread, post)) {
            p.deleted = deleted;
        }
        self.writes += 1;
        Ok(())
    }

    async fn mark_thread_deleted(&mut self, board: BoardId, thread: ThreadId) -> Result<()> {
        self.open("mark_thread_deleted")?;
        if let Some(t) = self.working.threads.get_mut(&thread).filter(|t| t.board_id == board) {
            t.deleted = true;
        }
        self.writes += 1;
        Ok(())
    }

    async fn refresh_last_post(&mut self, board: BoardId, thread: ThreadId, live_only: bool) -> Result<()> {
        self.open("refresh_last_post")?;
        let latest = self
            .working
            .posts
            .values()
            .filter(|p| p.thread_id == thread && (!live_only || !p.deleted))
            .map(|p| p.posted_at)
            .max();
        if let (Some(latest), Some(t)) =
            (latest, self.working.threads.get_mut(&thread).filter(|t| t.board_id == board))
        {
            t.last_post = Some(latest);
        }
        self.writes += 1;
        Ok(())
    }

    async fn post_image(&mut self, thread: ThreadId, post: PostNum) -> Result<Option<BlobRef>> {
        self.open("post_image")?;
        Ok(self
            .working
            .posts
            .get(&(thread, post))
            .and_then(|p| p.image.as_ref())
            .map(|i| i.blob()))
    }

    async fn delete_post(&mut self, thread: ThreadId, post: PostNum) -> Result<()> {
        self.open("delete_post")?;
        if let Some(removed) = self.working.posts.remove(&(thread, post)) {
            if let Some(image) = removed.image {
                self.working.drop_image_mappings(image.image_id);
            }
        }
        self.writes += 1;
        Ok(())
    }

    async fn thread_images(&mut self, board: BoardId, thread: ThreadId) -> Result<Vec<BlobRef>> {
        self.open("thread_images")?;
        if self.working.thread_in(board, thread).is_none() {
            return Ok(Vec::new());
        }
        Ok(self
            .working
            .posts
            .range((thread, PostNum::MIN)..=(thread, PostNum::MAX))
            .filter_map(|(_, p)| p.image.as_ref().map(|i| i.blob()))
            .collect())
    }

    async fn delete_thread(&mut self, board: BoardId, thread: ThreadId) -> Result<()> {
        self.open("delete_thread")?;
        if self.working.thread_in(board, thread).is_some() {
            self.working.threads.remove(&thread);
            let doomed: Vec<(ThreadId, PostNum)> = self
                .working
                .posts
                .range((thread, PostNum::MIN)..=(thread, PostNum::MAX))
                .map(|(key, _)| *key)
                .collect();
            for key in doomed {
                if let Some(image) = self.working.posts.remove(&key).and_then(|p| p.image) {
                    self.working.drop_image_mappings(image.image_id);
                }
            }
        }
        self.writes += 1;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.open("commit")?;
        if let Some(mut guard) = self.guard.take() {
            *guard = std::mem::take(&mut self.working);
            self.shared.writes.fetch_add(self.writes, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.guard = None;
        Ok(())
    }
}
