//! # Mutation Executor
//!
//! Applies exactly one logical state change per action. Toggles, bans and tag
//! writes are single statements. Post deletes and purges run inside one
//! explicit transaction that first locks the owning thread row, so two
//! cascading decisions on the same thread never interleave.

use std::sync::Arc;

use tracing::{debug, warn};

use domains::{
    BlobRef, BoardId, DomainError, ModerationStore, PostNum, Result, StoreTransaction, ThreadId,
};

use super::action::Command;

/// What a committed mutation left behind for the later pipeline stages.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Effect {
    /// The post delete also marked its thread deleted
    pub cascaded_thread_delete: bool,
    /// Media that no longer has a row pointing at it
    pub blobs: Vec<BlobRef>,
    /// `false` when a ban already existed
    pub inserted: bool,
}

impl Effect {
    fn applied() -> Self {
        Self { inserted: true, ..Self::default() }
    }
}

pub struct MutationExecutor {
    store: Arc<dyn ModerationStore>,
}

impl MutationExecutor {
    pub fn new(store: Arc<dyn ModerationStore>) -> Self {
        Self { store }
    }

    pub(crate) async fn apply(&self, command: &Command) -> Result<Effect> {
        match command {
            Command::BanIp(ban) => {
                let inserted = self.store.insert_banned_ip(ban).await?;
                if !inserted {
                    debug!(board = ban.board_id, "address already banned");
                }
                Ok(Effect { inserted, ..Effect::default() })
            }
            Command::BanFile(ban) => {
                let inserted = self.store.insert_banned_file(ban).await?;
                if !inserted {
                    debug!(board = ban.board_id, "file already banned");
                }
                Ok(Effect { inserted, ..Effect::default() })
            }
            Command::SetClosed { at, closed } => {
                self.store.set_thread_closed(at.board, at.thread, *closed).await?;
                Ok(Effect::applied())
            }
            Command::SetSticky { at, sticky } => {
                self.store.set_thread_sticky(at.board, at.thread, *sticky).await?;
                Ok(Effect::applied())
            }
            Command::SetThreadDeleted { at, deleted } => {
                self.store.set_thread_deleted(at.board, at.thread, *deleted).await?;
                Ok(Effect::applied())
            }
            Command::SetPostDeleted { at, deleted } => {
                let mut tx = self.store.begin().await?;
                let result = toggle_post(tx.as_mut(), at.board, at.thread, at.post, *deleted).await;
                let cascaded = finish(tx, result).await?;
                if cascaded {
                    debug!(thread = at.thread, "last live post deleted, thread marked deleted");
                }
                Ok(Effect { cascaded_thread_delete: cascaded, ..Effect::applied() })
            }
            Command::PurgeThread { at } => {
                let mut tx = self.store.begin().await?;
                let result = purge_thread(tx.as_mut(), at.board, at.thread).await;
                let blobs = finish(tx, result).await?;
                Ok(Effect { blobs, ..Effect::applied() })
            }
            Command::PurgePost { at } => {
                let mut tx = self.store.begin().await?;
                let result = purge_post(tx.as_mut(), at.board, at.thread, at.post).await;
                let blobs = finish(tx, result).await?;
                Ok(Effect { blobs: blobs.into_iter().collect(), ..Effect::applied() })
            }
            Command::DeleteTag { at } => {
                self.store.delete_tag(at.board, at.tag).await?;
                Ok(Effect::applied())
            }
            Command::DeleteImageTag { at } => {
                self.store.delete_image_tag(at.board, at.image, at.tag).await?;
                Ok(Effect::applied())
            }
            Command::UpdateTag { at, name, tag_type } => {
                // Check and write are separate statements; a concurrent
                // rename to the same name can slip between them.
                if self.store.tag_name_in_use(at.board, name, at.tag).await? {
                    return Err(DomainError::Duplicate(format!("tag name {name:?} already exists")));
                }
                self.store.update_tag(at.board, at.tag, name, *tag_type).await?;
                Ok(Effect::applied())
            }
        }
    }
}

/// Commits on success, rolls back on failure. A failed rollback is logged;
/// the statement error is what the caller sees.
async fn finish<T>(mut tx: Box<dyn StoreTransaction>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}

async fn lock(tx: &mut dyn StoreTransaction, board: BoardId, thread: ThreadId) -> Result<()> {
    if !tx.lock_thread(board, thread).await? {
        return Err(DomainError::NotFound(format!("thread {thread} on board {board}")));
    }
    Ok(())
}

/// Returns whether the thread was marked deleted too. The cascade is decided
/// from the flag as it stands under the thread lock, not from the resolver's
/// earlier read.
async fn toggle_post(
    tx: &mut dyn StoreTransaction,
    board: BoardId,
    thread: ThreadId,
    post: PostNum,
    deleted: bool,
) -> Result<bool> {
    lock(tx, board, thread).await?;

    let was_deleted = tx.post_deleted(thread, post).await?.ok_or_else(|| {
        DomainError::NotFound(format!("post {thread}/{post} on board {board}"))
    })?;

    let mut cascaded = false;
    if deleted && !was_deleted && tx.live_post_count(thread).await? == 1 {
        tx.mark_thread_deleted(board, thread).await?;
        cascaded = true;
    }
    tx.set_post_deleted(thread, post, deleted).await?;
    tx.refresh_last_post(board, thread, true).await?;
    Ok(cascaded)
}

async fn purge_thread(
    tx: &mut dyn StoreTransaction,
    board: BoardId,
    thread: ThreadId,
) -> Result<Vec<BlobRef>> {
    lock(tx, board, thread).await?;
    let blobs = tx.thread_images(board, thread).await?;
    tx.delete_thread(board, thread).await?;
    Ok(blobs)
}

async fn purge_post(
    tx: &mut dyn StoreTransaction,
    board: BoardId,
    thread: ThreadId,
    post: PostNum,
) -> Result<Option<BlobRef>> {
    lock(tx, board, thread).await?;
    let blob = tx.post_image(thread, post).await?;
    tx.delete_post(thread, post).await?;
    tx.refresh_last_post(board, thread, false).await?;
    Ok(blob)
}
