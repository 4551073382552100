//! Loads the persisted state an action is about to change.

use std::sync::Arc;

use domains::{DomainError, ModerationStore, Result};

use super::action::{Action, Target};

pub struct EntityResolver {
    store: Arc<dyn ModerationStore>,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn ModerationStore>) -> Self {
        Self { store }
    }

    /// Side-effect free. `NotFound` when the identity is absent from the
    /// action's board.
    pub async fn resolve(&self, action: &Action) -> Result<Target> {
        match action {
            Action::BanIp(ban) => {
                let p = ban.post;
                let ip = self.store.post_ip(p.board, p.thread, p.post).await?;
                found(ip, || format!("post {}/{} on board {}", p.thread, p.post, p.board))
                    .map(Target::Address)
            }
            Action::BanFile(ban) => {
                let p = ban.post;
                let hash = self.store.post_file_hash(p.board, p.thread, p.post).await?;
                found(hash, || format!("file on post {}/{} on board {}", p.thread, p.post, p.board))
                    .map(Target::FileHash)
            }
            Action::CloseThread(t)
            | Action::StickyThread(t)
            | Action::DeleteThread(t)
            | Action::PurgeThread(t) => {
                let thread = self.store.thread(t.board, t.thread).await?;
                found(thread, || format!("thread {} on board {}", t.thread, t.board))
                    .map(Target::Thread)
            }
            Action::DeletePost(p) | Action::PurgePost(p) => {
                let status = self.store.post_status(p.board, p.thread, p.post).await?;
                found(status, || format!("post {}/{} on board {}", p.thread, p.post, p.board))
                    .map(Target::Post)
            }
            Action::DeleteTag(t) => self.tag(t.board, t.tag).await,
            Action::DeleteImageTag(m) => self.tag(m.board, m.tag).await,
            Action::UpdateTag(u) => self.tag(u.board, u.tag).await,
        }
    }

    async fn tag(&self, board: i64, tag: i64) -> Result<Target> {
        let found_tag = self.store.tag(board, tag).await?;
        found(found_tag, || format!("tag {tag} on board {board}")).map(Target::Tag)
    }
}

fn found<T>(value: Option<T>, what: impl FnOnce() -> String) -> Result<T> {
    value.ok_or_else(|| DomainError::NotFound(what()))
}
