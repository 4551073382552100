use async_trait::async_trait;
use sqlx::postgres::{PgConnection, Postgres};
use sqlx::{Row, Transaction};

use domains::{BlobRef, BoardId, DomainError, PostNum, Result, StoreTransaction, ThreadId};

use super::db;

/// One READ COMMITTED transaction. Dropping it without `commit` rolls back.
pub struct PgStoreTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgStoreTransaction {
    pub(crate) fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx: Some(tx) }
    }

    fn conn(&mut self) -> Result<&mut PgConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(DomainError::internal("transaction already finished")),
        }
    }
}

fn blob(row: sqlx::postgres::PgRow) -> Result<BlobRef> {
    Ok(BlobRef {
        file: row.try_get("image_file").map_err(db)?,
        thumbnail: row.try_get("image_thumbnail").map_err(db)?,
    })
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn lock_thread(&mut self, board: BoardId, thread: ThreadId) -> Result<bool> {
        let locked: Option<i64> =
            sqlx::query_scalar("SELECT thread_id FROM threads WHERE ib_id = $1 AND thread_id = $2 FOR UPDATE")
                .bind(board)
                .bind(thread)
                .fetch_optional(self.conn()?)
                .await
                .map_err(db)?;
        Ok(locked.is_some())
    }

    async fn post_deleted(&mut self, thread: ThreadId, post: PostNum) -> Result<Option<bool>> {
        sqlx::query_scalar("SELECT post_deleted FROM posts WHERE thread_id = $1 AND post_num = $2")
            .bind(thread)
            .bind(post)
            .fetch_optional(self.conn()?)
            .await
            .map_err(db)
    }

    async fn live_post_count(&mut self, thread: ThreadId) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE thread_id = $1 AND NOT post_deleted")
            .bind(thread)
            .fetch_one(self.conn()?)
            .await
            .map_err(db)
    }

    async fn set_post_deleted(&mut self, thread: ThreadId, post: PostNum, deleted: bool) -> Result<()> {
        sqlx::query("UPDATE posts SET post_deleted = $3 WHERE thread_id = $1 AND post_num = $2")
            .bind(thread)
            .bind(post)
            .bind(deleted)
            .execute(self.conn()?)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn mark_thread_deleted(&mut self, board: BoardId, thread: ThreadId) -> Result<()> {
        sqlx::query("UPDATE threads SET thread_deleted = TRUE WHERE ib_id = $1 AND thread_id = $2")
            .bind(board)
            .bind(thread)
            .execute(self.conn()?)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn refresh_last_post(&mut self, board: BoardId, thread: ThreadId, live_only: bool) -> Result<()> {
        sqlx::query(
            "UPDATE threads SET thread_last_post = latest.post_time
             FROM (SELECT MAX(post_time) AS post_time FROM posts
                   WHERE thread_id = $2 AND (NOT $3 OR NOT post_deleted)) latest
             WHERE threads.ib_id = $1 AND threads.thread_id = $2 AND latest.post_time IS NOT NULL",
        )
        .bind(board)
        .bind(thread)
        .bind(live_only)
        .execute(self.conn()?)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn post_image(&mut self, thread: ThreadId, post: PostNum) -> Result<Option<BlobRef>> {
        let row = sqlx::query(
            "SELECT i.image_file, i.image_thumbnail
             FROM images i JOIN posts p ON p.post_id = i.post_id
             WHERE p.thread_id = $1 AND p.post_num = $2
             LIMIT 1",
        )
        .bind(thread)
        .bind(post)
        .fetch_optional(self.conn()?)
        .await
        .map_err(db)?;
        row.map(blob).transpose()
    }

    async fn delete_post(&mut self, thread: ThreadId, post: PostNum) -> Result<()> {
        sqlx::query("DELETE FROM posts WHERE thread_id = $1 AND post_num = $2")
            .bind(thread)
            .bind(post)
            .execute(self.conn()?)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn thread_images(&mut self, board: BoardId, thread: ThreadId) -> Result<Vec<BlobRef>> {
        let rows = sqlx::query(
            "SELECT i.image_file, i.image_thumbnail
             FROM images i
             JOIN posts p ON p.post_id = i.post_id
             JOIN threads t ON t.thread_id = p.thread_id
             WHERE t.ib_id = $1 AND t.thread_id = $2
             ORDER BY p.post_num",
        )
        .bind(board)
        .bind(thread)
        .fetch_all(self.conn()?)
        .await
        .map_err(db)?;
        rows.into_iter().map(blob).collect()
    }

    async fn delete_thread(&mut self, board: BoardId, thread: ThreadId) -> Result<()> {
        // posts, images and tagmap rows cascade
        sqlx::query("DELETE FROM threads WHERE ib_id = $1 AND thread_id = $2")
            .bind(board)
            .bind(thread)
            .execute(self.conn()?)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.commit().await.map_err(db),
            None => Err(DomainError::internal("transaction already finished")),
        }
    }

    async fn rollback(&mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(db),
            None => Ok(()),
        }
    }
}
