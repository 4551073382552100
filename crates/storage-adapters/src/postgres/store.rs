use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use domains::{
    BannedFile, BannedIp, BoardId, ImageId, ModerationStore, PostNum, PostStatus, Result,
    StoreTransaction, Tag, TagId, Thread, ThreadId,
};

use super::{db, PgStoreTransaction};

pub struct PgModerationStore {
    pool: PgPool,
}

impl PgModerationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn set_thread_flag(
        &self,
        column: ThreadFlag,
        board: BoardId,
        thread: ThreadId,
        value: bool,
    ) -> Result<()> {
        let sql = match column {
            ThreadFlag::Closed => "UPDATE threads SET thread_closed = $3 WHERE ib_id = $1 AND thread_id = $2",
            ThreadFlag::Sticky => "UPDATE threads SET thread_sticky = $3 WHERE ib_id = $1 AND thread_id = $2",
            ThreadFlag::Deleted => "UPDATE threads SET thread_deleted = $3 WHERE ib_id = $1 AND thread_id = $2",
        };
        sqlx::query(sql)
            .bind(board)
            .bind(thread)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum ThreadFlag {
    Closed,
    Sticky,
    Deleted,
}

#[async_trait]
impl ModerationStore for PgModerationStore {
    async fn thread(&self, board: BoardId, thread: ThreadId) -> Result<Option<Thread>> {
        let row = sqlx::query(
            "SELECT ib_id, thread_id, thread_title, thread_deleted, thread_closed, thread_sticky, thread_last_post
             FROM threads WHERE ib_id = $1 AND thread_id = $2",
        )
        .bind(board)
        .bind(thread)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.map(|row| {
            Ok(Thread {
                board_id: row.try_get("ib_id").map_err(db)?,
                thread_id: row.try_get("thread_id").map_err(db)?,
                title: row.try_get("thread_title").map_err(db)?,
                deleted: row.try_get("thread_deleted").map_err(db)?,
                closed: row.try_get("thread_closed").map_err(db)?,
                sticky: row.try_get("thread_sticky").map_err(db)?,
                last_post: row.try_get("thread_last_post").map_err(db)?,
            })
        })
        .transpose()
    }

    async fn post_status(
        &self,
        board: BoardId,
        thread: ThreadId,
        post: PostNum,
    ) -> Result<Option<PostStatus>> {
        let row = sqlx::query(
            "SELECT t.thread_title, p.post_deleted
             FROM posts p JOIN threads t ON t.thread_id = p.thread_id
             WHERE t.ib_id = $1 AND t.thread_id = $2 AND p.post_num = $3",
        )
        .bind(board)
        .bind(thread)
        .bind(post)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.map(|row| {
            Ok(PostStatus {
                thread_title: row.try_get("thread_title").map_err(db)?,
                deleted: row.try_get("post_deleted").map_err(db)?,
            })
        })
        .transpose()
    }

    async fn post_ip(
        &self,
        board: BoardId,
        thread: ThreadId,
        post: PostNum,
    ) -> Result<Option<String>> {
        sqlx::query_scalar(
            "SELECT p.post_ip
             FROM posts p JOIN threads t ON t.thread_id = p.thread_id
             WHERE t.ib_id = $1 AND t.thread_id = $2 AND p.post_num = $3",
        )
        .bind(board)
        .bind(thread)
        .bind(post)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)
    }

    async fn post_file_hash(
        &self,
        board: BoardId,
        thread: ThreadId,
        post: PostNum,
    ) -> Result<Option<String>> {
        sqlx::query_scalar(
            "SELECT i.image_hash
             FROM images i
             JOIN posts p ON p.post_id = i.post_id
             JOIN threads t ON t.thread_id = p.thread_id
             WHERE t.ib_id = $1 AND t.thread_id = $2 AND p.post_num = $3
             LIMIT 1",
        )
        .bind(board)
        .bind(thread)
        .bind(post)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)
    }

    async fn tag(&self, board: BoardId, tag: TagId) -> Result<Option<Tag>> {
        let row = sqlx::query(
            "SELECT tag_id, ib_id, tag_name, tagtype_id FROM tags WHERE ib_id = $1 AND tag_id = $2",
        )
        .bind(board)
        .bind(tag)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.map(|row| {
            Ok(Tag {
                tag_id: row.try_get("tag_id").map_err(db)?,
                board_id: row.try_get("ib_id").map_err(db)?,
                name: row.try_get("tag_name").map_err(db)?,
                tag_type: row.try_get("tagtype_id").map_err(db)?,
            })
        })
        .transpose()
    }

    async fn tag_name_in_use(&self, board: BoardId, name: &str, excluding: TagId) -> Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM tags WHERE ib_id = $1 AND tag_name = $2 AND tag_id <> $3)",
        )
        .bind(board)
        .bind(name)
        .bind(excluding)
        .fetch_one(&self.pool)
        .await
        .map_err(db)
    }

    async fn set_thread_closed(&self, board: BoardId, thread: ThreadId, closed: bool) -> Result<()> {
        self.set_thread_flag(ThreadFlag::Closed, board, thread, closed).await
    }

    async fn set_thread_sticky(&self, board: BoardId, thread: ThreadId, sticky: bool) -> Result<()> {
        self.set_thread_flag(ThreadFlag::Sticky, board, thread, sticky).await
    }

    async fn set_thread_deleted(&self, board: BoardId, thread: ThreadId, deleted: bool) -> Result<()> {
        self.set_thread_flag(ThreadFlag::Deleted, board, thread, deleted).await
    }

    async fn insert_banned_ip(&self, ban: &BannedIp) -> Result<bool> {
        let done = sqlx::query(
            "INSERT INTO banned_ips (ib_id, user_id, ban_ip, ban_reason) VALUES ($1, $2, $3, $4)
             ON CONFLICT (ib_id, ban_ip) DO NOTHING",
        )
        .bind(ban.board_id)
        .bind(ban.actor)
        .bind(&ban.ip)
        .bind(&ban.reason)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(done.rows_affected() == 1)
    }

    async fn insert_banned_file(&self, ban: &BannedFile) -> Result<bool> {
        let done = sqlx::query(
            "INSERT INTO banned_files (ib_id, user_id, ban_hash, ban_reason) VALUES ($1, $2, $3, $4)
             ON CONFLICT (ib_id, ban_hash) DO NOTHING",
        )
        .bind(ban.board_id)
        .bind(ban.actor)
        .bind(&ban.hash)
        .bind(&ban.reason)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(done.rows_affected() == 1)
    }

    async fn delete_tag(&self, board: BoardId, tag: TagId) -> Result<()> {
        // tagmap rows go with it
        sqlx::query("DELETE FROM tags WHERE ib_id = $1 AND tag_id = $2")
            .bind(board)
            .bind(tag)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn delete_image_tag(&self, board: BoardId, image: ImageId, tag: TagId) -> Result<()> {
        sqlx::query(
            "DELETE FROM tagmap m USING tags t
             WHERE m.tag_id = t.tag_id AND t.ib_id = $1 AND m.image_id = $2 AND m.tag_id = $3",
        )
        .bind(board)
        .bind(image)
        .bind(tag)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn update_tag(&self, board: BoardId, tag: TagId, name: &str, tag_type: i64) -> Result<()> {
        sqlx::query("UPDATE tags SET tag_name = $3, tagtype_id = $4 WHERE ib_id = $1 AND tag_id = $2")
            .bind(board)
            .bind(tag)
            .bind(name)
            .bind(tag_type)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await.map_err(db)?;
        Ok(Box::new(PgStoreTransaction::new(tx)))
    }
}
