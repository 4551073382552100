use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use domains::{AuditCategory, AuditEntry, AuditLogLine, AuditLogReader, AuditSink, BoardId, Result};

use super::db;

/// Appends to the `audit` table.
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn submit(&self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit (user_id, ib_id, audit_type, audit_ip, audit_time, audit_action, audit_info)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.actor)
        .bind(entry.board_id)
        .bind(entry.category.code())
        .bind(entry.ip.as_deref())
        .bind(entry.timestamp)
        .bind(&entry.action)
        .bind(&entry.detail)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }
}

/// Reads the mod log and board log.
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogReader for PgAuditLog {
    async fn count(&self, board: BoardId, category: AuditCategory) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM audit WHERE ib_id = $1 AND audit_type = $2")
            .bind(board)
            .bind(category.code())
            .fetch_one(&self.pool)
            .await
            .map_err(db)
    }

    async fn entries(
        &self,
        board: BoardId,
        category: AuditCategory,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuditLogLine>> {
        let rows = sqlx::query(
            "SELECT a.user_id, u.user_name, a.audit_time, a.audit_action, a.audit_info
             FROM audit a JOIN users u ON u.user_id = a.user_id
             WHERE a.ib_id = $1 AND a.audit_type = $2
             ORDER BY a.audit_time DESC, a.audit_id DESC
             LIMIT $3 OFFSET $4",
        )
        .bind(board)
        .bind(category.code())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.into_iter()
            .map(|row| {
                Ok(AuditLogLine {
                    user_id: row.try_get("user_id").map_err(db)?,
                    user_name: row.try_get("user_name").map_err(db)?,
                    time: row.try_get("audit_time").map_err(db)?,
                    action: row.try_get("audit_action").map_err(db)?,
                    detail: row.try_get("audit_info").map_err(db)?,
                })
            })
            .collect()
    }
}
