use async_trait::async_trait;
use sqlx::postgres::PgPool;

use domains::{Authorizer, BoardId, Result, UserId};

use super::db;

/// Site admins moderate every board; everyone else needs a
/// `board_moderators` row.
pub struct PgAuthorizer {
    pool: PgPool,
}

impl PgAuthorizer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Authorizer for PgAuthorizer {
    async fn check(&self, actor: UserId, board: BoardId) -> Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE user_id = $2 AND user_admin)
                 OR EXISTS (SELECT 1 FROM board_moderators WHERE ib_id = $1 AND user_id = $2)",
        )
        .bind(board)
        .bind(actor)
        .fetch_one(&self.pool)
        .await
        .map_err(db)
    }
}
