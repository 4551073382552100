//! Paginated read side of the audit trail (mod log and board log).

use std::sync::Arc;

use tracing::warn;

use domains::{AuditCategory, AuditLogReader, AuditPage, BoardId, DomainError, Result};

pub struct AuditLogService {
    reader: Arc<dyn AuditLogReader>,
    per_page: i64,
}

impl AuditLogService {
    pub fn new(reader: Arc<dyn AuditLogReader>, per_page: i64) -> Self {
        Self { reader, per_page: per_page.max(1) }
    }

    /// One page, newest first. Pages start at 1. An empty log still has a
    /// first page.
    pub async fn page(&self, board: BoardId, category: AuditCategory, page: i64) -> Result<AuditPage> {
        if board <= 0 {
            return Err(DomainError::NotFound(format!("board {board}")));
        }
        if page <= 0 {
            return Err(DomainError::NotFound(format!("page {page}")));
        }

        let total = self.reader.count(board, category).await?;
        let pages = ((total + self.per_page - 1) / self.per_page).max(1);
        if page > pages {
            warn!(board, page, pages, "audit page out of range");
            return Err(DomainError::NotFound(format!("page {page} of {pages}")));
        }

        let offset = (page - 1) * self.per_page;
        let entries = if total == 0 {
            Vec::new()
        } else {
            self.reader.entries(board, category, offset, self.per_page).await?
        };

        Ok(AuditPage {
            board_id: board,
            category,
            current_page: page,
            per_page: self.per_page,
            total,
            pages,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::{AuditLogLine, MockAuditLogReader};
    use mockall::predicate::eq;

    fn line(n: i64) -> AuditLogLine {
        AuditLogLine {
            user_id: 2,
            user_name: "mod".into(),
            time: Utc::now(),
            action: "Closed Thread".into(),
            detail: format!("thread {n}"),
        }
    }

    #[tokio::test]
    async fn empty_log_has_one_empty_page() {
        let mut reader = MockAuditLogReader::new();
        reader.expect_count().returning(|_, _| Ok(0));
        reader.expect_entries().never();

        let service = AuditLogService::new(Arc::new(reader), 25);
        let page = service.page(1, AuditCategory::ModLog, 1).await.unwrap();
        assert_eq!((page.pages, page.total), (1, 0));
        assert!(page.entries.is_empty());
    }

    #[tokio::test]
    async fn second_page_uses_offset() {
        let mut reader = MockAuditLogReader::new();
        reader.expect_count().with(eq(3), eq(AuditCategory::UserLog)).returning(|_, _| Ok(30));
        reader
            .expect_entries()
            .with(eq(3), eq(AuditCategory::UserLog), eq(25), eq(25))
            .returning(|_, _, _, _| Ok((0..5).map(line).collect()));

        let service = AuditLogService::new(Arc::new(reader), 25);
        let page = service.page(3, AuditCategory::UserLog, 2).await.unwrap();
        assert_eq!(page.pages, 2);
        assert_eq!(page.entries.len(), 5);
    }

    #[tokio::test]
    async fn out_of_range_pages_are_not_found() {
        let mut reader = MockAuditLogReader::new();
        reader.expect_count().returning(|_, _| Ok(10));

        let service = AuditLogService::new(Arc::new(reader), 25);
        for (board, page) in [(0, 1), (1, 0), (1, 2)] {
            let err = service.page(board, AuditCategory::ModLog, page).await.unwrap_err();
            assert!(matches!(err, DomainError::NotFound(_)), "board {board} page {page}");
        }
    }
}
