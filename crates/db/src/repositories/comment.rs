use sqlx::Row;

use hrdesk_core::domain::comment::{Comment, CommentId};
use hrdesk_core::domain::request::RequestId;
use hrdesk_core::domain::user::UserId;

use super::request::parse_timestamp;
use super::{CommentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCommentRepository {
    pool: DbPool,
}

impl SqlCommentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_comment(row: &sqlx::sqlite::SqliteRow) -> Result<Comment, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_id: String =
        row.try_get("request_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let author_id: String =
        row.try_get("author_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let body: String = row.try_get("body").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_internal: bool =
        row.try_get("is_internal").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Comment {
        id: CommentId(id),
        request_id: RequestId(request_id),
        author_id: UserId(author_id),
        body,
        is_internal,
        created_at: parse_timestamp(&created_at_str),
    })
}

#[async_trait::async_trait]
impl CommentRepository for SqlCommentRepository {
    async fn append(&self, comment: Comment) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO comments (id, request_id, author_id, body, is_internal, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&comment.id.0)
        .bind(&comment.request_id.0)
        .bind(&comment.author_id.0)
        .bind(&comment.body)
        .bind(comment.is_internal)
        .bind(comment.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_request(
        &self,
        id: &RequestId,
        include_internal: bool,
    ) -> Result<Vec<Comment>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = if include_internal {
            sqlx::query(
                "SELECT id, request_id, author_id, body, is_internal, created_at
                 FROM comments WHERE request_id = ? ORDER BY created_at ASC",
            )
            .bind(&id.0)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, request_id, author_id, body, is_internal, created_at
                 FROM comments WHERE request_id = ? AND is_internal = 0
                 ORDER BY created_at ASC",
            )
            .bind(&id.0)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(row_to_comment).collect::<Result<Vec<_>, _>>()
    }
}
