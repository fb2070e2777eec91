use sqlx::Row;

use hrdesk_core::domain::attachment::{Attachment, AttachmentId};
use hrdesk_core::domain::request::RequestId;
use hrdesk_core::domain::user::UserId;

use super::request::parse_timestamp;
use super::{AttachmentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAttachmentRepository {
    pool: DbPool,
}

impl SqlAttachmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_attachment(row: &sqlx::sqlite::SqliteRow) -> Result<Attachment, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_id: String =
        row.try_get("request_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let file_name: String =
        row.try_get("file_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let content_type: String =
        row.try_get("content_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let size_bytes: i64 =
        row.try_get("size_bytes").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let storage_path: String =
        row.try_get("storage_path").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let uploaded_by: String =
        row.try_get("uploaded_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Attachment {
        id: AttachmentId(id),
        request_id: RequestId(request_id),
        file_name,
        content_type,
        size_bytes,
        storage_path,
        uploaded_by: UserId(uploaded_by),
        created_at: parse_timestamp(&created_at_str),
    })
}

#[async_trait::async_trait]
impl AttachmentRepository for SqlAttachmentRepository {
    async fn save(&self, attachment: Attachment) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO attachments (id, request_id, file_name, content_type, size_bytes,
                                      storage_path, uploaded_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&attachment.id.0)
        .bind(&attachment.request_id.0)
        .bind(&attachment.file_name)
        .bind(&attachment.content_type)
        .bind(attachment.size_bytes)
        .bind(&attachment.storage_path)
        .bind(&attachment.uploaded_by.0)
        .bind(attachment.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_request(
        &self,
        id: &RequestId,
    ) -> Result<Vec<Attachment>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, request_id, file_name, content_type, size_bytes, storage_path,
                    uploaded_by, created_at
             FROM attachments WHERE request_id = ? ORDER BY created_at ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_attachment).collect::<Result<Vec<_>, _>>()
    }
}
