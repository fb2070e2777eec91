use sqlx::Row;

use hrdesk_core::domain::history::{AssignmentEntry, StatusHistoryEntry};
use hrdesk_core::domain::request::RequestId;
use hrdesk_core::domain::user::UserId;

use super::request::{parse_status, parse_timestamp};
use super::{HistoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlHistoryRepository {
    pool: DbPool,
}

impl SqlHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_status_entry(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<StatusHistoryEntry, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_id: String =
        row.try_get("request_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let old_status: String =
        row.try_get("old_status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let new_status: String =
        row.try_get("new_status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let changed_by: String =
        row.try_get("changed_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let notes: String =
        row.try_get("notes").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(StatusHistoryEntry {
        id,
        request_id: RequestId(request_id),
        old_status: parse_status(&old_status),
        new_status: parse_status(&new_status),
        changed_by: UserId(changed_by),
        notes,
        created_at: parse_timestamp(&created_at_str),
    })
}

fn row_to_assignment_entry(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<AssignmentEntry, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_id: String =
        row.try_get("request_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let previous_assignee_id: Option<String> =
        row.try_get("previous_assignee_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let new_assignee_id: String =
        row.try_get("new_assignee_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let assigned_by: String =
        row.try_get("assigned_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let notes: String =
        row.try_get("notes").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(AssignmentEntry {
        id,
        request_id: RequestId(request_id),
        previous_assignee_id: previous_assignee_id.map(UserId),
        new_assignee_id: UserId(new_assignee_id),
        assigned_by: UserId(assigned_by),
        notes,
        created_at: parse_timestamp(&created_at_str),
    })
}

#[async_trait::async_trait]
impl HistoryRepository for SqlHistoryRepository {
    async fn status_history_for(
        &self,
        id: &RequestId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, request_id, old_status, new_status, changed_by, notes, created_at
             FROM status_history WHERE request_id = ? ORDER BY created_at ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_status_entry).collect::<Result<Vec<_>, _>>()
    }

    async fn assignments_for(
        &self,
        id: &RequestId,
    ) -> Result<Vec<AssignmentEntry>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, request_id, previous_assignee_id, new_assignee_id, assigned_by, notes,
                    created_at
             FROM assignment_history WHERE request_id = ? ORDER BY created_at ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_assignment_entry).collect::<Result<Vec<_>, _>>()
    }
}
