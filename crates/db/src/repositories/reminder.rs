use chrono::NaiveDate;
use sqlx::Row;

use hrdesk_core::domain::reminder::Reminder;
use hrdesk_core::domain::request::RequestId;
use hrdesk_core::domain::user::UserId;

use super::request::parse_timestamp;
use super::{ReminderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlReminderRepository {
    pool: DbPool,
}

impl SqlReminderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_reminder(row: &sqlx::sqlite::SqliteRow) -> Result<Reminder, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_id: String =
        row.try_get("request_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let admin_id: String =
        row.try_get("admin_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let remind_at_str: String =
        row.try_get("remind_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let message: String =
        row.try_get("message").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let remind_at = NaiveDate::parse_from_str(&remind_at_str, "%Y-%m-%d")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Reminder {
        id,
        request_id: RequestId(request_id),
        admin_id: UserId(admin_id),
        remind_at,
        message,
        created_at: parse_timestamp(&created_at_str),
    })
}

#[async_trait::async_trait]
impl ReminderRepository for SqlReminderRepository {
    async fn save(&self, reminder: Reminder) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO reminders (id, request_id, admin_id, remind_at, message, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&reminder.id)
        .bind(&reminder.request_id.0)
        .bind(&reminder.admin_id.0)
        .bind(reminder.remind_at.format("%Y-%m-%d").to_string())
        .bind(&reminder.message)
        .bind(reminder.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_request(&self, id: &RequestId) -> Result<Vec<Reminder>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, request_id, admin_id, remind_at, message, created_at
             FROM reminders WHERE request_id = ? ORDER BY remind_at ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_reminder).collect::<Result<Vec<_>, _>>()
    }

    async fn list_due_on_or_before(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<Reminder>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, request_id, admin_id, remind_at, message, created_at
             FROM reminders WHERE remind_at <= ? ORDER BY remind_at ASC",
        )
        .bind(date.format("%Y-%m-%d").to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_reminder).collect::<Result<Vec<_>, _>>()
    }
}
