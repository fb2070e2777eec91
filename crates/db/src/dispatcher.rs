//! Notification delivery. Inserts per-recipient inbox rows, fans out to
//! admins, and drains the outbox written by lifecycle transactions.
//!
//! Delivery is best-effort relative to the core state transition: creation
//! failures are logged and reported as a boolean, never raised to the
//! caller, and one recipient's failure does not affect siblings.

use chrono::Utc;
use sqlx::Row;
use tracing::warn;
use uuid::Uuid;

use hrdesk_core::domain::notification::{
    Notification, NotificationId, NotificationIntent, NotificationKind,
};
use hrdesk_core::domain::user::UserId;

use crate::repositories::request::parse_timestamp;
use crate::repositories::user::row_to_user;
use crate::repositories::RepositoryError;
use crate::DbPool;

#[derive(Clone)]
pub struct NotificationDispatcher {
    pool: DbPool,
}

fn parse_kind(s: &str) -> NotificationKind {
    NotificationKind::parse(s).unwrap_or(NotificationKind::NewRequest)
}

fn row_to_notification(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<Notification, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let recipient_id: String =
        row.try_get("recipient_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind_str: String =
        row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: String =
        row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let message: String =
        row.try_get("message").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let related_id: Option<String> =
        row.try_get("related_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_read: bool =
        row.try_get("is_read").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Notification {
        id: NotificationId(id),
        recipient_id: UserId(recipient_id),
        kind: parse_kind(&kind_str),
        title,
        message,
        related_id,
        is_read,
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
    })
}

impl NotificationDispatcher {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_notification(
        &self,
        recipient_id: &UserId,
        kind: NotificationKind,
        title: &str,
        message: &str,
        related_id: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO notifications (id, recipient_id, kind, title, message, related_id,
                                        is_read, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&recipient_id.0)
        .bind(kind.as_str())
        .bind(title)
        .bind(message)
        .bind(related_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Creates one inbox row. Failures are logged and reported as `false`.
    pub async fn notify_user(
        &self,
        recipient_id: &UserId,
        kind: NotificationKind,
        title: &str,
        message: &str,
        related_id: Option<&str>,
    ) -> bool {
        match self.insert_notification(recipient_id, kind, title, message, related_id).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "notify.delivery_failed",
                    recipient_id = %recipient_id.0,
                    kind = kind.as_str(),
                    error = %error,
                    "failed to create notification row"
                );
                false
            }
        }
    }

    /// Fans out to every active admin. Returns `true` only if every insert
    /// succeeded; rows already created are never rolled back.
    pub async fn notify_all_admins(
        &self,
        kind: NotificationKind,
        title: &str,
        message: &str,
        related_id: Option<&str>,
    ) -> bool {
        let rows = sqlx::query(
            "SELECT id, display_name, email, role, active, created_at
             FROM users WHERE role = 'admin' AND active = 1",
        )
        .fetch_all(&self.pool)
        .await;

        let admins = match rows {
            Ok(rows) => rows,
            Err(error) => {
                warn!(
                    event_name = "notify.admin_fanout_failed",
                    error = %error,
                    "could not load admin recipients"
                );
                return false;
            }
        };

        let mut all_delivered = true;
        for row in &admins {
            let Ok(admin) = row_to_user(row) else {
                all_delivered = false;
                continue;
            };
            if !self.notify_user(&admin.id, kind, title, message, related_id).await {
                all_delivered = false;
            }
        }

        all_delivered
    }

    /// Flips the read flag when the notification belongs to the given user.
    /// Returns whether a row was affected; a repeat call affects zero rows
    /// and is not an error.
    pub async fn mark_read(
        &self,
        notification_id: &NotificationId,
        user_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, updated_at = ?
             WHERE id = ? AND recipient_id = ? AND is_read = 0",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&notification_id.0)
        .bind(&user_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_read(&self, user_id: &UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, updated_at = ?
             WHERE recipient_id = ? AND is_read = 0",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&user_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn unread_count(&self, user_id: &UserId) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0",
        )
        .bind(&user_id.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    pub async fn list_for_user(
        &self,
        user_id: &UserId,
        only_unread: bool,
        limit: u32,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = if only_unread {
            sqlx::query(
                "SELECT id, recipient_id, kind, title, message, related_id, is_read,
                        created_at, updated_at
                 FROM notifications
                 WHERE recipient_id = ? AND is_read = 0
                 ORDER BY created_at DESC LIMIT ?",
            )
            .bind(&user_id.0)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, recipient_id, kind, title, message, related_id, is_read,
                        created_at, updated_at
                 FROM notifications
                 WHERE recipient_id = ?
                 ORDER BY created_at DESC LIMIT ?",
            )
            .bind(&user_id.0)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(row_to_notification).collect::<Result<Vec<_>, _>>()
    }

    /// Delivers undispatched outbox intents into notification rows.
    /// Per-row isolation: a failing intent is logged and left in place for
    /// a later retry while the rest of the batch proceeds. Returns the
    /// number delivered.
    pub async fn drain_outbox(&self) -> usize {
        let rows = sqlx::query(
            "SELECT id, recipient_id, kind, title, message, related_id
             FROM notification_outbox
             WHERE dispatched_at IS NULL
             ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(error) => {
                warn!(
                    event_name = "notify.outbox_read_failed",
                    error = %error,
                    "could not read notification outbox"
                );
                return 0;
            }
        };

        let mut delivered = 0;
        for row in &rows {
            let outbox_id: String = match row.try_get("id") {
                Ok(id) => id,
                Err(error) => {
                    warn!(event_name = "notify.outbox_decode_failed", error = %error, "bad outbox row");
                    continue;
                }
            };
            let intent = match decode_intent(row) {
                Ok(intent) => intent,
                Err(error) => {
                    warn!(
                        event_name = "notify.outbox_decode_failed",
                        outbox_id = %outbox_id,
                        error = %error,
                        "bad outbox row"
                    );
                    continue;
                }
            };

            let created = self
                .notify_user(
                    &intent.recipient_id,
                    intent.kind,
                    &intent.title,
                    &intent.message,
                    intent.related_id.as_deref(),
                )
                .await;
            if !created {
                continue;
            }

            let marked = sqlx::query(
                "UPDATE notification_outbox SET dispatched_at = ? WHERE id = ?",
            )
            .bind(Utc::now().to_rfc3339())
            .bind(&outbox_id)
            .execute(&self.pool)
            .await;

            match marked {
                Ok(_) => delivered += 1,
                Err(error) => {
                    // the row exists but the intent stays undispatched; a
                    // later drain re-delivers it, possibly as a duplicate
                    warn!(
                        event_name = "notify.outbox_mark_failed",
                        outbox_id = %outbox_id,
                        error = %error,
                        "failed to mark outbox intent dispatched"
                    );
                }
            }
        }

        delivered
    }
}

fn decode_intent(row: &sqlx::sqlite::SqliteRow) -> Result<NotificationIntent, RepositoryError> {
    let recipient_id: String =
        row.try_get("recipient_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind_str: String =
        row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: String =
        row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let message: String =
        row.try_get("message").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let related_id: Option<String> =
        row.try_get("related_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(NotificationIntent {
        recipient_id: UserId(recipient_id),
        kind: parse_kind(&kind_str),
        title,
        message,
        related_id,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use hrdesk_core::domain::notification::{NotificationId, NotificationKind};
    use hrdesk_core::domain::user::{Role, User, UserId};

    use super::NotificationDispatcher;
    use crate::repositories::{SqlUserRepository, UserRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    async fn seed_user(pool: &sqlx::SqlitePool, id: &str, role: Role) {
        let repo = SqlUserRepository::new(pool.clone());
        repo.save(User {
            id: UserId(id.to_string()),
            display_name: format!("User {id}"),
            email: format!("{id}@example.test"),
            role,
            active: true,
            created_at: Utc::now(),
        })
        .await
        .expect("seed user");
    }

    #[tokio::test]
    async fn notify_user_creates_unread_row() {
        let pool = setup().await;
        seed_user(&pool, "u-1", Role::Employee).await;
        let dispatcher = NotificationDispatcher::new(pool);

        let delivered = dispatcher
            .notify_user(
                &UserId("u-1".to_string()),
                NotificationKind::RequestSubmitted,
                "Request submitted",
                "Your request has been received.",
                Some("req-1"),
            )
            .await;
        assert!(delivered);

        let unread = dispatcher.unread_count(&UserId("u-1".to_string())).await.expect("count");
        assert_eq!(unread, 1);

        let inbox = dispatcher
            .list_for_user(&UserId("u-1".to_string()), true, 50)
            .await
            .expect("list");
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::RequestSubmitted);
        assert_eq!(inbox[0].related_id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn notify_all_admins_fans_out_to_each_active_admin() {
        let pool = setup().await;
        seed_user(&pool, "admin-1", Role::Admin).await;
        seed_user(&pool, "admin-2", Role::Admin).await;
        seed_user(&pool, "emp-1", Role::Employee).await;
        let dispatcher = NotificationDispatcher::new(pool);

        let delivered = dispatcher
            .notify_all_admins(NotificationKind::NewRequest, "New employee request", "Laptop", None)
            .await;
        assert!(delivered);

        for admin in ["admin-1", "admin-2"] {
            let count =
                dispatcher.unread_count(&UserId(admin.to_string())).await.expect("count");
            assert_eq!(count, 1, "{admin} should have one notification");
        }
        let employee_count =
            dispatcher.unread_count(&UserId("emp-1".to_string())).await.expect("count");
        assert_eq!(employee_count, 0);
    }

    #[tokio::test]
    async fn mark_read_is_scoped_to_owner_and_idempotent() {
        let pool = setup().await;
        seed_user(&pool, "u-1", Role::Employee).await;
        seed_user(&pool, "u-2", Role::Employee).await;
        let dispatcher = NotificationDispatcher::new(pool);

        dispatcher
            .notify_user(
                &UserId("u-1".to_string()),
                NotificationKind::RequestResponded,
                "Request Completed",
                "Done.",
                None,
            )
            .await;
        let inbox =
            dispatcher.list_for_user(&UserId("u-1".to_string()), false, 10).await.expect("list");
        let id: NotificationId = inbox[0].id.clone();

        // someone else's id does not flip it
        let foreign = dispatcher.mark_read(&id, &UserId("u-2".to_string())).await.expect("mark");
        assert!(!foreign);

        let first = dispatcher.mark_read(&id, &UserId("u-1".to_string())).await.expect("mark");
        assert!(first);

        // second call affects zero rows and does not error
        let second = dispatcher.mark_read(&id, &UserId("u-1".to_string())).await.expect("mark");
        assert!(!second);
    }

    #[tokio::test]
    async fn mark_all_read_reports_affected_count() {
        let pool = setup().await;
        seed_user(&pool, "u-1", Role::Employee).await;
        let dispatcher = NotificationDispatcher::new(pool);

        for n in 0..3 {
            dispatcher
                .notify_user(
                    &UserId("u-1".to_string()),
                    NotificationKind::RequestResponded,
                    &format!("Update {n}"),
                    "...",
                    None,
                )
                .await;
        }

        let affected = dispatcher.mark_all_read(&UserId("u-1".to_string())).await.expect("bulk");
        assert_eq!(affected, 3);

        let again = dispatcher.mark_all_read(&UserId("u-1".to_string())).await.expect("bulk");
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn drain_outbox_delivers_pending_intents_once() {
        let pool = setup().await;
        seed_user(&pool, "u-1", Role::Employee).await;

        sqlx::query(
            "INSERT INTO notification_outbox (id, recipient_id, kind, title, message, related_id, created_at)
             VALUES ('ob-1', 'u-1', 'request_responded', 'Request Completed', 'Done.', 'req-1', ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .expect("seed outbox");

        let dispatcher = NotificationDispatcher::new(pool);

        let delivered = dispatcher.drain_outbox().await;
        assert_eq!(delivered, 1);
        assert_eq!(
            dispatcher.unread_count(&UserId("u-1".to_string())).await.expect("count"),
            1
        );

        // intent is marked dispatched; a second drain delivers nothing
        let again = dispatcher.drain_outbox().await;
        assert_eq!(again, 0);
        assert_eq!(
            dispatcher.unread_count(&UserId("u-1".to_string())).await.expect("count"),
            1
        );
    }
}
