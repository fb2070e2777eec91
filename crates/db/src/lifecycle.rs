//! Transactional application of lifecycle commands.
//!
//! Each operation defines one atomic boundary: the request mutation and
//! every derived record (history, assignment, comment, reminder, outbox
//! intent) commit or roll back together. Notification delivery happens
//! after commit by draining the outbox and is best-effort.

use chrono::Utc;
use sqlx::{Sqlite, Transaction};
use tracing::{error, info};
use uuid::Uuid;

use hrdesk_core::actor::ActorContext;
use hrdesk_core::config::StorageConfig;
use hrdesk_core::domain::attachment::{Attachment, AttachmentId};
use hrdesk_core::domain::comment::{Comment, CommentId};
use hrdesk_core::domain::history::{AssignmentEntry, StatusHistoryEntry};
use hrdesk_core::domain::notification::NotificationIntent;
use hrdesk_core::domain::reminder::Reminder;
use hrdesk_core::domain::request::{Request, RequestId, RequestStatus};
use hrdesk_core::domain::user::{User, UserId};
use hrdesk_core::errors::{ApplicationError, DomainError};
use hrdesk_core::lifecycle::{
    respond_intents, status_change_note, submit_intents, validate_attachment, validate_bulk,
    validate_respond, validate_submit, BulkTransitionCommand, RespondCommand, SubmitCommand,
    ValidationFailure,
};

use crate::dispatcher::NotificationDispatcher;
use crate::repositories::request::{row_to_request, REQUEST_COLUMNS};
use crate::repositories::user::row_to_user;
use crate::DbPool;

pub struct RequestLifecycle {
    pool: DbPool,
    dispatcher: NotificationDispatcher,
    storage: StorageConfig,
}

fn persistence(context: &'static str, error: impl std::fmt::Display) -> ApplicationError {
    // full detail goes to the log; callers get a generic failure
    error!(event_name = "lifecycle.persistence_failure", context, error = %error, "write failed");
    ApplicationError::Persistence(format!("{context} failed"))
}

fn validation(failures: Vec<ValidationFailure>) -> ApplicationError {
    ApplicationError::Domain(DomainError::validation(failures))
}

async fn fetch_request(
    tx: &mut Transaction<'_, Sqlite>,
    id: &RequestId,
) -> Result<Option<Request>, ApplicationError> {
    let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| persistence("request lookup", e))?;

    match row {
        Some(ref r) => {
            Ok(Some(row_to_request(r).map_err(|e| persistence("request decode", e))?))
        }
        None => Ok(None),
    }
}

async fn fetch_user(
    tx: &mut Transaction<'_, Sqlite>,
    id: &UserId,
) -> Result<Option<User>, ApplicationError> {
    let row = sqlx::query(
        "SELECT id, display_name, email, role, active, created_at FROM users WHERE id = ?",
    )
    .bind(&id.0)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| persistence("user lookup", e))?;

    match row {
        Some(ref r) => Ok(Some(row_to_user(r).map_err(|e| persistence("user decode", e))?)),
        None => Ok(None),
    }
}

/// Shared history-writing primitive. Both the single-response path and bulk
/// transitions record status changes through this insert.
async fn insert_status_history(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &StatusHistoryEntry,
) -> Result<(), ApplicationError> {
    sqlx::query(
        "INSERT INTO status_history (id, request_id, old_status, new_status, changed_by, notes,
                                     created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id)
    .bind(&entry.request_id.0)
    .bind(entry.old_status.as_str())
    .bind(entry.new_status.as_str())
    .bind(&entry.changed_by.0)
    .bind(&entry.notes)
    .bind(entry.created_at.to_rfc3339())
    .execute(&mut **tx)
    .await
    .map_err(|e| persistence("status history insert", e))?;
    Ok(())
}

async fn insert_assignment(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &AssignmentEntry,
) -> Result<(), ApplicationError> {
    sqlx::query(
        "INSERT INTO assignment_history (id, request_id, previous_assignee_id, new_assignee_id,
                                         assigned_by, notes, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id)
    .bind(&entry.request_id.0)
    .bind(entry.previous_assignee_id.as_ref().map(|id| id.0.clone()))
    .bind(&entry.new_assignee_id.0)
    .bind(&entry.assigned_by.0)
    .bind(&entry.notes)
    .bind(entry.created_at.to_rfc3339())
    .execute(&mut **tx)
    .await
    .map_err(|e| persistence("assignment history insert", e))?;
    Ok(())
}

async fn insert_comment(
    tx: &mut Transaction<'_, Sqlite>,
    comment: &Comment,
) -> Result<(), ApplicationError> {
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
    .execute(&mut **tx)
    .await
    .map_err(|e| persistence("comment insert", e))?;
    Ok(())
}

/// Intents are part of the atomic unit; delivery is not.
async fn insert_intent(
    tx: &mut Transaction<'_, Sqlite>,
    intent: &NotificationIntent,
) -> Result<(), ApplicationError> {
    sqlx::query(
        "INSERT INTO notification_outbox (id, recipient_id, kind, title, message, related_id,
                                          created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&intent.recipient_id.0)
    .bind(intent.kind.as_str())
    .bind(&intent.title)
    .bind(&intent.message)
    .bind(&intent.related_id)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut **tx)
    .await
    .map_err(|e| persistence("outbox insert", e))?;
    Ok(())
}

impl RequestLifecycle {
    pub fn new(pool: DbPool, storage: StorageConfig) -> Self {
        let dispatcher = NotificationDispatcher::new(pool.clone());
        Self { pool, dispatcher, storage }
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Creates a pending request and fans out `new_request` notifications
    /// to every active admin plus a receipt to the submitter.
    pub async fn submit(
        &self,
        actor: &ActorContext,
        command: SubmitCommand,
    ) -> Result<Request, ApplicationError> {
        let failures = validate_submit(&command);
        if !failures.is_empty() {
            return Err(validation(failures));
        }

        let mut tx =
            self.pool.begin().await.map_err(|e| persistence("transaction begin", e))?;

        if fetch_user(&mut tx, &actor.user_id).await?.is_none() {
            return Err(ApplicationError::Domain(DomainError::NotFound {
                entity: "user",
                id: actor.user_id.0.clone(),
            }));
        }

        let now = Utc::now();
        let request = Request {
            id: RequestId(Uuid::new_v4().to_string()),
            employee_id: actor.user_id.clone(),
            subject: command.subject.trim().to_string(),
            message: command.message.trim().to_string(),
            priority: command.priority,
            status: RequestStatus::Pending,
            admin_response: None,
            responded_by: None,
            assignee_id: None,
            follow_up_date: None,
            version: 1,
            created_at: now,
            updated_at: now,
            responded_at: None,
        };

        sqlx::query(
            "INSERT INTO requests (id, employee_id, subject, message, priority, status,
                                   version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.employee_id.0)
        .bind(&request.subject)
        .bind(&request.message)
        .bind(request.priority.as_str())
        .bind(request.status.as_str())
        .bind(request.version)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| persistence("request insert", e))?;

        let admin_rows = sqlx::query(
            "SELECT id, display_name, email, role, active, created_at
             FROM users WHERE role = 'admin' AND active = 1",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| persistence("admin lookup", e))?;
        let admins = admin_rows
            .iter()
            .map(row_to_user)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| persistence("admin decode", e))?;

        for intent in submit_intents(&request, &admins) {
            insert_intent(&mut tx, &intent).await?;
        }

        tx.commit().await.map_err(|e| persistence("transaction commit", e))?;

        info!(
            event_name = "lifecycle.request_submitted",
            request_id = %request.id.0,
            actor = %actor.user_id.0,
            priority = request.priority.as_str(),
            "request submitted"
        );

        self.dispatcher.drain_outbox().await;

        Ok(request)
    }

    /// Applies an admin response: status, response text, priority,
    /// assignment, follow-up. Writes are strictly ordered and atomic.
    pub async fn respond(
        &self,
        actor: &ActorContext,
        command: RespondCommand,
    ) -> Result<Request, ApplicationError> {
        let failures = validate_respond(actor, &command, Utc::now());
        if !failures.is_empty() {
            return Err(validation(failures));
        }

        let mut tx =
            self.pool.begin().await.map_err(|e| persistence("transaction begin", e))?;

        let Some(current) = fetch_request(&mut tx, &command.request_id).await? else {
            return Err(ApplicationError::Domain(DomainError::NotFound {
                entity: "request",
                id: command.request_id.0.clone(),
            }));
        };

        if let Some(expected) = command.expected_version {
            if expected != current.version {
                return Err(ApplicationError::Domain(DomainError::VersionConflict {
                    id: current.id.clone(),
                }));
            }
        }

        let assignee = match &command.assignee_id {
            Some(assignee_id) => match fetch_user(&mut tx, assignee_id).await? {
                None => {
                    return Err(validation(vec![ValidationFailure::AssigneeNotFound {
                        user_id: assignee_id.0.clone(),
                    }]));
                }
                Some(user) if !user.active || !user.role.can_triage() => {
                    return Err(validation(vec![ValidationFailure::AssigneeNotEligible {
                        user_id: user.id.0.clone(),
                        role: user.role.as_str().to_string(),
                    }]));
                }
                Some(user) => Some(user),
            },
            None => None,
        };

        let now = Utc::now();
        let response_text = command.response_text.trim().to_string();
        let new_assignee_id =
            command.assignee_id.clone().or_else(|| current.assignee_id.clone());
        let assignee_changed = command
            .assignee_id
            .as_ref()
            .map(|id| current.assignee_id.as_ref() != Some(id))
            .unwrap_or(false);

        let updated = Request {
            status: command.new_status,
            admin_response: Some(response_text.clone()),
            responded_by: Some(actor.user_id.clone()),
            priority: command.priority,
            assignee_id: new_assignee_id,
            follow_up_date: command.follow_up_date,
            version: current.version + 1,
            updated_at: now,
            responded_at: Some(now),
            ..current.clone()
        };

        // compare-and-swap on the version read above
        let update = sqlx::query(
            "UPDATE requests
             SET status = ?, admin_response = ?, responded_by = ?, priority = ?,
                 assignee_id = ?, follow_up_date = ?, version = ?, updated_at = ?,
                 responded_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(updated.status.as_str())
        .bind(&updated.admin_response)
        .bind(updated.responded_by.as_ref().map(|id| id.0.clone()))
        .bind(updated.priority.as_str())
        .bind(updated.assignee_id.as_ref().map(|id| id.0.clone()))
        .bind(updated.follow_up_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(updated.version)
        .bind(updated.updated_at.to_rfc3339())
        .bind(updated.responded_at.map(|dt| dt.to_rfc3339()))
        .bind(&updated.id.0)
        .bind(current.version)
        .execute(&mut *tx)
        .await
        .map_err(|e| persistence("request update", e))?;

        if update.rows_affected() == 0 {
            return Err(ApplicationError::Domain(DomainError::VersionConflict {
                id: updated.id.clone(),
            }));
        }

        if current.status != updated.status {
            let entry = StatusHistoryEntry::new(
                updated.id.clone(),
                current.status,
                updated.status,
                actor.user_id.clone(),
                status_change_note(updated.priority),
            );
            insert_status_history(&mut tx, &entry).await?;
        }

        if let (Some(user), true) = (&assignee, assignee_changed) {
            let entry = AssignmentEntry::new(
                updated.id.clone(),
                current.assignee_id.clone(),
                user.id.clone(),
                actor.user_id.clone(),
                "assigned via response",
            );
            insert_assignment(&mut tx, &entry).await?;
        }

        let comment = Comment {
            id: CommentId(Uuid::new_v4().to_string()),
            request_id: updated.id.clone(),
            author_id: actor.user_id.clone(),
            body: response_text,
            is_internal: command.is_internal,
            created_at: now,
        };
        insert_comment(&mut tx, &comment).await?;

        for intent in
            respond_intents(&updated, actor, assignee.as_ref(), assignee_changed, command.is_internal)
        {
            insert_intent(&mut tx, &intent).await?;
        }

        if let Some(date) = command.follow_up_date {
            let reminder = Reminder::new(
                updated.id.clone(),
                actor.user_id.clone(),
                date,
                format!("Follow up on \"{}\"", updated.subject),
            );
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
            .execute(&mut *tx)
            .await
            .map_err(|e| persistence("reminder insert", e))?;
        }

        tx.commit().await.map_err(|e| persistence("transaction commit", e))?;

        info!(
            event_name = "lifecycle.request_responded",
            request_id = %updated.id.0,
            actor = %actor.user_id.0,
            status = updated.status.as_str(),
            internal = command.is_internal,
            "request responded"
        );

        self.dispatcher.drain_outbox().await;

        Ok(updated)
    }

    /// Applies one action to a batch of requests, all-or-nothing: a single
    /// unknown id rolls back the entire batch and the error names the
    /// missing ids. Status changes and reassignments go through the same
    /// history primitives as single responses.
    pub async fn bulk_transition(
        &self,
        actor: &ActorContext,
        command: BulkTransitionCommand,
    ) -> Result<u64, ApplicationError> {
        let failures = validate_bulk(actor, &command);
        if !failures.is_empty() {
            return Err(validation(failures));
        }

        let mut tx =
            self.pool.begin().await.map_err(|e| persistence("transaction begin", e))?;

        let mut found = Vec::with_capacity(command.request_ids.len());
        let mut missing = Vec::new();
        for id in &command.request_ids {
            match fetch_request(&mut tx, id).await? {
                Some(request) => found.push(request),
                None => missing.push(id.0.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(validation(vec![ValidationFailure::RequestsNotFound { ids: missing }]));
        }

        let now = Utc::now();
        let mut updated = 0u64;

        for request in found {
            match command.action.target_status() {
                Some(target) => {
                    sqlx::query(
                        "UPDATE requests SET status = ?, version = version + 1, updated_at = ?
                         WHERE id = ?",
                    )
                    .bind(target.as_str())
                    .bind(now.to_rfc3339())
                    .bind(&request.id.0)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| persistence("bulk status update", e))?;

                    if request.status != target {
                        let entry = StatusHistoryEntry::new(
                            request.id.clone(),
                            request.status,
                            target,
                            actor.user_id.clone(),
                            format!("bulk action {}", command.action.as_str()),
                        );
                        insert_status_history(&mut tx, &entry).await?;
                    }
                }
                None => {
                    sqlx::query(
                        "UPDATE requests SET assignee_id = ?, version = version + 1, updated_at = ?
                         WHERE id = ?",
                    )
                    .bind(&actor.user_id.0)
                    .bind(now.to_rfc3339())
                    .bind(&request.id.0)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| persistence("bulk assign update", e))?;

                    if request.assignee_id.as_ref() != Some(&actor.user_id) {
                        let entry = AssignmentEntry::new(
                            request.id.clone(),
                            request.assignee_id.clone(),
                            actor.user_id.clone(),
                            actor.user_id.clone(),
                            format!("bulk action {}", command.action.as_str()),
                        );
                        insert_assignment(&mut tx, &entry).await?;
                    }
                }
            }
            updated += 1;
        }

        tx.commit().await.map_err(|e| persistence("transaction commit", e))?;

        info!(
            event_name = "lifecycle.bulk_transition",
            action = command.action.as_str(),
            count = updated,
            actor = %actor.user_id.0,
            "bulk transition applied"
        );

        Ok(updated)
    }

    /// Appends a thread comment. Employees may only comment on their own
    /// requests and may not write internal notes.
    pub async fn add_comment(
        &self,
        actor: &ActorContext,
        request_id: &RequestId,
        body: &str,
        is_internal: bool,
    ) -> Result<Comment, ApplicationError> {
        let mut failures = Vec::new();
        if body.trim().is_empty() {
            failures.push(ValidationFailure::EmptyCommentBody);
        }
        if is_internal && !actor.can_triage() {
            failures.push(ValidationFailure::InternalCommentNotAllowed);
        }
        if !failures.is_empty() {
            return Err(validation(failures));
        }

        let mut tx =
            self.pool.begin().await.map_err(|e| persistence("transaction begin", e))?;

        let Some(request) = fetch_request(&mut tx, request_id).await? else {
            return Err(ApplicationError::Domain(DomainError::NotFound {
                entity: "request",
                id: request_id.0.clone(),
            }));
        };

        // an employee never learns whether a foreign request id exists
        if !actor.can_triage() && request.employee_id != actor.user_id {
            return Err(ApplicationError::Domain(DomainError::NotFound {
                entity: "request",
                id: request_id.0.clone(),
            }));
        }

        let now = Utc::now();
        let comment = Comment {
            id: CommentId(Uuid::new_v4().to_string()),
            request_id: request.id.clone(),
            author_id: actor.user_id.clone(),
            body: body.trim().to_string(),
            is_internal,
            created_at: now,
        };
        insert_comment(&mut tx, &comment).await?;

        sqlx::query("UPDATE requests SET updated_at = ? WHERE id = ?")
            .bind(now.to_rfc3339())
            .bind(&request.id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| persistence("request touch", e))?;

        tx.commit().await.map_err(|e| persistence("transaction commit", e))?;

        Ok(comment)
    }

    /// Persists attachment metadata after validating the file name against
    /// the extension allow-list and the size ceiling. The bytes themselves
    /// live with the external blob store.
    pub async fn record_attachment(
        &self,
        actor: &ActorContext,
        request_id: &RequestId,
        file_name: &str,
        content_type: &str,
        size_bytes: i64,
        storage_path: &str,
    ) -> Result<Attachment, ApplicationError> {
        let failures = validate_attachment(&self.storage, file_name, size_bytes);
        if !failures.is_empty() {
            return Err(validation(failures));
        }

        let mut tx =
            self.pool.begin().await.map_err(|e| persistence("transaction begin", e))?;

        let Some(request) = fetch_request(&mut tx, request_id).await? else {
            return Err(ApplicationError::Domain(DomainError::NotFound {
                entity: "request",
                id: request_id.0.clone(),
            }));
        };

        if !actor.can_triage() && request.employee_id != actor.user_id {
            return Err(ApplicationError::Domain(DomainError::NotFound {
                entity: "request",
                id: request_id.0.clone(),
            }));
        }

        let attachment = Attachment {
            id: AttachmentId(Uuid::new_v4().to_string()),
            request_id: request.id.clone(),
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            size_bytes,
            storage_path: storage_path.to_string(),
            uploaded_by: actor.user_id.clone(),
            created_at: Utc::now(),
        };

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
        .execute(&mut *tx)
        .await
        .map_err(|e| persistence("attachment insert", e))?;

        tx.commit().await.map_err(|e| persistence("transaction commit", e))?;

        Ok(attachment)
    }
}
