use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::request::{RequestId, RequestStatus};
use crate::domain::user::UserId;

/// Immutable audit record of a status change. Written exactly once per
/// update where the status actually moved; never mutated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: String,
    pub request_id: RequestId,
    pub old_status: RequestStatus,
    pub new_status: RequestStatus,
    pub changed_by: UserId,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn new(
        request_id: RequestId,
        old_status: RequestStatus,
        new_status: RequestStatus,
        changed_by: UserId,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id,
            old_status,
            new_status,
            changed_by,
            notes: notes.into(),
            created_at: Utc::now(),
        }
    }
}

/// Immutable audit record of a reassignment. Written only when the new
/// assignee differs from the previous one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentEntry {
    pub id: String,
    pub request_id: RequestId,
    pub previous_assignee_id: Option<UserId>,
    pub new_assignee_id: UserId,
    pub assigned_by: UserId,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl AssignmentEntry {
    pub fn new(
        request_id: RequestId,
        previous_assignee_id: Option<UserId>,
        new_assignee_id: UserId,
        assigned_by: UserId,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id,
            previous_assignee_id,
            new_assignee_id,
            assigned_by,
            notes: notes.into(),
            created_at: Utc::now(),
        }
    }
}
