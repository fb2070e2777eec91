use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewRequest,
    RequestSubmitted,
    RequestResponded,
    RequestAssigned,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewRequest => "new_request",
            Self::RequestSubmitted => "request_submitted",
            Self::RequestResponded => "request_responded",
            Self::RequestAssigned => "request_assigned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "new_request" => Some(Self::NewRequest),
            "request_submitted" => Some(Self::RequestSubmitted),
            "request_responded" => Some(Self::RequestResponded),
            "request_assigned" => Some(Self::RequestAssigned),
            _ => None,
        }
    }
}

/// A per-recipient inbox row. Owned by the recipient independently of the
/// related request; only the read flag is ever mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A dispatch intent. Intents are written inside the lifecycle transaction
/// and turned into notification rows after commit, so delivery failures
/// cannot be mistaken for transaction failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: Option<String>,
}

impl NotificationIntent {
    pub fn new(
        recipient_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        related_id: Option<String>,
    ) -> Self {
        Self { recipient_id, kind, title: title.into(), message: message.into(), related_id }
    }
}
