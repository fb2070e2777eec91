use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::request::RequestId;
use crate::domain::user::UserId;

/// A follow-up marker created when an admin supplies a follow-up date on a
/// response. Owned by that admin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub request_id: RequestId,
    pub admin_id: UserId,
    pub remind_at: NaiveDate,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    pub fn new(
        request_id: RequestId,
        admin_id: UserId,
        remind_at: NaiveDate,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id,
            admin_id,
            remind_at,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}
