use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommentId(pub String);

/// A message on a request's conversation thread. Internal comments are
/// invisible to the submitting employee; the filter is applied at query
/// level, not by a permission system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub request_id: RequestId,
    pub author_id: UserId,
    pub body: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}
