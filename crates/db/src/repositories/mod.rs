use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use hrdesk_core::domain::attachment::Attachment;
use hrdesk_core::domain::comment::Comment;
use hrdesk_core::domain::history::{AssignmentEntry, StatusHistoryEntry};
use hrdesk_core::domain::reminder::Reminder;
use hrdesk_core::domain::request::{Request, RequestId};
use hrdesk_core::domain::user::{User, UserId};
use hrdesk_core::listing::{Page, RequestFilter};

pub mod attachment;
pub mod comment;
pub mod history;
pub mod memory;
pub mod reminder;
pub mod request;
pub mod user;

pub use attachment::SqlAttachmentRepository;
pub use comment::SqlCommentRepository;
pub use history::SqlHistoryRepository;
pub use memory::{InMemoryRequestRepository, InMemoryUserRepository};
pub use reminder::SqlReminderRepository;
pub use request::{RequestStats, SqlRequestRepository};
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn list_active_admins(&self) -> Result<Vec<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError>;
    async fn list(&self, filter: &RequestFilter) -> Result<Page<Request>, RepositoryError>;
    async fn stats(&self) -> Result<RequestStats, RepositoryError>;
    async fn save(&self, request: Request) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn status_history_for(
        &self,
        id: &RequestId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError>;

    async fn assignments_for(
        &self,
        id: &RequestId,
    ) -> Result<Vec<AssignmentEntry>, RepositoryError>;
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn append(&self, comment: Comment) -> Result<(), RepositoryError>;

    /// Internal comments are filtered out at query level when the viewer is
    /// the submitting employee.
    async fn list_for_request(
        &self,
        id: &RequestId,
        include_internal: bool,
    ) -> Result<Vec<Comment>, RepositoryError>;
}

#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    async fn save(&self, attachment: Attachment) -> Result<(), RepositoryError>;
    async fn list_for_request(&self, id: &RequestId) -> Result<Vec<Attachment>, RepositoryError>;
}

#[async_trait]
pub trait ReminderRepository: Send + Sync {
    async fn save(&self, reminder: Reminder) -> Result<(), RepositoryError>;
    async fn list_for_request(&self, id: &RequestId) -> Result<Vec<Reminder>, RepositoryError>;
    async fn list_due_on_or_before(&self, date: NaiveDate)
        -> Result<Vec<Reminder>, RepositoryError>;
}
