pub mod actor;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod listing;

pub use actor::ActorContext;
pub use domain::attachment::{Attachment, AttachmentId};
pub use domain::comment::{Comment, CommentId};
pub use domain::history::{AssignmentEntry, StatusHistoryEntry};
pub use domain::notification::{
    Notification, NotificationId, NotificationIntent, NotificationKind,
};
pub use domain::reminder::Reminder;
pub use domain::request::{Priority, Request, RequestId, RequestStatus};
pub use domain::user::{Role, User, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use lifecycle::{
    BulkAction, BulkTransitionCommand, RespondCommand, SubmitCommand, ValidationFailure,
};
pub use listing::{Page, RequestFilter, RequestSortKey, SortDirection};
