//! Pure lifecycle rules for employee requests: command shapes, input
//! validation, and the notification content derived from each operation.
//!
//! Everything here is side-effect free. The transactional application of a
//! command lives in `hrdesk-db`; this module decides *whether* a command is
//! acceptable and *what* derived records it implies.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::actor::ActorContext;
use crate::domain::notification::{NotificationIntent, NotificationKind};
use crate::domain::request::{Priority, Request, RequestId, RequestStatus};
use crate::domain::user::{User, UserId};

/// Response text bounds, inclusive, measured after trimming.
pub const RESPONSE_MIN_CHARS: usize = 10;
pub const RESPONSE_MAX_CHARS: usize = 2000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitCommand {
    pub subject: String,
    pub message: String,
    pub priority: Priority,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondCommand {
    pub request_id: RequestId,
    pub new_status: RequestStatus,
    pub response_text: String,
    pub priority: Priority,
    pub assignee_id: Option<UserId>,
    pub is_internal: bool,
    pub follow_up_date: Option<NaiveDate>,
    /// When set, the update fails with a conflict error if the stored
    /// version has moved past this value.
    pub expected_version: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    MarkPending,
    MarkInProgress,
    MarkCompleted,
    AssignToMe,
}

impl BulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarkPending => "mark_pending",
            Self::MarkInProgress => "mark_in_progress",
            Self::MarkCompleted => "mark_completed",
            Self::AssignToMe => "assign_to_me",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "mark_pending" => Some(Self::MarkPending),
            "mark_in_progress" => Some(Self::MarkInProgress),
            "mark_completed" => Some(Self::MarkCompleted),
            "assign_to_me" => Some(Self::AssignToMe),
            _ => None,
        }
    }

    /// The status a batch moves to, or `None` for assignment actions.
    pub fn target_status(&self) -> Option<RequestStatus> {
        match self {
            Self::MarkPending => Some(RequestStatus::Pending),
            Self::MarkInProgress => Some(RequestStatus::InProgress),
            Self::MarkCompleted => Some(RequestStatus::Completed),
            Self::AssignToMe => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkTransitionCommand {
    pub request_ids: Vec<RequestId>,
    pub action: BulkAction,
}

/// One user-correctable reason a command was refused. Collected into a
/// batch and reported together; nothing is written when any are present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationFailure {
    EmptySubject,
    EmptyMessage,
    ResponseLength { length: usize },
    InvalidStatus { value: String },
    InvalidPriority { value: String },
    InvalidRole { value: String },
    InvalidBulkAction { value: String },
    InvalidFollowUpDate { value: String },
    FollowUpNotFuture { date: NaiveDate },
    ActorCannotTriage { role: String },
    AssigneeNotFound { user_id: String },
    AssigneeNotEligible { user_id: String, role: String },
    RequestsNotFound { ids: Vec<String> },
    EmptyBatch,
    ExtensionNotAllowed { extension: String },
    AttachmentTooLarge { size_bytes: i64, max_bytes: i64 },
    EmptyCommentBody,
    InternalCommentNotAllowed,
}

impl ValidationFailure {
    pub fn reason(&self) -> String {
        match self {
            Self::EmptySubject => "subject must not be empty".to_string(),
            Self::EmptyMessage => "message must not be empty".to_string(),
            Self::ResponseLength { length } => {
                format!(
                    "response text must be between {RESPONSE_MIN_CHARS} and \
                     {RESPONSE_MAX_CHARS} characters (got {length})"
                )
            }
            Self::InvalidStatus { value } => {
                format!("unknown status `{value}` (expected pending|in_progress|completed|rejected|on_hold)")
            }
            Self::InvalidPriority { value } => {
                format!("unknown priority `{value}` (expected low|normal|high|urgent)")
            }
            Self::InvalidRole { value } => format!("unknown role `{value}`"),
            Self::InvalidBulkAction { value } => {
                format!("unknown bulk action `{value}` (expected mark_pending|mark_in_progress|mark_completed|assign_to_me)")
            }
            Self::InvalidFollowUpDate { value } => {
                format!("follow-up date `{value}` is not a valid date")
            }
            Self::FollowUpNotFuture { date } => {
                format!("follow-up date {date} must be in the future")
            }
            Self::ActorCannotTriage { role } => {
                format!("role `{role}` may not triage requests")
            }
            Self::AssigneeNotFound { user_id } => format!("assignee `{user_id}` does not exist"),
            Self::AssigneeNotEligible { user_id, role } => {
                format!("assignee `{user_id}` has role `{role}`; only admins and managers can be assigned")
            }
            Self::RequestsNotFound { ids } => {
                format!("request(s) not found: {}", ids.join(", "))
            }
            Self::EmptyBatch => "no request ids supplied".to_string(),
            Self::ExtensionNotAllowed { extension } => {
                format!("file extension `{extension}` is not allowed")
            }
            Self::AttachmentTooLarge { size_bytes, max_bytes } => {
                format!("attachment of {size_bytes} bytes exceeds the {max_bytes} byte limit")
            }
            Self::EmptyCommentBody => "comment body must not be empty".to_string(),
            Self::InternalCommentNotAllowed => {
                "only admins and managers may write internal notes".to_string()
            }
        }
    }
}

pub fn validate_submit(command: &SubmitCommand) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();
    if command.subject.trim().is_empty() {
        failures.push(ValidationFailure::EmptySubject);
    }
    if command.message.trim().is_empty() {
        failures.push(ValidationFailure::EmptyMessage);
    }
    failures
}

/// Field-level checks that need no repository access. Assignee existence
/// and role eligibility are verified against the directory by the caller
/// before the transaction starts.
pub fn validate_respond(
    actor: &ActorContext,
    command: &RespondCommand,
    now: DateTime<Utc>,
) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();

    if !actor.can_triage() {
        failures.push(ValidationFailure::ActorCannotTriage { role: actor.role.as_str().to_string() });
    }

    let length = command.response_text.trim().chars().count();
    if !(RESPONSE_MIN_CHARS..=RESPONSE_MAX_CHARS).contains(&length) {
        failures.push(ValidationFailure::ResponseLength { length });
    }

    if let Some(date) = command.follow_up_date {
        if date <= now.date_naive() {
            failures.push(ValidationFailure::FollowUpNotFuture { date });
        }
    }

    failures
}

pub fn validate_bulk(actor: &ActorContext, command: &BulkTransitionCommand) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();
    if !actor.can_triage() {
        failures.push(ValidationFailure::ActorCannotTriage { role: actor.role.as_str().to_string() });
    }
    if command.request_ids.is_empty() {
        failures.push(ValidationFailure::EmptyBatch);
    }
    failures
}

/// Checks attachment metadata against the configured allow-list and size
/// ceiling. Runs before any blob-store call; only metadata is inspected.
pub fn validate_attachment(
    storage: &crate::config::StorageConfig,
    file_name: &str,
    size_bytes: i64,
) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();

    let extension = file_name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if storage.allowed_extensions.iter().any(|allowed| allowed == &ext) => {}
        Some(ext) => failures.push(ValidationFailure::ExtensionNotAllowed { extension: ext }),
        None => failures.push(ValidationFailure::ExtensionNotAllowed {
            extension: String::new(),
        }),
    }

    if size_bytes > storage.max_attachment_bytes {
        failures.push(ValidationFailure::AttachmentTooLarge {
            size_bytes,
            max_bytes: storage.max_attachment_bytes,
        });
    }

    failures
}

/// Note attached to a status-history entry, embedding the priority chosen
/// alongside the transition.
pub fn status_change_note(priority: Priority) -> String {
    format!("priority {}", priority.as_str())
}

/// Intents raised by a successful submission: one `new_request` per admin,
/// plus a `request_submitted` receipt for the submitter.
pub fn submit_intents(request: &Request, admins: &[User]) -> Vec<NotificationIntent> {
    let mut intents: Vec<NotificationIntent> = admins
        .iter()
        .map(|admin| {
            NotificationIntent::new(
                admin.id.clone(),
                NotificationKind::NewRequest,
                "New employee request",
                format!("{} ({} priority)", request.subject, request.priority.as_str()),
                Some(request.id.0.clone()),
            )
        })
        .collect();

    intents.push(NotificationIntent::new(
        request.employee_id.clone(),
        NotificationKind::RequestSubmitted,
        "Request submitted",
        format!("Your request \"{}\" has been received.", request.subject),
        Some(request.id.0.clone()),
    ));

    intents
}

/// Intents raised by an admin response. Internal notes stay invisible to
/// the submitter; a changed assignee is told separately unless they are the
/// responding admin themselves.
pub fn respond_intents(
    request: &Request,
    actor: &ActorContext,
    assignee: Option<&User>,
    assignee_changed: bool,
    is_internal: bool,
) -> Vec<NotificationIntent> {
    let mut intents = Vec::new();

    if !is_internal {
        let mut message =
            format!("Your request \"{}\" is now {}.", request.subject, request.status.label());
        if let (Some(user), true) = (assignee, assignee_changed) {
            message.push_str(&format!(" Handled by {}.", user.display_name));
        }
        intents.push(NotificationIntent::new(
            request.employee_id.clone(),
            NotificationKind::RequestResponded,
            format!("Request {}", request.status.label()),
            message,
            Some(request.id.0.clone()),
        ));
    }

    if let (Some(user), true) = (assignee, assignee_changed) {
        if user.id != actor.user_id {
            intents.push(NotificationIntent::new(
                user.id.clone(),
                NotificationKind::RequestAssigned,
                "Request assigned to you",
                format!("\"{}\" ({} priority)", request.subject, request.priority.as_str()),
                Some(request.id.0.clone()),
            ));
        }
    }

    intents
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::actor::ActorContext;
    use crate::domain::notification::NotificationKind;
    use crate::domain::request::{Priority, Request, RequestId, RequestStatus};
    use crate::domain::user::{Role, User, UserId};

    use super::{
        respond_intents, submit_intents, validate_bulk, validate_respond, validate_submit,
        BulkAction, BulkTransitionCommand, RespondCommand, SubmitCommand, ValidationFailure,
        RESPONSE_MAX_CHARS,
    };

    fn admin_actor() -> ActorContext {
        ActorContext::new(UserId("admin-1".to_string()), Role::Admin)
    }

    fn respond_command(text: &str) -> RespondCommand {
        RespondCommand {
            request_id: RequestId("req-1".to_string()),
            new_status: RequestStatus::Completed,
            response_text: text.to_string(),
            priority: Priority::Normal,
            assignee_id: None,
            is_internal: false,
            follow_up_date: None,
            expected_version: None,
        }
    }

    fn request_fixture(status: RequestStatus) -> Request {
        let now = Utc::now();
        Request {
            id: RequestId("req-1".to_string()),
            employee_id: UserId("emp-1".to_string()),
            subject: "Leave request".to_string(),
            message: "Two weeks in September".to_string(),
            priority: Priority::High,
            status,
            admin_response: None,
            responded_by: None,
            assignee_id: None,
            follow_up_date: None,
            version: 1,
            created_at: now,
            updated_at: now,
            responded_at: None,
        }
    }

    fn user_fixture(id: &str, role: Role) -> User {
        User {
            id: UserId(id.to_string()),
            display_name: format!("User {id}"),
            email: format!("{id}@example.test"),
            role,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn attachments_validate_extension_and_size() {
        let storage = crate::config::StorageConfig {
            root: std::path::PathBuf::from("attachments"),
            max_attachment_bytes: 5 * 1024 * 1024,
            allowed_extensions: vec!["pdf".to_string(), "png".to_string()],
        };

        assert!(super::validate_attachment(&storage, "payslip.pdf", 1024).is_empty());
        assert!(super::validate_attachment(&storage, "payslip.PDF", 1024).is_empty());

        let bad_ext = super::validate_attachment(&storage, "script.exe", 1024);
        assert!(matches!(
            bad_ext.as_slice(),
            [ValidationFailure::ExtensionNotAllowed { .. }]
        ));

        let oversize = super::validate_attachment(&storage, "scan.png", 6 * 1024 * 1024);
        assert!(matches!(
            oversize.as_slice(),
            [ValidationFailure::AttachmentTooLarge { .. }]
        ));
    }

    #[test]
    fn submit_rejects_blank_subject_and_message() {
        let failures = validate_submit(&SubmitCommand {
            subject: "   ".to_string(),
            message: String::new(),
            priority: Priority::Normal,
        });
        assert!(failures.contains(&ValidationFailure::EmptySubject));
        assert!(failures.contains(&ValidationFailure::EmptyMessage));
    }

    #[test]
    fn respond_rejects_short_and_long_text() {
        let actor = admin_actor();
        let now = Utc::now();

        let short = validate_respond(&actor, &respond_command("too short"), now);
        assert!(matches!(short.as_slice(), [ValidationFailure::ResponseLength { length: 9 }]));

        let long = validate_respond(&actor, &respond_command(&"x".repeat(RESPONSE_MAX_CHARS + 1)), now);
        assert!(matches!(long.as_slice(), [ValidationFailure::ResponseLength { .. }]));

        let ok = validate_respond(&actor, &respond_command("Approved, enjoy your time off."), now);
        assert!(ok.is_empty());
    }

    #[test]
    fn respond_rejects_past_follow_up_date() {
        let actor = admin_actor();
        let now = Utc::now();
        let mut command = respond_command("Approved, enjoy your time off.");
        command.follow_up_date = Some(now.date_naive());

        let failures = validate_respond(&actor, &command, now);
        assert!(matches!(failures.as_slice(), [ValidationFailure::FollowUpNotFuture { .. }]));

        command.follow_up_date = Some((now + Duration::days(3)).date_naive());
        assert!(validate_respond(&actor, &command, now).is_empty());
    }

    #[test]
    fn respond_rejects_employee_actors() {
        let actor = ActorContext::new(UserId("emp-1".to_string()), Role::Employee);
        let failures =
            validate_respond(&actor, &respond_command("Approved, enjoy your time off."), Utc::now());
        assert!(failures.contains(&ValidationFailure::ActorCannotTriage {
            role: "employee".to_string()
        }));
    }

    #[test]
    fn bulk_rejects_empty_batches() {
        let failures = validate_bulk(
            &admin_actor(),
            &BulkTransitionCommand { request_ids: Vec::new(), action: BulkAction::MarkCompleted },
        );
        assert_eq!(failures, vec![ValidationFailure::EmptyBatch]);
    }

    #[test]
    fn bulk_action_maps_to_target_status() {
        assert_eq!(BulkAction::MarkCompleted.target_status(), Some(RequestStatus::Completed));
        assert_eq!(BulkAction::AssignToMe.target_status(), None);
        assert_eq!(BulkAction::parse("mark_in_progress"), Some(BulkAction::MarkInProgress));
        assert_eq!(BulkAction::parse("delete_all"), None);
    }

    #[test]
    fn submit_intents_fan_out_to_admins_and_receipt_to_submitter() {
        let request = request_fixture(RequestStatus::Pending);
        let admins = vec![user_fixture("admin-1", Role::Admin), user_fixture("admin-2", Role::Admin)];

        let intents = submit_intents(&request, &admins);

        assert_eq!(intents.len(), 3);
        assert!(intents
            .iter()
            .filter(|intent| intent.kind == NotificationKind::NewRequest)
            .all(|intent| intent.related_id.as_deref() == Some("req-1")));
        let receipt = intents.last().expect("submitter receipt");
        assert_eq!(receipt.kind, NotificationKind::RequestSubmitted);
        assert_eq!(receipt.recipient_id, request.employee_id);
    }

    #[test]
    fn respond_intents_title_reflects_new_status() {
        let mut request = request_fixture(RequestStatus::Completed);
        request.status = RequestStatus::Completed;

        let intents = respond_intents(&request, &admin_actor(), None, false, false);

        assert_eq!(intents.len(), 1);
        assert!(intents[0].title.contains("Completed"));
        assert_eq!(intents[0].recipient_id, request.employee_id);
    }

    #[test]
    fn internal_responses_notify_nobody_but_new_assignee() {
        let request = request_fixture(RequestStatus::InProgress);
        let assignee = user_fixture("mgr-1", Role::Manager);

        let intents = respond_intents(&request, &admin_actor(), Some(&assignee), true, true);

        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].kind, NotificationKind::RequestAssigned);
        assert_eq!(intents[0].recipient_id, assignee.id);
    }

    #[test]
    fn self_assignment_produces_no_assigned_intent() {
        let request = request_fixture(RequestStatus::InProgress);
        let actor = admin_actor();
        let self_assignee = user_fixture("admin-1", Role::Admin);

        let intents = respond_intents(&request, &actor, Some(&self_assignee), true, false);

        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].kind, NotificationKind::RequestResponded);
        assert!(intents[0].message.contains("Handled by"));
    }
}
