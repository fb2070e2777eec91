//! JSON API consumed by the portal frontend.
//!
//! Endpoints:
//! - `POST /api/requests`                    — submit a request
//! - `GET  /api/requests`                    — list with filters (role-scoped)
//! - `GET  /api/requests/stats`              — dashboard aggregates
//! - `GET  /api/requests/{id}`               — detail with thread + audit trail
//! - `PUT  /api/requests/{id}/respond`       — admin response
//! - `POST /api/requests/bulk`               — bulk action over request ids
//! - `POST /api/requests/{id}/comments`      — append a thread comment
//! - `GET  /api/requests/{id}/comments`      — list thread comments
//! - `POST /api/requests/{id}/attachments`   — register attachment metadata
//! - `GET  /api/reminders/due`               — follow-ups due today or earlier
//! - `GET  /api/notifications`               — caller's inbox (`?unread=true`)
//! - `PUT  /api/notifications/{id}/read`     — mark one read
//! - `PUT  /api/notifications/read-all`      — mark all read
//!
//! The caller's identity arrives in `x-user-id` / `x-user-role` headers set
//! by the fronting identity provider; it is trusted here, not authenticated.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use hrdesk_core::actor::ActorContext;
use hrdesk_core::config::StorageConfig;
use hrdesk_core::domain::comment::Comment;
use hrdesk_core::domain::history::{AssignmentEntry, StatusHistoryEntry};
use hrdesk_core::domain::notification::{Notification, NotificationId};
use hrdesk_core::domain::reminder::Reminder;
use hrdesk_core::domain::request::{Priority, Request, RequestId, RequestStatus};
use hrdesk_core::domain::user::{Role, UserId};
use hrdesk_core::errors::{ApplicationError, DomainError, InterfaceError};
use hrdesk_core::lifecycle::{
    BulkAction, BulkTransitionCommand, RespondCommand, SubmitCommand, ValidationFailure,
};
use hrdesk_core::listing::{RequestFilter, RequestSortKey, SortDirection};
use hrdesk_db::repositories::{
    AttachmentRepository, CommentRepository, HistoryRepository, ReminderRepository,
    RequestRepository, SqlAttachmentRepository, SqlCommentRepository, SqlHistoryRepository,
    SqlReminderRepository, SqlRequestRepository,
};
use hrdesk_db::{DbPool, RequestLifecycle};

#[derive(Clone)]
pub struct ApiState {
    db_pool: DbPool,
    lifecycle: Arc<RequestLifecycle>,
}

pub fn router(db_pool: DbPool, storage: StorageConfig) -> Router {
    let lifecycle = Arc::new(RequestLifecycle::new(db_pool.clone(), storage));
    Router::new()
        .route("/api/requests", get(list_requests).post(submit_request))
        .route("/api/requests/stats", get(request_stats))
        .route("/api/requests/bulk", post(bulk_action))
        .route("/api/requests/{id}", get(request_detail))
        .route("/api/requests/{id}/respond", put(respond_request))
        .route("/api/requests/{id}/comments", get(list_comments).post(add_comment))
        .route("/api/requests/{id}/attachments", post(register_attachment))
        .route("/api/reminders/due", get(due_reminders))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/read-all", put(mark_all_notifications_read))
        .route("/api/notifications/{id}/read", put(mark_notification_read))
        .with_state(ApiState { db_pool, lifecycle })
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub subject: String,
    pub message: String,
    pub priority: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RespondBody {
    pub status: String,
    pub response_text: String,
    pub priority: String,
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub is_internal: bool,
    pub follow_up_date: Option<String>,
    pub expected_version: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BulkBody {
    pub request_ids: Vec<String>,
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub body: String,
    #[serde(default)]
    pub is_internal: bool,
}

#[derive(Debug, Deserialize)]
pub struct AttachmentBody {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assignee_id: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct NotificationQuery {
    pub unread: Option<bool>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub items: Vec<Request>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct DetailResponse {
    pub request: Request,
    pub comments: Vec<Comment>,
    pub status_history: Vec<StatusHistoryEntry>,
    pub assignments: Vec<AssignmentEntry>,
    pub attachments: Vec<hrdesk_core::domain::attachment::Attachment>,
    /// Follow-up markers; only populated for triage viewers.
    pub reminders: Vec<Reminder>,
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: bool,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub items: Vec<Notification>,
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    pub correlation_id: String,
}

type ApiFailure = (StatusCode, Json<ApiError>);

// ---------------------------------------------------------------------------
// Identity and error mapping
// ---------------------------------------------------------------------------

fn actor_from_headers(headers: &HeaderMap) -> Result<ActorContext, ApiFailure> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let role = headers
        .get("x-user-role")
        .and_then(|value| value.to_str().ok())
        .and_then(Role::parse);

    match (user_id, role) {
        (Some(user_id), Some(role)) => {
            Ok(ActorContext::new(UserId(user_id.to_string()), role))
        }
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiError {
                error: "missing or invalid identity headers".to_string(),
                errors: None,
                correlation_id: Uuid::new_v4().to_string(),
            }),
        )),
    }
}

fn application_failure(err: ApplicationError) -> ApiFailure {
    let correlation_id = Uuid::new_v4().to_string();

    // validation failures keep their per-field reasons; everything else is
    // logged in full and reported generically
    if let ApplicationError::Domain(DomainError::Validation { failures }) = &err {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                error: "validation failed".to_string(),
                errors: Some(failures.iter().map(ValidationFailure::reason).collect()),
                correlation_id,
            }),
        );
    }

    error!(
        event_name = "api.request_failed",
        correlation_id = %correlation_id,
        error = %err,
        "request failed"
    );

    let interface = err.into_interface(correlation_id.clone());
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ApiError {
            error: interface.user_message().to_string(),
            errors: None,
            correlation_id,
        }),
    )
}

fn repository_failure(err: impl std::fmt::Display) -> ApiFailure {
    application_failure(ApplicationError::Persistence(err.to_string()))
}

fn validation_failure(failures: Vec<ValidationFailure>) -> ApiFailure {
    application_failure(ApplicationError::Domain(DomainError::validation(failures)))
}

fn forbidden() -> ApiFailure {
    (
        StatusCode::FORBIDDEN,
        Json(ApiError {
            error: "this view requires an admin or manager role".to_string(),
            errors: None,
            correlation_id: Uuid::new_v4().to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Input decoding
// ---------------------------------------------------------------------------

fn decode_priority(value: Option<&str>, failures: &mut Vec<ValidationFailure>) -> Priority {
    match value {
        None => Priority::default(),
        Some(raw) => match Priority::parse(raw) {
            Some(priority) => priority,
            None => {
                failures.push(ValidationFailure::InvalidPriority { value: raw.to_string() });
                Priority::default()
            }
        },
    }
}

fn decode_status(raw: &str, failures: &mut Vec<ValidationFailure>) -> RequestStatus {
    match RequestStatus::parse(raw) {
        Some(status) => status,
        None => {
            failures.push(ValidationFailure::InvalidStatus { value: raw.to_string() });
            RequestStatus::Pending
        }
    }
}

fn decode_follow_up(
    raw: Option<&str>,
    failures: &mut Vec<ValidationFailure>,
) -> Option<NaiveDate> {
    let raw = raw.map(str::trim).filter(|value| !value.is_empty())?;
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            failures.push(ValidationFailure::InvalidFollowUpDate { value: raw.to_string() });
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn submit_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<Request>), ApiFailure> {
    let actor = actor_from_headers(&headers)?;

    let mut failures = Vec::new();
    let priority = decode_priority(body.priority.as_deref(), &mut failures);
    if !failures.is_empty() {
        return Err(validation_failure(failures));
    }

    let request = state
        .lifecycle
        .submit(&actor, SubmitCommand { subject: body.subject, message: body.message, priority })
        .await
        .map_err(application_failure)?;

    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_requests(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiFailure> {
    let actor = actor_from_headers(&headers)?;

    let mut failures = Vec::new();
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(decode_status(raw, &mut failures)),
    };
    let priority = match query.priority.as_deref() {
        None => None,
        Some(raw) => Some(decode_priority(Some(raw), &mut failures)),
    };
    let sort = match query.sort.as_deref() {
        None => RequestSortKey::default(),
        Some(raw) => RequestSortKey::parse(raw).unwrap_or_default(),
    };
    let direction = match query.direction.as_deref() {
        None => SortDirection::default(),
        Some(raw) => SortDirection::parse(raw).unwrap_or_default(),
    };
    if !failures.is_empty() {
        return Err(validation_failure(failures));
    }

    // employees only ever see their own requests
    let employee_id = if actor.can_triage() { None } else { Some(actor.user_id.clone()) };

    let filter = RequestFilter {
        status,
        priority,
        assignee_id: query.assignee_id.map(UserId),
        employee_id,
        search: query.search,
        sort,
        direction,
        limit: query.limit.unwrap_or(hrdesk_core::listing::DEFAULT_PAGE_SIZE),
        offset: query.offset.unwrap_or(0),
    };

    let page = SqlRequestRepository::new(state.db_pool.clone())
        .list(&filter)
        .await
        .map_err(repository_failure)?;

    Ok(Json(ListResponse { items: page.items, total: page.total }))
}

pub async fn request_detail(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DetailResponse>, ApiFailure> {
    let actor = actor_from_headers(&headers)?;
    let request_id = RequestId(id);

    let requests = SqlRequestRepository::new(state.db_pool.clone());
    let request = requests
        .find_by_id(&request_id)
        .await
        .map_err(repository_failure)?
        .ok_or_else(|| not_found(&request_id))?;

    // employees cannot read foreign requests; the id does not leak
    if !actor.can_triage() && request.employee_id != actor.user_id {
        return Err(not_found(&request_id));
    }

    let comments = SqlCommentRepository::new(state.db_pool.clone())
        .list_for_request(&request_id, actor.can_triage())
        .await
        .map_err(repository_failure)?;

    let history = SqlHistoryRepository::new(state.db_pool.clone());
    let status_history =
        history.status_history_for(&request_id).await.map_err(repository_failure)?;
    let assignments = history.assignments_for(&request_id).await.map_err(repository_failure)?;

    let attachments = SqlAttachmentRepository::new(state.db_pool.clone())
        .list_for_request(&request_id)
        .await
        .map_err(repository_failure)?;

    let reminders = if actor.can_triage() {
        SqlReminderRepository::new(state.db_pool.clone())
            .list_for_request(&request_id)
            .await
            .map_err(repository_failure)?
    } else {
        Vec::new()
    };

    Ok(Json(DetailResponse {
        request,
        comments,
        status_history,
        assignments,
        attachments,
        reminders,
    }))
}

fn not_found(id: &RequestId) -> ApiFailure {
    application_failure(ApplicationError::Domain(DomainError::NotFound {
        entity: "request",
        id: id.0.clone(),
    }))
}

pub async fn respond_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RespondBody>,
) -> Result<Json<Request>, ApiFailure> {
    let actor = actor_from_headers(&headers)?;

    let mut failures = Vec::new();
    let new_status = decode_status(&body.status, &mut failures);
    let priority = decode_priority(Some(&body.priority), &mut failures);
    let follow_up_date = decode_follow_up(body.follow_up_date.as_deref(), &mut failures);
    if !failures.is_empty() {
        return Err(validation_failure(failures));
    }

    let command = RespondCommand {
        request_id: RequestId(id),
        new_status,
        response_text: body.response_text,
        priority,
        assignee_id: body.assignee_id.map(UserId),
        is_internal: body.is_internal,
        follow_up_date,
        expected_version: body.expected_version,
    };

    let updated =
        state.lifecycle.respond(&actor, command).await.map_err(application_failure)?;

    Ok(Json(updated))
}

pub async fn bulk_action(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<BulkBody>,
) -> Result<Json<BulkResponse>, ApiFailure> {
    let actor = actor_from_headers(&headers)?;

    let Some(action) = BulkAction::parse(&body.action) else {
        return Err(validation_failure(vec![ValidationFailure::InvalidBulkAction {
            value: body.action,
        }]));
    };

    let command = BulkTransitionCommand {
        request_ids: body.request_ids.into_iter().map(RequestId).collect(),
        action,
    };

    let updated =
        state.lifecycle.bulk_transition(&actor, command).await.map_err(application_failure)?;

    Ok(Json(BulkResponse { updated }))
}

pub async fn add_comment(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<CommentBody>,
) -> Result<(StatusCode, Json<Comment>), ApiFailure> {
    let actor = actor_from_headers(&headers)?;
    let request_id = RequestId(id);

    let comment = state
        .lifecycle
        .add_comment(&actor, &request_id, &body.body, body.is_internal)
        .await
        .map_err(application_failure)?;

    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn list_comments(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<Comment>>, ApiFailure> {
    let actor = actor_from_headers(&headers)?;
    let request_id = RequestId(id);

    let requests = SqlRequestRepository::new(state.db_pool.clone());
    let request = requests
        .find_by_id(&request_id)
        .await
        .map_err(repository_failure)?
        .ok_or_else(|| not_found(&request_id))?;

    if !actor.can_triage() && request.employee_id != actor.user_id {
        return Err(not_found(&request_id));
    }

    let comments = SqlCommentRepository::new(state.db_pool.clone())
        .list_for_request(&request_id, actor.can_triage())
        .await
        .map_err(repository_failure)?;

    Ok(Json(comments))
}

pub async fn register_attachment(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AttachmentBody>,
) -> Result<(StatusCode, Json<hrdesk_core::domain::attachment::Attachment>), ApiFailure> {
    let actor = actor_from_headers(&headers)?;

    let attachment = state
        .lifecycle
        .record_attachment(
            &actor,
            &RequestId(id),
            &body.file_name,
            &body.content_type,
            body.size_bytes,
            &body.storage_path,
        )
        .await
        .map_err(application_failure)?;

    Ok((StatusCode::CREATED, Json(attachment)))
}

pub async fn due_reminders(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Reminder>>, ApiFailure> {
    let actor = actor_from_headers(&headers)?;
    if !actor.can_triage() {
        return Err(forbidden());
    }

    let due = SqlReminderRepository::new(state.db_pool.clone())
        .list_due_on_or_before(chrono::Utc::now().date_naive())
        .await
        .map_err(repository_failure)?;

    Ok(Json(due))
}

pub async fn request_stats(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<hrdesk_db::repositories::RequestStats>, ApiFailure> {
    let actor = actor_from_headers(&headers)?;
    if !actor.can_triage() {
        return Err(forbidden());
    }

    let stats = SqlRequestRepository::new(state.db_pool.clone())
        .stats()
        .await
        .map_err(repository_failure)?;

    Ok(Json(stats))
}

pub async fn list_notifications(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<NotificationsResponse>, ApiFailure> {
    let actor = actor_from_headers(&headers)?;
    let dispatcher = state.lifecycle.dispatcher();

    let items = dispatcher
        .list_for_user(
            &actor.user_id,
            query.unread.unwrap_or(false),
            query.limit.unwrap_or(50).clamp(1, 200),
        )
        .await
        .map_err(repository_failure)?;
    let unread = dispatcher.unread_count(&actor.user_id).await.map_err(repository_failure)?;

    Ok(Json(NotificationsResponse { items, unread }))
}

pub async fn mark_notification_read(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<MarkReadResponse>, ApiFailure> {
    let actor = actor_from_headers(&headers)?;

    let updated = state
        .lifecycle
        .dispatcher()
        .mark_read(&NotificationId(id), &actor.user_id)
        .await
        .map_err(repository_failure)?;

    Ok(Json(MarkReadResponse { updated }))
}

pub async fn mark_all_notifications_read(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<MarkAllReadResponse>, ApiFailure> {
    let actor = actor_from_headers(&headers)?;

    let updated = state
        .lifecycle
        .dispatcher()
        .mark_all_read(&actor.user_id)
        .await
        .map_err(repository_failure)?;

    Ok(Json(MarkAllReadResponse { updated }))
}
