//! End-to-end contract for the request lifecycle: submit, respond, bulk
//! actions, and the derived audit/notification records, driven through the
//! public service API against a migrated in-memory database.

use chrono::{Duration, Utc};

use hrdesk_core::actor::ActorContext;
use hrdesk_core::config::StorageConfig;
use hrdesk_core::domain::request::{Priority, RequestStatus};
use hrdesk_core::domain::user::{Role, User, UserId};
use hrdesk_core::lifecycle::{RespondCommand, SubmitCommand};
use hrdesk_core::listing::RequestFilter;
use hrdesk_db::repositories::{
    CommentRepository, HistoryRepository, RequestRepository, SqlCommentRepository,
    SqlHistoryRepository, SqlRequestRepository, SqlUserRepository, UserRepository,
};
use hrdesk_db::{connect_with_settings, migrations, RequestLifecycle};

fn storage() -> StorageConfig {
    StorageConfig {
        root: std::path::PathBuf::from("attachments"),
        max_attachment_bytes: 5 * 1024 * 1024,
        allowed_extensions: vec!["pdf".to_string()],
    }
}

async fn setup() -> (sqlx::SqlitePool, RequestLifecycle) {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");

    let users = SqlUserRepository::new(pool.clone());
    for (id, name, role) in [
        ("emp-1", "Eve Lindqvist", Role::Employee),
        ("admin-1", "Ada Reyes", Role::Admin),
        ("mgr-1", "Miles Okafor", Role::Manager),
    ] {
        users
            .save(User {
                id: UserId(id.to_string()),
                display_name: name.to_string(),
                email: format!("{id}@example.test"),
                role,
                active: true,
                created_at: Utc::now(),
            })
            .await
            .expect("seed user");
    }

    let lifecycle = RequestLifecycle::new(pool.clone(), storage());
    (pool, lifecycle)
}

#[tokio::test]
async fn full_response_scenario_produces_every_derived_record() {
    let (pool, lifecycle) = setup().await;
    let employee = ActorContext::new(UserId("emp-1".to_string()), Role::Employee);
    let admin = ActorContext::new(UserId("admin-1".to_string()), Role::Admin);

    let request = lifecycle
        .submit(
            &employee,
            SubmitCommand {
                subject: "Leave request".to_string(),
                message: "Two weeks in September, covering the release freeze.".to_string(),
                priority: Priority::High,
            },
        )
        .await
        .expect("submit");

    // round-trip through the repository before any response
    let requests = SqlRequestRepository::new(pool.clone());
    let fetched = requests.find_by_id(&request.id).await.expect("find").expect("exists");
    assert_eq!(fetched.status, RequestStatus::Pending);
    assert_eq!(fetched.priority, Priority::High);
    assert_eq!(fetched.admin_response, None);

    let follow_up = (Utc::now() + Duration::days(14)).date_naive();
    let updated = lifecycle
        .respond(
            &admin,
            RespondCommand {
                request_id: request.id.clone(),
                new_status: RequestStatus::Completed,
                response_text: "Approved, enjoy your time off.".to_string(),
                priority: Priority::Normal,
                assignee_id: Some(UserId("mgr-1".to_string())),
                is_internal: false,
                follow_up_date: Some(follow_up),
                expected_version: Some(fetched.version),
            },
        )
        .await
        .expect("respond");

    assert_eq!(updated.status, RequestStatus::Completed);
    assert_eq!(updated.priority, Priority::Normal);
    assert_eq!(updated.responded_by.as_ref().map(|id| id.0.as_str()), Some("admin-1"));
    assert!(updated.responded_at.is_some());

    let history = SqlHistoryRepository::new(pool.clone());
    let transitions = history.status_history_for(&request.id).await.expect("history");
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].old_status, RequestStatus::Pending);
    assert_eq!(transitions[0].new_status, RequestStatus::Completed);
    assert!(transitions[0].notes.contains("normal"));

    let assignments = history.assignments_for(&request.id).await.expect("assignments");
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].new_assignee_id.0, "mgr-1");
    assert_eq!(assignments[0].previous_assignee_id, None);

    let comments = SqlCommentRepository::new(pool.clone());
    let thread = comments.list_for_request(&request.id, true).await.expect("comments");
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].body, "Approved, enjoy your time off.");
    assert!(!thread[0].is_internal);

    let submitter_title: String = sqlx::query_scalar(
        "SELECT title FROM notifications
         WHERE recipient_id = 'emp-1' AND kind = 'request_responded'",
    )
    .fetch_one(&pool)
    .await
    .expect("submitter notification");
    assert!(submitter_title.contains("Completed"));

    let submitter_message: String = sqlx::query_scalar(
        "SELECT message FROM notifications
         WHERE recipient_id = 'emp-1' AND kind = 'request_responded'",
    )
    .fetch_one(&pool)
    .await
    .expect("submitter notification message");
    assert!(submitter_message.contains("Miles Okafor"));

    let reminder_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM reminders WHERE admin_id = 'admin-1'")
            .fetch_one(&pool)
            .await
            .expect("reminder count");
    assert_eq!(reminder_count, 1);

    let undispatched: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notification_outbox WHERE dispatched_at IS NULL",
    )
    .fetch_one(&pool)
    .await
    .expect("outbox");
    assert_eq!(undispatched, 0, "outbox should be drained after commit");
}

#[tokio::test]
async fn employee_view_filters_internal_comments() {
    let (pool, lifecycle) = setup().await;
    let employee = ActorContext::new(UserId("emp-1".to_string()), Role::Employee);
    let admin = ActorContext::new(UserId("admin-1".to_string()), Role::Admin);

    let request = lifecycle
        .submit(
            &employee,
            SubmitCommand {
                subject: "Payroll discrepancy".to_string(),
                message: "My January payslip is short.".to_string(),
                priority: Priority::Urgent,
            },
        )
        .await
        .expect("submit");

    lifecycle
        .respond(
            &admin,
            RespondCommand {
                request_id: request.id.clone(),
                new_status: RequestStatus::InProgress,
                response_text: "Looking into this with payroll.".to_string(),
                priority: Priority::Urgent,
                assignee_id: None,
                is_internal: true,
                follow_up_date: None,
                expected_version: None,
            },
        )
        .await
        .expect("internal response");

    lifecycle
        .add_comment(&admin, &request.id, "Payroll confirms a correction is due.", false)
        .await
        .expect("public comment");

    let comments = SqlCommentRepository::new(pool.clone());
    let admin_view = comments.list_for_request(&request.id, true).await.expect("admin view");
    assert_eq!(admin_view.len(), 2);

    let employee_view =
        comments.list_for_request(&request.id, false).await.expect("employee view");
    assert_eq!(employee_view.len(), 1);
    assert!(!employee_view[0].is_internal);
}

#[tokio::test]
async fn listing_scopes_to_employee_and_paginates() {
    let (pool, lifecycle) = setup().await;
    let employee = ActorContext::new(UserId("emp-1".to_string()), Role::Employee);

    for n in 0..3 {
        lifecycle
            .submit(
                &employee,
                SubmitCommand {
                    subject: format!("Request {n}"),
                    message: "Details to follow in the thread.".to_string(),
                    priority: Priority::Normal,
                },
            )
            .await
            .expect("submit");
    }

    let requests = SqlRequestRepository::new(pool.clone());
    let page = requests
        .list(&RequestFilter {
            employee_id: Some(UserId("emp-1".to_string())),
            limit: 2,
            ..RequestFilter::default()
        })
        .await
        .expect("list");

    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);

    let other = requests
        .list(&RequestFilter {
            employee_id: Some(UserId("emp-2".to_string())),
            ..RequestFilter::default()
        })
        .await
        .expect("list other");
    assert_eq!(other.total, 0);
}
