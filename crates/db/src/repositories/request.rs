use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Row};

use hrdesk_core::domain::request::{Priority, Request, RequestId, RequestStatus};
use hrdesk_core::domain::user::UserId;
use hrdesk_core::listing::{Page, RequestFilter};

use super::{RepositoryError, RequestRepository};
use crate::DbPool;

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn parse_status(s: &str) -> RequestStatus {
    RequestStatus::parse(s).unwrap_or(RequestStatus::Pending)
}

pub(crate) fn parse_priority(s: &str) -> Priority {
    Priority::parse(s).unwrap_or(Priority::Normal)
}

pub(crate) fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

pub(crate) const REQUEST_COLUMNS: &str =
    "id, employee_id, subject, message, priority, status, admin_response, responded_by, \
     assignee_id, follow_up_date, version, created_at, updated_at, responded_at";

pub(crate) fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<Request, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let employee_id: String =
        row.try_get("employee_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let subject: String =
        row.try_get("subject").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let message: String =
        row.try_get("message").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let priority_str: String =
        row.try_get("priority").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let admin_response: Option<String> =
        row.try_get("admin_response").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let responded_by: Option<String> =
        row.try_get("responded_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let assignee_id: Option<String> =
        row.try_get("assignee_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let follow_up_str: Option<String> =
        row.try_get("follow_up_date").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let version: i64 =
        row.try_get("version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let responded_at_str: Option<String> =
        row.try_get("responded_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let follow_up_date = follow_up_str.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok());

    Ok(Request {
        id: RequestId(id),
        employee_id: UserId(employee_id),
        subject,
        message,
        priority: parse_priority(&priority_str),
        status: parse_status(&status_str),
        admin_response,
        responded_by: responded_by.map(UserId),
        assignee_id: assignee_id.map(UserId),
        follow_up_date,
        version,
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
        responded_at: responded_at_str.as_deref().map(parse_timestamp),
    })
}

/// Dashboard aggregates: per-status and per-priority counts plus overdue
/// follow-ups.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RequestStats {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub rejected: i64,
    pub on_hold: i64,
    pub low_priority: i64,
    pub normal_priority: i64,
    pub high_priority: i64,
    pub urgent_priority: i64,
    pub overdue_follow_ups: i64,
}

fn push_filters(builder: &mut QueryBuilder<'_, sqlx::Sqlite>, filter: &RequestFilter) {
    builder.push(" WHERE 1=1");

    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(priority) = filter.priority {
        builder.push(" AND priority = ").push_bind(priority.as_str());
    }
    if let Some(assignee_id) = &filter.assignee_id {
        builder.push(" AND assignee_id = ").push_bind(assignee_id.0.clone());
    }
    if let Some(employee_id) = &filter.employee_id {
        builder.push(" AND employee_id = ").push_bind(employee_id.0.clone());
    }
    if let Some(search) = &filter.search {
        let needle = format!("%{}%", search.trim());
        builder
            .push(" AND (subject LIKE ")
            .push_bind(needle.clone())
            .push(" OR message LIKE ")
            .push_bind(needle)
            .push(")");
    }
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_request(r)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Page<Request>, RepositoryError> {
        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) AS count FROM requests");
        push_filters(&mut count_builder, filter);
        let total: i64 = count_builder.build().fetch_one(&self.pool).await?.get("count");

        let mut builder =
            QueryBuilder::new(format!("SELECT {REQUEST_COLUMNS} FROM requests"));
        push_filters(&mut builder, filter);

        // sort key and direction come from closed enums, never from input
        builder.push(format!(
            " ORDER BY {} {}",
            filter.sort.column(),
            filter.direction.as_sql()
        ));
        builder.push(" LIMIT ").push_bind(filter.clamped_limit());
        builder.push(" OFFSET ").push_bind(filter.offset);

        let rows = builder.build().fetch_all(&self.pool).await?;
        let items = rows.iter().map(row_to_request).collect::<Result<Vec<_>, _>>()?;

        Ok(Page { items, total })
    }

    async fn stats(&self) -> Result<RequestStats, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) AS total,
                SUM(status = 'pending') AS pending,
                SUM(status = 'in_progress') AS in_progress,
                SUM(status = 'completed') AS completed,
                SUM(status = 'rejected') AS rejected,
                SUM(status = 'on_hold') AS on_hold,
                SUM(priority = 'low') AS low_priority,
                SUM(priority = 'normal') AS normal_priority,
                SUM(priority = 'high') AS high_priority,
                SUM(priority = 'urgent') AS urgent_priority,
                SUM(follow_up_date IS NOT NULL
                    AND follow_up_date < ?
                    AND status NOT IN ('completed', 'rejected')) AS overdue_follow_ups
             FROM requests",
        )
        .bind(Utc::now().date_naive().format("%Y-%m-%d").to_string())
        .fetch_one(&self.pool)
        .await?;

        let get = |name: &str| -> i64 { row.try_get::<Option<i64>, _>(name).ok().flatten().unwrap_or(0) };

        Ok(RequestStats {
            total: row.try_get("total").unwrap_or(0),
            pending: get("pending"),
            in_progress: get("in_progress"),
            completed: get("completed"),
            rejected: get("rejected"),
            on_hold: get("on_hold"),
            low_priority: get("low_priority"),
            normal_priority: get("normal_priority"),
            high_priority: get("high_priority"),
            urgent_priority: get("urgent_priority"),
            overdue_follow_ups: get("overdue_follow_ups"),
        })
    }

    async fn save(&self, request: Request) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO requests (id, employee_id, subject, message, priority, status,
                                   admin_response, responded_by, assignee_id, follow_up_date,
                                   version, created_at, updated_at, responded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 subject = excluded.subject,
                 message = excluded.message,
                 priority = excluded.priority,
                 status = excluded.status,
                 admin_response = excluded.admin_response,
                 responded_by = excluded.responded_by,
                 assignee_id = excluded.assignee_id,
                 follow_up_date = excluded.follow_up_date,
                 version = excluded.version,
                 updated_at = excluded.updated_at,
                 responded_at = excluded.responded_at",
        )
        .bind(&request.id.0)
        .bind(&request.employee_id.0)
        .bind(&request.subject)
        .bind(&request.message)
        .bind(request.priority.as_str())
        .bind(request.status.as_str())
        .bind(&request.admin_response)
        .bind(request.responded_by.as_ref().map(|id| id.0.clone()))
        .bind(request.assignee_id.as_ref().map(|id| id.0.clone()))
        .bind(request.follow_up_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(request.version)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .bind(request.responded_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use hrdesk_core::domain::request::{Priority, Request, RequestId, RequestStatus};
    use hrdesk_core::domain::user::{Role, User, UserId};
    use hrdesk_core::listing::{RequestFilter, RequestSortKey, SortDirection};

    use super::SqlRequestRepository;
    use crate::repositories::{RequestRepository, SqlUserRepository, UserRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let users = SqlUserRepository::new(pool.clone());
        users
            .save(User {
                id: UserId("emp-1".to_string()),
                display_name: "Dana Field".to_string(),
                email: "dana@example.test".to_string(),
                role: Role::Employee,
                active: true,
                created_at: Utc::now(),
            })
            .await
            .expect("seed employee");

        pool
    }

    fn sample_request(id: &str, status: RequestStatus, priority: Priority) -> Request {
        let now = Utc::now();
        Request {
            id: RequestId(id.to_string()),
            employee_id: UserId("emp-1".to_string()),
            subject: format!("Subject {id}"),
            message: "Please review my situation".to_string(),
            priority,
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

    #[tokio::test]
    async fn save_and_find_round_trip() {
        let pool = setup().await;
        let repo = SqlRequestRepository::new(pool);

        repo.save(sample_request("req-1", RequestStatus::Pending, Priority::High))
            .await
            .expect("save");

        let found =
            repo.find_by_id(&RequestId("req-1".to_string())).await.expect("find").expect("exists");
        assert_eq!(found.status, RequestStatus::Pending);
        assert_eq!(found.priority, Priority::High);
        assert_eq!(found.admin_response, None);
        assert_eq!(found.version, 1);
    }

    #[tokio::test]
    async fn list_filters_by_status_and_search() {
        let pool = setup().await;
        let repo = SqlRequestRepository::new(pool);

        repo.save(sample_request("req-1", RequestStatus::Pending, Priority::Normal))
            .await
            .expect("save 1");
        repo.save(sample_request("req-2", RequestStatus::Completed, Priority::Normal))
            .await
            .expect("save 2");
        repo.save(sample_request("req-3", RequestStatus::Pending, Priority::Urgent))
            .await
            .expect("save 3");

        let pending = repo
            .list(&RequestFilter { status: Some(RequestStatus::Pending), ..RequestFilter::default() })
            .await
            .expect("list pending");
        assert_eq!(pending.total, 2);
        assert_eq!(pending.items.len(), 2);

        let searched = repo
            .list(&RequestFilter { search: Some("Subject req-2".to_string()), ..Default::default() })
            .await
            .expect("list searched");
        assert_eq!(searched.total, 1);
        assert_eq!(searched.items[0].id.0, "req-2");
    }

    #[tokio::test]
    async fn list_orders_by_whitelisted_sort_key() {
        let pool = setup().await;
        let repo = SqlRequestRepository::new(pool);

        repo.save(sample_request("req-a", RequestStatus::Pending, Priority::Low))
            .await
            .expect("save a");
        repo.save(sample_request("req-b", RequestStatus::Pending, Priority::Urgent))
            .await
            .expect("save b");

        let page = repo
            .list(&RequestFilter {
                sort: RequestSortKey::Priority,
                direction: SortDirection::Asc,
                ..RequestFilter::default()
            })
            .await
            .expect("list sorted");

        // lexicographic on the stored strings: high < low < normal < urgent
        assert_eq!(page.items.first().expect("first").id.0, "req-a");
    }

    #[tokio::test]
    async fn stats_aggregate_by_status_and_priority() {
        let pool = setup().await;
        let repo = SqlRequestRepository::new(pool);

        repo.save(sample_request("req-1", RequestStatus::Pending, Priority::Urgent))
            .await
            .expect("save 1");
        repo.save(sample_request("req-2", RequestStatus::Completed, Priority::Normal))
            .await
            .expect("save 2");
        repo.save(sample_request("req-3", RequestStatus::Pending, Priority::Normal))
            .await
            .expect("save 3");

        let stats = repo.stats().await.expect("stats");
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.urgent_priority, 1);
        assert_eq!(stats.normal_priority, 2);
        assert_eq!(stats.overdue_follow_ups, 0);
    }
}
