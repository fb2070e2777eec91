use sqlx::Executor;

use crate::repositories::RepositoryError;
use crate::DbPool;

const SEED_USER_IDS: &[&str] =
    &["user-admin-001", "user-mgr-001", "user-emp-001", "user-emp-002"];

/// Request id + expected status pairs the demo dataset guarantees.
const SEED_REQUESTS: &[(&str, &str)] = &[
    ("req-demo-001", "pending"),
    ("req-demo-002", "completed"),
    ("req-demo-003", "on_hold"),
];

const SEED_NOTIFICATION_IDS: &[&str] =
    &["nt-demo-001", "nt-demo-002", "nt-demo-003", "nt-demo-004"];

#[derive(Debug)]
pub struct SeedVerification {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

/// Deterministic demo fixtures: a small directory, one request per
/// interesting lifecycle state, and the derived records a response leaves
/// behind.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    pub async fn load(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Verify that the seed contract holds after loading.
    pub async fn verify(pool: &DbPool) -> Result<SeedVerification, RepositoryError> {
        let mut checks = Vec::new();

        let user_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM users WHERE id IN {}",
            sql_array_from_ids(SEED_USER_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("users", user_count == SEED_USER_IDS.len() as i64));

        for (request_id, status) in SEED_REQUESTS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM requests WHERE id = ?1 AND status = ?2)",
            )
            .bind(request_id)
            .bind(status)
            .fetch_one(pool)
            .await?;
            checks.push((*request_id, exists == 1));
        }

        let history_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM status_history WHERE request_id IN ('req-demo-002', 'req-demo-003')",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("status-history", history_count == 2));

        let internal_hidden: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM comments WHERE request_id = 'req-demo-003' AND is_internal = 0",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("visible-comments", internal_hidden == 1));

        let reminder_exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM reminders WHERE request_id = 'req-demo-003')",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("reminder", reminder_exists == 1));

        let notification_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM notifications WHERE id IN {}",
            sql_array_from_ids(SEED_NOTIFICATION_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("notifications", notification_count == SEED_NOTIFICATION_IDS.len() as i64));

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(SeedVerification { all_present, checks })
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(", ");
    format!("({quoted})")
}
