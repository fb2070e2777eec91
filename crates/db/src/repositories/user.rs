use chrono::{DateTime, Utc};
use sqlx::Row;

use hrdesk_core::domain::user::{Role, User, UserId};

use super::{RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_role(s: &str) -> Role {
    Role::parse(s).unwrap_or(Role::Employee)
}

pub(crate) fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let display_name: String =
        row.try_get("display_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: String =
        row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role_str: String =
        row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: bool =
        row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(User {
        id: UserId(id),
        display_name,
        email,
        role: parse_role(&role_str),
        active,
        created_at,
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, display_name, email, role, active, created_at
             FROM users WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn list_active_admins(&self) -> Result<Vec<User>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, display_name, email, role, active, created_at
             FROM users WHERE role = 'admin' AND active = 1
             ORDER BY display_name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO users (id, display_name, email, role, active, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 email = excluded.email,
                 role = excluded.role,
                 active = excluded.active",
        )
        .bind(&user.id.0)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.active)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use hrdesk_core::domain::user::{Role, User, UserId};

    use super::SqlUserRepository;
    use crate::repositories::UserRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_user(id: &str, role: Role, active: bool) -> User {
        User {
            id: UserId(id.to_string()),
            display_name: format!("User {id}"),
            email: format!("{id}@example.test"),
            role,
            active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_and_find_by_id() {
        let pool = setup().await;
        let repo = SqlUserRepository::new(pool);

        repo.save(sample_user("u-1", Role::Manager, true)).await.expect("save");
        let found = repo.find_by_id(&UserId("u-1".to_string())).await.expect("find");
        let found = found.expect("should exist");

        assert_eq!(found.role, Role::Manager);
        assert_eq!(found.email, "u-1@example.test");
    }

    #[tokio::test]
    async fn list_active_admins_excludes_inactive_and_other_roles() {
        let pool = setup().await;
        let repo = SqlUserRepository::new(pool);

        repo.save(sample_user("admin-1", Role::Admin, true)).await.expect("save 1");
        repo.save(sample_user("admin-2", Role::Admin, false)).await.expect("save 2");
        repo.save(sample_user("mgr-1", Role::Manager, true)).await.expect("save 3");
        repo.save(sample_user("emp-1", Role::Employee, true)).await.expect("save 4");

        let admins = repo.list_active_admins().await.expect("list");
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].id.0, "admin-1");
    }

    #[tokio::test]
    async fn save_upserts_on_conflict() {
        let pool = setup().await;
        let repo = SqlUserRepository::new(pool);

        let user = sample_user("u-1", Role::Employee, true);
        repo.save(user.clone()).await.expect("save");

        let mut promoted = user;
        promoted.role = Role::Admin;
        repo.save(promoted).await.expect("upsert");

        let found = repo.find_by_id(&UserId("u-1".to_string())).await.expect("find");
        assert_eq!(found.expect("exists").role, Role::Admin);
    }
}
