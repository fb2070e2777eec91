use std::collections::HashMap;

use tokio::sync::RwLock;

use hrdesk_core::domain::request::{Request, RequestId};
use hrdesk_core::domain::user::{Role, User, UserId};
use hrdesk_core::listing::{Page, RequestFilter};

use super::request::RequestStats;
use super::{RepositoryError, RequestRepository, UserRepository};

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn list_active_admins(&self) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut admins: Vec<User> = users
            .values()
            .filter(|user| user.active && matches!(user.role, Role::Admin))
            .cloned()
            .collect();
        admins.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(admins)
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, Request>>,
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Page<Request>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut items: Vec<Request> = requests
            .values()
            .filter(|request| {
                filter.status.map_or(true, |status| request.status == status)
                    && filter.priority.map_or(true, |priority| request.priority == priority)
                    && filter
                        .employee_id
                        .as_ref()
                        .map_or(true, |employee| &request.employee_id == employee)
                    && filter
                        .assignee_id
                        .as_ref()
                        .map_or(true, |assignee| request.assignee_id.as_ref() == Some(assignee))
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = items.len() as i64;
        let items = items
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.clamped_limit() as usize)
            .collect();
        Ok(Page { items, total })
    }

    async fn stats(&self) -> Result<RequestStats, RepositoryError> {
        let requests = self.requests.read().await;
        let mut stats = RequestStats { total: requests.len() as i64, ..RequestStats::default() };
        for request in requests.values() {
            use hrdesk_core::domain::request::{Priority, RequestStatus};
            match request.status {
                RequestStatus::Pending => stats.pending += 1,
                RequestStatus::InProgress => stats.in_progress += 1,
                RequestStatus::Completed => stats.completed += 1,
                RequestStatus::Rejected => stats.rejected += 1,
                RequestStatus::OnHold => stats.on_hold += 1,
            }
            match request.priority {
                Priority::Low => stats.low_priority += 1,
                Priority::Normal => stats.normal_priority += 1,
                Priority::High => stats.high_priority += 1,
                Priority::Urgent => stats.urgent_priority += 1,
            }
        }
        Ok(stats)
    }

    async fn save(&self, request: Request) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use hrdesk_core::domain::request::{Priority, Request, RequestId, RequestStatus};
    use hrdesk_core::domain::user::{Role, User, UserId};
    use hrdesk_core::listing::RequestFilter;

    use crate::repositories::{
        InMemoryRequestRepository, InMemoryUserRepository, RequestRepository, UserRepository,
    };

    #[tokio::test]
    async fn in_memory_user_repo_round_trip() {
        let repo = InMemoryUserRepository::default();
        let user = User {
            id: UserId("u-1".to_string()),
            display_name: "Avery".to_string(),
            email: "avery@example.test".to_string(),
            role: Role::Admin,
            active: true,
            created_at: Utc::now(),
        };

        repo.save(user.clone()).await.expect("save user");
        let found = repo.find_by_id(&user.id).await.expect("find user");
        assert_eq!(found, Some(user));

        let admins = repo.list_active_admins().await.expect("admins");
        assert_eq!(admins.len(), 1);
    }

    #[tokio::test]
    async fn in_memory_request_repo_filters_by_status() {
        let repo = InMemoryRequestRepository::default();
        let now = Utc::now();
        for (id, status) in
            [("r-1", RequestStatus::Pending), ("r-2", RequestStatus::Completed)]
        {
            repo.save(Request {
                id: RequestId(id.to_string()),
                employee_id: UserId("emp-1".to_string()),
                subject: "subject".to_string(),
                message: "message".to_string(),
                priority: Priority::Normal,
                status,
                admin_response: None,
                responded_by: None,
                assignee_id: None,
                follow_up_date: None,
                version: 1,
                created_at: now,
                updated_at: now,
                responded_at: None,
            })
            .await
            .expect("save request");
        }

        let page = repo
            .list(&RequestFilter { status: Some(RequestStatus::Pending), ..Default::default() })
            .await
            .expect("list");
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id.0, "r-1");
    }
}
