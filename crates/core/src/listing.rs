//! List-view filtering and ordering. Sort keys are a closed enum mapped to
//! fixed column names; raw column names never come from input.

use serde::{Deserialize, Serialize};

use crate::domain::request::{Priority, RequestStatus};
use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSortKey {
    #[default]
    CreatedAt,
    UpdatedAt,
    Priority,
    Status,
}

impl RequestSortKey {
    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Priority => "priority",
            Self::Status => "status",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "created_at" => Some(Self::CreatedAt),
            "updated_at" => Some(Self::UpdatedAt),
            "priority" => Some(Self::Priority),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<UserId>,
    pub employee_id: Option<UserId>,
    /// Free-text needle matched against subject and message.
    pub search: Option<String>,
    pub sort: RequestSortKey,
    pub direction: SortDirection,
    pub limit: u32,
    pub offset: u32,
}

impl Default for RequestFilter {
    fn default() -> Self {
        Self {
            status: None,
            priority: None,
            assignee_id: None,
            employee_id: None,
            search: None,
            sort: RequestSortKey::default(),
            direction: SortDirection::default(),
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl RequestFilter {
    pub fn clamped_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::{RequestFilter, RequestSortKey, SortDirection, MAX_PAGE_SIZE};

    #[test]
    fn sort_keys_map_to_fixed_columns() {
        assert_eq!(RequestSortKey::CreatedAt.column(), "created_at");
        assert_eq!(RequestSortKey::Priority.column(), "priority");
        assert_eq!(RequestSortKey::parse("updated_at"), Some(RequestSortKey::UpdatedAt));
        // arbitrary column names are rejected, not passed through
        assert_eq!(RequestSortKey::parse("subject; DROP TABLE requests"), None);
    }

    #[test]
    fn limits_are_clamped() {
        let filter = RequestFilter { limit: 10_000, ..RequestFilter::default() };
        assert_eq!(filter.clamped_limit(), MAX_PAGE_SIZE);

        let zero = RequestFilter { limit: 0, ..RequestFilter::default() };
        assert_eq!(zero.clamped_limit(), 1);
    }

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!(SortDirection::parse("ASC"), Some(SortDirection::Asc));
        assert_eq!(SortDirection::parse("sideways"), None);
    }
}
