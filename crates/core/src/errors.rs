use thiserror::Error;

use crate::domain::request::RequestId;
use crate::lifecycle::ValidationFailure;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {}", format_failures(.failures))]
    Validation { failures: Vec<ValidationFailure> },
    #[error("request {} was modified concurrently", id.0)]
    VersionConflict { id: RequestId },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn validation(failures: Vec<ValidationFailure>) -> Self {
        Self::Validation { failures }
    }
}

fn format_failures(failures: &[ValidationFailure]) -> String {
    failures.iter().map(ValidationFailure::reason).collect::<Vec<_>>().join("; ")
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// User-safe text. Raw driver/database detail never reaches callers;
    /// it is logged server-side with the correlation id instead.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Conflict { .. } => {
                "The record was changed by someone else. Reload and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(DomainError::Validation { failures }) => Self::BadRequest {
                message: format_failures(&failures),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Domain(DomainError::VersionConflict { id }) => Self::Conflict {
                message: format!("request {} was modified concurrently", id.0),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Domain(DomainError::NotFound { entity, id }) => Self::NotFound {
                message: format!("{entity} {id} does not exist"),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Domain(DomainError::InvariantViolation(_)) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::request::RequestId;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::lifecycle::ValidationFailure;

    #[test]
    fn validation_error_maps_to_bad_request_with_reasons() {
        let interface = ApplicationError::from(DomainError::validation(vec![
            ValidationFailure::EmptySubject,
            ValidationFailure::ResponseLength { length: 3 },
        ]))
        .into_interface("req-1");

        match interface {
            InterfaceError::BadRequest { message, correlation_id } => {
                assert_eq!(correlation_id, "req-1");
                assert!(message.contains("subject must not be empty"));
                assert!(message.contains("response text"));
            }
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    #[test]
    fn version_conflict_maps_to_conflict() {
        let interface = ApplicationError::from(DomainError::VersionConflict {
            id: RequestId("req-9".to_string()),
        })
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert_eq!(
            interface.user_message(),
            "The record was changed by someone else. Reload and try again."
        );
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable_with_safe_message() {
        let interface =
            ApplicationError::Persistence("database lock timeout".to_owned()).into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn not_found_maps_to_not_found() {
        let interface = ApplicationError::from(DomainError::NotFound {
            entity: "request",
            id: "999".to_string(),
        })
        .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::NotFound { .. }));
    }
}
