use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::agents::AgentError;
use crate::domain::messaging::BrokerError;
use crate::hub::HubError;
use crate::pipeline::TeamError;

/// API error type with HTTP status code and message
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    /// Creates a new API error
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Creates a 400 Bad Request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Creates a 404 Not Found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Creates a 409 Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// Creates a 500 Internal Server Error
    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("invalid input: {}", rejection.body_text()))
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::QueueNotFound(name) => Self::not_found(format!("Queue not found: {}", name)),
            other => {
                tracing::error!(error = %other, "broker operation failed");
                Self::internal_server_error(other.to_string())
            }
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::DuplicateAgent(_) | AgentError::AlreadyListening(_) => {
                Self::conflict(err.to_string())
            }
            AgentError::AgentNotFound(_) => Self::not_found(err.to_string()),
            AgentError::InvalidAgent(_) => Self::bad_request(err.to_string()),
            AgentError::Broker(e) => {
                tracing::error!(error = %e, "failed to set up a new rocket agent");
                Self::internal_server_error(format!("failed to set up a new rocket agent: {}", e))
            }
        }
    }
}

impl From<TeamError> for ApiError {
    fn from(err: TeamError) -> Self {
        match err {
            TeamError::InvalidTeam(reason) => Self::bad_request(reason),
            TeamError::Broker(e) => {
                tracing::error!(error = %e, "failed to set up a new team");
                Self::internal_server_error(format!("failed to set up a new team: {}", e))
            }
        }
    }
}

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        Self::internal_server_error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_agent_is_a_conflict() {
        let error = ApiError::from(AgentError::DuplicateAgent(4));
        assert_eq!(error.status, StatusCode::CONFLICT);
    }

    #[test]
    fn unknown_queue_is_not_found() {
        let error = ApiError::from(BrokerError::QueueNotFound("nope".into()));
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(error.message, "Queue not found: nope");
    }

    #[test]
    fn broker_failure_is_internal() {
        let error = ApiError::from(AgentError::Broker(BrokerError::PreconditionFailed(
            "x".into(),
        )));
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
