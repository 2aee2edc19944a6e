//! Error responses for the HTTP API.

use agent_core::AgentError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::core::Error;

/// An error returned to the client as `{"status": "error", "message": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) | Error::Agent(AgentError::FileNotFound(_)) => StatusCode::NOT_FOUND,
            Error::Busy(_) => StatusCode::CONFLICT,
            Error::Agent(AgentError::Undo(_)) => StatusCode::BAD_REQUEST,
            Error::Init(_) | Error::Agent(_) | Error::Storage(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        } else {
            tracing::debug!(error = %err, status = %status, "request rejected");
        }

        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({
                "status": "error",
                "message": self.message,
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_core_errors_to_status_codes() {
        let cases = [
            (Error::Validation("x".into()), StatusCode::BAD_REQUEST),
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::Busy("s1".into()), StatusCode::CONFLICT),
            (Error::Init("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                Error::Agent(AgentError::Undo("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                Error::Agent(AgentError::NoRepository("/tmp".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn validation_message_is_passed_through() {
        let err = ApiError::from(Error::Validation("Session ID is required".into()));
        assert_eq!(err.message(), "Session ID is required");
    }
}
