use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{assistant::AssistantError, auth::AuthError, store::StoreError};

/// Body used when even the error body cannot be encoded.
pub const FALLBACK_ERROR_BODY: &str = r#"{"error":"Internal server error"}"#;

const INTERNAL: &str = "Internal server error";

/// ApiError
///
/// Every way a request can fail, mapped onto the HTTP surface by `IntoResponse`.
/// Server-side failures are logged with their cause here and answered with a
/// generic message; client errors carry their message to the caller.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No registered route matched method and path.
    #[error("Not Found")]
    RouteNotFound,
    #[error("{0}")]
    Validation(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AuthError),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("response could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Assistant(#[from] AssistantError),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RouteNotFound | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::FORBIDDEN,
            ApiError::Store(_)
            | ApiError::Serialization(_)
            | ApiError::Assistant(_)
            | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message sent to the client.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Assistant(_) => "Error sending request to target API".to_string(),
            ApiError::Store(_) | ApiError::Serialization(_) | ApiError::Storage(_) => {
                INTERNAL.to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }

        let message = self.public_message();
        let body = serde_json::to_vec(&ErrorBody { error: &message })
            .unwrap_or_else(|_| FALLBACK_ERROR_BODY.as_bytes().to_vec());

        (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        let store = StoreError::Request {
            operation: "query",
            table: "splitter-expenses".into(),
            message: "throttled".into(),
        };
        assert_eq!(ApiError::RouteNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Unauthorized(AuthError::MissingToken).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::from(store).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn server_errors_hide_their_cause() {
        let err = ApiError::from(StoreError::Request {
            operation: "get",
            table: "chat".into(),
            message: "secret detail".into(),
        });
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(
            ApiError::Storage("bucket gone".into()).public_message(),
            "Internal server error"
        );
        assert_eq!(ApiError::RouteNotFound.public_message(), "Not Found");
    }
}
