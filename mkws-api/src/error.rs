//! API error type and HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mkws_common::Error;
use serde_json::json;
use tracing::error;

/// Errors a handler can answer with. Library errors convert via
/// `From`, so handlers mostly just use `?`.
#[derive(Debug)]
pub enum ApiError {
    /// 400: malformed input, unknown enum values, bad race counts.
    BadRequest(String),
    /// 401: missing or invalid credentials.
    Unauthorized(String),
    /// 403: authenticated but lacking guild membership or manage right.
    Forbidden(String),
    /// 404: missing entity.
    NotFound(String),
    /// 409: entity not in the required state (e.g. session not open).
    Conflict(String),
    /// 410: entity's TTL has elapsed.
    Gone(String),
    /// 500: anything unexpected; detail goes to the log, not the wire.
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidInput(msg) | Error::Duplicate(msg) => ApiError::BadRequest(msg),
            Error::PermissionDenied(msg) => ApiError::Unauthorized(msg),
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidState(msg) => ApiError::Conflict(msg),
            Error::Expired(msg) => ApiError::Gone(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "SESSION_NOT_OPEN", msg),
            ApiError::Gone(msg) => (StatusCode::GONE, "SESSION_EXPIRED", msg),
            ApiError::Internal(msg) => {
                error!(detail = %msg, "request failed unexpectedly");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "internal error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_errors_map_to_the_right_status() {
        let cases = [
            (Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (Error::Duplicate("x".into()), StatusCode::BAD_REQUEST),
            (Error::PermissionDenied("x".into()), StatusCode::UNAUTHORIZED),
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::InvalidState("x".into()), StatusCode::CONFLICT),
            (Error::Expired("x".into()), StatusCode::GONE),
            (Error::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            let response = ApiError::from(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn internal_detail_stays_out_of_the_body() {
        let response = ApiError::Internal("sqlite file corrupted at page 7".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
