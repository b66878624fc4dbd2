//! API error type shared by every handler.

use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many requests")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("Internal server error")]
    Internal(anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<ApiError>() {
            Ok(api) => return api,
            Err(err) => err,
        };

        match err.downcast_ref::<DieselError>() {
            Some(DieselError::NotFound) => ApiError::not_found("Record"),
            Some(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)) => {
                tracing::debug!("Unique violation: {}", info.message());
                ApiError::conflict("Record already exists")
            }
            Some(DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _)) => {
                ApiError::bad_request("Referenced record does not exist")
            }
            // Only raised for an update whose changeset is empty.
            Some(DieselError::QueryBuilderError(_)) => ApiError::bad_request("No fields to update"),
            _ => ApiError::Internal(err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<DieselError> for ApiError {
    fn from(err: DieselError) -> Self {
        ApiError::from(anyhow::Error::from(err))
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for ApiError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        ApiError::Internal(anyhow::anyhow!("database pool: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let ApiError::Internal(ref err) = self {
            tracing::error!("Request failed: {err:#}");
        }

        let body = Json(serde_json::json!({ "error": self.to_string() }));
        let mut response = (status, body).into_response();

        if let ApiError::TooManyRequests { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diesel_not_found_maps_to_404() {
        let err: ApiError = anyhow::Error::from(DieselError::NotFound).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn wrapped_api_error_is_recovered() {
        let err: ApiError = anyhow::Error::from(ApiError::conflict("Out of stock")).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "Out of stock");
    }

    #[test]
    fn unknown_errors_are_internal_and_opaque() {
        let err: ApiError = anyhow::anyhow!("connection reset by peer").into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal server error");
    }

    #[test]
    fn rate_limited_response_has_retry_after() {
        let response = ApiError::TooManyRequests { retry_after_secs: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
