use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Error returned by every handler. Renders as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error(transparent)]
    Internal(anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Client-caused database failures, keyed by Postgres SQLSTATE.
fn client_error_for_sqlstate(code: &str) -> Option<AppError> {
    match code {
        "23503" => Some(AppError::bad_request("Referenced record does not exist")),
        "23505" => Some(AppError::conflict("Record already exists")),
        "23514" | "23502" | "22P02" => Some(AppError::bad_request("Invalid value")),
        _ => None,
    }
}

fn client_error(e: &sqlx::Error) -> Option<AppError> {
    match e {
        sqlx::Error::RowNotFound => Some(AppError::not_found("Not found")),
        sqlx::Error::Database(db) => db.code().and_then(|c| client_error_for_sqlstate(&c)),
        _ => None,
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        client_error(&e).unwrap_or(Self::Database(e))
    }
}

/// Repositories wrap sqlx errors in context; the underlying error still decides the status.
impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast_ref::<sqlx::Error>().and_then(client_error) {
            Some(mapped) => {
                let detail = format!("{e:#}");
                warn!(error = %detail, "database rejected request");
                mapped
            }
            None => Self::Internal(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Database(e) => {
                error!(error = %e, "database error");
                "Internal server error".to_string()
            }
            Self::Internal(e) => {
                error!(error = ?e, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let res = err.into_response();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn client_errors_keep_their_message() {
        let (status, body) = body_json(AppError::bad_request("Rating must be between 1 and 5")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Rating must be between 1 and 5");
    }

    #[tokio::test]
    async fn internal_errors_are_masked() {
        let (status, body) =
            body_json(AppError::Internal(anyhow::anyhow!("connection reset by peer"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }

    #[test]
    fn row_not_found_behind_context_maps_to_404() {
        use anyhow::Context;
        let err: AppError = Err::<(), _>(sqlx::Error::RowNotFound)
            .context("complete planned meal")
            .unwrap_err()
            .into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: AppError = Err::<(), _>(sqlx::Error::PoolTimedOut)
            .context("list claims")
            .unwrap_err()
            .into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn constraint_violations_are_client_errors() {
        assert_eq!(
            client_error_for_sqlstate("23503").map(|e| e.status()),
            Some(StatusCode::BAD_REQUEST)
        );
        assert_eq!(
            client_error_for_sqlstate("23505").map(|e| e.status()),
            Some(StatusCode::CONFLICT)
        );
        assert_eq!(
            client_error_for_sqlstate("23514").map(|e| e.status()),
            Some(StatusCode::BAD_REQUEST)
        );
        assert!(client_error_for_sqlstate("40001").is_none());
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err = AppError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
