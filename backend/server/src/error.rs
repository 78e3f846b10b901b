use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::{claims::ClaimError, config::ConfigError, database::StoreError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Missing or invalid identity")]
    Unauthenticated,

    #[error(transparent)]
    Claim(#[from] ClaimError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::MalformedPayload => (StatusCode::BAD_REQUEST, "Malformed payload"),
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthenticated"),
            AppError::Claim(ClaimError::TransientStorageFailure(_)) | AppError::Store(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Temporarily unavailable, try again")
            }
            AppError::Claim(ClaimError::CorruptRegistry(_) | ClaimError::StorageFault(_))
            | AppError::Config(_)
            | AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
        };

        if status.is_server_error() {
            warn!("Request failed: {self}");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use redis::{ErrorKind, RedisError};

    use super::*;

    fn status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_claim_error_status() {
        let wrong_type =
            || StoreError::Redis(RedisError::from((ErrorKind::TypeError, "WRONGTYPE")));

        assert_eq!(
            status(ClaimError::StorageFault(wrong_type()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(ClaimError::TransientStorageFailure(StoreError::Conflict).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(ClaimError::from(wrong_type()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
