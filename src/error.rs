use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use utoipa::ToSchema;

use crate::media::MediaError;
use crate::repo::RepoError;
use crate::storage::MediaStoreError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: String,
}

/// Every handler failure ends up here. `Display` is the client-facing
/// message, so internal causes must be logged before conversion.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("Unauthorized")] Unauthorized,
    #[error("Invalid credentials")] InvalidCredentials,
    #[error("{0}")] Forbidden(String),
    #[error("{0}")] NotFound(String),
    #[error("Something went wrong")] Internal,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self { ApiError::BadRequest(msg.into()) }
    pub fn forbidden(msg: impl Into<String>) -> Self { ApiError::Forbidden(msg.into()) }
    pub fn not_found(msg: impl Into<String>) -> Self { ApiError::NotFound(msg.into()) }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::not_found("Resource not found"),
            RepoError::Conflict => ApiError::bad_request("Resource already exists"),
            RepoError::Internal(cause) => {
                log::error!("repository failure: {cause}");
                ApiError::Internal
            }
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::Optimize(cause) => {
                log::error!("image optimisation failed: {cause}");
                ApiError::Internal
            }
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<MediaStoreError> for ApiError {
    fn from(e: MediaStoreError) -> Self {
        match e {
            MediaStoreError::NotFound => ApiError::not_found("File not found"),
            MediaStoreError::Io(cause) => {
                log::error!("media store failure: {cause}");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiErrorBody { error: self.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn repo_errors_map_to_taxonomy() {
        assert_eq!(ApiError::from(RepoError::NotFound).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(RepoError::Conflict).status_code(), StatusCode::BAD_REQUEST);
        let internal = ApiError::from(RepoError::Internal("pool timed out".into()));
        assert_eq!(internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!internal.to_string().contains("pool"));
    }

    #[test]
    fn media_validation_errors_are_bad_requests() {
        assert_eq!(ApiError::from(MediaError::TooLarge { max_bytes: 10 }).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(MediaError::InvalidDirectory).to_string(), "Invalid file directory");
    }
}
