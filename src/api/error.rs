use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::core::error::PostboardError;


#[derive(Error, Debug)]
pub enum ApiError {
    #[error("authorization required")]
    Unauthorized,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Core(#[from] PostboardError),
}


#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Self::Core(e) => match e {
                PostboardError::NotFound(_) => StatusCode::NOT_FOUND,
                PostboardError::Forbidden(_) => StatusCode::FORBIDDEN,
                PostboardError::InvalidToken | PostboardError::InvalidCredentials => {
                    StatusCode::UNAUTHORIZED
                }
                PostboardError::Validation(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
            "internal error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::MalformedRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::MalformedRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ApiError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (PostboardError::not_found("user 1").into(), StatusCode::NOT_FOUND),
            (PostboardError::Forbidden("no".into()).into(), StatusCode::FORBIDDEN),
            (PostboardError::InvalidToken.into(), StatusCode::UNAUTHORIZED),
            (PostboardError::validation("name is required").into(), StatusCode::BAD_REQUEST),
            (PostboardError::Persistence("disk".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
