// src/handlers/error.rs
use std::fmt;
use warp::http::StatusCode;
use warp::reject::Reject;

use crate::error::{FailureKind, RetrievalError, StoreError};

#[derive(Debug, Clone)]
pub struct ApiError {
    pub message: String,
    pub kind: &'static str,
    pub status: StatusCode,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            message: message.into(),
            kind,
            status,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    fn from_kind(kind: FailureKind, message: String) -> Self {
        let status = match kind {
            FailureKind::BadCredentials => StatusCode::UNAUTHORIZED,
            FailureKind::SiteUnreachable | FailureKind::SiteChanged => StatusCode::BAD_GATEWAY,
            FailureKind::Busy => StatusCode::CONFLICT,
            FailureKind::CouldNotSave => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, kind.as_str(), message)
    }
}

impl From<RetrievalError> for ApiError {
    fn from(err: RetrievalError) -> Self {
        Self::from_kind(err.kind(), err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::from_kind(err.kind(), err.to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}
impl Reject for ApiError {}
