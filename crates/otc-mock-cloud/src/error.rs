//! # Store Errors
//!
//! [`ApiError`] is what an entity hook rejects a request with; it carries the HTTP status the
//! mock answers with. [`StoreError`] adds the failures of the store actor itself.

use otc_framework::transport::HttpResponse;
use serde_json::json;

/// A rejection with the HTTP status and error code the real API would use.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{status} {code}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_owned(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, "Common.0002", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(409, "Common.0009", message)
    }

    pub fn into_response(self) -> HttpResponse {
        HttpResponse::json(
            self.status,
            &json!({"code": self.code, "message": self.message}),
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store closed")]
    StoreClosed,
    #[error("store dropped response channel")]
    StoreDropped,
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl StoreError {
    pub fn into_response(self) -> HttpResponse {
        match self {
            Self::NotFound { kind, id } => {
                ApiError::new(404, "Common.0404", format!("{kind} {id} could not be found"))
                    .into_response()
            }
            Self::Api(e) => e.into_response(),
            other => ApiError::new(500, "Common.0500", other.to_string()).into_response(),
        }
    }
}
