use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::{crypto::CryptoError, StoreError};

pub const MSG_INTERNAL: &str = "internal server error";

/// Everything a create or retrieve can fail with.
#[derive(Debug, Error)]
pub enum ShareError {
    /// Missing or malformed input; the caller can fix it.
    #[error("{0}")]
    Validation(String),
    /// Never existed, already read, or purged. Deliberately one case so a
    /// recipient cannot learn that someone else opened the link first.
    #[error("share not found or already viewed")]
    NotFoundOrConsumed,
    #[error("share has expired")]
    Expired,
    #[error("failed to encrypt share")]
    Encryption(#[source] CryptoError),
    /// Stored ciphertext failed to open. Only corruption or a bug gets here.
    #[error("stored share failed integrity check")]
    Decryption(#[source] CryptoError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ShareError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFoundOrConsumed => StatusCode::NOT_FOUND,
            Self::Expired => StatusCode::GONE,
            Self::Encryption(_) | Self::Decryption(_) | Self::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ShareError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = ?self, "internal error");
            MSG_INTERNAL.to_owned()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
