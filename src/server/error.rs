use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;
use tracing::error;

pub type AppResult<T> = Result<T, Error>;

pub type DramaboxResult<T> = Result<T, DramaboxError>;

/// failures of the signed upstream pipeline. these never leave the services as http responses
/// directly, controllers convert them into `Error`
#[derive(Debug, ThisError)]
pub enum DramaboxError {
    /// signer unavailable or it handed back nothing, the request must not go out unsigned
    #[error("signature error: {0}")]
    Signature(String),

    /// network level failure, caller decides whether to retry
    #[error("transport error: {0}")]
    Transport(String),

    /// non-2xx from upstream
    #[error("upstream returned {status}: {body_excerpt}")]
    Upstream { status: u16, body_excerpt: String },

    /// 2xx but the envelope carried a non-zero status
    #[error("upstream api error: {message}")]
    Api { message: String },

    #[error("failed to decode upstream response: {0}")]
    Decode(String),

    /// no strategy could resolve a single chapter
    #[error("{0}")]
    Unlock(String),
}

impl DramaboxError {
    /// signatures are timestamp bound, resending the same one after a 401/403 is pointless
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Upstream { status, .. } if *status == 401 || *status == 403)
    }

    /// resending can't fix a missing signer, a rejected identity or an answer upstream already
    /// gave (`Api`). transport, decode and non-auth http failures get another attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Signature(_) | Self::Unlock(_) | Self::Api { .. })
            && !self.is_auth_failure()
    }
}

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("internal server error")]
    InternalServerError,

    #[error("{0}")]
    InternalServerErrorWithContext(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::InternalServerError | Self::InternalServerErrorWithContext(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<DramaboxError> for Error {
    fn from(err: DramaboxError) -> Self {
        match err {
            // the client needs to tell "can't be unlocked" apart from a generic failure
            DramaboxError::Unlock(message) => Error::Forbidden(message),
            DramaboxError::Signature(message) => {
                error!("refusing to send unsigned request: {}", message);
                Error::InternalServerErrorWithContext(format!("signature error: {}", message))
            }
            other => Error::BadGateway(other.to_string()),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!("request failed with {}: {}", status, self);
        }

        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
