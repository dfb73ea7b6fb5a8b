/// Error types for session and gateway operations
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("response body is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("server returned a non-JSON body (status {status})")]
    InvalidResponse { status: u16 },

    #[error("authentication failed: the session could not be refreshed")]
    AuthenticationFailed,

    #[error("{code}: {message}")]
    Server { code: String, message: String },
}

impl ApiError {
    /// Stable machine-readable code for this error.
    ///
    /// Server-declared errors pass their own code through unchanged.
    pub fn code(&self) -> &str {
        match self {
            ApiError::Network(_) => "NETWORK_ERROR",
            ApiError::Parse(_) => "PARSE_ERROR",
            ApiError::InvalidResponse { .. } => "INVALID_RESPONSE",
            ApiError::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ApiError::Server { code, .. } => code,
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Wire shape of a server-declared error inside a response envelope
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Pass the server's `{code, message}` through unchanged, filling
    /// in placeholders for fields the server omitted.
    pub fn into_api_error(self) -> ApiError {
        ApiError::Server {
            code: self.code.unwrap_or_else(|| "UNKNOWN_ERROR".to_string()),
            message: self.message.unwrap_or_else(|| "request failed".to_string()),
        }
    }
}
