use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - token may be invalid or expired")]
    Unauthorized { code: Option<String> },

    #[error("Access denied: {message}")]
    AccessDenied {
        code: Option<String>,
        message: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Request rejected ({status}): {message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shapes the backend produces: `{"error": {"code", "message"}}`
/// or `{"error": "message"}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorField,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Detailed {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    Message(String),
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull the machine-readable code and human message out of an error body.
    fn parse_body(body: &str) -> (Option<String>, Option<String>) {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody {
                error: ErrorField::Detailed { code, message },
            }) => (code, message),
            Ok(ErrorBody {
                error: ErrorField::Message(message),
            }) => (None, Some(message)),
            Err(_) => (None, None),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let (code, message) = Self::parse_body(body);
        let message = message.unwrap_or_else(|| Self::truncate_body(body));
        match status.as_u16() {
            401 => ApiError::Unauthorized { code },
            403 => ApiError::AccessDenied { code, message },
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            other => ApiError::Rejected {
                status: other,
                code,
                message,
            },
        }
    }

    /// The server-supplied error code, if the response carried one.
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized { code }
            | ApiError::AccessDenied { code, .. }
            | ApiError::Rejected { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// True when the server refused the bearer credential.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized { .. } | ApiError::AccessDenied { .. }
        )
    }
}
