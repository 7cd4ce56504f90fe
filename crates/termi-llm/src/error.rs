//! Model client error types

use thiserror::Error;

/// Error classification used by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Connection failures, timeouts, streams cut short
    Network,
    /// HTTP 429
    RateLimit,
    /// HTTP 5xx
    ServerError,
    /// HTTP 401/403 or a missing API key
    Auth,
    /// Other 4xx
    InvalidRequest,
    /// The server sent something we could not decode
    Decode,
}

impl LlmErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmErrorKind::Network | LlmErrorKind::RateLimit | LlmErrorKind::ServerError
        )
    }
}

/// Model API failure
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Decode, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Auth, message)
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => LlmErrorKind::Auth,
            429 => LlmErrorKind::RateLimit,
            500..=599 => LlmErrorKind::ServerError,
            _ => LlmErrorKind::InvalidRequest,
        };
        let detail = extract_api_error_message(body).unwrap_or_else(|| body.trim().to_string());
        Self::new(kind, format!("HTTP {}: {}", status, detail))
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return Self::from_status(status.as_u16(), &e.to_string());
        }
        if e.is_decode() {
            return Self::decode(e.to_string());
        }
        Self::network(e.to_string())
    }
}

/// Pull `error.message` (or a bare `error` string) out of an API error body
pub(crate) fn extract_api_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    if let Some(message) = error.get("message").and_then(|v| v.as_str()) {
        return Some(message.to_string());
    }
    if let Some(message) = error.as_str() {
        return Some(message.to_string());
    }
    Some("An error occurred during streaming".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(LlmError::from_status(401, "").kind, LlmErrorKind::Auth);
        assert_eq!(LlmError::from_status(429, "").kind, LlmErrorKind::RateLimit);
        assert_eq!(LlmError::from_status(503, "").kind, LlmErrorKind::ServerError);
        assert_eq!(LlmError::from_status(400, "").kind, LlmErrorKind::InvalidRequest);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(LlmError::network("reset").is_retryable());
        assert!(LlmError::from_status(502, "").is_retryable());
        assert!(!LlmError::auth("no key").is_retryable());
        assert!(!LlmError::decode("bad json").is_retryable());
    }

    #[test]
    fn test_api_error_message_extracted() {
        let body = r#"{"error": {"message": "model not found", "type": "invalid_request_error"}}"#;
        let err = LlmError::from_status(404, body);
        assert_eq!(err.message, "HTTP 404: model not found");

        assert_eq!(
            extract_api_error_message(r#"{"error": "quota exceeded"}"#).as_deref(),
            Some("quota exceeded")
        );
        assert!(extract_api_error_message("not json").is_none());
    }
}
