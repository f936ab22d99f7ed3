use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GeminiError>;

#[derive(Debug, Error)]
pub enum GeminiError {
    /// 503 UNAVAILABLE: the model is temporarily saturated. Retryable after a wait.
    #[error("model overloaded: {0}")]
    Overloaded(String),

    /// 429 RESOURCE_EXHAUSTED on the current api key. Retryable on another key.
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    /// 429 naming the billing restriction: the feature needs a paid-tier key.
    #[error("requires a paid api key: {0}")]
    PaidTierRequired(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),

    #[error("empty response from model")]
    EmptyResponse,

    #[error("file processing failed: {0}")]
    FileFailed(String),

    #[error("file processing timed out after {0:?}")]
    FileTimeout(Duration),
}

impl GeminiError {
    pub fn is_overloaded(&self) -> bool {
        matches!(self, Self::Overloaded(_))
    }

    /// True for errors resolved by switching to a different api key.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExhausted(_) | Self::PaidTierRequired(_))
    }

    pub fn is_paid_tier(&self) -> bool {
        matches!(self, Self::PaidTierRequired(_))
    }
}

impl From<reqwest::Error> for GeminiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for GeminiError {
    fn from(e: serde_json::Error) -> Self {
        Self::ResponseFormat(e.to_string())
    }
}

/// Map a non-2xx API response to its error class.
///
/// The free-tier restriction surfaces as a 429 whose body names the billing
/// requirement rather than a per-minute quota, so the body text decides
/// between the two 429 cases.
pub(crate) fn classify_api_error(status: reqwest::StatusCode, body: &str) -> GeminiError {
    match status.as_u16() {
        503 => GeminiError::Overloaded(format!("status={status} body={body}")),
        429 => {
            let lowered = body.to_ascii_lowercase();
            if lowered.contains("billed users") || lowered.contains("free tier") {
                GeminiError::PaidTierRequired(format!("status={status} body={body}"))
            } else {
                GeminiError::QuotaExhausted(format!("status={status} body={body}"))
            }
        }
        400 => GeminiError::InvalidInput(format!("status={status} body={body}")),
        _ => GeminiError::Http(format!("status={status} body={body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_503_classifies_as_overloaded() {
        let e = classify_api_error(
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
            r#"{"error":{"code":503,"status":"UNAVAILABLE"}}"#,
        );
        assert!(e.is_overloaded());
        assert!(!e.is_quota());
    }

    #[test]
    fn status_429_classifies_as_quota() {
        let e = classify_api_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED","message":"Quota exceeded"}}"#,
        );
        assert!(e.is_quota());
        assert!(!e.is_paid_tier());
    }

    #[test]
    fn status_429_with_billing_message_classifies_as_paid_tier() {
        let e = classify_api_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "Image generation is only accessible to billed users at this time.",
        );
        assert!(e.is_paid_tier());
        assert!(e.is_quota());
    }
}
