//! Provider API error classification.
//!
//! Callers only need three distinctions:
//!
//! - **Unavailable**: non-2xx responses (other than 404), network failures and
//!   expired deadlines. Reconciliation turns these into `connection_failure`.
//! - **NotFound**: the provider answered 404 for the organization or repository.
//! - **NotInstalled**: the organization has no credentials to call with.
//!
//! Anything else (bad configuration, undecodable bodies) is passed through as
//! [`ProviderError::Other`]. Nothing is retried here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{}", describe_unavailable(.status_code, .message))]
    Unavailable {
        status_code: Option<u16>,
        message: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("organization {0} has no provider installation")]
    NotInstalled(String),

    #[error("provider error: {0}")]
    Other(String),
}

fn describe_unavailable(status_code: &Option<u16>, message: &str) -> String {
    match status_code {
        Some(code) => format!("provider unavailable (HTTP {code}): {message}"),
        None => format!("provider unavailable: {message}"),
    }
}

impl ProviderError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        ProviderError::Unavailable {
            status_code: None,
            message: message.into(),
        }
    }

    /// Classifies an HTTP error status.
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            404 => ProviderError::NotFound(message),
            _ => ProviderError::Unavailable {
                status_code: Some(status_code),
                message,
            },
        }
    }

    /// Categorizes an octocrab error. API errors carry their status; other
    /// variants are classified from their rendered message.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        if let octocrab::Error::GitHub { source, .. } = &err {
            return Self::from_status(source.status_code.as_u16(), source.message.clone());
        }
        let message = err.to_string();
        match extract_status_code(&message) {
            Some(code) => Self::from_status(code, message),
            None if is_network_error(&message) => Self::unavailable(message),
            None => ProviderError::Other(message),
        }
    }

    /// Categorizes a reqwest transport or status error.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return Self::unavailable(err.to_string());
        }
        ProviderError::Other(err.to_string())
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Unavailable { status_code, .. } => *status_code,
            ProviderError::NotFound(_) => Some(404),
            _ => None,
        }
    }
}

/// Extracts the HTTP status code from a rendered octocrab error, if present.
///
/// Only whole numeric tokens count, so ids and counts that merely contain a
/// status code's digits are not mistaken for one.
fn extract_status_code(err_str: &str) -> Option<u16> {
    if let Some(idx) = err_str.find("status: ") {
        let rest = &err_str[idx + 8..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(code) = digits.parse() {
            return Some(code);
        }
    }

    let has_code = |code: u16| {
        err_str
            .split(|c: char| !c.is_ascii_digit())
            .any(|token| token == code.to_string())
    };
    if has_code(404) && err_str.to_lowercase().contains("not found") {
        return Some(404);
    }
    [401, 403, 422, 429, 500, 502, 503, 504]
        .into_iter()
        .find(|code| has_code(*code))
}

fn is_network_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("timeout")
        || message_lower.contains("connection")
        || message_lower.contains("network")
        || message_lower.contains("dns")
        || message_lower.contains("timed out")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            ProviderError::from_status(404, "gone"),
            ProviderError::NotFound(_)
        ));
        let err = ProviderError::from_status(502, "bad gateway");
        assert!(matches!(err, ProviderError::Unavailable { .. }));
        assert_eq!(err.status_code(), Some(502));
        assert_eq!(err.to_string(), "provider unavailable (HTTP 502): bad gateway");
        assert!(matches!(
            ProviderError::from_status(401, "bad credentials"),
            ProviderError::Unavailable { status_code: Some(401), .. }
        ));
    }

    #[test]
    fn status_code_extraction() {
        assert_eq!(extract_status_code("GitHub: status: 503 Service Unavailable"), Some(503));
        assert_eq!(extract_status_code("HTTP 404: Not Found"), Some(404));
        assert_eq!(extract_status_code("API rate limit exceeded (429)"), Some(429));
        assert_eq!(extract_status_code("failed to parse body"), None);
    }

    #[test]
    fn status_code_extraction_ignores_incidental_text() {
        assert_eq!(extract_status_code("field `login` not found in payload"), None);
        assert_eq!(extract_status_code("repository 15003 has no default branch"), None);
        assert_eq!(extract_status_code("page 4040 of results"), None);
    }

    #[test]
    fn network_error_detection() {
        assert!(is_network_error("connection reset"));
        assert!(is_network_error("DNS resolution failed"));
        assert!(is_network_error("request timed out"));
        assert!(!is_network_error("invalid JSON"));
    }
}
