// src/error.rs

//! Unified error handling for the gazette scanner.

use std::fmt;

use thiserror::Error;

/// Result type alias for gazette operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Regular expression failed to compile
    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The index page could not be reached or read
    #[error("Navigation error for {url}: {message}")]
    Navigation { url: String, message: String },

    /// A single publication could not be downloaded
    #[error("Download error for {url}: {message}")]
    Download { url: String, message: String },

    /// A downloaded publication could not be opened as a PDF
    #[error("Extraction error for {url}: {message}")]
    Extraction { url: String, message: String },

    /// The notification could not be delivered
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Mail transport failure
    #[error("Mail error: {message}")]
    Mail { message: String, transient: bool },

    /// A network-facing call exceeded its deadline
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout { operation: String, after_ms: u64 },

    /// Another run is already in progress
    #[error("A run is already in progress")]
    RunInProgress,
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a navigation error.
    pub fn navigation(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a download error.
    pub fn download(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Download {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create an extraction error.
    pub fn extraction(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Extraction {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a mail transport error.
    pub fn mail(message: impl fmt::Display, transient: bool) -> Self {
        Self::Mail {
            message: message.to_string(),
            transient,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, after_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after_ms,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Mail { transient, .. } => *transient,
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s.is_server_error() || s == reqwest::StatusCode::TOO_MANY_REQUESTS
                    })
            }
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AppError::timeout("navigate", 10).is_transient());
        assert!(AppError::mail("421 try later", true).is_transient());
        assert!(!AppError::mail("535 bad credentials", false).is_transient());
        assert!(!AppError::download("https://x/a.pdf", "not a PDF").is_transient());
        assert!(!AppError::config("missing").is_transient());
    }

    #[test]
    fn test_display_includes_context() {
        let err = AppError::navigation("https://example.com", "connection refused");
        assert_eq!(
            err.to_string(),
            "Navigation error for https://example.com: connection refused"
        );
    }
}
