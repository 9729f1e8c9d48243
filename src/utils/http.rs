// src/utils/http.rs

//! HTTP client utilities.

use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::FetcherConfig;

/// Create a cookie-keeping HTTP client for one browsing session.
///
/// The client timeout is the larger of the two stage deadlines; each call
/// is additionally bounded by [`with_deadline`].
pub fn create_session_client(config: &FetcherConfig) -> Result<reqwest::Client> {
    let timeout = config.navigation_timeout_ms.max(config.download_timeout_ms);
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .cookie_store(true)
        .timeout(Duration::from_millis(timeout))
        .build()?;
    Ok(client)
}

/// Run `fut`, converting an elapsed deadline into [`AppError::Timeout`].
pub async fn with_deadline<T>(
    operation: &str,
    after_ms: u64,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(Duration::from_millis(after_ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::timeout(operation, after_ms)),
    }
}

/// Whether a response body looks like a PDF file.
pub fn looks_like_pdf(content_type: Option<&str>, body: &[u8]) -> std::result::Result<(), String> {
    if content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html")) {
        return Err("received an HTML page instead of a PDF".to_string());
    }
    if !body.starts_with(b"%PDF") {
        return Err("body does not start with %PDF".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_pdf() {
        assert!(looks_like_pdf(Some("application/pdf"), b"%PDF-1.7 ...").is_ok());
        assert!(looks_like_pdf(None, b"%PDF-1.4").is_ok());
        assert!(looks_like_pdf(Some("text/html; charset=UTF-8"), b"%PDF").is_err());
        assert!(looks_like_pdf(Some("application/octet-stream"), b"<html>").is_err());
    }

    #[tokio::test]
    async fn test_with_deadline_times_out() {
        let result: Result<()> = with_deadline("slow call", 5, async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(AppError::Timeout { after_ms: 5, .. })));
    }

    #[tokio::test]
    async fn test_with_deadline_passes_result_through() {
        let result = with_deadline("fast call", 1_000, async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
