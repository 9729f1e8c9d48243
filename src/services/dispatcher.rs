//! Run summary composition and delivery.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{Outcome, RunResult};
use crate::utils::http::with_deadline;
use crate::utils::retry::RetryPolicy;
use crate::utils::{collapse_whitespace, truncate_graphemes};

/// Longest snippet shown per match.
const SNIPPET_LIMIT: usize = 240;

/// Longest section excerpt shown per rule hit.
const EXCERPT_LIMIT: usize = 1200;

/// A composed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub subject: String,
    pub body: String,
}

/// Mail delivery capability.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> Result<()>;
}

/// Composes one summary per run and hands it to a [`MailTransport`].
pub struct NotificationDispatcher {
    transport: Arc<dyn MailTransport>,
    subject: String,
    retry: RetryPolicy,
    timeout_ms: u64,
}

impl NotificationDispatcher {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        subject: impl Into<String>,
        retry: RetryPolicy,
        timeout_ms: u64,
    ) -> Self {
        Self {
            transport,
            subject: subject.into(),
            retry,
            timeout_ms,
        }
    }

    /// Build the message for `result`. Never empty: a run with nothing to
    /// report still says so.
    pub fn compose(&self, result: &RunResult) -> OutgoingMessage {
        let subject = format!("{} {}", self.subject, result.run_date.format("%d/%m/%Y"));
        OutgoingMessage {
            subject,
            body: render_body(result),
        }
    }

    /// Deliver the summary of `result`, retrying transient transport
    /// failures. Exhausted retries end in [`Outcome::Failed`].
    pub async fn dispatch(&self, result: &RunResult) -> Outcome {
        let message = self.compose(result);
        let sent = self
            .retry
            .run("notification", || {
                with_deadline("mail delivery", self.timeout_ms, self.transport.send(&message))
            })
            .await;

        match sent {
            Ok(()) => {
                log::info!("Notification sent: {}", message.subject);
                Outcome::Sent
            }
            Err(e) => {
                let error = AppError::Dispatch(e.to_string());
                log::error!("{}", error);
                Outcome::Failed {
                    reason: error.to_string(),
                }
            }
        }
    }
}

fn render_body(result: &RunResult) -> String {
    let mut lines: Vec<String> = vec![
        format!("Run date: {}", result.run_date),
        format!("Documents scanned: {}", result.documents_scanned),
        String::new(),
    ];

    if result.documents_scanned == 0 && result.errors.is_empty() {
        lines.push("No publications found for this date.".to_string());
    }

    if result.matches.is_empty() {
        lines.push("No matches for the configured search terms.".to_string());
    } else {
        lines.push(format!("Matches ({}):", result.matches.len()));
        for reference in result.matched_references() {
            lines.push(String::new());
            lines.push(reference.title.clone());
            lines.push(reference.source_url.clone());
            for record in result
                .matches
                .iter()
                .filter(|r| r.reference.source_url == reference.source_url)
            {
                let page = record
                    .page_number
                    .map(|p| format!("[p.{p}] "))
                    .unwrap_or_default();
                let snippet = truncate_graphemes(&collapse_whitespace(&record.context_snippet), SNIPPET_LIMIT);
                lines.push(format!("  {}{}: …{}…", page, record.term, snippet));
            }
        }
    }

    for section in &result.sections {
        lines.push(String::new());
        lines.push(format!(
            "[{}] {} (p.{})",
            section.rule, section.reference.title, section.page_number
        ));
        lines.push(truncate_graphemes(&section.text, EXCERPT_LIMIT));
        if !section.names.is_empty() {
            lines.push(format!("Names: {}", section.names.join(", ")));
        }
    }

    lines.push(String::new());
    lines.push(format!("Errors: {}", result.errors.len()));
    for error in &result.errors {
        lines.push(match &error.reference {
            Some(reference) => format!("  - [{}] {}: {}", error.stage, reference.title, error.message),
            None => format!("  - [{}] {}", error.stage, error.message),
        });
    }

    let mut body = lines.join("\n");
    body.push('\n');
    body
}
