// src/models/mod.rs

//! Domain models for the gazette scanner.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod matches;
mod publication;
mod run;
mod text;

// Re-export all public types
pub use config::{
    Config, FetcherConfig, IndexConfig, LoggingConfig, MailConfig, MailTls, MatcherConfig,
    RetryConfig, SectionRule,
};
pub use matches::{MatchRecord, SectionExcerpt};
pub use publication::{PublicationReference, RawDocument};
pub use run::{
    Outcome, RunError, RunReport, RunResult, RunState, ScanBackReport, ScannedDocument, Selection, Stage,
};
pub use text::{ExtractedText, ExtractionWarning, PageSpan};

/// A link found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    /// Absolute URL
    pub href: String,
    /// Trimmed anchor text, empty for links found outside anchors
    pub text: String,
}
