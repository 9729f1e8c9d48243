//! Service layer for the gazette scanner.
//!
//! This module contains the pipeline stages:
//! - Index browsing (`Browser`, `HttpBrowser`)
//! - Publication listing and download (`DocumentFetcher`)
//! - PDF text extraction (`PdfTextExtractor`)
//! - Term and section matching (`TermMatcher`)
//! - Notification delivery (`NotificationDispatcher`)

mod browser;
mod dispatcher;
mod extractor;
mod fetcher;
mod mailer;
mod matcher;

pub use browser::{Browser, BrowserSession, HttpBrowser, YearForm, extract_links, read_year_form};
pub use dispatcher::{MailTransport, NotificationDispatcher, OutgoingMessage};
pub use extractor::{PdfTextExtractor, TextExtractor};
pub use fetcher::{DocumentFailure, DocumentFetcher, FetchedDocument, select_references};
#[cfg(feature = "smtp")]
pub use mailer::SmtpMailer;
pub use mailer::{MailCredentials, StdoutTransport};
pub use matcher::{TermMatcher, extract_names};
