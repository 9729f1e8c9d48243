// src/pipeline/run.rs

//! End-to-end run coordination.
//!
//! A run walks `Idle → Fetching → Processing → Aggregating → Dispatching →
//! Done`. Only a failure to list the index (or to open a browsing session at
//! all) ends in `Aborted`; per-document failures are recorded and the run
//! goes on.
//!
//! Downloads and extraction overlap: the fetch stream feeds a bounded channel
//! while the consumer extracts and matches on blocking threads.
//!
//! [`RunCoordinator::scan_back`] is a separate lookup: it walks the index
//! year by year, newest first, until one publication satisfies a section
//! rule. It sends no notification.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::error::{AppError, Result};
use crate::models::{
    Config, ExtractionWarning, MatchRecord, Outcome, PublicationReference, RawDocument, RunError,
    RunReport, RunResult, RunState, ScanBackReport, ScannedDocument, SectionExcerpt, Selection,
    Stage,
};
use crate::services::{
    Browser, BrowserSession, DocumentFailure, DocumentFetcher, FetchedDocument, MailTransport,
    NotificationDispatcher, TermMatcher, TextExtractor,
};
use crate::utils::log;
use crate::utils::retry::RetryPolicy;

const TOTAL_STEPS: usize = 4;

/// Drives one run at a time from index listing to notification.
pub struct RunCoordinator {
    browser: Arc<dyn Browser>,
    fetcher: DocumentFetcher,
    extractor: Arc<dyn TextExtractor>,
    matcher: Arc<TermMatcher>,
    dispatcher: NotificationDispatcher,
    prefetch: usize,
    running: AtomicBool,
}

impl RunCoordinator {
    pub fn new(
        config: &Config,
        browser: Arc<dyn Browser>,
        extractor: Arc<dyn TextExtractor>,
        transport: Arc<dyn MailTransport>,
    ) -> Result<Self> {
        let retry = RetryPolicy::from_config(&config.retry);
        Ok(Self {
            browser,
            fetcher: DocumentFetcher::new(config.index.clone(), retry),
            extractor,
            matcher: Arc::new(TermMatcher::new(&config.matcher)?),
            dispatcher: NotificationDispatcher::new(
                transport,
                config.mail.subject.clone(),
                retry,
                config.mail.timeout_ms,
            ),
            prefetch: config.fetcher.prefetch.max(1),
            running: AtomicBool::new(false),
        })
    }

    /// List the publications `selection` would process, without downloading.
    pub async fn list(&self, selection: Selection) -> Result<Vec<PublicationReference>> {
        let session = self.browser.open().await?;
        let listed = self.fetcher.list(session.as_ref(), selection).await;
        close_session(session).await;
        listed
    }

    /// Execute one run.
    ///
    /// Returns `Err` only when another run is in progress; every other
    /// failure is reported inside the [`RunReport`].
    pub async fn run(&self, selection: Selection) -> Result<RunReport> {
        let _running = self.try_begin()?;
        let mut states = Transitions::new();

        log::header("Gazette scan");
        states.advance(RunState::Fetching);
        log::step(1, TOTAL_STEPS, "Fetch - listing publications");

        let session = match self.browser.open().await {
            Ok(session) => session,
            Err(e) => return Ok(states.abort(e)),
        };
        let references = match self.fetcher.list(session.as_ref(), selection).await {
            Ok(references) => references,
            Err(e) => {
                close_session(session).await;
                return Ok(states.abort(e));
            }
        };

        let run_date = match selection {
            Selection::ByDate(day) => day,
            Selection::Latest => references
                .first()
                .map(|r| r.date)
                .unwrap_or_else(|| Local::now().date_naive()),
        };
        let mut result = RunResult::new(run_date);

        if references.is_empty() {
            log::sub_item("No publications listed");
        } else {
            states.advance(RunState::Processing);
            log::step(2, TOTAL_STEPS, "Process - downloading and scanning");
            self.process(session.as_ref(), references, &mut result).await;
        }
        close_session(session).await;

        states.advance(RunState::Aggregating);
        log::step(3, TOTAL_STEPS, "Aggregate");
        log_summary(&result);

        states.advance(RunState::Dispatching);
        log::step(4, TOTAL_STEPS, "Dispatch - sending notification");
        let outcome = self.dispatcher.dispatch(&result).await;

        states.advance(RunState::Done);
        Ok(RunReport {
            state: RunState::Done,
            states: states.into_inner(),
            result: Some(result),
            outcome: Some(outcome),
            abort_reason: None,
        })
    }

    /// Search back through the index for the most recent publication with
    /// a section excerpt.
    ///
    /// Years are visited newest first, publications newest first within a
    /// year, and the search stops at the first hit. Failed years and
    /// publications are recorded and skipped. `Err` means the index could
    /// not be read at all, no section rule is configured, or another run is
    /// in progress.
    pub async fn scan_back(&self) -> Result<ScanBackReport> {
        if !self.matcher.has_sections() {
            return Err(AppError::config("scan-back needs at least one section rule"));
        }
        let _running = self.try_begin()?;
        log::header("Gazette scan-back");

        let session = self.browser.open().await?;
        let report = self.search_back(session.as_ref()).await;
        close_session(session).await;
        report
    }

    async fn search_back(&self, session: &dyn BrowserSession) -> Result<ScanBackReport> {
        let years = self.fetcher.years(session).await?;
        ::log::info!("Years to search, newest first: {:?}", years);
        let total = years.len();
        let mut report = ScanBackReport::default();

        for (index, year) in years.into_iter().enumerate() {
            log::step(index + 1, total, &format!("Year {year}"));
            report.years.push(year);
            let references = match self.fetcher.list_year(session, year).await {
                Ok(references) => references,
                Err(error) => {
                    ::log::warn!("{}", error);
                    report.errors.push(RunError {
                        reference: None,
                        stage: Stage::Navigation,
                        message: error.to_string(),
                    });
                    continue;
                }
            };

            let mut documents = std::pin::pin!(self.fetcher.fetch(session, references));
            while let Some(item) = documents.next().await {
                let document = match item {
                    Ok(document) => document,
                    Err(DocumentFailure { reference, error }) => {
                        report.errors.push(RunError {
                            reference: Some(reference),
                            stage: Stage::Download,
                            message: error.to_string(),
                        });
                        continue;
                    }
                };
                let reference = document.reference.clone();
                match self.examine(document).await {
                    Ok(scanned) => {
                        report.documents_scanned += 1;
                        if let Some(excerpt) = scanned.sections.into_iter().next() {
                            log::sub_item(&format!(
                                "{} - [{}] on page {}",
                                reference.title, excerpt.rule, excerpt.page_number
                            ));
                            report.found = Some(excerpt);
                            return Ok(report);
                        }
                    }
                    Err(error) => {
                        ::log::warn!("{}", error);
                        report.errors.push(RunError {
                            reference: Some(reference),
                            stage: Stage::Extraction,
                            message: error.to_string(),
                        });
                    }
                }
            }
        }

        ::log::info!(
            "No publication in {} years satisfies a section rule",
            report.years.len()
        );
        Ok(report)
    }

    fn try_begin(&self) -> Result<RunningGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AppError::RunInProgress)?;
        Ok(RunningGuard(&self.running))
    }

    /// Download, extract and match every reference, appending to `result`
    /// in enumeration order.
    async fn process(
        &self,
        session: &dyn BrowserSession,
        references: Vec<PublicationReference>,
        result: &mut RunResult,
    ) {
        let total = references.len();
        let (tx, mut rx) = mpsc::channel::<FetchedDocument>(self.prefetch);

        let producer = async move {
            let mut documents = std::pin::pin!(self.fetcher.fetch(session, references));
            while let Some(item) = documents.next().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        };

        let consumer = async {
            let mut position = 0;
            while let Some(item) = rx.recv().await {
                position += 1;
                self.scan(item, position, total, result).await;
            }
        };

        tokio::join!(producer, consumer);
    }

    async fn scan(
        &self,
        item: FetchedDocument,
        position: usize,
        total: usize,
        result: &mut RunResult,
    ) {
        let document = match item {
            Ok(document) => document,
            Err(DocumentFailure { reference, error }) => {
                log::sub_item(&format!(
                    "[{position}/{total}] {} - download failed",
                    reference.title
                ));
                result.errors.push(RunError {
                    reference: Some(reference),
                    stage: Stage::Download,
                    message: error.to_string(),
                });
                return;
            }
        };

        let reference = document.reference.clone();
        let digest = document.digest();
        let scanned = self.examine(document).await;

        match scanned {
            Ok(scanned) => {
                log::sub_item(&format!(
                    "[{position}/{total}] {} - {} pages, {} matches",
                    reference.title,
                    scanned.page_count,
                    scanned.matches.len()
                ));
                result.documents_scanned += 1;
                result.matches.extend(scanned.matches);
                result.sections.extend(scanned.sections);
                result.documents.push(ScannedDocument {
                    reference,
                    digest,
                    page_count: scanned.page_count,
                    warnings: scanned.warnings,
                });
            }
            Err(error) => {
                log::sub_item(&format!(
                    "[{position}/{total}] {} - extraction failed",
                    reference.title
                ));
                ::log::warn!("{}", error);
                result.errors.push(RunError {
                    reference: Some(reference),
                    stage: Stage::Extraction,
                    message: error.to_string(),
                });
            }
        }
    }

    /// Extract and match one document on a blocking thread.
    async fn examine(&self, document: RawDocument) -> Result<Scanned> {
        let url = document.reference.source_url.clone();
        let extractor = Arc::clone(&self.extractor);
        let matcher = Arc::clone(&self.matcher);

        tokio::task::spawn_blocking(move || -> Result<Scanned> {
            let text = extractor.extract(document)?;
            Ok(Scanned {
                page_count: text.page_count,
                matches: matcher.find_matches(&text),
                sections: matcher.find_sections(&text),
                warnings: text.warnings,
            })
        })
        .await
        .map_err(|e| AppError::extraction(&url, e))?
    }
}

/// Per-document output of the blocking scan.
struct Scanned {
    page_count: usize,
    matches: Vec<MatchRecord>,
    sections: Vec<SectionExcerpt>,
    warnings: BTreeSet<ExtractionWarning>,
}

/// Clears the running flag when the run ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// State history of one run.
struct Transitions(Vec<RunState>);

impl Transitions {
    fn new() -> Self {
        Self(vec![RunState::Idle])
    }

    fn current(&self) -> RunState {
        self.0.last().copied().unwrap_or(RunState::Idle)
    }

    fn advance(&mut self, next: RunState) {
        let current = self.current();
        debug_assert!(
            current.can_transition_to(next),
            "illegal transition {current} -> {next}"
        );
        ::log::info!("Run state: {} -> {}", current, next);
        self.0.push(next);
    }

    fn abort(mut self, reason: AppError) -> RunReport {
        ::log::error!("Run aborted: {}", reason);
        self.advance(RunState::Aborted);
        RunReport {
            state: RunState::Aborted,
            states: self.0,
            result: None,
            outcome: None,
            abort_reason: Some(reason.to_string()),
        }
    }

    fn into_inner(self) -> Vec<RunState> {
        self.0
    }
}

async fn close_session(mut session: Box<dyn BrowserSession>) {
    if let Err(e) = session.close().await {
        ::log::warn!("Closing browsing session failed: {}", e);
    }
}

fn log_summary(result: &RunResult) {
    log::summary(
        "Run",
        &[
            ("date", result.run_date.to_string()),
            ("documents", result.documents_scanned.to_string()),
            ("matches", result.matches.len().to_string()),
            ("sections", result.sections.len().to_string()),
            ("errors", result.errors.len().to_string()),
        ],
    );
}

/// Whether a finished report should make the process exit non-zero.
pub fn is_failure(report: &RunReport) -> bool {
    report.is_aborted()
}

/// Short human-readable line for a finished report.
pub fn describe_outcome(report: &RunReport) -> String {
    match (&report.state, &report.outcome) {
        (RunState::Aborted, _) => format!(
            "Run aborted: {}",
            report.abort_reason.as_deref().unwrap_or("unknown reason")
        ),
        (_, Some(Outcome::Sent)) => "Run complete, notification sent".to_string(),
        (_, Some(Outcome::Failed { reason })) => {
            format!("Run complete, notification failed: {reason}")
        }
        (_, None) => "Run complete".to_string(),
    }
}
