//! Publication index enumeration and PDF download.
//!
//! The fetcher works on a session the caller opened: it loads the index page,
//! turns links into [`PublicationReference`]s and then yields downloaded
//! documents one at a time as a stream.
//!
//! The index opens on the newest year's calendar. Any other year is reached
//! by posting the page's year form, CSRF token included, on the same session.

use std::cmp::Reverse;

use chrono::Datelike;
use futures::stream::{self, Stream, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{IndexConfig, PageLink, PublicationReference, RawDocument, Selection};
use crate::services::{BrowserSession, YearForm, read_year_form};
use crate::utils::retry::RetryPolicy;
use crate::utils::url::{date_in_text, edition_number, file_name, publication_timestamp};

/// A publication whose download failed for good.
#[derive(Debug)]
pub struct DocumentFailure {
    pub reference: PublicationReference,
    pub error: AppError,
}

/// One item of the document stream.
pub type FetchedDocument = std::result::Result<RawDocument, DocumentFailure>;

/// Reaches the index and downloads the publications it lists.
pub struct DocumentFetcher {
    index: IndexConfig,
    retry: RetryPolicy,
}

impl DocumentFetcher {
    pub fn new(index: IndexConfig, retry: RetryPolicy) -> Self {
        Self { index, retry }
    }

    /// Load the index page and list the publications to process.
    ///
    /// Any failure here is an [`AppError::Navigation`]: without a listing
    /// there is nothing to scan. An empty listing is not an error.
    pub async fn list(
        &self,
        session: &dyn BrowserSession,
        selection: Selection,
    ) -> Result<Vec<PublicationReference>> {
        let links = self.index_links(session, selection.year()).await?;
        let references = select_references(&links, selection, self.index.max_documents);
        log::info!(
            "Index lists {} links, {} selected for {}",
            links.len(),
            references.len(),
            describe(selection)
        );
        Ok(references)
    }

    /// Years the index offers, newest first, at most `max_years` of them.
    pub async fn years(&self, session: &dyn BrowserSession) -> Result<Vec<i32>> {
        let url = &self.index.url;
        self.open_index(session).await?;
        let form = self
            .year_form(session)
            .await
            .map_err(|e| AppError::navigation(url, e))?;
        if form.years.is_empty() {
            return Err(AppError::navigation(url, "index lists no publication years"));
        }
        Ok(form.years.into_iter().take(self.index.max_years).collect())
    }

    /// One year's publications, newest first, at most `max_documents`.
    pub async fn list_year(
        &self,
        session: &dyn BrowserSession,
        year: i32,
    ) -> Result<Vec<PublicationReference>> {
        let links = self.index_links(session, Some(year)).await?;
        let references = newest_first(&links, year, self.index.max_documents);
        log::info!("Year {}: {} publications", year, references.len());
        Ok(references)
    }

    async fn open_index(&self, session: &dyn BrowserSession) -> Result<()> {
        let url = &self.index.url;
        self.retry
            .run("index navigation", || session.navigate(url))
            .await
            .map_err(|e| AppError::navigation(url, e))
    }

    /// Load the index, switch it to `year` when given, and read its links.
    async fn index_links(
        &self,
        session: &dyn BrowserSession,
        year: Option<i32>,
    ) -> Result<Vec<PageLink>> {
        let url = &self.index.url;
        self.open_index(session).await?;
        if let Some(year) = year {
            self.show_year(session, year)
                .await
                .map_err(|e| AppError::navigation(url, e))?;
        }
        session
            .enumerate_links(&self.index.link_selector, self.index.link_pattern.as_deref())
            .await
            .map_err(|e| AppError::navigation(url, e))
    }

    async fn year_form(&self, session: &dyn BrowserSession) -> Result<YearForm> {
        let html = session.page_source().await?;
        read_year_form(&html, &self.index.year_field, &self.index.token_field)
    }

    /// Post the year form unless the page already shows `year`. Pages
    /// without a year form are left alone.
    async fn show_year(&self, session: &dyn BrowserSession, year: i32) -> Result<()> {
        let form = self.year_form(session).await?;
        if !form.is_present() || form.shown == Some(year) {
            return Ok(());
        }
        let token = form.token.ok_or_else(|| {
            AppError::validation(format!("index page has no {} field", self.index.token_field))
        })?;
        let fields = vec![
            (self.index.token_field.clone(), token),
            (self.index.year_field.clone(), year.to_string()),
        ];

        log::debug!("Requesting year {} from the index", year);
        self.retry
            .run("year selection", || session.submit_form(&self.index.url, &fields))
            .await?;

        if self.year_form(session).await?.shown != Some(year) {
            log::warn!("Index did not confirm it is showing {}, continuing", year);
        }
        Ok(())
    }

    /// Download `references` lazily, in order, one at a time.
    ///
    /// A failed download is yielded as a [`DocumentFailure`] and the stream
    /// moves on to the next reference.
    pub fn fetch<'a>(
        &'a self,
        session: &'a dyn BrowserSession,
        references: Vec<PublicationReference>,
    ) -> impl Stream<Item = FetchedDocument> + Send + 'a {
        stream::iter(references).then(move |reference| async move {
            let url = reference.source_url.clone();
            match self.retry.run("download", || session.download(&url)).await {
                Ok(bytes) => {
                    log::info!("Downloaded {} ({} bytes)", reference.title, bytes.len());
                    Ok(RawDocument::new(reference, bytes))
                }
                Err(error) => {
                    log::warn!("Giving up on {}: {}", url, error);
                    let error = match error {
                        AppError::Download { .. } => error,
                        other => AppError::download(&url, other),
                    };
                    Err(DocumentFailure { reference, error })
                }
            }
        })
    }
}

fn describe(selection: Selection) -> String {
    match selection {
        Selection::ByDate(date) => date.to_string(),
        Selection::Latest => "latest publication".to_string(),
    }
}

/// Build a reference from an index link. Links without a recoverable date
/// are skipped.
fn to_reference(link: &PageLink) -> Option<PublicationReference> {
    let published_at = publication_timestamp(&link.href);
    let date = published_at
        .map(|ts| ts.date())
        .or_else(|| date_in_text(&link.text))?;
    let title = if link.text.is_empty() {
        file_name(&link.href)
    } else {
        link.text.clone()
    };

    Some(PublicationReference {
        date,
        title,
        source_url: link.href.clone(),
        published_at,
        edition: edition_number(&link.href),
    })
}

/// Pick the references a run should process, preserving index order.
pub fn select_references(
    links: &[PageLink],
    selection: Selection,
    max_documents: usize,
) -> Vec<PublicationReference> {
    let dated: Vec<PublicationReference> = links.iter().filter_map(to_reference).collect();
    if dated.len() < links.len() {
        log::debug!("{} links carry no date and were skipped", links.len() - dated.len());
    }

    match selection {
        Selection::ByDate(day) => dated
            .into_iter()
            .filter(|r| r.date == day)
            .take(max_documents)
            .collect(),
        Selection::Latest => dated
            .into_iter()
            .max_by_key(|r| (r.date, r.published_at, r.edition))
            .into_iter()
            .collect(),
    }
}

/// References dated in `year`, newest first.
pub fn newest_first(links: &[PageLink], year: i32, max_documents: usize) -> Vec<PublicationReference> {
    let mut dated: Vec<PublicationReference> = links
        .iter()
        .filter_map(to_reference)
        .filter(|r| r.date.year() == year)
        .collect();
    dated.sort_by_key(|r| Reverse((r.date, r.published_at, r.edition)));
    dated.truncate(max_documents);
    dated
}
