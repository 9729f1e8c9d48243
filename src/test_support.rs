//! Fakes and fixtures shared by unit tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use crate::error::{AppError, Result};
use crate::models::{ExtractedText, ExtractionWarning, PageLink, PublicationReference, RawDocument};
use crate::services::{Browser, BrowserSession, MailTransport, OutgoingMessage, TextExtractor};

/// A small valid PDF, one page per entry, each line drawn in Courier.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let contents = pages.iter().map(|page| page_content(page)).collect();
    build_pdf(contents, false)
}

/// Like [`pdf_with_pages`], with raw bytes as the content stream of each
/// page.
pub fn pdf_with_contents(contents: Vec<Vec<u8>>) -> Vec<u8> {
    build_pdf(contents, false)
}

/// A PDF whose trailer points at an encryption dictionary lopdf cannot
/// open.
pub fn encrypted_pdf(pages: &[&str]) -> Vec<u8> {
    let contents = pages.iter().map(|page| page_content(page)).collect();
    build_pdf(contents, true)
}

/// Content stream drawing each non-empty line of `page`.
pub fn page_content(page: &str) -> Vec<u8> {
    let mut operations = Vec::new();
    for (i, line) in page.lines().filter(|l| !l.is_empty()).enumerate() {
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
        operations.push(Operation::new(
            "Td",
            vec![72.into(), (760 - 16 * i as i64).into()],
        ));
        operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
        operations.push(Operation::new("ET", vec![]));
    }
    Content { operations }.encode().unwrap()
}

fn build_pdf(contents: Vec<Vec<u8>>, encrypted: bool) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for content in contents {
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    if encrypted {
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 4,
            "R" => 4,
            "Length" => 128,
        });
        doc.trailer.set("Encrypt", encrypt_id);
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Position of the last `needle` in `haystack`.
pub fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

pub fn run_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 10, 2).unwrap()
}

/// A reference dated [`run_day`] pointing at `https://x/<name>.pdf`.
pub fn reference(name: &str) -> PublicationReference {
    PublicationReference {
        date: run_day(),
        title: name.to_string(),
        source_url: format!("https://x/{name}.pdf"),
        published_at: None,
        edition: None,
    }
}

/// An index link dated [`run_day`] for edition `edition`.
pub fn index_link(edition: u32) -> PageLink {
    dated_link(edition, run_day())
}

/// An index link for edition `edition` released at 18:00 on `date`.
pub fn dated_link(edition: u32, date: NaiveDate) -> PageLink {
    PageLink {
        href: format!(
            "https://x/diario-n-{edition}-{}-18-00-00.pdf",
            date.format("%Y-%m-%d")
        ),
        text: format!("DOE {edition}"),
    }
}

/// CSRF token the scripted index hands out.
const INDEX_TOKEN: &str = "fake-csrf-token";

/// Scripted browsing session.
///
/// Without [`FakeSession::with_year`] the index is a single page listing
/// `links` and carries no year form. With it, the index opens on the newest
/// configured year and other years are reached by posting the year form.
#[derive(Clone, Default)]
pub struct FakeSession {
    links: Vec<PageLink>,
    years: BTreeMap<i32, Vec<PageLink>>,
    documents: HashMap<String, Vec<u8>>,
    unreachable: bool,
    expired_token: bool,
    shown: Arc<Mutex<Option<i32>>>,
    posted: Arc<Mutex<Vec<i32>>>,
    /// While set, navigation never completes
    pub stalled: Arc<AtomicBool>,
    pub navigations: Arc<AtomicUsize>,
    pub downloads: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl FakeSession {
    pub fn new(links: Vec<PageLink>) -> Self {
        Self {
            links,
            ..Self::default()
        }
    }

    /// A session whose index never loads.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn with_document(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.documents.insert(url.to_string(), bytes);
        self
    }

    /// Offer `year` in the index's year form, listing `links` for it.
    pub fn with_year(mut self, year: i32, links: Vec<PageLink>) -> Self {
        self.years.insert(year, links);
        self
    }

    /// Reject every year form post as carrying a stale token.
    pub fn with_expired_token(mut self) -> Self {
        self.expired_token = true;
        self
    }

    /// Years requested through the year form, in order.
    pub fn posted_years(&self) -> Vec<i32> {
        self.posted.lock().unwrap().clone()
    }

    fn index_html(&self) -> String {
        if self.years.is_empty() {
            return "<html><body></body></html>".to_string();
        }
        let shown = *self.shown.lock().unwrap();
        let options: String = self
            .years
            .keys()
            .rev()
            .map(|year| {
                let selected = if Some(*year) == shown { " selected" } else { "" };
                format!(r#"<option value="{year}"{selected}>{year}</option>"#)
            })
            .collect();
        format!(
            r#"<html><body><form method="POST">
<input name="_token" type="hidden" value="{INDEX_TOKEN}">
<select name="ano" id="ano">{options}</select>
</form></body></html>"#
        )
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&self, _url: &str) -> Result<()> {
        self.navigations.fetch_add(1, Ordering::SeqCst);
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.unreachable {
            return Err(AppError::timeout("navigation", 10));
        }
        *self.shown.lock().unwrap() = self.years.keys().next_back().copied();
        Ok(())
    }

    async fn enumerate_links(
        &self,
        _selector: &str,
        _pattern: Option<&str>,
    ) -> Result<Vec<PageLink>> {
        if self.years.is_empty() {
            return Ok(self.links.clone());
        }
        let shown = *self.shown.lock().unwrap();
        Ok(shown
            .and_then(|year| self.years.get(&year).cloned())
            .unwrap_or_default())
    }

    async fn page_source(&self) -> Result<String> {
        Ok(self.index_html())
    }

    async fn submit_form(&self, url: &str, fields: &[(String, String)]) -> Result<()> {
        let field = |name: &str| {
            fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };
        if self.expired_token || field("_token").as_deref() != Some(INDEX_TOKEN) {
            return Err(AppError::navigation(url, "419 Page Expired"));
        }
        let year = field("ano")
            .and_then(|y| y.parse::<i32>().ok())
            .ok_or_else(|| AppError::navigation(url, "422 Unprocessable Content"))?;
        self.posted.lock().unwrap().push(year);
        *self.shown.lock().unwrap() = Some(year);
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::download(url, "404 Not Found"))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out clones of one scripted session.
pub struct FakeBrowser {
    session: Option<FakeSession>,
    pub opened: Arc<AtomicUsize>,
}

impl FakeBrowser {
    pub fn new(session: FakeSession) -> Self {
        Self {
            session: Some(session),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A browser that cannot start.
    pub fn broken() -> Self {
        Self {
            session: None,
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn open(&self) -> Result<Box<dyn BrowserSession>> {
        let session = self
            .session
            .clone()
            .ok_or_else(|| AppError::config("browser binary not found"))?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(session))
    }
}

/// Records delivered messages; the first `failures` attempts fail.
pub struct FakeTransport {
    failures: usize,
    transient: bool,
    pub attempts: AtomicUsize,
    pub sent: Mutex<Vec<OutgoingMessage>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::failing(0, true)
    }

    pub fn failing(failures: usize, transient: bool) -> Self {
        Self {
            failures,
            transient,
            attempts: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for FakeTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            let reply = if self.transient {
                "421 service not available"
            } else {
                "535 authentication rejected"
            };
            return Err(AppError::mail(reply, self.transient));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Treats documents as UTF-8 text with form feeds between pages.
/// Documents starting with `CORRUPT` fail to open.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, document: RawDocument) -> Result<ExtractedText> {
        let RawDocument { reference, bytes } = document;
        if bytes.starts_with(b"CORRUPT") {
            return Err(AppError::extraction(&reference.source_url, "invalid file header"));
        }
        let text = String::from_utf8(bytes)
            .map_err(|e| AppError::extraction(&reference.source_url, e))?;

        let mut warnings = BTreeSet::new();
        let pages: Vec<(u32, String)> = text
            .split('\x0c')
            .enumerate()
            .map(|(i, page)| {
                if page.trim().is_empty() {
                    warnings.insert(ExtractionWarning::ImageOnlyPage);
                }
                (i as u32 + 1, page.to_string())
            })
            .collect();
        Ok(ExtractedText::from_pages(reference, pages, warnings))
    }
}
