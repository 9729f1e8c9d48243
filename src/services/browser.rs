//! Browsing capability used to reach the publication index.
//!
//! [`Browser`] opens one [`BrowserSession`] per run. The session is an owned
//! resource: whoever opens it must call [`BrowserSession::close`] on every
//! exit path (see `pipeline::run`).

use std::sync::Mutex;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{FetcherConfig, PageLink};
use crate::utils::http::{create_session_client, looks_like_pdf, with_deadline};
use crate::utils::resolve_url;
use crate::utils::url::{shown_year, unescape_embedded_urls};

/// Factory for browsing sessions.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>>;
}

/// A stateful browsing session.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Load `url` and make it the current page.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Links on the current page matching `selector`, followed by raw-HTML
    /// hits of `pattern`. Absolute, deduplicated, in page order.
    async fn enumerate_links(&self, selector: &str, pattern: Option<&str>)
    -> Result<Vec<PageLink>>;

    /// Raw HTML of the current page.
    async fn page_source(&self) -> Result<String>;

    /// Post `fields` as a urlencoded form to `url` on the same session and
    /// make the response the current page.
    async fn submit_form(&self, url: &str, fields: &[(String, String)]) -> Result<()>;

    /// Fetch a PDF.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;

    /// Release the session. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

/// HTTP-backed browser: a cookie-keeping client plus HTML parsing.
pub struct HttpBrowser {
    config: FetcherConfig,
}

impl HttpBrowser {
    pub fn new(config: FetcherConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn open(&self) -> Result<Box<dyn BrowserSession>> {
        let client = create_session_client(&self.config)?;
        log::debug!("Opened browsing session");
        Ok(Box::new(HttpSession {
            client: Some(client),
            config: self.config.clone(),
            current: Mutex::new(None),
        }))
    }
}

struct CurrentPage {
    url: url::Url,
    html: String,
}

struct HttpSession {
    client: Option<reqwest::Client>,
    config: FetcherConfig,
    current: Mutex<Option<CurrentPage>>,
}

impl HttpSession {
    fn client(&self) -> Result<&reqwest::Client> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::config("browsing session already closed"))
    }

    async fn load(&self, target: url::Url, request: reqwest::RequestBuilder) -> Result<()> {
        let html = with_deadline("navigation", self.config.navigation_timeout_ms, async move {
            let response = request.send().await?.error_for_status()?;
            Ok::<_, AppError>(response.text().await?)
        })
        .await?;

        log::debug!("Loaded {} ({} bytes)", target, html.len());
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(CurrentPage { url: target, html });
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for HttpSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        let target = url::Url::parse(url)?;
        let client = self.client()?.clone();
        let html = with_deadline("navigation", self.config.navigation_timeout_ms, async {
            let response = client.get(target.clone()).send().await?.error_for_status()?;
            Ok::<_, AppError>(response.text().await?)
        })
        .await?;

        log::debug!("Loaded {} ({} bytes)", target, html.len());
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(CurrentPage { url: target, html });
        Ok(())
    }

    async fn enumerate_links(
        &self,
        selector: &str,
        pattern: Option<&str>,
    ) -> Result<Vec<PageLink>> {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let page = current
            .as_ref()
            .ok_or_else(|| AppError::config("no page loaded"))?;
        extract_links(&page.url, &page.html, selector, pattern)
    }

    async fn page_source(&self) -> Result<String> {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current
            .as_ref()
            .map(|page| page.html.clone())
            .ok_or_else(|| AppError::config("no page loaded"))
    }

    async fn submit_form(&self, url: &str, fields: &[(String, String)]) -> Result<()> {
        let target = url::Url::parse(url)?;
        let request = self.client()?.post(target.clone()).form(fields);
        self.load(target, request).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let client = self.client()?.clone();
        with_deadline("download", self.config.download_timeout_ms, async {
            let response = client.get(url).send().await?.error_for_status()?;
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await?;
            looks_like_pdf(content_type.as_deref(), &body)
                .map_err(|message| AppError::download(url, message))?;
            Ok::<_, AppError>(body.to_vec())
        })
        .await
    }

    async fn close(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            log::debug!("Closed browsing session");
        }
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// Collect publication links from an HTML page.
pub fn extract_links(
    base: &url::Url,
    html: &str,
    selector: &str,
    pattern: Option<&str>,
) -> Result<Vec<PageLink>> {
    let sel = Selector::parse(selector).map_err(|e| AppError::selector(selector, format!("{e:?}")))?;
    let document = Html::parse_document(html);
    let mut links: Vec<PageLink> = Vec::new();

    for anchor in document.select(&sel) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let text = crate::utils::collapse_whitespace(&anchor.text().collect::<String>());
        push_unique(
            &mut links,
            PageLink {
                href: resolve_url(base, href.trim()),
                text,
            },
        );
    }

    if let Some(pattern) = pattern {
        let re = Regex::new(pattern)?;
        let normalized = unescape_embedded_urls(html);
        for hit in re.find_iter(&normalized) {
            push_unique(
                &mut links,
                PageLink {
                    href: resolve_url(base, hit.as_str()),
                    text: String::new(),
                },
            );
        }
    }

    Ok(links)
}

/// The year selector of an index page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YearForm {
    /// CSRF token to post back with the selected year
    pub token: Option<String>,
    /// Years on offer, newest first
    pub years: Vec<i32>,
    /// Year whose calendar the page is showing, when it says so
    pub shown: Option<i32>,
}

impl YearForm {
    /// Whether the page has a year selector at all.
    pub fn is_present(&self) -> bool {
        !self.years.is_empty() || self.token.is_some()
    }
}

/// Read the year form (`<select name="{year_field}">` plus the hidden
/// `token_field` input) from an index page.
pub fn read_year_form(html: &str, year_field: &str, token_field: &str) -> Result<YearForm> {
    let token_css = format!("input[name=\"{token_field}\"]");
    let option_css = format!("select[name=\"{year_field}\"] option, select#{year_field} option");
    let token_sel = Selector::parse(&token_css).map_err(|e| AppError::selector(&token_css, format!("{e:?}")))?;
    let option_sel = Selector::parse(&option_css).map_err(|e| AppError::selector(&option_css, format!("{e:?}")))?;
    let document = Html::parse_document(html);

    let token = document
        .select(&token_sel)
        .find_map(|input| input.value().attr("value"))
        .map(str::to_string);

    let mut years: Vec<i32> = Vec::new();
    let mut selected = None;
    for option in document.select(&option_sel) {
        let Some(year) = option.value().attr("value").and_then(|v| v.trim().parse::<i32>().ok()) else {
            continue;
        };
        if !years.contains(&year) {
            years.push(year);
        }
        if option.value().attr("selected").is_some() {
            selected = Some(year);
        }
    }
    years.sort_unstable_by(|a, b| b.cmp(a));

    let shown = selected.or_else(|| shown_year(&document.root_element().text().collect::<String>()));
    Ok(YearForm { token, years, shown })
}

fn push_unique(links: &mut Vec<PageLink>, link: PageLink) {
    if !links.iter().any(|l| l.href == link.href) {
        links.push(link);
    }
}
