//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Where the publication index lives and how links are recognised
    #[serde(default)]
    pub index: IndexConfig,

    /// HTTP session and timeout settings
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Retry policy shared by every I/O stage
    #[serde(default)]
    pub retry: RetryConfig,

    /// Search terms and section rules
    #[serde(default)]
    pub matcher: MatcherConfig,

    /// Notification delivery
    #[serde(default)]
    pub mail: MailConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply `GAZETTE_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("GAZETTE_INDEX_URL") {
            self.index.url = url;
        }
        if let Some(terms) = lookup("GAZETTE_SEARCH_TERMS") {
            self.matcher.search_terms = terms
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Some(limit) = lookup("GAZETTE_RETRY_LIMIT") {
            self.retry.retry_limit = parse_number("GAZETTE_RETRY_LIMIT", &limit)?;
        }
        if let Some(years) = lookup("GAZETTE_MAX_YEARS") {
            self.index.max_years = parse_number("GAZETTE_MAX_YEARS", &years)?;
        }
        if let Some(documents) = lookup("GAZETTE_MAX_DOCUMENTS") {
            self.index.max_documents = parse_number("GAZETTE_MAX_DOCUMENTS", &documents)?;
        }
        Ok(())
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.index.url)
            .map_err(|e| AppError::validation(format!("index.url is invalid: {e}")))?;
        if self.index.link_selector.trim().is_empty() {
            return Err(AppError::validation("index.link_selector is empty"));
        }
        scraper::Selector::parse(&self.index.link_selector)
            .map_err(|e| AppError::selector(&self.index.link_selector, format!("{e:?}")))?;
        if let Some(pattern) = &self.index.link_pattern {
            regex::Regex::new(pattern)?;
        }
        if self.index.max_documents == 0 {
            return Err(AppError::validation("index.max_documents must be > 0"));
        }
        if self.index.max_years == 0 {
            return Err(AppError::validation("index.max_years must be > 0"));
        }
        if self.index.year_field.trim().is_empty() || self.index.token_field.trim().is_empty() {
            return Err(AppError::validation("index year and token field names must be set"));
        }
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if self.fetcher.navigation_timeout_ms == 0 || self.fetcher.download_timeout_ms == 0 {
            return Err(AppError::validation("fetcher timeouts must be > 0"));
        }
        if self.fetcher.prefetch == 0 {
            return Err(AppError::validation("fetcher.prefetch must be > 0"));
        }
        if self.matcher.search_terms.iter().all(|t| t.trim().is_empty())
            && self.matcher.sections.is_empty()
        {
            return Err(AppError::validation(
                "No search terms or section rules defined",
            ));
        }
        for rule in &self.matcher.sections {
            if rule.start.trim().is_empty() || rule.end.trim().is_empty() {
                return Err(AppError::validation(format!(
                    "Section rule '{}' needs both start and end markers",
                    rule.name
                )));
            }
        }
        if self.mail.smtp_host.trim().is_empty() {
            return Err(AppError::validation("mail.smtp_host is empty"));
        }
        if self.mail.to.is_empty() {
            return Err(AppError::validation("mail.to has no recipients"));
        }
        if self.mail.timeout_ms == 0 {
            return Err(AppError::validation("mail.timeout_ms must be > 0"));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::config(format!("{key} is not a number: {value}")))
}

/// Publication index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// URL of the gazette index page
    #[serde(default = "defaults::index_url")]
    pub url: String,

    /// CSS selector for anchors pointing at publications
    #[serde(default = "defaults::link_selector")]
    pub link_selector: String,

    /// Regex for publication URLs embedded in raw HTML or scripts
    #[serde(default = "defaults::link_pattern")]
    pub link_pattern: Option<String>,

    /// Upper bound on publications processed in one run, or per year when
    /// searching back
    #[serde(default = "defaults::max_documents")]
    pub max_documents: usize,

    /// Name of the index form field that selects the calendar year
    #[serde(default = "defaults::year_field")]
    pub year_field: String,

    /// Name of the hidden CSRF token field posted with the year
    #[serde(default = "defaults::token_field")]
    pub token_field: String,

    /// How many years a scan-back visits, newest first
    #[serde(default = "defaults::max_years")]
    pub max_years: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: defaults::index_url(),
            link_selector: defaults::link_selector(),
            link_pattern: defaults::link_pattern(),
            max_documents: defaults::max_documents(),
            year_field: defaults::year_field(),
            token_field: defaults::token_field(),
            max_years: defaults::max_years(),
        }
    }
}

/// HTTP session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Deadline for loading the index page
    #[serde(default = "defaults::navigation_timeout")]
    pub navigation_timeout_ms: u64,

    /// Deadline for downloading one publication
    #[serde(default = "defaults::download_timeout")]
    pub download_timeout_ms: u64,

    /// How many downloaded publications may wait for extraction
    #[serde(default = "defaults::prefetch")]
    pub prefetch: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            navigation_timeout_ms: defaults::navigation_timeout(),
            download_timeout_ms: defaults::download_timeout(),
            prefetch: defaults::prefetch(),
        }
    }
}

/// Retry settings for navigation, downloads and mail delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "defaults::retry_limit")]
    pub retry_limit: u32,

    /// First backoff delay; doubles on each retry
    #[serde(default = "defaults::backoff_base")]
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_limit: defaults::retry_limit(),
            backoff_base_ms: defaults::backoff_base(),
        }
    }
}

/// Matching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Terms searched case-insensitively in every publication
    #[serde(default = "defaults::search_terms")]
    pub search_terms: Vec<String>,

    /// Characters of context kept on each side of a match
    #[serde(default = "defaults::context_chars")]
    pub context_chars: usize,

    /// Marker-delimited excerpts to capture
    #[serde(default = "defaults::sections")]
    pub sections: Vec<SectionRule>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            search_terms: defaults::search_terms(),
            context_chars: defaults::context_chars(),
            sections: defaults::sections(),
        }
    }
}

/// Capture the text between two markers on pages that mention every
/// `require` phrase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SectionRule {
    pub name: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub require: Vec<String>,
    #[serde(default)]
    pub extract_names: bool,
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MailTls {
    /// TLS from the first byte (port 465)
    #[default]
    Implicit,
    /// Plain connection upgraded with STARTTLS (port 587)
    Starttls,
}

/// Mail delivery settings. Credentials are read from the environment
/// variables named here, never from the file itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "defaults::smtp_host")]
    pub smtp_host: String,

    #[serde(default = "defaults::smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub tls: MailTls,

    /// Sender address; defaults to the account identity
    #[serde(default)]
    pub from: Option<String>,

    #[serde(default)]
    pub to: Vec<String>,

    #[serde(default = "defaults::subject")]
    pub subject: String,

    #[serde(default = "defaults::mail_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "defaults::user_env")]
    pub user_env: String,

    #[serde(default = "defaults::pass_env")]
    pub pass_env: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: defaults::smtp_host(),
            smtp_port: defaults::smtp_port(),
            tls: MailTls::default(),
            from: None,
            to: Vec::new(),
            subject: defaults::subject(),
            timeout_ms: defaults::mail_timeout(),
            user_env: defaults::user_env(),
            pass_env: defaults::pass_env(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use super::SectionRule;

    // Index defaults
    pub fn index_url() -> String {
        "https://www.mprr.mp.br/servicos/diario".into()
    }
    pub fn link_selector() -> String {
        "a.fc-day-grid-event".into()
    }
    pub fn link_pattern() -> Option<String> {
        Some(r#"(?i)(?:https?://[^"'<>\s]+)?/servicos/download/[^"'<>\s]+?\.pdf"#.into())
    }
    pub fn max_documents() -> usize {
        120
    }
    pub fn year_field() -> String {
        "ano".into()
    }
    pub fn token_field() -> String {
        "_token".into()
    }
    pub fn max_years() -> usize {
        20
    }

    // Fetcher defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; gazette/0.1)".into()
    }
    pub fn navigation_timeout() -> u64 {
        60_000
    }
    pub fn download_timeout() -> u64 {
        90_000
    }
    pub fn prefetch() -> usize {
        2
    }

    // Retry defaults
    pub fn retry_limit() -> u32 {
        3
    }
    pub fn backoff_base() -> u64 {
        500
    }

    // Matcher defaults
    pub fn search_terms() -> Vec<String> {
        vec!["Nomear".into(), "licitação".into()]
    }
    pub fn context_chars() -> usize {
        80
    }
    pub fn sections() -> Vec<SectionRule> {
        vec![SectionRule {
            name: "nomeacao".into(),
            start: "Nomear".into(),
            end: "Procurador-Geral de Justiça".into(),
            require: vec!["IV Concurso Público".into()],
            extract_names: true,
        }]
    }

    // Mail defaults
    pub fn smtp_host() -> String {
        "smtp.gmail.com".into()
    }
    pub fn smtp_port() -> u16 {
        465
    }
    pub fn subject() -> String {
        "Resultado Diário - Diário Oficial".into()
    }
    pub fn mail_timeout() -> u64 {
        30_000
    }
    pub fn user_env() -> String {
        "EMAIL_USER".into()
    }
    pub fn pass_env() -> String {
        "EMAIL_PASS".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.mail.to = vec!["ops@example.com".to_string()];
        config
    }

    #[test]
    fn validate_default_with_recipient_ok() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_recipients() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_index_url() {
        let mut config = valid_config();
        config.index.url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_prefetch() {
        let mut config = valid_config();
        config.fetcher.prefetch = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_nothing_to_search() {
        let mut config = valid_config();
        config.matcher.search_terms = vec!["  ".to_string()];
        config.matcher.sections.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[index]
url = "https://gazette.example/index"

[retry]
retry_limit = 5

[matcher]
search_terms = ["edital"]

[mail]
to = ["a@example.com"]
tls = "starttls"
smtp_port = 587
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.index.url, "https://gazette.example/index");
        assert_eq!(config.index.link_selector, "a.fc-day-grid-event");
        assert_eq!(config.retry.retry_limit, 5);
        assert_eq!(config.retry.backoff_base_ms, 500);
        assert_eq!(config.matcher.search_terms, vec!["edital".to_string()]);
        assert_eq!(config.mail.tls, MailTls::Starttls);
        assert_eq!(config.mail.smtp_port, 587);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_or_default_falls_back() {
        let config = Config::load_or_default("/definitely/not/here.toml");
        assert_eq!(config.index.url, defaults::index_url());
    }

    #[test]
    fn env_overrides_replace_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GAZETTE_INDEX_URL", "https://other.example/diario"),
            ("GAZETTE_SEARCH_TERMS", "edital, , pregão "),
            ("GAZETTE_RETRY_LIMIT", "7"),
            ("GAZETTE_MAX_YEARS", "3"),
        ]);
        let mut config = Config::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.index.url, "https://other.example/diario");
        assert_eq!(config.matcher.search_terms, vec!["edital", "pregão"]);
        assert_eq!(config.retry.retry_limit, 7);
        assert_eq!(config.index.max_years, 3);
        assert_eq!(config.index.max_documents, 120);
    }

    #[test]
    fn validate_rejects_zero_max_years() {
        let mut config = valid_config();
        config.index.max_years = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_override_rejects_bad_retry_limit() {
        let mut config = Config::default();
        let result = config.apply_overrides(|k| {
            (k == "GAZETTE_RETRY_LIMIT").then(|| "many".to_string())
        });
        assert!(result.is_err());
    }
}
