// src/utils/url.rs

//! Helpers for reading publication metadata out of URLs and link text.

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

fn timestamp_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})-(\d{2})-(\d{2})-(\d{2})\.pdf").ok())
        .as_ref()
}

fn edition_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)-n-(\d+)-").ok()).as_ref()
}

fn text_date_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").ok())
        .as_ref()
}

fn shown_year_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)mostrando o ano:\s*(\d{4})").ok())
        .as_ref()
}

/// Undo the escaping used when URLs are embedded in JavaScript or JSON.
pub fn unescape_embedded_urls(raw: &str) -> String {
    raw.replace("\\u002F", "/")
        .replace("\\u002f", "/")
        .replace("\\/", "/")
}

/// Release timestamp from a `...-YYYY-MM-DD-HH-MM-SS.pdf` file name.
pub fn publication_timestamp(url: &str) -> Option<NaiveDateTime> {
    let caps = timestamp_re()?.captures(url)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let year = i32::try_from(num(1)?).ok()?;
    NaiveDate::from_ymd_opt(year, num(2)?, num(3)?)?.and_hms_opt(num(4)?, num(5)?, num(6)?)
}

/// Edition number from a `...-n-123-...` file name.
pub fn edition_number(url: &str) -> Option<u32> {
    edition_re()?.captures(url)?.get(1)?.as_str().parse().ok()
}

/// A `dd/mm/yyyy` date inside link text.
pub fn date_in_text(text: &str) -> Option<NaiveDate> {
    let caps = text_date_re()?.captures(text)?;
    let day = caps.get(1)?.as_str().parse().ok()?;
    let month = caps.get(2)?.as_str().parse().ok()?;
    let year = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// The year an index page says it is showing ("Mostrando o ano: 2024").
pub fn shown_year(text: &str) -> Option<i32> {
    shown_year_re()?.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Last path segment of a URL, used when a link has no text.
pub fn file_name(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "https://www.mprr.mp.br/servicos/download/diario-oficial-n-1234-2024-10-02-18-30-05.pdf";

    #[test]
    fn test_unescape_embedded_urls() {
        assert_eq!(
            unescape_embedded_urls(r#"{"u":"\/servicos\/download\/a.pdf","v":"/x"}"#),
            r#"{"u":"/servicos/download/a.pdf","v":"/x"}"#
        );
    }

    #[test]
    fn test_publication_timestamp() {
        let ts = publication_timestamp(SAMPLE).unwrap();
        assert_eq!(ts.to_string(), "2024-10-02 18:30:05");
        assert_eq!(publication_timestamp("https://x/y.pdf"), None);
        assert_eq!(
            publication_timestamp("https://x/a-2024-13-40-00-00-00.pdf"),
            None
        );
    }

    #[test]
    fn test_edition_number() {
        assert_eq!(edition_number(SAMPLE), Some(1234));
        assert_eq!(edition_number("https://x/diario-N-77-a.pdf"), Some(77));
        assert_eq!(edition_number("https://x/diario.pdf"), None);
    }

    #[test]
    fn test_date_in_text() {
        assert_eq!(
            date_in_text("DOE de 2/10/2024"),
            NaiveDate::from_ymd_opt(2024, 10, 2)
        );
        assert_eq!(date_in_text("31/02/2024"), None);
        assert_eq!(date_in_text("Edição 12"), None);
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            file_name(SAMPLE),
            "diario-oficial-n-1234-2024-10-02-18-30-05.pdf"
        );
        assert_eq!(file_name("not a url"), "not a url");
    }

    #[test]
    fn test_shown_year() {
        assert_eq!(shown_year("<h4>Mostrando o ano: 2023</h4>"), Some(2023));
        assert_eq!(shown_year("MOSTRANDO O ANO:2021"), Some(2021));
        assert_eq!(shown_year("Diário Oficial 2024"), None);
    }
}
