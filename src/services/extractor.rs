//! PDF text extraction.
//!
//! Extraction never fails because of a bad page: unreadable or blank pages
//! become warnings and contribute no text. A file whose tail is cut off or
//! padded is reopened from its last `startxref` and flagged as truncated.
//! Only a file that cannot be opened at all is an error.

use std::collections::BTreeSet;

use crate::error::{AppError, Result};
use crate::models::{ExtractedText, ExtractionWarning, RawDocument};

/// Turns a downloaded document into text. Called from a blocking thread.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, document: RawDocument) -> Result<ExtractedText>;
}

/// `lopdf`-based extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, document: RawDocument) -> Result<ExtractedText> {
        let RawDocument { reference, bytes } = document;
        let mut warnings = BTreeSet::new();

        let mut pdf = match lopdf::Document::load_mem(&bytes) {
            Ok(pdf) => pdf,
            Err(e) => {
                let repaired = repair_tail(&bytes)
                    .and_then(|repaired| lopdf::Document::load_mem(&repaired).ok())
                    .ok_or_else(|| AppError::extraction(&reference.source_url, e))?;
                warnings.insert(ExtractionWarning::Truncated);
                repaired
            }
        };

        if pdf.is_encrypted() {
            pdf.decrypt("").map_err(|e| {
                AppError::extraction(&reference.source_url, format!("document is encrypted: {e}"))
            })?;
        }

        let mut pages = Vec::new();
        for (number, _) in pdf.get_pages() {
            let text = match pdf.extract_text(&[number]) {
                Ok(text) if text.trim().is_empty() => {
                    warnings.insert(ExtractionWarning::ImageOnlyPage);
                    String::new()
                }
                Ok(text) => text.trim_end().to_string(),
                Err(e) => {
                    log::debug!(
                        "Page {} of {} unreadable: {}",
                        number,
                        reference.source_url,
                        e
                    );
                    warnings.insert(ExtractionWarning::CorruptStream);
                    String::new()
                }
            };
            pages.push((number, text));
        }

        if !warnings.is_empty() {
            log::warn!("{}: text may be incomplete ({:?})", reference.title, warnings);
        }
        Ok(ExtractedText::from_pages(reference, pages, warnings))
    }
}

/// Cut the file right after the offset that follows its last `startxref`
/// and close it with a fresh `%%EOF`. `None` when there is no usable
/// `startxref`, i.e. the cross-reference table itself is gone.
fn repair_tail(bytes: &[u8]) -> Option<Vec<u8>> {
    const KEYWORD: &[u8] = b"startxref";
    let at = bytes.windows(KEYWORD.len()).rposition(|w| w == KEYWORD)?;
    let after = at + KEYWORD.len();
    let rest = &bytes[after..];
    let blank = rest.iter().take_while(|b| b.is_ascii_whitespace()).count();
    let digits = rest[blank..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }

    let mut repaired = bytes[..after + blank + digits].to_vec();
    repaired.extend_from_slice(b"\n%%EOF\n");
    Some(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        encrypted_pdf, page_content, pdf_with_contents, pdf_with_pages, reference, rfind,
    };

    #[test]
    fn test_extracts_pages_in_order() {
        let bytes = pdf_with_pages(&["Hello World", "Second page"]);
        let text = PdfTextExtractor::new()
            .extract(RawDocument::new(reference("a"), bytes))
            .unwrap();

        assert_eq!(text.page_count, 2);
        assert!(text.is_complete(), "warnings: {:?}", text.warnings);
        let hello = text.text.find("Hello World").unwrap();
        let second = text.text.find("Second page").unwrap();
        assert!(hello < second);
        let second_chars = text.text[..second].chars().count();
        assert_eq!(text.page_at(second_chars), Some(2));
    }

    #[test]
    fn test_blank_page_is_flagged_not_fatal() {
        let bytes = pdf_with_pages(&["Texto", ""]);
        let text = PdfTextExtractor::new()
            .extract(RawDocument::new(reference("a"), bytes))
            .unwrap();

        assert_eq!(text.page_count, 2);
        assert!(text.warnings.contains(&ExtractionWarning::ImageOnlyPage));
        assert!(text.text.contains("Texto"));
    }

    #[test]
    fn test_garbage_is_an_extraction_error() {
        let result = PdfTextExtractor::new().extract(RawDocument::new(
            reference("broken"),
            b"%PDF-1.4 this is not really a pdf".to_vec(),
        ));
        assert!(matches!(result, Err(AppError::Extraction { .. })));
    }

    #[test]
    fn test_missing_eof_is_recovered_as_truncated() {
        let mut bytes = pdf_with_pages(&["Texto completo"]);
        let eof = rfind(&bytes, b"%%EOF").unwrap();
        bytes.truncate(eof);
        assert!(lopdf::Document::load_mem(&bytes).is_err());

        let text = PdfTextExtractor::new()
            .extract(RawDocument::new(reference("cut"), bytes))
            .unwrap();

        assert_eq!(text.page_count, 1);
        assert!(text.text.contains("Texto completo"));
        assert_eq!(
            text.warnings,
            BTreeSet::from([ExtractionWarning::Truncated])
        );
    }

    #[test]
    fn test_trailing_padding_is_recovered_as_truncated() {
        let mut bytes = pdf_with_pages(&["Primeira", "Segunda"]);
        bytes.extend(std::iter::repeat_n(b'\n', 2048));

        let text = PdfTextExtractor::new()
            .extract(RawDocument::new(reference("padded"), bytes))
            .unwrap();

        assert_eq!(text.page_count, 2);
        assert!(text.text.contains("Segunda"));
        assert!(text.warnings.contains(&ExtractionWarning::Truncated));
    }

    #[test]
    fn test_file_cut_before_xref_is_an_error() {
        let mut bytes = pdf_with_pages(&["Texto"]);
        let xref = rfind(&bytes, b"startxref").unwrap();
        bytes.truncate(xref);

        let result = PdfTextExtractor::new().extract(RawDocument::new(reference("cut"), bytes));
        assert!(matches!(result, Err(AppError::Extraction { .. })));
    }

    #[test]
    fn test_corrupt_page_stream_keeps_other_pages() {
        // a font operand that is not a name cannot be decoded
        let broken = b"BT 12 12 Tf 72 760 Td (ilegivel) Tj ET".to_vec();
        let bytes = pdf_with_contents(vec![
            page_content("Pagina boa"),
            broken,
            page_content("Pagina boa"),
        ]);

        let text = PdfTextExtractor::new()
            .extract(RawDocument::new(reference("mixed"), bytes))
            .unwrap();

        assert_eq!(text.page_count, 3);
        assert_eq!(
            text.warnings,
            BTreeSet::from([ExtractionWarning::CorruptStream])
        );
        assert!(!text.text.contains("ilegivel"));
        let pages: Vec<String> = text.pages().iter().map(|span| text.page_text(span)).collect();
        assert_eq!(pages, vec!["Pagina boa", "", "Pagina boa"]);
    }

    #[test]
    fn test_undecryptable_document_is_an_extraction_error() {
        let bytes = encrypted_pdf(&["Sigiloso"]);
        let result = PdfTextExtractor::new().extract(RawDocument::new(reference("locked"), bytes));

        match result {
            Err(AppError::Extraction { message, .. }) => {
                assert!(message.contains("encrypted"), "{message}")
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_repair_tail() {
        let repaired = repair_tail(b"%PDF-1.5 xref trailer startxref\n123\n\n\n\n").unwrap();
        assert!(repaired.ends_with(b"startxref\n123\n%%EOF\n"));
        assert_eq!(repair_tail(b"%PDF-1.5 1 0 obj << >> endobj"), None);
        assert_eq!(repair_tail(b"%PDF-1.5 startxref\n"), None);
    }
}
