//! Extracted publication text.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::PublicationReference;

/// Why extracted text may be incomplete.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtractionWarning {
    /// A page produced no text (typically a scanned image)
    ImageOnlyPage,
    /// A page content stream could not be decoded
    CorruptStream,
    /// The file ends before its trailer
    Truncated,
}

/// Char range of one page inside [`ExtractedText::text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    /// 1-based page number
    pub number: u32,
    /// First char offset of the page
    pub start: usize,
    /// One past the last char offset of the page
    pub end: usize,
}

/// Text of one publication, pages concatenated in order.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub reference: PublicationReference,
    pub text: String,
    pub page_count: usize,
    /// Non-empty only when `text` may be incomplete
    pub warnings: BTreeSet<ExtractionWarning>,
    pages: Vec<PageSpan>,
}

impl ExtractedText {
    /// Join page texts with a newline, remembering where each page starts.
    pub fn from_pages(
        reference: PublicationReference,
        pages: Vec<(u32, String)>,
        warnings: BTreeSet<ExtractionWarning>,
    ) -> Self {
        let page_count = pages.len();
        let mut text = String::new();
        let mut spans = Vec::with_capacity(page_count);
        let mut offset = 0;

        for (i, (number, page_text)) in pages.into_iter().enumerate() {
            if i > 0 {
                text.push('\n');
                offset += 1;
            }
            let len = page_text.chars().count();
            spans.push(PageSpan {
                number,
                start: offset,
                end: offset + len,
            });
            text.push_str(&page_text);
            offset += len;
        }

        Self {
            reference,
            text,
            page_count,
            warnings,
            pages: spans,
        }
    }

    /// Page spans in document order.
    pub fn pages(&self) -> &[PageSpan] {
        &self.pages
    }

    /// Page number holding the char at `offset`.
    pub fn page_at(&self, offset: usize) -> Option<u32> {
        self.pages
            .iter()
            .take_while(|span| span.start <= offset)
            .last()
            .map(|span| span.number)
    }

    /// Text of a single page.
    pub fn page_text(&self, span: &PageSpan) -> String {
        self.text
            .chars()
            .skip(span.start)
            .take(span.end - span.start)
            .collect()
    }

    /// Every page with its text, slicing the document in one pass.
    pub fn page_slices(&self) -> Vec<(&PageSpan, &str)> {
        let bounds: Vec<usize> = self
            .text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(self.text.len()))
            .collect();
        self.pages
            .iter()
            .map(|span| (span, &self.text[bounds[span.start]..bounds[span.end]]))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}
