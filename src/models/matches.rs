//! Match and excerpt records produced by the matcher.

use serde::{Deserialize, Serialize};

use super::PublicationReference;

/// One occurrence of a search term in a publication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchRecord {
    pub reference: PublicationReference,

    /// The configured term
    pub term: String,

    /// The occurrence as written in the document
    pub matched_text: String,

    /// Context window around the occurrence; always contains `matched_text`
    pub context_snippet: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

/// Text captured between a section rule's start and end markers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SectionExcerpt {
    pub reference: PublicationReference,
    pub rule: String,
    pub page_number: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
}
