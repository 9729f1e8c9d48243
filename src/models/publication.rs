//! Publication references and downloaded documents.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One candidate publication listed on the index page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicationReference {
    /// Publication date
    pub date: NaiveDate,

    /// Link text, or the file name when the anchor has none
    pub title: String,

    /// Absolute URL of the PDF
    pub source_url: String,

    /// Release timestamp encoded in the file name, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<NaiveDateTime>,

    /// Edition number encoded in the file name, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edition: Option<u32>,
}

impl fmt::Display for PublicationReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.source_url)
    }
}

/// A downloaded publication. Moved from stage to stage, never shared.
#[derive(Debug)]
pub struct RawDocument {
    pub reference: PublicationReference,
    pub bytes: Vec<u8>,
}

impl RawDocument {
    pub fn new(reference: PublicationReference, bytes: Vec<u8>) -> Self {
        Self { reference, bytes }
    }

    /// SHA-256 of the downloaded bytes, hex encoded.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}
