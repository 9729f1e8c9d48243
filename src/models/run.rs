//! Run lifecycle and result types.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{ExtractionWarning, MatchRecord, PublicationReference, SectionExcerpt};

/// Which publications a run looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Every publication dated on the given day
    ByDate(NaiveDate),
    /// Only the most recent publication on the index
    Latest,
}

impl Selection {
    /// Calendar year the index must show, if the selection names one.
    pub fn year(&self) -> Option<i32> {
        match self {
            Selection::ByDate(day) => Some(day.year()),
            Selection::Latest => None,
        }
    }
}

/// Pipeline stage a failure came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Stage {
    Navigation,
    Download,
    Extraction,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Navigation => "navigation",
            Stage::Download => "download",
            Stage::Extraction => "extraction",
        };
        f.write_str(name)
    }
}

/// A failure recorded during a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<PublicationReference>,
    pub stage: Stage,
    pub message: String,
}

/// Per-publication extraction summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScannedDocument {
    pub reference: PublicationReference,
    /// SHA-256 of the downloaded bytes
    pub digest: String,
    pub page_count: usize,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub warnings: BTreeSet<ExtractionWarning>,
}

/// Everything one run found. Read-only once handed to the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunResult {
    pub run_date: NaiveDate,
    pub documents_scanned: usize,
    pub documents: Vec<ScannedDocument>,
    pub matches: Vec<MatchRecord>,
    pub sections: Vec<SectionExcerpt>,
    pub errors: Vec<RunError>,
}

impl RunResult {
    pub fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            documents_scanned: 0,
            documents: Vec::new(),
            matches: Vec::new(),
            sections: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn has_findings(&self) -> bool {
        !self.matches.is_empty() || !self.sections.is_empty()
    }

    /// Publications with at least one match, in enumeration order.
    pub fn matched_references(&self) -> Vec<&PublicationReference> {
        let mut seen: Vec<&PublicationReference> = Vec::new();
        for record in &self.matches {
            if !seen.iter().any(|r| r.source_url == record.reference.source_url) {
                seen.push(&record.reference);
            }
        }
        seen
    }
}

/// Coordinator states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Fetching,
    Processing,
    Aggregating,
    Dispatching,
    Done,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Aborted)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Fetching)
                | (Fetching, Processing)
                | (Fetching, Aggregating)
                | (Fetching, Aborted)
                | (Processing, Aggregating)
                | (Aggregating, Dispatching)
                | (Dispatching, Done)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of handing a run to the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Outcome {
    Sent,
    Failed { reason: String },
}

/// Final report of one coordinator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub state: RunState,
    /// Every state visited, starting at `Idle`
    pub states: Vec<RunState>,
    /// Absent when the run was aborted
    pub result: Option<RunResult>,
    pub outcome: Option<Outcome>,
    /// Why the run aborted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl RunReport {
    pub fn is_aborted(&self) -> bool {
        self.state == RunState::Aborted
    }
}

/// Outcome of searching back through the index for the most recent
/// publication that satisfies a section rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanBackReport {
    /// Years visited, newest first
    pub years: Vec<i32>,
    pub documents_scanned: usize,
    /// The first excerpt found, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<SectionExcerpt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RunError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aborted_only_from_fetching() {
        assert!(RunState::Fetching.can_transition_to(RunState::Aborted));
        assert!(!RunState::Processing.can_transition_to(RunState::Aborted));
        assert!(!RunState::Dispatching.can_transition_to(RunState::Aborted));
    }

    #[test]
    fn test_empty_fetch_skips_processing() {
        assert!(RunState::Fetching.can_transition_to(RunState::Aggregating));
        assert!(!RunState::Idle.can_transition_to(RunState::Processing));
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Aborted.is_terminal());
    }

    #[test]
    fn test_selection_year() {
        let day = NaiveDate::from_ymd_opt(2023, 5, 10).unwrap();
        assert_eq!(Selection::ByDate(day).year(), Some(2023));
        assert_eq!(Selection::Latest.year(), None);
    }
}
