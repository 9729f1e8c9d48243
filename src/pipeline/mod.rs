//! Pipeline entry points.
//!
//! - `RunCoordinator::run`: list, download, scan and notify for one date
//! - `RunCoordinator::list`: list the publications a run would process

pub mod run;

pub use run::{RunCoordinator, describe_outcome, is_failure};
