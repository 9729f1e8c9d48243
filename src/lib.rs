// src/lib.rs

//! Gazette Scanner Library
//!
//! Scans an official gazette index for the day's publications, searches
//! their text for configured terms and mails a summary of what was found.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;

#[cfg(test)]
mod test_support;
