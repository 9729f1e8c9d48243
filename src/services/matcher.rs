//! Search-term matching and section excerpts.
//!
//! Matching is case-insensitive (Unicode lowercase folding) and
//! deterministic: records come out in document order, ties broken by the
//! configured term order.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use crate::error::Result;
use crate::models::{ExtractedText, MatchRecord, MatcherConfig, SectionExcerpt, SectionRule};

/// Words that show up in upper case in appointment acts but are not names.
const NAME_STOP_WORDS: &[&str] = &[
    "NOMEAR",
    "PROCURADOR",
    "GERAL",
    "JUSTIÇA",
    "MINISTÉRIO",
    "PÚBLICO",
    "ESTADO",
    "RORAIMA",
    "CONCURSO",
    "IV",
];

fn name_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-ZÁÉÍÓÚÂÊÔÃÕÇ]{2,}(?:\s+[A-ZÁÉÍÓÚÂÊÔÃÕÇ]{2,}){1,6}\b").ok()
    })
    .as_ref()
}

struct Term {
    original: String,
    folded: Vec<char>,
}

struct CompiledSection {
    rule: SectionRule,
    pattern: Regex,
    require: Vec<String>,
}

/// Finds configured terms and sections in extracted text.
pub struct TermMatcher {
    terms: Vec<Term>,
    context_chars: usize,
    sections: Vec<CompiledSection>,
}

impl TermMatcher {
    /// Build a matcher for the configured terms and section rules.
    pub fn new(config: &MatcherConfig) -> Result<Self> {
        let mut terms: Vec<Term> = Vec::new();
        for raw in &config.search_terms {
            let original = raw.trim();
            if original.is_empty() {
                continue;
            }
            let (folded, _) = fold(original);
            if terms.iter().any(|t| t.folded == folded) {
                continue;
            }
            terms.push(Term {
                original: original.to_string(),
                folded,
            });
        }

        let sections = config
            .sections
            .iter()
            .map(|rule| {
                let pattern = RegexBuilder::new(&format!(
                    "{}.*?{}",
                    regex::escape(rule.start.trim()),
                    regex::escape(rule.end.trim())
                ))
                .case_insensitive(true)
                .dot_matches_new_line(true)
                .build()?;
                Ok(CompiledSection {
                    rule: rule.clone(),
                    pattern,
                    require: rule.require.iter().map(|r| r.to_lowercase()).collect(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            terms,
            context_chars: config.context_chars,
            sections,
        })
    }

    /// Effective search terms, deduplicated, in configured order.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|t| t.original.as_str())
    }

    /// Every occurrence of every term, in document order.
    pub fn find_matches(&self, text: &ExtractedText) -> Vec<MatchRecord> {
        if self.terms.is_empty() || text.text.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.text.chars().collect();
        let (folded, origin) = fold(&text.text);

        // (start, term index, end) in original char offsets
        let mut hits: Vec<(usize, usize, usize)> = Vec::new();
        for (index, term) in self.terms.iter().enumerate() {
            for (start, end) in occurrences(&folded, &term.folded) {
                hits.push((origin[start], index, origin[end - 1] + 1));
            }
        }
        hits.sort_unstable_by_key(|&(start, index, _)| (start, index));

        hits.into_iter()
            .map(|(start, index, end)| {
                let window_start = start.saturating_sub(self.context_chars);
                let window_end = (end + self.context_chars).min(chars.len());
                MatchRecord {
                    reference: text.reference.clone(),
                    term: self.terms[index].original.clone(),
                    matched_text: chars[start..end].iter().collect(),
                    context_snippet: chars[window_start..window_end].iter().collect(),
                    page_number: text.page_at(start),
                }
            })
            .collect()
    }

    /// Whether any section rule is configured.
    pub fn has_sections(&self) -> bool {
        !self.sections.is_empty()
    }

    /// First `start … end` excerpt per rule on each page meeting the rule's
    /// requirements.
    pub fn find_sections(&self, text: &ExtractedText) -> Vec<SectionExcerpt> {
        let mut excerpts = Vec::new();
        for (span, page) in text.page_slices() {
            let lowered = page.to_lowercase();
            for section in &self.sections {
                if !section.require.iter().all(|r| lowered.contains(r.as_str())) {
                    continue;
                }
                let Some(found) = section.pattern.find(page) else {
                    continue;
                };
                let block = found.as_str().trim().to_string();
                let names = if section.rule.extract_names {
                    extract_names(&block)
                } else {
                    Vec::new()
                };
                excerpts.push(SectionExcerpt {
                    reference: text.reference.clone(),
                    rule: section.rule.name.clone(),
                    page_number: span.number,
                    text: block,
                    names,
                });
            }
        }
        excerpts
    }
}

/// Lowercase `text` char by char, remembering which original char each
/// folded char came from.
fn fold(text: &str) -> (Vec<char>, Vec<usize>) {
    let mut folded = Vec::with_capacity(text.len());
    let mut origin = Vec::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        for lower in c.to_lowercase() {
            folded.push(lower);
            origin.push(i);
        }
    }
    (folded, origin)
}

/// Non-overlapping occurrences of `needle` in `haystack` as folded ranges.
fn occurrences(haystack: &[char], needle: &[char]) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    if needle.is_empty() || needle.len() > haystack.len() {
        return found;
    }
    let mut start = 0;
    while start + needle.len() <= haystack.len() {
        if haystack[start..start + needle.len()] == *needle {
            found.push((start, start + needle.len()));
            start += needle.len();
        } else {
            start += 1;
        }
    }
    found
}

/// Upper-case word runs that look like personal names.
pub fn extract_names(block: &str) -> Vec<String> {
    let Some(re) = name_re() else {
        return Vec::new();
    };
    let flattened = crate::utils::collapse_whitespace(block);
    let mut names: Vec<String> = Vec::new();

    for candidate in re.find_iter(&flattened).map(|m| m.as_str()) {
        if NAME_STOP_WORDS.contains(&candidate) {
            continue;
        }
        let stop_hits = candidate
            .split_whitespace()
            .filter(|w| NAME_STOP_WORDS.contains(w))
            .count();
        if stop_hits >= 2 {
            continue;
        }
        if !names.iter().any(|n| n == candidate) {
            names.push(candidate.to_string());
        }
    }
    names
}
