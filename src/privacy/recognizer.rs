//! Named-entity recognition seam
//!
//! [`EntityRecognizer`] is what the NER backend runs after its model assets
//! are loaded. The bundled [`LexiconRecognizer`] matches whole-word terms from
//! a `TYPE<TAB>term` lexicon; heavier model runtimes plug in through the same
//! trait.

use super::{BackendError, PiiMatch};
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;

/// A loaded entity recognizer.
#[async_trait]
pub trait EntityRecognizer: Send + Sync {
    /// Find named entities in `text`.
    async fn recognize(&self, text: &str) -> Result<Vec<PiiMatch>, BackendError>;

    /// Human-readable name (used in logs and match attribution).
    fn name(&self) -> &str;
}

const LEXICON_CONFIDENCE: f64 = 0.80;

/// Whole-word lexicon recognizer, one compiled alternation per entity type.
pub struct LexiconRecognizer {
    patterns: Vec<(String, Regex)>,
    term_count: usize,
}

impl LexiconRecognizer {
    /// Parse a lexicon. Blank lines and `#` comments are skipped.
    pub fn parse(source: &str) -> Result<Self, BackendError> {
        let mut by_type: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (lineno, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (kind, term) = line.split_once('\t').ok_or_else(|| {
                BackendError::Model(format!(
                    "Malformed lexicon line {}: expected TYPE<TAB>term",
                    lineno + 1
                ))
            })?;
            let (kind, term) = (kind.trim(), term.trim());
            if kind.is_empty() || term.is_empty() {
                continue;
            }
            by_type
                .entry(kind.to_uppercase())
                .or_default()
                .push(regex::escape(term));
        }

        let mut term_count = 0;
        let mut patterns = Vec::with_capacity(by_type.len());
        for (kind, mut terms) in by_type {
            // Longest first so "John Smith" wins over "John"
            terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
            terms.dedup();
            term_count += terms.len();
            let pattern = Regex::new(&format!(r"\b(?:{})\b", terms.join("|")))
                .map_err(|e| BackendError::Model(format!("Lexicon for {} does not compile: {}", kind, e)))?;
            patterns.push((kind, pattern));
        }

        Ok(Self {
            patterns,
            term_count,
        })
    }

    /// Number of distinct terms loaded
    pub fn term_count(&self) -> usize {
        self.term_count
    }
}

#[async_trait]
impl EntityRecognizer for LexiconRecognizer {
    async fn recognize(&self, text: &str) -> Result<Vec<PiiMatch>, BackendError> {
        let mut matches = Vec::new();
        for (kind, pattern) in &self.patterns {
            for mat in pattern.find_iter(text) {
                matches.push(PiiMatch {
                    entity_type: kind.clone(),
                    start: mat.start(),
                    end: mat.end(),
                    confidence: LEXICON_CONFIDENCE,
                    source: "ner".to_string(),
                });
            }
        }
        Ok(matches)
    }

    fn name(&self) -> &str {
        "lexicon"
    }
}
