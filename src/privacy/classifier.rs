//! Pattern classifier for structured PII (emails, phone numbers, card numbers)

use super::PiiMatch;
use crate::config::ClassificationRule;
use crate::error::{Error, Result};
use regex::Regex;

/// Confidence assigned to pattern matches
const REGEX_CONFIDENCE: f64 = 0.95;

/// Regex-based PII classifier
pub struct Classifier {
    rules: Vec<CompiledRule>,
}

struct CompiledRule {
    name: String,
    entity_type: String,
    pattern: Regex,
}

impl Classifier {
    /// Create a new classifier with the given rules
    pub fn new(rules: Vec<ClassificationRule>) -> Result<Self> {
        let compiled_rules = rules
            .into_iter()
            .map(|rule| {
                let pattern = Regex::new(&rule.pattern).map_err(|e| {
                    Error::Privacy(format!(
                        "Invalid regex pattern for rule '{}': {}",
                        rule.name, e
                    ))
                })?;

                Ok(CompiledRule {
                    name: rule.name,
                    entity_type: rule.entity_type,
                    pattern,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules: compiled_rules,
        })
    }

    /// Find every rule match in `text`
    pub fn classify(&self, text: &str) -> Vec<PiiMatch> {
        let mut matches = Vec::new();

        for rule in &self.rules {
            for mat in rule.pattern.find_iter(text) {
                matches.push(PiiMatch {
                    entity_type: rule.entity_type.clone(),
                    start: mat.start(),
                    end: mat.end(),
                    confidence: REGEX_CONFIDENCE,
                    source: "regex".to_string(),
                });
            }
        }

        matches
    }

    /// Check if text contains any PII
    pub fn contains_pii(&self, text: &str) -> bool {
        self.rules.iter().any(|rule| rule.pattern.is_match(text))
    }

    /// Names of the compiled rules
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }
}
