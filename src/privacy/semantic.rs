//! Context-aware PII detection from disclosure phrases
//!
//! Catches values that have no fixed shape but are introduced by a telltale
//! phrase ("my name is …", "I live at …", "my password is …").

use super::PiiMatch;
use regex::Regex;
use std::sync::OnceLock;

/// Category of a semantic disclosure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticCategory {
    Name,
    Address,
    Password,
}

impl SemanticCategory {
    /// Entity type label used in placeholders
    pub fn entity_type(&self) -> &'static str {
        match self {
            Self::Name => "PERSON",
            Self::Address => "ADDRESS",
            Self::Password => "PASSWORD",
        }
    }
}

struct Trigger {
    category: SemanticCategory,
    pattern: Regex,
    confidence: f64,
}

fn triggers() -> &'static [Trigger] {
    static TRIGGERS: OnceLock<Vec<Trigger>> = OnceLock::new();
    TRIGGERS.get_or_init(|| {
        [
            (
                SemanticCategory::Name,
                r"(?i:\bmy name is|\bi am called|\bname:)\s+([A-Z][\p{L}'-]+(?:\s+[A-Z][\p{L}'-]+){0,2})",
                0.75,
            ),
            (
                SemanticCategory::Address,
                r"(?i:\bi live at|\bmy address is|\baddress:)\s+(\d+[^,.;\n]*)",
                0.70,
            ),
            (
                SemanticCategory::Password,
                r"(?i:\bmy password is|\bpassword:|\bpasswd:)\s*(\S+)",
                0.85,
            ),
        ]
        .into_iter()
        .filter_map(|(category, pattern, confidence)| {
            Regex::new(pattern).ok().map(|pattern| Trigger {
                category,
                pattern,
                confidence,
            })
        })
        .collect()
    })
}

/// Trigger-phrase analyzer
#[derive(Debug, Default, Clone, Copy)]
pub struct SemanticAnalyzer;

impl SemanticAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Find disclosed values. Spans cover the value only, not the trigger.
    pub fn analyze(&self, text: &str) -> Vec<PiiMatch> {
        let mut matches = Vec::new();
        for trigger in triggers() {
            for caps in trigger.pattern.captures_iter(text) {
                let Some(value) = caps.get(1) else { continue };
                let trimmed = value.as_str().trim_end();
                if trimmed.is_empty() {
                    continue;
                }
                matches.push(PiiMatch {
                    entity_type: trigger.category.entity_type().to_string(),
                    start: value.start(),
                    end: value.start() + trimmed.len(),
                    confidence: trigger.confidence,
                    source: "semantic".to_string(),
                });
            }
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_disclosure() {
        let text = "my password is hunter2";
        let matches = SemanticAnalyzer::new().analyze(text);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entity_type, "PASSWORD");
        assert_eq!(&text[matches[0].start..matches[0].end], "hunter2");
    }

    #[test]
    fn test_name_disclosure() {
        let text = "Hi, my name is Jane Doe and I need help";
        let matches = SemanticAnalyzer::new().analyze(text);
        assert_eq!(matches.len(), 1);
        assert_eq!(&text[matches[0].start..matches[0].end], "Jane Doe");
    }

    #[test]
    fn test_address_disclosure() {
        let text = "I live at 42 Elm Street, Springfield";
        let matches = SemanticAnalyzer::new().analyze(text);
        assert_eq!(matches[0].entity_type, "ADDRESS");
        assert_eq!(&text[matches[0].start..matches[0].end], "42 Elm Street");
    }

    #[test]
    fn test_clean_text() {
        assert!(SemanticAnalyzer::new()
            .analyze("the weather is nice today")
            .is_empty());
    }
}
