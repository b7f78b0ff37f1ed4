//! Anonymization and rehydration pipelines
//!
//! Anonymization replaces every detected span with a placeholder token of the
//! form `<PII type="EMAIL" id="1"/>`. Identical `(type, value)` pairs share a
//! token, so the number of distinct tokens in the output always equals the
//! number of map entries. Rehydration is the inverse: a single left-to-right
//! pass that swaps known tokens back and leaves unknown ones untouched.

use super::{Entity, PiiMap, PiiMatch, SessionStats};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Output of one anonymization pass
#[derive(Debug, Clone)]
pub struct AnonymizationOutput {
    pub anonymized_text: String,
    pub pii_map: PiiMap,
    pub stats: SessionStats,
}

/// Build the placeholder token for an entity.
///
/// Entity types come from lexicons and user rules, so any character that
/// would end the attribute or the tag is replaced with `_`.
pub fn placeholder(entity_type: &str, id: usize) -> String {
    let kind: String = entity_type
        .chars()
        .map(|c| match c {
            '"' | '<' | '>' => '_',
            c => c,
        })
        .collect();
    format!(r#"<PII type="{}" id="{}"/>"#, kind, id)
}

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r#"<PII type="[^"<>]+" id="\d+"\s*/>"#)
            .expect("placeholder pattern is a valid regex")
    })
}

/// Matches exactly the tokens held in `map`, longest first
fn map_pattern(map: &PiiMap) -> Option<Regex> {
    let mut tokens: Vec<&str> = map.iter().map(|e| e.placeholder_token.as_str()).collect();
    tokens.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    tokens.dedup();
    let alternation = tokens
        .into_iter()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    match Regex::new(&alternation) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            tracing::warn!(error = %e, "Token alternation rejected, using generic token pattern");
            None
        }
    }
}

/// Replace detected spans with placeholder tokens.
///
/// `matches` must not overlap (backends deduplicate before returning).
/// Overlapping or out-of-range spans are skipped rather than corrupting text.
pub fn anonymize(text: &str, mut matches: Vec<PiiMatch>) -> AnonymizationOutput {
    matches.sort_by_key(|m| m.start);

    let mut pii_map = PiiMap::new();
    let mut tokens: HashMap<(String, String), String> = HashMap::new();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    for m in matches {
        if m.start < cursor || m.end > text.len() || m.start >= m.end {
            continue;
        }
        let Some(value) = text.get(m.start..m.end) else {
            continue;
        };

        let key = (m.entity_type.clone(), value.to_string());
        let token = match tokens.get(&key) {
            Some(token) => token.clone(),
            None => {
                let token = placeholder(&m.entity_type, tokens.len() + 1);
                pii_map.insert(Entity {
                    entity_type: m.entity_type.clone(),
                    original_value: value.to_string(),
                    placeholder_token: token.clone(),
                    span: (m.start, m.end),
                });
                tokens.insert(key, token.clone());
                token
            }
        };

        out.push_str(&text[cursor..m.start]);
        out.push_str(&token);
        cursor = m.end;
    }
    out.push_str(&text[cursor..]);

    let stats = pii_map.stats();
    AnonymizationOutput {
        anonymized_text: out,
        pii_map,
        stats,
    }
}

/// Restore original values for every known placeholder in `text`.
///
/// Tokens absent from `map` pass through unchanged.
pub fn rehydrate(text: &str, map: &PiiMap) -> String {
    if map.is_empty() {
        return text.to_string();
    }
    let exact = map_pattern(map);
    exact
        .as_ref()
        .unwrap_or_else(|| token_pattern())
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let token = &caps[0];
            map.get(token)
                .map(|e| e.original_value.clone())
                .unwrap_or_else(|| token.to_string())
        })
        .into_owned()
}

/// Distinct placeholder tokens appearing in `text`
pub fn distinct_tokens(text: &str) -> usize {
    let mut seen: Vec<&str> = token_pattern().find_iter(text).map(|m| m.as_str()).collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}
