//! Core data model shared by detectors, the pipelines and the session manager

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which detector backend is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectorMode {
    /// No detection; text passes through unchanged
    Disabled,
    /// Pattern matchers only (no model download)
    #[default]
    RegexOnly,
    /// Pattern matchers plus NER model and semantic analysis
    RegexPlusNer,
}

impl DetectorMode {
    /// Whether this mode needs model assets
    pub fn requires_model(&self) -> bool {
        matches!(self, Self::RegexPlusNer)
    }
}

impl fmt::Display for DetectorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disabled => "disabled",
            Self::RegexOnly => "regex_only",
            Self::RegexPlusNer => "regex_plus_ner",
        };
        f.write_str(s)
    }
}

/// A span found by a detector backend, before placeholder assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct PiiMatch {
    /// Entity type label (e.g. `EMAIL`, `PERSON`)
    pub entity_type: String,
    /// Start byte offset in the input text
    pub start: usize,
    /// End byte offset in the input text
    pub end: usize,
    /// Confidence score (0.0 to 1.0)
    pub confidence: f64,
    /// Which detector produced this match
    pub source: String,
}

/// A detected entity with its placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub original_value: String,
    pub placeholder_token: String,
    /// Byte offsets of the first occurrence in the original text
    pub span: (usize, usize),
}

/// Ordered mapping from placeholder token to entity.
///
/// Insertion order is the order of first appearance in the source text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PiiMap {
    entities: Vec<Entity>,
}

impl PiiMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity, replacing any entry with the same token.
    pub fn insert(&mut self, entity: Entity) {
        match self
            .entities
            .iter_mut()
            .find(|e| e.placeholder_token == entity.placeholder_token)
        {
            Some(existing) => *existing = entity,
            None => self.entities.push(entity),
        }
    }

    pub fn get(&self, token: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.placeholder_token == token)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    /// Derive summary statistics for this map.
    pub fn stats(&self) -> SessionStats {
        let mut counts_by_type = BTreeMap::new();
        for entity in &self.entities {
            *counts_by_type.entry(entity.entity_type.clone()).or_insert(0) += 1;
        }
        SessionStats {
            total_entities: self.entities.len(),
            counts_by_type,
        }
    }
}

/// Summary statistics of one anonymization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_entities: usize,
    pub counts_by_type: BTreeMap<String, usize>,
}
