//! PII detection, anonymization and rehydration
//!
//! Provides the detector side of the system:
//! - Regex-based classification (structured PII patterns)
//! - Semantic analysis (natural language PII disclosure)
//! - Named-entity recognition behind a pluggable recognizer
//! - Swappable detector backends and the factory that builds them
//! - The anonymization and rehydration pipelines

pub mod anonymize;
pub mod backend;
pub mod classifier;
pub mod factory;
pub mod model;
pub mod recognizer;
pub mod semantic;
mod types;

pub use anonymize::{anonymize, rehydrate, AnonymizationOutput};
pub use backend::{
    BackendError, DetectorBackend, DownloadProgress, NerBackend, PassthroughBackend,
    ProgressCallback, RegexBackend, StatusCallback,
};
pub use classifier::Classifier;
pub use factory::{BackendFactory, DefaultBackendFactory, DetectorConfig};
pub use model::{HttpModelLoader, LoadHooks, ModelLoader};
pub use recognizer::{EntityRecognizer, LexiconRecognizer};
pub use semantic::{SemanticAnalyzer, SemanticCategory};
pub use types::{DetectorMode, Entity, PiiMap, PiiMatch, SessionStats};
