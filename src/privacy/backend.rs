//! Pluggable detector backend architecture
//!
//! Defines the `DetectorBackend` trait the session manager drives, and the
//! three backends behind [`DetectorMode`]:
//!
//! ```text
//! Disabled      → PassthroughBackend (no detection)
//! RegexOnly     → RegexBackend
//! RegexPlusNer  → NerBackend: [regex] + [semantic] + [NER recognizer]
//!                      ↓           ↓              ↓
//!                 merge results → deduplicate by span → matches
//! ```
//!
//! Every backend follows the same lifecycle: construct, await `ready()`,
//! serve `detect()` calls, then `dispose()`. A disposed backend refuses
//! further detection.

use super::classifier::Classifier;
use super::model::{LoadHooks, ModelLoader};
use super::recognizer::EntityRecognizer;
use super::semantic::SemanticAnalyzer;
use super::{DetectorMode, PiiMatch};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors raised by detector collaborators.
///
/// Network-class failures get their own variant so callers can tell a
/// retryable download problem from a broken model or detector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Model assets could not be fetched (connection, CORS, HTTP status)
    #[error("Network error: {0}")]
    Network(String),

    /// Model assets are missing or malformed
    #[error("Model error: {0}")]
    Model(String),

    /// `detect()` called before `ready()` completed
    #[error("Detector is not ready")]
    NotReady,

    /// `detect()` called after `dispose()`
    #[error("Detector has been disposed")]
    Disposed,

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Whether this failure came from the network
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_status() {
            Self::Network(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        Self::Other(format!("I/O failure: {}", e))
    }
}

/// Per-file download progress
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub file: String,
    /// `None` when the server did not announce a length
    pub percent: Option<f64>,
}

/// Coarse status callback
pub type StatusCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Granular download progress callback
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Detector backend interface driven by the session manager.
#[async_trait]
pub trait DetectorBackend: Send + Sync {
    /// Mode this backend implements
    fn mode(&self) -> DetectorMode;

    /// Wait until the backend can serve `detect()`.
    async fn ready(&self) -> Result<(), BackendError>;

    /// Detect PII spans in `text`.
    async fn detect(&self, text: &str) -> Result<Vec<PiiMatch>, BackendError>;

    /// Release held resources. Idempotent.
    async fn dispose(&self);

    /// Human-readable name for logs
    fn name(&self) -> &str;
}

/// Backend for [`DetectorMode::Disabled`]
#[derive(Default)]
pub struct PassthroughBackend {
    disposed: AtomicBool,
}

impl PassthroughBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DetectorBackend for PassthroughBackend {
    fn mode(&self) -> DetectorMode {
        DetectorMode::Disabled
    }

    async fn ready(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn detect(&self, _text: &str) -> Result<Vec<PiiMatch>, BackendError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(BackendError::Disposed);
        }
        Ok(Vec::new())
    }

    async fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

/// Regex-based backend. Fast, high-precision, no downloads.
pub struct RegexBackend {
    classifier: Arc<Classifier>,
    disposed: AtomicBool,
}

impl RegexBackend {
    pub fn new(classifier: Arc<Classifier>) -> Self {
        Self {
            classifier,
            disposed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DetectorBackend for RegexBackend {
    fn mode(&self) -> DetectorMode {
        DetectorMode::RegexOnly
    }

    async fn ready(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn detect(&self, text: &str) -> Result<Vec<PiiMatch>, BackendError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(BackendError::Disposed);
        }
        Ok(deduplicate_matches(self.classifier.classify(text)))
    }

    async fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    fn name(&self) -> &str {
        "regex"
    }
}

/// Regex + semantic + NER backend.
///
/// `ready()` loads the recognizer through the model loader, which may
/// download assets and report progress through the hooks.
pub struct NerBackend {
    classifier: Arc<Classifier>,
    semantic: Option<SemanticAnalyzer>,
    loader: Arc<dyn ModelLoader>,
    hooks: LoadHooks,
    recognizer: RwLock<Option<Arc<dyn EntityRecognizer>>>,
    disposed: AtomicBool,
}

impl NerBackend {
    pub fn new(
        classifier: Arc<Classifier>,
        semantic: Option<SemanticAnalyzer>,
        loader: Arc<dyn ModelLoader>,
        hooks: LoadHooks,
    ) -> Self {
        Self {
            classifier,
            semantic,
            loader,
            hooks,
            recognizer: RwLock::new(None),
            disposed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DetectorBackend for NerBackend {
    fn mode(&self) -> DetectorMode {
        DetectorMode::RegexPlusNer
    }

    async fn ready(&self) -> Result<(), BackendError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(BackendError::Disposed);
        }

        let mut slot = self.recognizer.write().await;
        if slot.is_some() {
            return Ok(());
        }

        let recognizer = self.loader.load(&self.hooks).await?;
        tracing::info!(recognizer = recognizer.name(), "NER recognizer loaded");
        *slot = Some(recognizer);
        Ok(())
    }

    async fn detect(&self, text: &str) -> Result<Vec<PiiMatch>, BackendError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(BackendError::Disposed);
        }
        let recognizer = self
            .recognizer
            .read()
            .await
            .clone()
            .ok_or(BackendError::NotReady)?;

        let mut all_matches = self.classifier.classify(text);
        if let Some(semantic) = &self.semantic {
            all_matches.extend(semantic.analyze(text));
        }
        all_matches.extend(recognizer.recognize(text).await?);

        Ok(deduplicate_matches(all_matches))
    }

    async fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.recognizer.write().await.take();
    }

    fn name(&self) -> &str {
        "regex+ner"
    }
}

/// Deduplicate overlapping matches by keeping the strongest one.
///
/// Two matches overlap if their byte ranges intersect. The higher confidence
/// wins; ties go to the longer span. Output is ordered by start offset.
pub fn deduplicate_matches(mut matches: Vec<PiiMatch>) -> Vec<PiiMatch> {
    if matches.len() <= 1 {
        return matches;
    }

    matches.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut result: Vec<PiiMatch> = Vec::new();

    for m in matches {
        if let Some(last) = result.last() {
            if m.start < last.end {
                let stronger = m.confidence > last.confidence
                    || (m.confidence == last.confidence
                        && (m.end - m.start) > (last.end - last.start));
                if stronger {
                    result.pop();
                    result.push(m);
                }
                continue;
            }
        }
        result.push(m);
    }

    result
}
