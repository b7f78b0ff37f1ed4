//! Detector backend construction

use super::backend::{
    BackendError, DetectorBackend, NerBackend, PassthroughBackend, ProgressCallback, RegexBackend,
    StatusCallback,
};
use super::classifier::Classifier;
use super::model::{HttpModelLoader, LoadHooks, ModelLoader};
use super::semantic::SemanticAnalyzer;
use super::DetectorMode;
use crate::config::SafeScrubConfig;
use async_trait::async_trait;
use std::sync::Arc;

/// Options for constructing one detector backend
#[derive(Clone, Default)]
pub struct DetectorConfig {
    pub mode: DetectorMode,
    pub auto_download: bool,
    pub on_status: Option<StatusCallback>,
    pub on_download_progress: Option<ProgressCallback>,
}

impl DetectorConfig {
    /// Config for `mode` with no callbacks
    pub fn for_mode(mode: DetectorMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }
}

/// Builds detector backends for the session manager.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Construct a backend. The caller still awaits `ready()` on the result.
    async fn construct(&self, config: DetectorConfig) -> Result<Arc<dyn DetectorBackend>, BackendError>;
}

/// Factory wiring the bundled classifier, semantic analyzer and model loader.
pub struct DefaultBackendFactory {
    classifier: Arc<Classifier>,
    loader: Arc<dyn ModelLoader>,
    semantic_enabled: bool,
}

impl DefaultBackendFactory {
    pub fn new(classifier: Arc<Classifier>, loader: Arc<dyn ModelLoader>, semantic_enabled: bool) -> Self {
        Self {
            classifier,
            loader,
            semantic_enabled,
        }
    }

    /// Build from the application configuration
    pub fn from_config(config: &SafeScrubConfig) -> crate::Result<Self> {
        let classifier = Arc::new(Classifier::new(config.privacy.rules.clone())?);
        let loader = Arc::new(HttpModelLoader::new(config.ner.clone()));
        Ok(Self::new(classifier, loader, config.detector.semantic_enabled))
    }
}

#[async_trait]
impl BackendFactory for DefaultBackendFactory {
    async fn construct(&self, config: DetectorConfig) -> Result<Arc<dyn DetectorBackend>, BackendError> {
        tracing::debug!(mode = %config.mode, "Constructing detector backend");
        let backend: Arc<dyn DetectorBackend> = match config.mode {
            DetectorMode::Disabled => Arc::new(PassthroughBackend::new()),
            DetectorMode::RegexOnly => Arc::new(RegexBackend::new(self.classifier.clone())),
            DetectorMode::RegexPlusNer => {
                let semantic = self.semantic_enabled.then(SemanticAnalyzer::new);
                let hooks = LoadHooks {
                    auto_download: config.auto_download,
                    on_status: config.on_status,
                    on_download_progress: config.on_download_progress,
                };
                Arc::new(NerBackend::new(
                    self.classifier.clone(),
                    semantic,
                    self.loader.clone(),
                    hooks,
                ))
            }
        };
        Ok(backend)
    }
}
