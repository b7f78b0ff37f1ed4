//! NER model asset loading
//!
//! [`HttpModelLoader`] fetches the configured model files from the model hub
//! (optionally through the model proxy), caches them on disk, reports
//! per-file download progress, and builds the recognizer from the lexicon.

use super::backend::{BackendError, DownloadProgress, ProgressCallback, StatusCallback};
use super::recognizer::{EntityRecognizer, LexiconRecognizer};
use crate::config::NerConfig;
use crate::proxy::rewrite::proxied_url;
use async_trait::async_trait;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Options and callbacks for one model load
#[derive(Clone, Default)]
pub struct LoadHooks {
    /// Fetch missing assets instead of failing on a cold cache
    pub auto_download: bool,
    pub on_status: Option<StatusCallback>,
    pub on_download_progress: Option<ProgressCallback>,
}

impl LoadHooks {
    pub(crate) fn status(&self, message: &str) {
        if let Some(cb) = &self.on_status {
            cb(message);
        }
    }

    pub(crate) fn progress(&self, file: &str, percent: Option<f64>) {
        if let Some(cb) = &self.on_download_progress {
            cb(DownloadProgress {
                file: file.to_string(),
                percent,
            });
        }
    }
}

/// Produces a ready entity recognizer.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, hooks: &LoadHooks) -> Result<Arc<dyn EntityRecognizer>, BackendError>;
}

/// Loads model assets over HTTP with an on-disk cache.
pub struct HttpModelLoader {
    config: NerConfig,
    client: reqwest::Client,
}

impl HttpModelLoader {
    pub fn new(config: NerConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(config: NerConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Directory holding this repository revision's files
    pub fn model_dir(&self) -> PathBuf {
        self.config
            .cache_dir
            .join(self.config.repository.replace('/', "--"))
            .join(&self.config.revision)
    }

    /// Remote URL for `file`, rewritten through the proxy when configured
    pub fn file_url(&self, file: &str) -> String {
        let url = format!(
            "{}/{}/resolve/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.repository,
            self.config.revision,
            file
        );
        match &self.config.proxy_base {
            Some(base) => proxied_url(&url, base).unwrap_or(url),
            None => url,
        }
    }

    async fn fetch(&self, file: &str, dest: &Path, hooks: &LoadHooks) -> Result<(), BackendError> {
        let url = self.file_url(file);
        tracing::debug!(file, url = %url, "Downloading model file");
        hooks.status(&format!("Downloading {}...", file));

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(BackendError::Network(format!(
                "Failed to download {}: HTTP {}",
                file,
                response.status()
            )));
        }

        let total = response.content_length().filter(|len| *len > 0);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = dest.with_file_name(format!(
            "{}.part",
            dest.file_name().and_then(|n| n.to_str()).unwrap_or("download")
        ));

        let result = self.stream_to(response, file, &partial, total, hooks).await;
        let received = match result {
            Ok(received) => received,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&partial, dest).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        tracing::info!(file, bytes = received, "Model file downloaded");
        Ok(())
    }

    /// Write the body to `partial`, reporting progress and checking the pin.
    ///
    /// The caller removes `partial` when this fails.
    async fn stream_to(
        &self,
        response: reqwest::Response,
        file: &str,
        partial: &Path,
        total: Option<u64>,
        hooks: &LoadHooks,
    ) -> Result<u64, BackendError> {
        let mut out = tokio::fs::File::create(partial).await?;
        let mut hasher = Sha256::new();
        let mut received: u64 = 0;
        let mut last_reported: Option<u64> = None;

        hooks.progress(file, total.map(|_| 0.0));

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            out.write_all(&chunk).await?;
            hasher.update(&chunk);
            received += chunk.len() as u64;

            if let Some(total) = total {
                let whole = (received.min(total) * 100) / total;
                if last_reported != Some(whole) {
                    last_reported = Some(whole);
                    hooks.progress(file, Some(whole as f64));
                }
            }
        }
        out.flush().await?;
        drop(out);

        if total.is_none() {
            hooks.progress(file, None);
        }

        if let Some(expected) = self.config.checksums.get(file) {
            let actual = format!("{:x}", hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                tracing::warn!(file, expected = %expected, actual = %actual, "Model file checksum mismatch");
                return Err(BackendError::Model(format!("Checksum mismatch for {}", file)));
            }
        }
        Ok(received)
    }
}

#[async_trait]
impl ModelLoader for HttpModelLoader {
    async fn load(&self, hooks: &LoadHooks) -> Result<Arc<dyn EntityRecognizer>, BackendError> {
        if !self.config.files.contains(&self.config.lexicon_file) {
            return Err(BackendError::Model(format!(
                "Lexicon file {} is not among the model files",
                self.config.lexicon_file
            )));
        }

        let dir = self.model_dir();
        tokio::fs::create_dir_all(&dir).await?;

        hooks.status("Checking model cache...");
        for file in &self.config.files {
            let dest = dir.join(file);
            if tokio::fs::try_exists(&dest).await? {
                hooks.progress(file, Some(100.0));
                continue;
            }
            if !hooks.auto_download {
                return Err(BackendError::Model(format!(
                    "Model file {} is not cached and auto-download is disabled",
                    file
                )));
            }
            self.fetch(file, &dest, hooks).await?;
        }

        hooks.status("Loading model...");
        let source = tokio::fs::read_to_string(dir.join(&self.config.lexicon_file)).await?;
        let recognizer = LexiconRecognizer::parse(&source)?;
        tracing::info!(
            repository = %self.config.repository,
            terms = recognizer.term_count(),
            "NER model loaded"
        );
        Ok(Arc::new(recognizer))
    }
}
