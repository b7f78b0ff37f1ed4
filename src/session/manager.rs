//! Session management
//!
//! The [`SessionManager`] owns the active detector backend and at most one
//! anonymization session. Backend swaps are single-flight: one swap (or
//! initialization) runs at a time, and the old backend is disposed before the
//! replacement is constructed, so two backends are never current together.

use super::error::SessionError;
use super::state::{format_progress, status, InitState, ManagerStatus, Transition};
use crate::config::{DetectorSettings, SafeScrubConfig};
use crate::crypto::{decrypt_pii_map, encrypt_pii_map, EncryptedPiiMap, InMemoryKeyProvider, KeyProvider};
use crate::privacy::{
    self, BackendError, BackendFactory, DefaultBackendFactory, DetectorBackend, DetectorConfig,
    DetectorMode, DownloadProgress, SessionStats,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify, RwLock};
use uuid::Uuid;

/// The encrypted record of one anonymization pass
#[derive(Debug)]
pub struct Session {
    /// Session ID (for logs; never contains PII)
    pub id: String,
    /// Creation timestamp
    pub created_at: i64,
    /// Encrypted placeholder → original value map
    pub encrypted_pii_map: EncryptedPiiMap,
    /// Summary statistics
    pub stats: SessionStats,
}

impl Session {
    fn new(encrypted_pii_map: EncryptedPiiMap, stats: SessionStats) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
            encrypted_pii_map,
            stats,
        }
    }
}

/// Successful anonymization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnonymizeOutcome {
    pub anonymized_text: String,
    pub entity_count: usize,
}

/// Clears the single-flight flag when a swap ends, however it ends
struct SwapGuard<'a> {
    flag: &'a AtomicBool,
    released: &'a Notify,
}

impl<'a> SwapGuard<'a> {
    fn acquire(flag: &'a AtomicBool, released: &'a Notify) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, released })
    }
}

impl Drop for SwapGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.released.notify_waiters();
    }
}

/// Session manager
pub struct SessionManager {
    factory: Arc<dyn BackendFactory>,
    key_provider: Arc<dyn KeyProvider>,
    settings: DetectorSettings,
    backend: RwLock<Option<Arc<dyn DetectorBackend>>>,
    session: RwLock<Option<Arc<Session>>>,
    status: Arc<watch::Sender<ManagerStatus>>,
    swapping: AtomicBool,
    swap_released: Notify,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        key_provider: Arc<dyn KeyProvider>,
        settings: DetectorSettings,
    ) -> Self {
        let (status, _) = watch::channel(ManagerStatus::default());
        Self {
            factory,
            key_provider,
            settings,
            backend: RwLock::new(None),
            session: RwLock::new(None),
            status: Arc::new(status),
            swapping: AtomicBool::new(false),
            swap_released: Notify::new(),
        }
    }

    /// Build with the default factory and an in-memory key provider
    pub fn from_config(config: &SafeScrubConfig) -> crate::Result<Self> {
        let factory = Arc::new(DefaultBackendFactory::from_config(config)?);
        Ok(Self::new(
            factory,
            Arc::new(InMemoryKeyProvider::new()),
            config.detector.clone(),
        ))
    }

    /// Current status snapshot
    pub fn status(&self) -> ManagerStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> watch::Receiver<ManagerStatus> {
        self.status.subscribe()
    }

    fn try_begin_swap(&self) -> Option<SwapGuard<'_>> {
        SwapGuard::acquire(&self.swapping, &self.swap_released)
    }

    /// Wait until no swap is running, then hold the guard
    async fn begin_swap(&self) -> SwapGuard<'_> {
        loop {
            let released = self.swap_released.notified();
            if let Some(guard) = self.try_begin_swap() {
                return guard;
            }
            released.await;
        }
    }

    /// Install the cheap detector backend.
    ///
    /// No-op when already ready or while another initialization runs. May be
    /// called again after a failure.
    pub async fn initialize(&self) -> Result<(), SessionError> {
        if matches!(
            self.status.borrow().init_state,
            InitState::Ready | InitState::Initializing
        ) {
            return Ok(());
        }

        let _guard = self.try_begin_swap().ok_or(SessionError::AlreadyInProgress)?;
        let claimed = self.status.send_if_modified(|s| match s.init_state {
            InitState::Ready | InitState::Initializing => false,
            InitState::Uninitialized | InitState::Error => {
                s.init_state = InitState::Initializing;
                s.status = status::INITIALIZING.to_string();
                s.last_error = None;
                true
            }
        });
        if !claimed {
            return Ok(());
        }

        // Initialization never downloads; NER is enabled afterwards
        let mode = if self.settings.initial_mode.requires_model() {
            DetectorMode::RegexOnly
        } else {
            self.settings.initial_mode
        };

        tracing::info!(mode = %mode, "Initializing anonymizer");
        match self.install(self.detector_config(mode)).await {
            Ok(()) => {
                self.status.send_modify(|s| {
                    s.init_state = InitState::Ready;
                    s.mode = Some(mode);
                    s.status = status::READY.to_string();
                });
                tracing::info!("Anonymizer ready");
                Ok(())
            }
            Err(e) => {
                let err = SessionError::construction(&e);
                tracing::error!(error = %e, "Anonymizer initialization failed");
                self.status.send_modify(|s| {
                    s.init_state = InitState::Error;
                    s.mode = None;
                    s.status = status::ERROR.to_string();
                    s.last_error = Some(e.to_string());
                });
                Err(err)
            }
        }
    }

    /// Switch the active detector backend.
    ///
    /// Enabling NER that fails rolls back to the regex backend so the manager
    /// stays usable; the original failure is still returned.
    pub async fn set_detector_mode(&self, target: DetectorMode) -> Result<(), SessionError> {
        if matches!(
            self.status.borrow().init_state,
            InitState::Uninitialized | InitState::Initializing
        ) {
            return Err(SessionError::NotInitialized);
        }

        let _guard = self.try_begin_swap().ok_or(SessionError::AlreadyInProgress)?;

        // Read under the guard; a swap that just finished has changed `mode`
        let (init_state, installed) = {
            let s = self.status.borrow();
            (s.init_state, s.mode)
        };
        if init_state == InitState::Uninitialized {
            return Err(SessionError::NotInitialized);
        }

        let transition = Transition::plan(installed, target);
        match transition {
            Transition::Noop => Ok(()),
            Transition::EnableNer { fallback } => self.enable_ner(installed, fallback, transition).await,
            Transition::Downgrade { target } => self.downgrade(target, transition).await,
        }
    }

    async fn enable_ner(
        &self,
        prior: Option<DetectorMode>,
        fallback: DetectorMode,
        transition: Transition,
    ) -> Result<(), SessionError> {
        tracing::info!(from = ?prior, "Enabling NER detector");
        self.status.send_modify(|s| {
            s.ner_loading = true;
            s.status = status::LOADING_NER.to_string();
            s.download_progress = status::PREPARING.to_string();
            s.last_error = None;
        });

        let failure = match self.install(self.detector_config(DetectorMode::RegexPlusNer)).await {
            Ok(()) => {
                self.status.send_modify(|s| {
                    s.init_state = InitState::Ready;
                    s.mode = Some(DetectorMode::RegexPlusNer);
                    s.ner_loading = false;
                    s.download_progress.clear();
                    s.status = transition.ready_status().to_string();
                });
                tracing::info!("NER detector ready");
                return Ok(());
            }
            Err(e) => e,
        };

        let err = SessionError::construction(&failure);
        tracing::warn!(error = %failure, "NER initialization failed, falling back to {}", fallback);
        self.status.send_modify(|s| {
            s.mode = None;
            s.download_progress.clear();
            s.last_error = Some(err.user_message());
            s.status = status::ERROR_LOADING_NER.to_string();
        });

        match self.install(self.detector_config(fallback)).await {
            Ok(()) => {
                self.status.send_modify(|s| {
                    s.init_state = InitState::Ready;
                    s.mode = Some(fallback);
                    s.ner_loading = false;
                    s.status = status::READY_NER_DISABLED.to_string();
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Fallback detector failed; anonymizer unusable until re-initialized");
                self.status.send_modify(|s| {
                    s.init_state = InitState::Error;
                    s.mode = None;
                    s.ner_loading = false;
                    s.status = status::ERROR.to_string();
                });
            }
        }

        Err(err)
    }

    async fn downgrade(&self, target: DetectorMode, transition: Transition) -> Result<(), SessionError> {
        tracing::info!(to = %target, "Switching detector");
        match self.install(self.detector_config(target)).await {
            Ok(()) => {
                self.status.send_modify(|s| {
                    s.init_state = InitState::Ready;
                    s.mode = Some(target);
                    s.status = transition.ready_status().to_string();
                });
                Ok(())
            }
            Err(e) => {
                let err = SessionError::construction(&e);
                tracing::error!(
                    error = %e,
                    "Failed to switch detector to {}; anonymizer unusable until re-initialized",
                    target
                );
                self.status.send_modify(|s| {
                    s.init_state = InitState::Error;
                    s.mode = None;
                    s.status = status::ERROR.to_string();
                    s.last_error = Some(err.user_message());
                });
                Err(err)
            }
        }
    }

    /// Dispose the current backend, then construct and await the new one.
    ///
    /// On failure the slot is left empty.
    async fn install(&self, config: DetectorConfig) -> Result<(), BackendError> {
        let previous = self.backend.write().await.take();
        if let Some(old) = previous {
            tracing::debug!(backend = old.name(), "Disposing detector backend");
            old.dispose().await;
        }

        let backend = self.factory.construct(config).await?;
        if let Err(e) = backend.ready().await {
            backend.dispose().await;
            return Err(e);
        }

        *self.backend.write().await = Some(backend);
        Ok(())
    }

    fn detector_config(&self, mode: DetectorMode) -> DetectorConfig {
        let on_status = self.status.clone();
        let on_progress = self.status.clone();
        DetectorConfig {
            mode,
            auto_download: self.settings.auto_download,
            on_status: Some(Arc::new(move |message: &str| {
                on_status.send_modify(|s| s.status = message.to_string());
            })),
            on_download_progress: Some(Arc::new(move |progress: DownloadProgress| {
                on_progress.send_modify(|s| s.download_progress = format_progress(&progress));
            })),
        }
    }

    /// Anonymize `text` and make it the current session.
    ///
    /// Replaces any previous session; later `deanonymize` calls only see the
    /// new one.
    pub async fn anonymize(&self, text: &str) -> Result<AnonymizeOutcome, SessionError> {
        if self.status.borrow().init_state != InitState::Ready {
            return Err(SessionError::NotInitialized);
        }
        let backend = self
            .backend
            .read()
            .await
            .clone()
            .ok_or(SessionError::NotInitialized)?;

        let matches = backend.detect(text).await.map_err(|e| match e {
            BackendError::NotReady | BackendError::Disposed => SessionError::NotInitialized,
            other => SessionError::Unknown(format!("Anonymization failed: {}", other)),
        })?;

        let output = privacy::anonymize(text, matches);
        let key = self.key_provider.get_key().await;
        let encrypted = encrypt_pii_map(&output.pii_map, &key)
            .map_err(|e| SessionError::Unknown(format!("Anonymization failed: {}", e)))?;

        let session = Arc::new(Session::new(encrypted, output.stats));
        let entity_count = session.stats.total_entities;
        tracing::info!(
            session_id = %session.id,
            entities = entity_count,
            backend = backend.name(),
            "Anonymized text"
        );

        if let Some(old) = self.session.write().await.replace(session) {
            tracing::debug!(session_id = %old.id, "Previous session discarded");
        }

        Ok(AnonymizeOutcome {
            anonymized_text: output.anonymized_text,
            entity_count,
        })
    }

    /// Restore original values in `anonymized_text` using the current session.
    ///
    /// Returns either the fully restored text or an error, never a mixture.
    pub async fn deanonymize(&self, anonymized_text: &str) -> Result<String, SessionError> {
        let session = self
            .session
            .read()
            .await
            .clone()
            .ok_or(SessionError::NoActiveSession)?;

        let key = self.key_provider.get_key().await;
        let map = decrypt_pii_map(&session.encrypted_pii_map, &key).map_err(|e| {
            tracing::warn!(session_id = %session.id, error = %e, "Session map could not be decrypted");
            SessionError::DecryptionFailed(e.to_string())
        })?;

        Ok(privacy::rehydrate(anonymized_text, &map))
    }

    /// Destroy the current session. Idempotent.
    pub async fn clear_session(&self) {
        if let Some(old) = self.session.write().await.take() {
            tracing::info!(session_id = %old.id, "Session cleared");
        }
    }

    /// Whether a session exists
    pub async fn has_active_session(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Statistics of the current session
    pub async fn session_stats(&self) -> Option<SessionStats> {
        self.session.read().await.as_ref().map(|s| s.stats.clone())
    }

    /// Dispose the backend and drop the session.
    ///
    /// Waits for a running swap to finish first, so nothing it installs
    /// outlives the shutdown.
    pub async fn shutdown(&self) {
        let _guard = self.begin_swap().await;
        if let Some(backend) = self.backend.write().await.take() {
            backend.dispose().await;
        }
        self.clear_session().await;
        self.status.send_replace(ManagerStatus::default());
        tracing::info!("Anonymizer shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_classification_rules;
    use crate::privacy::anonymize::distinct_tokens;
    use crate::privacy::{
        Classifier, EntityRecognizer, LexiconRecognizer, LoadHooks, ModelLoader,
    };
    use crate::session::{FailureKind, NETWORK_REMEDIATION};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    struct LexiconLoader;

    #[async_trait]
    impl ModelLoader for LexiconLoader {
        async fn load(&self, hooks: &LoadHooks) -> Result<Arc<dyn EntityRecognizer>, BackendError> {
            hooks.progress("lexicon.tsv", Some(100.0));
            Ok(Arc::new(LexiconRecognizer::parse("PERSON\tJohn Smith\n")?))
        }
    }

    /// Serves a fixed lexicon
    struct TermsLoader(&'static str);

    #[async_trait]
    impl ModelLoader for TermsLoader {
        async fn load(&self, _hooks: &LoadHooks) -> Result<Arc<dyn EntityRecognizer>, BackendError> {
            Ok(Arc::new(LexiconRecognizer::parse(self.0)?))
        }
    }

    struct OfflineLoader;

    #[async_trait]
    impl ModelLoader for OfflineLoader {
        async fn load(&self, _hooks: &LoadHooks) -> Result<Arc<dyn EntityRecognizer>, BackendError> {
            Err(BackendError::Network("NetworkError when attempting to fetch resource".into()))
        }
    }

    /// Waits for `release` before loading, so a swap can be held open
    struct GatedLoader {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl ModelLoader for GatedLoader {
        async fn load(&self, hooks: &LoadHooks) -> Result<Arc<dyn EntityRecognizer>, BackendError> {
            self.entered.notify_one();
            self.release.notified().await;
            LexiconLoader.load(hooks).await
        }
    }

    /// Counts constructions and fails chosen modes on demand
    struct ScriptedFactory {
        inner: DefaultBackendFactory,
        failing: Mutex<Vec<DetectorMode>>,
        constructs: AtomicUsize,
    }

    impl ScriptedFactory {
        fn new(loader: Arc<dyn ModelLoader>) -> Self {
            let classifier = Arc::new(Classifier::new(default_classification_rules()).unwrap());
            Self {
                inner: DefaultBackendFactory::new(classifier, loader, true),
                failing: Mutex::new(Vec::new()),
                constructs: AtomicUsize::new(0),
            }
        }

        fn fail(&self, mode: DetectorMode) {
            self.failing.lock().unwrap().push(mode);
        }

        fn heal(&self) {
            self.failing.lock().unwrap().clear();
        }

        fn constructs(&self) -> usize {
            self.constructs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BackendFactory for ScriptedFactory {
        async fn construct(
            &self,
            config: DetectorConfig,
        ) -> Result<Arc<dyn DetectorBackend>, BackendError> {
            self.constructs.fetch_add(1, Ordering::SeqCst);
            if self.failing.lock().unwrap().contains(&config.mode) {
                return Err(BackendError::Other(format!("{} backend unavailable", config.mode)));
            }
            self.inner.construct(config).await
        }
    }

    fn manager_with(factory: Arc<ScriptedFactory>) -> (SessionManager, Arc<InMemoryKeyProvider>) {
        let keys = Arc::new(InMemoryKeyProvider::new());
        let manager = SessionManager::new(factory, keys.clone(), DetectorSettings::default());
        (manager, keys)
    }

    fn manager() -> SessionManager {
        manager_with(Arc::new(ScriptedFactory::new(Arc::new(LexiconLoader)))).0
    }

    #[tokio::test]
    async fn test_email_round_trip() {
        let manager = manager();
        manager.initialize().await.unwrap();

        let text = "Contact John Smith at john@example.com";
        let outcome = manager.anonymize(text).await.unwrap();

        assert_eq!(outcome.entity_count, 1);
        assert_eq!(distinct_tokens(&outcome.anonymized_text), 1);
        assert!(!outcome.anonymized_text.contains("john@example.com"));
        assert!(outcome.anonymized_text.contains("John Smith"));
        assert_eq!(manager.deanonymize(&outcome.anonymized_text).await.unwrap(), text);
    }

    #[tokio::test]
    async fn test_round_trip_with_ner() {
        let manager = manager();
        manager.initialize().await.unwrap();
        manager.set_detector_mode(DetectorMode::RegexPlusNer).await.unwrap();

        let text = "Contact John Smith at john@example.com, my password is hunter2";
        let outcome = manager.anonymize(text).await.unwrap();

        assert_eq!(outcome.entity_count, 3);
        assert!(!outcome.anonymized_text.contains("John Smith"));
        assert_eq!(manager.deanonymize(&outcome.anonymized_text).await.unwrap(), text);

        let stats = manager.session_stats().await.unwrap();
        assert_eq!(stats.total_entities, distinct_tokens(&outcome.anonymized_text));
        assert_eq!(stats.counts_by_type["PERSON"], 1);
    }

    #[tokio::test]
    async fn test_deanonymize_without_session() {
        let manager = manager();
        manager.initialize().await.unwrap();
        assert_eq!(
            manager.deanonymize("anything").await,
            Err(SessionError::NoActiveSession)
        );
    }

    #[tokio::test]
    async fn test_set_mode_before_initialize() {
        let manager = manager();
        assert_eq!(
            manager.set_detector_mode(DetectorMode::RegexPlusNer).await,
            Err(SessionError::NotInitialized)
        );
    }

    #[tokio::test]
    async fn test_anonymize_before_initialize() {
        let manager = manager();
        assert_eq!(
            manager.anonymize("john@example.com").await,
            Err(SessionError::NotInitialized)
        );
        assert!(!manager.has_active_session().await);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let factory = Arc::new(ScriptedFactory::new(Arc::new(LexiconLoader)));
        let (manager, _) = manager_with(factory.clone());

        manager.initialize().await.unwrap();
        manager.initialize().await.unwrap();

        assert_eq!(factory.constructs(), 1);
        let status = manager.status();
        assert_eq!(status.init_state, InitState::Ready);
        assert_eq!(status.mode, Some(DetectorMode::RegexOnly));
        assert_eq!(status.status, "Ready");
    }

    #[tokio::test]
    async fn test_initialize_failure_then_retry() {
        let factory = Arc::new(ScriptedFactory::new(Arc::new(LexiconLoader)));
        factory.fail(DetectorMode::RegexOnly);
        let (manager, _) = manager_with(factory.clone());

        let err = manager.initialize().await.unwrap_err();
        assert!(matches!(err, SessionError::BackendConstructionFailed { .. }));
        let status = manager.status();
        assert_eq!(status.init_state, InitState::Error);
        assert_eq!(status.last_error.as_deref(), Some("regex_only backend unavailable"));

        factory.heal();
        manager.initialize().await.unwrap();
        assert_eq!(manager.status().init_state, InitState::Ready);
        assert!(manager.status().last_error.is_none());
    }

    #[tokio::test]
    async fn test_clear_session_is_idempotent() {
        let manager = manager();
        manager.initialize().await.unwrap();
        manager.anonymize("mail john@example.com").await.unwrap();
        assert!(manager.has_active_session().await);

        manager.clear_session().await;
        manager.clear_session().await;

        assert!(!manager.has_active_session().await);
        assert!(manager.session_stats().await.is_none());
    }

    #[tokio::test]
    async fn test_last_anonymize_wins() {
        let manager = manager();
        manager.initialize().await.unwrap();

        let t1 = "mail a@example.com";
        let t2 = "mail b@example.com";
        let first = manager.anonymize(t1).await.unwrap();
        let second = manager.anonymize(t2).await.unwrap();

        assert_ne!(manager.deanonymize(&first.anonymized_text).await, Ok(t1.to_string()));
        assert_eq!(manager.deanonymize(&second.anonymized_text).await.unwrap(), t2);
    }

    #[tokio::test]
    async fn test_rotated_key_cannot_decrypt() {
        let factory = Arc::new(ScriptedFactory::new(Arc::new(LexiconLoader)));
        let (manager, keys) = manager_with(factory);
        manager.initialize().await.unwrap();

        let outcome = manager.anonymize("mail john@example.com").await.unwrap();
        keys.rotate().await;

        let result = manager.deanonymize(&outcome.anonymized_text).await;
        assert!(matches!(result, Err(SessionError::DecryptionFailed(_))));
    }

    #[tokio::test]
    async fn test_unknown_tokens_pass_through() {
        let manager = manager();
        manager.initialize().await.unwrap();
        let outcome = manager.anonymize("mail john@example.com").await.unwrap();

        let edited = format!(r#"{} cc <PII type="EMAIL" id="7"/>"#, outcome.anonymized_text);
        assert_eq!(
            manager.deanonymize(&edited).await.unwrap(),
            r#"mail john@example.com cc <PII type="EMAIL" id="7"/>"#
        );
    }

    #[tokio::test]
    async fn test_enable_ner_falls_back_on_network_failure() {
        let factory = Arc::new(ScriptedFactory::new(Arc::new(OfflineLoader)));
        let (manager, _) = manager_with(factory);
        manager.initialize().await.unwrap();

        let err = manager
            .set_detector_mode(DetectorMode::RegexPlusNer)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::BackendConstructionFailed {
                kind: FailureKind::NetworkOrCors,
                ..
            }
        ));

        let status = manager.status();
        assert_eq!(status.mode, Some(DetectorMode::RegexOnly));
        assert_eq!(status.init_state, InitState::Ready);
        assert_eq!(status.status, "Ready (NER disabled)");
        assert_eq!(status.last_error.as_deref(), Some(NETWORK_REMEDIATION));
        assert!(!status.ner_loading);

        let outcome = manager.anonymize("mail john@example.com").await.unwrap();
        assert_eq!(outcome.entity_count, 1);
    }

    #[tokio::test]
    async fn test_enable_ner_other_failure_keeps_raw_message() {
        let factory = Arc::new(ScriptedFactory::new(Arc::new(LexiconLoader)));
        factory.fail(DetectorMode::RegexPlusNer);
        let (manager, _) = manager_with(factory);
        manager.initialize().await.unwrap();

        let err = manager
            .set_detector_mode(DetectorMode::RegexPlusNer)
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "regex_plus_ner backend unavailable");
        assert_eq!(manager.status().mode, Some(DetectorMode::RegexOnly));
    }

    #[tokio::test]
    async fn test_fallback_failure_is_terminal_until_initialize() {
        let factory = Arc::new(ScriptedFactory::new(Arc::new(OfflineLoader)));
        let (manager, _) = manager_with(factory.clone());
        manager.initialize().await.unwrap();

        factory.fail(DetectorMode::RegexOnly);
        assert!(manager.set_detector_mode(DetectorMode::RegexPlusNer).await.is_err());

        let status = manager.status();
        assert_eq!(status.init_state, InitState::Error);
        assert_eq!(status.status, "Error");
        assert_eq!(status.mode, None);
        assert_eq!(
            manager.anonymize("mail john@example.com").await,
            Err(SessionError::NotInitialized)
        );

        factory.heal();
        manager.initialize().await.unwrap();
        assert!(manager.status().is_usable());
        assert!(manager.anonymize("mail john@example.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_enable_then_disable_ner() {
        let factory = Arc::new(ScriptedFactory::new(Arc::new(LexiconLoader)));
        let (manager, _) = manager_with(factory.clone());
        manager.initialize().await.unwrap();

        manager.set_detector_mode(DetectorMode::RegexPlusNer).await.unwrap();
        let status = manager.status();
        assert_eq!(status.status, "Ready (NER enabled)");
        assert_eq!(status.download_progress, "");

        manager.set_detector_mode(DetectorMode::RegexPlusNer).await.unwrap();
        assert_eq!(factory.constructs(), 2);

        manager.set_detector_mode(DetectorMode::RegexOnly).await.unwrap();
        let status = manager.status();
        assert_eq!(status.mode, Some(DetectorMode::RegexOnly));
        assert_eq!(status.status, "Ready (NER disabled)");
    }

    #[tokio::test]
    async fn test_disable_failure_leaves_no_backend() {
        let factory = Arc::new(ScriptedFactory::new(Arc::new(LexiconLoader)));
        let (manager, _) = manager_with(factory.clone());
        manager.initialize().await.unwrap();
        manager.set_detector_mode(DetectorMode::RegexPlusNer).await.unwrap();

        factory.fail(DetectorMode::RegexOnly);
        assert!(manager.set_detector_mode(DetectorMode::RegexOnly).await.is_err());
        let status = manager.status();
        assert_eq!(status.mode, None);
        assert_eq!(status.init_state, InitState::Error);
        assert_eq!(status.status, "Error");
        assert_eq!(status.last_error.as_deref(), Some("regex_only backend unavailable"));
        assert!(!status.is_usable());
        assert_eq!(
            manager.anonymize("john@example.com").await,
            Err(SessionError::NotInitialized)
        );

        factory.heal();
        manager.initialize().await.unwrap();
        let status = manager.status();
        assert_eq!(status.init_state, InitState::Ready);
        assert_eq!(status.mode, Some(DetectorMode::RegexOnly));
        assert_eq!(status.status, "Ready");
        assert!(manager.anonymize("john@example.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_disable_failure_recovers_by_switching() {
        let factory = Arc::new(ScriptedFactory::new(Arc::new(LexiconLoader)));
        let (manager, _) = manager_with(factory.clone());
        manager.initialize().await.unwrap();
        manager.set_detector_mode(DetectorMode::RegexPlusNer).await.unwrap();

        factory.fail(DetectorMode::Disabled);
        assert!(manager.set_detector_mode(DetectorMode::Disabled).await.is_err());
        assert_eq!(manager.status().init_state, InitState::Error);

        factory.heal();
        manager.set_detector_mode(DetectorMode::Disabled).await.unwrap();
        let status = manager.status();
        assert_eq!(status.init_state, InitState::Ready);
        assert_eq!(status.status, "Ready (detection disabled)");
        assert!(manager.anonymize("john@example.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_lexicon_type_with_space_round_trips() {
        let factory = Arc::new(ScriptedFactory::new(Arc::new(TermsLoader("FIRST NAME\tJohn\n"))));
        let (manager, _) = manager_with(factory);
        manager.initialize().await.unwrap();
        manager.set_detector_mode(DetectorMode::RegexPlusNer).await.unwrap();

        let outcome = manager.anonymize("hello John").await.unwrap();
        assert_eq!(outcome.anonymized_text, r#"hello <PII type="FIRST NAME" id="1"/>"#);
        assert_eq!(outcome.entity_count, 1);
        assert_eq!(distinct_tokens(&outcome.anonymized_text), outcome.entity_count);
        assert_eq!(manager.deanonymize(&outcome.anonymized_text).await.unwrap(), "hello John");
    }

    #[tokio::test]
    async fn test_initial_ner_mode_starts_with_regex() {
        let factory = Arc::new(ScriptedFactory::new(Arc::new(OfflineLoader)));
        let settings = DetectorSettings {
            initial_mode: DetectorMode::RegexPlusNer,
            ..Default::default()
        };
        let manager = SessionManager::new(factory.clone(), Arc::new(InMemoryKeyProvider::new()), settings);

        manager.initialize().await.unwrap();
        assert_eq!(factory.constructs(), 1);
        assert_eq!(manager.status().mode, Some(DetectorMode::RegexOnly));
    }

    #[tokio::test]
    async fn test_disabled_mode_passes_text_through() {
        let manager = manager();
        manager.initialize().await.unwrap();
        manager.set_detector_mode(DetectorMode::Disabled).await.unwrap();
        assert_eq!(manager.status().status, "Ready (detection disabled)");

        let outcome = manager.anonymize("mail john@example.com").await.unwrap();
        assert_eq!(outcome.entity_count, 0);
        assert_eq!(outcome.anonymized_text, "mail john@example.com");
    }

    #[tokio::test]
    async fn test_concurrent_switch_is_rejected() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let loader = Arc::new(GatedLoader {
            entered: entered.clone(),
            release: release.clone(),
        });
        let (manager, _) = manager_with(Arc::new(ScriptedFactory::new(loader)));
        let manager = Arc::new(manager);
        manager.initialize().await.unwrap();

        let background = manager.clone();
        let switch = tokio::spawn(async move {
            background.set_detector_mode(DetectorMode::RegexPlusNer).await
        });
        entered.notified().await;

        assert!(manager.status().ner_loading);
        assert_eq!(
            manager.set_detector_mode(DetectorMode::Disabled).await,
            Err(SessionError::AlreadyInProgress)
        );
        // No backend is installed mid-swap
        assert_eq!(
            manager.anonymize("john@example.com").await,
            Err(SessionError::NotInitialized)
        );

        release.notify_one();
        switch.await.unwrap().unwrap();
        assert_eq!(manager.status().mode, Some(DetectorMode::RegexPlusNer));
        assert!(manager.set_detector_mode(DetectorMode::RegexOnly).await.is_ok());
    }

    #[tokio::test]
    async fn test_switch_during_swap_plans_against_final_mode() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let loader = Arc::new(GatedLoader {
            entered: entered.clone(),
            release: release.clone(),
        });
        let (manager, _) = manager_with(Arc::new(ScriptedFactory::new(loader)));
        let manager = Arc::new(manager);
        manager.initialize().await.unwrap();

        let background = manager.clone();
        let switch = tokio::spawn(async move {
            background.set_detector_mode(DetectorMode::RegexPlusNer).await
        });
        entered.notified().await;

        // Still reports regex_only, but that backend is already gone
        assert_eq!(manager.status().mode, Some(DetectorMode::RegexOnly));
        assert_eq!(
            manager.set_detector_mode(DetectorMode::RegexOnly).await,
            Err(SessionError::AlreadyInProgress)
        );

        release.notify_one();
        switch.await.unwrap().unwrap();
        manager.set_detector_mode(DetectorMode::RegexOnly).await.unwrap();
        assert_eq!(manager.status().mode, Some(DetectorMode::RegexOnly));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_running_swap() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let loader = Arc::new(GatedLoader {
            entered: entered.clone(),
            release: release.clone(),
        });
        let (manager, _) = manager_with(Arc::new(ScriptedFactory::new(loader)));
        let manager = Arc::new(manager);
        manager.initialize().await.unwrap();

        let background = manager.clone();
        let switch = tokio::spawn(async move {
            background.set_detector_mode(DetectorMode::RegexPlusNer).await
        });
        entered.notified().await;

        let closing = manager.clone();
        let shutdown = tokio::spawn(async move { closing.shutdown().await });
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(!shutdown.is_finished());

        release.notify_one();
        switch.await.unwrap().unwrap();
        shutdown.await.unwrap();

        assert!(manager.backend.read().await.is_none());
        assert_eq!(manager.status(), ManagerStatus::default());
        assert_eq!(
            manager.anonymize("john@example.com").await,
            Err(SessionError::NotInitialized)
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_status_changes() {
        let manager = manager();
        let mut rx = manager.subscribe();
        assert_eq!(rx.borrow().init_state, InitState::Uninitialized);

        manager.initialize().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().status, "Ready");
    }

    #[tokio::test]
    async fn test_shutdown_resets_state() {
        let manager = manager();
        manager.initialize().await.unwrap();
        manager.anonymize("john@example.com").await.unwrap();

        manager.shutdown().await;
        assert!(!manager.has_active_session().await);
        assert_eq!(manager.status(), ManagerStatus::default());
        assert_eq!(
            manager.anonymize("john@example.com").await,
            Err(SessionError::NotInitialized)
        );
    }
}
