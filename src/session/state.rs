//! Observable manager status and the detector mode transition table

use crate::privacy::{DetectorMode, DownloadProgress};
use serde::Serialize;

/// Process-wide initialization state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InitState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Error,
}

/// Snapshot of everything a UI shows about the manager.
///
/// Published through a `tokio::sync::watch` channel; every mutation goes
/// through the session manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStatus {
    pub init_state: InitState,
    /// Mode of the installed, ready backend (`None` when there is none)
    pub mode: Option<DetectorMode>,
    pub ner_loading: bool,
    /// Human-readable status line
    pub status: String,
    pub last_error: Option<String>,
    /// Latest per-file download progress, e.g. `model.onnx: 42%`
    pub download_progress: String,
}

impl Default for ManagerStatus {
    fn default() -> Self {
        Self {
            init_state: InitState::Uninitialized,
            mode: None,
            ner_loading: false,
            status: status::NOT_INITIALIZED.to_string(),
            last_error: None,
            download_progress: String::new(),
        }
    }
}

impl ManagerStatus {
    /// Whether anonymization can run right now
    pub fn is_usable(&self) -> bool {
        self.init_state == InitState::Ready && self.mode.is_some()
    }
}

/// Status line texts
pub mod status {
    pub const NOT_INITIALIZED: &str = "Not initialized";
    pub const INITIALIZING: &str = "Initializing...";
    pub const READY: &str = "Ready";
    pub const LOADING_NER: &str = "Loading NER model...";
    pub const PREPARING: &str = "Preparing...";
    pub const READY_NER_ENABLED: &str = "Ready (NER enabled)";
    pub const READY_NER_DISABLED: &str = "Ready (NER disabled)";
    pub const READY_DETECTION_DISABLED: &str = "Ready (detection disabled)";
    pub const ERROR_LOADING_NER: &str = "Error loading NER";
    pub const ERROR: &str = "Error";
}

/// Render a download progress event for the status surface
pub fn format_progress(progress: &DownloadProgress) -> String {
    format!(
        "{}: {}%",
        progress.file,
        progress.percent.unwrap_or(0.0).round() as u64
    )
}

/// One edge of the detector mode state machine.
///
/// ```text
/// {Disabled, RegexOnly, none} ── enable ──▶ RegexPlusNer
///                 ▲                              │
///                 │    rollback on failure       │
///                 └──── (to RegexOnly) ──────────┘
/// {RegexPlusNer, RegexOnly, Disabled, none} ── downgrade ──▶ RegexOnly | Disabled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Target already installed
    Noop,
    /// Install the NER backend; on failure roll back to the fallback mode
    EnableNer { fallback: DetectorMode },
    /// Install a cheaper backend; no rollback edge
    Downgrade { target: DetectorMode },
}

impl Transition {
    /// Plan the move from the installed mode (if any) to `target`
    pub fn plan(installed: Option<DetectorMode>, target: DetectorMode) -> Self {
        if installed == Some(target) {
            return Self::Noop;
        }
        match target {
            DetectorMode::RegexPlusNer => Self::EnableNer {
                fallback: DetectorMode::RegexOnly,
            },
            other => Self::Downgrade { target: other },
        }
    }

    /// Status text once the transition succeeds
    pub fn ready_status(&self) -> &'static str {
        match self {
            Self::Noop => status::READY,
            Self::EnableNer { .. } => status::READY_NER_ENABLED,
            Self::Downgrade {
                target: DetectorMode::Disabled,
            } => status::READY_DETECTION_DISABLED,
            Self::Downgrade { .. } => status::READY_NER_DISABLED,
        }
    }
}
