//! Structured failures returned by the session manager

use crate::privacy::BackendError;
use serde::Serialize;
use thiserror::Error;

/// Message shown when a model download fails for network reasons
pub const NETWORK_REMEDIATION: &str =
    "NER model download failed. Please check your connection and try again.";

/// Why a backend could not be constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Download or cross-origin failure; retrying may help
    NetworkOrCors,
    /// Anything else
    Other,
}

/// Session manager error taxonomy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Not initialized")]
    NotInitialized,

    #[error("Another detector change is already in progress")]
    AlreadyInProgress,

    #[error("Failed to construct detector backend: {message}")]
    BackendConstructionFailed { kind: FailureKind, message: String },

    #[error("No active session")]
    NoActiveSession,

    #[error("Failed to restore original data: {0}")]
    DecryptionFailed(String),

    #[error("{0}")]
    Unknown(String),
}

impl SessionError {
    /// Classify a collaborator failure raised while building a backend
    pub fn construction(err: &BackendError) -> Self {
        let kind = if err.is_network() {
            FailureKind::NetworkOrCors
        } else {
            FailureKind::Other
        };
        let message = match err {
            BackendError::Network(m)
            | BackendError::Model(m)
            | BackendError::Other(m) => m.clone(),
            other => other.to_string(),
        };
        Self::BackendConstructionFailed { kind, message }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::AlreadyInProgress => "already_in_progress",
            Self::BackendConstructionFailed {
                kind: FailureKind::NetworkOrCors,
                ..
            } => "backend_network",
            Self::BackendConstructionFailed { .. } => "backend_construction_failed",
            Self::NoActiveSession => "no_active_session",
            Self::DecryptionFailed(_) => "decryption_failed",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Text suitable for an end user
    pub fn user_message(&self) -> String {
        match self {
            Self::NotInitialized => "Not initialized".to_string(),
            Self::AlreadyInProgress => {
                "A detector change is already in progress. Please wait.".to_string()
            }
            Self::BackendConstructionFailed {
                kind: FailureKind::NetworkOrCors,
                ..
            } => NETWORK_REMEDIATION.to_string(),
            Self::BackendConstructionFailed { message, .. } => message.clone(),
            Self::NoActiveSession => "No active session. Please scrub text first.".to_string(),
            Self::DecryptionFailed(_) => "Failed to restore original data".to_string(),
            Self::Unknown(message) => message.clone(),
        }
    }
}
