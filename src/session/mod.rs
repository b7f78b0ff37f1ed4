//! Anonymization sessions and detector lifecycle

mod error;
mod manager;
mod state;

pub use error::{FailureKind, SessionError, NETWORK_REMEDIATION};
pub use manager::{AnonymizeOutcome, Session, SessionManager};
pub use state::{format_progress, status, InitState, ManagerStatus, Transition};
