//! SafeScrub - Local PII anonymization with reversible, encrypted sessions
//!
//! SafeScrub replaces personally identifiable information in text with
//! placeholder tokens before the text leaves the machine, and restores the
//! original values in whatever comes back.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      Session Manager                        │
//! │  - Single-flight detector swaps with NER fallback           │
//! │  - Observable status (watch channel)                        │
//! │  - One encrypted session (last anonymize wins)              │
//! └──────────────┬──────────────────────────────┬──────────────┘
//!                │                              │
//! ┌──────────────▼──────────────┐  ┌────────────▼──────────────┐
//! │      Detector Backends      │  │        PII Map Crypto      │
//! │  disabled | regex | regex+  │  │  AES-256-GCM, fresh nonce  │
//! │  semantic+NER (lexicon)     │  │  key from a KeyProvider    │
//! └──────────────┬──────────────┘  └───────────────────────────┘
//!                │ model assets
//! ┌──────────────▼──────────────┐
//! │  Model loader ── proxy ──▶  model hub                       │
//! └─────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`session`]: Session manager, status surface and error taxonomy
//! - [`privacy`]: Detection backends, anonymization and rehydration
//! - [`crypto`]: PII map encryption and key providers
//! - [`proxy`]: Model download proxy and URL rewriting
//! - [`api`]: HTTP API
//! - [`config`]: Configuration management

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod privacy;
pub mod proxy;
pub mod session;

pub use config::SafeScrubConfig;
pub use error::{Error, Result};
