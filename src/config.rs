//! SafeScrub configuration management

use crate::privacy::DetectorMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main SafeScrub configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafeScrubConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Detector selection
    #[serde(default)]
    pub detector: DetectorSettings,

    /// NER model assets
    #[serde(default)]
    pub ner: NerConfig,

    /// Model fetch proxy
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Pattern rules
    #[serde(default)]
    pub privacy: PrivacyConfig,
}

impl SafeScrubConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            crate::Error::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed origins for CORS on the anonymizer API (empty = any)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18791,
            cors_origins: Vec::new(),
        }
    }
}

/// Detector selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSettings {
    /// Mode installed by `initialize()`
    pub initial_mode: DetectorMode,

    /// Download model assets on demand when enabling NER
    pub auto_download: bool,

    /// Run semantic analysis together with NER
    pub semantic_enabled: bool,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            initial_mode: DetectorMode::RegexOnly,
            auto_download: true,
            semantic_enabled: true,
        }
    }
}

/// NER model asset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NerConfig {
    /// Model hub endpoint
    pub endpoint: String,

    /// Repository holding the model assets
    pub repository: String,

    /// Branch, tag or commit
    pub revision: String,

    /// Files to fetch
    pub files: Vec<String>,

    /// File (one of `files`) holding the `TYPE<TAB>term` lexicon
    pub lexicon_file: String,

    /// Local cache for downloaded assets
    pub cache_dir: PathBuf,

    /// When set, model URLs are rewritten through this proxy base
    #[serde(default)]
    pub proxy_base: Option<String>,

    /// Expected SHA-256 (hex) per file; unlisted files are not verified
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
}

impl Default for NerConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://huggingface.co".to_string(),
            repository: "safescrub/pii-lexicon".to_string(),
            revision: "main".to_string(),
            files: vec!["config.json".to_string(), "lexicon.tsv".to_string()],
            lexicon_file: "lexicon.tsv".to_string(),
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("safescrub")
                .join("models"),
            proxy_base: None,
            checksums: BTreeMap::new(),
        }
    }
}

/// Remote model fetch proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Mount the proxy routes on the HTTP server
    pub enabled: bool,

    /// Origin that `/api/models/*` forwards to
    pub origin_base: String,

    /// Host that `/api/hf-proxy` accepts
    pub allowed_host: String,

    /// User-Agent sent upstream
    pub user_agent: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origin_base: "https://cas-bridge.xethub.hf.co".to_string(),
            allowed_host: "huggingface.co".to_string(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36"
                .to_string(),
        }
    }
}

/// Privacy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Pattern rules used by the regex detector
    pub rules: Vec<ClassificationRule>,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            rules: default_classification_rules(),
        }
    }
}

/// A single pattern rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRule {
    /// Rule name
    pub name: String,
    /// Entity type label produced by this rule
    pub entity_type: String,
    /// Regex pattern
    pub pattern: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
}

impl ClassificationRule {
    fn new(name: &str, entity_type: &str, pattern: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            pattern: pattern.to_string(),
            description: description.to_string(),
        }
    }
}

/// Built-in pattern rules
pub fn default_classification_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::new(
            "email",
            "EMAIL",
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            "Email address",
        ),
        ClassificationRule::new(
            "credit_card",
            "CREDIT_CARD",
            r"\b(?:\d{4}[-\s]?){3}\d{4}\b",
            "Payment card number",
        ),
        ClassificationRule::new(
            "ssn",
            "SSN",
            r"\b\d{3}-\d{2}-\d{4}\b",
            "US social security number",
        ),
        ClassificationRule::new(
            "iban",
            "IBAN",
            r"\b[A-Z]{2}\d{2}(?:\s?[A-Z0-9]{4}){2,7}(?:\s?[A-Z0-9]{1,4})?\b",
            "International bank account number",
        ),
        ClassificationRule::new(
            "phone",
            "PHONE",
            r"(?:\+\d{1,3}[\s.-]?)?\(?\b\d{3}\)?[\s.-]\d{3}[\s.-]\d{4}\b",
            "Phone number",
        ),
        ClassificationRule::new(
            "ip_address",
            "IP_ADDRESS",
            r"\b(?:(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\b",
            "IPv4 address",
        ),
        ClassificationRule::new(
            "url",
            "URL",
            r#"https?://[^\s<>"']+"#,
            "Web address",
        ),
    ]
}

mod dirs {
    use std::path::PathBuf;

    pub fn cache_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Caches"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_CACHE_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".cache")))
        }
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            None
        }
    }
}
