//! Configuration for the mock server.
//!
//! This is the raw, declarative document as written by users. Nothing in
//! here is trusted until [`MockServerConfig::compile`] has turned the mocks
//! into a validated [`RuleSet`].

use crate::error::ConfigError;
use crate::rules::{validate_rules, ContentLoader, RuleSet};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockServerConfig {
    /// Server-wide settings
    #[serde(default)]
    pub settings: ServerSettings,

    /// Mock definitions, in declaration order
    #[serde(default)]
    pub mocks: Vec<RawRule>,
}

impl MockServerConfig {
    /// Load configuration from a YAML file.
    ///
    /// Relative `file` paths in responses are resolved against the directory
    /// containing the configuration file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;

        if let Some(base) = path.parent() {
            config.resolve_files_against(base);
        }
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Validate settings and the presence of mocks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        if self.mocks.is_empty() {
            return Err(ConfigError::NoMocks);
        }
        Ok(())
    }

    /// Validate everything and build the rule set.
    pub fn compile(&self, loader: &dyn ContentLoader) -> Result<RuleSet, ConfigError> {
        self.validate()?;
        validate_rules(&self.mocks, loader)
    }

    fn resolve_files_against(&mut self, base: &Path) {
        for mock in &mut self.mocks {
            if let Some(file) = mock.response.as_mut().and_then(|r| r.file.as_mut()) {
                if file.is_relative() {
                    *file = base.join(&*file);
                }
            }
        }
    }
}

/// Server-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Address to listen on, as `<host>:<port>`; required
    #[serde(default)]
    pub listen_addr: Option<String>,

    /// Optional file receiving one JSON line per request
    #[serde(default)]
    pub request_log_path: Option<PathBuf>,

    /// How the sleep for a delayed response is chosen
    #[serde(default)]
    pub delay_mode: DelayMode,

    /// Log all matched requests
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: None,
            request_log_path: None,
            delay_mode: DelayMode::default(),
            log_matches: true,
            log_unmatched: true,
        }
    }
}

impl ServerSettings {
    /// Validate the settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let addr = self.listen_addr()?;
        let invalid = || ConfigError::InvalidListenAddr {
            addr: addr.to_string(),
        };
        let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
        if host.trim().is_empty() {
            return Err(invalid());
        }
        port.parse::<u16>().map_err(|_| invalid())?;
        Ok(())
    }

    /// The configured listen address, if present and non-blank.
    pub fn listen_addr(&self) -> Result<&str, ConfigError> {
        self.listen_addr
            .as_deref()
            .filter(|addr| !addr.trim().is_empty())
            .ok_or(ConfigError::MissingListenAddr)
    }
}

fn default_true() -> bool {
    true
}

/// Delay selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DelayMode {
    /// Uniform draw in `[min_millis, max_millis]`
    #[default]
    Random,
    /// Always sleep `max_millis`
    Max,
}

/// A single mock as declared.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawRule {
    /// Unique name, trimmed before use
    #[serde(default)]
    pub name: String,

    /// Request predicate
    #[serde(default)]
    pub request: Option<RawRequest>,

    /// Response recipe
    #[serde(default)]
    pub response: Option<RawResponse>,
}

/// Request predicate as declared.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawRequest {
    /// Path pattern, e.g. `/users/{id}/**`
    #[serde(default)]
    pub path: Option<String>,

    /// HTTP verb, uppercase
    #[serde(default)]
    pub verb: Option<String>,

    /// Header name to regex
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Query key to regex
    #[serde(default)]
    pub queries: BTreeMap<String, String>,
}

/// Response recipe as declared.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawResponse {
    /// HTTP status code (0 or absent means 200)
    #[serde(default)]
    pub status: Option<i64>,

    /// Template text for the body
    #[serde(default)]
    pub body: Option<String>,

    /// File whose bytes are the body
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Static response headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Latency simulation
    #[serde(default)]
    pub delay: Option<RawDelay>,
}

/// Latency bounds as declared.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawDelay {
    #[serde(default)]
    pub min_millis: i64,

    #[serde(default)]
    pub max_millis: i64,
}
