//! # Configuration
//!
//! `PawlinkConfig` is resolved once at startup, in layers:
//!
//! 1. Built-in defaults
//! 2. Optional TOML file (`--config <path>`)
//! 3. Environment variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `PAWLINK_API_KEY` | `api_key` (empty disables auth) |
//! | `PAWLINK_RATE_LIMIT` | `rate_limit` (requests/second, 0 disables) |
//! | `PAWLINK_CORS_ORIGINS` | `cors_origins` (comma-separated, or `*`) |
//! | `PAWLINK_LOG_FORMAT` | `log_format` (`text` or `json`) |
//! | `PAWLINK_IDENTITY_HEADER` | `identity_header` |

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Header carrying the caller's user id when none is configured.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-pawlink-user";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(s: &str) -> AppResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(AppError::Config(format!(
                "unknown log format '{}' (expected text or json)",
                other
            ))),
        }
    }
}

/// Runtime configuration for the server and CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PawlinkConfig {
    /// Bearer token required on every route except `/health`.
    pub api_key: Option<String>,
    pub rate_limit: u32,
    /// `None` means localhost only.
    pub cors_origins: Option<String>,
    pub log_format: LogFormat,
    /// Request header the caller's user id is read from.
    pub identity_header: String,
}

impl Default for PawlinkConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            cors_origins: None,
            log_format: LogFormat::Text,
            identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
        }
    }
}

impl PawlinkConfig {
    /// Resolve the full layered configuration.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let base = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        let config = base.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("failed to parse config file: {}", e)))
    }

    /// Apply `PAWLINK_*` overrides looked up through `var`.
    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        if let Some(key) = var("PAWLINK_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(rate) = var("PAWLINK_RATE_LIMIT") {
            self.rate_limit = rate.trim().parse().map_err(|_| {
                AppError::Config(format!("PAWLINK_RATE_LIMIT '{}' is not a number", rate))
            })?;
        }
        if let Some(origins) = var("PAWLINK_CORS_ORIGINS") {
            self.cors_origins = Some(origins);
        }
        if let Some(format) = var("PAWLINK_LOG_FORMAT") {
            self.log_format = LogFormat::parse(&format)?;
        }
        if let Some(header) = var("PAWLINK_IDENTITY_HEADER") {
            self.identity_header = header.trim().to_ascii_lowercase();
        }
        Ok(self)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.identity_header.is_empty() {
            return Err(AppError::Config("identity_header must not be empty".into()));
        }
        if axum::http::HeaderName::from_bytes(self.identity_header.as_bytes()).is_err() {
            return Err(AppError::Config(format!(
                "identity_header '{}' is not a valid header name",
                self.identity_header
            )));
        }
        Ok(())
    }

    /// The API key, treating an empty string as unset.
    pub fn effective_api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

// =============================================================================
// TESTS
// =============================================================================
