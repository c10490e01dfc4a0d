//! # Server Configuration
//!
//! Server settings come from an optional TOML file merged with `LINEAL_*`
//! environment variables. Environment always wins, so a deployment can
//! override a checked-in config file without editing it.
//!
//! ## File format
//!
//! ```toml
//! bind = "127.0.0.1:8080"
//! rate_limit = 100
//! api_key = "secret"
//! cors_origins = ["http://localhost:3000"]
//! ```
//!
//! ## Environment variables
//!
//! - `LINEAL_BIND` - socket address to bind
//! - `LINEAL_RATE_LIMIT` - requests per second, 0 disables limiting
//! - `LINEAL_API_KEY` - enables Bearer-token authentication when set
//! - `LINEAL_CORS_ORIGINS` - comma-separated origins, or `*` for all

use crate::AppError;
use serde::Deserialize;
use std::path::Path;

/// Default bind address.
const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Default rate limit in requests per second.
const DEFAULT_RATE_LIMIT: u32 = 100;

// =============================================================================
// SERVER CONFIG
// =============================================================================

/// Resolved server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to.
    pub bind: String,
    /// Requests per second; 0 disables rate limiting.
    pub rate_limit: u32,
    /// Bearer-token API key; `None` disables authentication.
    pub api_key: Option<String>,
    /// Allowed CORS origins. `None` means localhost only; a single `"*"`
    /// entry allows everything.
    pub cors_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            rate_limit: DEFAULT_RATE_LIMIT,
            api_key: None,
            cors_origins: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration: defaults, then the TOML file if given, then
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    AppError::Io(format!("cannot read config '{}': {e}", path.display()))
                })?;
                toml::from_str(&contents).map_err(|e| {
                    AppError::Config(format!("invalid config '{}': {e}", path.display()))
                })?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `LINEAL_*` environment variables on top of the current values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("LINEAL_BIND")
            && !bind.is_empty()
        {
            self.bind = bind;
        }
        if let Ok(limit) = std::env::var("LINEAL_RATE_LIMIT")
            && let Ok(parsed) = limit.parse()
        {
            self.rate_limit = parsed;
        }
        if let Ok(key) = std::env::var("LINEAL_API_KEY")
            && !key.is_empty()
        {
            self.api_key = Some(key);
        }
        if let Ok(origins) = std::env::var("LINEAL_CORS_ORIGINS")
            && !origins.is_empty()
        {
            self.cors_origins = Some(
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
