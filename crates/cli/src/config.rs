//! CLI configuration
//!
//! Layers, lowest precedence first: built-in defaults, an optional config
//! file, then `LEDGER_*` environment variables (`__` separates sections, e.g.
//! `LEDGER_API__BASE_URL`).

use anyhow::Result;
use ledger_http::ApiClient;
use ledger_session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// API server configuration
    pub api: ApiConfig,

    /// Session timing
    pub session: SessionTiming,

    /// Data directory for the persisted session and logs
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the Ledger API
    pub base_url: String,

    /// Request timeout in seconds (0 disables the timeout)
    pub timeout_secs: u64,

    /// Override of the User-Agent header
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTiming {
    /// Seconds before expiry at which a token counts as expired
    pub expiry_margin_secs: u64,

    /// Seconds before expiry at which the proactive refresh fires
    pub refresh_lead_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
            user_agent: None,
        }
    }
}

impl Default for SessionTiming {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            expiry_margin_secs: defaults.expiry_margin.as_secs(),
            refresh_lead_secs: defaults.refresh_lead.as_secs(),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from defaults, `file` (if any) and the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("api.base_url", defaults.api.base_url)?
            .set_default("api.timeout_secs", defaults.api.timeout_secs)?
            .set_default(
                "session.expiry_margin_secs",
                defaults.session.expiry_margin_secs,
            )?
            .set_default(
                "session.refresh_lead_secs",
                defaults.session.refresh_lead_secs,
            )?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("LEDGER").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Data directory: explicit override, then config, then the platform default
    pub fn resolve_data_dir(&self, cli_override: Option<PathBuf>) -> PathBuf {
        cli_override
            .or_else(|| self.data_dir.clone())
            .unwrap_or_else(|| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("ledger")
            })
    }

    pub const fn session_config(&self) -> SessionConfig {
        SessionConfig {
            expiry_margin: Duration::from_secs(self.session.expiry_margin_secs),
            refresh_lead: Duration::from_secs(self.session.refresh_lead_secs),
        }
    }

    /// Build the unauthenticated API client
    pub fn api_client(&self) -> Result<ApiClient> {
        let mut builder = ApiClient::builder().base_url(&self.api.base_url);
        if self.api.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(self.api.timeout_secs));
        }
        if let Some(agent) = &self.api.user_agent {
            builder = builder.user_agent(agent);
        }
        Ok(builder.build()?)
    }
}
