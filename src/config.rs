use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::GovernanceError;

pub const DEFAULT_CONFIG_FILE: &str = "civic-governance.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
    pub governance: GovernanceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceSettings {
    /// Share of eligible board members that must be present, used when a
    /// board is created without its own value.
    pub default_quorum_percent: u32,
    pub require_approval_signatures: bool,
    pub event_page_size: i64,
}

impl AppConfig {
    /// Load from `civic-governance.toml` (if present) and `CIVIC_*` variables.
    pub fn load() -> Result<Self, GovernanceError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, GovernanceError> {
        let settings = Self::builder()?
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("CIVIC")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| GovernanceError::ConfigError(format!("Failed to build config: {}", e)))?;

        let config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| GovernanceError::ConfigError(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, GovernanceError> {
        config::Config::builder()
            .set_default("database_url", "sqlite://civic-governance.db")
            .and_then(|b| b.set_default("server_host", "0.0.0.0"))
            .and_then(|b| b.set_default("server_port", 3000))
            .and_then(|b| b.set_default("jwt_secret", "change-me-in-production"))
            .and_then(|b| b.set_default("token_ttl_secs", 86_400))
            .and_then(|b| b.set_default("governance.default_quorum_percent", 51))
            .and_then(|b| b.set_default("governance.require_approval_signatures", false))
            .and_then(|b| b.set_default("governance.event_page_size", 50))
            .map_err(|e| GovernanceError::ConfigError(format!("Invalid default: {}", e)))
    }

    pub fn validate(&self) -> Result<(), GovernanceError> {
        if !(1..=100).contains(&self.governance.default_quorum_percent) {
            return Err(GovernanceError::ConfigError(format!(
                "governance.default_quorum_percent must be within 1..=100, got {}",
                self.governance.default_quorum_percent
            )));
        }
        if self.jwt_secret.is_empty() {
            return Err(GovernanceError::ConfigError(
                "jwt_secret must not be empty".to_string(),
            ));
        }
        if self.token_ttl_secs <= 0 {
            return Err(GovernanceError::ConfigError(
                "token_ttl_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// In-memory settings for tests and local tooling.
    pub fn for_testing() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            token_ttl_secs: 3600,
            governance: GovernanceSettings {
                default_quorum_percent: 51,
                require_approval_signatures: false,
                event_page_size: 50,
            },
        }
    }
}
