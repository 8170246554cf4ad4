//! Configuration for aion-client.
//!
//! Supports loading from TOML file with environment variable overrides.
//! Allocation thresholds are read once here and never mutated afterwards.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use rust_decimal::Decimal;
use serde::Deserialize;

use aion_common::AllocationThresholds;

use crate::api::{DEFAULT_BACKEND_URL, REQUEST_TIMEOUT};
use crate::provider::RpcWalletProviderConfig;
use crate::provider::rpc::DEFAULT_PROVIDER_URL;
use crate::session::SessionManagerConfig;

/// Top-level configuration for aion-client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Logging level.
    pub log_level: String,

    /// Backend API settings.
    pub backend: BackendConfig,

    /// Chain allocation thresholds.
    pub allocation: AllocationThresholds,

    /// Session manager settings.
    pub session: SessionConfig,

    /// Wallet provider settings.
    pub provider: ProviderConfig,
}

/// Backend API settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL, e.g. `http://localhost:8001/api`.
    pub url: String,
    pub request_timeout: Duration,
    /// Sent as `X-API-Key` on market creation and migration.
    pub api_key: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout: REQUEST_TIMEOUT,
            api_key: None,
        }
    }
}

/// Session manager settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on the wallet handshake, prompt included.
    pub connect_timeout: Duration,
    /// Reconnect silently on start if the wallet already authorized us.
    pub restore_on_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: SessionManagerConfig::default().connect_timeout,
            restore_on_start: true,
        }
    }
}

impl SessionConfig {
    pub fn manager_config(&self) -> SessionManagerConfig {
        SessionManagerConfig {
            connect_timeout: self.connect_timeout,
        }
    }
}

/// Wallet provider settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// JSON-RPC endpoint of the wallet.
    pub rpc_url: String,
    /// How often the wallet is polled for account and network changes.
    pub poll_interval: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_PROVIDER_URL.to_string(),
            poll_interval: Duration::from_millis(1000),
        }
    }
}

impl ProviderConfig {
    pub fn rpc_config(&self) -> RpcWalletProviderConfig {
        RpcWalletProviderConfig {
            url: self.rpc_url.clone(),
            poll_interval: self.poll_interval,
            ..RpcWalletProviderConfig::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            backend: BackendConfig::default(),
            allocation: AllocationThresholds::default(),
            session: SessionConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TomlConfig = toml::from_str(content).context("Failed to parse TOML config")?;
        Ok(Self::from(file))
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("AION_BACKEND_URL") {
            self.backend.url = url;
        }
        if let Ok(key) = std::env::var("AION_API_KEY") {
            self.backend.api_key = non_empty(key);
        }
        if let Ok(url) = std::env::var("AION_PROVIDER_URL") {
            self.provider.rpc_url = url;
        }
        if let Ok(level) = std::env::var("AION_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_cli_overrides(
        &mut self,
        backend_url: Option<String>,
        provider_url: Option<String>,
        log_level: Option<String>,
    ) {
        if let Some(url) = backend_url {
            self.backend.url = url;
        }
        if let Some(url) = provider_url {
            self.provider.rpc_url = url;
        }
        if let Some(level) = log_level
            && !level.is_empty()
        {
            self.log_level = level;
        }
    }

    /// Validate configuration and return errors for invalid values.
    pub fn validate(&self) -> Result<()> {
        if self.backend.url.trim().is_empty() {
            bail!("backend.url cannot be empty");
        }
        if self.backend.request_timeout.is_zero() {
            bail!("backend.request_timeout_secs must be at least 1");
        }

        if self.allocation.high_value_stake <= Decimal::ZERO {
            bail!("allocation.high_value_stake must be positive");
        }
        if self.allocation.high_volume_participants == 0 {
            bail!("allocation.high_volume_participants must be at least 1");
        }

        if self.session.connect_timeout.is_zero() {
            bail!("session.connect_timeout_secs must be at least 1");
        }

        if self.provider.rpc_url.trim().is_empty() {
            bail!("provider.rpc_url cannot be empty");
        }
        if self.provider.poll_interval.is_zero() {
            bail!("provider.poll_interval_ms must be at least 1");
        }

        Ok(())
    }
}

// ============================================================================
// TOML deserialization structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    general: GeneralToml,
    #[serde(default)]
    backend: BackendToml,
    #[serde(default)]
    allocation: AllocationToml,
    #[serde(default)]
    session: SessionToml,
    #[serde(default)]
    provider: ProviderToml,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeneralToml {
    log_level: String,
}

impl Default for GeneralToml {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct BackendToml {
    url: String,
    request_timeout_secs: u64,
    api_key: Option<String>,
}

impl Default for BackendToml {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT.as_secs(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AllocationToml {
    high_value_stake: f64,
    high_volume_participants: u64,
}

impl Default for AllocationToml {
    fn default() -> Self {
        Self {
            high_value_stake: 10000.0,
            high_volume_participants: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SessionToml {
    connect_timeout_secs: u64,
    restore_on_start: bool,
}

impl Default for SessionToml {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 60,
            restore_on_start: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ProviderToml {
    rpc_url: String,
    poll_interval_ms: u64,
}

impl Default for ProviderToml {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_PROVIDER_URL.to_string(),
            poll_interval_ms: 1000,
        }
    }
}

/// Convert f64 to Decimal. Non-finite values become zero and fail validation.
fn f64_to_decimal(val: f64) -> Decimal {
    Decimal::try_from(val).unwrap_or(Decimal::ZERO)
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl From<TomlConfig> for ClientConfig {
    fn from(toml: TomlConfig) -> Self {
        Self {
            log_level: toml.general.log_level,
            backend: BackendConfig {
                url: toml.backend.url,
                request_timeout: Duration::from_secs(toml.backend.request_timeout_secs),
                api_key: toml.backend.api_key.and_then(non_empty),
            },
            allocation: AllocationThresholds::new(
                f64_to_decimal(toml.allocation.high_value_stake).normalize(),
                toml.allocation.high_volume_participants,
            ),
            session: SessionConfig {
                connect_timeout: Duration::from_secs(toml.session.connect_timeout_secs),
                restore_on_start: toml.session.restore_on_start,
            },
            provider: ProviderConfig {
                rpc_url: toml.provider.rpc_url,
                poll_interval: Duration::from_millis(toml.provider.poll_interval_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.backend.url, "http://localhost:8001/api");
        assert_eq!(config.allocation.high_value_stake, dec!(10000));
        assert_eq!(config.allocation.high_volume_participants, 100);
        assert!(config.session.restore_on_start);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_matches_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        let defaults = ClientConfig::default();
        assert_eq!(config.allocation, defaults.allocation);
        assert_eq!(config.backend.request_timeout, defaults.backend.request_timeout);
        assert_eq!(config.session.connect_timeout, defaults.session.connect_timeout);
        assert_eq!(config.provider.rpc_url, defaults.provider.rpc_url);
        assert_eq!(config.backend.api_key, None);
    }

    #[test]
    fn test_backend_api_key() {
        let config = ClientConfig::from_toml_str("[backend]\napi_key = \" k-123 \"").unwrap();
        assert_eq!(config.backend.api_key.as_deref(), Some("k-123"));

        let blank = ClientConfig::from_toml_str("[backend]\napi_key = \"\"").unwrap();
        assert_eq!(blank.backend.api_key, None);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [general]
            log_level = "debug"

            [backend]
            url = "https://aion.example/api"
            request_timeout_secs = 5

            [allocation]
            high_value_stake = 2500.5
            high_volume_participants = 40

            [session]
            connect_timeout_secs = 15
            restore_on_start = false

            [provider]
            rpc_url = "http://wallet:8545"
            poll_interval_ms = 250
        "#;

        let config = ClientConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.backend.url, "https://aion.example/api");
        assert_eq!(config.backend.request_timeout, Duration::from_secs(5));
        assert_eq!(config.allocation.high_value_stake, dec!(2500.5));
        assert_eq!(config.allocation.high_volume_participants, 40);
        assert_eq!(config.session.connect_timeout, Duration::from_secs(15));
        assert!(!config.session.restore_on_start);
        assert_eq!(config.provider.rpc_url, "http://wallet:8545");
        assert_eq!(config.provider.poll_interval, Duration::from_millis(250));
        assert_eq!(config.session.manager_config().connect_timeout, Duration::from_secs(15));
        assert_eq!(config.provider.rpc_config().url, "http://wallet:8545");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[allocation]\nhigh_volume_participants = 7").unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.allocation.high_volume_participants, 7);
        assert_eq!(config.allocation.high_value_stake, dec!(10000));
    }

    #[test]
    fn test_from_file_missing() {
        let err = ClientConfig::from_file("/nonexistent/aion.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = ClientConfig::default();
        config.apply_cli_overrides(
            Some("http://override/api".to_string()),
            None,
            Some("trace".to_string()),
        );
        assert_eq!(config.backend.url, "http://override/api");
        assert_eq!(config.provider.rpc_url, DEFAULT_PROVIDER_URL);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_validate_zero_stake_threshold() {
        let mut config = ClientConfig::default();
        config.allocation.high_value_stake = Decimal::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_participant_threshold() {
        let mut config = ClientConfig::default();
        config.allocation.high_volume_participants = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_backend_url() {
        let mut config = ClientConfig::default();
        config.backend.url = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_timeouts() {
        let mut config = ClientConfig::default();
        config.session.connect_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.backend.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
