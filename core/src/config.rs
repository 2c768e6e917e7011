//! # Gateway Configuration
//!
//! One explicit, immutable configuration value, constructed at startup and
//! passed by `Arc` into everything that needs it. There is no process-wide
//! mutable config singleton anywhere in this codebase, on purpose.
//!
//! Values come from a TOML file (`--config` / `MARQUEE_CONFIG`), with
//! individual environment-variable overrides applied on top for container
//! deployments where mounting a file is inconvenient. After
//! [`GatewayConfig::validate`] passes, the value is read-only for the life
//! of the process.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default TTL for a staged proxy delegation, in seconds.
pub const DEFAULT_PROXY_TTL_SECS: u64 = 300;

/// Default TTL for a staged purchase, in seconds. Long enough for a human
/// to read a confirmation screen, short enough that stale price quotes
/// don't linger.
pub const DEFAULT_PURCHASE_TTL_SECS: u64 = 600;

/// Default per-leg ledger call deadline, in milliseconds.
pub const DEFAULT_LEG_TIMEOUT_MS: u64 = 10_000;

/// Default interval between expiry sweeps, in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

/// Default retention window for terminal descriptors, in seconds.
/// One hour gives operators time to pull partial-failure details before
/// the store reclaims the slot.
pub const DEFAULT_RETENTION_SECS: u64 = 3_600;

/// Default HTTP API port.
pub const DEFAULT_LISTEN_PORT: u16 = 8080;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9185;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`GatewayConfig`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// A required field is missing or a value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Static configuration for the gateway process.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GatewayConfig {
    /// Base URL of the external ledger service.
    pub ledger_endpoint: String,
    /// API key presented to the ledger on every call.
    pub ledger_api_key: String,
    /// API secret paired with the key.
    pub ledger_api_secret: String,

    /// Operator (seller-side) wallet address. Receives payments, holds the
    /// movie token inventory, and is the grantee of proxy delegations.
    pub operator_address: String,
    /// Operator wallet secret, forwarded to the ledger on transfers out of
    /// the operator wallet.
    pub operator_secret: String,

    /// Ledger service-contract id for base-coin operations.
    pub service_contract_id: String,
    /// Ledger item-contract id for fungible/non-fungible tokens.
    pub item_contract_id: String,
    /// Token type of the fungible discount credit.
    pub fungible_token_type: String,
    /// Token type of the non-fungible movie token.
    pub non_fungible_token_type: String,

    /// Base-coin price of one movie ticket.
    pub ticket_price: u64,

    /// TTL for staged proxy delegations, seconds.
    pub proxy_ttl_secs: u64,
    /// TTL for staged purchases, seconds.
    pub purchase_ttl_secs: u64,
    /// Per-leg ledger call deadline, milliseconds.
    pub leg_timeout_ms: u64,
    /// Interval between expiry sweeps, seconds.
    pub sweep_interval_secs: u64,
    /// How long terminal descriptors are retained before deletion, seconds.
    pub retention_secs: u64,

    /// HTTP API listen port.
    pub listen_port: u16,
    /// Prometheus metrics listen port.
    pub metrics_port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            ledger_endpoint: String::new(),
            ledger_api_key: String::new(),
            ledger_api_secret: String::new(),
            operator_address: String::new(),
            operator_secret: String::new(),
            service_contract_id: String::new(),
            item_contract_id: String::new(),
            fungible_token_type: String::new(),
            non_fungible_token_type: String::new(),
            ticket_price: 0,
            proxy_ttl_secs: DEFAULT_PROXY_TTL_SECS,
            purchase_ttl_secs: DEFAULT_PURCHASE_TTL_SECS,
            leg_timeout_ms: DEFAULT_LEG_TIMEOUT_MS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            retention_secs: DEFAULT_RETENTION_SECS,
            listen_port: DEFAULT_LISTEN_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from a TOML file, then applies environment
    /// overrides and validates the result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: GatewayConfig =
            toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Overrides individual fields from `MARQUEE_*` environment variables.
    ///
    /// Only connection and identity material is overridable — timing knobs
    /// belong in the file where they can be reviewed.
    pub fn apply_env_overrides(&mut self) {
        override_from_env(&mut self.ledger_endpoint, "MARQUEE_LEDGER_ENDPOINT");
        override_from_env(&mut self.ledger_api_key, "MARQUEE_LEDGER_API_KEY");
        override_from_env(&mut self.ledger_api_secret, "MARQUEE_LEDGER_API_SECRET");
        override_from_env(&mut self.operator_address, "MARQUEE_OPERATOR_ADDRESS");
        override_from_env(&mut self.operator_secret, "MARQUEE_OPERATOR_SECRET");
    }

    /// Checks that every required field is present and every range makes
    /// sense. Called once at startup; the config is immutable afterwards.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("ledger-endpoint", &self.ledger_endpoint),
            ("ledger-api-key", &self.ledger_api_key),
            ("operator-address", &self.operator_address),
            ("service-contract-id", &self.service_contract_id),
            ("item-contract-id", &self.item_contract_id),
            ("fungible-token-type", &self.fungible_token_type),
            ("non-fungible-token-type", &self.non_fungible_token_type),
        ];
        for (name, value) in required {
            if value.is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must be set")));
            }
        }
        if self.ticket_price == 0 {
            return Err(ConfigError::Invalid("ticket-price must be positive".into()));
        }
        if self.leg_timeout_ms == 0 {
            return Err(ConfigError::Invalid("leg-timeout-ms must be positive".into()));
        }
        if self.proxy_ttl_secs == 0 || self.purchase_ttl_secs == 0 {
            return Err(ConfigError::Invalid("staging TTLs must be positive".into()));
        }
        Ok(())
    }

    /// A self-contained configuration for devnet runs and tests: dummy
    /// credentials, the in-memory ledger's conventions, and default
    /// timing. Passes [`Self::validate`].
    pub fn devnet() -> Self {
        Self {
            ledger_endpoint: "http://127.0.0.1:9090".into(),
            ledger_api_key: "devnet".into(),
            ledger_api_secret: "devnet".into(),
            operator_address: "0xFEED".into(),
            operator_secret: "devnet".into(),
            service_contract_id: "devnet-svc".into(),
            item_contract_id: "devnet-itm".into(),
            fungible_token_type: "00000031".into(),
            non_fungible_token_type: "10000001".into(),
            ticket_price: 500,
            ..Self::default()
        }
    }

    /// Proxy staging TTL.
    pub fn proxy_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.proxy_ttl_secs as i64)
    }

    /// Purchase staging TTL.
    pub fn purchase_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.purchase_ttl_secs as i64)
    }

    /// Per-leg ledger call deadline.
    pub fn leg_timeout(&self) -> Duration {
        Duration::from_millis(self.leg_timeout_ms)
    }

    /// Interval between sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Retention window for terminal descriptors.
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retention_secs as i64)
    }
}

/// Replaces `field` with the value of `var` when set and non-empty.
fn override_from_env(field: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            *field = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_fail_validation() {
        assert!(GatewayConfig::default().validate().is_err());
    }

    #[test]
    fn devnet_config_passes_validation() {
        assert!(GatewayConfig::devnet().validate().is_ok());
    }

    #[test]
    fn zero_ticket_price_is_rejected() {
        let mut config = GatewayConfig::devnet();
        config.ticket_price = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ticket-price"));
    }

    #[test]
    fn load_parses_kebab_case_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            ledger-endpoint = "https://ledger.example.test"
            ledger-api-key = "key"
            ledger-api-secret = "secret"
            operator-address = "0xFEED"
            operator-secret = "op-secret"
            service-contract-id = "svc0001"
            item-contract-id = "itm0001"
            fungible-token-type = "00000031"
            non-fungible-token-type = "10000001"
            ticket-price = 500
            purchase-ttl-secs = 120
            "#
        )
        .unwrap();

        let config = GatewayConfig::load(file.path()).unwrap();
        assert_eq!(config.ticket_price, 500);
        assert_eq!(config.purchase_ttl_secs, 120);
        // Unspecified knobs fall back to defaults.
        assert_eq!(config.leg_timeout_ms, DEFAULT_LEG_TIMEOUT_MS);
        assert_eq!(config.listen_port, DEFAULT_LISTEN_PORT);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = GatewayConfig::load(Path::new("/nonexistent/marquee.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn duration_helpers_agree_with_fields() {
        let config = GatewayConfig::devnet();
        assert_eq!(config.leg_timeout(), Duration::from_millis(config.leg_timeout_ms));
        assert_eq!(config.proxy_ttl().num_seconds() as u64, config.proxy_ttl_secs);
    }
}
