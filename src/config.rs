//! Startup configuration.
//!
//! Two sources, both read exactly once before the server binds:
//! - the environment ([`Environment`]): endpoint, signing credential, token contract and
//!   bind address. Missing or malformed values abort startup.
//! - an optional TOML file ([`GatewayConfig`], path from `CONFIG_FILE`): CORS, request
//!   limits and transaction timing. A missing file means defaults; a malformed one
//!   aborts startup.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::chain::EvmChain;
use crate::from_env::{self, CredentialError, SigningCredential};
use crate::pipeline::PipelineSettings;
use crate::types::EvmAddress;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is required")]
    Missing(&'static str),
    #[error("environment variable {name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("invalid setting {name}: {reason}")]
    Setting { name: &'static str, reason: String },
    #[error("failed to read config file: {0}")]
    File(#[from] config::ConfigError),
}

/// Settings read from the TOML file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub cors: CorsConfig,
    pub request: RequestConfig,
    pub transaction: TransactionConfig,
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    ///
    /// If the file doesn't exist, returns the default configuration.
    /// If the file exists but is malformed, returns an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::info!(?path, "config file not found, using defaults");
            return Ok(Self::default());
        }

        let config: Self = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `CONFIG_FILE`, or `config.toml` when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config_path = std::env::var(from_env::ENV_CONFIG_FILE)
            .unwrap_or_else(|_| from_env::DEFAULT_CONFIG_FILE.to_string());
        Self::from_file(config_path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let transaction = &self.transaction;
        if transaction.confirmations == 0 {
            return Err(ConfigError::Setting {
                name: "transaction.confirmations",
                reason: "must be at least 1".to_string(),
            });
        }
        let timeouts = [
            ("transaction.rpc_timeout_seconds", transaction.rpc_timeout_seconds),
            (
                "transaction.connection_timeout_seconds",
                transaction.connection_timeout_seconds,
            ),
            (
                "transaction.receipt_timeout_seconds",
                transaction.receipt_timeout_seconds,
            ),
        ];
        if let Some(&(name, _)) = timeouts.iter().find(|(_, seconds)| *seconds == 0) {
            return Err(ConfigError::Setting {
                name,
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.request.max_body_size_bytes == 0 {
            return Err(ConfigError::Setting {
                name: "request.max_body_size_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// List of allowed origins. Empty list means allow all (*).
    pub allowed_origins: Vec<String>,
}

/// Request validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Maximum request body size in bytes (default 1MB).
    pub max_body_size_bytes: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_body_size_bytes: 1_048_576, // 1MB
        }
    }
}

/// Transaction-related configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Timeout for individual RPC requests in seconds.
    pub rpc_timeout_seconds: u64,
    /// TCP connect timeout in seconds.
    pub connection_timeout_seconds: u64,
    /// How long to wait for a receipt before reporting the transaction as failed.
    pub receipt_timeout_seconds: u64,
    pub confirmations: u64,
    /// Check the allowance before simulating `transferFrom`.
    pub allowance_precheck: bool,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_seconds: 30,
            connection_timeout_seconds: 10,
            receipt_timeout_seconds: 120,
            confirmations: 1,
            allowance_precheck: true,
        }
    }
}

impl TransactionConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_seconds)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_seconds)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            confirmations: self.confirmations,
            allowance_precheck: self.allowance_precheck,
        }
    }
}

/// Settings read from environment variables.
#[derive(Debug, Clone)]
pub struct Environment {
    pub rpc_url: Url,
    pub credential: SigningCredential,
    pub contract: Address,
    pub host: IpAddr,
    pub port: u16,
    pub expected_chain: Option<EvmChain>,
}

impl Environment {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read and validate every variable through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));
        let invalid = |name: &'static str, reason: String| ConfigError::Invalid { name, reason };

        let rpc_url = required(from_env::ENV_RPC_URL)?;
        let rpc_url = Url::parse(rpc_url.trim())
            .map_err(|e| invalid(from_env::ENV_RPC_URL, e.to_string()))?;

        let credential: SigningCredential = required(from_env::ENV_PRIVATE_KEY)?.parse()?;

        let contract: EvmAddress = required(from_env::ENV_CONTRACT_ADDRESS)?
            .trim()
            .parse()
            .map_err(|e: crate::types::InvalidAddress| {
                invalid(from_env::ENV_CONTRACT_ADDRESS, e.to_string())
            })?;
        if contract.is_zero() {
            return Err(invalid(
                from_env::ENV_CONTRACT_ADDRESS,
                "must not be the zero address".to_string(),
            ));
        }

        let host = match var(from_env::ENV_HOST) {
            Some(host) => host
                .trim()
                .parse()
                .map_err(|_| invalid(from_env::ENV_HOST, format!("'{host}' is not an IP address")))?,
            None => from_env::DEFAULT_HOST,
        };
        let port = match var(from_env::ENV_PORT) {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| invalid(from_env::ENV_PORT, format!("'{port}' is not a port")))?,
            None => from_env::DEFAULT_PORT,
        };
        let expected_chain = var(from_env::ENV_CHAIN_ID)
            .map(|chain| chain.parse::<EvmChain>())
            .transpose()
            .map_err(|e| invalid(from_env::ENV_CHAIN_ID, e.to_string()))?;

        Ok(Self {
            rpc_url,
            credential,
            contract: contract.into(),
            host,
            port,
            expected_chain,
        })
    }
}
