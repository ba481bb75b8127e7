use anyhow::{anyhow, Context, Result};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use validator::{Validate, ValidationError};

pub mod reference;

pub use reference::{MarketMeta, PoolMeta, ReferenceTables, YfPoolConfig};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    // Endpoints
    #[validate(custom = "validate_http_url")]
    pub api_base_url: String,
    #[validate(custom = "validate_rpc_url")]
    pub rpc_url: String,
    #[validate(custom = "validate_chain_id")]
    pub chain_id: u64,

    // Wallet
    pub account: Option<Address>,
    #[validate(custom = "validate_private_key")]
    pub private_key: Option<String>,

    // Contract addresses
    #[validate(custom = "validate_address")]
    pub dao_governance_address: Address,
    #[validate(custom = "validate_address")]
    pub bond_token_address: Address,
    #[validate(custom = "validate_address")]
    pub dao_barn_address: Address,
    #[validate(custom = "validate_address")]
    pub dao_reward_address: Address,
    #[validate(custom = "validate_address")]
    pub yf_staking_address: Address,

    // Local files
    pub reference_tables_path: Option<PathBuf>,
    pub theme_path: PathBuf,
}

impl AppConfig {
    /// Reads the configuration from the environment (after `dotenv`).
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_base_url: required("API_BASE_URL")?,
            rpc_url: required("RPC_URL")?,
            chain_id: required("CHAIN_ID")?
                .parse()
                .context("CHAIN_ID must be a number")?,
            account: optional("ACCOUNT").map(|v| parse_address("ACCOUNT", &v)).transpose()?,
            private_key: optional("PRIVATE_KEY"),
            dao_governance_address: parse_address(
                "DAO_GOVERNANCE_ADDRESS",
                &required("DAO_GOVERNANCE_ADDRESS")?,
            )?,
            bond_token_address: parse_address("BOND_TOKEN_ADDRESS", &required("BOND_TOKEN_ADDRESS")?)?,
            dao_barn_address: parse_address("DAO_BARN_ADDRESS", &required("DAO_BARN_ADDRESS")?)?,
            dao_reward_address: parse_address("DAO_REWARD_ADDRESS", &required("DAO_REWARD_ADDRESS")?)?,
            yf_staking_address: parse_address("YF_STAKING_ADDRESS", &required("YF_STAKING_ADDRESS")?)?,
            reference_tables_path: optional("REFERENCE_TABLES_PATH").map(PathBuf::from),
            theme_path: optional("THEME_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("settings.json")),
        })
    }

    pub fn validate_all(&self) -> Result<()> {
        if let Err(e) = self.validate() {
            return Err(anyhow!("Configuration validation failed: {:?}", e));
        }
        self.validate_wallet()?;
        Ok(())
    }

    fn validate_wallet(&self) -> Result<()> {
        if self.private_key.is_some() && self.account.is_some() {
            return Err(anyhow!(
                "Set either ACCOUNT (read-only) or PRIVATE_KEY (signing), not both"
            ));
        }
        Ok(())
    }

    pub fn reference_tables(&self) -> Result<ReferenceTables> {
        match &self.reference_tables_path {
            Some(path) => ReferenceTables::from_file(path),
            None => Ok(ReferenceTables::builtin()),
        }
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{} is not set", key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_address(key: &str, value: &str) -> Result<Address> {
    value
        .trim()
        .parse()
        .map_err(|e| anyhow!("{} is not an address: {}", key, e))
}

// Custom validators
fn validate_http_url(url: &str) -> Result<(), ValidationError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ValidationError::new("invalid_api_url"));
    }
    Ok(())
}

fn validate_rpc_url(url: &str) -> Result<(), ValidationError> {
    if !url.starts_with("http://") && !url.starts_with("https://") && !url.starts_with("ws://") {
        return Err(ValidationError::new("invalid_rpc_url"));
    }
    Ok(())
}

fn validate_chain_id(chain_id: u64) -> Result<(), ValidationError> {
    match chain_id {
        1 => Ok(()),     // Ethereum
        137 => Ok(()),   // Polygon
        4 => Ok(()),     // Rinkeby
        5 => Ok(()),     // Goerli
        42 => Ok(()),    // Kovan
        80001 => Ok(()), // Mumbai
        _ => Err(ValidationError::new("unsupported_chain")),
    }
}

fn validate_private_key(key: &str) -> Result<(), ValidationError> {
    let hex = key.strip_prefix("0x").unwrap_or(key);
    if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::new("invalid_private_key"));
    }
    Ok(())
}

fn validate_address(address: &Address) -> Result<(), ValidationError> {
    if address == &Address::zero() {
        return Err(ValidationError::new("zero_address"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub request_timeout: Duration,
    pub wallet_poll_interval: Duration,
    pub metrics_port: u16,
    pub log_level: String,
    pub page_size: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            wallet_poll_interval: Duration::from_secs(4),
            metrics_port: 9090,
            log_level: "info".to_string(),
            page_size: 10,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `LOG_LEVEL`, `METRICS_PORT` and `PAGE_SIZE` when set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(level) = optional("LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(port) = optional("METRICS_PORT") {
            config.metrics_port = port.parse().context("METRICS_PORT must be a port number")?;
        }
        if let Some(size) = optional("PAGE_SIZE") {
            config.page_size = size.parse().context("PAGE_SIZE must be a number")?;
        }
        Ok(config)
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}
