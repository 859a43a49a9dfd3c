//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::context::{Locale, Theme};
use crate::errors::{ClientError, Result};
use crate::types::Address;
use crate::units::MAX_DECIMALS;

#[derive(Debug, Clone)]
pub struct Config {
    /// Network JSON-RPC endpoint used for reads, receipts and logs
    pub rpc_url: String,
    /// Wallet JSON-RPC endpoint; `None` means no wallet is connected
    pub wallet_rpc_url: Option<String>,
    /// Deployed PocketGrant contract
    pub grant_address: Address,
    /// Deployed IDRX token contract
    pub token_address: Address,
    /// Network every financial action must run on (Base Sepolia by default)
    pub chain_id: u64,
    /// Optional fee-sponsorship (paymaster) endpoint
    pub paymaster_url: Option<String>,
    /// Block explorer base URL, without trailing slash
    pub explorer_url: String,
    /// Public URL of the app, used to build share links
    pub app_url: String,
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Token decimals used for parsing and formatting amounts
    pub token_decimals: u8,
    /// How long a submitted transaction may stay unconfirmed
    pub confirmation_timeout: Duration,
    /// How often a pending receipt is polled
    pub receipt_poll_interval: Duration,
    /// How often (in seconds) the indexer polls for new logs
    pub poll_interval_secs: u64,
    /// Maximum block span per `eth_getLogs` request
    pub log_block_range: u64,
    /// Block to start indexing from if no cursor is saved
    pub start_block: u64,
    pub theme: Theme,
    pub locale: Locale,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            rpc_url: env_var("RPC_URL").unwrap_or_else(|_| "https://sepolia.base.org".to_string()),
            wallet_rpc_url: env_var("WALLET_RPC_URL").ok().filter(|s| !s.is_empty()),
            grant_address: parse_or("POCKETGRANT_ADDRESS", DEFAULT_GRANT_ADDRESS)?,
            token_address: parse_or("IDRX_ADDRESS", DEFAULT_TOKEN_ADDRESS)?,
            chain_id: parse_or("CHAIN_ID", "84532")?,
            paymaster_url: env_var("PAYMASTER_URL").ok().filter(|s| !s.is_empty()),
            explorer_url: env_var("EXPLORER_URL")
                .unwrap_or_else(|_| "https://sepolia.basescan.org".to_string())
                .trim_end_matches('/')
                .to_string(),
            app_url: env_var("APP_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./pocketgrant_events.db".to_string()),
            api_port: parse_or("API_PORT", "3001")?,
            token_decimals: check_decimals(parse_or("TOKEN_DECIMALS", "2")?)?,
            confirmation_timeout: Duration::from_secs(parse_or("CONFIRMATION_TIMEOUT_SECS", "120")?),
            receipt_poll_interval: Duration::from_millis(parse_or("RECEIPT_POLL_MS", "1500")?),
            poll_interval_secs: parse_or("POLL_INTERVAL_SECS", "5")?,
            log_block_range: parse_or("LOG_BLOCK_RANGE", "2000")?,
            start_block: parse_or("START_BLOCK", "0")?,
            theme: parse_or("THEME", "system")?,
            locale: parse_or("LOCALE", "id")?,
        })
    }

    /// Explorer link for a transaction hash.
    pub fn tx_url(&self, hash: &str) -> String {
        format!("{}/tx/{hash}", self.explorer_url)
    }

    /// Explorer link for an account or contract.
    pub fn address_url(&self, address: &Address) -> String {
        format!("{}/address/{address}", self.explorer_url)
    }
}

const DEFAULT_GRANT_ADDRESS: &str = "0x486c001d1a07b15613ba57b9eeb5b1333a1383ef";
const DEFAULT_TOKEN_ADDRESS: &str = "0x7cca9d58715511d51c9d270a155df79c8f990586";

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ClientError::Config(format!("Missing env var: {key}")))
}

fn parse_or<T: FromStr>(key: &str, default: &str) -> Result<T> {
    env_var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| ClientError::Config(format!("Invalid {key}")))
}

fn check_decimals(decimals: u8) -> Result<u8> {
    if decimals > MAX_DECIMALS {
        return Err(ClientError::Config(format!(
            "Invalid TOKEN_DECIMALS: {decimals} exceeds {MAX_DECIMALS}"
        )));
    }
    Ok(decimals)
}

#[cfg(test)]
impl Config {
    /// Defaults without touching the process environment.
    pub fn for_tests() -> Self {
        Config {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            wallet_rpc_url: Some("http://127.0.0.1:8546".to_string()),
            grant_address: DEFAULT_GRANT_ADDRESS.parse().unwrap(),
            token_address: DEFAULT_TOKEN_ADDRESS.parse().unwrap(),
            chain_id: 84532,
            paymaster_url: None,
            explorer_url: "https://sepolia.basescan.org".to_string(),
            app_url: "http://localhost:3000".to_string(),
            database_url: "sqlite::memory:".to_string(),
            api_port: 3001,
            token_decimals: 2,
            confirmation_timeout: Duration::from_secs(120),
            receipt_poll_interval: Duration::from_millis(1500),
            poll_interval_secs: 5,
            log_block_range: 2000,
            start_block: 0,
            theme: Theme::System,
            locale: Locale::En,
        }
    }
}
