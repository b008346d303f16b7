use crate::rpc::DEFAULT_LOG_BATCH_SIZE;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DATABASE_URL: &str = "sqlite:./data";
const DEFAULT_DATABASE_NAME: &str = "erc20_watcher";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_INITIAL_WINDOW_SIZE: u64 = 1000;
const DEFAULT_FETCH_PADDING: u64 = 1;
const DEFAULT_TOKEN_DECIMALS: u8 = 18;

#[derive(Debug, Clone)]
pub struct Config {
    pub json_rpc_urls: Vec<String>,
    pub chain_id: u64,
    pub chain_name: String,
    pub token_address: Address,
    pub token_symbol: String,
    pub token_decimals: u8,
    pub receiver_address: Address,
    pub database_url: String,
    pub database_name: String,
    pub poll_interval: Duration,
    pub initial_window_size: u64,
    pub fetch_padding: u64,
    pub log_batch_size: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut json_rpc_urls: Vec<String> = ["RPC_URL_1", "RPC_URL_2", "RPC_URL_3"]
            .into_iter()
            .filter_map(|key| get(key))
            .collect();
        if let Some(extra) = get("RPC_URLS") {
            json_rpc_urls.extend(
                extra
                    .split(',')
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(String::from),
            );
        }
        if json_rpc_urls.is_empty() {
            anyhow::bail!("At least one of RPC_URL_1, RPC_URL_2, RPC_URL_3 or RPC_URLS must be set");
        }

        let chain_id = get("CHAIN_ID")
            .context("CHAIN_ID must be set")?
            .parse::<u64>()
            .context("Invalid CHAIN_ID format")?;

        let token_address = parse_address(get("TOKEN_ADDRESS"), "TOKEN_ADDRESS")?;
        let receiver_address = parse_address(get("RECEIVER_ADDRESS"), "RECEIVER_ADDRESS")?;

        let token_decimals = parse_or(get("TOKEN_DECIMALS"), "TOKEN_DECIMALS", DEFAULT_TOKEN_DECIMALS)?;
        let poll_interval_secs: u64 =
            parse_or(get("POLL_INTERVAL_SECS"), "POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_interval_secs == 0 {
            anyhow::bail!("POLL_INTERVAL_SECS must be greater than zero");
        }
        let log_batch_size: u64 =
            parse_or(get("LOG_BATCH_SIZE"), "LOG_BATCH_SIZE", DEFAULT_LOG_BATCH_SIZE)?;
        if log_batch_size == 0 {
            anyhow::bail!("LOG_BATCH_SIZE must be greater than zero");
        }

        Ok(Config {
            json_rpc_urls,
            chain_id,
            chain_name: get("CHAIN_NAME").unwrap_or_else(|| "unknown".to_string()),
            token_address,
            token_symbol: get("TOKEN_SYMBOL").unwrap_or_else(|| "TOKEN".to_string()),
            token_decimals,
            receiver_address,
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            database_name: get("DATABASE_NAME")
                .unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string()),
            poll_interval: Duration::from_secs(poll_interval_secs),
            initial_window_size: parse_or(
                get("INITIAL_WINDOW_SIZE"),
                "INITIAL_WINDOW_SIZE",
                DEFAULT_INITIAL_WINDOW_SIZE,
            )?,
            fetch_padding: parse_or(get("FETCH_PADDING"), "FETCH_PADDING", DEFAULT_FETCH_PADDING)?,
            log_batch_size,
        })
    }

    /// File path of the SQLite database: `<DATABASE_URL>/<DATABASE_NAME>.db`.
    pub fn database_path(&self) -> PathBuf {
        let dir = self
            .database_url
            .strip_prefix("sqlite:")
            .unwrap_or(&self.database_url);
        PathBuf::from(dir).join(format!("{}.db", self.database_name))
    }
}

fn parse_address(value: Option<String>, key: &str) -> Result<Address> {
    let value = value.with_context(|| format!("{key} must be set"))?;
    Address::from_str(value.trim()).with_context(|| format!("Invalid {key} format"))
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key} value: {v}")),
        None => Ok(default),
    }
}
