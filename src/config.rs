//! Configuration module
//!
//! Loads configuration from environment variables.

use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::{Address, FlowRate};
use crate::store::DEFAULT_STORAGE_KEY;

/// Default dev-node accounts the dashboard can sign for
const DEV_ACCOUNTS: [&str; 10] = [
    "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
    "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
    "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC",
    "0x90F79bf6EB2c4f870365E785982E1f101E93b906",
    "0x15d34AAf54267DB7D7c367839AAf71A00a2C6A65",
    "0x9965507D1a55bcC2695C58ba16FB37d819B0A4dc",
    "0x976EA74026E726554dB657fA54763abd0C3a0aa9",
    "0x14dC79964da2C08b23698B3D3cc7Ca32193d9955",
    "0x23618e81E3f5cdF7f54C3d65f7FBc0aBf5B21E8f",
    "0xa0Ee7A142d267C1f36714E4a8F75612F20a79720",
];

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Chain the engine is bound to
    pub chain_id: u64,

    /// Sending account of this dashboard session
    pub account: Address,

    pub underlying_token: Address,

    pub wrapped_token: Address,

    /// Monthly amount for newly opened flows, major units
    pub default_monthly_amount: Decimal,

    /// Interval of both polling jobs
    pub poll_interval: Duration,

    /// Share of a recipient's wrapped balance unwrapped on their behalf
    pub partial_unwrap_percent: u32,

    /// Accounts the session holds keys for
    pub signer_accounts: Vec<Address>,

    /// Name the recipient list is stored under
    pub storage_key: String,

    /// Directory of the JSON file store
    pub storage_dir: PathBuf,

    /// Postgres URL; when set, the list is stored in the database instead
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Underlying tokens credited to the account when the local chain starts
    pub seed_underlying_amount: Decimal,

    /// Local chain delay between submission and confirmation
    pub confirmation_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = var("HOST", "127.0.0.1");

        let port = var("PORT", "3000")
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = var("ENVIRONMENT", "development");

        let chain_id = var("CHAIN_ID", "31337")
            .parse()
            .map_err(|_| ConfigError::InvalidValue("CHAIN_ID"))?;

        let account = parse_address(&var("ACCOUNT_ADDRESS", DEV_ACCOUNTS[0]), "ACCOUNT_ADDRESS")?;

        let underlying_token = parse_address(
            &var(
                "UNDERLYING_TOKEN_ADDRESS",
                "0x6384D5F8999EaAC8bcCfae137D4e535075b47494",
            ),
            "UNDERLYING_TOKEN_ADDRESS",
        )?;

        let wrapped_token = parse_address(
            &var(
                "WRAPPED_TOKEN_ADDRESS",
                "0x357f63DB7C18C99051f9507532F426c2A070975a",
            ),
            "WRAPPED_TOKEN_ADDRESS",
        )?;

        let default_monthly_amount = Decimal::from_str(&var("DEFAULT_MONTHLY_AMOUNT", "2000"))
            .ok()
            .filter(|amount| *amount > Decimal::ZERO)
            // must stream at least one wei per second
            .filter(|amount| FlowRate::from_monthly(*amount).is_ok_and(|rate| !rate.is_zero()))
            .ok_or(ConfigError::InvalidValue("DEFAULT_MONTHLY_AMOUNT"))?;

        let poll_interval = var("POLL_INTERVAL_SECS", "5")
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or(ConfigError::InvalidValue("POLL_INTERVAL_SECS"))?;

        let partial_unwrap_percent = var("PARTIAL_UNWRAP_PERCENT", "80")
            .parse::<u32>()
            .ok()
            .filter(|percent| (1..=100).contains(percent))
            .ok_or(ConfigError::InvalidValue("PARTIAL_UNWRAP_PERCENT"))?;

        let signer_accounts = match lookup("SIGNER_ACCOUNTS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_address(s, "SIGNER_ACCOUNTS"))
                .collect::<Result<Vec<_>, _>>()?,
            None => DEV_ACCOUNTS
                .iter()
                .map(|s| parse_address(s, "SIGNER_ACCOUNTS"))
                .collect::<Result<Vec<_>, _>>()?,
        };

        let storage_key = var("STORAGE_KEY", DEFAULT_STORAGE_KEY);
        if storage_key.is_empty() {
            return Err(ConfigError::InvalidValue("STORAGE_KEY"));
        }

        let storage_dir = PathBuf::from(var("STORAGE_DIR", ".flow-dashboard"));

        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());

        let database_max_connections = var("DATABASE_MAX_CONNECTIONS", "5")
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let seed_underlying_amount = Decimal::from_str(&var("SEED_UNDERLYING_AMOUNT", "100000"))
            .ok()
            .filter(|amount| *amount >= Decimal::ZERO)
            .ok_or(ConfigError::InvalidValue("SEED_UNDERLYING_AMOUNT"))?;

        let confirmation_delay = var("CONFIRMATION_DELAY_MS", "0")
            .parse()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidValue("CONFIRMATION_DELAY_MS"))?;

        Ok(Self {
            host,
            port,
            environment,
            chain_id,
            account,
            underlying_token,
            wrapped_token,
            default_monthly_amount,
            poll_interval,
            partial_unwrap_percent,
            signer_accounts,
            storage_key,
            storage_dir,
            database_url,
            database_max_connections,
            seed_underlying_amount,
            confirmation_delay,
        })
    }
}

fn parse_address(value: &str, key: &'static str) -> Result<Address, ConfigError> {
    Address::parse(value).map_err(|_| ConfigError::InvalidValue(key))
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
