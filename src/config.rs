//! Configuration module
//!
//! Loads configuration from environment variables. Configuration is read once
//! at startup and never changes afterwards.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::{Address, Amount, MAX_DISPLAY_DECIMALS};
use crate::gateway::JsonRpcConfig;
use crate::onboarding::OnboardingConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Ledger JSON-RPC endpoint
    pub ledger_rpc_url: String,

    /// Shared faucet account
    pub faucet_address: Address,

    /// Token contract whose balances are reconciled
    pub token_contract_address: Address,

    pub token_decimals: u32,

    /// Gas (display units) a new user is topped up to
    pub initial_gas_balance: Amount,

    /// Tokens (display units) a new user is topped up to
    pub initial_token_balance: Amount,

    /// Gas the faucet never distributes
    pub faucet_reserve_gas: Amount,

    /// Tokens the faucet never distributes
    pub faucet_reserve_tokens: Amount,

    pub confirmation_timeout: Duration,

    pub confirmation_poll_interval: Duration,

    /// Blocks per log query page
    pub log_page_size: u64,

    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,
}

/// Read `name`, falling back to `default`, and parse it.
fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: &str,
) -> Result<T, ConfigError> {
    lookup(name)
        .unwrap_or_else(|| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name))
}

fn required<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<T, ConfigError> {
    lookup(name)
        .ok_or(ConfigError::MissingEnv(name))?
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = &lookup;

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());
        let ledger_rpc_url =
            lookup("LEDGER_RPC_URL").unwrap_or_else(|| "http://127.0.0.1:8545".to_string());
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let timeout_secs: u64 = parse_or(lookup, "CONFIRMATION_TIMEOUT_SECS", "30")?;
        let poll_ms: u64 = parse_or(lookup, "CONFIRMATION_POLL_MS", "500")?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("CONFIRMATION_TIMEOUT_SECS"));
        }

        let log_page_size: u64 = parse_or(lookup, "LOG_PAGE_SIZE", "5000")?;
        if log_page_size == 0 {
            return Err(ConfigError::InvalidValue("LOG_PAGE_SIZE"));
        }

        let token_decimals: u32 = parse_or(lookup, "TOKEN_DECIMALS", "18")?;
        if token_decimals > MAX_DISPLAY_DECIMALS {
            return Err(ConfigError::InvalidValue("TOKEN_DECIMALS"));
        }

        Ok(Self {
            ledger_rpc_url,
            faucet_address: required(lookup, "FAUCET_ADDRESS")?,
            token_contract_address: required(lookup, "TOKEN_CONTRACT_ADDRESS")?,
            token_decimals,
            initial_gas_balance: parse_or(lookup, "INITIAL_GAS_BALANCE", "1.0")?,
            initial_token_balance: parse_or(lookup, "INITIAL_TOKEN_BALANCE", "10")?,
            faucet_reserve_gas: parse_or(lookup, "FAUCET_RESERVE_GAS", "0.1")?,
            faucet_reserve_tokens: parse_or(lookup, "FAUCET_RESERVE_TOKENS", "0")?,
            confirmation_timeout: Duration::from_secs(timeout_secs),
            confirmation_poll_interval: Duration::from_millis(poll_ms),
            log_page_size,
            database_url,
            database_max_connections: parse_or(lookup, "DATABASE_MAX_CONNECTIONS", "10")?,
            host,
            port: parse_or(lookup, "PORT", "3000")?,
            environment,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Reconciler targets and reserves in ledger base units
    pub fn onboarding(&self) -> Result<OnboardingConfig, ConfigError> {
        OnboardingConfig::from_display(
            self.initial_gas_balance,
            self.initial_token_balance,
            self.faucet_reserve_gas,
            self.faucet_reserve_tokens,
            self.token_decimals,
            self.confirmation_timeout,
        )
        .map_err(|_| ConfigError::InvalidValue("INITIAL_*/FAUCET_RESERVE_*"))
    }

    pub fn json_rpc(&self) -> JsonRpcConfig {
        JsonRpcConfig {
            rpc_url: self.ledger_rpc_url.clone(),
            faucet_address: self.faucet_address.clone(),
            token_contract: self.token_contract_address.clone(),
            token_decimals: self.token_decimals,
            poll_interval: self.confirmation_poll_interval,
            log_page_size: self.log_page_size,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BaseUnits;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        let mut map: HashMap<String, String> = [
            ("DATABASE_URL", "postgres://localhost/faucet"),
            ("FAUCET_ADDRESS", "0x00000000000000000000000000000000000000fa"),
            ("TOKEN_CONTRACT_ADDRESS", "0x00000000000000000000000000000000000000cc"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        map
    }

    fn load(map: &HashMap<String, String>) -> Result<Config, ConfigError> {
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&vars(&[])).unwrap();

        assert_eq!(config.ledger_rpc_url, "http://127.0.0.1:8545");
        assert_eq!(config.token_decimals, 18);
        assert_eq!(config.confirmation_timeout, Duration::from_secs(30));
        assert_eq!(config.port, 3000);
        assert!(!config.is_production());

        let onboarding = config.onboarding().unwrap();
        assert_eq!(onboarding.initial_gas_balance, BaseUnits(1_000_000_000_000_000_000));
        assert_eq!(onboarding.reconciler.reserve_currency, BaseUnits(100_000_000_000_000_000));
        assert_eq!(onboarding.reconciler.reserve_token, BaseUnits::ZERO);
    }

    #[test]
    fn test_missing_required() {
        let mut map = vars(&[]);
        map.remove("FAUCET_ADDRESS");
        assert!(matches!(load(&map), Err(ConfigError::MissingEnv("FAUCET_ADDRESS"))));
    }

    #[test]
    fn test_invalid_values() {
        let map = vars(&[("INITIAL_TOKEN_BALANCE", "-5")]);
        assert!(matches!(load(&map), Err(ConfigError::InvalidValue("INITIAL_TOKEN_BALANCE"))));

        let map = vars(&[("FAUCET_ADDRESS", "0x1234")]);
        assert!(matches!(load(&map), Err(ConfigError::InvalidValue("FAUCET_ADDRESS"))));

        let map = vars(&[("LOG_PAGE_SIZE", "0")]);
        assert!(matches!(load(&map), Err(ConfigError::InvalidValue("LOG_PAGE_SIZE"))));
    }

    #[test]
    fn test_token_decimals_beyond_display_range_rejected() {
        let map = vars(&[("TOKEN_DECIMALS", "29")]);
        assert!(matches!(load(&map), Err(ConfigError::InvalidValue("TOKEN_DECIMALS"))));
        assert!(load(&vars(&[("TOKEN_DECIMALS", "28")])).is_ok());
    }

    #[test]
    fn test_token_decimals_feed_onboarding() {
        let map = vars(&[("TOKEN_DECIMALS", "6"), ("INITIAL_TOKEN_BALANCE", "2.5")]);
        let onboarding = load(&map).unwrap().onboarding().unwrap();
        assert_eq!(onboarding.initial_token_balance, BaseUnits(2_500_000));
    }
}
