use std::env;
use std::str::FromStr;

use crate::error::ConfigError;

const DEFAULT_TIMEFRAME: &str = "15m";

/// Trading parameters, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct TradeConfig {
    /// OKX instrument id, e.g. "BTC-USDT-SWAP".
    pub symbol: String,
    /// Contracts opened per trade.
    pub amount: f64,
    pub leverage: u32,
    pub timeframe: String,
    /// When set, the reconciler logs what it would do and places nothing.
    pub test_mode: bool,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub deepseek_api_key: String,
    pub okx_api_key: String,
    pub okx_secret: String,
    pub okx_passphrase: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub trade: TradeConfig,
    pub credentials: Credentials,
}

impl AppConfig {
    /// Reads and validates all settings once at startup. Any failure here is
    /// fatal; the cycle pipeline assumes a valid config.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials = Credentials {
            deepseek_api_key: required(&lookup, "DEEPSEEK_API_KEY")?,
            okx_api_key: required(&lookup, "OKX_API_KEY")?,
            okx_secret: required(&lookup, "OKX_SECRET")?,
            okx_passphrase: required(&lookup, "OKX_PASSWORD")?,
        };

        let amount: f64 = parsed(&lookup, "AMOUNT")?;
        if amount <= 0.0 {
            return Err(ConfigError::InvalidVar {
                var: "AMOUNT",
                value: amount.to_string(),
            });
        }

        let leverage: u32 = parsed(&lookup, "LEVERAGE")?;
        if leverage == 0 {
            return Err(ConfigError::InvalidVar {
                var: "LEVERAGE",
                value: leverage.to_string(),
            });
        }

        let trade = TradeConfig {
            symbol: required(&lookup, "SYMBOL")?,
            amount,
            leverage,
            timeframe: lookup("TIMEFRAME").unwrap_or_else(|| DEFAULT_TIMEFRAME.to_string()),
            test_mode: lookup("TEST_MODE")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        Ok(Self { trade, credentials })
    }
}

fn required<F>(lookup: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(var)),
    }
}

fn parsed<F, T>(lookup: &F, var: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = required(lookup, var)?;
    raw.parse()
        .map_err(|_| ConfigError::InvalidVar { var, value: raw })
}
