use chrono::{DateTime, Utc};

use crate::models::Candle;

/// Per-cycle view of the market: the latest bar's figures plus the trailing
/// candles used for prompt context.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub timeframe: String,
    /// Close-over-previous-close change in percent. 0 when only one candle
    /// was available.
    pub price_change_pct: f64,
    pub last_candles: Vec<Candle>,
}
