use chrono::{DateTime, Utc};

/// One OHLCV bar, immutable once decoded from the exchange.
#[derive(Debug, Clone)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}
