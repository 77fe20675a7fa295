use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use common::error::CycleError;
use common::models::Snapshot;

use crate::traits::Exchange;

/// Candles requested per cycle. The prompt only gets the trailing
/// `CONTEXT_CANDLES` of them; the rest is headroom for the change
/// computation.
const CANDLE_LIMIT: u32 = 10;
const CONTEXT_CANDLES: usize = 5;

pub struct SnapshotService {
    exchange: Arc<dyn Exchange>,
    symbol: String,
    timeframe: String,
}

impl SnapshotService {
    pub fn new(exchange: Arc<dyn Exchange>, symbol: &str, timeframe: &str) -> Self {
        Self {
            exchange,
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
        }
    }

    /// Fetches recent candles and derives the per-cycle market snapshot.
    /// Any fetch failure or an empty response abandons the cycle; the next
    /// scheduled cycle retries.
    pub async fn build(&self) -> Result<Snapshot, CycleError> {
        let candles = self
            .exchange
            .fetch_candles(&self.symbol, &self.timeframe, CANDLE_LIMIT)
            .await
            .map_err(|e| CycleError::DataUnavailable(e.to_string()))?;

        let Some(current) = candles.last() else {
            return Err(CycleError::DataUnavailable("empty candle response".to_string()));
        };

        // With a single candle there is no previous close to compare against.
        let previous = if candles.len() > 1 {
            &candles[candles.len() - 2]
        } else {
            current
        };

        debug!(
            "Snapshot for {}: {} candles, close {:.2}",
            self.symbol,
            candles.len(),
            current.close
        );

        let tail_start = candles.len().saturating_sub(CONTEXT_CANDLES);

        Ok(Snapshot {
            price: current.close,
            timestamp: Utc::now(),
            high: current.high,
            low: current.low,
            volume: current.volume,
            timeframe: self.timeframe.clone(),
            price_change_pct: price_change_pct(current.close, previous.close),
            last_candles: candles[tail_start..].to_vec(),
        })
    }
}

fn price_change_pct(current_close: f64, previous_close: f64) -> f64 {
    if previous_close == 0.0 {
        return 0.0;
    }
    (current_close - previous_close) / previous_close * 100.0
}
