use anyhow::{Context, bail};
use chrono::{TimeZone, Utc};
use serde::Deserialize;

use common::models::Candle;

use crate::traits::RemoteDecode;

/// One row from `/api/v5/market/candles`: an array of strings
/// `[ts, open, high, low, close, volume, ...]`, delivered newest first.
#[derive(Debug, Deserialize)]
pub struct CandleResponse(pub Vec<String>);

impl RemoteDecode<Candle> for CandleResponse {
    fn to_model(&self) -> anyhow::Result<Candle> {
        if self.0.len() < 6 {
            bail!("candle row has {} fields, expected at least 6", self.0.len());
        }

        let ts_ms: i64 = self.0[0].parse().context("candle timestamp")?;
        let timestamp = Utc
            .timestamp_millis_opt(ts_ms)
            .single()
            .context("candle timestamp out of range")?;

        Ok(Candle {
            timestamp,
            open: self.0[1].parse().context("candle open")?,
            high: self.0[2].parse().context("candle high")?,
            low: self.0[3].parse().context("candle low")?,
            close: self.0[4].parse().context("candle close")?,
            volume: self.0[5].parse().context("candle volume")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_candle_row() {
        let row: CandleResponse = serde_json::from_str(
            r#"["1700000000000","37000.1","37100.5","36900.0","37050.2","812.44","30045123","30045123","1"]"#,
        )
        .unwrap();

        let candle = row.to_model().unwrap();
        assert_eq!(candle.timestamp.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(candle.open, 37000.1);
        assert_eq!(candle.close, 37050.2);
        assert_eq!(candle.volume, 812.44);
    }

    #[test]
    fn short_row_is_rejected() {
        let row = CandleResponse(vec!["1700000000000".into(), "37000".into()]);
        assert!(row.to_model().is_err());
    }

    #[test]
    fn non_numeric_price_is_rejected() {
        let row = CandleResponse(vec![
            "1700000000000".into(),
            "x".into(),
            "1".into(),
            "1".into(),
            "1".into(),
            "1".into(),
        ]);
        assert!(row.to_model().is_err());
    }
}
