use std::sync::Arc;

use serde::Deserialize;
use ta::Next;
use ta::indicators::SimpleMovingAverage;
use tracing::debug;

use common::error::CycleError;
use common::models::{Action, Confidence, Position, Signal, Snapshot};

use crate::history::BoundedHistory;
use crate::traits::LlmApi;

pub const SNAPSHOT_HISTORY_CAP: usize = 20;
pub const SIGNAL_HISTORY_CAP: usize = 30;
const SMA_PERIOD: usize = 5;

/// Wire shape of the model's JSON reply. Strict by construction: `signal`
/// and `confidence` must be in their enumerated sets and the price fields
/// numeric, otherwise the parse fails and the cycle trades nothing.
#[derive(Debug, Deserialize)]
struct SignalResponse {
    signal: Action,
    reason: String,
    stop_loss: f64,
    take_profit: f64,
    confidence: Confidence,
}

/// Turns a market snapshot plus rolling history into one validated trading
/// signal per cycle. Owns both history buffers and the moving-average state;
/// nothing here survives a process restart.
pub struct SignalService {
    llm: Arc<dyn LlmApi>,
    symbol: String,
    timeframe: String,
    snapshots: BoundedHistory<Snapshot>,
    signals: BoundedHistory<Signal>,
    sma: SimpleMovingAverage,
}

impl SignalService {
    pub fn new(llm: Arc<dyn LlmApi>, symbol: &str, timeframe: &str) -> Self {
        Self {
            llm,
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            snapshots: BoundedHistory::new(SNAPSHOT_HISTORY_CAP),
            signals: BoundedHistory::new(SIGNAL_HISTORY_CAP),
            sma: SimpleMovingAverage::new(SMA_PERIOD).unwrap(),
        }
    }

    /// Appends the snapshot, asks the model, and returns the validated
    /// signal stamped with the snapshot's timestamp. The snapshot buffer is
    /// mutated before the model call, the signal buffer only after a
    /// successful parse.
    pub async fn generate(
        &mut self,
        snapshot: Snapshot,
        position: Option<&Position>,
    ) -> Result<Signal, CycleError> {
        self.snapshots.push(snapshot.clone());
        let sma_value = self.sma.next(snapshot.price);
        let sma = (self.snapshots.len() >= SMA_PERIOD).then_some(sma_value);

        let system = format!(
            "You are a professional cryptocurrency trading analyst focused on {} trend \
             analysis. Combine candle structure and technical indicators in your judgement.",
            self.timeframe
        );
        let prompt = self.build_prompt(&snapshot, sma, position);

        debug!("Requesting signal for {}", self.symbol);

        let reply = self
            .llm
            .chat(&system, &prompt)
            .await
            .map_err(|e| CycleError::ModelUnavailable(e.to_string()))?;

        let parsed = extract_signal_json(&reply)?;
        let signal = Signal {
            action: parsed.signal,
            reason: parsed.reason,
            stop_loss: parsed.stop_loss,
            take_profit: parsed.take_profit,
            confidence: parsed.confidence,
            timestamp: snapshot.timestamp,
        };

        self.signals.push(signal.clone());
        Ok(signal)
    }

    fn build_prompt(
        &self,
        snapshot: &Snapshot,
        sma: Option<f64>,
        position: Option<&Position>,
    ) -> String {
        let mut candle_text = format!(
            "[Last {} {} candles]\n",
            snapshot.last_candles.len(),
            self.timeframe
        );
        for (i, candle) in snapshot.last_candles.iter().enumerate() {
            let trend = if candle.close > candle.open {
                "bullish"
            } else {
                "bearish"
            };
            let body_change = if candle.open == 0.0 {
                0.0
            } else {
                (candle.close - candle.open) / candle.open * 100.0
            };
            candle_text.push_str(&format!(
                "Candle {}: {} open: {:.2} close: {:.2} change: {:+.2}%\n",
                i + 1,
                trend,
                candle.open,
                candle.close,
                body_change
            ));
        }

        let indicator_text = match sma {
            Some(sma) => {
                let deviation = (snapshot.price - sma) / sma * 100.0;
                format!(
                    "[Indicators]\n{}-period SMA: {:.2}\nPrice vs SMA: {:+.2}%",
                    SMA_PERIOD, sma, deviation
                )
            }
            None => "[Indicators]\nNot enough history to compute indicators".to_string(),
        };

        let previous_signal_text = match self.signals.last() {
            Some(last) => format!(
                "\n[Previous signal]\nSignal: {}\nConfidence: {}\n",
                last.action, last.confidence
            ),
            None => String::new(),
        };

        let position_text = match position {
            Some(pos) => format!(
                "{} position, size: {}, unrealized PNL: {:.2} USDT",
                pos.side, pos.size, pos.unrealized_pnl
            ),
            None => "no open position".to_string(),
        };

        format!(
            "Market data for {symbol} on the {timeframe} timeframe:\n\n\
             {candle_text}\n\
             {indicator_text}\n\
             {previous_signal_text}\n\
             [Current market]\n\
             - Price: ${price:.2}\n\
             - Time: {timestamp}\n\
             - Candle high: ${high:.2}\n\
             - Candle low: ${low:.2}\n\
             - Candle volume: {volume:.2}\n\
             - Price change: {change:+.2}%\n\
             - Position: {position_text}\n\n\
             [Instructions]\n\
             1. Based on the {timeframe} candle trend and the indicators, give a trading signal: BUY / SELL / HOLD\n\
             2. Briefly explain the reasoning (trend continuity, support/resistance, volume)\n\
             3. Suggest a reasonable stop-loss price based on the technicals\n\
             4. Suggest a reasonable take-profit price based on the technicals\n\
             5. Rate your confidence in the signal\n\n\
             Reply with a single JSON object in exactly this format:\n\
             {{\n\
                 \"signal\": \"BUY|SELL|HOLD\",\n\
                 \"reason\": \"analysis summary\",\n\
                 \"stop_loss\": <price>,\n\
                 \"take_profit\": <price>,\n\
                 \"confidence\": \"HIGH|MEDIUM|LOW\"\n\
             }}",
            symbol = self.symbol,
            timeframe = self.timeframe,
            candle_text = candle_text,
            indicator_text = indicator_text,
            previous_signal_text = previous_signal_text,
            price = snapshot.price,
            timestamp = snapshot.timestamp.format("%Y-%m-%d %H:%M:%S"),
            high = snapshot.high,
            low = snapshot.low,
            volume = snapshot.volume,
            change = snapshot.price_change_pct,
            position_text = position_text,
        )
    }
}

/// Extracts the JSON object between the first `{` and the last `}` of the
/// reply, tolerating prose around it, and parses it strictly.
fn extract_signal_json(text: &str) -> Result<SignalResponse, CycleError> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(CycleError::ModelResponseUnparseable(format!(
            "no JSON object in model reply: {text}"
        )));
    };
    if end < start {
        return Err(CycleError::ModelResponseUnparseable(format!(
            "no JSON object in model reply: {text}"
        )));
    }

    serde_json::from_str(&text[start..=end])
        .map_err(|e| CycleError::ModelResponseUnparseable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::Utc;
    use mockall::mock;

    use common::models::{Candle, PositionSide};

    mock! {
        pub Llm {}

        #[async_trait]
        impl LlmApi for Llm {
            async fn chat(&self, system: &str, user: &str) -> anyhow::Result<String>;
        }
    }

    const GOOD_REPLY: &str = r#"Here is my analysis. {"signal":"BUY","reason":"uptrend","stop_loss":36000.0,"take_profit":38500.0,"confidence":"HIGH"} Trade carefully."#;

    fn snapshot(price: f64) -> Snapshot {
        Snapshot {
            price,
            timestamp: Utc::now(),
            high: price + 50.0,
            low: price - 50.0,
            volume: 812.44,
            timeframe: "15m".to_string(),
            price_change_pct: 0.4,
            last_candles: vec![Candle {
                timestamp: Utc::now(),
                open: price - 20.0,
                high: price + 50.0,
                low: price - 50.0,
                close: price,
                volume: 812.44,
            }],
        }
    }

    fn short_position() -> Position {
        Position {
            side: PositionSide::Short,
            size: 2.0,
            entry_price: 37100.0,
            unrealized_pnl: -15.5,
            leverage: 10.0,
            symbol: "BTC-USDT-SWAP".to_string(),
        }
    }

    fn service_replying(reply: &str, times: usize) -> SignalService {
        let mut llm = MockLlm::new();
        let reply = reply.to_string();
        llm.expect_chat()
            .times(times)
            .returning(move |_, _| Ok(reply.clone()));
        SignalService::new(Arc::new(llm), "BTC-USDT-SWAP", "15m")
    }

    #[test]
    fn extracts_object_wrapped_in_prose() {
        let parsed = extract_signal_json(GOOD_REPLY).unwrap();
        assert_eq!(parsed.signal, Action::Buy);
        assert_eq!(parsed.stop_loss, 36000.0);
        assert_eq!(parsed.confidence, Confidence::High);
    }

    #[test]
    fn reply_without_braces_is_unparseable() {
        let err = extract_signal_json("no json here").unwrap_err();
        assert!(matches!(err, CycleError::ModelResponseUnparseable(_)));
    }

    #[test]
    fn reversed_braces_are_unparseable() {
        let err = extract_signal_json("} backwards {").unwrap_err();
        assert!(matches!(err, CycleError::ModelResponseUnparseable(_)));
    }

    #[test]
    fn out_of_enumeration_signal_is_rejected() {
        let reply = r#"{"signal":"LONG","reason":"x","stop_loss":1.0,"take_profit":2.0,"confidence":"HIGH"}"#;
        assert!(matches!(
            extract_signal_json(reply).unwrap_err(),
            CycleError::ModelResponseUnparseable(_)
        ));
    }

    #[test]
    fn missing_stop_loss_is_rejected() {
        let reply = r#"{"signal":"BUY","reason":"x","take_profit":2.0,"confidence":"HIGH"}"#;
        assert!(matches!(
            extract_signal_json(reply).unwrap_err(),
            CycleError::ModelResponseUnparseable(_)
        ));
    }

    #[tokio::test]
    async fn signal_is_stamped_and_recorded() {
        let mut service = service_replying(GOOD_REPLY, 1);
        let snap = snapshot(37000.0);
        let expected_ts = snap.timestamp;

        let signal = service.generate(snap, None).await.unwrap();
        assert_eq!(signal.action, Action::Buy);
        assert_eq!(signal.timestamp, expected_ts);
        assert_eq!(service.signals.len(), 1);
        assert_eq!(service.snapshots.len(), 1);
    }

    #[tokio::test]
    async fn model_transport_failure_is_model_unavailable() {
        let mut llm = MockLlm::new();
        llm.expect_chat()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("timeout")));
        let mut service = SignalService::new(Arc::new(llm), "BTC-USDT-SWAP", "15m");

        let err = service.generate(snapshot(37000.0), None).await.unwrap_err();
        assert!(matches!(err, CycleError::ModelUnavailable(_)));
        // A failed cycle must not record a signal.
        assert!(service.signals.is_empty());
        // The snapshot is recorded before the model call.
        assert_eq!(service.snapshots.len(), 1);
    }

    #[tokio::test]
    async fn unparseable_reply_records_no_signal() {
        let mut service = service_replying("SELL at will", 1);

        let err = service.generate(snapshot(37000.0), None).await.unwrap_err();
        assert!(matches!(err, CycleError::ModelResponseUnparseable(_)));
        assert!(service.signals.is_empty());
    }

    #[test]
    fn prompt_reports_indicator_unavailable_below_five_snapshots() {
        let service = service_replying(GOOD_REPLY, 0);

        let prompt = service.build_prompt(&snapshot(37000.0), None, None);
        assert!(prompt.contains("Not enough history"));
        assert!(prompt.contains("no open position"));
    }

    #[tokio::test]
    async fn prompt_carries_indicator_prior_signal_and_position() {
        let mut llm = MockLlm::new();
        llm.expect_chat()
            .times(4)
            .returning(|_, _| Ok(GOOD_REPLY.to_string()));
        // The fifth call must see the SMA, the prior signal, and the short
        // position in the prompt.
        llm.expect_chat()
            .withf(|_, user| {
                user.contains("5-period SMA")
                    && user.contains("Signal: BUY")
                    && user.contains("short position, size: 2")
            })
            .times(1)
            .returning(|_, _| Ok(GOOD_REPLY.to_string()));

        let mut service = SignalService::new(Arc::new(llm), "BTC-USDT-SWAP", "15m");
        for i in 0..4 {
            service
                .generate(snapshot(37000.0 + i as f64), None)
                .await
                .unwrap();
        }
        service
            .generate(snapshot(37004.0), Some(&short_position()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn history_buffers_stay_bounded_across_cycles() {
        let mut service = service_replying(GOOD_REPLY, 40);
        for i in 0..40 {
            service
                .generate(snapshot(37000.0 + i as f64), None)
                .await
                .unwrap();
        }

        assert_eq!(service.snapshots.len(), SNAPSHOT_HISTORY_CAP);
        assert_eq!(service.signals.len(), SIGNAL_HISTORY_CAP);
    }
}
