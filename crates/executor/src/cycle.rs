use std::sync::Arc;

use tracing::{error, info, warn};

use market_data::services::SnapshotService;
use market_data::traits::Exchange;
use strategy::services::SignalService;

use crate::services::ExecutionService;

/// One full sample → decide → reconcile pass. The scheduler drives this
/// sequentially; a cycle either completes or aborts on its first error, and
/// no error escapes to the loop.
pub struct TradingCycle {
    exchange: Arc<dyn Exchange>,
    snapshots: SnapshotService,
    signals: SignalService,
    execution: ExecutionService,
    symbol: String,
}

impl TradingCycle {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        snapshots: SnapshotService,
        signals: SignalService,
        execution: ExecutionService,
        symbol: &str,
    ) -> Self {
        Self {
            exchange,
            snapshots,
            signals,
            execution,
            symbol: symbol.to_string(),
        }
    }

    pub async fn run_once(&mut self) {
        info!("{}", "=".repeat(60));
        info!("Starting trading cycle for {}", self.symbol);

        let snapshot = match self.snapshots.build().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("{}", e);
                return;
            }
        };
        info!(
            "Price: ${:.2} ({} change {:+.2}%)",
            snapshot.price, snapshot.timeframe, snapshot.price_change_pct
        );

        // Context for the prompt only; the reconciler re-reads the position
        // before any order decision.
        let position = match self.exchange.fetch_position(&self.symbol).await {
            Ok(position) => position,
            Err(e) => {
                warn!("Position read failed, analysing as flat: {}", e);
                None
            }
        };

        let signal = match self.signals.generate(snapshot, position.as_ref()).await {
            Ok(signal) => signal,
            Err(e) => {
                error!("{}", e);
                return;
            }
        };

        self.execution.execute(&signal).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use mockall::mock;

    use common::config::TradeConfig;
    use common::models::{Candle, OrderAck, OrderSide, Position};
    use strategy::traits::LlmApi;

    mock! {
        pub Okx {}

        #[async_trait]
        impl Exchange for Okx {
            async fn fetch_candles(
                &self,
                symbol: &str,
                timeframe: &str,
                limit: u32,
            ) -> anyhow::Result<Vec<Candle>>;
            async fn fetch_position(&self, symbol: &str) -> anyhow::Result<Option<Position>>;
            async fn place_market_order(
                &self,
                symbol: &str,
                side: OrderSide,
                size: f64,
                reduce_only: bool,
            ) -> anyhow::Result<OrderAck>;
            async fn set_leverage(&self, symbol: &str, leverage: u32) -> anyhow::Result<()>;
            async fn set_position_mode(&self) -> anyhow::Result<()>;
            async fn fetch_usdt_balance(&self) -> anyhow::Result<f64>;
        }
    }

    mock! {
        pub Llm {}

        #[async_trait]
        impl LlmApi for Llm {
            async fn chat(&self, system: &str, user: &str) -> anyhow::Result<String>;
        }
    }

    const SYMBOL: &str = "BTC-USDT-SWAP";

    fn candle(close: f64) -> Candle {
        Candle {
            timestamp: Utc::now(),
            open: close - 10.0,
            high: close + 20.0,
            low: close - 20.0,
            close,
            volume: 50.0,
        }
    }

    fn cycle_with(exchange: MockOkx, llm: MockLlm) -> TradingCycle {
        let exchange: Arc<dyn Exchange> = Arc::new(exchange);
        let config = TradeConfig {
            symbol: SYMBOL.to_string(),
            amount: 0.01,
            leverage: 10,
            timeframe: "15m".to_string(),
            test_mode: false,
        };

        TradingCycle::new(
            exchange.clone(),
            SnapshotService::new(exchange.clone(), SYMBOL, "15m"),
            SignalService::new(Arc::new(llm), SYMBOL, "15m"),
            ExecutionService::new(exchange, &config)
                .with_delays(Duration::ZERO, Duration::ZERO),
            SYMBOL,
        )
    }

    #[tokio::test]
    async fn full_cycle_places_an_order_on_buy() {
        let mut exchange = MockOkx::new();
        exchange
            .expect_fetch_candles()
            .returning(|_, _, _| Ok(vec![candle(100.0), candle(110.0)]));
        // Prompt context, order decision, and confirmation reads.
        exchange.expect_fetch_position().returning(|_| Ok(None));
        exchange
            .expect_place_market_order()
            .withf(|_, side, size, reduce_only| {
                *side == OrderSide::Buy && *size == 0.01 && !*reduce_only
            })
            .times(1)
            .returning(|_, _, _, _| {
                Ok(OrderAck {
                    order_id: "1".to_string(),
                    client_order_id: "c1".to_string(),
                })
            });

        let mut llm = MockLlm::new();
        llm.expect_chat().times(1).returning(|_, _| {
            Ok(r#"{"signal":"BUY","reason":"up","stop_loss":95.0,"take_profit":120.0,"confidence":"MEDIUM"}"#
                .to_string())
        });

        cycle_with(exchange, llm).run_once().await;
    }

    #[tokio::test]
    async fn candle_failure_aborts_before_the_model() {
        let mut exchange = MockOkx::new();
        exchange
            .expect_fetch_candles()
            .returning(|_, _, _| Err(anyhow::anyhow!("HTTP 503")));
        exchange.expect_fetch_position().times(0);
        exchange.expect_place_market_order().times(0);

        let mut llm = MockLlm::new();
        llm.expect_chat().times(0);

        cycle_with(exchange, llm).run_once().await;
    }

    #[tokio::test]
    async fn unparseable_reply_aborts_before_any_order() {
        let mut exchange = MockOkx::new();
        exchange
            .expect_fetch_candles()
            .returning(|_, _, _| Ok(vec![candle(100.0)]));
        // Only the prompt-context read happens; the reconciler never runs.
        exchange.expect_fetch_position().times(1).returning(|_| Ok(None));
        exchange.expect_place_market_order().times(0);

        let mut llm = MockLlm::new();
        llm.expect_chat()
            .times(1)
            .returning(|_, _| Ok("the market looks flat today".to_string()));

        cycle_with(exchange, llm).run_once().await;
    }
}
