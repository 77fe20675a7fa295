use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use common::config::TradeConfig;
use common::error::CycleError;
use common::models::{Action, OrderSide, Position, PositionSide, Signal};
use market_data::traits::Exchange;

/// Pause between closing the old position and opening the new one, so the
/// exchange-side position state propagates before the dependent order.
const SETTLE_DELAY: Duration = Duration::from_secs(1);
/// Pause before the post-execution position re-read.
const CONFIRM_DELAY: Duration = Duration::from_secs(2);

/// Reconciles the held position with the target signal: open, close-and-flip,
/// or no-op, per the (target, current) table. OKX forbids simultaneous
/// opposite positions on one instrument in net mode, so a flip is an explicit
/// reduce-only close followed by a fresh open.
pub struct ExecutionService {
    exchange: Arc<dyn Exchange>,
    symbol: String,
    amount: f64,
    test_mode: bool,
    settle_delay: Duration,
    confirm_delay: Duration,
}

impl ExecutionService {
    pub fn new(exchange: Arc<dyn Exchange>, config: &TradeConfig) -> Self {
        Self {
            exchange,
            symbol: config.symbol.clone(),
            amount: config.amount,
            test_mode: config.test_mode,
            settle_delay: SETTLE_DELAY,
            confirm_delay: CONFIRM_DELAY,
        }
    }

    /// Overrides the settle and confirmation delays.
    pub fn with_delays(mut self, settle: Duration, confirm: Duration) -> Self {
        self.settle_delay = settle;
        self.confirm_delay = confirm;
        self
    }

    /// Runs one reconciliation pass. Failures are logged and swallowed here;
    /// the scheduling loop must keep running whatever happens to an order.
    pub async fn execute(&self, signal: &Signal) {
        if let Err(e) = self.reconcile(signal).await {
            error!("{}", e);
        }
    }

    async fn reconcile(&self, signal: &Signal) -> Result<(), CycleError> {
        // Decisions are made against the exchange's view of the position,
        // never a cached one. An unknown position is not tradeable.
        let current = self
            .exchange
            .fetch_position(&self.symbol)
            .await
            .map_err(|e| {
                CycleError::OrderExecutionFailed(format!("position read failed: {e}"))
            })?;

        info!("Trade signal: {}", signal.action);
        info!("Confidence: {}", signal.confidence);
        info!("Reason: {}", signal.reason);
        info!("Stop loss: ${:.2}", signal.stop_loss);
        info!("Take profit: ${:.2}", signal.take_profit);
        match &current {
            Some(pos) => info!(
                "Current position: {} {} @ {:.2} (PNL {:.2})",
                pos.side, pos.size, pos.entry_price, pos.unrealized_pnl
            ),
            None => info!("Current position: flat"),
        }

        if self.test_mode {
            info!("Test mode - simulating only, no orders placed");
            return Ok(());
        }

        let placed = match (signal.action, current.as_ref()) {
            (Action::Hold, _) => {
                info!("Holding - no orders placed");
                false
            }
            (Action::Buy, Some(pos)) if pos.side == PositionSide::Short => {
                info!("Closing short and opening long...");
                self.close_and_flip(pos, OrderSide::Buy).await?;
                true
            }
            (Action::Buy, None) => {
                info!("Opening long...");
                self.open(OrderSide::Buy).await?;
                true
            }
            (Action::Buy, Some(_)) => {
                info!("Already long - no orders needed");
                false
            }
            (Action::Sell, Some(pos)) if pos.side == PositionSide::Long => {
                info!("Closing long and opening short...");
                self.close_and_flip(pos, OrderSide::Sell).await?;
                true
            }
            (Action::Sell, None) => {
                info!("Opening short...");
                self.open(OrderSide::Sell).await?;
                true
            }
            (Action::Sell, Some(_)) => {
                info!("Already short - no orders needed");
                false
            }
        };

        if placed {
            info!("Orders executed");
            // Best-effort observation for the logs; never retried or
            // compensated within the cycle.
            sleep(self.confirm_delay).await;
            match self.exchange.fetch_position(&self.symbol).await {
                Ok(Some(pos)) => info!(
                    "Position after execution: {} {} @ {:.2}",
                    pos.side, pos.size, pos.entry_price
                ),
                Ok(None) => info!("Position after execution: flat"),
                Err(e) => warn!("Position confirmation failed: {}", e),
            }
        }

        Ok(())
    }

    /// Close the full current position reduce-only, wait for the exchange to
    /// settle, then open the configured amount in the new direction. If the
    /// reopen fails after a successful close, the position stays flat.
    async fn close_and_flip(&self, current: &Position, side: OrderSide) -> Result<(), CycleError> {
        self.place(side, current.size, true).await?;
        sleep(self.settle_delay).await;
        self.place(side, self.amount, false).await
    }

    async fn open(&self, side: OrderSide) -> Result<(), CycleError> {
        self.place(side, self.amount, false).await
    }

    async fn place(&self, side: OrderSide, size: f64, reduce_only: bool) -> Result<(), CycleError> {
        let ack = self
            .exchange
            .place_market_order(&self.symbol, side, size, reduce_only)
            .await
            .map_err(|e| CycleError::OrderExecutionFailed(e.to_string()))?;

        info!(
            "Order accepted: id={} client_id={}",
            ack.order_id, ack.client_order_id
        );
        Ok(())
    }
}
