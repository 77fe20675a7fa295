use async_trait::async_trait;

use common::models::{Candle, OrderAck, OrderSide, Position};

/// Every exchange operation the trading pipeline depends on. Implemented by
/// the OKX REST client; mocked in tests.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Most recent `limit` candles in chronological order (oldest first).
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
    ) -> anyhow::Result<Vec<Candle>>;

    /// Current open position on `symbol`, `None` when flat.
    async fn fetch_position(&self, symbol: &str) -> anyhow::Result<Option<Position>>;

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        size: f64,
        reduce_only: bool,
    ) -> anyhow::Result<OrderAck>;

    /// Setup-time only.
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> anyhow::Result<()>;

    /// Setup-time only. Puts the account into net (one-way) position mode.
    async fn set_position_mode(&self) -> anyhow::Result<()>;

    async fn fetch_usdt_balance(&self) -> anyhow::Result<f64>;
}

/// Conversion from a wire payload into a domain model. OKX delivers numerics
/// as strings, so failures here are parse errors rather than serde errors.
pub trait RemoteDecode<T> {
    fn to_model(&self) -> anyhow::Result<T>;
}
