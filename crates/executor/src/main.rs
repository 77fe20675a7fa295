use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

use common::config::AppConfig;
use common::logger;
use market_data::remote::OkxClient;
use market_data::services::SnapshotService;
use market_data::traits::Exchange;
use strategy::remote::DeepSeekClient;
use strategy::services::SignalService;

use crate::cycle::TradingCycle;
use crate::services::ExecutionService;

mod cycle;
mod services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    logger::setup_logger();

    // The sole fatal error class: everything after this point logs and
    // carries on.
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    };

    info!("{} automated trading bot starting", config.trade.symbol);
    if config.trade.test_mode {
        info!("Test mode - orders are simulated, nothing is placed");
    } else {
        info!("Live trading mode - orders will be placed");
    }
    info!("Timeframe: {}", config.trade.timeframe);

    let exchange: Arc<dyn Exchange> = Arc::new(OkxClient::new(
        config.credentials.okx_api_key.clone(),
        config.credentials.okx_secret.clone(),
        config.credentials.okx_passphrase.clone(),
    ));
    let llm = Arc::new(DeepSeekClient::new(
        config.credentials.deepseek_api_key.clone(),
    ));

    if let Err(e) = setup_exchange(exchange.as_ref(), &config).await {
        error!("Exchange setup failed, exiting: {}", e);
        std::process::exit(1);
    }

    let mut cycle = TradingCycle::new(
        exchange.clone(),
        SnapshotService::new(
            exchange.clone(),
            &config.trade.symbol,
            &config.trade.timeframe,
        ),
        SignalService::new(llm, &config.trade.symbol, &config.trade.timeframe),
        ExecutionService::new(exchange.clone(), &config.trade),
        &config.trade.symbol,
    );

    let period = cycle_period(&config.trade.timeframe);
    info!("Cycle cadence: every {} minutes", period.as_secs() / 60);

    // One cycle at a time: the first tick fires immediately, and a cycle
    // overrunning its slot delays the next tick instead of stacking.
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        cycle.run_once().await;
    }
}

async fn setup_exchange(exchange: &dyn Exchange, config: &AppConfig) -> anyhow::Result<()> {
    exchange
        .set_leverage(&config.trade.symbol, config.trade.leverage)
        .await?;
    info!("Leverage set to {}x", config.trade.leverage);

    exchange.set_position_mode().await?;
    info!("Net position mode set");

    let balance = exchange.fetch_usdt_balance().await?;
    info!("Available USDT balance: {:.2}", balance);

    Ok(())
}

fn cycle_period(timeframe: &str) -> Duration {
    match timeframe {
        "15m" => Duration::from_secs(15 * 60),
        "1h" => Duration::from_secs(60 * 60),
        _ => Duration::from_secs(60 * 60),
    }
}
