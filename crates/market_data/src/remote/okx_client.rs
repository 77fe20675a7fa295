use std::env;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{error, info};
use uuid::Uuid;

use common::models::{Candle, OrderAck, OrderSide, Position};

use crate::remote::{CandleResponse, OrderResponse, PositionResponse};
use crate::traits::{Exchange, RemoteDecode};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_BASE_URL: &str = "https://www.okx.com";
/// Broker tag attached to every order for attribution on the exchange side.
const ORDER_TAG: &str = "9cab20f1e3d4trdr";

/// Every OKX v5 response shares this envelope; `data` holds the
/// endpoint-specific rows.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct OkxEnvelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<T>,
}

impl<T> OkxEnvelope<T> {
    fn into_data(self) -> anyhow::Result<Vec<T>> {
        if self.code != "0" {
            bail!("OKX error {}: {}", self.code, self.msg);
        }
        Ok(self.data)
    }
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(default)]
    details: Vec<BalanceDetail>,
}

#[derive(Debug, Deserialize)]
struct BalanceDetail {
    ccy: String,
    #[serde(rename = "availBal", default)]
    avail_bal: String,
}

#[derive(Clone)]
pub struct OkxClient {
    client: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    passphrase: String,
}

impl OkxClient {
    pub fn new(api_key: String, secret_key: String, passphrase: String) -> Self {
        let base_url = env::var("OKX_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Self {
            client: Client::builder()
                .user_agent("okx_llm_trader/0.1.0")
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client."),
            base_url,
            api_key,
            secret_key,
            passphrase,
        }
    }

    /// OKX signs `timestamp + method + requestPath + body` with HMAC-SHA256
    /// and base64-encodes the digest. `requestPath` includes the query string.
    fn sign(&self, timestamp: &str, method: &str, path_and_query: &str, body: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(timestamp.as_bytes());
        mac.update(method.as_bytes());
        mac.update(path_and_query.as_bytes());
        mac.update(body.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    async fn public_request<T: for<'de> Deserialize<'de>>(
        &self,
        path_and_query: &str,
    ) -> anyhow::Result<OkxEnvelope<T>> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("OKX request failed")?;

        Self::decode(resp).await
    }

    async fn signed_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<serde_json::Value>,
    ) -> anyhow::Result<OkxEnvelope<T>> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let body_text = body.map(|b| b.to_string()).unwrap_or_default();
        let signature = self.sign(&timestamp, method.as_str(), path_and_query, &body_text);
        let url = format!("{}{}", self.base_url, path_and_query);

        let mut request = self
            .client
            .request(method, &url)
            .header("OK-ACCESS-KEY", &self.api_key)
            .header("OK-ACCESS-SIGN", signature)
            .header("OK-ACCESS-TIMESTAMP", timestamp)
            .header("OK-ACCESS-PASSPHRASE", &self.passphrase);

        if !body_text.is_empty() {
            request = request
                .header("Content-Type", "application/json")
                .body(body_text);
        }

        let resp = request.send().await.context("OKX request failed")?;
        Self::decode(resp).await
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        resp: reqwest::Response,
    ) -> anyhow::Result<OkxEnvelope<T>> {
        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            error!("OKX request failed ({}): {}", status, error_text);
            bail!("OKX HTTP {}: {}", status, error_text);
        }

        resp.json::<OkxEnvelope<T>>()
            .await
            .context("Failed to parse OKX response")
    }
}

/// Maps common timeframe spellings onto OKX bar codes, which capitalize the
/// hour-and-up units.
fn okx_bar(timeframe: &str) -> String {
    match timeframe {
        "1h" => "1H".to_string(),
        "2h" => "2H".to_string(),
        "4h" => "4H".to_string(),
        "1d" => "1D".to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Exchange for OkxClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
    ) -> anyhow::Result<Vec<Candle>> {
        let path = format!(
            "/api/v5/market/candles?instId={}&bar={}&limit={}",
            symbol,
            okx_bar(timeframe),
            limit
        );

        let rows: Vec<CandleResponse> = self.public_request(&path).await?.into_data()?;
        let mut candles = rows
            .iter()
            .map(|row| row.to_model())
            .collect::<anyhow::Result<Vec<_>>>()?;

        // The wire order is newest first.
        candles.reverse();
        Ok(candles)
    }

    async fn fetch_position(&self, symbol: &str) -> anyhow::Result<Option<Position>> {
        let path = format!("/api/v5/account/positions?instId={}", symbol);
        let rows: Vec<PositionResponse> =
            self.signed_request(Method::GET, &path, None).await?.into_data()?;

        for row in &rows {
            if row.inst_id == symbol {
                if let Some(position) = row.to_model()? {
                    return Ok(Some(position));
                }
            }
        }

        Ok(None)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        size: f64,
        reduce_only: bool,
    ) -> anyhow::Result<OrderAck> {
        let client_order_id = Uuid::new_v4().simple().to_string();
        let body = json!({
            "instId": symbol,
            "tdMode": "cross",
            "side": side.as_str(),
            "ordType": "market",
            "sz": size.to_string(),
            "reduceOnly": reduce_only,
            "tag": ORDER_TAG,
            "clOrdId": client_order_id,
        });

        info!(
            "Placing Order: {} {} {} (reduce_only={})",
            side, size, symbol, reduce_only
        );

        let envelope: OkxEnvelope<OrderResponse> = self
            .signed_request(Method::POST, "/api/v5/trade/order", Some(body))
            .await?;

        // Rejections arrive with a non-zero envelope code but the detail
        // lives in the per-order sCode/sMsg.
        match envelope.data.first() {
            Some(ack) => ack.to_model(),
            None => bail!("OKX error {}: {}", envelope.code, envelope.msg),
        }
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> anyhow::Result<()> {
        let body = json!({
            "instId": symbol,
            "lever": leverage.to_string(),
            "mgnMode": "cross",
        });

        self.signed_request::<serde_json::Value>(Method::POST, "/api/v5/account/set-leverage", Some(body))
            .await?
            .into_data()?;
        Ok(())
    }

    async fn set_position_mode(&self) -> anyhow::Result<()> {
        let body = json!({ "posMode": "net_mode" });

        self.signed_request::<serde_json::Value>(
            Method::POST,
            "/api/v5/account/set-position-mode",
            Some(body),
        )
        .await?
        .into_data()?;
        Ok(())
    }

    async fn fetch_usdt_balance(&self) -> anyhow::Result<f64> {
        let rows: Vec<BalanceResponse> = self
            .signed_request(Method::GET, "/api/v5/account/balance?ccy=USDT", None)
            .await?
            .into_data()?;

        let balance = rows
            .iter()
            .flat_map(|row| row.details.iter())
            .find(|detail| detail.ccy == "USDT")
            .map(|detail| detail.avail_bal.parse::<f64>().unwrap_or(0_f64))
            .unwrap_or(0_f64);

        Ok(balance)
    }
}
