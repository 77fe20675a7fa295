use serde::Deserialize;

use common::models::{Position, PositionSide};

use crate::traits::RemoteDecode;

/// One entry from `/api/v5/account/positions`. In net mode `pos` is a signed
/// contract count: positive is long, negative is short, zero or empty is
/// flat. The auxiliary numerics arrive as strings and may be empty.
#[derive(Debug, Deserialize)]
pub struct PositionResponse {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde(default)]
    pub pos: String,
    #[serde(rename = "avgPx", default)]
    pub avg_px: String,
    #[serde(default)]
    pub upl: String,
    #[serde(default)]
    pub lever: String,
}

impl RemoteDecode<Option<Position>> for PositionResponse {
    fn to_model(&self) -> anyhow::Result<Option<Position>> {
        let contracts = self.pos.parse::<f64>().unwrap_or(0_f64);
        if contracts == 0.0 {
            return Ok(None);
        }

        let side = if contracts > 0.0 {
            PositionSide::Long
        } else {
            PositionSide::Short
        };

        Ok(Some(Position {
            side,
            size: contracts.abs(),
            entry_price: self.avg_px.parse::<f64>().unwrap_or(0_f64),
            unrealized_pnl: self.upl.parse::<f64>().unwrap_or(0_f64),
            leverage: self.lever.parse::<f64>().unwrap_or(0_f64),
            symbol: self.inst_id.clone(),
        }))
    }
}
