use anyhow::bail;
use serde::Deserialize;

use common::models::OrderAck;

use crate::traits::RemoteDecode;

/// One ack entry from `/api/v5/trade/order`. `sCode` is the per-order status:
/// "0" means accepted, anything else carries the rejection in `sMsg`.
#[derive(Debug, Deserialize)]
pub struct OrderResponse {
    #[serde(rename = "ordId", default)]
    pub ord_id: String,
    #[serde(rename = "clOrdId", default)]
    pub cl_ord_id: String,
    #[serde(rename = "sCode")]
    pub s_code: String,
    #[serde(rename = "sMsg", default)]
    pub s_msg: String,
}

impl RemoteDecode<OrderAck> for OrderResponse {
    fn to_model(&self) -> anyhow::Result<OrderAck> {
        if self.s_code != "0" {
            bail!("order rejected ({}): {}", self.s_code, self.s_msg);
        }

        Ok(OrderAck {
            order_id: self.ord_id.clone(),
            client_order_id: self.cl_ord_id.clone(),
        })
    }
}
