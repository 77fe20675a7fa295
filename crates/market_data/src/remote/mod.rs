mod candle_response;
mod okx_client;
mod order_response;
mod position_response;

pub use candle_response::CandleResponse;
pub use okx_client::OkxClient;
pub use order_response::OrderResponse;
pub use position_response::PositionResponse;
