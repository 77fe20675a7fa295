pub mod candle;
pub mod order;
pub mod position;
pub mod signal;
pub mod snapshot;

pub use candle::Candle;
pub use order::{OrderAck, OrderSide};
pub use position::{Position, PositionSide};
pub use signal::{Action, Confidence, Signal};
pub use snapshot::Snapshot;
