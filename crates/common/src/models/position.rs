use std::fmt;

/// Open-position state read fresh from the exchange every time it is needed.
/// Absence of a `Position` means flat.
#[derive(Debug, Clone)]
pub struct Position {
    pub side: PositionSide,
    /// Contracts held, always positive; direction lives in `side`.
    pub size: f64,
    pub entry_price: f64,
    pub unrealized_pnl: f64,
    pub leverage: f64,
    pub symbol: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSide {
    Long,
    Short,
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        })
    }
}
