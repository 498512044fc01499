mod position;
mod side;

pub use position::{Position, PositionError, PositionStatus};
pub use side::PositionSide;
