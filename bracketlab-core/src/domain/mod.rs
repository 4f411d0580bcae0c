//! Domain types for BracketLab

pub mod bar;
pub mod ids;
pub mod order;
pub mod position;

pub use bar::{Bar, BarError};
pub use ids::OrderId;
pub use order::{LegRole, Notification, OrderKind, OrderLeg, OrderSide, OrderStatus};
pub use position::PositionState;
