//! Order legs, statuses and broker notifications.

use super::ids::OrderId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which part of a bracket group a leg plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegRole {
    /// Opening buy.
    Entry,
    /// Protective stop below the entry.
    Stop,
    /// Profit target above the entry.
    Target,
    /// Standalone closing order issued when the hold period runs out.
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "Buy"),
            OrderSide::Sell => write!(f, "Sell"),
        }
    }
}

/// Execution type of a leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    /// Fill at `price` or better.
    Limit,
    /// Triggers when price trades through `price`, then fills as market.
    Stop,
    /// Fill at the next available price; `price` is informational.
    Market,
}

/// One order within a group, as handed to the gateway.
///
/// Built at signal time and never mutated after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLeg {
    pub role: LegRole,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub price: f64,
    pub quantity: f64,
    /// Last date on which the leg may still execute.
    pub valid_until: NaiveDate,
    /// Entry leg this leg is attached to (bracket children only).
    pub parent: Option<OrderId>,
    /// False holds the leg at the gateway until a later leg of the same
    /// group transmits.
    pub transmit: bool,
}

/// Order status as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
    Rejected,
}

impl OrderStatus {
    /// Terminal statuses end a leg's life; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Expired
                | OrderStatus::Rejected
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            OrderStatus::Submitted => "Submitted",
            OrderStatus::PartiallyFilled => "Partial",
            OrderStatus::Filled => "Completed",
            OrderStatus::Cancelled => "Canceled",
            OrderStatus::Expired => "Expired",
            OrderStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An order status change delivered by the gateway between steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub order_id: OrderId,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub date: NaiveDate,
    /// Step index during which the gateway produced the notification.
    pub step: usize,
    pub fill_price: Option<f64>,
}
