//! Trigger checking: does a bar execute a given leg, and at what price?
//!
//! Gap-through opens fill at the open; otherwise the leg fills at its own
//! price when the bar's range reaches it.

use crate::domain::{Bar, OrderKind, OrderSide};

/// Raw fill price for a leg on `bar`, or `None` if it does not execute.
pub fn fill_price(kind: OrderKind, side: OrderSide, price: f64, bar: &Bar) -> Option<f64> {
    if bar.is_void() {
        return None;
    }

    match (kind, side) {
        (OrderKind::Market, _) => Some(bar.open),
        // Buy limit and sell stop both execute on the way down.
        (OrderKind::Limit, OrderSide::Buy) | (OrderKind::Stop, OrderSide::Sell) => {
            if bar.open <= price {
                Some(bar.open)
            } else if bar.low <= price {
                Some(price)
            } else {
                None
            }
        }
        (OrderKind::Limit, OrderSide::Sell) | (OrderKind::Stop, OrderSide::Buy) => {
            if bar.open >= price {
                Some(bar.open)
            } else if bar.high >= price {
                Some(price)
            } else {
                None
            }
        }
    }
}
