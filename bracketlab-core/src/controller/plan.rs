//! Bracket leg pricing and leg construction.

use crate::config::StrategyConfig;
use crate::domain::{LegRole, OrderKind, OrderLeg, OrderSide};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Entry, stop and target prices of one bracket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegPrices {
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
}

impl LegPrices {
    /// Pullback entry below `close`; stop and target symmetric around the
    /// entry by `bracket_offset`.
    pub fn from_close(close: f64, limit_offset: f64, bracket_offset: f64) -> Self {
        let entry = close * (1.0 - limit_offset);
        Self {
            entry,
            stop: entry * (1.0 - bracket_offset),
            target: entry * (1.0 + bracket_offset),
        }
    }
}

/// Validity windows in days, per leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegValidity {
    pub entry: i64,
    pub stop: i64,
    pub target: i64,
}

/// The three legs to submit for one signal, before references exist.
#[derive(Debug, Clone, PartialEq)]
pub struct BracketPlan {
    pub prices: LegPrices,
    pub validity: LegValidity,
    pub entry: OrderLeg,
    pub stop: OrderLeg,
    pub target: OrderLeg,
}

impl BracketPlan {
    pub fn new(config: &StrategyConfig, close: f64, date: NaiveDate, quantity: f64) -> Self {
        let mut prices = LegPrices::from_close(close, config.limit_offset, config.bracket_offset);
        let mut validity = LegValidity {
            entry: config.entry_valid_days,
            stop: config.bracket_valid_days,
            target: config.bracket_valid_days,
        };

        if config.swap_entry_stop {
            std::mem::swap(&mut prices.entry, &mut prices.stop);
            std::mem::swap(&mut validity.entry, &mut validity.stop);
        }

        let leg = |role, side, kind, price, days| OrderLeg {
            role,
            side,
            kind,
            price,
            quantity,
            valid_until: valid_until(date, days),
            parent: None,
            transmit: false,
        };

        Self {
            prices,
            validity,
            entry: leg(
                LegRole::Entry,
                OrderSide::Buy,
                OrderKind::Limit,
                prices.entry,
                validity.entry,
            ),
            stop: leg(
                LegRole::Stop,
                OrderSide::Sell,
                OrderKind::Stop,
                prices.stop,
                validity.stop,
            ),
            target: OrderLeg {
                transmit: true,
                ..leg(
                    LegRole::Target,
                    OrderSide::Sell,
                    OrderKind::Limit,
                    prices.target,
                    validity.target,
                )
            },
        }
    }
}

/// Market exit for the whole position, used on hold expiry.
///
/// Good until cancelled: it must survive weekends and holidays until the
/// next bar opens.
pub fn exit_leg(close: f64, quantity: f64) -> OrderLeg {
    OrderLeg {
        role: LegRole::Exit,
        side: OrderSide::Sell,
        kind: OrderKind::Market,
        price: close,
        quantity,
        valid_until: NaiveDate::MAX,
        parent: None,
        transmit: true,
    }
}

/// `date + days`, saturating at the calendar's end.
fn valid_until(date: NaiveDate, days: i64) -> NaiveDate {
    Duration::try_days(days)
        .and_then(|d| date.checked_add_signed(d))
        .unwrap_or(NaiveDate::MAX)
}
