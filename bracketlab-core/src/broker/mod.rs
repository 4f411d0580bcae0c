//! Simulated broker, an in-process `OrderGateway` for back-testing.
//!
//! The broker manages:
//! - Held legs (`transmit == false`) waiting for their group's transmitting leg
//! - Live and dormant orders (bracket children wait for the entry fill)
//! - Expiry by validity date, fills against bar OHLC
//! - Parent/child cancellation and one-cancels-other between children
//! - Cash, position size and commission
//!
//! Every status change is queued as a `Notification` and handed out by
//! `drain_notifications`.

pub mod trigger;

use crate::config::BrokerConfig;
use crate::domain::{Bar, Notification, OrderId, OrderKind, OrderLeg, OrderSide, OrderStatus};
use crate::gateway::{GatewayError, OrderGateway};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimState {
    /// Released, waiting for the parent to fill.
    Dormant,
    /// Eligible to execute from the step after `activated_step`.
    Live { activated_step: usize },
    Done(OrderStatus),
}

#[derive(Debug, Clone)]
struct SimOrder {
    leg: OrderLeg,
    state: SimState,
}

impl SimOrder {
    fn is_open(&self) -> bool {
        !matches!(self.state, SimState::Done(_))
    }
}

pub struct SimBroker {
    config: BrokerConfig,
    next_id: u64,
    /// Legs submitted with `transmit == false`, in submission order.
    held: Vec<(OrderId, OrderLeg)>,
    orders: BTreeMap<OrderId, SimOrder>,
    notifications: Vec<Notification>,
    cash: f64,
    position: f64,
    step: usize,
    date: NaiveDate,
    last_close: f64,
}

impl SimBroker {
    pub fn new(config: BrokerConfig) -> Self {
        let cash = config.cash;
        Self {
            config,
            next_id: 1,
            held: Vec::new(),
            orders: BTreeMap::new(),
            notifications: Vec::new(),
            cash,
            position: 0.0,
            step: 0,
            date: NaiveDate::MIN,
            last_close: 0.0,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Signed position size.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Cash plus position marked at the last processed close.
    pub fn value(&self) -> f64 {
        self.cash + self.position * self.last_close
    }

    /// Number of legs held back waiting for a transmitting leg.
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Number of released orders not yet terminal.
    pub fn open_count(&self) -> usize {
        self.orders.values().filter(|o| o.is_open()).count()
    }

    pub fn status_of(&self, id: OrderId) -> Option<OrderStatus> {
        self.orders.get(&id).map(|o| match o.state {
            SimState::Done(status) => status,
            SimState::Dormant | SimState::Live { .. } => OrderStatus::Submitted,
        })
    }

    /// Advance to `bar`: expire stale orders, then execute live ones.
    pub fn process_bar(&mut self, step: usize, bar: &Bar) {
        self.step = step;
        self.date = bar.date;

        let ids: Vec<OrderId> = self.orders.keys().copied().collect();

        for &id in &ids {
            let Some(order) = self.orders.get(&id) else {
                continue;
            };
            if order.is_open() && bar.date > order.leg.valid_until {
                self.finish(id, OrderStatus::Expired, None);
                self.cancel_children(id);
            }
        }

        for &id in &ids {
            let Some(order) = self.orders.get(&id) else {
                continue;
            };
            // Orders activated on this step wait for the next bar.
            let SimState::Live { activated_step } = order.state else {
                continue;
            };
            if activated_step >= step {
                continue;
            }
            let leg = &order.leg;
            if let Some(price) = trigger::fill_price(leg.kind, leg.side, leg.price, bar) {
                self.execute(id, price);
            }
        }

        if !bar.close.is_nan() {
            self.last_close = bar.close;
        }
    }

    fn execute(&mut self, id: OrderId, price: f64) {
        let Some(order) = self.orders.get(&id) else {
            return;
        };
        let (side, quantity, parent) = (order.leg.side, order.leg.quantity, order.leg.parent);

        let gross = price * quantity;
        let commission = gross * self.config.commission;
        match side {
            OrderSide::Buy => {
                self.cash -= gross + commission;
                self.position += quantity;
            }
            OrderSide::Sell => {
                self.cash += gross - commission;
                self.position -= quantity;
            }
        }
        debug!(order = %id, price, quantity, cash = self.cash, "sim fill");
        self.finish(id, OrderStatus::Filled, Some(price));

        // Entry filled: its children go live from the next bar.
        let step = self.step;
        for child in self.orders.values_mut() {
            if child.leg.parent == Some(id) && child.state == SimState::Dormant {
                child.state = SimState::Live {
                    activated_step: step,
                };
            }
        }

        // Child filled: the other child is cancelled.
        if let Some(parent) = parent {
            let siblings: Vec<OrderId> = self
                .orders
                .iter()
                .filter(|(other, o)| **other != id && o.leg.parent == Some(parent) && o.is_open())
                .map(|(other, _)| *other)
                .collect();
            for sibling in siblings {
                self.finish(sibling, OrderStatus::Cancelled, None);
            }
        }
    }

    fn cancel_children(&mut self, parent: OrderId) {
        let children: Vec<OrderId> = self
            .orders
            .iter()
            .filter(|(_, o)| o.leg.parent == Some(parent) && o.is_open())
            .map(|(id, _)| *id)
            .collect();
        for child in children {
            self.finish(child, OrderStatus::Cancelled, None);
        }
    }

    fn finish(&mut self, id: OrderId, status: OrderStatus, fill_price: Option<f64>) {
        if let Some(order) = self.orders.get_mut(&id) {
            order.state = SimState::Done(status);
            let side = order.leg.side;
            self.notify(id, side, status, fill_price);
        }
    }

    fn notify(
        &mut self,
        id: OrderId,
        side: OrderSide,
        status: OrderStatus,
        fill_price: Option<f64>,
    ) {
        self.notifications.push(Notification {
            order_id: id,
            side,
            status,
            date: self.date,
            step: self.step,
            fill_price,
        });
    }

    /// Why the broker would refuse `leg`, if it would.
    fn rejection_reason(&self, leg: &OrderLeg) -> Option<&'static str> {
        if !(leg.quantity.is_finite() && leg.quantity > 0.0) {
            return Some("non-positive quantity");
        }
        if leg.kind != OrderKind::Market && !(leg.price.is_finite() && leg.price > 0.0) {
            return Some("non-positive price");
        }
        if leg.side == OrderSide::Buy {
            let cost = leg.price * leg.quantity * (1.0 + self.config.commission);
            if cost > self.cash {
                return Some("insufficient cash");
            }
        }
        None
    }

    /// Release a complete held group to the market, parent first.
    fn release(&mut self, group: Vec<(OrderId, OrderLeg)>) {
        for (id, leg) in group {
            let parent_state = leg.parent.and_then(|p| self.orders.get(&p)).map(|o| o.state);
            let side = leg.side;

            let state = match parent_state {
                Some(SimState::Done(OrderStatus::Filled)) => SimState::Live {
                    activated_step: self.step,
                },
                Some(SimState::Done(_)) => SimState::Done(OrderStatus::Cancelled),
                Some(_) => SimState::Dormant,
                None => SimState::Live {
                    activated_step: self.step,
                },
            };

            if let SimState::Done(status) = state {
                self.orders.insert(id, SimOrder { leg, state });
                self.notify(id, side, status, None);
                continue;
            }

            if let Some(reason) = self.rejection_reason(&leg) {
                debug!(order = %id, reason, "sim reject");
                self.orders.insert(
                    id,
                    SimOrder {
                        leg,
                        state: SimState::Done(OrderStatus::Rejected),
                    },
                );
                self.notify(id, side, OrderStatus::Rejected, None);
                continue;
            }

            self.orders.insert(id, SimOrder { leg, state });
            self.notify(id, side, OrderStatus::Submitted, None);
        }
    }
}

impl OrderGateway for SimBroker {
    fn submit(&mut self, leg: &OrderLeg) -> Result<OrderId, GatewayError> {
        let group_root = self.held.first().map(|(id, _)| *id);

        match leg.parent {
            None => {
                if !self.held.is_empty() {
                    // A new group started before the previous one transmitted.
                    debug!(dropped = self.held.len(), "discarding untransmitted legs");
                    self.held.clear();
                }
            }
            Some(parent) => {
                let held_parent = self.held.iter().any(|(id, _)| *id == parent);
                if !held_parent && !self.orders.contains_key(&parent) {
                    return Err(GatewayError::UnknownParent(parent));
                }
                if group_root.is_some() && group_root != Some(parent) {
                    return Err(GatewayError::ParentMismatch {
                        leg_parent: Some(parent),
                        group: group_root,
                    });
                }
            }
        }

        let id = OrderId(self.next_id);
        self.next_id += 1;
        self.held.push((id, leg.clone()));

        if leg.transmit {
            let group = std::mem::take(&mut self.held);
            self.release(group);
        }
        Ok(id)
    }

    /// Native bracket: all three legs are numbered and released together,
    /// without passing through the held queue.
    fn submit_bracket(
        &mut self,
        entry: &OrderLeg,
        stop: &OrderLeg,
        target: &OrderLeg,
    ) -> Result<[OrderId; 3], GatewayError> {
        if !self.held.is_empty() {
            debug!(dropped = self.held.len(), "discarding untransmitted legs");
            self.held.clear();
        }

        let entry_id = OrderId(self.next_id);
        let ids = [entry_id, OrderId(self.next_id + 1), OrderId(self.next_id + 2)];
        self.next_id += 3;

        let group = vec![
            (
                ids[0],
                OrderLeg {
                    parent: None,
                    transmit: false,
                    ..entry.clone()
                },
            ),
            (
                ids[1],
                OrderLeg {
                    parent: Some(entry_id),
                    transmit: false,
                    ..stop.clone()
                },
            ),
            (
                ids[2],
                OrderLeg {
                    parent: Some(entry_id),
                    transmit: true,
                    ..target.clone()
                },
            ),
        ];
        self.release(group);
        Ok(ids)
    }

    fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }
}

impl Default for SimBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LegRole;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn bar(d: u32, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            date: day(d),
            open,
            high,
            low,
            close,
            volume: 1000,
        }
    }

    fn leg(
        role: LegRole,
        side: OrderSide,
        kind: OrderKind,
        price: f64,
        parent: Option<OrderId>,
        transmit: bool,
    ) -> OrderLeg {
        OrderLeg {
            role,
            side,
            kind,
            price,
            quantity: 1.0,
            valid_until: day(20),
            parent,
            transmit,
        }
    }

    fn submit_bracket(broker: &mut SimBroker) -> [OrderId; 3] {
        broker
            .submit_bracket(
                &leg(LegRole::Entry, OrderSide::Buy, OrderKind::Limit, 99.5, None, false),
                &leg(LegRole::Stop, OrderSide::Sell, OrderKind::Stop, 97.51, None, false),
                &leg(LegRole::Target, OrderSide::Sell, OrderKind::Limit, 101.49, None, true),
            )
            .unwrap()
    }

    fn statuses(notes: &[Notification]) -> Vec<(u64, OrderStatus)> {
        notes.iter().map(|n| (n.order_id.0, n.status)).collect()
    }

    #[test]
    fn held_legs_are_not_live_until_transmit() {
        let mut broker = SimBroker::default();
        let entry = broker
            .submit(&leg(LegRole::Entry, OrderSide::Buy, OrderKind::Limit, 99.5, None, false))
            .unwrap();
        broker
            .submit(&leg(LegRole::Stop, OrderSide::Sell, OrderKind::Stop, 97.51, Some(entry), false))
            .unwrap();

        assert_eq!(broker.held_count(), 2);
        assert_eq!(broker.open_count(), 0);
        broker.process_bar(1, &bar(2, 99.0, 100.0, 95.0, 99.0));
        assert!(broker.drain_notifications().is_empty());

        broker
            .submit(&leg(LegRole::Target, OrderSide::Sell, OrderKind::Limit, 101.49, Some(entry), true))
            .unwrap();
        assert_eq!(broker.held_count(), 0);
        assert_eq!(
            statuses(&broker.drain_notifications()),
            vec![
                (1, OrderStatus::Submitted),
                (2, OrderStatus::Submitted),
                (3, OrderStatus::Submitted)
            ]
        );
    }

    #[test]
    fn unknown_parent_is_an_error() {
        let mut broker = SimBroker::default();
        let err = broker
            .submit(&leg(LegRole::Stop, OrderSide::Sell, OrderKind::Stop, 97.0, Some(OrderId(9)), true))
            .unwrap_err();
        assert_eq!(err, GatewayError::UnknownParent(OrderId(9)));
    }

    #[test]
    fn entry_fill_then_target_fill_cancels_stop() {
        let mut broker = SimBroker::default();
        submit_bracket(&mut broker);
        broker.drain_notifications();

        // Entry touched on the next bar.
        broker.process_bar(1, &bar(2, 100.0, 100.5, 99.0, 100.0));
        let notes = broker.drain_notifications();
        assert_eq!(statuses(&notes), vec![(1, OrderStatus::Filled)]);
        assert_eq!(notes[0].fill_price, Some(99.5));
        assert_eq!(broker.position(), 1.0);

        // Children are not eligible on the entry's own bar, only after.
        broker.process_bar(2, &bar(3, 100.0, 102.0, 99.8, 101.8));
        let notes = broker.drain_notifications();
        assert_eq!(
            statuses(&notes),
            vec![(3, OrderStatus::Filled), (2, OrderStatus::Cancelled)]
        );
        assert_eq!(broker.position(), 0.0);
        assert!((broker.cash() - (10_000.0 - 99.5 + 101.49)).abs() < 1e-9);
        assert_eq!(broker.open_count(), 0);
    }

    #[test]
    fn children_never_fill_on_entry_bar() {
        let mut broker = SimBroker::default();
        submit_bracket(&mut broker);
        broker.drain_notifications();

        // Wide bar touches entry, stop and target at once.
        broker.process_bar(1, &bar(2, 100.0, 103.0, 96.0, 100.0));
        assert_eq!(
            statuses(&broker.drain_notifications()),
            vec![(1, OrderStatus::Filled)]
        );
    }

    #[test]
    fn entry_expiry_cancels_children() {
        let mut broker = SimBroker::default();
        submit_bracket(&mut broker);
        broker.drain_notifications();

        broker.process_bar(1, &bar(21, 105.0, 106.0, 104.0, 105.0));
        assert_eq!(
            statuses(&broker.drain_notifications()),
            vec![
                (1, OrderStatus::Expired),
                (2, OrderStatus::Cancelled),
                (3, OrderStatus::Cancelled)
            ]
        );
    }

    #[test]
    fn unaffordable_entry_is_rejected_and_children_cancelled() {
        let mut broker = SimBroker::new(BrokerConfig {
            cash: 50.0,
            commission: 0.0,
        });
        submit_bracket(&mut broker);
        assert_eq!(
            statuses(&broker.drain_notifications()),
            vec![
                (1, OrderStatus::Rejected),
                (2, OrderStatus::Cancelled),
                (3, OrderStatus::Cancelled)
            ]
        );
        assert_eq!(broker.status_of(OrderId(1)), Some(OrderStatus::Rejected));
    }

    #[test]
    fn new_group_discards_untransmitted_legs() {
        let mut broker = SimBroker::default();
        broker
            .submit(&leg(LegRole::Entry, OrderSide::Buy, OrderKind::Limit, 99.5, None, false))
            .unwrap();
        submit_bracket(&mut broker);
        assert_eq!(broker.open_count(), 3);
        assert_eq!(broker.status_of(OrderId(1)), None);
    }

    #[test]
    fn bracket_and_linked_submission_agree() {
        let mut linked = SimBroker::default();
        let e = linked
            .submit(&leg(LegRole::Entry, OrderSide::Buy, OrderKind::Limit, 99.5, None, false))
            .unwrap();
        linked
            .submit(&leg(LegRole::Stop, OrderSide::Sell, OrderKind::Stop, 97.51, Some(e), false))
            .unwrap();
        linked
            .submit(&leg(LegRole::Target, OrderSide::Sell, OrderKind::Limit, 101.49, Some(e), true))
            .unwrap();

        let mut bracket = SimBroker::default();
        assert_eq!(
            submit_bracket(&mut bracket),
            [OrderId(1), OrderId(2), OrderId(3)]
        );
        assert_eq!(
            statuses(&linked.drain_notifications()),
            statuses(&bracket.drain_notifications())
        );
        assert_eq!(bracket.held_count(), 0);
    }

    #[test]
    fn commission_is_charged_both_ways() {
        let mut broker = SimBroker::new(BrokerConfig {
            cash: 1_000.0,
            commission: 0.01,
        });
        broker
            .submit(&leg(LegRole::Entry, OrderSide::Buy, OrderKind::Market, 100.0, None, true))
            .unwrap();
        broker.process_bar(1, &bar(2, 100.0, 101.0, 99.0, 100.0));
        assert!((broker.cash() - 899.0).abs() < 1e-9);
        assert!((broker.value() - 999.0).abs() < 1e-9);
    }
}
