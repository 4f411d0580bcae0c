//! Controller scenarios driven by a scripted gateway.
//!
//! The gateway records submissions and never produces notifications on its
//! own; each test feeds the notifications it wants, in the order a broker
//! would send them.

use bracketlab_core::config::StrategyConfig;
use bracketlab_core::controller::{
    BracketController, GroupStatus, IgnoreReason, NotificationOutcome, PositionChange, StepAction,
    StepContext,
};
use bracketlab_core::domain::{LegRole, Notification, OrderId, OrderLeg, OrderSide, OrderStatus};
use bracketlab_core::gateway::{GatewayError, OrderGateway};
use bracketlab_core::signal::CrossSignal;
use chrono::NaiveDate;

#[derive(Default)]
struct ScriptedGateway {
    legs: Vec<(OrderId, OrderLeg)>,
}

impl OrderGateway for ScriptedGateway {
    fn submit(&mut self, leg: &OrderLeg) -> Result<OrderId, GatewayError> {
        let id = OrderId(100 + self.legs.len() as u64);
        self.legs.push((id, leg.clone()));
        Ok(id)
    }

    fn drain_notifications(&mut self) -> Vec<Notification> {
        Vec::new()
    }
}

fn ctx(step: usize, signal: CrossSignal, close: f64) -> StepContext {
    StepContext {
        step,
        date: NaiveDate::from_ymd_opt(2005, 3, 1).unwrap(),
        close,
        signal,
    }
}

fn note(id: OrderId, status: OrderStatus, step: usize) -> Notification {
    Notification {
        order_id: id,
        side: OrderSide::Buy,
        status,
        date: NaiveDate::from_ymd_opt(2005, 3, 1).unwrap(),
        step,
        fill_price: (status == OrderStatus::Filled).then_some(100.0),
    }
}

fn submit(ctl: &mut BracketController, gw: &mut ScriptedGateway, step: usize) -> [OrderId; 3] {
    match ctl.on_step(&ctx(step, CrossSignal::CrossUp, 100.0), gw) {
        Some(StepAction::Submitted {
            entry,
            stop,
            target,
            ..
        }) => [entry, stop, target],
        other => panic!("expected submission, got {other:?}"),
    }
}

#[test]
fn reference_close_gives_reference_leg_prices() {
    let mut ctl = BracketController::new(StrategyConfig::default(), 1.0);
    let mut gw = ScriptedGateway::default();
    submit(&mut ctl, &mut gw, 0);

    let prices: Vec<f64> = gw.legs.iter().map(|(_, l)| l.price).collect();
    assert!((prices[0] - 99.5).abs() < 1e-9);
    assert!((prices[1] - 97.51).abs() < 1e-9);
    assert!((prices[2] - 101.49).abs() < 1e-9);

    let roles: Vec<LegRole> = gw.legs.iter().map(|(_, l)| l.role).collect();
    assert_eq!(roles, vec![LegRole::Entry, LegRole::Stop, LegRole::Target]);
}

#[test]
fn cross_up_with_three_outstanding_legs_is_a_no_op() {
    let mut ctl = BracketController::new(StrategyConfig::default(), 1.0);
    let mut gw = ScriptedGateway::default();
    submit(&mut ctl, &mut gw, 5);

    assert_eq!(ctl.on_step(&ctx(10, CrossSignal::CrossUp, 90.0), &mut gw), None);
    assert_eq!(gw.legs.len(), 3);
    assert_eq!(ctl.in_flight().map(|g| g.outstanding_len()), Some(3));
}

#[test]
fn entry_fill_opens_position_at_notification_step() {
    let mut ctl = BracketController::new(StrategyConfig::default(), 1.0);
    let mut gw = ScriptedGateway::default();
    let [entry, _, _] = submit(&mut ctl, &mut gw, 15);

    let outcome = ctl.on_notification(&note(entry, OrderStatus::Filled, 20));
    assert_eq!(
        outcome,
        NotificationOutcome::Applied {
            retired: vec![entry],
            position: Some(PositionChange::Opened { step: 20 }),
            group_closed: false,
        }
    );
    assert!(!ctl.position().is_flat);
    assert_eq!(ctl.position().entry_step, Some(20));
    assert_eq!(
        ctl.in_flight().map(|g| g.status),
        Some(GroupStatus::PartiallyActive)
    );
}

#[test]
fn target_fill_retires_stop_and_closes_group() {
    let mut ctl = BracketController::new(StrategyConfig::default(), 1.0);
    let mut gw = ScriptedGateway::default();
    let [entry, stop, target] = submit(&mut ctl, &mut gw, 1);

    ctl.on_notification(&note(entry, OrderStatus::Filled, 2));
    let outcome = ctl.on_notification(&note(target, OrderStatus::Filled, 4));
    assert_eq!(
        outcome,
        NotificationOutcome::Applied {
            retired: vec![target, stop],
            position: Some(PositionChange::Closed),
            group_closed: true,
        }
    );
    assert!(ctl.in_flight().is_none());
    assert!(ctl.position().is_flat);

    // The broker's cancel for the stop is a duplicate by now.
    assert_eq!(
        ctl.on_notification(&note(stop, OrderStatus::Cancelled, 4)),
        NotificationOutcome::Ignored(IgnoreReason::AlreadyTerminal)
    );
    assert_eq!(ctl.closed_groups().len(), 1);
    assert_eq!(ctl.closed_groups()[0].closed_step, Some(4));
}

#[test]
fn stop_fill_closes_the_group_too() {
    let mut ctl = BracketController::new(StrategyConfig::default(), 1.0);
    let mut gw = ScriptedGateway::default();
    let [entry, stop, _] = submit(&mut ctl, &mut gw, 1);

    ctl.on_notification(&note(entry, OrderStatus::Filled, 2));
    ctl.on_notification(&note(stop, OrderStatus::Filled, 3));
    assert!(ctl.in_flight().is_none());
    assert!(ctl.position().is_flat);
}

#[test]
fn rejected_entry_closes_group_and_stays_flat() {
    let mut ctl = BracketController::new(StrategyConfig::default(), 1.0);
    let mut gw = ScriptedGateway::default();
    let [entry, stop, target] = submit(&mut ctl, &mut gw, 3);

    let outcome = ctl.on_notification(&note(entry, OrderStatus::Rejected, 3));
    assert!(matches!(
        outcome,
        NotificationOutcome::Applied {
            group_closed: true,
            ..
        }
    ));
    assert!(ctl.in_flight().is_none());
    assert!(ctl.position().is_flat);
    for child in [stop, target] {
        assert_eq!(
            ctl.on_notification(&note(child, OrderStatus::Cancelled, 3)),
            NotificationOutcome::Ignored(IgnoreReason::AlreadyTerminal)
        );
    }

    // Free to trade again on the next signal.
    submit(&mut ctl, &mut gw, 4);
    assert_eq!(gw.legs.len(), 6);
}

#[test]
fn unknown_reference_is_ignored_without_state_change() {
    let mut ctl = BracketController::new(StrategyConfig::default(), 1.0);
    let mut gw = ScriptedGateway::default();
    submit(&mut ctl, &mut gw, 1);

    assert_eq!(
        ctl.on_notification(&note(OrderId(7), OrderStatus::Filled, 2)),
        NotificationOutcome::Ignored(IgnoreReason::UnknownOrder)
    );
    assert!(ctl.position().is_flat);
    assert_eq!(ctl.in_flight().map(|g| g.outstanding_len()), Some(3));
}

#[test]
fn partial_fill_keeps_leg_outstanding() {
    let mut ctl = BracketController::new(StrategyConfig::default(), 1.0);
    let mut gw = ScriptedGateway::default();
    let [entry, _, _] = submit(&mut ctl, &mut gw, 1);

    ctl.on_notification(&note(entry, OrderStatus::PartiallyFilled, 2));
    assert!(ctl.position().is_flat);
    assert_eq!(ctl.in_flight().map(|g| g.outstanding_len()), Some(3));
}

#[test]
fn hold_expiry_signals_exactly_once_at_limit() {
    let mut ctl = BracketController::new(StrategyConfig::default(), 1.0);
    let mut gw = ScriptedGateway::default();
    let [entry, stop, target] = submit(&mut ctl, &mut gw, 15);

    ctl.on_notification(&note(entry, OrderStatus::Filled, 20));
    ctl.on_notification(&note(stop, OrderStatus::Expired, 22));
    ctl.on_notification(&note(target, OrderStatus::Expired, 22));

    let mut fired = Vec::new();
    for step in 21..=45 {
        if let Some(action) = ctl.on_step(&ctx(step, CrossSignal::CrossUp, 100.0), &mut gw) {
            fired.push((step, action));
        }
    }
    assert_eq!(
        fired,
        vec![(
            30,
            StepAction::HoldExpired {
                entry_step: 20,
                steps_held: 10
            }
        )]
    );
    // Holding a position blocks new brackets.
    assert_eq!(gw.legs.len(), 3);
}

#[test]
fn cross_down_is_never_acted_on() {
    let mut ctl = BracketController::new(StrategyConfig::default(), 1.0);
    let mut gw = ScriptedGateway::default();
    for step in 0..10 {
        assert_eq!(
            ctl.on_step(&ctx(step, CrossSignal::CrossDown, 100.0), &mut gw),
            None
        );
    }
    assert!(gw.legs.is_empty());
}
