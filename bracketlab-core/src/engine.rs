//! Step loop driving the controller bar by bar against the simulated broker.
//!
//! Per bar `t`:
//! 1. The broker processes the bar (expiries, fills, OCO cancels)
//! 2. Every resulting notification is delivered to the controller
//! 3. The evaluator is fed the fast/slow SMA pair for `t`
//! 4. `on_step` runs once; notifications from its submissions are delivered
//!    before bar `t + 1`

use crate::broker::SimBroker;
use crate::config::{ConfigError, RunConfig};
use crate::controller::{BracketController, NotificationOutcome, StepAction, StepContext};
use crate::domain::bar::validate_series;
use crate::domain::{Bar, BarError, Notification};
use crate::gateway::OrderGateway;
use crate::indicators::{Indicator, Sma};
use crate::signal::CrossoverEvaluator;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bars(#[from] BarError),

    #[error("no bars to run on")]
    NoBars,
}

/// One controller action, stamped with the step it happened on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub date: NaiveDate,
    pub action: StepAction,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub fingerprint: String,
    pub bars: usize,
    pub notifications: Vec<Notification>,
    pub actions: Vec<StepRecord>,
    pub groups_closed: usize,
    /// Closed groups whose entry never filled.
    pub groups_unfilled: usize,
    pub ignored_notifications: usize,
    pub final_cash: f64,
    pub final_value: f64,
    pub final_position: f64,
}

/// Validate inputs and run with a broker built from `config.broker`.
pub fn run(bars: &[Bar], config: &RunConfig) -> Result<RunReport, RunError> {
    config.validate()?;
    if bars.is_empty() {
        return Err(RunError::NoBars);
    }
    validate_series(bars)?;

    let mut broker = SimBroker::new(config.broker.clone());
    Ok(run_with_broker(bars, config, &mut broker))
}

/// Run over already-validated bars with a caller-supplied broker.
pub fn run_with_broker(bars: &[Bar], config: &RunConfig, broker: &mut SimBroker) -> RunReport {
    let strategy = &config.strategy;
    let fast = Sma::new(strategy.fast_period).compute(bars);
    let slow = Sma::new(strategy.slow_period).compute(bars);

    let mut evaluator = CrossoverEvaluator::new();
    let mut controller = BracketController::new(strategy.clone(), config.sizer.stake);
    let mut notifications = Vec::new();
    let mut actions = Vec::new();
    let mut ignored = 0usize;

    for (t, bar) in bars.iter().enumerate() {
        broker.process_bar(t, bar);
        deliver(broker, &mut controller, &mut notifications, &mut ignored);

        let ctx = StepContext {
            step: t,
            date: bar.date,
            close: bar.close,
            signal: evaluator.update(fast[t], slow[t]),
        };
        if let Some(action) = controller.on_step(&ctx, &mut *broker) {
            actions.push(StepRecord {
                step: t,
                date: bar.date,
                action,
            });
        }
        deliver(broker, &mut controller, &mut notifications, &mut ignored);
    }

    let closed = controller.closed_groups();
    let groups_unfilled = closed.iter().filter(|g| !g.any_filled()).count();

    info!(
        bars = bars.len(),
        groups = closed.len(),
        value = broker.value(),
        "run complete"
    );

    RunReport {
        fingerprint: strategy.fingerprint(),
        bars: bars.len(),
        notifications,
        actions,
        groups_closed: closed.len(),
        groups_unfilled,
        ignored_notifications: ignored,
        final_cash: broker.cash(),
        final_value: broker.value(),
        final_position: broker.position(),
    }
}

fn deliver(
    broker: &mut SimBroker,
    controller: &mut BracketController,
    log: &mut Vec<Notification>,
    ignored: &mut usize,
) {
    for notification in broker.drain_notifications() {
        if let NotificationOutcome::Ignored(_) = controller.on_notification(&notification) {
            *ignored += 1;
        }
        log.push(notification);
    }
}
