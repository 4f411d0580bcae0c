//! Bracket controller: turns crossover signals into bracket order groups.
//!
//! Once per step the controller either:
//! - does nothing because a group is still in flight,
//! - submits a new entry/stop/target group on a cross up while flat, or
//! - reports (and optionally acts on) an expired hold period while in a position.
//!
//! Between steps it consumes gateway notifications, which are the only
//! thing that moves group and position state. Cross downs are never acted
//! on: the controller is long-only.

pub mod group;
pub mod plan;

pub use group::{
    ControllerState, GroupKind, GroupStatus, IgnoreReason, NotificationOutcome, OrderGroup,
    PositionChange,
};
pub use plan::{exit_leg, BracketPlan, LegPrices, LegValidity};

use crate::config::{HoldPolicy, StrategyConfig, SubmissionMode};
use crate::domain::{Notification, OrderId, OrderLeg, OrderStatus, PositionState};
use crate::gateway::{GatewayError, OrderGateway};
use crate::signal::CrossSignal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Per-step input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepContext {
    pub step: usize,
    pub date: NaiveDate,
    pub close: f64,
    pub signal: CrossSignal,
}

/// What the controller did on a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepAction {
    Submitted {
        entry: OrderId,
        stop: OrderId,
        target: OrderId,
        prices: LegPrices,
    },
    HoldExpired {
        entry_step: usize,
        steps_held: usize,
    },
    Flattening {
        exit: OrderId,
        steps_held: usize,
    },
    SubmissionFailed {
        reason: String,
    },
}

pub struct BracketController {
    config: StrategyConfig,
    quantity: f64,
    state: ControllerState,
}

impl BracketController {
    pub fn new(config: StrategyConfig, quantity: f64) -> Self {
        Self {
            config,
            quantity,
            state: ControllerState::new(),
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn position(&self) -> PositionState {
        self.state.position
    }

    pub fn in_flight(&self) -> Option<&OrderGroup> {
        self.state.in_flight()
    }

    pub fn closed_groups(&self) -> &[OrderGroup] {
        self.state.closed_groups()
    }

    /// Evaluate one step. Never fails: gateway errors come back as
    /// `StepAction::SubmissionFailed`.
    pub fn on_step(
        &mut self,
        ctx: &StepContext,
        gateway: &mut dyn OrderGateway,
    ) -> Option<StepAction> {
        if let Some(group) = self.state.in_flight() {
            debug!(
                step = ctx.step,
                outstanding = group.outstanding_len(),
                "group in flight, skipping"
            );
            return None;
        }

        if self.state.position.is_flat {
            if ctx.signal != CrossSignal::CrossUp {
                return None;
            }
            return Some(self.submit_bracket(ctx, gateway));
        }

        let steps_held = self.state.position.steps_held(ctx.step)?;
        if steps_held < self.config.max_hold_steps || self.state.hold_signaled() {
            return None;
        }
        self.state.mark_hold_signaled();
        let entry_step = self.state.position.entry_step.unwrap_or(ctx.step);

        match self.config.hold_policy {
            HoldPolicy::LogOnly => {
                info!(
                    step = ctx.step,
                    date = %ctx.date,
                    entry_step,
                    steps_held,
                    "hold period expired, keeping position"
                );
                Some(StepAction::HoldExpired {
                    entry_step,
                    steps_held,
                })
            }
            HoldPolicy::Flatten => {
                let leg = exit_leg(ctx.close, self.quantity);
                match gateway.submit(&leg) {
                    Ok(exit) => {
                        info!(
                            step = ctx.step,
                            date = %ctx.date,
                            order = %exit,
                            steps_held,
                            "hold period expired, flattening"
                        );
                        self.state.register(OrderGroup::flatten(exit, ctx.step));
                        Some(StepAction::Flattening { exit, steps_held })
                    }
                    Err(e) => Some(self.submission_failed(ctx, e)),
                }
            }
        }
    }

    /// Apply a gateway notification. Unknown and duplicate references are
    /// logged and ignored.
    pub fn on_notification(&mut self, notification: &Notification) -> NotificationOutcome {
        let outcome = self.state.apply(notification);
        match &outcome {
            NotificationOutcome::Ignored(IgnoreReason::UnknownOrder) => warn!(
                order = %notification.order_id,
                status = %notification.status,
                "notification for unknown order ignored"
            ),
            NotificationOutcome::Ignored(IgnoreReason::AlreadyTerminal) => debug!(
                order = %notification.order_id,
                status = %notification.status,
                "notification for retired order ignored"
            ),
            NotificationOutcome::Applied {
                retired,
                position,
                group_closed,
            } => {
                info!(
                    date = %notification.date,
                    order = %notification.order_id,
                    side = %notification.side,
                    status = %notification.status,
                    "order notification"
                );
                if notification.status == OrderStatus::Rejected {
                    warn!(order = %notification.order_id, "order rejected, not resubmitting");
                }
                match position {
                    Some(PositionChange::Opened { step }) => {
                        info!(step, price = ?notification.fill_price, "position opened")
                    }
                    Some(PositionChange::Closed) => {
                        info!(price = ?notification.fill_price, "position closed")
                    }
                    None => {}
                }
                if *group_closed {
                    debug!(retired = ?retired, "order group closed");
                }
            }
        }
        outcome
    }

    fn submit_bracket(&mut self, ctx: &StepContext, gateway: &mut dyn OrderGateway) -> StepAction {
        let plan = BracketPlan::new(&self.config, ctx.close, ctx.date, self.quantity);

        let submitted = match self.config.submission_mode {
            SubmissionMode::Linked => submit_linked(&plan, gateway),
            SubmissionMode::Bracket => gateway.submit_bracket(&plan.entry, &plan.stop, &plan.target),
        };

        let [entry, stop, target] = match submitted {
            Ok(ids) => ids,
            Err(e) => return self.submission_failed(ctx, e),
        };

        info!(date = %ctx.date, order = %entry, price = plan.prices.entry, "entry buy limit");
        info!(date = %ctx.date, order = %stop, price = plan.prices.stop, "stop sell");
        info!(date = %ctx.date, order = %target, price = plan.prices.target, "target sell limit");

        self.state
            .register(OrderGroup::bracket(entry, stop, target, ctx.step));

        StepAction::Submitted {
            entry,
            stop,
            target,
            prices: plan.prices,
        }
    }

    fn submission_failed(&self, ctx: &StepContext, e: GatewayError) -> StepAction {
        error!(step = ctx.step, date = %ctx.date, error = %e, "order submission failed");
        StepAction::SubmissionFailed {
            reason: e.to_string(),
        }
    }
}

/// Three separate calls; entry and stop held, target transmits the group.
fn submit_linked(
    plan: &BracketPlan,
    gateway: &mut dyn OrderGateway,
) -> Result<[OrderId; 3], GatewayError> {
    let entry = gateway.submit(&OrderLeg {
        transmit: false,
        ..plan.entry.clone()
    })?;
    let stop = gateway.submit(&OrderLeg {
        parent: Some(entry),
        transmit: false,
        ..plan.stop.clone()
    })?;
    let target = gateway.submit(&OrderLeg {
        parent: Some(entry),
        transmit: true,
        ..plan.target.clone()
    })?;
    Ok([entry, stop, target])
}
