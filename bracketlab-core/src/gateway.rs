//! Order gateway: the boundary between the controller and a broker.
//!
//! Submission is fire-and-forget: the gateway hands back an order reference
//! immediately and reports every later status change as a `Notification`,
//! collected by the step loop between steps.

use crate::domain::{Notification, OrderId, OrderLeg};
use thiserror::Error;

/// Errors raised synchronously by a submission call.
///
/// Broker-side rejections are not errors; they arrive as `Rejected`
/// notifications.
#[derive(Debug, Error, PartialEq)]
pub enum GatewayError {
    #[error("parent order {0} is unknown to the gateway")]
    UnknownParent(OrderId),

    #[error("leg is attached to parent {leg_parent:?} but the held group belongs to {group:?}")]
    ParentMismatch {
        leg_parent: Option<OrderId>,
        group: Option<OrderId>,
    },

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// Order submission and notification boundary.
pub trait OrderGateway {
    /// Submit one leg and return its reference.
    ///
    /// Legs with `transmit == false` are held, not released to the market,
    /// until a leg of the same group with `transmit == true` arrives. The
    /// whole held group then goes live at once.
    fn submit(&mut self, leg: &OrderLeg) -> Result<OrderId, GatewayError>;

    /// Submit entry, stop and target as one transmission unit.
    ///
    /// The default runs the linked discipline: entry and stop held, target
    /// transmitting, with both children attached to the entry reference.
    fn submit_bracket(
        &mut self,
        entry: &OrderLeg,
        stop: &OrderLeg,
        target: &OrderLeg,
    ) -> Result<[OrderId; 3], GatewayError> {
        let entry_id = self.submit(&OrderLeg {
            transmit: false,
            parent: None,
            ..entry.clone()
        })?;
        let stop_id = self.submit(&OrderLeg {
            transmit: false,
            parent: Some(entry_id),
            ..stop.clone()
        })?;
        let target_id = self.submit(&OrderLeg {
            transmit: true,
            parent: Some(entry_id),
            ..target.clone()
        })?;
        Ok([entry_id, stop_id, target_id])
    }

    /// Take every notification produced since the last drain, oldest first.
    fn drain_notifications(&mut self) -> Vec<Notification>;
}
