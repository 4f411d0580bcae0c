//! In-flight order group and the notification state transition.
//!
//! `ControllerState::apply` is the only place notifications mutate state.
//! It needs no gateway and no clock, so every lifecycle path can be driven
//! directly from tests.

use crate::domain::{LegRole, Notification, OrderId, OrderStatus, PositionState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Lifecycle of an order group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupStatus {
    /// Built, not yet accepted by the gateway.
    Planned,
    /// All legs handed to the gateway; none terminal yet.
    Submitted,
    /// At least one leg has filled or ended.
    PartiallyActive,
    /// Every leg is terminal.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKind {
    /// Entry + stop + target.
    Bracket,
    /// Single exit leg sent on hold expiry.
    Flatten,
}

/// A group of orders tracked as one unit until every leg is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderGroup {
    pub kind: GroupKind,
    pub status: GroupStatus,
    /// Role of every leg in the group.
    pub legs: BTreeMap<OrderId, LegRole>,
    /// Last status reported for each leg.
    pub leg_status: BTreeMap<OrderId, OrderStatus>,
    /// Legs not yet terminal.
    pub outstanding: BTreeSet<OrderId>,
    pub opened_step: usize,
    pub closed_step: Option<usize>,
}

impl OrderGroup {
    pub fn bracket(entry: OrderId, stop: OrderId, target: OrderId, step: usize) -> Self {
        Self::with_legs(
            GroupKind::Bracket,
            &[
                (entry, LegRole::Entry),
                (stop, LegRole::Stop),
                (target, LegRole::Target),
            ],
            step,
        )
    }

    pub fn flatten(exit: OrderId, step: usize) -> Self {
        Self::with_legs(GroupKind::Flatten, &[(exit, LegRole::Exit)], step)
    }

    fn with_legs(kind: GroupKind, legs: &[(OrderId, LegRole)], step: usize) -> Self {
        Self {
            kind,
            status: GroupStatus::Planned,
            legs: legs.iter().copied().collect(),
            leg_status: BTreeMap::new(),
            outstanding: legs.iter().map(|(id, _)| *id).collect(),
            opened_step: step,
            closed_step: None,
        }
    }

    /// Reference of the leg playing `role`, if the group has one.
    pub fn id_of(&self, role: LegRole) -> Option<OrderId> {
        self.legs
            .iter()
            .find(|(_, r)| **r == role)
            .map(|(id, _)| *id)
    }

    pub fn outstanding_len(&self) -> usize {
        self.outstanding.len()
    }

    /// True once any leg has been reported filled.
    pub fn any_filled(&self) -> bool {
        self.leg_status.values().any(|s| *s == OrderStatus::Filled)
    }
}

/// Why a notification changed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoreReason {
    /// Reference never belonged to any group this controller created.
    UnknownOrder,
    /// Reference belonged to a group but its leg was already retired.
    AlreadyTerminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionChange {
    Opened { step: usize },
    Closed,
}

/// Result of applying one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationOutcome {
    Ignored(IgnoreReason),
    Applied {
        /// Legs retired by this notification (the notified leg plus any
        /// sibling or child that dies with it).
        retired: Vec<OrderId>,
        position: Option<PositionChange>,
        group_closed: bool,
    },
}

/// Everything the controller knows: position, the in-flight group, the
/// entry → (stop, target) sibling table and the closed-group history.
#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    pub position: PositionState,
    in_flight: Option<OrderGroup>,
    siblings: HashMap<OrderId, (OrderId, OrderId)>,
    retired: HashSet<OrderId>,
    closed: Vec<OrderGroup>,
    hold_signaled: bool,
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> Option<&OrderGroup> {
        self.in_flight.as_ref()
    }

    pub fn closed_groups(&self) -> &[OrderGroup] {
        &self.closed
    }

    pub fn hold_signaled(&self) -> bool {
        self.hold_signaled
    }

    pub(crate) fn mark_hold_signaled(&mut self) {
        self.hold_signaled = true;
    }

    /// Register a freshly submitted group as the in-flight group.
    ///
    /// Callers check `in_flight().is_none()` first; registering over a live
    /// group would orphan its legs.
    pub(crate) fn register(&mut self, mut group: OrderGroup) {
        debug_assert!(self.in_flight.is_none(), "group already in flight");
        if let (Some(entry), Some(stop), Some(target)) = (
            group.id_of(LegRole::Entry),
            group.id_of(LegRole::Stop),
            group.id_of(LegRole::Target),
        ) {
            self.siblings.insert(entry, (stop, target));
        }
        group.status = GroupStatus::Submitted;
        self.in_flight = Some(group);
    }

    /// Apply one gateway notification.
    pub fn apply(&mut self, notification: &Notification) -> NotificationOutcome {
        let id = notification.order_id;
        let status = notification.status;

        let Some(group) = self.in_flight.as_mut() else {
            return NotificationOutcome::Ignored(self.classify_unknown(id));
        };
        let Some(&role) = group.legs.get(&id) else {
            return NotificationOutcome::Ignored(self.classify_unknown(id));
        };
        if !group.outstanding.contains(&id) {
            return NotificationOutcome::Ignored(IgnoreReason::AlreadyTerminal);
        }

        group.leg_status.insert(id, status);

        if !status.is_terminal() {
            if status == OrderStatus::PartiallyFilled {
                group.status = GroupStatus::PartiallyActive;
            }
            return NotificationOutcome::Applied {
                retired: Vec::new(),
                position: None,
                group_closed: false,
            };
        }

        let mut retired = vec![id];
        let mut position = None;

        match (role, status) {
            (LegRole::Entry, OrderStatus::Filled) => {
                self.position.open_at(notification.step);
                self.hold_signaled = false;
                position = Some(PositionChange::Opened {
                    step: notification.step,
                });
            }
            (LegRole::Entry, _) => {
                // Children never go live without their parent.
                if let Some(&(stop, target)) = self.siblings.get(&id) {
                    retired.extend([stop, target]);
                }
            }
            (LegRole::Stop | LegRole::Target, OrderStatus::Filled) => {
                let sibling = group
                    .legs
                    .iter()
                    .find(|(other, r)| {
                        **other != id && matches!(r, LegRole::Stop | LegRole::Target)
                    })
                    .map(|(other, _)| *other);
                retired.extend(sibling);
                self.position.close();
                position = Some(PositionChange::Closed);
            }
            (LegRole::Exit, OrderStatus::Filled) => {
                self.position.close();
                position = Some(PositionChange::Closed);
            }
            _ => {}
        }

        // Only legs still outstanding count as retired by this notification.
        retired.retain(|leg| group.outstanding.remove(leg));
        self.retired.extend(retired.iter().copied());
        group.status = GroupStatus::PartiallyActive;

        let group_closed = group.outstanding.is_empty();
        if group_closed {
            self.close_in_flight(notification.step);
        }

        NotificationOutcome::Applied {
            retired,
            position,
            group_closed,
        }
    }

    fn classify_unknown(&self, id: OrderId) -> IgnoreReason {
        if self.retired.contains(&id) {
            IgnoreReason::AlreadyTerminal
        } else {
            IgnoreReason::UnknownOrder
        }
    }

    fn close_in_flight(&mut self, step: usize) {
        if let Some(mut group) = self.in_flight.take() {
            group.status = GroupStatus::Closed;
            group.closed_step = Some(step);
            if let Some(entry) = group.id_of(LegRole::Entry) {
                self.siblings.remove(&entry);
            }
            self.closed.push(group);
        }
    }
}
