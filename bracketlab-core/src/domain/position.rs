use serde::{Deserialize, Serialize};

/// Position state as seen by the bracket controller.
///
/// Only fills reported through notifications move it: an entry fill opens
/// the position, a stop/target/exit fill returns it to flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionState {
    pub is_flat: bool,
    /// Step index at which the entry leg was reported fully filled.
    pub entry_step: Option<usize>,
}

impl PositionState {
    pub fn flat() -> Self {
        Self {
            is_flat: true,
            entry_step: None,
        }
    }

    pub fn open_at(&mut self, step: usize) {
        self.is_flat = false;
        self.entry_step = Some(step);
    }

    pub fn close(&mut self) {
        self.is_flat = true;
        self.entry_step = None;
    }

    /// Steps elapsed since the entry fill, if in a position.
    pub fn steps_held(&self, step: usize) -> Option<usize> {
        if self.is_flat {
            return None;
        }
        self.entry_step.map(|entry| step.saturating_sub(entry))
    }
}

impl Default for PositionState {
    fn default() -> Self {
        Self::flat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_and_close_round_trip() {
        let mut pos = PositionState::flat();
        assert_eq!(pos.steps_held(5), None);

        pos.open_at(20);
        assert!(!pos.is_flat);
        assert_eq!(pos.steps_held(30), Some(10));

        pos.close();
        assert_eq!(pos, PositionState::flat());
    }
}
