// chessbot_shared: slot model, motion state and hardware traits shared by host and simulator

pub mod gantry_state;
pub mod grid;
pub mod hardware_traits;
pub mod slot;

pub use gantry_state::{Axis, GantrySnapshot, GantryState, MotionFault};
pub use grid::{OccupancyGrid, SlotMap};
pub use hardware_traits::{Actuator, Debounce, MagnetDriver, OccupancySensor, StepSink};
pub use slot::{COLS, ROWS, SLOT_POSITIONS, Slot, SlotError, Zone};

use serde::{Deserialize, Serialize};

/// One primitive gantry motion. Immutable once queued.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionCommand {
    pub x_mm: f64,
    pub y_mm: f64,
    pub speed_mm_s: f64,
    pub overshoot_mm: f64,
    pub magnet_on: bool,
}

impl MotionCommand {
    pub fn new(x_mm: f64, y_mm: f64, speed_mm_s: f64, magnet_on: bool) -> Self {
        Self {
            x_mm,
            y_mm,
            speed_mm_s,
            overshoot_mm: 0.0,
            magnet_on,
        }
    }

    pub fn with_overshoot(mut self, overshoot_mm: f64) -> Self {
        self.overshoot_mm = overshoot_mm;
        self
    }

    /// Zero-length command at `(x, y)` that only switches the magnet.
    pub fn magnet_only(x_mm: f64, y_mm: f64, magnet_on: bool) -> Self {
        Self::new(x_mm, y_mm, 0.0, magnet_on)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FlickeringSensor {
        reads: AtomicU32,
        positive_on: u32,
    }

    #[async_trait]
    impl OccupancySensor for FlickeringSensor {
        async fn read_grid(&self) -> OccupancyGrid {
            let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            let mut grid = OccupancyGrid::empty();
            if n == self.positive_on {
                grid.set(Slot::new(4, 4).unwrap(), true);
            }
            grid
        }

        fn debounce(&self) -> Debounce {
            Debounce { polls: 10, interval: Duration::from_millis(1) }
        }
    }

    #[tokio::test]
    async fn test_debounced_read_returns_on_first_positive() {
        let sensor = FlickeringSensor { reads: AtomicU32::new(0), positive_on: 4 };
        assert!(sensor.is_occupied(Slot::new(4, 4).unwrap()).await);
        assert_eq!(sensor.reads.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_debounced_read_gives_up_after_polls() {
        let sensor = FlickeringSensor { reads: AtomicU32::new(0), positive_on: 0 };
        assert!(!sensor.is_occupied(Slot::new(4, 4).unwrap()).await);
        assert_eq!(sensor.reads.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_magnet_only_command() {
        let cmd = MotionCommand::magnet_only(10.0, 20.0, false);
        assert_eq!(cmd.speed_mm_s, 0.0);
        assert!(!cmd.magnet_on);
        assert_eq!(MotionCommand::new(1.0, 2.0, 40.0, true).with_overshoot(2.0).overshoot_mm, 2.0);
    }
}
