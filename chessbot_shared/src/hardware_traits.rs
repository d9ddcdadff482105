// Trait-based interfaces for the gantry hardware (shared by host and simulator)

use crate::grid::OccupancyGrid;
use crate::slot::Slot;
use async_trait::async_trait;
use std::time::Duration;

/// One of the two CoreXY belt motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actuator {
    A,
    B,
}

/// Step pulse output, driven from the timer context only.
///
/// Implementations must not block: they are called once per step at up to tens of kHz.
pub trait StepSink: Send {
    fn step(&mut self, actuator: Actuator, forward: bool);
}

/// Electromagnet driver on the carriage.
pub trait MagnetDriver: Send + Sync {
    fn set_magnet(&self, on: bool);
}

/// Debounce policy for single-slot reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Debounce {
    pub polls: u32,
    pub interval: Duration,
}

impl Default for Debounce {
    fn default() -> Self {
        Self {
            polls: 10,
            interval: Duration::from_millis(10),
        }
    }
}

/// Reed-switch occupancy sensor (polled, never pushed).
#[async_trait]
pub trait OccupancySensor: Send + Sync {
    /// One full scan of the 12x8 matrix.
    async fn read_grid(&self) -> OccupancyGrid;

    fn debounce(&self) -> Debounce {
        Debounce::default()
    }

    /// Debounced single-slot read: re-scans up to `debounce().polls` times and reports
    /// occupied on the first positive reading.
    async fn is_occupied(&self, slot: Slot) -> bool {
        let debounce = self.debounce();
        for attempt in 0..debounce.polls.max(1) {
            if self.read_grid().await.is_occupied(slot) {
                return true;
            }
            if attempt + 1 < debounce.polls {
                tokio::time::sleep(debounce.interval).await;
            }
        }
        false
    }
}
