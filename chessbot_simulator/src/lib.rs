//! Chessbot simulator: a stand-in for the gantry, magnet and reed-switch hardware.
//!
//! [`SimBoard`] hands out the three hardware seams the host expects (step sink, magnet
//! driver, occupancy sensor) all acting on one simulated world, plus fault-injection
//! hooks used by tests.

pub mod mechanics;
pub mod world;

use chessbot_shared::{
    Debounce, GantryState, MagnetDriver, OccupancyGrid, OccupancySensor, Slot, StepSink,
};
use mechanics::{Mechanics, SimStepSink};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use world::{PiecePhysics, SimMagnet, SimSensor, World, lock_world};

/// Simulator tuning, usually the `[simulator]` table of the host config.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimConfig {
    /// Mechanical carriage position at power-on (unknown to the host until homed).
    #[serde(default)]
    pub start_x_mm: f64,
    #[serde(default)]
    pub start_y_mm: f64,
    #[serde(default = "default_true")]
    pub limits_enabled: bool,
    /// Switch position on both axes; sits just outside the slot envelope.
    #[serde(default = "default_limit_trigger")]
    pub limit_trigger_mm: f64,
    #[serde(default = "default_limit_hysteresis")]
    pub limit_hysteresis_mm: f64,
    #[serde(default = "default_pull_radius")]
    pub pull_radius_mm: f64,
    #[serde(default = "default_seat_tolerance")]
    pub seat_tolerance_mm: f64,
    #[serde(default)]
    pub misseat_probability: f64,
    #[serde(default = "default_misseat")]
    pub misseat_mm: f64,
    /// Slots holding a piece at start-up, as `[col, row]` pairs.
    #[serde(default)]
    pub pieces: Vec<Slot>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start_x_mm: 0.0,
            start_y_mm: 0.0,
            limits_enabled: true,
            limit_trigger_mm: default_limit_trigger(),
            limit_hysteresis_mm: default_limit_hysteresis(),
            pull_radius_mm: default_pull_radius(),
            seat_tolerance_mm: default_seat_tolerance(),
            misseat_probability: 0.0,
            misseat_mm: default_misseat(),
            pieces: Vec::new(),
        }
    }
}

fn default_true() -> bool { true }
fn default_limit_trigger() -> f64 { -1.0 }
fn default_limit_hysteresis() -> f64 { 0.5 }
fn default_pull_radius() -> f64 { 6.0 }
fn default_seat_tolerance() -> f64 { 3.0 }
fn default_misseat() -> f64 { 8.0 }

/// Simulated chess gantry.
pub struct SimBoard {
    config: SimConfig,
    state: Arc<GantryState>,
    mechanics: Arc<Mechanics>,
    world: Arc<Mutex<World>>,
}

impl SimBoard {
    pub fn new(config: SimConfig, steps_per_mm: f64, state: Arc<GantryState>) -> Self {
        let mechanics = Arc::new(Mechanics::new(steps_per_mm, config.start_x_mm, config.start_y_mm));
        let mut world = World::new(PiecePhysics {
            pull_radius_mm: config.pull_radius_mm,
            seat_tolerance_mm: config.seat_tolerance_mm,
            misseat_probability: config.misseat_probability,
            misseat_mm: config.misseat_mm,
        });
        for slot in &config.pieces {
            world.place(*slot);
        }
        tracing::info!(
            "Simulator ready: {} pieces, carriage at ({:.1}, {:.1}) mm",
            config.pieces.len(),
            config.start_x_mm,
            config.start_y_mm
        );
        Self {
            config,
            state,
            mechanics,
            world: Arc::new(Mutex::new(world)),
        }
    }

    pub fn step_sink(&self) -> Box<dyn StepSink> {
        Box::new(SimStepSink::new(
            self.mechanics.clone(),
            self.state.clone(),
            self.config.limits_enabled,
            self.config.limit_trigger_mm,
            self.config.limit_hysteresis_mm,
        ))
    }

    pub fn magnet(&self) -> Arc<dyn MagnetDriver> {
        Arc::new(SimMagnet {
            world: self.world.clone(),
            mechanics: self.mechanics.clone(),
        })
    }

    pub fn sensor(&self, debounce: Debounce) -> Arc<dyn OccupancySensor> {
        Arc::new(SimSensor {
            world: self.world.clone(),
            mechanics: self.mechanics.clone(),
            debounce,
        })
    }

    pub fn place_piece(&self, slot: Slot) {
        lock_world(&self.world).place(slot);
    }

    /// Drop a loose piece at an arbitrary position (e.g. knocked off its slot).
    pub fn place_piece_at(&self, x_mm: f64, y_mm: f64) {
        lock_world(&self.world).place_at(x_mm, y_mm);
    }

    pub fn pin_piece(&self, slot: Slot) -> bool {
        lock_world(&self.world).pin(slot)
    }

    /// Offset the next magnet release by `(dx, dy)` mm.
    pub fn inject_misseat(&self, dx_mm: f64, dy_mm: f64) {
        lock_world(&self.world).inject_misseat(dx_mm, dy_mm);
    }

    /// Force the sensor reading of one slot, or restore it with `None`.
    pub fn force_reading(&self, slot: Slot, reading: Option<bool>) {
        lock_world(&self.world).force_reading(slot, reading);
    }

    pub fn occupancy(&self) -> OccupancyGrid {
        let head = self.mechanics.head_position();
        lock_world(&self.world).true_occupancy(head)
    }

    pub fn head_position(&self) -> (f64, f64) {
        self.mechanics.head_position()
    }

    pub fn magnet_activations(&self) -> u64 {
        lock_world(&self.world).magnet_activations()
    }

    pub fn magnet_on(&self) -> bool {
        lock_world(&self.world).magnet_on()
    }

    pub fn step_pulses(&self) -> u64 {
        self.mechanics.pulses()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_empty_toml() {
        let config: SimConfig = toml::from_str("").unwrap();
        assert!(config.limits_enabled);
        assert_eq!(config.pull_radius_mm, 6.0);
        assert!(config.pieces.is_empty());
    }

    #[test]
    fn test_config_pieces_parse_as_pairs() {
        let config: SimConfig = toml::from_str("pieces = [[3, 3], [10, 0]]").unwrap();
        assert_eq!(config.pieces, vec![Slot::new(3, 3).unwrap(), Slot::new(10, 0).unwrap()]);
        assert!(toml::from_str::<SimConfig>("pieces = [[12, 0]]").is_err());
    }

    #[tokio::test]
    async fn test_board_hands_out_consistent_seams() {
        let state = Arc::new(GantryState::new());
        let config = SimConfig {
            pieces: vec![Slot::new(2, 0).unwrap()],
            ..SimConfig::default()
        };
        let board = SimBoard::new(config, 80.0, state);
        let sensor = board.sensor(Debounce::default());
        assert!(sensor.read_grid().await.is_occupied(Slot::new(2, 0).unwrap()));

        board.force_reading(Slot::new(2, 0).unwrap(), Some(false));
        assert!(sensor.read_grid().await.is_free(Slot::new(2, 0).unwrap()));
        assert!(board.occupancy().is_occupied(Slot::new(2, 0).unwrap()));

        board.magnet().set_magnet(true);
        assert!(board.magnet_on());
        assert_eq!(board.magnet_activations(), 1);
    }
}
