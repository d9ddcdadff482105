// tests/common/mod.rs - Engine + simulator rig shared by the integration tests
#![allow(dead_code)]

use chessbot::{Config, Hardware, Slot, TransportEngine};
use chessbot_shared::GantryState;
use chessbot_simulator::{SimBoard, SimConfig};
use std::sync::Arc;

pub fn s(col: i32, row: i32) -> Slot {
    Slot::new(col, row).unwrap()
}

/// Defaults with fast motion and short waits so scenarios finish quickly.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.speeds.travel_mm_s = 2000.0;
    config.speeds.carry_mm_s = 1000.0;
    config.speeds.seat_mm_s = 500.0;
    config.speeds.homing_mm_s = 1000.0;
    config.timing.poll_interval_ms = 1;
    config.timing.settle_ms = 5;
    config.timing.motion_timeout_s = 10;
    config.timing.timer_resolution_us = 100;
    config.sensor.debounce_polls = 3;
    config.sensor.debounce_interval_ms = 1;
    config.homing.timeout_s = 10;
    config
}

pub struct Rig {
    pub engine: TransportEngine,
    pub board: SimBoard,
    pub state: Arc<GantryState>,
}

pub fn rig(config: Config, sim: SimConfig) -> Rig {
    let state = Arc::new(GantryState::new());
    let board = SimBoard::new(sim, config.kinematics.steps_per_mm(), state.clone());
    let engine = TransportEngine::new(
        &config,
        Hardware {
            state: state.clone(),
            step_sink: board.step_sink(),
            magnet: board.magnet(),
            sensor: board.sensor(config.sensor.debounce()),
        },
    )
    .unwrap();
    Rig { engine, board, state }
}

/// Simulator with pieces on the given slots and the carriage at the origin.
pub fn sim_with_pieces(pieces: &[(i32, i32)]) -> SimConfig {
    SimConfig {
        pieces: pieces.iter().map(|&(c, r)| s(c, r)).collect(),
        ..SimConfig::default()
    }
}

pub fn rig_with_pieces(pieces: &[(i32, i32)]) -> Rig {
    rig(fast_config(), sim_with_pieces(pieces))
}
