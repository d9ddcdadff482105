//! Physical move transport engine for a CoreXY chess gantry.
//!
//! Turns "move the piece on slot S to slot D" into verified physical motion: a
//! Dijkstra route over the sensed occupancy grid, blocker parking and LIFO
//! restoration on a shadow grid, leader/follower stepping from a dedicated timer
//! thread, and reed-switch verification with magnet re-seat correction.

pub mod config;
pub mod motion;
pub mod planner;
pub mod transport;
pub mod verify;

pub use chessbot_shared::{MotionCommand, OccupancyGrid, Slot, Zone};
pub use config::{Config, ConfigError, load_config};
pub use transport::{Hardware, MoveRequest, TransportEngine, TransportError};
pub use verify::VerifyResult;
