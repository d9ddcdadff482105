// src/planner/mod.rs - Grid routing, obstacle resolution and primitive expansion

pub mod pathfinder;
pub mod primitive;
pub mod resolver;

pub use pathfinder::{PathCosts, PathPlan, Pathfinder};
pub use primitive::{MoveKind, PrimitiveMove, expand};
pub use resolver::{ObstacleResolver, ResolvedPlan, ShadowGrid};

use chessbot_shared::Slot;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanningError {
    #[error("no path from {from} to {to}")]
    NoPath { from: Slot, to: Slot },
    #[error("no parking slot around blocker at {blocker}")]
    NoParkingSlot { blocker: Slot },
    #[error("source slot {0} is empty")]
    SourceEmpty(Slot),
    #[error("destination slot {0} is occupied")]
    DestinationOccupied(Slot),
    #[error("cannot move a piece onto occupied slot {0}")]
    SlotCollision(Slot),
}
