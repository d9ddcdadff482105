// src/planner/resolver.rs - Turns a route into primitive moves around blocking pieces
//
// Works on a private shadow grid that is updated optimistically as moves are planned.
// Parked blockers are tracked on an explicit stack and restored LIFO.

use super::PlanningError;
use super::pathfinder::PathPlan;
use super::primitive::{MoveKind, PrimitiveMove};
use chessbot_shared::{OccupancyGrid, Slot};
use serde::Serialize;

/// Planner-owned copy of the occupancy grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowGrid {
    grid: OccupancyGrid,
}

impl ShadowGrid {
    pub fn new(grid: OccupancyGrid) -> Self {
        Self { grid }
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    /// Move a tracked piece. Never lands two pieces on one slot.
    pub fn relocate(&mut self, from: Slot, to: Slot) -> Result<(), PlanningError> {
        if from == to {
            return Ok(());
        }
        if self.grid.is_occupied(to) {
            return Err(PlanningError::SlotCollision(to));
        }
        self.grid.set(from, false);
        self.grid.set(to, true);
        Ok(())
    }
}

/// A parked blocker and the slot it must go back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestorationJob {
    pub parked: Slot,
    pub home: Slot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPlan {
    pub moves: Vec<PrimitiveMove>,
    pub final_grid: OccupancyGrid,
}

impl ResolvedPlan {
    pub fn count(&self, kind: MoveKind) -> usize {
        self.moves.iter().filter(|m| m.kind == kind).count()
    }
}

#[derive(Debug, Clone)]
pub struct ObstacleResolver {
    park_radius: i32,
}

impl Default for ObstacleResolver {
    fn default() -> Self {
        Self::new(3)
    }
}

impl ObstacleResolver {
    pub fn new(park_radius: i32) -> Self {
        Self { park_radius: park_radius.max(1) }
    }

    /// Plan every primitive move needed to carry the piece on `from` along `plan`.
    pub fn resolve(
        &self,
        from: Slot,
        to: Slot,
        plan: &PathPlan,
        grid: &OccupancyGrid,
    ) -> Result<ResolvedPlan, PlanningError> {
        let mut shadow = ShadowGrid::new(*grid);
        if from == to || plan.waypoints.is_empty() {
            return Ok(ResolvedPlan { moves: Vec::new(), final_grid: *shadow.grid() });
        }
        if grid.is_free(from) {
            return Err(PlanningError::SourceEmpty(from));
        }
        if grid.is_occupied(to) {
            return Err(PlanningError::DestinationOccupied(to));
        }

        let route = &plan.waypoints;
        let mut moves = Vec::new();
        let mut restorations: Vec<RestorationJob> = Vec::new();
        let mut cur = from;
        let mut i = 0;

        while i < route.len() {
            let next = route[i];
            if shadow.grid().is_occupied(next) && next != to {
                let Some(park) = self.find_parking(&shadow, next, &route[i..], cur) else {
                    tracing::error!("No parking slot for blocker at {} (route {} -> {})", next, from, to);
                    return Err(PlanningError::NoParkingSlot { blocker: next });
                };
                tracing::debug!("Parking blocker {} -> {}", next, park);
                moves.push(self.safe_move(&mut shadow, next, park, MoveKind::Park)?);
                restorations.push(RestorationJob { parked: park, home: next });
            }
            let j = self.extend_run(&shadow, cur, route, i);
            let target = route[j];
            moves.push(self.safe_move(&mut shadow, cur, target, MoveKind::Transit)?);
            cur = target;
            i = j + 1;
        }

        while let Some(job) = restorations.pop() {
            moves.push(self.safe_move(&mut shadow, job.parked, job.home, MoveKind::Restore)?);
        }

        Ok(ResolvedPlan { moves, final_grid: *shadow.grid() })
    }

    /// Furthest waypoint reachable from `cur` in one straight move starting with
    /// `route[i]`: same direction, free intermediates, corner-clear diagonals.
    fn extend_run(&self, shadow: &ShadowGrid, cur: Slot, route: &[Slot], i: usize) -> usize {
        let grid = shadow.grid();
        let Some(dir) = cur.line_direction(route[i]) else {
            return i;
        };
        if !grid.diagonal_clear(cur, route[i]) {
            return i;
        }
        let mut j = i;
        while j + 1 < route.len() {
            let (here, there) = (route[j], route[j + 1]);
            if here.line_direction(there) != Some(dir)
                || grid.is_occupied(here)
                || grid.is_occupied(there)
                || !grid.diagonal_clear(here, there)
            {
                break;
            }
            j += 1;
        }
        j
    }

    /// Nearest free slot around `blocker` that is off the remaining route and
    /// reachable in one clear straight move.
    fn find_parking(&self, shadow: &ShadowGrid, blocker: Slot, remaining: &[Slot], cur: Slot) -> Option<Slot> {
        let grid = shadow.grid();
        for radius in 1..=self.park_radius {
            let mut ring: Vec<Slot> = Slot::all().filter(|s| s.ring_distance(blocker) == radius).collect();
            ring.sort_by_key(|s| {
                let dc = s.col() - blocker.col();
                let dr = s.row() - blocker.row();
                (dc * dc + dr * dr, *s)
            });
            let found = ring.into_iter().find(|&c| {
                c != cur && grid.is_free(c) && !remaining.contains(&c) && self.reachable(grid, blocker, c, remaining)
            });
            if found.is_some() {
                return found;
            }
        }
        None
    }

    fn reachable(&self, grid: &OccupancyGrid, from: Slot, to: Slot, remaining: &[Slot]) -> bool {
        let Some((dc, dr)) = from.line_direction(to) else {
            return false;
        };
        if from.ring_distance(to) == 1 {
            // A blocked corner is fine as long as the safe move can dogleg.
            return !from.is_diagonal_neighbor(to) || grid.free_corner(from, to).is_some();
        }
        let mut here = from;
        while here != to {
            let Some(step) = here.offset(dc, dr) else {
                return false;
            };
            if !grid.diagonal_clear(here, step) {
                return false;
            }
            if step != to && (grid.is_occupied(step) || remaining.contains(&step)) {
                return false;
            }
            here = step;
        }
        true
    }

    /// Single-hop diagonals with a blocked corner dogleg through the free corner.
    fn safe_move(
        &self,
        shadow: &mut ShadowGrid,
        from: Slot,
        to: Slot,
        kind: MoveKind,
    ) -> Result<PrimitiveMove, PlanningError> {
        let grid = shadow.grid();
        let via = if from.is_diagonal_neighbor(to) && !grid.diagonal_clear(from, to) {
            let corner = grid.free_corner(from, to);
            if corner.is_none() {
                tracing::warn!("Both corners of {} -> {} blocked, moving diagonally", from, to);
            }
            corner
        } else {
            None
        };
        shadow.relocate(from, to)?;
        Ok(PrimitiveMove { from, to, via, kind })
    }
}
