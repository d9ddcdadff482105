// src/planner/pathfinder.rs - Dijkstra over the 8-connected slot grid
use super::PlanningError;
use chessbot_shared::{OccupancyGrid, Slot, SlotMap};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const NEIGHBOURS: [(i32, i32); 8] = [
    (0, 1),
    (1, 0),
    (0, -1),
    (-1, 0),
    (1, 1),
    (1, -1),
    (-1, -1),
    (-1, 1),
];

/// Edge weights. Orthogonal/diagonal approximate 1 : √2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathCosts {
    pub orthogonal: u32,
    pub diagonal: u32,
    /// Added when entering an occupied cell that is not the destination.
    pub occupied_penalty: u32,
    /// Added for a diagonal hop whose two corner cells are not both free.
    pub corner_penalty: u32,
}

impl Default for PathCosts {
    fn default() -> Self {
        Self {
            orthogonal: 10,
            diagonal: 14,
            occupied_penalty: 500,
            corner_penalty: 1000,
        }
    }
}

/// Ordered waypoints, source excluded and destination included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathPlan {
    pub waypoints: Vec<Slot>,
    pub cost: u32,
}

impl PathPlan {
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SearchNode {
    cost: u32,
    slot: Slot,
}

impl Ord for SearchNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior; slot order breaks ties.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.slot.cmp(&self.slot))
    }
}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pathfinder {
    costs: PathCosts,
}

impl Pathfinder {
    pub fn new(costs: PathCosts) -> Self {
        Self { costs }
    }

    pub fn costs(&self) -> PathCosts {
        self.costs
    }

    fn edge_cost(&self, grid: &OccupancyGrid, from: Slot, to: Slot, destination: Slot) -> u32 {
        let diagonal = from.is_diagonal_neighbor(to);
        let mut cost = if diagonal { self.costs.diagonal } else { self.costs.orthogonal };
        if to != destination && grid.is_occupied(to) {
            cost += self.costs.occupied_penalty;
        }
        if diagonal && !grid.diagonal_clear(from, to) {
            cost += self.costs.corner_penalty;
        }
        cost
    }

    /// Cheapest route from `from` to `to`. The source cell is treated as vacated,
    /// since the piece leaves it.
    pub fn find_path(&self, grid: &OccupancyGrid, from: Slot, to: Slot) -> Result<PathPlan, PlanningError> {
        if from == to {
            return Ok(PathPlan { waypoints: Vec::new(), cost: 0 });
        }
        let mut grid = *grid;
        grid.set(from, false);

        let mut dist: SlotMap<u32> = SlotMap::filled(u32::MAX);
        let mut prev: SlotMap<Option<Slot>> = SlotMap::filled(None);
        let mut closed: SlotMap<bool> = SlotMap::filled(false);
        let mut open = BinaryHeap::new();
        dist[from] = 0;
        open.push(SearchNode { cost: 0, slot: from });

        while let Some(SearchNode { cost, slot }) = open.pop() {
            if closed[slot] {
                continue;
            }
            closed[slot] = true;
            if slot == to {
                let waypoints = reconstruct(&prev, from, to);
                tracing::debug!("Path {} -> {}: {} waypoints, cost {}", from, to, waypoints.len(), cost);
                return Ok(PathPlan { waypoints, cost });
            }
            for (dc, dr) in NEIGHBOURS {
                let Some(next) = slot.offset(dc, dr) else {
                    continue;
                };
                if closed[next] {
                    continue;
                }
                let candidate = cost + self.edge_cost(&grid, slot, next, to);
                if candidate < dist[next] {
                    dist[next] = candidate;
                    prev[next] = Some(slot);
                    open.push(SearchNode { cost: candidate, slot: next });
                }
            }
        }
        tracing::warn!("No path from {} to {}", from, to);
        Err(PlanningError::NoPath { from, to })
    }
}

fn reconstruct(prev: &SlotMap<Option<Slot>>, from: Slot, to: Slot) -> Vec<Slot> {
    let mut waypoints = vec![to];
    let mut cur = to;
    while let Some(p) = prev[cur] {
        if p == from {
            break;
        }
        waypoints.push(p);
        cur = p;
    }
    waypoints.reverse();
    waypoints
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(col: i32, row: i32) -> Slot {
        Slot::new(col, row).unwrap()
    }

    fn octile(a: Slot, b: Slot) -> u32 {
        let dc = (a.col() - b.col()).unsigned_abs();
        let dr = (a.row() - b.row()).unsigned_abs();
        14 * dc.min(dr) + 10 * (dc.max(dr) - dc.min(dr))
    }

    #[test]
    fn test_straight_column_on_empty_grid() {
        let grid = OccupancyGrid::with_occupied([s(3, 3)]);
        let plan = Pathfinder::default().find_path(&grid, s(3, 3), s(3, 6)).unwrap();
        assert_eq!(plan.waypoints, vec![s(3, 4), s(3, 5), s(3, 6)]);
        assert_eq!(plan.cost, 30);
    }

    #[test]
    fn test_empty_grid_cost_is_octile_distance() {
        let finder = Pathfinder::default();
        let grid = OccupancyGrid::empty();
        for from in [s(0, 0), s(5, 3), s(11, 7), s(2, 6)] {
            for to in Slot::all() {
                let plan = finder.find_path(&grid, from, to).unwrap();
                assert_eq!(plan.cost, octile(from, to), "{} -> {}", from, to);
                assert_eq!(plan.waypoints.len() as i32, from.ring_distance(to));
            }
        }
    }

    #[test]
    fn test_same_slot_is_empty_plan() {
        let plan = Pathfinder::default().find_path(&OccupancyGrid::empty(), s(4, 4), s(4, 4)).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.cost, 0);
    }

    #[test]
    fn test_diagonal_with_blocked_corner_is_avoided() {
        let grid = OccupancyGrid::with_occupied([s(4, 4), s(5, 4)]);
        let plan = Pathfinder::default().find_path(&grid, s(4, 4), s(5, 5)).unwrap();
        assert_eq!(plan.waypoints, vec![s(4, 5), s(5, 5)]);
        assert_eq!(plan.cost, 20);
    }

    #[test]
    fn test_occupied_cells_are_routed_around() {
        let grid = OccupancyGrid::with_occupied([s(2, 2), s(2, 3)]);
        let plan = Pathfinder::default().find_path(&grid, s(2, 2), s(2, 5)).unwrap();
        assert!(!plan.waypoints.contains(&s(2, 3)));
        assert!(plan.cost < 500);
        assert_eq!(*plan.waypoints.last().unwrap(), s(2, 5));
    }

    #[test]
    fn test_walled_in_route_pays_penalty_rather_than_failing() {
        // Every neighbour of the source is occupied; the planner still returns a route.
        let mut grid = OccupancyGrid::with_occupied([s(5, 5)]);
        for (dc, dr) in NEIGHBOURS {
            grid.set(s(5 + dc, 5 + dr), true);
        }
        let plan = Pathfinder::default().find_path(&grid, s(5, 5), s(8, 5)).unwrap();
        assert!(plan.cost >= 500);
    }

    #[test]
    fn test_equal_cost_plans_are_reproducible() {
        let finder = Pathfinder::default();
        let grid = OccupancyGrid::with_occupied([s(3, 3), s(6, 4)]);
        let first = finder.find_path(&grid, s(3, 3), s(8, 6)).unwrap();
        for _ in 0..5 {
            assert_eq!(finder.find_path(&grid, s(3, 3), s(8, 6)).unwrap(), first);
        }
    }
}
