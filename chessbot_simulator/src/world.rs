//! Piece physics under the electromagnet and the simulated reed-switch matrix.

use crate::mechanics::Mechanics;
use async_trait::async_trait;
use chessbot_shared::{Debounce, MagnetDriver, OccupancyGrid, OccupancySensor, Slot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy)]
struct Piece {
    x: f64,
    y: f64,
    pinned: bool,
}

/// Physical tuning of the simulated pieces.
#[derive(Debug, Clone, Copy)]
pub struct PiecePhysics {
    pub pull_radius_mm: f64,
    pub seat_tolerance_mm: f64,
    pub misseat_probability: f64,
    pub misseat_mm: f64,
}

#[derive(Debug)]
pub struct World {
    pieces: Vec<Piece>,
    attached: Option<usize>,
    magnet_on: bool,
    pending_misseat: Option<(f64, f64)>,
    forced_readings: HashMap<Slot, bool>,
    magnet_activations: u64,
    physics: PiecePhysics,
}

impl World {
    pub fn new(physics: PiecePhysics) -> Self {
        Self {
            pieces: Vec::new(),
            attached: None,
            magnet_on: false,
            pending_misseat: None,
            forced_readings: HashMap::new(),
            magnet_activations: 0,
            physics,
        }
    }

    pub fn place(&mut self, slot: Slot) {
        let (x, y) = slot.position();
        self.pieces.push(Piece { x, y, pinned: false });
    }

    pub fn place_at(&mut self, x: f64, y: f64) {
        self.pieces.push(Piece { x, y, pinned: false });
    }

    /// Pin the piece seated on `slot` so the magnet can no longer lift it.
    pub fn pin(&mut self, slot: Slot) -> bool {
        let (sx, sy) = slot.position();
        let tolerance = self.physics.seat_tolerance_mm;
        match self
            .pieces
            .iter_mut()
            .find(|p| distance(p.x, p.y, sx, sy) <= tolerance)
        {
            Some(piece) => {
                piece.pinned = true;
                true
            }
            None => false,
        }
    }

    pub fn inject_misseat(&mut self, dx: f64, dy: f64) {
        self.pending_misseat = Some((dx, dy));
    }

    pub fn force_reading(&mut self, slot: Slot, reading: Option<bool>) {
        match reading {
            Some(value) => {
                self.forced_readings.insert(slot, value);
            }
            None => {
                self.forced_readings.remove(&slot);
            }
        }
    }

    pub fn magnet_activations(&self) -> u64 {
        self.magnet_activations
    }

    pub fn magnet_on(&self) -> bool {
        self.magnet_on
    }

    fn piece_position(&self, idx: usize, head: (f64, f64)) -> (f64, f64) {
        if self.attached == Some(idx) {
            head
        } else {
            (self.pieces[idx].x, self.pieces[idx].y)
        }
    }

    fn set_magnet(&mut self, on: bool, head: (f64, f64)) {
        if on == self.magnet_on {
            return;
        }
        self.magnet_on = on;
        if on {
            self.magnet_activations += 1;
            let pull = self.physics.pull_radius_mm;
            let nearest = self
                .pieces
                .iter()
                .enumerate()
                .map(|(i, p)| (i, distance(p.x, p.y, head.0, head.1)))
                .filter(|(_, d)| *d <= pull)
                .min_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((idx, _)) = nearest {
                if self.pieces[idx].pinned {
                    tracing::debug!("sim: piece under magnet is pinned, not lifting");
                } else {
                    self.attached = Some(idx);
                }
            }
        } else if let Some(idx) = self.attached.take() {
            let (dx, dy) = self.release_offset();
            self.pieces[idx].x = head.0 + dx;
            self.pieces[idx].y = head.1 + dy;
            tracing::trace!(
                "sim: dropped piece at ({:.2}, {:.2})",
                self.pieces[idx].x,
                self.pieces[idx].y
            );
        }
    }

    fn release_offset(&mut self) -> (f64, f64) {
        if let Some(offset) = self.pending_misseat.take() {
            return offset;
        }
        if self.physics.misseat_probability > 0.0
            && rand::random::<f64>() < self.physics.misseat_probability
        {
            let angle = rand::random::<f64>() * std::f64::consts::TAU;
            return (
                angle.cos() * self.physics.misseat_mm,
                angle.sin() * self.physics.misseat_mm,
            );
        }
        (0.0, 0.0)
    }

    /// What the reed switches physically see, before forced readings are applied.
    pub fn true_occupancy(&self, head: (f64, f64)) -> OccupancyGrid {
        let mut grid = OccupancyGrid::empty();
        let tolerance = self.physics.seat_tolerance_mm;
        for idx in 0..self.pieces.len() {
            let (px, py) = self.piece_position(idx, head);
            if let Some(slot) = Slot::all().find(|s| {
                let (sx, sy) = s.position();
                distance(px, py, sx, sy) <= tolerance
            }) {
                grid.set(slot, true);
            }
        }
        grid
    }

    fn sensed_occupancy(&self, head: (f64, f64)) -> OccupancyGrid {
        let mut grid = self.true_occupancy(head);
        for (slot, value) in &self.forced_readings {
            grid.set(*slot, *value);
        }
        grid
    }
}

fn distance(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    ((x1 - x2).powi(2) + (y1 - y2).powi(2)).sqrt()
}

pub(crate) fn lock_world(world: &Mutex<World>) -> MutexGuard<'_, World> {
    match world.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Magnet driver acting on the simulated world.
pub struct SimMagnet {
    pub(crate) world: Arc<Mutex<World>>,
    pub(crate) mechanics: Arc<Mechanics>,
}

impl MagnetDriver for SimMagnet {
    fn set_magnet(&self, on: bool) {
        let head = self.mechanics.head_position();
        lock_world(&self.world).set_magnet(on, head);
    }
}

/// Reed-switch matrix over the simulated world.
pub struct SimSensor {
    pub(crate) world: Arc<Mutex<World>>,
    pub(crate) mechanics: Arc<Mechanics>,
    pub(crate) debounce: Debounce,
}

#[async_trait]
impl OccupancySensor for SimSensor {
    async fn read_grid(&self) -> OccupancyGrid {
        let head = self.mechanics.head_position();
        lock_world(&self.world).sensed_occupancy(head)
    }

    fn debounce(&self) -> Debounce {
        self.debounce
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn physics() -> PiecePhysics {
        PiecePhysics {
            pull_radius_mm: 6.0,
            seat_tolerance_mm: 3.0,
            misseat_probability: 0.0,
            misseat_mm: 8.0,
        }
    }

    fn s(col: i32, row: i32) -> Slot {
        Slot::new(col, row).unwrap()
    }

    #[test]
    fn test_carry_piece_between_slots() {
        let mut world = World::new(physics());
        world.place(s(3, 3));
        world.set_magnet(true, s(3, 3).position());
        world.set_magnet(false, s(3, 6).position());
        let grid = world.true_occupancy(s(3, 6).position());
        assert!(grid.is_occupied(s(3, 6)));
        assert!(grid.is_free(s(3, 3)));
        assert_eq!(world.magnet_activations(), 1);
    }

    #[test]
    fn test_carried_piece_is_not_seated_midway() {
        let mut world = World::new(physics());
        world.place(s(3, 3));
        world.set_magnet(true, s(3, 3).position());
        let (x, y) = s(3, 3).position();
        let grid = world.true_occupancy((x, y + 18.0));
        assert_eq!(grid.count(), 0);
    }

    #[test]
    fn test_misseat_leaves_destination_empty() {
        let mut world = World::new(physics());
        world.place(s(3, 3));
        world.inject_misseat(9.0, 0.0);
        world.set_magnet(true, s(3, 3).position());
        world.set_magnet(false, s(3, 6).position());
        assert_eq!(world.true_occupancy((0.0, 0.0)).count(), 0);
    }

    #[test]
    fn test_random_misseat_with_certain_probability() {
        let mut world = World::new(PiecePhysics { misseat_probability: 1.0, ..physics() });
        world.place(s(5, 5));
        world.set_magnet(true, s(5, 5).position());
        world.set_magnet(false, s(5, 2).position());
        assert!(world.true_occupancy((0.0, 0.0)).is_free(s(5, 2)));
    }

    #[test]
    fn test_pinned_piece_stays() {
        let mut world = World::new(physics());
        world.place(s(4, 4));
        assert!(world.pin(s(4, 4)));
        world.set_magnet(true, s(4, 4).position());
        world.set_magnet(false, s(4, 6).position());
        assert!(world.true_occupancy((0.0, 0.0)).is_occupied(s(4, 4)));
    }

    #[test]
    fn test_forced_reading_overrides_truth() {
        let mut world = World::new(physics());
        world.place(s(4, 4));
        world.force_reading(s(4, 4), Some(false));
        assert!(world.sensed_occupancy((0.0, 0.0)).is_free(s(4, 4)));
        world.force_reading(s(4, 4), None);
        assert!(world.sensed_occupancy((0.0, 0.0)).is_occupied(s(4, 4)));
    }
}
