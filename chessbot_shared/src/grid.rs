// chessbot_shared/src/grid.rs - Fixed-size slot arenas and the occupancy grid
use crate::slot::{COLS, ROWS, Slot, Zone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Dense per-slot storage indexed by validated [`Slot`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMap<T> {
    cells: [[T; ROWS]; COLS],
}

impl<T: Copy> SlotMap<T> {
    pub fn filled(value: T) -> Self {
        Self { cells: [[value; ROWS]; COLS] }
    }
}

impl<T> Index<Slot> for SlotMap<T> {
    type Output = T;

    fn index(&self, slot: Slot) -> &T {
        &self.cells[slot.col() as usize][slot.row() as usize]
    }
}

impl<T> IndexMut<Slot> for SlotMap<T> {
    fn index_mut(&mut self, slot: Slot) -> &mut T {
        &mut self.cells[slot.col() as usize][slot.row() as usize]
    }
}

/// 12x8 "is a piece physically here" matrix as reported by the reed switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyGrid {
    cells: SlotMap<bool>,
}

impl Default for OccupancyGrid {
    fn default() -> Self {
        Self::empty()
    }
}

impl OccupancyGrid {
    pub fn empty() -> Self {
        Self { cells: SlotMap::filled(false) }
    }

    /// Grid with exactly the given slots occupied.
    pub fn with_occupied<I: IntoIterator<Item = Slot>>(slots: I) -> Self {
        let mut grid = Self::empty();
        for slot in slots {
            grid.set(slot, true);
        }
        grid
    }

    pub fn is_occupied(&self, slot: Slot) -> bool {
        self.cells[slot]
    }

    pub fn is_free(&self, slot: Slot) -> bool {
        !self.cells[slot]
    }

    pub fn set(&mut self, slot: Slot, occupied: bool) {
        self.cells[slot] = occupied;
    }

    /// Corner-clearance: a diagonal hop is unobstructed only when both cells sharing the
    /// diagonal are free. Orthogonal hops are always clear.
    pub fn diagonal_clear(&self, from: Slot, to: Slot) -> bool {
        match from.diagonal_corners(to) {
            Some((c1, c2)) => self.is_free(c1) && self.is_free(c2),
            None => true,
        }
    }

    /// First free corner of a diagonal hop, `(to.col, from.row)` preferred.
    pub fn free_corner(&self, from: Slot, to: Slot) -> Option<Slot> {
        let (c1, c2) = from.diagonal_corners(to)?;
        [c1, c2].into_iter().find(|c| self.is_free(*c))
    }

    pub fn occupied_slots(&self) -> impl Iterator<Item = Slot> + '_ {
        Slot::all().filter(|s| self.is_occupied(*s))
    }

    pub fn count(&self) -> usize {
        self.occupied_slots().count()
    }

    /// Next free capture slot of `zone` in fill order.
    pub fn first_free_in(&self, zone: Zone) -> Option<Slot> {
        zone.capture_slots().find(|s| self.is_free(*s))
    }
}

impl fmt::Display for OccupancyGrid {
    /// Row 7 at the top, `#` occupied, `.` free.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in (0..ROWS as i32).rev() {
            for col in 0..COLS as i32 {
                let occupied = Slot::new(col, row).map(|s| self.is_occupied(s)).unwrap_or(false);
                write!(f, "{}", if occupied { '#' } else { '.' })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
