// chessbot_shared/src/slot.rs - Physical slot grid and the fixed coordinate table
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of slot columns (two capture columns on each side of the 8x8 board).
pub const COLS: usize = 12;
/// Number of slot rows.
pub const ROWS: usize = 8;

/// Column centre X positions in mm. The capture columns sit outside the board frame,
/// hence the wider gaps at 1→2 and 9→10.
const COL_X_MM: [f64; COLS] = [
    0.0, 30.0, 75.09, 112.09, 149.09, 186.09, 223.09, 260.09, 297.09, 334.09, 379.18, 409.18,
];
const ROW_Y0_MM: f64 = 24.0;
const ROW_PITCH_MM: f64 = 37.0;

const fn build_slot_table() -> [[(f64, f64); ROWS]; COLS] {
    let mut table = [[(0.0, 0.0); ROWS]; COLS];
    let mut col = 0;
    while col < COLS {
        let mut row = 0;
        while row < ROWS {
            table[col][row] = (COL_X_MM[col], ROW_Y0_MM + ROW_PITCH_MM * row as f64);
            row += 1;
        }
        col += 1;
    }
    table
}

/// Centre of every slot in gantry coordinates, indexed `[col][row]`.
pub const SLOT_POSITIONS: [[(f64, f64); ROWS]; COLS] = build_slot_table();

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("slot ({col}, {row}) is outside the 12x8 grid")]
    OutOfRange { col: i32, row: i32 },
    #[error("cannot parse slot from '{0}', expected 'col,row'")]
    Parse(String),
}

/// Which part of the physical grid a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    /// Columns 0-1, where captured opponent-colour pieces are stored.
    OpponentCapture,
    /// Columns 2-9, the playable board.
    Board,
    /// Columns 10-11, where captured ally-colour pieces are stored.
    AllyCapture,
}

impl Zone {
    fn base_col(self) -> Option<u8> {
        match self {
            Zone::OpponentCapture => Some(0),
            Zone::AllyCapture => Some(10),
            Zone::Board => None,
        }
    }

    /// Capture zone slots in fill order: index `i` lands on row `i / 2`, column `base + i % 2`.
    /// Empty for the board zone.
    pub fn capture_slots(self) -> impl Iterator<Item = Slot> {
        let base = self.base_col();
        (0..(2 * ROWS) as u8).filter_map(move |i| {
            let base = base?;
            Some(Slot { col: base + i % 2, row: i / 2 })
        })
    }
}

/// A validated cell of the 12x8 physical grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "(i32, i32)", into = "(i32, i32)")]
pub struct Slot {
    col: u8,
    row: u8,
}

impl Slot {
    pub fn new(col: i32, row: i32) -> Result<Self, SlotError> {
        if (0..COLS as i32).contains(&col) && (0..ROWS as i32).contains(&row) {
            Ok(Self { col: col as u8, row: row as u8 })
        } else {
            Err(SlotError::OutOfRange { col, row })
        }
    }

    pub fn col(self) -> i32 {
        self.col as i32
    }

    pub fn row(self) -> i32 {
        self.row as i32
    }

    pub fn zone(self) -> Zone {
        match self.col {
            0..=1 => Zone::OpponentCapture,
            10..=11 => Zone::AllyCapture,
            _ => Zone::Board,
        }
    }

    /// Physical centre `(x_mm, y_mm)` from the constant table.
    pub fn position(self) -> (f64, f64) {
        SLOT_POSITIONS[self.col as usize][self.row as usize]
    }

    /// Neighbouring slot, or `None` when the offset leaves the grid.
    pub fn offset(self, dcol: i32, drow: i32) -> Option<Slot> {
        Slot::new(self.col() + dcol, self.row() + drow).ok()
    }

    /// Chebyshev (king-move) distance.
    pub fn ring_distance(self, other: Slot) -> i32 {
        (self.col() - other.col()).abs().max((self.row() - other.row()).abs())
    }

    /// True when the two slots touch diagonally.
    pub fn is_diagonal_neighbor(self, other: Slot) -> bool {
        (self.col() - other.col()).abs() == 1 && (self.row() - other.row()).abs() == 1
    }

    /// The two orthogonal cells sharing a diagonal hop, `(to.col, from.row)` first.
    pub fn diagonal_corners(self, other: Slot) -> Option<(Slot, Slot)> {
        if !self.is_diagonal_neighbor(other) {
            return None;
        }
        Some((
            Slot { col: other.col, row: self.row },
            Slot { col: self.col, row: other.row },
        ))
    }

    /// Unit direction `(dcol, drow)` of a straight (orthogonal or 45°) line to `other`,
    /// or `None` when the slots are not collinear along one of the eight directions.
    pub fn line_direction(self, other: Slot) -> Option<(i32, i32)> {
        let dc = other.col() - self.col();
        let dr = other.row() - self.row();
        if (dc, dr) == (0, 0) {
            return None;
        }
        if dc == 0 || dr == 0 || dc.abs() == dr.abs() {
            Some((dc.signum(), dr.signum()))
        } else {
            None
        }
    }

    /// Every slot, column-major.
    pub fn all() -> impl Iterator<Item = Slot> {
        (0..COLS as u8).flat_map(|col| (0..ROWS as u8).map(move |row| Slot { col, row }))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.col, self.row)
    }
}

impl TryFrom<(i32, i32)> for Slot {
    type Error = SlotError;

    fn try_from((col, row): (i32, i32)) -> Result<Self, Self::Error> {
        Slot::new(col, row)
    }
}

impl From<Slot> for (i32, i32) {
    fn from(slot: Slot) -> Self {
        (slot.col(), slot.row())
    }
}

impl std::str::FromStr for Slot {
    type Err = SlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (col, row) = s
            .trim()
            .split_once(',')
            .ok_or_else(|| SlotError::Parse(s.to_string()))?;
        let col = col.trim().parse::<i32>().map_err(|_| SlotError::Parse(s.to_string()))?;
        let row = row.trim().parse::<i32>().map_err(|_| SlotError::Parse(s.to_string()))?;
        Slot::new(col, row)
    }
}
