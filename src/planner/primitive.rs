// src/planner/primitive.rs - Slot-to-slot piece moves and their motion command sequences
use crate::config::SpeedConfig;
use chessbot_shared::{MotionCommand, Slot};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MoveKind {
    /// A blocker moved out of the way.
    Park,
    /// The transported piece itself.
    Transit,
    /// A parked blocker returned home.
    Restore,
}

/// One piece carried in a straight line, optionally through a dogleg corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrimitiveMove {
    pub from: Slot,
    pub to: Slot,
    pub via: Option<Slot>,
    pub kind: MoveKind,
}

impl fmt::Display for PrimitiveMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.via {
            Some(via) => write!(f, "{:?} {} -> {} -> {}", self.kind, self.from, via, self.to),
            None => write!(f, "{:?} {} -> {}", self.kind, self.from, self.to),
        }
    }
}

/// Motion commands for one primitive move:
/// approach the source empty, pick up, carry (through the corner for a dogleg, with
/// overshoot), settle back to the centre when overshooting, release.
pub fn expand(mv: &PrimitiveMove, speeds: &SpeedConfig) -> Vec<MotionCommand> {
    let (sx, sy) = mv.from.position();
    let (dx, dy) = mv.to.position();
    let mut cmds = vec![
        MotionCommand::new(sx, sy, speeds.travel_mm_s, false),
        MotionCommand::magnet_only(sx, sy, true),
    ];
    if let Some(via) = mv.via {
        let (vx, vy) = via.position();
        cmds.push(MotionCommand::new(vx, vy, speeds.carry_mm_s, true));
    }
    cmds.push(MotionCommand::new(dx, dy, speeds.carry_mm_s, true).with_overshoot(speeds.overshoot_mm));
    if speeds.overshoot_mm > 0.0 {
        cmds.push(MotionCommand::new(dx, dy, speeds.seat_mm_s, true));
    }
    cmds.push(MotionCommand::magnet_only(dx, dy, false));
    cmds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(col: i32, row: i32) -> Slot {
        Slot::new(col, row).unwrap()
    }

    #[test]
    fn test_plain_move_sequence() {
        let mv = PrimitiveMove { from: s(3, 3), to: s(3, 6), via: None, kind: MoveKind::Transit };
        let cmds = expand(&mv, &SpeedConfig::default());
        assert_eq!(cmds.len(), 4);
        assert!(!cmds[0].magnet_on);
        assert_eq!(cmds[0].speed_mm_s, 200.0);
        assert!(cmds[1].magnet_on && cmds[1].speed_mm_s == 0.0);
        assert_eq!((cmds[2].x_mm, cmds[2].y_mm), s(3, 6).position());
        assert_eq!(cmds[2].speed_mm_s, 40.0);
        assert!(!cmds[3].magnet_on);
    }

    #[test]
    fn test_dogleg_and_overshoot() {
        let speeds = SpeedConfig { overshoot_mm: 3.0, ..SpeedConfig::default() };
        let mv = PrimitiveMove { from: s(4, 4), to: s(5, 5), via: Some(s(5, 4)), kind: MoveKind::Park };
        let cmds = expand(&mv, &speeds);
        assert_eq!(cmds.len(), 6);
        assert_eq!((cmds[2].x_mm, cmds[2].y_mm), s(5, 4).position());
        assert_eq!(cmds[3].overshoot_mm, 3.0);
        assert_eq!(cmds[4].speed_mm_s, 10.0);
        assert_eq!(cmds[4].overshoot_mm, 0.0);
        assert_eq!(mv.to_string(), "Park (4,4) -> (5,4) -> (5,5)");
    }
}
