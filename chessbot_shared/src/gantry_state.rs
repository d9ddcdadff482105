//! Lock-free motion state shared between the step timer and task-level code.
//!
//! The timer context is the only writer of positions, step counters, `motion_active`
//! completion and faults. Task code reads them and writes single-bit intents (start
//! flags, abort requests, latch clears).

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU64, Ordering};

/// Atomic wrapper for f64 values (bit reinterpretation through `AtomicU64`).
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(val: f64) -> Self {
        Self(AtomicU64::new(val.to_bits()))
    }

    pub fn load(&self, order: Ordering) -> f64 {
        f64::from_bits(self.0.load(order))
    }

    pub fn store(&self, val: f64, order: Ordering) {
        self.0.store(val.to_bits(), order);
    }
}

/// Cartesian gantry axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Axis {
    X,
    Y,
}

/// Why the last motion was cut short. Latched until re-homing clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MotionFault {
    /// The next step would have left the safe envelope.
    OutOfBounds,
    /// A limit switch fired during motion.
    LimitTripped,
    /// A queued command was refused by the controller.
    CommandRejected,
    /// Operator-requested stop.
    EmergencyStop,
}

impl MotionFault {
    fn to_code(self) -> u8 {
        match self {
            MotionFault::OutOfBounds => 1,
            MotionFault::LimitTripped => 2,
            MotionFault::CommandRejected => 3,
            MotionFault::EmergencyStop => 4,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(MotionFault::OutOfBounds),
            2 => Some(MotionFault::LimitTripped),
            3 => Some(MotionFault::CommandRejected),
            4 => Some(MotionFault::EmergencyStop),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct LimitSwitch {
    pressed: AtomicBool,
    latched: AtomicBool,
}

/// Point-in-time copy of the gantry state, for logging and status output.
#[derive(Debug, Clone, Serialize)]
pub struct GantrySnapshot {
    pub x: f64,
    pub y: f64,
    pub target_x: f64,
    pub target_y: f64,
    pub a_steps: i64,
    pub b_steps: i64,
    pub motion_active: bool,
    pub position_reached: bool,
    pub homed: bool,
    pub fault: Option<MotionFault>,
}

#[derive(Debug)]
pub struct GantryState {
    x: AtomicF64,
    y: AtomicF64,
    target_x: AtomicF64,
    target_y: AtomicF64,
    a_steps: AtomicI64,
    b_steps: AtomicI64,
    motion_active: AtomicBool,
    position_reached: AtomicBool,
    abort_requested: AtomicBool,
    homed: AtomicBool,
    fault: AtomicU8,
    limit_x: LimitSwitch,
    limit_y: LimitSwitch,
}

impl Default for GantryState {
    fn default() -> Self {
        Self::new()
    }
}

impl GantryState {
    /// Idle at the origin with `position_reached` raised, matching power-on.
    pub fn new() -> Self {
        Self {
            x: AtomicF64::new(0.0),
            y: AtomicF64::new(0.0),
            target_x: AtomicF64::new(0.0),
            target_y: AtomicF64::new(0.0),
            a_steps: AtomicI64::new(0),
            b_steps: AtomicI64::new(0),
            motion_active: AtomicBool::new(false),
            position_reached: AtomicBool::new(true),
            abort_requested: AtomicBool::new(false),
            homed: AtomicBool::new(false),
            fault: AtomicU8::new(0),
            limit_x: LimitSwitch::default(),
            limit_y: LimitSwitch::default(),
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x.load(Ordering::Acquire), self.y.load(Ordering::Acquire))
    }

    pub fn target(&self) -> (f64, f64) {
        (self.target_x.load(Ordering::Acquire), self.target_y.load(Ordering::Acquire))
    }

    pub fn steps(&self) -> (i64, i64) {
        (self.a_steps.load(Ordering::Acquire), self.b_steps.load(Ordering::Acquire))
    }

    pub fn motion_active(&self) -> bool {
        self.motion_active.load(Ordering::Acquire)
    }

    /// The planner's only wake condition: raised exclusively by move completion.
    pub fn position_reached(&self) -> bool {
        self.position_reached.load(Ordering::Acquire)
    }

    pub fn homed(&self) -> bool {
        self.homed.load(Ordering::Acquire)
    }

    pub fn fault(&self) -> Option<MotionFault> {
        MotionFault::from_code(self.fault.load(Ordering::Acquire))
    }

    /// Publish the step counters and the Cartesian position derived from them.
    pub fn publish_position(&self, a: i64, b: i64, x: f64, y: f64) {
        self.a_steps.store(a, Ordering::Release);
        self.b_steps.store(b, Ordering::Release);
        self.x.store(x, Ordering::Release);
        self.y.store(y, Ordering::Release);
    }

    /// Task-side intent: a motion towards `(x, y)` is about to be handed to the timer.
    pub fn mark_motion_started(&self, target_x: f64, target_y: f64) {
        self.target_x.store(target_x, Ordering::Release);
        self.target_y.store(target_y, Ordering::Release);
        self.position_reached.store(false, Ordering::Release);
        self.motion_active.store(true, Ordering::Release);
    }

    /// Timer-side completion.
    pub fn mark_position_reached(&self) {
        self.motion_active.store(false, Ordering::Release);
        self.position_reached.store(true, Ordering::Release);
    }

    /// Timer-side abort. `position_reached` is deliberately left lowered.
    pub fn mark_aborted(&self, fault: Option<MotionFault>) {
        if let Some(fault) = fault {
            self.fault.store(fault.to_code(), Ordering::Release);
        }
        self.motion_active.store(false, Ordering::Release);
    }

    pub fn raise_fault(&self, fault: MotionFault) {
        self.fault.store(fault.to_code(), Ordering::Release);
    }

    pub fn clear_fault(&self) {
        self.fault.store(0, Ordering::Release);
    }

    pub fn set_homed(&self, homed: bool) {
        self.homed.store(homed, Ordering::Release);
    }

    /// Consume a pending abort request (timer side).
    pub fn take_abort_request(&self) -> bool {
        self.abort_requested.swap(false, Ordering::AcqRel)
    }

    fn switch(&self, axis: Axis) -> &LimitSwitch {
        match axis {
            Axis::X => &self.limit_x,
            Axis::Y => &self.limit_y,
        }
    }

    /// Limit-switch edge handler. Latches the one-shot flag and requests an abort of
    /// whatever motion is in flight.
    pub fn limit_triggered(&self, axis: Axis) {
        self.switch(axis).latched.store(true, Ordering::Release);
        self.abort_requested.store(true, Ordering::Release);
    }

    /// Current (level) reading of a limit switch.
    pub fn set_limit_pressed(&self, axis: Axis, pressed: bool) {
        self.switch(axis).pressed.store(pressed, Ordering::Release);
    }

    pub fn limit_pressed(&self, axis: Axis) -> bool {
        self.switch(axis).pressed.load(Ordering::Acquire)
    }

    pub fn limit_latched(&self, axis: Axis) -> bool {
        self.switch(axis).latched.load(Ordering::Acquire)
    }

    pub fn clear_limit_latch(&self, axis: Axis) {
        self.switch(axis).latched.store(false, Ordering::Release);
    }

    pub fn snapshot(&self) -> GantrySnapshot {
        let (x, y) = self.position();
        let (target_x, target_y) = self.target();
        let (a_steps, b_steps) = self.steps();
        GantrySnapshot {
            x,
            y,
            target_x,
            target_y,
            a_steps,
            b_steps,
            motion_active: self.motion_active(),
            position_reached: self.position_reached(),
            homed: self.homed(),
            fault: self.fault(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_on_state_is_idle() {
        let state = GantryState::new();
        assert!(state.position_reached());
        assert!(!state.motion_active());
        assert_eq!(state.fault(), None);
        assert_eq!(state.position(), (0.0, 0.0));
    }

    #[test]
    fn test_start_complete_handshake() {
        let state = GantryState::new();
        state.mark_motion_started(10.0, 20.0);
        assert!(state.motion_active());
        assert!(!state.position_reached());
        assert_eq!(state.target(), (10.0, 20.0));
        state.mark_position_reached();
        assert!(!state.motion_active());
        assert!(state.position_reached());
    }

    #[test]
    fn test_abort_keeps_position_reached_low() {
        let state = GantryState::new();
        state.mark_motion_started(10.0, 20.0);
        state.mark_aborted(Some(MotionFault::OutOfBounds));
        assert!(!state.motion_active());
        assert!(!state.position_reached());
        assert_eq!(state.fault(), Some(MotionFault::OutOfBounds));
        state.clear_fault();
        assert_eq!(state.fault(), None);
    }

    #[test]
    fn test_limit_trigger_latches_and_requests_abort() {
        let state = GantryState::new();
        state.limit_triggered(Axis::Y);
        assert!(state.limit_latched(Axis::Y));
        assert!(!state.limit_latched(Axis::X));
        assert!(state.take_abort_request());
        assert!(!state.take_abort_request());
        state.clear_limit_latch(Axis::Y);
        assert!(!state.limit_latched(Axis::Y));
    }
}
