// src/motion/stepper.rs - Leader/follower step synchronizer run from the timer context
use super::kinematics::{CoreXy, Envelope, MoveProfile};
use chessbot_shared::{Actuator, GantryState, MotionFault, StepSink};
use std::sync::Arc;

/// Result of one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Stepped,
    Completed,
    Aborted(MotionFault),
}

#[derive(Debug, Clone, Copy)]
struct ActiveMove {
    total_a: u64,
    total_b: u64,
    sent_a: u64,
    sent_b: u64,
    forward_a: bool,
    forward_b: bool,
    leader: Actuator,
    error: u64,
    enforce_bounds: bool,
}

impl ActiveMove {
    fn leader_total(&self) -> u64 {
        self.total_a.max(self.total_b)
    }

    fn follower_total(&self) -> u64 {
        self.total_a.min(self.total_b)
    }

    fn done(&self) -> bool {
        self.sent_a == self.total_a && self.sent_b == self.total_b
    }
}

/// Owns the actuator step counters. Lives on the timer thread and is the only
/// writer of position state.
pub struct StepperSynchronizer {
    kinematics: CoreXy,
    envelope: Envelope,
    state: Arc<GantryState>,
    a: i64,
    b: i64,
    active: Option<ActiveMove>,
}

impl StepperSynchronizer {
    pub fn new(kinematics: CoreXy, envelope: Envelope, state: Arc<GantryState>) -> Self {
        Self {
            kinematics,
            envelope,
            state,
            a: 0,
            b: 0,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn steps(&self) -> (i64, i64) {
        (self.a, self.b)
    }

    /// Load a new motion. Any stale abort request from a previous move is dropped.
    pub fn begin(&mut self, profile: &MoveProfile) {
        self.state.take_abort_request();
        let delta_a = profile.target_steps.0 - self.a;
        let delta_b = profile.target_steps.1 - self.b;
        let mv = ActiveMove {
            total_a: delta_a.unsigned_abs(),
            total_b: delta_b.unsigned_abs(),
            sent_a: 0,
            sent_b: 0,
            forward_a: delta_a >= 0,
            forward_b: delta_b >= 0,
            // A wins ties
            leader: if delta_a.unsigned_abs() >= delta_b.unsigned_abs() {
                Actuator::A
            } else {
                Actuator::B
            },
            error: 0,
            enforce_bounds: profile.enforce_bounds,
        };
        tracing::debug!(
            "Stepper: begin A={} B={} leader={:?} bounds={}",
            delta_a,
            delta_b,
            mv.leader,
            mv.enforce_bounds
        );
        if mv.done() {
            self.active = None;
            self.state.mark_position_reached();
        } else {
            self.active = Some(mv);
        }
    }

    /// Advance one timer period.
    pub fn tick(&mut self, sink: &mut dyn StepSink) -> TickOutcome {
        let Some(mut mv) = self.active else {
            return TickOutcome::Idle;
        };

        if self.state.take_abort_request() {
            return self.abort(Some(MotionFault::LimitTripped));
        }

        let mut error = mv.error + mv.follower_total();
        let follower_steps = error >= mv.leader_total() && mv.follower_total() > 0;
        if follower_steps {
            error -= mv.leader_total();
        }
        let (step_a, step_b) = match mv.leader {
            Actuator::A => (true, follower_steps),
            Actuator::B => (follower_steps, true),
        };
        let step_a = step_a && mv.sent_a < mv.total_a;
        let step_b = step_b && mv.sent_b < mv.total_b;

        let next_a = self.a + step_delta(step_a, mv.forward_a);
        let next_b = self.b + step_delta(step_b, mv.forward_b);
        if mv.enforce_bounds {
            let (x, y) = self.kinematics.to_cartesian(next_a, next_b);
            if !self.envelope.contains(x, y) {
                tracing::warn!("Stepper: next step would reach ({:.2}, {:.2}), aborting", x, y);
                return self.abort(Some(MotionFault::OutOfBounds));
            }
        }

        if step_a {
            sink.step(Actuator::A, mv.forward_a);
            mv.sent_a += 1;
        }
        if step_b {
            sink.step(Actuator::B, mv.forward_b);
            mv.sent_b += 1;
        }
        mv.error = error;
        self.a = next_a;
        self.b = next_b;
        self.publish();

        if mv.done() {
            self.active = None;
            self.state.mark_position_reached();
            TickOutcome::Completed
        } else {
            self.active = Some(mv);
            TickOutcome::Stepped
        }
    }

    /// Cancel the current motion. `None` is a plain stop without a latched fault.
    pub fn abort(&mut self, fault: Option<MotionFault>) -> TickOutcome {
        let was_active = self.active.take().is_some();
        if was_active {
            self.state.mark_aborted(fault);
        }
        match fault {
            Some(fault) if was_active => TickOutcome::Aborted(fault),
            _ => TickOutcome::Idle,
        }
    }

    /// Declare the current carriage position the origin.
    pub fn zero(&mut self) {
        self.active = None;
        self.a = 0;
        self.b = 0;
        self.publish();
        self.state.mark_position_reached();
    }

    fn publish(&self) {
        let (x, y) = self.kinematics.to_cartesian(self.a, self.b);
        self.state.publish_position(self.a, self.b, x, y);
    }
}

fn step_delta(stepping: bool, forward: bool) -> i64 {
    match (stepping, forward) {
        (false, _) => 0,
        (true, true) => 1,
        (true, false) => -1,
    }
}
