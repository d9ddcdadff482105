//! Simulated belt mechanics and limit switches.
//!
//! The step sink runs inside the host's timer thread, so everything here is atomics only.

use chessbot_shared::{Actuator, Axis, GantryState, StepSink};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// True carriage position expressed as physical motor steps.
#[derive(Debug)]
pub struct Mechanics {
    a: AtomicI64,
    b: AtomicI64,
    pulses: AtomicU64,
    steps_per_mm: f64,
}

impl Mechanics {
    pub fn new(steps_per_mm: f64, x_mm: f64, y_mm: f64) -> Self {
        Self {
            a: AtomicI64::new(((x_mm + y_mm) * steps_per_mm).round() as i64),
            b: AtomicI64::new(((x_mm - y_mm) * steps_per_mm).round() as i64),
            pulses: AtomicU64::new(0),
            steps_per_mm,
        }
    }

    /// Carriage position in mm, from the physical step counts.
    pub fn head_position(&self) -> (f64, f64) {
        let a = self.a.load(Ordering::Acquire) as f64;
        let b = self.b.load(Ordering::Acquire) as f64;
        let k = 2.0 * self.steps_per_mm;
        ((a + b) / k, (a - b) / k)
    }

    /// Total step pulses received since start-up.
    pub fn pulses(&self) -> u64 {
        self.pulses.load(Ordering::Acquire)
    }

    fn apply(&self, actuator: Actuator, forward: bool) {
        let delta = if forward { 1 } else { -1 };
        match actuator {
            Actuator::A => self.a.fetch_add(delta, Ordering::AcqRel),
            Actuator::B => self.b.fetch_add(delta, Ordering::AcqRel),
        };
        self.pulses.fetch_add(1, Ordering::AcqRel);
    }
}

/// Switch closes at `pos <= trigger` and re-opens only past the hysteresis band.
#[derive(Debug, Clone, Copy)]
struct SwitchModel {
    pressed: bool,
}

impl SwitchModel {
    /// Returns true on the open→closed edge.
    fn update(&mut self, pos: f64, trigger: f64, hysteresis: f64) -> bool {
        if !self.pressed && pos <= trigger {
            self.pressed = true;
            return true;
        }
        if self.pressed && pos > trigger + hysteresis {
            self.pressed = false;
        }
        false
    }
}

/// Step sink wired to the simulated mechanics; fires limit-switch edges like the real
/// GPIO interrupt would.
pub struct SimStepSink {
    mechanics: Arc<Mechanics>,
    state: Arc<GantryState>,
    limits_enabled: bool,
    trigger_mm: f64,
    hysteresis_mm: f64,
    x_switch: SwitchModel,
    y_switch: SwitchModel,
}

impl SimStepSink {
    pub fn new(
        mechanics: Arc<Mechanics>,
        state: Arc<GantryState>,
        limits_enabled: bool,
        trigger_mm: f64,
        hysteresis_mm: f64,
    ) -> Self {
        let (x, y) = mechanics.head_position();
        let x_switch = SwitchModel { pressed: limits_enabled && x <= trigger_mm };
        let y_switch = SwitchModel { pressed: limits_enabled && y <= trigger_mm };
        state.set_limit_pressed(Axis::X, x_switch.pressed);
        state.set_limit_pressed(Axis::Y, y_switch.pressed);
        Self {
            mechanics,
            state,
            limits_enabled,
            trigger_mm,
            hysteresis_mm,
            x_switch,
            y_switch,
        }
    }
}

impl StepSink for SimStepSink {
    fn step(&mut self, actuator: Actuator, forward: bool) {
        self.mechanics.apply(actuator, forward);
        if !self.limits_enabled {
            return;
        }
        let (x, y) = self.mechanics.head_position();
        for (axis, switch, pos) in [
            (Axis::X, &mut self.x_switch, x),
            (Axis::Y, &mut self.y_switch, y),
        ] {
            if switch.update(pos, self.trigger_mm, self.hysteresis_mm) {
                self.state.limit_triggered(axis);
            }
            self.state.set_limit_pressed(axis, switch.pressed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corexy_head_position() {
        let mech = Mechanics::new(80.0, 100.0, 50.0);
        let (x, y) = mech.head_position();
        assert!((x - 100.0).abs() < 1e-9);
        assert!((y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_limit_edge_fires_once_with_hysteresis() {
        let mech = Arc::new(Mechanics::new(80.0, -0.95, 50.0));
        let state = Arc::new(GantryState::new());
        let mut sink = SimStepSink::new(mech.clone(), state.clone(), true, -1.0, 0.5);
        assert!(!state.limit_pressed(Axis::X));

        // Moving -X in CoreXY: A and B both decrease.
        for _ in 0..4 {
            sink.step(Actuator::A, false);
            sink.step(Actuator::B, false);
        }
        assert!(state.limit_pressed(Axis::X));
        assert!(state.limit_latched(Axis::X));
        assert!(state.take_abort_request());

        // Jitter inside the hysteresis band does not produce a new edge.
        state.clear_limit_latch(Axis::X);
        sink.step(Actuator::A, true);
        sink.step(Actuator::A, false);
        assert!(!state.limit_latched(Axis::X));
        assert!(state.limit_pressed(Axis::X));
    }

    #[test]
    fn test_switch_pressed_at_power_on() {
        let mech = Arc::new(Mechanics::new(80.0, 30.0, -2.0));
        let state = Arc::new(GantryState::new());
        let _sink = SimStepSink::new(mech, state.clone(), true, -1.0, 0.5);
        assert!(!state.limit_pressed(Axis::X));
        assert!(state.limit_pressed(Axis::Y));
        assert!(!state.limit_latched(Axis::Y));
    }

    #[test]
    fn test_disabled_limits_never_fire() {
        let mech = Arc::new(Mechanics::new(80.0, 0.0, 0.0));
        let state = Arc::new(GantryState::new());
        let mut sink = SimStepSink::new(mech.clone(), state.clone(), false, -1.0, 0.5);
        for _ in 0..100 {
            sink.step(Actuator::A, false);
        }
        assert!(!state.limit_latched(Axis::X));
        assert!(!state.limit_latched(Axis::Y));
        assert_eq!(mech.pulses(), 100);
    }
}
