// src/motion/kinematics.rs - CoreXY transform, safe envelope and step profiles
use std::time::Duration;
use thiserror::Error;

/// The requested speed gives a step period no `Duration` can hold.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("no representable step period at {speed_mm_s} mm/s")]
pub struct StepPeriodError {
    pub speed_mm_s: f64,
}

/// CoreXY belt kinematics: `A = (x + y)·k`, `B = (x − y)·k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoreXy {
    steps_per_mm: f64,
}

impl CoreXy {
    pub fn new(steps_per_mm: f64) -> Self {
        Self { steps_per_mm }
    }

    pub fn steps_per_mm(&self) -> f64 {
        self.steps_per_mm
    }

    /// Cartesian mm to actuator steps, rounded to the nearest step.
    pub fn to_steps(&self, x: f64, y: f64) -> (i64, i64) {
        (
            ((x + y) * self.steps_per_mm).round() as i64,
            ((x - y) * self.steps_per_mm).round() as i64,
        )
    }

    pub fn to_cartesian(&self, a: i64, b: i64) -> (f64, f64) {
        let k = 2.0 * self.steps_per_mm;
        ((a + b) as f64 / k, (a - b) as f64 / k)
    }

    /// Build the step profile from `from` (actuator steps) to `target` (mm).
    ///
    /// Returns `Ok(None)` when the target rounds onto the current step position.
    pub fn profile(
        &self,
        from: (i64, i64),
        target: (f64, f64),
        speed_mm_s: f64,
        enforce_bounds: bool,
    ) -> Result<Option<MoveProfile>, StepPeriodError> {
        let target_steps = self.to_steps(target.0, target.1);
        let delta_a = target_steps.0 - from.0;
        let delta_b = target_steps.1 - from.1;
        let leader_steps = delta_a.unsigned_abs().max(delta_b.unsigned_abs());
        if leader_steps == 0 {
            return Ok(None);
        }
        let (fx, fy) = self.to_cartesian(from.0, from.1);
        let distance = (target.0 - fx).hypot(target.1 - fy);
        let duration = distance / speed_mm_s.max(f64::MIN_POSITIVE);
        let step_period = Duration::try_from_secs_f64((duration / leader_steps as f64).max(0.0))
            .map_err(|_| StepPeriodError { speed_mm_s })?;
        Ok(Some(MoveProfile {
            target_steps,
            target_mm: target,
            step_period,
            enforce_bounds,
        }))
    }
}

/// Point `overshoot` mm beyond `to` along the `from → to` direction.
pub fn apply_overshoot(from: (f64, f64), to: (f64, f64), overshoot: f64) -> (f64, f64) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let len = dx.hypot(dy);
    if overshoot <= 0.0 || len < f64::EPSILON {
        return to;
    }
    (to.0 + dx / len * overshoot, to.1 + dy / len * overshoot)
}

/// Safe rectangle for the carriage, with slack for step quantisation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub tolerance: f64,
}

impl Envelope {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x - self.tolerance
            && x <= self.max_x + self.tolerance
            && y >= self.min_y - self.tolerance
            && y <= self.max_y + self.tolerance
    }
}

/// Everything the step timer needs to run one motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveProfile {
    pub target_steps: (i64, i64),
    pub target_mm: (f64, f64),
    /// Time between leader steps.
    pub step_period: Duration,
    /// Homing moves run with the envelope check disabled.
    pub enforce_bounds: bool,
}
