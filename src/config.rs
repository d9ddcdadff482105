//! # Gantry Configuration
//!
//! Every table is optional; missing keys fall back to the values of the production
//! machine (20T pulleys, 2 mm belt, 1.8° motors at 16 microsteps). Tables the engine
//! does not know, such as the host binary's `[simulator]`, are ignored here.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [speeds]
//! travel_mm_s = 200.0
//! carry_mm_s = 40.0
//!
//! [envelope]
//! max_x_mm = 410.0
//! max_y_mm = 280.0
//!
//! [planner]
//! park_radius = 2
//! ```

// src/config.rs - Single configuration file
use crate::motion::kinematics::{CoreXy, Envelope};
use crate::planner::PathCosts;
use chessbot_shared::Debounce;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the gantry and planner.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub kinematics: KinematicsConfig,
    #[serde(default)]
    pub envelope: EnvelopeConfig,
    #[serde(default)]
    pub speeds: SpeedConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub homing: HomingConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Belt drive geometry. Both CoreXY motors share it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KinematicsConfig {
    #[serde(default = "default_pulley_teeth")]
    pub pulley_teeth: u32,
    #[serde(default = "default_belt_pitch")]
    pub belt_pitch_mm: f64,
    #[serde(default = "default_step_angle")]
    pub step_angle_deg: f64,
    #[serde(default = "default_microsteps")]
    pub microsteps: u32,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            pulley_teeth: default_pulley_teeth(),
            belt_pitch_mm: default_belt_pitch(),
            step_angle_deg: default_step_angle(),
            microsteps: default_microsteps(),
        }
    }
}

impl KinematicsConfig {
    /// Microsteps per revolution over belt travel per revolution.
    pub fn steps_per_mm(&self) -> f64 {
        let steps_per_rev = 360.0 / self.step_angle_deg * self.microsteps as f64;
        steps_per_rev / (self.pulley_teeth as f64 * self.belt_pitch_mm)
    }

    pub fn corexy(&self) -> CoreXy {
        CoreXy::new(self.steps_per_mm())
    }
}

/// Safe rectangle the carriage may occupy outside of homing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnvelopeConfig {
    #[serde(default)]
    pub min_x_mm: f64,
    #[serde(default = "default_max_x")]
    pub max_x_mm: f64,
    #[serde(default)]
    pub min_y_mm: f64,
    #[serde(default = "default_max_y")]
    pub max_y_mm: f64,
    /// Slack for step quantisation around the edges.
    #[serde(default = "default_envelope_tolerance")]
    pub tolerance_mm: f64,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            min_x_mm: 0.0,
            max_x_mm: default_max_x(),
            min_y_mm: 0.0,
            max_y_mm: default_max_y(),
            tolerance_mm: default_envelope_tolerance(),
        }
    }
}

impl EnvelopeConfig {
    pub fn envelope(&self) -> Envelope {
        Envelope {
            min_x: self.min_x_mm,
            max_x: self.max_x_mm,
            min_y: self.min_y_mm,
            max_y: self.max_y_mm,
            tolerance: self.tolerance_mm,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpeedConfig {
    /// Empty carriage moves (magnet off).
    #[serde(default = "default_travel_speed")]
    pub travel_mm_s: f64,
    /// Dragging a piece (magnet on).
    #[serde(default = "default_carry_speed")]
    pub carry_mm_s: f64,
    /// Final approach back onto a slot centre.
    #[serde(default = "default_seat_speed")]
    pub seat_mm_s: f64,
    #[serde(default = "default_homing_speed")]
    pub homing_mm_s: f64,
    /// Extra carry distance past the destination before settling back.
    #[serde(default)]
    pub overshoot_mm: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            travel_mm_s: default_travel_speed(),
            carry_mm_s: default_carry_speed(),
            seat_mm_s: default_seat_speed(),
            homing_mm_s: default_homing_speed(),
            overshoot_mm: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    /// Longest the step timer thread sleeps between catch-up batches.
    #[serde(default = "default_timer_resolution")]
    pub timer_resolution_us: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_queue_lock_timeout")]
    pub queue_lock_timeout_ms: u64,
    #[serde(default = "default_motion_timeout")]
    pub motion_timeout_s: u64,
    /// Reed switch settle time after the gantry stops.
    #[serde(default = "default_settle")]
    pub settle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            timer_resolution_us: default_timer_resolution(),
            poll_interval_ms: default_poll_interval(),
            queue_capacity: default_queue_capacity(),
            queue_lock_timeout_ms: default_queue_lock_timeout(),
            motion_timeout_s: default_motion_timeout(),
            settle_ms: default_settle(),
        }
    }
}

impl TimingConfig {
    pub fn timer_resolution(&self) -> Duration {
        Duration::from_micros(self.timer_resolution_us)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn queue_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_lock_timeout_ms)
    }

    pub fn motion_timeout(&self) -> Duration {
        Duration::from_secs(self.motion_timeout_s)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HomingConfig {
    /// Distance commanded towards the switches; only has to exceed the travel.
    #[serde(default = "default_homing_travel")]
    pub travel_mm: f64,
    /// Retreat when a switch is already closed before homing starts.
    #[serde(default = "default_back_off")]
    pub back_off_mm: f64,
    /// Retreat after the trip so the origin sits with the switch open.
    #[serde(default = "default_pull_off")]
    pub pull_off_mm: f64,
    #[serde(default = "default_homing_timeout")]
    pub timeout_s: u64,
}

impl Default for HomingConfig {
    fn default() -> Self {
        Self {
            travel_mm: default_homing_travel(),
            back_off_mm: default_back_off(),
            pull_off_mm: default_pull_off(),
            timeout_s: default_homing_timeout(),
        }
    }
}

impl HomingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_s)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlannerConfig {
    #[serde(default = "default_orthogonal_cost")]
    pub orthogonal_cost: u32,
    #[serde(default = "default_diagonal_cost")]
    pub diagonal_cost: u32,
    #[serde(default = "default_occupied_penalty")]
    pub occupied_penalty: u32,
    #[serde(default = "default_corner_penalty")]
    pub corner_penalty: u32,
    /// Largest ring searched for a parking slot around a blocker.
    #[serde(default = "default_park_radius")]
    pub park_radius: i32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            orthogonal_cost: default_orthogonal_cost(),
            diagonal_cost: default_diagonal_cost(),
            occupied_penalty: default_occupied_penalty(),
            corner_penalty: default_corner_penalty(),
            park_radius: default_park_radius(),
        }
    }
}

impl PlannerConfig {
    pub fn costs(&self) -> PathCosts {
        PathCosts {
            orthogonal: self.orthogonal_cost,
            diagonal: self.diagonal_cost,
            occupied_penalty: self.occupied_penalty,
            corner_penalty: self.corner_penalty,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerifyConfig {
    /// Radius of the correction ring around a slot centre.
    #[serde(default = "default_correction_offset")]
    pub correction_offset_mm: f64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            correction_offset_mm: default_correction_offset(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SensorConfig {
    #[serde(default = "default_debounce_polls")]
    pub debounce_polls: u32,
    #[serde(default = "default_debounce_interval")]
    pub debounce_interval_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            debounce_polls: default_debounce_polls(),
            debounce_interval_ms: default_debounce_interval(),
        }
    }
}

impl SensorConfig {
    pub fn debounce(&self) -> Debounce {
        Debounce {
            polls: self.debounce_polls,
            interval: Duration::from_millis(self.debounce_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_pulley_teeth() -> u32 { 20 }
fn default_belt_pitch() -> f64 { 2.0 }
fn default_step_angle() -> f64 { 1.8 }
fn default_microsteps() -> u32 { 16 }
fn default_max_x() -> f64 { 412.0 }
fn default_max_y() -> f64 { 288.0 }
fn default_envelope_tolerance() -> f64 { 0.5 }
fn default_travel_speed() -> f64 { 200.0 }
fn default_carry_speed() -> f64 { 40.0 }
fn default_seat_speed() -> f64 { 10.0 }
fn default_homing_speed() -> f64 { 30.0 }
fn default_timer_resolution() -> u64 { 250 }
fn default_poll_interval() -> u64 { 2 }
fn default_queue_capacity() -> usize { 16 }
fn default_queue_lock_timeout() -> u64 { 50 }
fn default_motion_timeout() -> u64 { 30 }
fn default_settle() -> u64 { 200 }
fn default_homing_travel() -> f64 { 1000.0 }
fn default_back_off() -> f64 { 10.0 }
fn default_pull_off() -> f64 { 1.0 }
fn default_homing_timeout() -> u64 { 30 }
fn default_orthogonal_cost() -> u32 { 10 }
fn default_diagonal_cost() -> u32 { 14 }
fn default_occupied_penalty() -> u32 { 500 }
fn default_corner_penalty() -> u32 { 1000 }
fn default_park_radius() -> i32 { 3 }
fn default_correction_offset() -> f64 { 5.0 }
fn default_debounce_polls() -> u32 { 10 }
fn default_debounce_interval() -> u64 { 10 }
fn default_log_level() -> String { "info".to_string() }

impl Config {
    /// Reject values that would make the machine misbehave rather than fail loudly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let k = &self.kinematics;
        if k.pulley_teeth == 0 || k.microsteps == 0 || k.belt_pitch_mm <= 0.0 || k.step_angle_deg <= 0.0 {
            return Err(ConfigError::Invalid("kinematics values must be positive".into()));
        }
        let e = &self.envelope;
        if e.min_x_mm >= e.max_x_mm || e.min_y_mm >= e.max_y_mm {
            return Err(ConfigError::Invalid(format!(
                "empty envelope x=[{}, {}] y=[{}, {}]",
                e.min_x_mm, e.max_x_mm, e.min_y_mm, e.max_y_mm
            )));
        }
        if e.tolerance_mm < 0.0 {
            return Err(ConfigError::Invalid("envelope tolerance must not be negative".into()));
        }
        let s = &self.speeds;
        for (name, value) in [
            ("travel_mm_s", s.travel_mm_s),
            ("carry_mm_s", s.carry_mm_s),
            ("seat_mm_s", s.seat_mm_s),
            ("homing_mm_s", s.homing_mm_s),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::Invalid(format!("speeds.{} must be positive, got {}", name, value)));
            }
        }
        if s.overshoot_mm < 0.0 {
            return Err(ConfigError::Invalid("speeds.overshoot_mm must not be negative".into()));
        }
        if self.timing.queue_capacity == 0 {
            return Err(ConfigError::Invalid("timing.queue_capacity must be at least 1".into()));
        }
        if self.timing.poll_interval_ms == 0 || self.timing.timer_resolution_us == 0 {
            return Err(ConfigError::Invalid("timing intervals must be non-zero".into()));
        }
        if self.homing.travel_mm <= 0.0 || self.homing.back_off_mm < 0.0 || self.homing.pull_off_mm < 0.0 {
            return Err(ConfigError::Invalid("homing distances out of range".into()));
        }
        if self.planner.park_radius < 1 {
            return Err(ConfigError::Invalid("planner.park_radius must be at least 1".into()));
        }
        if self.planner.orthogonal_cost == 0 || self.planner.diagonal_cost == 0 {
            return Err(ConfigError::Invalid("planner step costs must be non-zero".into()));
        }
        if self.sensor.debounce_polls == 0 {
            return Err(ConfigError::Invalid("sensor.debounce_polls must be at least 1".into()));
        }
        Ok(())
    }
}

/// Load and validate a TOML config file.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let config: Config = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

/// Parse a TOML file into any config shape. Callers that embed [`Config`] still
/// need to run [`Config::validate`].
pub fn load_toml<T: DeserializeOwned>(path: &str) -> Result<T, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            return Err(ConfigError::Io(e));
        }
    };
    toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.kinematics.steps_per_mm(), 80.0);
        assert_eq!(config.speeds.travel_mm_s, 200.0);
        assert_eq!(config.speeds.carry_mm_s, 40.0);
        assert_eq!(config.speeds.seat_mm_s, 10.0);
        assert_eq!(config.timing.queue_capacity, 16);
        assert_eq!(config.timing.queue_lock_timeout_ms, 50);
        assert_eq!(config.homing.back_off_mm, 10.0);
        assert_eq!(config.planner.costs().corner_penalty, 1000);
        assert_eq!(config.sensor.debounce(), Debounce::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("chessbot.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "[speeds]\ncarry_mm_s = 60.0\n\n[envelope]\nmax_x_mm = 410.0").unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.speeds.carry_mm_s, 60.0);
        assert_eq!(config.envelope.max_x_mm, 410.0);
        // Defaults for missing fields
        assert_eq!(config.speeds.travel_mm_s, 200.0);
        assert_eq!(config.envelope.max_y_mm, 288.0);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "[speeds\ncarry_mm_s = ").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("invalid.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "[speeds]\ncarry_mm_s = -5.0").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_host_only_tables_are_ignored() {
        let config: Config =
            toml::from_str("[speeds]\nseat_mm_s = 12.0\n\n[simulator]\npieces = [[3, 3]]").unwrap();
        assert_eq!(config.speeds.seat_mm_s, 12.0);
        assert!(config.validate().is_ok());
    }
}
