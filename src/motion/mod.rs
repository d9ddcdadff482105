// src/motion/mod.rs - Gantry motion: kinematics, step timer, queue, dispatch and homing

pub mod controller;
pub mod homing;
pub mod kinematics;
pub mod queue;
pub mod stepper;
pub mod timer;

pub use controller::{MotionController, MotionError};
pub use homing::{HomingController, HomingError};
pub use kinematics::{CoreXy, Envelope, MoveProfile, StepPeriodError};
pub use queue::{MotionQueue, QueueError, QueueStats};
