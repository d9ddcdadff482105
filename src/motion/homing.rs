// src/motion/homing.rs - Limit-switch homing, X then Y
use super::controller::{MotionController, MotionError};
use crate::config::HomingConfig;
use chessbot_shared::Axis;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HomingError {
    #[error("{axis:?} limit switch did not trigger in time")]
    Timeout { axis: Axis },
    #[error("{axis:?} limit switch still closed after backing off")]
    SwitchStuck { axis: Axis },
    #[error(transparent)]
    Motion(#[from] MotionError),
}

pub struct HomingController {
    controller: Arc<MotionController>,
    config: HomingConfig,
    speed_mm_s: f64,
}

impl HomingController {
    pub fn new(controller: Arc<MotionController>, config: HomingConfig, speed_mm_s: f64) -> Self {
        Self { controller, config, speed_mm_s }
    }

    /// Find both switches and make the pulled-off position the origin.
    pub async fn home(&self) -> Result<(), HomingError> {
        let state = self.controller.state().clone();
        tracing::info!("Homing started");
        state.set_homed(false);
        self.controller.stop()?;
        self.controller.wait_idle(self.config.timeout()).await?;
        state.clear_fault();

        for axis in [Axis::X, Axis::Y] {
            if state.limit_pressed(axis) {
                tracing::info!("{:?} switch already closed, backing off {} mm", axis, self.config.back_off_mm);
                self.relative_move(axis, self.config.back_off_mm).await?;
                if state.limit_pressed(axis) {
                    return Err(HomingError::SwitchStuck { axis });
                }
            }
        }

        for axis in [Axis::X, Axis::Y] {
            self.seek_switch(axis).await?;
            state.clear_fault();
            self.relative_move(axis, self.config.pull_off_mm).await?;
        }

        self.controller.zero().await?;
        state.clear_fault();
        state.clear_limit_latch(Axis::X);
        state.clear_limit_latch(Axis::Y);
        state.set_homed(true);
        tracing::info!("Homing complete");
        Ok(())
    }

    async fn seek_switch(&self, axis: Axis) -> Result<(), HomingError> {
        let state = self.controller.state();
        state.clear_limit_latch(axis);
        state.clear_fault();
        let (x, y) = state.position();
        let (tx, ty) = match axis {
            Axis::X => (x - self.config.travel_mm, y),
            Axis::Y => (x, y - self.config.travel_mm),
        };
        self.controller.move_unbounded(tx, ty, self.speed_mm_s)?;

        let deadline = Instant::now() + self.config.timeout();
        loop {
            // The latch is set before the timer aborts, so read the motion flag first.
            let stopped = !state.motion_active();
            if state.limit_latched(axis) {
                break;
            }
            if stopped || Instant::now() >= deadline {
                tracing::error!("Homing {:?}: limit switch not reached", axis);
                self.controller.stop()?;
                self.controller.wait_idle(Duration::from_secs(1)).await?;
                return Err(HomingError::Timeout { axis });
            }
            tokio::time::sleep(self.controller.poll_interval()).await;
        }
        self.controller.wait_idle(self.config.timeout()).await?;
        tracing::debug!("Homing {:?}: switch tripped at {:?}", axis, state.position());
        Ok(())
    }

    async fn relative_move(&self, axis: Axis, distance: f64) -> Result<(), HomingError> {
        let state = self.controller.state();
        let (x, y) = state.position();
        let (tx, ty) = match axis {
            Axis::X => (x + distance, y),
            Axis::Y => (x, y + distance),
        };
        self.controller.move_unbounded(tx, ty, self.speed_mm_s)?;
        self.controller.wait_idle(self.config.timeout()).await?;
        Ok(())
    }
}
