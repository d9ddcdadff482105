// src/motion/controller.rs - Command validation, dispatch loop and motion handshakes
use super::kinematics::{CoreXy, Envelope, MoveProfile, apply_overshoot};
use super::queue::{MotionQueue, QueueError, QueueStats};
use super::stepper::StepperSynchronizer;
use super::timer::{StepTimer, TimerCommand};
use crate::config::Config;
use chessbot_shared::{GantryState, MagnetDriver, MotionCommand, MotionFault, StepSink};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("target ({x:.2}, {y:.2}) mm is outside the safe envelope")]
    OutOfBounds { x: f64, y: f64 },
    #[error("invalid speed {0} mm/s")]
    InvalidSpeed(f64),
    #[error("a motion is already in progress")]
    Busy,
    #[error("motion fault latched: {0:?}")]
    Faulted(MotionFault),
    #[error("timed out after {0:?} waiting for motion to finish")]
    Timeout(Duration),
    #[error("motion queue: {0}")]
    Queue(#[from] QueueError),
    #[error("step timer is not running")]
    TimerUnavailable,
    #[error("failed to start step timer: {0}")]
    Spawn(#[from] std::io::Error),
}

pub struct MotionController {
    kinematics: CoreXy,
    envelope: Envelope,
    state: Arc<GantryState>,
    magnet: Arc<dyn MagnetDriver>,
    queue: MotionQueue,
    timer: StepTimer,
    poll_interval: Duration,
    motion_timeout: Duration,
}

impl MotionController {
    pub fn new(
        config: &Config,
        sink: Box<dyn StepSink>,
        magnet: Arc<dyn MagnetDriver>,
        state: Arc<GantryState>,
    ) -> Result<Arc<Self>, MotionError> {
        let kinematics = config.kinematics.corexy();
        let envelope = config.envelope.envelope();
        let sync = StepperSynchronizer::new(kinematics, envelope, state.clone());
        let timer = StepTimer::spawn(sync, sink, config.timing.timer_resolution())?;
        tracing::info!(
            "Motion controller: {:.1} steps/mm, envelope x=[{}, {}] y=[{}, {}]",
            kinematics.steps_per_mm(),
            envelope.min_x,
            envelope.max_x,
            envelope.min_y,
            envelope.max_y
        );
        Ok(Arc::new(Self {
            kinematics,
            envelope,
            state,
            magnet,
            queue: MotionQueue::new(config.timing.queue_capacity, config.timing.queue_lock_timeout()),
            timer,
            poll_interval: config.timing.poll_interval(),
            motion_timeout: config.timing.motion_timeout(),
        }))
    }

    pub fn state(&self) -> &Arc<GantryState> {
        &self.state
    }

    pub fn envelope(&self) -> Envelope {
        self.envelope
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn motion_timeout(&self) -> Duration {
        self.motion_timeout
    }

    /// Start the low-priority dispatch loop. It stops once the controller is dropped.
    pub fn spawn_dispatcher(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.poll_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                controller.dispatch_once().await;
            }
            tracing::debug!("Motion dispatcher stopped");
        })
    }

    /// Hand the next queued command to the timer when the gantry is idle.
    /// Nothing is dispatched while a fault is latched.
    pub async fn dispatch_once(&self) -> bool {
        if self.state.fault().is_some() || self.state.motion_active() {
            return false;
        }
        let cmd = match self.queue.pop().await {
            Ok(Some(cmd)) => cmd,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!("Dispatcher: {}", e);
                return false;
            }
        };
        match self.move_to(&cmd) {
            Ok(()) => {}
            // Gantry taken or faulted since the check above: the command is not at fault.
            Err(e @ (MotionError::Busy | MotionError::Faulted(_))) => {
                tracing::debug!("Dispatcher: {}, command to ({:.2}, {:.2}) put back", e, cmd.x_mm, cmd.y_mm);
                match self.queue.requeue(cmd).await {
                    Ok(()) => return false,
                    Err(e) => {
                        tracing::error!("Dispatcher: command to ({:.2}, {:.2}) lost: {}", cmd.x_mm, cmd.y_mm, e);
                        self.state.raise_fault(MotionFault::CommandRejected);
                    }
                }
            }
            Err(e) => {
                tracing::error!("Dispatcher: command to ({:.2}, {:.2}) rejected: {}", cmd.x_mm, cmd.y_mm, e);
                self.state.raise_fault(MotionFault::CommandRejected);
            }
        }
        self.queue.mark_dispatched();
        true
    }

    /// Validate and start one command immediately.
    ///
    /// A command whose target rounds onto the current step position only switches
    /// the magnet.
    pub fn move_to(&self, cmd: &MotionCommand) -> Result<(), MotionError> {
        if let Some(fault) = self.state.fault() {
            return Err(MotionError::Faulted(fault));
        }
        if self.state.motion_active() {
            return Err(MotionError::Busy);
        }
        let from_steps = self.state.steps();
        if self.kinematics.to_steps(cmd.x_mm, cmd.y_mm) == from_steps {
            self.magnet.set_magnet(cmd.magnet_on);
            return Ok(());
        }
        if cmd.speed_mm_s <= 0.0 || !cmd.speed_mm_s.is_finite() {
            return Err(MotionError::InvalidSpeed(cmd.speed_mm_s));
        }
        if !self.envelope.contains(cmd.x_mm, cmd.y_mm) {
            return Err(MotionError::OutOfBounds { x: cmd.x_mm, y: cmd.y_mm });
        }
        let (x, y) = apply_overshoot(self.state.position(), (cmd.x_mm, cmd.y_mm), cmd.overshoot_mm);
        if !self.envelope.contains(x, y) {
            return Err(MotionError::OutOfBounds { x, y });
        }
        let profile = self.profile(from_steps, (x, y), cmd.speed_mm_s, true)?;
        self.magnet.set_magnet(cmd.magnet_on);
        self.start(profile, cmd.speed_mm_s)
    }

    /// Homing-only motion: bounds checking off, faults ignored.
    pub(crate) fn move_unbounded(&self, x: f64, y: f64, speed_mm_s: f64) -> Result<(), MotionError> {
        if self.state.motion_active() {
            return Err(MotionError::Busy);
        }
        if speed_mm_s <= 0.0 || !speed_mm_s.is_finite() {
            return Err(MotionError::InvalidSpeed(speed_mm_s));
        }
        let profile = self.profile(self.state.steps(), (x, y), speed_mm_s, false)?;
        self.start(profile, speed_mm_s)
    }

    fn profile(
        &self,
        from_steps: (i64, i64),
        target: (f64, f64),
        speed: f64,
        bounded: bool,
    ) -> Result<Option<MoveProfile>, MotionError> {
        self.kinematics
            .profile(from_steps, target, speed, bounded)
            .map_err(|e| MotionError::InvalidSpeed(e.speed_mm_s))
    }

    fn start(&self, profile: Option<MoveProfile>, speed: f64) -> Result<(), MotionError> {
        let Some(profile) = profile else {
            return Ok(());
        };
        let target = profile.target_mm;
        tracing::debug!(
            "Motion: to ({:.2}, {:.2}) at {:.1} mm/s, step period {:?}",
            target.0,
            target.1,
            speed,
            profile.step_period
        );
        self.state.mark_motion_started(target.0, target.1);
        if !self.timer.send(TimerCommand::Start(profile)) {
            self.state.mark_aborted(None);
            return Err(MotionError::TimerUnavailable);
        }
        Ok(())
    }

    /// Queue a command, retrying while the queue applies backpressure.
    pub async fn enqueue(&self, cmd: MotionCommand) -> Result<(), MotionError> {
        let deadline = Instant::now() + self.motion_timeout;
        loop {
            if let Some(fault) = self.state.fault() {
                return Err(MotionError::Faulted(fault));
            }
            match self.queue.push(cmd).await {
                Ok(()) => return Ok(()),
                Err(QueueError::Full) if Instant::now() < deadline => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(QueueError::Full) => return Err(MotionError::Timeout(self.motion_timeout)),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Wait until every queued command has run and the last one reached its target.
    pub async fn wait_until_drained(&self, timeout: Duration) -> Result<(), MotionError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(fault) = self.state.fault() {
                return Err(MotionError::Faulted(fault));
            }
            if self.queue.pending() == 0 && !self.state.motion_active() && self.state.position_reached() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(MotionError::Timeout(timeout));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Wait for the timer to go idle, whatever the outcome of the motion.
    pub async fn wait_idle(&self, timeout: Duration) -> Result<(), MotionError> {
        let deadline = Instant::now() + timeout;
        while self.state.motion_active() {
            if Instant::now() >= deadline {
                return Err(MotionError::Timeout(timeout));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(())
    }

    /// Cancel the active motion without latching a fault.
    pub fn stop(&self) -> Result<(), MotionError> {
        if self.timer.send(TimerCommand::Stop) {
            Ok(())
        } else {
            Err(MotionError::TimerUnavailable)
        }
    }

    /// Declare the current position the origin and wait for the timer to apply it.
    pub(crate) async fn zero(&self) -> Result<(), MotionError> {
        if !self.timer.send(TimerCommand::Zero) {
            return Err(MotionError::TimerUnavailable);
        }
        let deadline = Instant::now() + self.motion_timeout;
        while self.state.steps() != (0, 0) || !self.state.position_reached() {
            if Instant::now() >= deadline {
                return Err(MotionError::Timeout(self.motion_timeout));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(())
    }

    /// Halt now, drop queued commands, switch the magnet off and latch `EmergencyStop`.
    pub async fn emergency_stop(&self) -> Result<usize, MotionError> {
        self.state.raise_fault(MotionFault::EmergencyStop);
        self.stop()?;
        self.magnet.set_magnet(false);
        let dropped = self.queue.clear().await?;
        tracing::warn!("Emergency stop: {} queued commands discarded", dropped);
        Ok(dropped)
    }

    pub async fn queue_stats(&self) -> Result<QueueStats, MotionError> {
        Ok(self.queue.stats().await?)
    }

    pub fn queue(&self) -> &MotionQueue {
        &self.queue
    }
}
