// src/motion/timer.rs - Dedicated step timer thread (the interrupt domain)
//
// The thread owns the synchronizer and the step output. Task code talks to it only
// through the command channel and the atomics in `GantryState`.

use super::kinematics::MoveProfile;
use super::stepper::{StepperSynchronizer, TickOutcome};
use chessbot_shared::StepSink;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Upper bound on ticks run back-to-back before the channel is checked again.
const MAX_CATCH_UP_TICKS: u32 = 4096;
const IDLE_WAIT: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub enum TimerCommand {
    Start(MoveProfile),
    /// Cancel the active motion without latching a fault.
    Stop,
    Zero,
    Shutdown,
}

pub struct StepTimer {
    tx: Sender<TimerCommand>,
    handle: Option<JoinHandle<()>>,
}

impl StepTimer {
    pub fn spawn(
        sync: StepperSynchronizer,
        sink: Box<dyn StepSink>,
        resolution: Duration,
    ) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = std::thread::Builder::new()
            .name("step-timer".to_string())
            .spawn(move || run(sync, sink, rx, resolution))?;
        Ok(Self { tx, handle: Some(handle) })
    }

    /// Returns false once the timer thread is gone.
    pub fn send(&self, cmd: TimerCommand) -> bool {
        self.tx.send(cmd).is_ok()
    }
}

impl Drop for StepTimer {
    fn drop(&mut self) {
        let _ = self.tx.send(TimerCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Step timer thread panicked");
            }
        }
    }
}

struct TimerLoop {
    sync: StepperSynchronizer,
    sink: Box<dyn StepSink>,
    period: Duration,
    next_due: Instant,
}

impl TimerLoop {
    /// Returns false on shutdown.
    fn handle(&mut self, cmd: TimerCommand) -> bool {
        match cmd {
            TimerCommand::Start(profile) => {
                self.period = profile.step_period;
                self.next_due = Instant::now();
                self.sync.begin(&profile);
            }
            TimerCommand::Stop => {
                self.sync.abort(None);
            }
            TimerCommand::Zero => self.sync.zero(),
            TimerCommand::Shutdown => {
                self.sync.abort(None);
                return false;
            }
        }
        true
    }

    /// Run every tick that has come due, catching up on missed periods.
    fn run_due_ticks(&mut self) {
        let now = Instant::now();
        let mut batch = 0;
        while self.sync.is_active() && self.next_due <= now && batch < MAX_CATCH_UP_TICKS {
            match self.sync.tick(self.sink.as_mut()) {
                TickOutcome::Aborted(fault) => {
                    tracing::warn!("Step timer: motion aborted ({:?})", fault);
                }
                TickOutcome::Completed => {
                    tracing::trace!("Step timer: motion complete at {:?}", self.sync.steps());
                }
                TickOutcome::Idle | TickOutcome::Stepped => {}
            }
            self.next_due += self.period;
            batch += 1;
        }
    }
}

fn run(
    sync: StepperSynchronizer,
    sink: Box<dyn StepSink>,
    rx: Receiver<TimerCommand>,
    resolution: Duration,
) {
    let mut timer = TimerLoop {
        sync,
        sink,
        period: Duration::ZERO,
        next_due: Instant::now(),
    };
    tracing::debug!("Step timer thread started");
    loop {
        if timer.sync.is_active() {
            match rx.try_recv() {
                Ok(cmd) => {
                    if !timer.handle(cmd) {
                        break;
                    }
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => break,
            }
            timer.run_due_ticks();
            let now = Instant::now();
            if timer.sync.is_active() && timer.next_due > now {
                std::thread::sleep((timer.next_due - now).min(resolution));
            }
        } else {
            match rx.recv_timeout(IDLE_WAIT) {
                Ok(cmd) => {
                    if !timer.handle(cmd) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
    tracing::debug!("Step timer thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::kinematics::{CoreXy, Envelope};
    use chessbot_shared::{Actuator, GantryState};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingSink(Arc<AtomicU64>);

    impl StepSink for CountingSink {
        fn step(&mut self, _actuator: Actuator, _forward: bool) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn spawn_timer(state: Arc<GantryState>, pulses: Arc<AtomicU64>) -> StepTimer {
        let envelope = Envelope { min_x: 0.0, max_x: 412.0, min_y: 0.0, max_y: 288.0, tolerance: 0.5 };
        let sync = StepperSynchronizer::new(CoreXy::new(80.0), envelope, state);
        StepTimer::spawn(sync, Box::new(CountingSink(pulses)), Duration::from_micros(200)).unwrap()
    }

    #[test]
    fn test_timer_runs_profile_to_completion() {
        let state = Arc::new(GantryState::new());
        let pulses = Arc::new(AtomicU64::new(0));
        let timer = spawn_timer(state.clone(), pulses.clone());
        let profile = CoreXy::new(80.0).profile((0, 0), (10.0, 5.0), 500.0, true).unwrap().unwrap();
        state.mark_motion_started(10.0, 5.0);
        assert!(timer.send(TimerCommand::Start(profile)));
        assert!(wait_for(|| state.position_reached()));
        assert_eq!(state.steps(), (1200, 400));
        assert_eq!(pulses.load(Ordering::SeqCst), 1600);
    }

    #[test]
    fn test_stop_cancels_without_fault() {
        let state = Arc::new(GantryState::new());
        let pulses = Arc::new(AtomicU64::new(0));
        let timer = spawn_timer(state.clone(), pulses);
        // 100 mm at 5 mm/s, far longer than the test.
        let profile = CoreXy::new(80.0).profile((0, 0), (100.0, 0.0), 5.0, true).unwrap().unwrap();
        state.mark_motion_started(100.0, 0.0);
        timer.send(TimerCommand::Start(profile));
        assert!(wait_for(|| state.steps().0 > 0));
        timer.send(TimerCommand::Stop);
        assert!(wait_for(|| !state.motion_active()));
        assert_eq!(state.fault(), None);
        assert!(!state.position_reached());
    }
}
