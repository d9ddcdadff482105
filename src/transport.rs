// src/transport.rs - Physical move transport engine: plan, execute, verify
use crate::config::{Config, SpeedConfig};
use crate::motion::{HomingController, HomingError, MotionController, MotionError, QueueStats};
use crate::planner::{ObstacleResolver, PathPlan, Pathfinder, PlanningError, ResolvedPlan, expand};
use crate::verify::{MoveVerifier, VerifyResult};
use chessbot_shared::{
    GantrySnapshot, GantryState, MagnetDriver, MotionCommand, OccupancyGrid, OccupancySensor, Slot, StepSink, Zone,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("planning failed: {0}")]
    Planning(#[from] PlanningError),
    #[error("motion failed: {0}")]
    Motion(#[from] MotionError),
    #[error("homing failed: {0}")]
    Homing(#[from] HomingError),
    #[error("another transport or homing operation is in progress")]
    Busy,
    #[error("capture zone {0:?} is full")]
    CaptureZoneFull(Zone),
}

/// The hardware seams the engine drives.
pub struct Hardware {
    pub state: Arc<GantryState>,
    pub step_sink: Box<dyn StepSink>,
    pub magnet: Arc<dyn MagnetDriver>,
    pub sensor: Arc<dyn OccupancySensor>,
}

/// Move request from the rules engine, already in physical slot coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub from: Slot,
    pub to: Slot,
    /// Capture zone for the piece currently on `to`, if any.
    #[serde(default)]
    pub capture: Option<Zone>,
}

impl MoveRequest {
    pub fn plain(from: Slot, to: Slot) -> Self {
        Self { from, to, capture: None }
    }

    pub fn capture(from: Slot, to: Slot, zone: Zone) -> Self {
        Self { from, to, capture: Some(zone) }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub gantry: GantrySnapshot,
    pub queue: QueueStats,
}

pub struct TransportEngine {
    controller: Arc<MotionController>,
    sensor: Arc<dyn OccupancySensor>,
    pathfinder: Pathfinder,
    resolver: ObstacleResolver,
    verifier: MoveVerifier,
    homing: HomingController,
    speeds: SpeedConfig,
    op_lock: Mutex<()>,
    dispatcher: JoinHandle<()>,
}

impl TransportEngine {
    /// Must be called from within a tokio runtime (the dispatcher is spawned here).
    pub fn new(config: &Config, hardware: Hardware) -> Result<Self, TransportError> {
        let controller = MotionController::new(config, hardware.step_sink, hardware.magnet, hardware.state)?;
        let dispatcher = controller.spawn_dispatcher();
        let verifier = MoveVerifier::new(
            controller.clone(),
            hardware.sensor.clone(),
            config.speeds.clone(),
            &config.verify,
            config.timing.settle(),
        );
        let homing = HomingController::new(controller.clone(), config.homing.clone(), config.speeds.homing_mm_s);
        Ok(Self {
            controller,
            sensor: hardware.sensor,
            pathfinder: Pathfinder::new(config.planner.costs()),
            resolver: ObstacleResolver::new(config.planner.park_radius),
            verifier,
            homing,
            speeds: config.speeds.clone(),
            op_lock: Mutex::new(()),
            dispatcher,
        })
    }

    fn acquire(&self) -> Result<MutexGuard<'_, ()>, TransportError> {
        self.op_lock.try_lock().map_err(|_| TransportError::Busy)
    }

    pub fn controller(&self) -> &Arc<MotionController> {
        &self.controller
    }

    /// Route and primitive moves for a transport, without moving anything.
    pub async fn plan(&self, from: Slot, to: Slot) -> Result<(PathPlan, ResolvedPlan), TransportError> {
        let grid = self.sensor.read_grid().await;
        self.plan_on(&grid, from, to)
    }

    fn plan_on(&self, grid: &OccupancyGrid, from: Slot, to: Slot) -> Result<(PathPlan, ResolvedPlan), TransportError> {
        let path = self.pathfinder.find_path(grid, from, to)?;
        let resolved = self.resolver.resolve(from, to, &path, grid)?;
        Ok((path, resolved))
    }

    /// Carry the piece on `from` to `to`, moving blockers out of the way and back.
    pub async fn transport(&self, from: Slot, to: Slot) -> Result<VerifyResult, TransportError> {
        let _guard = self.acquire()?;
        self.transport_locked(from, to).await
    }

    async fn transport_locked(&self, from: Slot, to: Slot) -> Result<VerifyResult, TransportError> {
        let grid = self.sensor.read_grid().await;
        let (path, resolved) = self.plan_on(&grid, from, to)?;
        tracing::info!(
            "Transport {} -> {}: {} waypoints (cost {}), {} primitive moves",
            from,
            to,
            path.waypoints.len(),
            path.cost,
            resolved.moves.len()
        );
        for mv in &resolved.moves {
            tracing::debug!("Executing {}", mv);
            for cmd in expand(mv, &self.speeds) {
                self.controller.enqueue(cmd).await?;
            }
            let result = self.verifier.verify(mv.from, mv.to).await?;
            if !result.is_success() {
                tracing::warn!("Transport {} -> {}: {} ended with {:?}", from, to, mv, result);
                return Ok(result);
            }
        }
        Ok(VerifyResult::Success)
    }

    /// Plain or capturing move. The captured piece goes to its zone first. If it does
    /// not verify there the result is `CaptureZoneFail` and the main move is skipped;
    /// planning and motion errors on that leg are returned as they are.
    pub async fn execute(&self, request: MoveRequest) -> Result<VerifyResult, TransportError> {
        let _guard = self.acquire()?;
        if let Some(zone) = request.capture {
            let grid = self.sensor.read_grid().await;
            let parking = grid.first_free_in(zone).ok_or(TransportError::CaptureZoneFull(zone))?;
            tracing::info!("Capture: {} -> {} ({:?})", request.to, parking, zone);
            let result = self.transport_locked(request.to, parking).await?;
            if !result.is_success() {
                tracing::error!("Capture leg failed with {:?}", result);
                return Ok(VerifyResult::CaptureZoneFail);
            }
        }
        self.transport_locked(request.from, request.to).await
    }

    /// King first, then rook; the rook is not moved if the king fails.
    pub async fn transport_castling(
        &self,
        king: (Slot, Slot),
        rook: (Slot, Slot),
    ) -> Result<VerifyResult, TransportError> {
        let _guard = self.acquire()?;
        let result = self.transport_locked(king.0, king.1).await?;
        if !result.is_success() {
            return Ok(result);
        }
        self.transport_locked(rook.0, rook.1).await
    }

    /// Re-run verification for a move that has already been executed.
    pub async fn verify_move(&self, from: Slot, to: Slot) -> Result<VerifyResult, TransportError> {
        let _guard = self.acquire()?;
        Ok(self.verifier.verify(from, to).await?)
    }

    pub async fn home(&self) -> Result<(), TransportError> {
        let _guard = self.acquire()?;
        self.controller.queue().clear().await.map_err(MotionError::from)?;
        self.homing.home().await?;
        Ok(())
    }

    /// Single raw motion command, validated and started immediately. Refused with
    /// `Busy` while a transport or homing operation owns the gantry.
    pub fn move_to(&self, cmd: &MotionCommand) -> Result<(), MotionError> {
        let _guard = self.op_lock.try_lock().map_err(|_| MotionError::Busy)?;
        self.controller.move_to(cmd)
    }

    pub async fn emergency_stop(&self) -> Result<(), TransportError> {
        self.controller.emergency_stop().await?;
        Ok(())
    }

    pub fn snapshot(&self) -> GantrySnapshot {
        self.controller.state().snapshot()
    }

    pub async fn status(&self) -> Result<EngineStatus, TransportError> {
        Ok(EngineStatus {
            gantry: self.snapshot(),
            queue: self.controller.queue_stats().await?,
        })
    }
}

impl Drop for TransportEngine {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}
