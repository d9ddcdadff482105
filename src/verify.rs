// src/verify.rs - Post-move occupancy check and magnet re-seat correction
use crate::config::{SpeedConfig, VerifyConfig};
use crate::motion::{MotionController, MotionError};
use chessbot_shared::{MotionCommand, OccupancySensor, Slot};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Number of offset positions tried around the slot centre.
const RING_POINTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerifyResult {
    Success,
    /// The piece never left its source slot. Needs manual intervention.
    SourceNotEmpty,
    /// Destination still empty after the centre pulse and every ring offset.
    CorrectionFailed,
    /// The captured piece could not be parked in its capture zone.
    CaptureZoneFail,
}

impl VerifyResult {
    pub fn is_success(self) -> bool {
        self == VerifyResult::Success
    }
}

pub struct MoveVerifier {
    controller: Arc<MotionController>,
    sensor: Arc<dyn OccupancySensor>,
    speeds: SpeedConfig,
    correction_offset_mm: f64,
    settle: Duration,
}

impl MoveVerifier {
    pub fn new(
        controller: Arc<MotionController>,
        sensor: Arc<dyn OccupancySensor>,
        speeds: SpeedConfig,
        config: &VerifyConfig,
        settle: Duration,
    ) -> Self {
        Self {
            controller,
            sensor,
            speeds,
            correction_offset_mm: config.correction_offset_mm,
            settle,
        }
    }

    /// Confirm a piece went from `from` to `to`, correcting a missed seat if needed.
    pub async fn verify(&self, from: Slot, to: Slot) -> Result<VerifyResult, MotionError> {
        self.settle().await?;
        if self.sensor.is_occupied(from).await {
            tracing::error!("Verify {} -> {}: source still occupied, piece was not lifted", from, to);
            return Ok(VerifyResult::SourceNotEmpty);
        }
        if self.sensor.is_occupied(to).await {
            return Ok(VerifyResult::Success);
        }
        tracing::warn!("Verify {} -> {}: destination empty, starting correction", from, to);
        self.correct(to).await
    }

    async fn settle(&self) -> Result<(), MotionError> {
        self.controller
            .wait_until_drained(self.controller.motion_timeout())
            .await?;
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    async fn run(&self, cmds: &[MotionCommand]) -> Result<(), MotionError> {
        for cmd in cmds {
            self.controller.enqueue(*cmd).await?;
        }
        self.settle().await
    }

    /// Centre pulse, then the ring. Offsets that would leave the envelope are skipped.
    async fn correct(&self, slot: Slot) -> Result<VerifyResult, MotionError> {
        let (cx, cy) = slot.position();
        self.run(&[
            MotionCommand::new(cx, cy, self.speeds.travel_mm_s, false),
            MotionCommand::magnet_only(cx, cy, true),
            MotionCommand::magnet_only(cx, cy, false),
        ])
        .await?;
        if self.sensor.is_occupied(slot).await {
            tracing::info!("Correction at {}: seated by centre pulse", slot);
            return Ok(VerifyResult::Success);
        }

        let envelope = self.controller.envelope();
        let mut tried = 0;
        for k in 0..RING_POINTS {
            let angle = k as f64 * std::f64::consts::TAU / RING_POINTS as f64;
            let ox = cx + self.correction_offset_mm * angle.cos();
            let oy = cy + self.correction_offset_mm * angle.sin();
            if !envelope.contains(ox, oy) {
                tracing::debug!("Correction at {}: offset {} outside envelope, skipped", slot, k);
                continue;
            }
            tried += 1;
            self.run(&[
                MotionCommand::new(ox, oy, self.speeds.travel_mm_s, false),
                MotionCommand::magnet_only(ox, oy, true),
                MotionCommand::new(cx, cy, self.speeds.seat_mm_s, true),
                MotionCommand::magnet_only(cx, cy, false),
            ])
            .await?;
            if self.sensor.is_occupied(slot).await {
                tracing::info!("Correction at {}: seated from ring offset {}", slot, k);
                return Ok(VerifyResult::Success);
            }
        }
        if tried < RING_POINTS {
            tracing::warn!(
                "Correction at {}: only {} of {} ring offsets inside the envelope",
                slot,
                tried,
                RING_POINTS
            );
        }
        tracing::error!("Correction at {}: centre pulse and {} ring offsets failed", slot, tried);
        Ok(VerifyResult::CorrectionFailed)
    }
}
