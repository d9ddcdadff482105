// Homing against the simulated limit switches

mod common;

#[cfg(test)]
mod tests {
    use super::common::{fast_config, rig, s, sim_with_pieces};
    use chessbot::motion::HomingError;
    use chessbot::{TransportError, VerifyResult};
    use chessbot_shared::Axis;

    fn near(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.1
    }

    #[tokio::test]
    async fn test_home_from_unknown_position() {
        let mut sim = sim_with_pieces(&[]);
        sim.start_x_mm = 120.0;
        sim.start_y_mm = 90.0;
        let rig = rig(fast_config(), sim);
        assert!(!rig.engine.snapshot().homed);

        rig.engine.home().await.unwrap();

        let snapshot = rig.engine.snapshot();
        assert!(snapshot.homed);
        assert!(snapshot.fault.is_none());
        assert_eq!((snapshot.a_steps, snapshot.b_steps), (0, 0));
        let (x, y) = rig.board.head_position();
        assert!(near(x, 0.0) && near(y, 0.0), "head at ({}, {})", x, y);
        assert!(!rig.state.limit_pressed(Axis::X));
        assert!(!rig.state.limit_pressed(Axis::Y));
    }

    #[tokio::test]
    async fn test_homed_frame_lines_up_with_slots() {
        let mut sim = sim_with_pieces(&[(3, 3)]);
        sim.start_x_mm = 200.0;
        sim.start_y_mm = 150.0;
        let rig = rig(fast_config(), sim);

        rig.engine.home().await.unwrap();
        let result = rig.engine.transport(s(3, 3), s(3, 6)).await.unwrap();
        assert_eq!(result, VerifyResult::Success);
        assert!(rig.board.occupancy().is_occupied(s(3, 6)));
    }

    #[tokio::test]
    async fn test_home_backs_off_closed_switch() {
        let mut sim = sim_with_pieces(&[]);
        sim.start_x_mm = -1.5;
        sim.start_y_mm = 50.0;
        let rig = rig(fast_config(), sim);
        assert!(rig.state.limit_pressed(Axis::X));

        rig.engine.home().await.unwrap();

        assert!(rig.engine.snapshot().homed);
        let (x, y) = rig.board.head_position();
        assert!(near(x, 0.0) && near(y, 0.0), "head at ({}, {})", x, y);
    }

    #[tokio::test]
    async fn test_home_fails_when_switch_never_trips() {
        let mut config = fast_config();
        config.homing.travel_mm = 200.0;
        let mut sim = sim_with_pieces(&[]);
        sim.limits_enabled = false;
        let rig = rig(config, sim);

        let err = rig.engine.home().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Homing(HomingError::Timeout { axis: Axis::X })
        ));
        assert!(!rig.engine.snapshot().homed);
        assert!(!rig.state.motion_active());
    }
}
