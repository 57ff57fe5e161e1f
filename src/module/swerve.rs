// One independently steered swerve module
//
// Converts chassis-frame wheel commands into sensor-frame setpoints and
// reports sensor-frame measurements back in chassis frame.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::angle::{self, optimize, rotations_to_radians};
use super::config::ModuleConfiguration;
use super::hardware::{
    AbsoluteSensorHandle, ActuatorHandle, ControlType, Device, ModuleError, Result,
};

/// Wheel velocity vector: speed in m/s, angle in radians
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleState {
    pub speed: f64,
    pub angle: f64,
}

impl ModuleState {
    pub fn new(speed: f64, angle: f64) -> Self {
        Self { speed, angle }
    }
}

/// Accumulated wheel distance in metres and steering angle in radians
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModulePosition {
    pub distance: f64,
    pub angle: f64,
}

/// Chassis offset that makes the wheel's current heading read as forward.
///
/// Take the reading with the wheel aligned to chassis-forward.
pub fn calibration_offset_for(absolute_rotations: f64) -> f64 {
    angle::normalize(rotations_to_radians(absolute_rotations))
}

pub struct SwerveModule<A, S> {
    driving: A,
    steering: A,
    // Only read during construction, kept so the module owns all its devices
    _absolute: S,
    chassis_angular_offset: f64,
    desired_state: ModuleState,
}

impl<A, S> SwerveModule<A, S>
where
    A: ActuatorHandle,
    S: AbsoluteSensorHandle,
{
    /// Configure the actuators and calibrate the steering encoder.
    ///
    /// The absolute sensor is read exactly once. Any failure here is fatal
    /// for the module.
    pub fn new(
        mut driving: A,
        mut steering: A,
        mut absolute: S,
        chassis_angular_offset: f64,
        config: &ModuleConfiguration,
    ) -> Result<Self> {
        driving
            .apply_configuration(&config.driving)
            .map_err(|source| ModuleError::Initialization {
                device: Device::Driving,
                source,
            })?;
        steering
            .apply_configuration(&config.steering)
            .map_err(|source| ModuleError::Initialization {
                device: Device::Steering,
                source,
            })?;

        let absolute_rotations =
            absolute
                .absolute_rotations()
                .map_err(|source| ModuleError::Initialization {
                    device: Device::AbsoluteSensor,
                    source,
                })?;
        let absolute_angle = rotations_to_radians(absolute_rotations);

        // The encoder carries the sensor-frame angle; the offset is applied
        // on every read and write, nowhere else.
        steering
            .set_position(angle::normalize(absolute_angle))
            .map_err(|source| ModuleError::Initialization {
                device: Device::Steering,
                source,
            })?;
        driving
            .reset_relative_position()
            .map_err(|source| ModuleError::Initialization {
                device: Device::Driving,
                source,
            })?;

        let initial_angle = angle::normalize(absolute_angle - chassis_angular_offset);
        info!(
            "Module calibrated: absolute={:.4} rot, offset={:.4} rad, heading={:.4} rad",
            absolute_rotations, chassis_angular_offset, initial_angle
        );

        Ok(Self {
            driving,
            steering,
            _absolute: absolute,
            chassis_angular_offset,
            desired_state: ModuleState::new(0.0, initial_angle),
        })
    }

    /// Current wheel velocity and chassis-frame heading
    pub fn state(&mut self) -> Result<ModuleState> {
        let speed = self.driving.velocity().map_err(|source| ModuleError::Read {
            device: Device::Driving,
            source,
        })?;
        let angle = self.chassis_angle()?;
        Ok(ModuleState { speed, angle })
    }

    /// Accumulated wheel distance and chassis-frame heading
    pub fn position(&mut self) -> Result<ModulePosition> {
        let distance = self.driving.position().map_err(|source| ModuleError::Read {
            device: Device::Driving,
            source,
        })?;
        let angle = self.chassis_angle()?;
        Ok(ModulePosition { distance, angle })
    }

    /// Command a chassis-frame wheel state.
    ///
    /// The steering move is limited to a quarter turn by inverting the
    /// wheel when needed. Write failures are returned as-is; the next call
    /// tries again.
    pub fn set_desired_state(&mut self, desired: ModuleState) -> Result<()> {
        let target_angle = desired.angle + self.chassis_angular_offset;
        let current = self.sensor_angle()?;
        let corrected = optimize(desired.speed, target_angle, current);

        debug!(
            "Setpoint: speed={:.3} angle={:.4} (inverted={})",
            corrected.speed, corrected.angle, corrected.inverted
        );

        self.driving
            .set_setpoint(corrected.speed, ControlType::Velocity)
            .map_err(|source| ModuleError::Setpoint {
                device: Device::Driving,
                source,
            })?;
        self.steering
            .set_setpoint(corrected.angle, ControlType::Position)
            .map_err(|source| ModuleError::Setpoint {
                device: Device::Steering,
                source,
            })?;

        self.desired_state = desired;
        Ok(())
    }

    /// Zero the driving distance. Steering calibration is untouched.
    pub fn reset_encoders(&mut self) -> Result<()> {
        self.driving
            .reset_relative_position()
            .map_err(|source| ModuleError::Setpoint {
                device: Device::Driving,
                source,
            })
    }

    /// Last accepted command, as given by the caller
    pub fn desired_state(&self) -> ModuleState {
        self.desired_state
    }

    fn sensor_angle(&mut self) -> Result<f64> {
        self.steering.position().map_err(|source| ModuleError::Read {
            device: Device::Steering,
            source,
        })
    }

    fn chassis_angle(&mut self) -> Result<f64> {
        Ok(angle::normalize(
            self.sensor_angle()? - self.chassis_angular_offset,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::angle::{assert_angle_eq, shortest_difference};
    use crate::module::sim::{SimAbsoluteSensor, SimActuator};
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    struct Rig {
        module: SwerveModule<SimActuator, SimAbsoluteSensor>,
        driving: SimActuator,
        steering: SimActuator,
    }

    fn rig(absolute_rotations: f64, offset: f64) -> Rig {
        let driving = SimActuator::new(1);
        let steering = SimActuator::new(2);
        let module = SwerveModule::new(
            driving.clone(),
            steering.clone(),
            SimAbsoluteSensor::new(absolute_rotations),
            offset,
            &ModuleConfiguration::default(),
        )
        .expect("sim module constructs");
        Rig {
            module,
            driving,
            steering,
        }
    }

    #[test]
    fn test_construction_reports_chassis_frame_angle() {
        for &(r, o) in &[
            (0.0, 0.0),
            (0.25, 0.0),
            (0.5, FRAC_PI_4),
            (0.9, -FRAC_PI_2),
            (-0.3, PI),
            (1.7, 2.0),
        ] {
            let mut rig = rig(r, o);
            let state = rig.module.state().unwrap();
            assert_angle_eq(state.angle, r * 2.0 * PI - o);
            assert!((-PI..PI).contains(&state.angle));
        }
    }

    #[test]
    fn test_construction_configures_and_zeroes() {
        let mut rig = rig(0.1, 0.0);
        let config = ModuleConfiguration::default();
        assert_eq!(rig.driving.applied_config(), Some(config.driving));
        assert_eq!(rig.steering.applied_config(), Some(config.steering));
        assert_eq!(rig.module.position().unwrap().distance, 0.0);
    }

    #[test]
    fn test_half_rotation_with_quarter_offset() {
        // 0.5 rot -> PI absolute, minus PI/4 offset -> 3PI/4 chassis heading
        let mut rig = rig(0.5, FRAC_PI_4);
        assert_angle_eq(rig.steering.current_position(), PI);
        assert_angle_eq(rig.module.state().unwrap().angle, 3.0 * FRAC_PI_4);
        assert_angle_eq(rig.module.position().unwrap().angle, 3.0 * FRAC_PI_4);
        assert_angle_eq(rig.module.desired_state().angle, 3.0 * FRAC_PI_4);
    }

    #[test]
    fn test_half_turn_request_inverts_wheel() {
        let mut rig = rig(0.0, 0.0);
        rig.module
            .set_desired_state(ModuleState::new(2.0, PI))
            .unwrap();

        let (speed, mode) = rig.driving.last_setpoint().unwrap();
        assert_eq!(mode, ControlType::Velocity);
        assert_eq!(speed, -2.0);

        let (angle, mode) = rig.steering.last_setpoint().unwrap();
        assert_eq!(mode, ControlType::Position);
        assert_angle_eq(angle, 0.0);
    }

    #[test]
    fn test_setpoint_includes_offset_without_inversion() {
        let offset = 0.6;
        let mut rig = rig(0.0, offset);
        // Wheel currently points at -offset in chassis frame
        let desired = ModuleState::new(1.25, -offset + 0.4);
        rig.module.set_desired_state(desired).unwrap();

        let (angle, _) = rig.steering.last_setpoint().unwrap();
        assert_angle_eq(angle, desired.angle + offset);
        assert_eq!(rig.driving.last_setpoint().unwrap().0, 1.25);
    }

    #[test]
    fn test_steering_move_never_exceeds_quarter_turn() {
        let offset = 1.1;
        for i in 0..24 {
            let mut rig = rig(i as f64 / 24.0, offset);
            let current = rig.steering.current_position();
            for j in -12..12 {
                let desired = ModuleState::new(1.0, j as f64 * 0.27);
                rig.module.set_desired_state(desired).unwrap();
                let (target, _) = rig.steering.last_setpoint().unwrap();
                let (speed, _) = rig.driving.last_setpoint().unwrap();
                assert!(shortest_difference(target, current).abs() <= FRAC_PI_2 + 1e-9);
                if speed < 0.0 {
                    assert_angle_eq(target, desired.angle + offset + PI);
                } else {
                    assert_angle_eq(target, desired.angle + offset);
                }
                // Undo the instant sim convergence so every request starts
                // from the same heading
                rig.steering.set_position(current).unwrap();
            }
        }
    }

    #[test]
    fn test_desired_state_keeps_uncorrected_request() {
        let mut rig = rig(0.0, FRAC_PI_2);
        let desired = ModuleState::new(-0.5, 2.5);
        rig.module.set_desired_state(desired).unwrap();
        assert_eq!(rig.module.desired_state(), desired);
    }

    #[test]
    fn test_state_reads_are_idempotent() {
        let mut rig = rig(0.37, 0.2);
        rig.module
            .set_desired_state(ModuleState::new(1.5, 0.3))
            .unwrap();
        let first = rig.module.state().unwrap();
        let second = rig.module.state().unwrap();
        assert_eq!(first, second);
        assert_eq!(rig.module.position().unwrap(), rig.module.position().unwrap());
    }

    #[test]
    fn test_state_reports_driving_velocity() {
        let mut rig = rig(0.0, 0.0);
        rig.module
            .set_desired_state(ModuleState::new(0.75, 0.1))
            .unwrap();
        let state = rig.module.state().unwrap();
        assert_eq!(state.speed, 0.75);
        assert_angle_eq(state.angle, 0.1);
    }

    #[test]
    fn test_reset_encoders_zeroes_distance_only() {
        let mut rig = rig(0.2, 0.1);
        rig.module
            .set_desired_state(ModuleState::new(2.0, 0.0))
            .unwrap();
        rig.driving.advance(1.5);
        assert!((rig.module.position().unwrap().distance - 3.0).abs() < 1e-9);

        let heading = rig.module.position().unwrap().angle;
        rig.module.reset_encoders().unwrap();
        let position = rig.module.position().unwrap();
        assert_eq!(position.distance, 0.0);
        assert_eq!(position.angle, heading);
    }

    #[test]
    fn test_sensor_failure_is_fatal() {
        let result = SwerveModule::new(
            SimActuator::new(1),
            SimActuator::new(2),
            SimAbsoluteSensor::failing(3),
            0.0,
            &ModuleConfiguration::default(),
        );
        match result {
            Err(err @ ModuleError::Initialization { .. }) => {
                assert_eq!(err.device(), Device::AbsoluteSensor)
            }
            other => panic!("expected initialization error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_unreachable_actuator_is_fatal() {
        let steering = SimActuator::new(2);
        steering.set_reachable(false);
        let result = SwerveModule::new(
            SimActuator::new(1),
            steering,
            SimAbsoluteSensor::new(0.0),
            0.0,
            &ModuleConfiguration::default(),
        );
        let err = result.err().expect("construction must fail");
        assert!(matches!(err, ModuleError::Initialization { .. }));
        assert_eq!(err.device(), Device::Steering);
    }

    #[test]
    fn test_rejected_setpoint_is_reported_once() {
        let mut rig = rig(0.0, 0.0);
        rig.steering.reject_next_setpoint();

        let err = rig
            .module
            .set_desired_state(ModuleState::new(1.0, 0.5))
            .unwrap_err();
        assert!(matches!(err, ModuleError::Setpoint { .. }));
        assert_eq!(err.device(), Device::Steering);
        assert_eq!(rig.module.desired_state().speed, 0.0);

        // Next cycle goes through normally
        let desired = ModuleState::new(1.0, 0.5);
        rig.module.set_desired_state(desired).unwrap();
        assert_eq!(rig.module.desired_state(), desired);
    }

    #[test]
    fn test_calibration_offset_zeroes_heading() {
        let reading = 0.8;
        let offset = calibration_offset_for(reading);
        let mut rig = rig(reading, offset);
        assert_angle_eq(rig.module.state().unwrap().angle, 0.0);
    }
}
