// In-memory actuator and sensor backends
//
// Handles are cheap clones sharing one state, so a harness (or the
// runtime in sim mode) keeps a copy to advance time, inspect setpoints
// and inject faults after the module has taken ownership of the other.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::angle::wrap_into;
use super::config::ActuatorConfig;
use super::hardware::{AbsoluteSensorHandle, ActuatorHandle, ControlType, HardwareError};

#[derive(Debug, Default)]
struct SimMotor {
    config: Option<ActuatorConfig>,
    position: f64,
    velocity: f64,
    last_setpoint: Option<(f64, ControlType)>,
    reachable: bool,
    reject_next_setpoint: bool,
}

/// Simulated motor whose closed loop converges instantly
#[derive(Debug, Clone)]
pub struct SimActuator {
    id: u8,
    motor: Arc<Mutex<SimMotor>>,
}

impl SimActuator {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            motor: Arc::new(Mutex::new(SimMotor {
                reachable: true,
                ..SimMotor::default()
            })),
        }
    }

    fn motor(&self) -> MutexGuard<'_, SimMotor> {
        self.motor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Integrate the current velocity over `dt` seconds
    pub fn advance(&self, dt: f64) {
        let mut motor = self.motor();
        let position = motor.position + motor.velocity * dt;
        motor.position = match motor.config.and_then(|c| c.position_wrapping) {
            Some(wrap) => wrap_into(position, wrap.min, wrap.max),
            None => position,
        };
    }

    pub fn last_setpoint(&self) -> Option<(f64, ControlType)> {
        self.motor().last_setpoint
    }

    pub fn applied_config(&self) -> Option<ActuatorConfig> {
        self.motor().config
    }

    pub fn current_position(&self) -> f64 {
        self.motor().position
    }

    /// An unreachable motor fails every request
    pub fn set_reachable(&self, reachable: bool) {
        self.motor().reachable = reachable;
    }

    pub fn reject_next_setpoint(&self) {
        self.motor().reject_next_setpoint = true;
    }

    fn check_reachable(&self, motor: &SimMotor) -> Result<(), HardwareError> {
        if motor.reachable {
            Ok(())
        } else {
            Err(HardwareError::Unreachable { id: self.id })
        }
    }
}

impl ActuatorHandle for SimActuator {
    fn apply_configuration(&mut self, config: &ActuatorConfig) -> Result<(), HardwareError> {
        let mut motor = self.motor();
        self.check_reachable(&motor)?;
        motor.config = Some(*config);
        Ok(())
    }

    fn set_setpoint(&mut self, value: f64, mode: ControlType) -> Result<(), HardwareError> {
        let mut motor = self.motor();
        self.check_reachable(&motor)?;
        if motor.reject_next_setpoint {
            motor.reject_next_setpoint = false;
            return Err(HardwareError::Rejected {
                id: self.id,
                reason: "injected fault".to_string(),
            });
        }

        debug!("Sim motor {}: {:?} setpoint {}", self.id, mode, value);
        motor.last_setpoint = Some((value, mode));
        match mode {
            ControlType::Velocity => motor.velocity = value,
            ControlType::Position => {
                motor.velocity = 0.0;
                motor.position = match motor.config.and_then(|c| c.position_wrapping) {
                    Some(wrap) => wrap_into(value, wrap.min, wrap.max),
                    None => value,
                };
            }
        }
        Ok(())
    }

    fn position(&mut self) -> Result<f64, HardwareError> {
        let motor = self.motor();
        self.check_reachable(&motor)?;
        Ok(motor.position)
    }

    fn velocity(&mut self) -> Result<f64, HardwareError> {
        let motor = self.motor();
        self.check_reachable(&motor)?;
        Ok(motor.velocity)
    }

    fn set_position(&mut self, value: f64) -> Result<(), HardwareError> {
        let mut motor = self.motor();
        self.check_reachable(&motor)?;
        motor.position = value;
        Ok(())
    }
}

/// Simulated absolute encoder with a fixed reading
#[derive(Debug, Clone)]
pub struct SimAbsoluteSensor {
    id: u8,
    rotations: Option<f64>,
}

impl SimAbsoluteSensor {
    pub fn new(rotations: f64) -> Self {
        Self {
            id: 0,
            rotations: Some(rotations),
        }
    }

    /// A sensor that never answers
    pub fn failing(id: u8) -> Self {
        Self {
            id,
            rotations: None,
        }
    }
}

impl AbsoluteSensorHandle for SimAbsoluteSensor {
    fn absolute_rotations(&mut self) -> Result<f64, HardwareError> {
        self.rotations
            .ok_or(HardwareError::Unreachable { id: self.id })
    }
}
