// Capability interfaces for the hardware a swerve module drives
//
// The module only ever talks to these traits. Concrete backends live in
// `feetech` (serial servos) and `sim` (in-memory fakes).

use std::fmt;

use super::config::ActuatorConfig;
use super::feetech::FeetechError;

/// Closed-loop control mode for an actuator setpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlType {
    Velocity,
    Position,
}

/// Errors reported by an actuator or sensor backend
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error(transparent)]
    Feetech(#[from] FeetechError),

    #[error("Device {id} is unreachable")]
    Unreachable { id: u8 },

    #[error("Device {id} rejected the request: {reason}")]
    Rejected { id: u8, reason: String },

    #[error("Unsupported configuration: {0}")]
    Unsupported(String),
}

/// A motor with an integrated closed-loop controller and relative encoder.
///
/// Positions and velocities are in the units set by the conversion factors
/// of the last applied [`ActuatorConfig`].
pub trait ActuatorHandle {
    /// Apply gains, limits and conversion factors. Safe to repeat.
    fn apply_configuration(
        &mut self,
        config: &ActuatorConfig,
    ) -> std::result::Result<(), HardwareError>;

    /// Hand a target to the actuator's closed loop
    fn set_setpoint(
        &mut self,
        value: f64,
        mode: ControlType,
    ) -> std::result::Result<(), HardwareError>;

    /// Relative encoder position
    fn position(&mut self) -> std::result::Result<f64, HardwareError>;

    /// Relative encoder velocity
    fn velocity(&mut self) -> std::result::Result<f64, HardwareError>;

    /// Re-reference the relative encoder so it currently reads `value`
    fn set_position(&mut self, value: f64) -> std::result::Result<(), HardwareError>;

    fn reset_relative_position(&mut self) -> std::result::Result<(), HardwareError> {
        self.set_position(0.0)
    }
}

/// An absolute angle sensor, one full rotation == 1.0
pub trait AbsoluteSensorHandle {
    fn absolute_rotations(&mut self) -> std::result::Result<f64, HardwareError>;
}

/// Which of a module's devices an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Driving,
    Steering,
    AbsoluteSensor,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Device::Driving => "driving actuator",
            Device::Steering => "steering actuator",
            Device::AbsoluteSensor => "absolute sensor",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by a swerve module
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// Construction failed; the module must not be operated
    #[error("Hardware initialization failed on {device}: {source}")]
    Initialization {
        device: Device,
        #[source]
        source: HardwareError,
    },

    /// A single control cycle's setpoint write was rejected
    #[error("Setpoint write to {device} failed: {source}")]
    Setpoint {
        device: Device,
        #[source]
        source: HardwareError,
    },

    #[error("Read from {device} failed: {source}")]
    Read {
        device: Device,
        #[source]
        source: HardwareError,
    },
}

impl ModuleError {
    pub fn device(&self) -> Device {
        match self {
            ModuleError::Initialization { device, .. }
            | ModuleError::Setpoint { device, .. }
            | ModuleError::Read { device, .. } => *device,
        }
    }
}

pub type Result<T> = std::result::Result<T, ModuleError>;
