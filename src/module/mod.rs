// Swerve module control
//
// Provides:
// - Chassis-offset calibration and shortest-path steering (swerve)
// - Circular angle arithmetic shared by all of the above (angle)
// - Actuator/sensor capability traits and error types (hardware)
// - Static actuator configuration built from physical constants (config)
// - Feetech serial servo and in-memory simulated backends

pub mod angle;
pub mod config;
pub mod feetech;
mod hardware;
pub mod sim;
mod swerve;

pub use config::{ActuatorConfig, ModuleConfiguration, ModuleConstants};
pub use feetech::{FeetechAbsoluteSensor, FeetechActuator, FeetechBus, FeetechError, SharedBus};
pub use hardware::{
    AbsoluteSensorHandle, ActuatorHandle, ControlType, Device, HardwareError, ModuleError,
};
pub use sim::{SimAbsoluteSensor, SimActuator};
pub use swerve::{ModulePosition, ModuleState, SwerveModule, calibration_offset_for};
