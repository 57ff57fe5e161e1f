// Static actuator configuration for a swerve module
//
// Built once at start-up from the physical constants and handed to every
// module constructor. Nothing here changes after construction.

use std::f64::consts::{PI, TAU};

use super::hardware::ControlType;

/// Behaviour of a motor with no output applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleMode {
    Brake,
    Coast,
}

/// Closed-loop gains
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidGains {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

impl PidGains {
    pub const fn p(p: f64) -> Self {
        Self { p, i: 0.0, d: 0.0 }
    }
}

/// Circular input range for a position closed loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionWrapping {
    pub min: f64,
    pub max: f64,
}

impl PositionWrapping {
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Everything an actuator needs to know before it accepts setpoints
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorConfig {
    /// Control mode this actuator is commanded in
    pub mode: ControlType,
    pub idle_mode: IdleMode,
    pub current_limit_amps: f64,
    /// Output units per motor rotation
    pub position_conversion_factor: f64,
    /// Output units per second, per motor RPM
    pub velocity_conversion_factor: f64,
    pub pid: PidGains,
    /// Duty cycle limits of the closed loop output
    pub output_range: (f64, f64),
    /// `None` treats the position domain as linear
    pub position_wrapping: Option<PositionWrapping>,
    /// Store the parameters in non-volatile memory
    pub persist: bool,
}

/// Physical constants of one swerve module design
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleConstants {
    pub wheel_diameter_m: f64,
    /// Motor rotations per wheel rotation
    pub driving_reduction: f64,
    /// Motor rotations per module rotation
    pub steering_reduction: f64,
    pub driving_pid: PidGains,
    pub steering_pid: PidGains,
    pub driving_current_limit_amps: f64,
    pub steering_current_limit_amps: f64,
    pub idle_mode: IdleMode,
    pub output_range: (f64, f64),
    pub persist: bool,
}

impl Default for ModuleConstants {
    /// 4" wheel, L2 driving reduction, 150/7 steering reduction
    fn default() -> Self {
        Self {
            wheel_diameter_m: 0.1016,
            driving_reduction: 6.75,
            steering_reduction: 150.0 / 7.0,
            driving_pid: PidGains::p(0.08),
            steering_pid: PidGains::p(5.0),
            driving_current_limit_amps: 40.0,
            steering_current_limit_amps: 20.0,
            idle_mode: IdleMode::Brake,
            output_range: (-1.0, 1.0),
            persist: true,
        }
    }
}

impl ModuleConstants {
    /// Metres travelled per driving motor rotation
    pub fn driving_factor(&self) -> f64 {
        self.wheel_diameter_m * PI / self.driving_reduction
    }

    /// Radians of module rotation per steering motor rotation
    pub fn steering_factor(&self) -> f64 {
        TAU / self.steering_reduction
    }
}

/// Configuration for both actuators of a module
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleConfiguration {
    pub driving: ActuatorConfig,
    pub steering: ActuatorConfig,
}

impl ModuleConfiguration {
    pub fn from_constants(constants: &ModuleConstants) -> Self {
        let driving_factor = constants.driving_factor();
        let steering_factor = constants.steering_factor();

        let driving = ActuatorConfig {
            mode: ControlType::Velocity,
            idle_mode: constants.idle_mode,
            current_limit_amps: constants.driving_current_limit_amps,
            position_conversion_factor: driving_factor, // rotations -> m
            velocity_conversion_factor: driving_factor / 60.0, // RPM -> m/s
            pid: constants.driving_pid,
            output_range: constants.output_range,
            position_wrapping: None,
            persist: constants.persist,
        };

        let steering = ActuatorConfig {
            mode: ControlType::Position,
            idle_mode: constants.idle_mode,
            current_limit_amps: constants.steering_current_limit_amps,
            position_conversion_factor: steering_factor, // rotations -> rad
            velocity_conversion_factor: steering_factor / 60.0, // RPM -> rad/s
            pid: constants.steering_pid,
            output_range: constants.output_range,
            position_wrapping: Some(PositionWrapping { min: -PI, max: PI }),
            persist: constants.persist,
        };

        Self { driving, steering }
    }
}

impl Default for ModuleConfiguration {
    fn default() -> Self {
        Self::from_constants(&ModuleConstants::default())
    }
}
