// Control runtime for a single independently steered swerve module
//
// - module: calibration, chassis-offset correction, shortest-path steering,
//   and the actuator/sensor backends
// - runtime: 50 Hz zenoh control loop with command watchdog

pub mod config;
pub mod messages;
pub mod module;
pub mod runtime;
