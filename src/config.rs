// Timeouts, topics, module placement and command-line options
use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;
use std::time::Duration;

use clap::{Parser, ValueEnum};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh key expressions, `{}` is the module placement
pub const TOPIC_ROOT: &str = "swerve";
pub fn topic_cmd(placement: ModulePlacement) -> String {
    format!("{}/{}/cmd", TOPIC_ROOT, placement) // commands
}
pub fn topic_state(placement: ModulePlacement) -> String {
    format!("{}/{}/state", TOPIC_ROOT, placement) // telemetry
}
pub fn topic_health(placement: ModulePlacement) -> String {
    format!("{}/{}/health", TOPIC_ROOT, placement) // health status
}

// Serial port for the Feetech servo bus
pub const SERVO_PORT: &str = "/dev/ttyUSB0";

/// Where a module sits on the chassis
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModulePlacement {
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

impl ModulePlacement {
    pub const ALL: [ModulePlacement; 4] = [
        ModulePlacement::FrontLeft,
        ModulePlacement::FrontRight,
        ModulePlacement::BackLeft,
        ModulePlacement::BackRight,
    ];

    /// Mounting rotation of the module's absolute sensor relative to chassis-forward
    pub fn default_offset(self) -> f64 {
        match self {
            ModulePlacement::FrontLeft => -FRAC_PI_2,
            ModulePlacement::FrontRight => 0.0,
            ModulePlacement::BackLeft => PI,
            ModulePlacement::BackRight => FRAC_PI_2,
        }
    }

    /// Default bus ids as (driving, steering, absolute sensor)
    pub fn default_ids(self) -> (u8, u8, u8) {
        match self {
            ModulePlacement::FrontLeft => (11, 12, 13),
            ModulePlacement::FrontRight => (21, 22, 23),
            ModulePlacement::BackLeft => (31, 32, 33),
            ModulePlacement::BackRight => (41, 42, 43),
        }
    }
}

impl fmt::Display for ModulePlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModulePlacement::FrontLeft => "front_left",
            ModulePlacement::FrontRight => "front_right",
            ModulePlacement::BackLeft => "back_left",
            ModulePlacement::BackRight => "back_right",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// In-memory actuators, no hardware needed
    Sim,
    /// Feetech servos on a serial bus
    Feetech,
}

/// Runtime for one swerve module
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct RuntimeArgs {
    /// Module position on the chassis
    #[arg(long, value_enum, default_value_t = ModulePlacement::FrontLeft)]
    pub placement: ModulePlacement,

    #[arg(long, value_enum, default_value_t = Backend::Sim)]
    pub backend: Backend,

    /// Serial port of the servo bus
    #[arg(long, default_value = SERVO_PORT)]
    pub port: String,

    #[arg(long)]
    pub driving_id: Option<u8>,

    #[arg(long)]
    pub steering_id: Option<u8>,

    #[arg(long)]
    pub sensor_id: Option<u8>,

    /// Chassis angular offset in radians, overrides the placement default
    #[arg(long, allow_hyphen_values = true)]
    pub offset: Option<f64>,

    /// Initial absolute sensor reading in rotations (sim backend)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub sim_absolute: f64,
}

impl RuntimeArgs {
    pub fn offset(&self) -> f64 {
        self.offset.unwrap_or_else(|| self.placement.default_offset())
    }

    /// Bus ids as (driving, steering, absolute sensor)
    pub fn ids(&self) -> (u8, u8, u8) {
        let (driving, steering, sensor) = self.placement.default_ids();
        (
            self.driving_id.unwrap_or(driving),
            self.steering_id.unwrap_or(steering),
            self.sensor_id.unwrap_or(sensor),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        assert_eq!(topic_cmd(ModulePlacement::BackRight), "swerve/back_right/cmd");
        assert_eq!(topic_state(ModulePlacement::FrontLeft), "swerve/front_left/state");
        assert_eq!(topic_health(ModulePlacement::FrontRight), "swerve/front_right/health");
    }

    #[test]
    fn test_args_defaults_follow_placement() {
        let args = RuntimeArgs::parse_from(["swerve-module-runtime", "--placement", "back-left"]);
        assert_eq!(args.placement, ModulePlacement::BackLeft);
        assert_eq!(args.backend, Backend::Sim);
        assert_eq!(args.offset(), PI);
        assert_eq!(args.ids(), (31, 32, 33));
    }

    #[test]
    fn test_args_overrides() {
        let args = RuntimeArgs::parse_from([
            "swerve-module-runtime",
            "--backend",
            "feetech",
            "--offset",
            "-0.5",
            "--steering-id",
            "7",
        ]);
        assert_eq!(args.backend, Backend::Feetech);
        assert_eq!(args.offset(), -0.5);
        assert_eq!(args.ids(), (11, 7, 13));
    }
}
