// Calibration: READ-ONLY tool to measure each module's chassis offset
//
// Point every wheel at chassis-forward by hand (bevel gears all facing the
// same side), then run this. Nothing is written to the servos.
//
// Usage: cargo run --example calibrate -- [port]
// Example: cargo run --example calibrate -- /dev/ttyUSB0

use swerve_module_runtime::config::{ModulePlacement, SERVO_PORT};
use swerve_module_runtime::module::{
    AbsoluteSensorHandle, FeetechAbsoluteSensor, FeetechBus, SharedBus, calibration_offset_for,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    // Get port from args or use default
    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| SERVO_PORT.to_string());

    println!("Swerve module calibration (read-only)");
    println!("Serial port: {}", port);
    println!();

    let bus = match FeetechBus::open(&port) {
        Ok(bus) => SharedBus::new(bus),
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the USB cable is connected");
            return Err(e.into());
        }
    };

    let mut offsets = Vec::new();
    for placement in ModulePlacement::ALL {
        let (_, _, sensor_id) = placement.default_ids();
        let mut sensor = FeetechAbsoluteSensor::new(bus.clone(), sensor_id);

        match sensor.absolute_rotations() {
            Ok(rotations) => {
                let offset = calibration_offset_for(rotations);
                println!(
                    "  {:<12} (sensor {}): {:.4} rot -> offset {:+.4} rad ({:+.1}°)",
                    placement.to_string(),
                    sensor_id,
                    rotations,
                    offset,
                    offset.to_degrees()
                );
                offsets.push((placement, offset));
            }
            Err(e) => println!("  {:<12} (sensor {}): ✗ {}", placement.to_string(), sensor_id, e),
        }
    }

    println!();
    if offsets.len() < ModulePlacement::ALL.len() {
        println!("⚠ Not every sensor answered; check power, wiring and ids");
    }
    println!("Start each module with its offset, e.g.:");
    for (placement, offset) in offsets {
        println!(
            "  cargo run -- --backend feetech --placement {} --offset {:.4}",
            placement.to_string().replace('_', "-"),
            offset
        );
    }

    Ok(())
}
