// Keyboard teleop for one module: WASD heading, Z/X nudge heading,
// R/F speed, SPACE reset distance, Q quit
//
// Usage: cargo run --example teleop -- [placement]
// Example: cargo run --example teleop -- front-right
use clap::ValueEnum;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::f64::consts::{FRAC_PI_2, PI};
use std::time::{Duration, Instant};
use swerve_module_runtime::config::{ModulePlacement, topic_cmd};
use swerve_module_runtime::messages::ModuleRequest;
use swerve_module_runtime::module::angle::normalize;
use tracing::info;

const SPEEDS: [f64; 3] = [0.25, 1.0, 2.5]; // m/s
const NUDGE: f64 = PI / 36.0; // 5 degrees
const INPUT_TIMEOUT_MS: u64 = 100; // Zero speed after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let placement = match std::env::args().nth(1) {
        Some(arg) => ModulePlacement::from_str(&arg, true)?,
        None => ModulePlacement::FrontLeft,
    };

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let topic = topic_cmd(placement);
    let publisher = session.declare_publisher(topic.as_str()).await?;

    info!("Driving {} on {}", placement, topic);
    info!("Controls: WASD=heading, Z/X=nudge, R/F=speed, SPACE=reset, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent command state; heading survives while speed times out
    let mut speed = 0.0;
    let mut angle: f64 = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                let heading = match code {
                    KeyCode::Char('w') if pressed => Some(0.0),
                    KeyCode::Char('a') if pressed => Some(FRAC_PI_2),
                    KeyCode::Char('s') if pressed => Some(-PI),
                    KeyCode::Char('d') if pressed => Some(-FRAC_PI_2),
                    KeyCode::Char('z') if pressed => Some(normalize(angle + NUDGE)),
                    KeyCode::Char('x') if pressed => Some(normalize(angle - NUDGE)),
                    _ => None,
                };
                if let Some(heading) = heading {
                    angle = heading;
                    speed = SPEEDS[speed_idx];
                    last_movement_input = Instant::now();
                }

                match code {
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char(' ') if pressed => {
                        let reset = serde_json::to_string(&ModuleRequest::ResetEncoders)?;
                        publisher.put(reset).await?;
                        info!("Distance reset");
                    }
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,
                    _ => {}
                }
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            speed = 0.0;
        }

        // Always publish at ~50Hz so the runtime watchdog stays fed
        let cmd = ModuleRequest::SetState { speed, angle };
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
