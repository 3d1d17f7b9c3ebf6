// Keyboard teleop: WASD move, Z/X rotate, R/F speed, C field-centric, L lock, H reset heading, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use swerve_zenoh_runtime::config::{TOPIC_CMD_DRIVE, TOPIC_CMD_POSE};
use swerve_zenoh_runtime::messages::{DriveRequest, PoseCommand};

const SPEEDS: [f64; 3] = [0.5, 1.5, 3.0]; // m/s
const THETA_SPEEDS: [f64; 3] = [45.0, 90.0, 180.0]; // deg/s
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let drive_pub = session.declare_publisher(TOPIC_CMD_DRIVE).await?;
    let pose_pub = session.declare_publisher(TOPIC_CMD_POSE).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, C=field-centric, L=lock, H=reset heading, Q=quit");
    info!("Speed: LOW, field-centric: ON");

    enable_raw_mode()?;
    let result = run_teleop(&drive_pub, &pose_pub).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    drive_pub: &zenoh::pubsub::Publisher<'_>,
    pose_pub: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    let mut field_centric = true;
    let mut locked = false;

    // Persistent velocity state
    let mut x_vel = 0.0;
    let mut y_vel = 0.0;
    let mut theta_vel = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    // Movement - update velocity, refresh timestamp and release the lock
                    KeyCode::Char('w') if pressed => {
                        x_vel = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                        locked = false;
                    }
                    KeyCode::Char('s') if pressed => {
                        x_vel = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                        locked = false;
                    }
                    KeyCode::Char('a') if pressed => {
                        y_vel = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                        locked = false;
                    }
                    KeyCode::Char('d') if pressed => {
                        y_vel = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                        locked = false;
                    }

                    // Rotation
                    KeyCode::Char('z') if pressed => {
                        theta_vel = THETA_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                        locked = false;
                    }
                    KeyCode::Char('x') if pressed => {
                        theta_vel = -THETA_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                        locked = false;
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('c') if kind == KeyEventKind::Press => {
                        field_centric = !field_centric;
                        info!("Field-centric: {}", if field_centric { "ON" } else { "OFF" });
                    }
                    KeyCode::Char('l') if kind == KeyEventKind::Press => {
                        locked = true;
                        info!("Wheels locked, move to release");
                    }
                    KeyCode::Char('h') if kind == KeyEventKind::Press => {
                        let cmd = serde_json::to_string(&PoseCommand::ResetHeading)?;
                        pose_pub.put(cmd).await?;
                        info!("Heading reset");
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Reset velocities if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            x_vel = 0.0;
            y_vel = 0.0;
            theta_vel = 0.0;
        }

        // Always publish at ~50Hz so the runtime watchdog stays fed
        let request = if locked {
            DriveRequest::Lock
        } else {
            DriveRequest::Chassis {
                x_vel,
                y_vel,
                theta_vel,
                field_centric,
                open_loop: false,
            }
        };
        drive_pub.put(serde_json::to_string(&request)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
