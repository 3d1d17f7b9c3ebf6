// 50 Hz control loop with watchdog
// Note: a watchdog is a safety mechanism that triggers a safe action if something goes wrong
// Eg. if teleop crashes and stops sending requests, the drivetrain stops instead of
// driving on the last request forever

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{CMD_TIMEOUT, LOOP_HZ, SwerveConfig, TOPIC_CMD_DRIVE, TOPIC_CMD_POSE, TOPIC_HEALTH, TOPIC_POSE};
use crate::messages::{DriveRequest, HealthReport, PoseCommand, RuntimeHealth};
use crate::swerve::{ChassisPose, ChassisSpeeds, Drivetrain, SimModule, SimParams};

pub struct Runtime {
    drivetrain: Drivetrain,
    latest_request: Option<DriveRequest>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new(drivetrain: Drivetrain) -> Self {
        Self {
            drivetrain,
            latest_request: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first request
        }
    }

    pub fn drivetrain(&self) -> &Drivetrain {
        &self.drivetrain
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn health_report(&self) -> HealthReport {
        HealthReport {
            runtime: self.health,
            modules: self.drivetrain.module_statuses(),
        }
    }

    /// Process incoming drive request, only the latest one is kept
    pub fn on_command(&mut self, request: DriveRequest) {
        debug!("Received drive request: {:?}", &request);
        self.latest_request = Some(request);
        self.cmd_received_at = Instant::now();
    }

    /// Apply a pose command immediately
    pub fn on_pose_command(&mut self, command: PoseCommand) {
        info!("Received pose command: {:?}", &command);
        match command {
            PoseCommand::Reset { x, y, heading } => {
                self.drivetrain.reset_pose(ChassisPose::new(x, y, heading));
            }
            PoseCommand::ResetHeading => self.drivetrain.reset_heading(),
            PoseCommand::ResetEncoders => self.drivetrain.reset_encoders(),
        }
    }

    /// One control cycle: sample, integrate odometry, then actuate
    pub fn tick(&mut self) -> ChassisPose {
        self.drivetrain.sample();
        let pose = self.drivetrain.update_odometry();
        self.actuate();
        pose
    }

    /// Command the drivetrain based on watchdog state
    fn actuate(&mut self) {
        let cmd_age = self.cmd_received_at.elapsed();

        let request = match self.latest_request {
            Some(ref request) if cmd_age <= CMD_TIMEOUT => request,
            Some(_) => {
                // Watchdog triggered - stop the robot
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Drive request stale ({:?} old), stopping drivetrain", cmd_age);
                }
                self.health = RuntimeHealth::CmdStale;
                self.drivetrain.stop();
                return;
            }
            None => {
                // No request ever received
                self.health = RuntimeHealth::CmdStale;
                self.drivetrain.stop();
                return;
            }
        };

        if self.health != RuntimeHealth::Ok {
            info!("Drive requests flowing, drivetrain enabled");
        }
        self.health = RuntimeHealth::Ok;

        match *request {
            DriveRequest::Chassis {
                x_vel,
                y_vel,
                theta_vel,
                field_centric,
                open_loop,
            } => self
                .drivetrain
                .drive(ChassisSpeeds::new(x_vel, y_vel, theta_vel), field_centric, open_loop),
            DriveRequest::Modules { states, open_loop } => self.drivetrain.set_module_states(states, open_loop),
            DriveRequest::Lock => self.drivetrain.lock(),
            DriveRequest::Stop => self.drivetrain.stop(),
        }
    }
}

pub async fn run(config: SwerveConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Bringing up drivetrain on simulated hardware...");
    let params = SimParams {
        period: config.loop_period(),
        ..SimParams::default()
    };
    let hardware = config
        .modules
        .each_ref()
        .map(|m| SimModule::new(&m.calibration, params).into_hardware());
    let drivetrain = Drivetrain::new(&config, hardware)?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_drive = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let sub_pose = session.declare_subscriber(TOPIC_CMD_POSE).await?;
    let pub_pose = session.declare_publisher(TOPIC_POSE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new(drivetrain);
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}, {}", TOPIC_CMD_DRIVE, TOPIC_CMD_POSE);
    info!("Publishing to: {}, {}", TOPIC_POSE, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Apply pose commands in arrival order
        while let Ok(Some(sample)) = sub_pose.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<PoseCommand>(&payload) {
                Ok(cmd) => runtime.on_pose_command(cmd),
                Err(e) => warn!("Failed to parse pose command: {}", e),
            }
        }

        // 2. Drain all pending drive requests (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_drive.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveRequest>(&payload) {
                Ok(request) => runtime.on_command(request),
                Err(e) => warn!("Failed to parse drive request: {}", e),
            }
        }

        // 3. Sample, update odometry and actuate (includes watchdog logic)
        let pose = runtime.tick();

        // 4. Publish pose
        let pose_json = serde_json::to_string(&pose)?;
        pub_pose.put(pose_json).await?;

        // 5. Publish health
        let health_json = serde_json::to_string(&runtime.health_report())?;
        pub_health.put(health_json).await?;
    }
}
