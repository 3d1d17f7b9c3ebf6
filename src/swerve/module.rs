// Controller for a single swerve module
//
// Owns one drive motor, one steer motor and one absolute encoder. Every tick
// the coordinator samples the sensors and hands over a target state, which
// is turned into a drive command (delegated to the motor controller) and a
// steering voltage (closed locally with a PID).
//
// Hardware faults never escape this type: they are logged on the transition
// and exposed through ModuleStatus while the control loop keeps running.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::hardware::{self, ModuleHardware, MotorConfig};
use super::pid::PidController;
use super::state::{ModuleLocation, ModulePosition, ModuleState, wrap_degrees};
use crate::config::{Conversions, ModuleCalibration, SwerveConfig};

/// Drive command sent to the motor controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveCommand {
    /// Open-loop fraction of supply in [-1, 1]
    Output(f64),
    /// Closed-loop wheel speed target in m/s
    Velocity(f64),
}

impl Default for DriveCommand {
    fn default() -> Self {
        DriveCommand::Output(0.0)
    }
}

/// What the module commanded on its last tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleOutput {
    /// Optimized target, with the held angle substituted when applicable
    pub target: ModuleState,
    pub drive: DriveCommand,
    pub steer_volts: f64,
}

/// Health flags for one module
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStatus {
    /// Steering reference was set from the absolute encoder
    pub calibrated: bool,
    /// A motor controller could not be configured
    pub init_fault: bool,
    /// The last sensor read failed; readings are last-known values
    pub sensor_fault: bool,
    /// The last motor command failed
    pub actuation_fault: bool,
}

impl ModuleStatus {
    /// Module must not be driven and is commanded to neutral instead
    pub fn is_faulted(&self) -> bool {
        self.init_fault
    }

    pub fn is_ok(&self) -> bool {
        self.calibrated && !self.init_fault && !self.sensor_fault && !self.actuation_fault
    }
}

/// Latest raw sensor readings, in motor units
#[derive(Debug, Clone, Copy, Default)]
struct SensorSample {
    drive_revs: f64,
    drive_rpm: f64,
    steer_revs: f64,
    bus_voltage: f64,
}

pub struct SwerveModule {
    location: ModuleLocation,
    calibration: ModuleCalibration,
    conversions: Conversions,
    drive_config: MotorConfig,
    steer_config: MotorConfig,

    max_speed: f64,
    /// Speeds at or below this hold the last commanded angle
    hold_speed: f64,
    deadband_deg: f64,
    deadband_speed: f64,
    nominal_voltage: f64,

    hardware: ModuleHardware,
    steer_pid: PidController,
    sample: SensorSample,

    /// Only state carried across ticks. Seeded from the heading at
    /// calibration and updated whenever a target is not held.
    last_commanded_angle: f64,
    last_output: ModuleOutput,
    status: ModuleStatus,
}

impl SwerveModule {
    /// Create the controller for the module at `location`. No hardware is
    /// touched until `initialize`.
    pub fn new(location: ModuleLocation, config: &SwerveConfig, hardware: ModuleHardware) -> Self {
        let calibration = config.modules[location.index()].calibration;

        Self {
            location,
            calibration,
            conversions: config.conversions(),
            drive_config: config.drive_motor_config(&calibration),
            steer_config: config.steer_motor_config(&calibration),
            max_speed: config.max_speed_mps,
            hold_speed: config.max_speed_mps * config.anti_jitter_fraction,
            deadband_deg: config.steer_deadband_deg,
            deadband_speed: config.steer_deadband_speed_mps,
            nominal_voltage: config.voltage_compensation,
            hardware,
            steer_pid: PidController::new(config.steer_gains, config.loop_period())
                .with_integral_limit(config.steer_integral_limit),
            sample: SensorSample {
                bus_voltage: config.voltage_compensation,
                ..Default::default()
            },
            last_commanded_angle: 0.0,
            last_output: ModuleOutput::default(),
            status: ModuleStatus::default(),
        }
    }

    /// Configure both motor controllers and zero the steering reference
    /// from the absolute encoder
    ///
    /// Failures are logged and recorded in the status; the module stays
    /// usable (uncalibrated) when only the absolute encoder is missing.
    pub fn initialize(&mut self) {
        info!(
            "Initializing {} module (drive {}, steer {}, encoder {})",
            self.location,
            self.calibration.drive_motor_id,
            self.calibration.steer_motor_id,
            self.calibration.absolute_encoder_id
        );

        if let Err(e) = self.hardware.drive.configure(&self.drive_config) {
            error!("{} module: failed to configure drive motor: {}", self.location, e);
            self.status.init_fault = true;
        }
        if let Err(e) = self.hardware.steer.configure(&self.steer_config) {
            error!("{} module: failed to configure steer motor: {}", self.location, e);
            self.status.init_fault = true;
        }

        self.reset_to_absolute();
        self.sample();
        self.last_commanded_angle = self.heading();
        self.steer_pid.reset();
    }

    /// Set the steering reference so the heading reads 0 when the module
    /// points forward
    pub fn reset_to_absolute(&mut self) {
        let absolute = match self.hardware.encoder.absolute_angle() {
            Ok(angle) => angle,
            Err(e) => {
                warn!(
                    "{} module: absolute encoder unavailable ({}), steering left uncalibrated",
                    self.location, e
                );
                self.status.calibrated = false;
                return;
            }
        };

        let heading = wrap_degrees(absolute - self.calibration.angle_offset);
        let revs = heading / self.conversions.steer_degrees_per_rev;

        match self.hardware.steer.set_position(revs) {
            Ok(()) => {
                debug!(
                    "{} module: absolute {:.2} deg, offset {:.2} deg -> heading {:.2} deg",
                    self.location, absolute, self.calibration.angle_offset, heading
                );
                self.sample.steer_revs = revs;
                self.status.calibrated = true;
                // Held angle and PID history belong to the old frame
                self.last_commanded_angle = heading;
                self.steer_pid.reset();
            }
            Err(e) => {
                warn!("{} module: failed to set steering reference: {}", self.location, e);
                self.status.calibrated = false;
            }
        }
    }

    /// Read all sensors into the cached sample
    ///
    /// On failure the previous sample is kept so consumers see last-known values.
    pub fn sample(&mut self) {
        match self.read_sensors() {
            Ok(sample) => {
                self.sample = sample;
                if self.status.sensor_fault {
                    info!("{} module: sensor reads recovered", self.location);
                    self.status.sensor_fault = false;
                }
            }
            Err(e) => {
                if !self.status.sensor_fault {
                    warn!("{} module: sensor read failed, holding last sample: {}", self.location, e);
                }
                self.status.sensor_fault = true;
            }
        }
    }

    fn read_sensors(&mut self) -> hardware::Result<SensorSample> {
        Ok(SensorSample {
            drive_revs: self.hardware.drive.position()?,
            drive_rpm: self.hardware.drive.velocity()?,
            steer_revs: self.hardware.steer.position()?,
            bus_voltage: self.hardware.steer.bus_voltage()?,
        })
    }

    pub fn reset_drive_distance(&mut self) {
        let result = self.hardware.drive.set_position(0.0);
        if result.is_ok() {
            self.sample.drive_revs = 0.0;
        }
        self.record_actuation(result);
    }

    pub fn reset_steer_reference(&mut self) {
        let result = self.hardware.steer.set_position(0.0);
        if result.is_ok() {
            self.sample.steer_revs = 0.0;
            self.last_commanded_angle = 0.0;
            self.steer_pid.reset();
        }
        self.record_actuation(result);
    }

    pub fn reset_all(&mut self) {
        self.reset_steer_reference();
        self.reset_drive_distance();
    }

    pub fn location(&self) -> ModuleLocation {
        self.location
    }

    pub fn status(&self) -> ModuleStatus {
        self.status
    }

    pub fn last_output(&self) -> ModuleOutput {
        self.last_output
    }

    pub fn last_commanded_angle(&self) -> f64 {
        self.last_commanded_angle
    }

    /// Steering angle in degrees (unbounded accumulator)
    pub fn heading(&self) -> f64 {
        self.sample.steer_revs * self.conversions.steer_degrees_per_rev
    }

    /// Distance driven in meters
    pub fn distance(&self) -> f64 {
        self.sample.drive_revs * self.conversions.drive_meters_per_rev
    }

    /// Wheel speed in m/s
    pub fn speed(&self) -> f64 {
        self.sample.drive_rpm * self.conversions.drive_mps_per_rpm
    }

    pub fn state(&self) -> ModuleState {
        ModuleState::new(self.speed(), self.heading())
    }

    pub fn position(&self) -> ModulePosition {
        ModulePosition::new(self.distance(), self.heading())
    }

    /// Drive the module toward `target` for this tick
    ///
    /// `open_loop` sends speed as a fraction of max speed; otherwise the
    /// speed goes to the motor controller's velocity loop.
    pub fn set_desired_state(&mut self, target: ModuleState, open_loop: bool) {
        let state = target.optimize(self.heading());

        let drive = if open_loop {
            DriveCommand::Output((state.speed / self.max_speed).clamp(-1.0, 1.0))
        } else {
            DriveCommand::Velocity(state.speed)
        };

        // Resolving a direction for a near-zero vector is noise
        let angle = if state.speed.abs() <= self.hold_speed {
            self.last_commanded_angle
        } else {
            state.angle
        };
        self.last_commanded_angle = angle;

        self.actuate(ModuleState::new(state.speed, angle), drive);
    }

    /// Stop the wheel and steer to `angle` even though the speed is zero
    pub fn lock_to(&mut self, angle: f64) {
        let state = ModuleState::new(0.0, angle).optimize(self.heading());
        self.last_commanded_angle = state.angle;
        self.actuate(state, DriveCommand::Output(0.0));
    }

    /// Zero drive output while holding the last commanded angle
    pub fn stop(&mut self) {
        let held = ModuleState::new(0.0, self.last_commanded_angle);
        self.actuate(held, DriveCommand::Output(0.0));
    }

    fn actuate(&mut self, target: ModuleState, mut drive: DriveCommand) {
        // Without fresh feedback the steering loop would wind up against a
        // frozen heading; go quiet until reads recover
        if self.status.sensor_fault {
            self.steer_pid.reset();
            drive = DriveCommand::Output(0.0);
        }

        let drive_result = match drive {
            DriveCommand::Output(fraction) => self.hardware.drive.set_output(fraction),
            DriveCommand::Velocity(speed) => {
                let rpm = speed / self.conversions.drive_mps_per_rpm;
                self.hardware.drive.set_velocity(rpm)
            }
        };

        let steer_volts = if self.status.sensor_fault {
            0.0
        } else {
            self.steer_voltage(target.angle, target.speed)
        };
        let steer_result = self.hardware.steer.set_voltage(steer_volts);

        self.record_actuation(drive_result.and(steer_result));
        self.last_output = ModuleOutput {
            target,
            drive,
            steer_volts,
        };
    }

    /// Steering voltage toward `angle`, scaled by the measured supply voltage
    fn steer_voltage(&mut self, angle: f64, speed: f64) -> f64 {
        let heading = self.heading();
        let mut output = self.steer_pid.calculate(heading, angle);

        // Stop chattering around the setpoint while stationary
        if (angle - heading).abs() < self.deadband_deg && speed.abs() <= self.deadband_speed {
            output = 0.0;
        }

        let supply = if self.sample.bus_voltage > 0.0 {
            self.sample.bus_voltage
        } else {
            self.nominal_voltage
        };
        (output * supply).clamp(-supply, supply)
    }

    fn record_actuation(&mut self, result: hardware::Result<()>) {
        match result {
            Ok(()) => {
                if self.status.actuation_fault {
                    info!("{} module: motor commands recovered", self.location);
                    self.status.actuation_fault = false;
                }
            }
            Err(e) => {
                if !self.status.actuation_fault {
                    warn!("{} module: motor command failed: {}", self.location, e);
                }
                self.status.actuation_fault = true;
            }
        }
    }
}
