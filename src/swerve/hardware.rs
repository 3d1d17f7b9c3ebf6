// Hardware boundary for one swerve module
//
// The motor controllers close the drive velocity loop and own the CAN
// transport. This layer only defines the quantities exchanged each tick:
// motor rotations in, drive output / steer voltage out.

use serde::{Deserialize, Serialize};

use super::pid::PidGains;

/// Errors raised by a hardware device
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HardwareError {
    #[error("Device {device} is not connected")]
    Disconnected { device: u8 },

    #[error("Timeout waiting for device {device}")]
    Timeout { device: u8 },

    #[error("Device {device} rejected request: {reason}")]
    Rejected { device: u8, reason: String },
}

pub type Result<T> = std::result::Result<T, HardwareError>;

/// Behaviour of a motor when commanded to zero output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleMode {
    #[default]
    Brake,
    Coast,
}

/// Settings pushed to a motor controller at startup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorConfig {
    pub current_limit_amps: f64,
    pub voltage_compensation: f64,
    pub idle_mode: IdleMode,
    pub inverted: bool,
    /// Gains for the controller's internal velocity loop (drive only)
    pub velocity_gains: Option<PidGains>,
}

/// Drive motor with integrated encoder and velocity loop
pub trait DriveMotor: Send {
    fn configure(&mut self, config: &MotorConfig) -> Result<()>;

    /// Open-loop output as a fraction of supply, in [-1, 1]
    fn set_output(&mut self, fraction: f64) -> Result<()>;

    /// Closed-loop velocity target in motor RPM
    fn set_velocity(&mut self, rpm: f64) -> Result<()>;

    /// Motor rotations since the last reset
    fn position(&mut self) -> Result<f64>;

    /// Motor speed in RPM
    fn velocity(&mut self) -> Result<f64>;

    fn set_position(&mut self, revolutions: f64) -> Result<()>;
}

/// Steering motor with integrated relative encoder
pub trait SteerMotor: Send {
    fn configure(&mut self, config: &MotorConfig) -> Result<()>;

    fn set_voltage(&mut self, volts: f64) -> Result<()>;

    /// Motor rotations since the reference was last set
    fn position(&mut self) -> Result<f64>;

    fn set_position(&mut self, revolutions: f64) -> Result<()>;

    /// Supply voltage seen by the controller
    fn bus_voltage(&mut self) -> Result<f64>;
}

/// Absolute rotary encoder on the steering axis
pub trait AbsoluteEncoder: Send {
    /// Absolute steering angle in degrees
    fn absolute_angle(&mut self) -> Result<f64>;
}

/// Devices exclusively owned by one module
pub struct ModuleHardware {
    pub drive: Box<dyn DriveMotor>,
    pub steer: Box<dyn SteerMotor>,
    pub encoder: Box<dyn AbsoluteEncoder>,
}

impl ModuleHardware {
    pub fn new(
        drive: impl DriveMotor + 'static,
        steer: impl SteerMotor + 'static,
        encoder: impl AbsoluteEncoder + 'static,
    ) -> Self {
        Self {
            drive: Box::new(drive),
            steer: Box::new(steer),
            encoder: Box::new(encoder),
        }
    }
}
