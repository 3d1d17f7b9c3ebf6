// Timeouts, topics, drivetrain calibration
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::swerve::hardware::{IdleMode, MotorConfig};
use crate::swerve::pid::PidGains;

// Runtime loop frequency (20 ms tick)
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "swerve/cmd/drive"; // drive requests
pub const TOPIC_CMD_POSE: &str = "swerve/cmd/pose"; // pose resets
pub const TOPIC_POSE: &str = "swerve/state/pose"; // odometry output
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status

const INCH: f64 = 0.0254;

/// Errors found while loading or validating the drivetrain configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Motor ID {id} is assigned to more than one motor controller")]
    DuplicateMotorId { id: u8 },

    #[error("Absolute encoder ID {id} is assigned to more than one module")]
    DuplicateEncoderId { id: u8 },

    #[error("Invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("Module locations do not span the chassis plane")]
    DegenerateGeometry,
}

/// Per-module wiring and zero reference, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleCalibration {
    pub drive_motor_id: u8,
    pub steer_motor_id: u8,
    pub absolute_encoder_id: u8,
    pub drive_inverted: bool,
    pub steer_inverted: bool,
    /// Absolute encoder reading (degrees) when the module points forward
    pub angle_offset: f64,
}

/// Calibration plus mounting location of one module
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub calibration: ModuleCalibration,
    /// Offset from chassis center in meters, [forward, left]
    pub location: [f64; 2],
}

/// Unit conversion factors derived from gearing and wheel size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversions {
    pub drive_meters_per_rev: f64,
    pub drive_mps_per_rpm: f64,
    pub steer_degrees_per_rev: f64,
}

/// Drivetrain configuration, loaded once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwerveConfig {
    /// Front left, front right, rear left, rear right
    pub modules: [ModuleConfig; 4],

    pub wheel_diameter_m: f64,
    /// Motor turns per wheel turn
    pub drive_gear_ratio: f64,
    /// Motor turns per module turn
    pub steer_gear_ratio: f64,
    pub max_speed_mps: f64,

    pub drive_current_limit_amps: f64,
    pub steer_current_limit_amps: f64,
    pub voltage_compensation: f64,
    pub idle_mode: IdleMode,

    /// Gains for the drive controller's internal velocity loop
    pub drive_velocity_gains: PidGains,
    /// Steering PID, output as a fraction of supply voltage per degree of error
    pub steer_gains: PidGains,
    /// Bound on the steering integral term, as a fraction of supply voltage
    pub steer_integral_limit: f64,

    /// Below this fraction of max speed the steering angle is held
    pub anti_jitter_fraction: f64,
    /// Steering error (degrees) under which output is forced to zero
    pub steer_deadband_deg: f64,
    /// Speed (m/s) under which the steering deadband applies
    pub steer_deadband_speed_mps: f64,
}

impl Default for SwerveConfig {
    fn default() -> Self {
        let wheel_base = 27.0 * INCH;
        let track_width = 22.0 * INCH;

        let module = |drive, steer, encoder, drive_inverted, angle_offset, location| ModuleConfig {
            calibration: ModuleCalibration {
                drive_motor_id: drive,
                steer_motor_id: steer,
                absolute_encoder_id: encoder,
                drive_inverted,
                steer_inverted: true,
                angle_offset,
            },
            location,
        };

        Self {
            modules: [
                module(40, 30, 2, false, 120.0, [wheel_base / 2.0, track_width / 2.0]),
                module(41, 31, 4, true, 188.0, [wheel_base / 2.0, -track_width / 2.0]),
                module(43, 33, 3, false, 253.0, [-wheel_base / 2.0, track_width / 2.0]),
                module(42, 32, 1, true, 135.0, [-wheel_base / 2.0, -track_width / 2.0]),
            ],
            wheel_diameter_m: 4.0 * INCH,
            // MK4i L1
            drive_gear_ratio: 1.0 / ((14.0 / 50.0) * (25.0 / 19.0) * (15.0 / 45.0)),
            steer_gear_ratio: 1.0 / ((14.0 / 50.0) * (10.0 / 60.0)),
            max_speed_mps: 3.0,
            drive_current_limit_amps: 40.0,
            steer_current_limit_amps: 20.0,
            voltage_compensation: 12.6,
            idle_mode: IdleMode::Brake,
            drive_velocity_gains: PidGains::new(0.2, 0.0, 0.0),
            steer_gains: PidGains::new(0.007, 0.00175, 0.0000625),
            steer_integral_limit: 1.0,
            anti_jitter_fraction: 0.01,
            steer_deadband_deg: 0.5,
            steer_deadband_speed_mps: 0.03,
        }
    }
}

impl SwerveConfig {
    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse and validate a JSON config; missing fields take default values
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: SwerveConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the robot cannot safely run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut motor_ids = HashSet::new();
        let mut encoder_ids = HashSet::new();

        for module in &self.modules {
            let cal = &module.calibration;
            for id in [cal.drive_motor_id, cal.steer_motor_id] {
                if !motor_ids.insert(id) {
                    return Err(ConfigError::DuplicateMotorId { id });
                }
            }
            if !encoder_ids.insert(cal.absolute_encoder_id) {
                return Err(ConfigError::DuplicateEncoderId {
                    id: cal.absolute_encoder_id,
                });
            }
        }

        let positive = [
            ("wheel_diameter_m", self.wheel_diameter_m),
            ("drive_gear_ratio", self.drive_gear_ratio),
            ("steer_gear_ratio", self.steer_gear_ratio),
            ("max_speed_mps", self.max_speed_mps),
            ("drive_current_limit_amps", self.drive_current_limit_amps),
            ("steer_current_limit_amps", self.steer_current_limit_amps),
            ("voltage_compensation", self.voltage_compensation),
            ("steer_integral_limit", self.steer_integral_limit),
        ];
        for (name, value) in positive {
            // Also rejects NaN
            if !(value > 0.0) {
                return Err(ConfigError::InvalidParameter { name, value });
            }
        }

        let non_negative = [
            ("anti_jitter_fraction", self.anti_jitter_fraction),
            ("steer_deadband_deg", self.steer_deadband_deg),
            ("steer_deadband_speed_mps", self.steer_deadband_speed_mps),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                return Err(ConfigError::InvalidParameter { name, value });
            }
        }

        Ok(())
    }

    pub fn conversions(&self) -> Conversions {
        let drive_meters_per_rev = self.wheel_diameter_m * std::f64::consts::PI / self.drive_gear_ratio;
        Conversions {
            drive_meters_per_rev,
            drive_mps_per_rpm: drive_meters_per_rev / 60.0,
            steer_degrees_per_rev: 360.0 / self.steer_gear_ratio,
        }
    }

    /// Control loop period in seconds
    pub fn loop_period(&self) -> f64 {
        1.0 / LOOP_HZ as f64
    }

    pub fn module_locations(&self) -> [[f64; 2]; 4] {
        self.modules.map(|m| m.location)
    }

    pub fn drive_motor_config(&self, calibration: &ModuleCalibration) -> MotorConfig {
        MotorConfig {
            current_limit_amps: self.drive_current_limit_amps,
            voltage_compensation: self.voltage_compensation,
            idle_mode: self.idle_mode,
            inverted: calibration.drive_inverted,
            velocity_gains: Some(self.drive_velocity_gains),
        }
    }

    pub fn steer_motor_config(&self, calibration: &ModuleCalibration) -> MotorConfig {
        MotorConfig {
            current_limit_amps: self.steer_current_limit_amps,
            voltage_compensation: self.voltage_compensation,
            idle_mode: self.idle_mode,
            inverted: calibration.steer_inverted,
            velocity_gains: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SwerveConfig::default();
        assert!(config.validate().is_ok());
        // 8.14:1 and 21.43:1 reductions
        assert!((config.drive_gear_ratio - 8.142857).abs() < 1e-3);
        assert!((config.steer_gear_ratio - 21.428571).abs() < 1e-3);
    }

    #[test]
    fn test_conversions() {
        let conv = SwerveConfig::default().conversions();
        let expected = 4.0 * INCH * std::f64::consts::PI / (1.0 / ((14.0 / 50.0) * (25.0 / 19.0) * (15.0 / 45.0)));
        assert!((conv.drive_meters_per_rev - expected).abs() < 1e-12);
        assert!((conv.drive_mps_per_rpm * 60.0 - expected).abs() < 1e-12);
        assert!((conv.steer_degrees_per_rev - 16.8).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_motor_id_rejected() {
        let mut config = SwerveConfig::default();
        config.modules[2].calibration.steer_motor_id = config.modules[0].calibration.drive_motor_id;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateMotorId { id: 40 })
        ));
    }

    #[test]
    fn test_duplicate_encoder_id_rejected() {
        let mut config = SwerveConfig::default();
        config.modules[3].calibration.absolute_encoder_id = 2;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateEncoderId { id: 2 })
        ));
    }

    #[test]
    fn test_non_positive_parameter_rejected() {
        let mut config = SwerveConfig::default();
        config.max_speed_mps = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameter { name: "max_speed_mps", .. })
        ));
    }

    #[test]
    fn test_steer_integral_limit_must_be_positive() {
        let result = SwerveConfig::from_json(r#"{ "steer_integral_limit": 0.0 }"#);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                name: "steer_integral_limit",
                ..
            })
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SwerveConfig::from_json(r#"{ "max_speed_mps": 4.5, "idle_mode": "coast" }"#).unwrap();
        assert_eq!(config.max_speed_mps, 4.5);
        assert_eq!(config.idle_mode, IdleMode::Coast);
        assert_eq!(config.modules, SwerveConfig::default().modules);
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(matches!(
            SwerveConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
