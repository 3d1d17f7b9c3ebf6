// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::swerve::{ModuleState, ModuleStatus};

// Drive request from teleop/scripts -> runtime
// Tagged by "mode", e.g. {"mode":"chassis","x_vel":1.0,"y_vel":0.0,"theta_vel":0.0}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DriveRequest {
    /// Chassis velocity: m/s forward and left, deg/s counter-clockwise
    Chassis {
        x_vel: f64,
        y_vel: f64,
        theta_vel: f64,
        #[serde(default)]
        field_centric: bool,
        #[serde(default)]
        open_loop: bool,
    },
    /// Per-module targets in FL, FR, RL, RR order
    Modules {
        states: [ModuleState; 4],
        #[serde(default)]
        open_loop: bool,
    },
    /// Hold position with the wheels in an X
    Lock,
    Stop,
}

// Pose command from teleop/scripts -> runtime
// Unlike drive requests these are applied in order, none are dropped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PoseCommand {
    Reset { x: f64, y: f64, heading: f64 },
    ResetHeading,
    ResetEncoders,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub runtime: RuntimeHealth,
    pub modules: [ModuleStatus; 4],
}
