// Swerve drive control for a 4-module chassis
//
// Provides:
// - Module controller (angle optimization, anti-jitter hold, steering PID)
// - Chassis kinematics and odometry
// - Drivetrain coordinator with per-module fault isolation
// - Hardware traits and a simulated backend

pub mod drivetrain;
pub mod hardware;
pub mod kinematics;
pub mod module;
pub mod odometry;
pub mod pid;
pub mod sim;
pub mod state;

pub use drivetrain::Drivetrain;
pub use hardware::{AbsoluteEncoder, DriveMotor, HardwareError, IdleMode, ModuleHardware, MotorConfig, SteerMotor};
pub use kinematics::SwerveKinematics;
pub use module::{DriveCommand, ModuleOutput, ModuleStatus, SwerveModule};
pub use odometry::SwerveOdometry;
pub use pid::{PidController, PidGains};
pub use sim::{SimHandle, SimModule, SimParams};
pub use state::{ChassisPose, ChassisSpeeds, ModuleLocation, ModulePosition, ModuleState, Twist};
