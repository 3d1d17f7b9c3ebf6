// Drivetrain coordinator for the four swerve modules
//
// Turns chassis velocity commands into module targets, integrates module
// positions into the chassis pose, and keeps per-module faults isolated:
// a module that failed to initialize is commanded to neutral while the rest
// of the chassis keeps driving.

use tracing::{info, warn};

use super::hardware::ModuleHardware;
use super::kinematics::SwerveKinematics;
use super::module::{ModuleStatus, SwerveModule};
use super::odometry::SwerveOdometry;
use super::state::{ChassisPose, ChassisSpeeds, ModuleLocation, ModulePosition, ModuleState};
use crate::config::{ConfigError, SwerveConfig};

/// X formation, FL, FR, RL, RR
const LOCK_ANGLES: [f64; 4] = [45.0, -45.0, -45.0, 45.0];

pub struct Drivetrain {
    modules: [SwerveModule; 4],
    kinematics: SwerveKinematics,
    odometry: SwerveOdometry,
    max_speed: f64,
}

impl Drivetrain {
    /// Validate the configuration, initialize every module and seed the
    /// odometry at the origin
    ///
    /// Only configuration problems are fatal; module hardware faults are
    /// recorded in the module status.
    pub fn new(config: &SwerveConfig, hardware: [ModuleHardware; 4]) -> Result<Self, ConfigError> {
        config.validate()?;
        let kinematics = SwerveKinematics::new(config.module_locations())?;

        let [front_left, front_right, rear_left, rear_right] = hardware;
        let mut modules = [
            SwerveModule::new(ModuleLocation::FrontLeft, config, front_left),
            SwerveModule::new(ModuleLocation::FrontRight, config, front_right),
            SwerveModule::new(ModuleLocation::RearLeft, config, rear_left),
            SwerveModule::new(ModuleLocation::RearRight, config, rear_right),
        ];

        for module in &mut modules {
            module.initialize();
            let status = module.status();
            if status.is_faulted() {
                warn!("{} module failed to initialize, it will be held at neutral", module.location());
            } else if !status.calibrated {
                warn!("{} module is running uncalibrated", module.location());
            }
        }

        let positions = modules.each_ref().map(|m| m.position());
        let odometry = SwerveOdometry::new(kinematics.clone(), positions, ChassisPose::default());

        info!("Drivetrain ready, max speed {} m/s", config.max_speed_mps);

        Ok(Self {
            modules,
            kinematics,
            odometry,
            max_speed: config.max_speed_mps,
        })
    }

    /// Sample every module's sensors for this tick
    pub fn sample(&mut self) {
        for module in &mut self.modules {
            module.sample();
        }
    }

    /// Drive the chassis
    ///
    /// With `field_centric` the translation is first rotated by the negated
    /// heading; kinematics and desaturation then run on the chassis-frame
    /// command.
    pub fn drive(&mut self, speeds: ChassisSpeeds, field_centric: bool, open_loop: bool) {
        let speeds = if field_centric {
            ChassisSpeeds::from_field_relative(speeds, self.heading())
        } else {
            speeds
        };

        let states = self.kinematics.to_module_states(speeds);
        self.set_module_states(states, open_loop);
    }

    /// Command module targets directly, in FL, FR, RL, RR order
    pub fn set_module_states(&mut self, mut states: [ModuleState; 4], open_loop: bool) {
        SwerveKinematics::desaturate(&mut states, self.max_speed);

        for (module, state) in self.modules.iter_mut().zip(states) {
            if module.status().is_faulted() {
                module.set_desired_state(ModuleState::default(), true);
            } else {
                module.set_desired_state(state, open_loop);
            }
        }
    }

    /// Turn the wheels into an X so the robot resists pushing
    pub fn lock(&mut self) {
        for (module, angle) in self.modules.iter_mut().zip(LOCK_ANGLES) {
            if module.status().is_faulted() {
                module.stop();
            } else {
                module.lock_to(angle);
            }
        }
    }

    /// Zero drive output on every module, holding steering angles
    pub fn stop(&mut self) {
        for module in &mut self.modules {
            module.stop();
        }
    }

    /// Integrate the module displacement since the previous call
    ///
    /// Modules whose sensors failed this tick contribute their last-known
    /// position.
    pub fn update_odometry(&mut self) -> ChassisPose {
        let positions = self.module_positions();
        self.odometry.update(positions)
    }

    /// Overwrite the pose estimate
    ///
    /// Sensors are sampled first so motion since the last tick is not added
    /// on top of the new pose.
    pub fn reset_pose(&mut self, pose: ChassisPose) {
        info!("Resetting pose to ({:.3}, {:.3}, {:.1} deg)", pose.x, pose.y, pose.heading);
        self.sample();
        let positions = self.module_positions();
        self.odometry.reset(pose, positions);
    }

    /// Make the current direction the new zero heading, keeping position
    pub fn reset_heading(&mut self) {
        info!("Resetting heading");
        self.odometry.reset_heading(0.0);
    }

    /// Zero all module accumulators without moving the pose estimate
    pub fn reset_encoders(&mut self) {
        info!("Resetting module encoders");
        for module in &mut self.modules {
            module.reset_all();
        }
        let pose = self.odometry.pose();
        let positions = self.module_positions();
        self.odometry.reset(pose, positions);
    }

    pub fn pose(&self) -> ChassisPose {
        self.odometry.pose()
    }

    pub fn heading(&self) -> f64 {
        self.odometry.pose().heading
    }

    /// Chassis velocity reconstructed from measured module states
    pub fn chassis_speeds(&self) -> ChassisSpeeds {
        self.kinematics.to_chassis_speeds(&self.module_states())
    }

    pub fn module_states(&self) -> [ModuleState; 4] {
        self.modules.each_ref().map(|m| m.state())
    }

    pub fn module_positions(&self) -> [ModulePosition; 4] {
        self.modules.each_ref().map(|m| m.position())
    }

    pub fn module_statuses(&self) -> [ModuleStatus; 4] {
        self.modules.each_ref().map(|m| m.status())
    }

    pub fn module(&self, location: ModuleLocation) -> &SwerveModule {
        &self.modules[location.index()]
    }

    pub fn kinematics(&self) -> &SwerveKinematics {
        &self.kinematics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swerve::module::DriveCommand;
    use crate::swerve::sim::{SimHandle, SimModule, SimParams};
    use crate::swerve::state::wrap_degrees;

    fn sim_drivetrain_with(
        config: &SwerveConfig,
        setup: impl Fn(usize, &SimHandle),
    ) -> (Drivetrain, [SimHandle; 4]) {
        let sims = config
            .modules
            .each_ref()
            .map(|m| SimModule::new(&m.calibration, SimParams::default()));
        let handles = sims.each_ref().map(|s| s.handle());
        for (i, handle) in handles.iter().enumerate() {
            setup(i, handle);
        }

        let drivetrain = Drivetrain::new(config, sims.map(SimModule::into_hardware)).unwrap();
        (drivetrain, handles)
    }

    fn sim_drivetrain() -> (Drivetrain, [SimHandle; 4]) {
        sim_drivetrain_with(&SwerveConfig::default(), |_, _| {})
    }

    fn velocity(drive: DriveCommand) -> f64 {
        match drive {
            DriveCommand::Velocity(v) => v,
            DriveCommand::Output(o) => panic!("expected velocity command, got output {}", o),
        }
    }

    fn outputs(drivetrain: &Drivetrain) -> Vec<crate::swerve::module::ModuleOutput> {
        ModuleLocation::ALL
            .iter()
            .map(|&l| drivetrain.module(l).last_output())
            .collect()
    }

    #[test]
    fn test_new_rejects_duplicate_ids() {
        let mut config = SwerveConfig::default();
        config.modules[1].calibration.drive_motor_id = config.modules[0].calibration.steer_motor_id;
        let hardware = config
            .modules
            .each_ref()
            .map(|m| SimModule::new(&m.calibration, SimParams::default()).into_hardware());
        assert!(matches!(
            Drivetrain::new(&config, hardware),
            Err(ConfigError::DuplicateMotorId { .. })
        ));
    }

    #[test]
    fn test_forward_drive() {
        let (mut drivetrain, _) = sim_drivetrain();
        drivetrain.drive(ChassisSpeeds::new(1.0, 0.0, 0.0), false, false);

        for output in outputs(&drivetrain) {
            assert!((velocity(output.drive) - 1.0).abs() < 1e-9);
            assert!(output.target.angle.abs() < 1e-9);
        }
    }

    #[test]
    fn test_field_centric_rotates_command() {
        let (mut drivetrain, _) = sim_drivetrain();
        drivetrain.reset_pose(ChassisPose::new(0.0, 0.0, 30.0));

        // Field forward while turned 30 deg left is 30 deg right of chassis forward
        drivetrain.drive(ChassisSpeeds::new(1.0, 0.0, 0.0), true, false);
        for output in outputs(&drivetrain) {
            assert!((velocity(output.drive) - 1.0).abs() < 1e-9);
            assert!((output.target.angle - -30.0).abs() < 1e-6);
        }

        // Robot-centric ignores the heading
        drivetrain.drive(ChassisSpeeds::new(1.0, 0.0, 0.0), false, false);
        for output in outputs(&drivetrain) {
            assert!(wrap_degrees(output.target.angle).abs() < 1e-6);
        }
    }

    #[test]
    fn test_speeds_normalized_by_common_factor() {
        let (mut drivetrain, _) = sim_drivetrain();
        let command = ChassisSpeeds::new(3.0, 0.0, 180.0);

        let raw = drivetrain.kinematics().to_module_states(command);
        let highest = raw.iter().map(|s| s.speed).fold(0.0, f64::max);
        assert!(highest > 3.0);

        drivetrain.drive(command, false, false);
        let commanded: Vec<f64> = outputs(&drivetrain).iter().map(|o| velocity(o.drive).abs()).collect();

        let max = commanded.iter().cloned().fold(0.0, f64::max);
        assert!((max - 3.0).abs() < 1e-9);
        for (speed, state) in commanded.iter().zip(raw.iter()) {
            assert!((speed - state.speed * 3.0 / highest).abs() < 1e-9);
        }
    }

    #[test]
    fn test_field_rotation_happens_before_normalization() {
        let (mut field, _) = sim_drivetrain();
        let (mut robot, _) = sim_drivetrain();
        field.reset_pose(ChassisPose::new(0.0, 0.0, 90.0));
        robot.reset_pose(ChassisPose::new(0.0, 0.0, 90.0));

        field.drive(ChassisSpeeds::new(3.0, 0.0, 180.0), true, false);
        robot.drive(ChassisSpeeds::new(0.0, -3.0, 180.0), false, false);

        for (a, b) in outputs(&field).iter().zip(outputs(&robot).iter()) {
            assert!((velocity(a.drive) - velocity(b.drive)).abs() < 1e-9);
            assert!((a.target.angle - b.target.angle).abs() < 1e-6);
        }
    }

    #[test]
    fn test_set_module_states_desaturates() {
        let (mut drivetrain, _) = sim_drivetrain();
        let states = [
            ModuleState::new(6.0, 0.0),
            ModuleState::new(3.0, 0.0),
            ModuleState::new(1.5, 0.0),
            ModuleState::new(0.0, 0.0),
        ];
        drivetrain.set_module_states(states, true);

        let drives: Vec<DriveCommand> = outputs(&drivetrain).iter().map(|o| o.drive).collect();
        assert_eq!(drives[0], DriveCommand::Output(1.0));
        assert_eq!(drives[1], DriveCommand::Output(0.5));
        assert_eq!(drives[2], DriveCommand::Output(0.25));
        assert_eq!(drives[3], DriveCommand::Output(0.0));
    }

    #[test]
    fn test_faulted_module_held_at_neutral() {
        let (mut drivetrain, _) =
            sim_drivetrain_with(&SwerveConfig::default(), |i, h| {
                if i == 2 {
                    h.update(|s| s.fail_configure = true);
                }
            });
        assert!(drivetrain.module_statuses()[2].is_faulted());

        drivetrain.drive(ChassisSpeeds::new(1.0, 0.0, 0.0), false, false);
        let outputs = outputs(&drivetrain);
        assert_eq!(outputs[2].drive, DriveCommand::Output(0.0));
        for i in [0, 1, 3] {
            assert!((velocity(outputs[i].drive) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_odometry_straight_line() {
        let config = SwerveConfig::default();
        let (mut drivetrain, handles) = sim_drivetrain();
        let revs = 1.25 / config.conversions().drive_meters_per_rev;

        for handle in &handles {
            handle.update(|s| s.drive_revs = revs);
        }
        drivetrain.sample();
        let pose = drivetrain.update_odometry();

        assert!((pose.x - 1.25).abs() < 1e-9);
        assert!(pose.y.abs() < 1e-9);
        assert!(pose.heading.abs() < 1e-9);
    }

    #[test]
    fn test_odometry_survives_sensor_fault() {
        let config = SwerveConfig::default();
        let (mut drivetrain, handles) = sim_drivetrain();
        let revs = 1.0 / config.conversions().drive_meters_per_rev;

        handles[1].update(|s| s.fail_reads = true);
        for handle in &handles {
            handle.update(|s| s.drive_revs = revs);
        }
        drivetrain.sample();
        let pose = drivetrain.update_odometry();

        assert!(drivetrain.module_statuses()[1].sensor_fault);
        assert_eq!(drivetrain.module_positions()[1].distance, 0.0);
        // Three of four modules moved, the estimate still advances
        assert!(pose.x > 0.0 && pose.x < 1.0);
    }

    #[test]
    fn test_blind_module_goes_quiet_while_others_drive() {
        let (mut drivetrain, handles) = sim_drivetrain();
        handles[1].update(|s| s.fail_reads = true);
        let steer_before = handles[1].state().steer_revs;

        for _ in 0..50 {
            drivetrain.sample();
            drivetrain.update_odometry();
            drivetrain.drive(ChassisSpeeds::new(1.0, 0.5, 30.0), false, false);
        }

        let outputs = outputs(&drivetrain);
        assert_eq!(outputs[1].drive, DriveCommand::Output(0.0));
        assert_eq!(outputs[1].steer_volts, 0.0);
        assert_eq!(handles[1].state().steer_revs, steer_before);
        for i in [0, 2, 3] {
            assert!(velocity(outputs[i].drive) > 0.0);
        }
    }

    #[test]
    fn test_odometry_follows_simulated_drive() {
        let (mut drivetrain, _) = sim_drivetrain();

        // 50 ticks of 1 m/s closed-loop forward: about one meter
        for _ in 0..50 {
            drivetrain.sample();
            drivetrain.update_odometry();
            drivetrain.drive(ChassisSpeeds::new(1.0, 0.0, 0.0), false, false);
        }
        drivetrain.sample();
        let pose = drivetrain.update_odometry();

        assert!((pose.x - 1.0).abs() < 1e-6, "x = {}", pose.x);
        assert!(pose.y.abs() < 1e-6);
        assert!((drivetrain.chassis_speeds().vx - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_lock_forms_x() {
        let (mut drivetrain, _) = sim_drivetrain();
        drivetrain.lock();

        for (output, angle) in outputs(&drivetrain).iter().zip([45.0, -45.0, -45.0, 45.0]) {
            assert_eq!(output.drive, DriveCommand::Output(0.0));
            assert!(wrap_degrees(output.target.angle - angle).abs() < 1e-9);
            assert!(output.steer_volts != 0.0);
        }
    }

    #[test]
    fn test_reset_pose_discards_unsampled_motion() {
        let config = SwerveConfig::default();
        let (mut drivetrain, handles) = sim_drivetrain();
        let revs = 0.4 / config.conversions().drive_meters_per_rev;

        // Wheels moved since the last tick, then the pose is reset
        for handle in &handles {
            handle.update(|s| s.drive_revs = revs);
        }
        drivetrain.reset_pose(ChassisPose::new(5.0, 0.0, 0.0));

        drivetrain.sample();
        let pose = drivetrain.update_odometry();
        assert!((pose.x - 5.0).abs() < 1e-9, "x = {}", pose.x);
    }

    #[test]
    fn test_reset_heading_keeps_position() {
        let (mut drivetrain, _) = sim_drivetrain();
        drivetrain.reset_pose(ChassisPose::new(2.0, -1.0, 37.0));
        drivetrain.reset_heading();
        assert_eq!(drivetrain.pose(), ChassisPose::new(2.0, -1.0, 0.0));
    }

    #[test]
    fn test_reset_encoders_keeps_pose() {
        let config = SwerveConfig::default();
        let (mut drivetrain, handles) = sim_drivetrain();
        let revs = 0.5 / config.conversions().drive_meters_per_rev;
        for handle in &handles {
            handle.update(|s| s.drive_revs = revs);
        }
        drivetrain.sample();
        let before = drivetrain.update_odometry();

        drivetrain.reset_encoders();
        drivetrain.sample();
        let after = drivetrain.update_odometry();

        assert!(drivetrain.module_positions().iter().all(|p| p.distance == 0.0));
        assert!((after.x - before.x).abs() < 1e-9);
    }

    #[test]
    fn test_stop_zeroes_drive() {
        let (mut drivetrain, _) = sim_drivetrain();
        drivetrain.drive(ChassisSpeeds::new(1.0, 1.0, 0.0), false, true);
        drivetrain.stop();
        for output in outputs(&drivetrain) {
            assert_eq!(output.drive, DriveCommand::Output(0.0));
            assert!((output.target.angle - 45.0).abs() < 1e-6);
        }
    }
}
