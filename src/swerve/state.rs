// Module and chassis state types shared by the module controllers,
// kinematics and odometry.
//
// Angles are in degrees, linear speeds in m/s, angular rates in deg/s.

use serde::{Deserialize, Serialize};

/// Fixed module ordering used everywhere a 4-element module array appears
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleLocation {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl ModuleLocation {
    pub const ALL: [ModuleLocation; 4] = [
        ModuleLocation::FrontLeft,
        ModuleLocation::FrontRight,
        ModuleLocation::RearLeft,
        ModuleLocation::RearRight,
    ];

    pub fn index(self) -> usize {
        match self {
            ModuleLocation::FrontLeft => 0,
            ModuleLocation::FrontRight => 1,
            ModuleLocation::RearLeft => 2,
            ModuleLocation::RearRight => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModuleLocation::FrontLeft => "front_left",
            ModuleLocation::FrontRight => "front_right",
            ModuleLocation::RearLeft => "rear_left",
            ModuleLocation::RearRight => "rear_right",
        }
    }
}

impl std::fmt::Display for ModuleLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Speed and direction of one module (target or measurement)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    /// Signed wheel speed in m/s
    pub speed: f64,
    /// Wheel direction in degrees, not wrapped to any canonical range
    pub angle: f64,
}

impl ModuleState {
    pub fn new(speed: f64, angle: f64) -> Self {
        Self { speed, angle }
    }

    /// Pick whichever of `angle` and `angle + 180°` is the shorter turn from
    /// `current` and flip the speed sign when the reversed direction wins.
    ///
    /// `current` is the unbounded steering accumulator, so the returned angle
    /// is expressed in the same revolution as `current` and never lies more
    /// than 90° away from it. A target exactly 90° away is kept unflipped.
    pub fn optimize(self, current: f64) -> ModuleState {
        let mut angle = place_in_scope(current, self.angle);
        let mut speed = self.speed;
        let delta = angle - current;

        if delta > 90.0 {
            angle -= 180.0;
            speed = -speed;
        } else if delta < -90.0 {
            angle += 180.0;
            speed = -speed;
        }

        ModuleState { speed, angle }
    }
}

/// Cumulative distance and direction of one module, used for odometry
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModulePosition {
    /// Distance driven in meters since the last reset
    pub distance: f64,
    /// Wheel direction in degrees
    pub angle: f64,
}

impl ModulePosition {
    pub fn new(distance: f64, angle: f64) -> Self {
        Self { distance, angle }
    }
}

/// Chassis velocity command
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChassisSpeeds {
    /// Forward velocity in m/s
    pub vx: f64,
    /// Leftward velocity in m/s
    pub vy: f64,
    /// Counter-clockwise rotation in deg/s
    pub omega: f64,
}

impl ChassisSpeeds {
    pub fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    /// Convert a field-frame command into the chassis frame by rotating the
    /// translation through the negated chassis heading.
    pub fn from_field_relative(field: ChassisSpeeds, heading: f64) -> ChassisSpeeds {
        let (sin, cos) = (-heading).to_radians().sin_cos();
        ChassisSpeeds {
            vx: field.vx * cos - field.vy * sin,
            vy: field.vx * sin + field.vy * cos,
            omega: field.omega,
        }
    }
}

/// Chassis-frame displacement over one odometry step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Twist {
    /// Forward displacement in meters
    pub dx: f64,
    /// Leftward displacement in meters
    pub dy: f64,
    /// Counter-clockwise rotation in degrees
    pub dtheta: f64,
}

impl Twist {
    pub fn new(dx: f64, dy: f64, dtheta: f64) -> Self {
        Self { dx, dy, dtheta }
    }
}

/// Planar chassis pose
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChassisPose {
    pub x: f64,
    pub y: f64,
    /// Heading in degrees, counter-clockwise positive
    pub heading: f64,
}

impl ChassisPose {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading }
    }

    /// Apply a chassis-frame twist assuming constant curvature over the step
    pub fn exp(&self, twist: Twist) -> ChassisPose {
        let Twist { dx, dy, dtheta } = twist;
        let dtheta = dtheta.to_radians();
        let (sin_theta, cos_theta) = dtheta.sin_cos();

        let (s, c) = if dtheta.abs() < 1e-9 {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (sin_theta / dtheta, (1.0 - cos_theta) / dtheta)
        };

        // Displacement in the chassis frame at the start of the step
        let local_x = dx * s - dy * c;
        let local_y = dx * c + dy * s;

        let (sin_h, cos_h) = self.heading.to_radians().sin_cos();
        ChassisPose {
            x: self.x + local_x * cos_h - local_y * sin_h,
            y: self.y + local_x * sin_h + local_y * cos_h,
            heading: wrap_degrees(self.heading + dtheta.to_degrees()),
        }
    }
}

/// Wrap an angle into [-180, 180)
pub fn wrap_degrees(angle: f64) -> f64 {
    (angle + 180.0).rem_euclid(360.0) - 180.0
}

/// Shift `target` by whole turns so it lies in [reference - 180, reference + 180)
pub fn place_in_scope(reference: f64, target: f64) -> f64 {
    reference + wrap_degrees(target - reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn same_direction(a: f64, b: f64) -> bool {
        wrap_degrees(a - b).abs() < 1e-6
    }

    #[test]
    fn test_wrap_degrees() {
        assert!((wrap_degrees(190.0) - -170.0).abs() < EPS);
        assert!((wrap_degrees(-190.0) - 170.0).abs() < EPS);
        assert!((wrap_degrees(720.0)).abs() < EPS);
        assert!((wrap_degrees(180.0) - -180.0).abs() < EPS);
    }

    #[test]
    fn test_optimize_flips_reversed_target() {
        // 200° is 190° away from 10°, flipping to 20° is only 10° away
        let optimized = ModuleState::new(-1.0, 200.0).optimize(10.0);
        assert!((optimized.speed - 1.0).abs() < EPS);
        assert!((optimized.angle - 20.0).abs() < EPS);
    }

    #[test]
    fn test_optimize_keeps_close_target() {
        let optimized = ModuleState::new(2.0, 30.0).optimize(0.0);
        assert!((optimized.speed - 2.0).abs() < EPS);
        assert!((optimized.angle - 30.0).abs() < EPS);
    }

    #[test]
    fn test_optimize_follows_unbounded_accumulator() {
        // Steering accumulator has wound up past a full turn
        let optimized = ModuleState::new(1.0, 10.0).optimize(725.0);
        assert!((optimized.angle - 730.0).abs() < EPS);
        assert!((optimized.speed - 1.0).abs() < EPS);
    }

    #[test]
    fn test_optimize_tie_is_not_flipped() {
        let optimized = ModuleState::new(1.0, 90.0).optimize(0.0);
        assert!((optimized.angle - 90.0).abs() < EPS);
        assert!((optimized.speed - 1.0).abs() < EPS);

        let optimized = ModuleState::new(1.0, -90.0).optimize(0.0);
        assert!((optimized.angle - -90.0).abs() < EPS);
        assert!((optimized.speed - 1.0).abs() < EPS);
    }

    #[test]
    fn test_optimize_never_turns_more_than_90_degrees() {
        let mut current = -540.0;
        while current <= 540.0 {
            let mut target = -360.0;
            while target <= 360.0 {
                let request = ModuleState::new(1.5, target);
                let optimized = request.optimize(current);

                assert!(
                    (optimized.angle - current).abs() <= 90.0 + EPS,
                    "turn from {} to {} too large: {}",
                    current,
                    target,
                    optimized.angle
                );

                // Same wheel vector as the request
                if optimized.speed > 0.0 {
                    assert!(same_direction(optimized.angle, target));
                } else {
                    assert!((optimized.speed + 1.5).abs() < EPS);
                    assert!(same_direction(optimized.angle + 180.0, target));
                }
                target += 7.5;
            }
            current += 13.0;
        }
    }

    #[test]
    fn test_field_relative_rotation() {
        // Facing left on the field, "field forward" is to the chassis' right
        let speeds = ChassisSpeeds::from_field_relative(ChassisSpeeds::new(1.0, 0.0, 0.0), 90.0);
        assert!(speeds.vx.abs() < 1e-9);
        assert!((speeds.vy - -1.0).abs() < 1e-9);
        assert_eq!(speeds.omega, 0.0);
    }

    #[test]
    fn test_pose_exp_straight_line() {
        let pose = ChassisPose::new(1.0, 2.0, 90.0).exp(Twist::new(0.5, 0.0, 0.0));
        assert!((pose.x - 1.0).abs() < 1e-9);
        assert!((pose.y - 2.5).abs() < 1e-9);
        assert!((pose.heading - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_pose_exp_quarter_arc() {
        // Driving a quarter circle of radius 1 to the left
        let arc = std::f64::consts::FRAC_PI_2;
        let pose = ChassisPose::default().exp(Twist::new(arc, 0.0, 90.0));
        assert!((pose.x - 1.0).abs() < 1e-9);
        assert!((pose.y - 1.0).abs() < 1e-9);
        assert!((pose.heading - 90.0).abs() < 1e-9);
    }
}
