// Swerve kinematics for a 4-module chassis
// Converts chassis velocities (vx, vy, omega) to per-module speed/angle and back.
//
// Each module at (x, y) sees the chassis velocity plus the rotational
// component omega x r:
//   vx_i = vx - omega * y
//   vy_i = vy + omega * x
// Stacking both rows for all modules gives an 8x3 matrix. The inverse
// direction uses its least-squares pseudo-inverse, built once from the
// fixed module locations.

use nalgebra::{SMatrix, SVector, Vector3};

use super::state::{ChassisSpeeds, ModulePosition, ModuleState, Twist};
use crate::config::ConfigError;

/// Module wheel speeds below this are treated as stopped when resolving an angle
const ZERO_SPEED: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct SwerveKinematics {
    locations: [[f64; 2]; 4],
    forward: SMatrix<f64, 8, 3>,
    inverse: SMatrix<f64, 3, 8>,
}

impl SwerveKinematics {
    /// Build the forward and inverse transforms from module locations
    /// ([forward, left] offsets from chassis center, in meters)
    pub fn new(locations: [[f64; 2]; 4]) -> Result<Self, ConfigError> {
        let mut forward = SMatrix::<f64, 8, 3>::zeros();

        for (i, &[x, y]) in locations.iter().enumerate() {
            // Row pair: [1, 0, -y] and [0, 1, x]
            forward[(2 * i, 0)] = 1.0;
            forward[(2 * i, 2)] = -y;
            forward[(2 * i + 1, 1)] = 1.0;
            forward[(2 * i + 1, 2)] = x;
        }

        let normal = forward.transpose() * forward;
        if normal.determinant().abs() < 1e-12 {
            return Err(ConfigError::DegenerateGeometry);
        }
        let normal_inv = normal
            .try_inverse()
            .ok_or(ConfigError::DegenerateGeometry)?;

        Ok(Self {
            locations,
            forward,
            inverse: normal_inv * forward.transpose(),
        })
    }

    pub fn locations(&self) -> [[f64; 2]; 4] {
        self.locations
    }

    /// Convert a chassis-frame velocity to module states
    ///
    /// A module with no velocity gets angle 0; the module controller holds
    /// its previous angle in that case.
    pub fn to_module_states(&self, speeds: ChassisSpeeds) -> [ModuleState; 4] {
        let chassis = Vector3::new(speeds.vx, speeds.vy, speeds.omega.to_radians());
        let module_vectors = self.forward * chassis;

        std::array::from_fn(|i| {
            let vx = module_vectors[2 * i];
            let vy = module_vectors[2 * i + 1];
            let speed = vx.hypot(vy);
            let angle = if speed > ZERO_SPEED {
                vy.atan2(vx).to_degrees()
            } else {
                0.0
            };
            ModuleState::new(speed, angle)
        })
    }

    /// Least-squares chassis velocity that best explains the module states
    pub fn to_chassis_speeds(&self, states: &[ModuleState; 4]) -> ChassisSpeeds {
        let chassis = self.solve(states.map(|s| (s.speed, s.angle)));
        ChassisSpeeds::new(chassis[0], chassis[1], chassis[2].to_degrees())
    }

    /// Least-squares chassis displacement from per-module distance deltas
    pub fn to_twist(&self, deltas: &[ModulePosition; 4]) -> Twist {
        let chassis = self.solve(deltas.map(|d| (d.distance, d.angle)));
        Twist::new(chassis[0], chassis[1], chassis[2].to_degrees())
    }

    fn solve(&self, vectors: [(f64, f64); 4]) -> Vector3<f64> {
        let mut module_vectors = SVector::<f64, 8>::zeros();
        for (i, (magnitude, angle)) in vectors.into_iter().enumerate() {
            let (sin, cos) = angle.to_radians().sin_cos();
            module_vectors[2 * i] = magnitude * cos;
            module_vectors[2 * i + 1] = magnitude * sin;
        }
        self.inverse * module_vectors
    }

    /// Scale all module speeds by a common factor so none exceeds `max_speed`
    ///
    /// Keeps the ratio between modules, so the chassis still moves along the
    /// commanded direction, only slower.
    pub fn desaturate(states: &mut [ModuleState; 4], max_speed: f64) {
        let highest = states.iter().map(|s| s.speed.abs()).fold(0.0f64, f64::max);

        if highest > max_speed {
            let scale = max_speed / highest;
            for state in states.iter_mut() {
                state.speed *= scale;
            }
        }
    }
}
