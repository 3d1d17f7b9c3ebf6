// Pose estimation from module distances
//
// Each update takes the distance each module has driven since the previous
// sample, solves the chassis twist with the inverse kinematics and
// integrates it along a constant-curvature arc.

use super::kinematics::SwerveKinematics;
use super::state::{ChassisPose, ModulePosition};

#[derive(Debug, Clone)]
pub struct SwerveOdometry {
    kinematics: SwerveKinematics,
    pose: ChassisPose,
    previous: [ModulePosition; 4],
}

impl SwerveOdometry {
    pub fn new(kinematics: SwerveKinematics, positions: [ModulePosition; 4], pose: ChassisPose) -> Self {
        Self {
            kinematics,
            pose,
            previous: positions,
        }
    }

    pub fn pose(&self) -> ChassisPose {
        self.pose
    }

    /// Integrate the displacement since the last call and return the new pose
    pub fn update(&mut self, positions: [ModulePosition; 4]) -> ChassisPose {
        let deltas: [ModulePosition; 4] = std::array::from_fn(|i| {
            ModulePosition::new(positions[i].distance - self.previous[i].distance, positions[i].angle)
        });

        let twist = self.kinematics.to_twist(&deltas);
        self.pose = self.pose.exp(twist);
        self.previous = positions;
        self.pose
    }

    /// Overwrite the pose and take `positions` as the new baseline
    pub fn reset(&mut self, pose: ChassisPose, positions: [ModulePosition; 4]) {
        self.pose = pose;
        self.previous = positions;
    }

    /// Overwrite only the heading, keeping the integrated position
    pub fn reset_heading(&mut self, heading: f64) {
        self.pose.heading = heading;
    }
}
