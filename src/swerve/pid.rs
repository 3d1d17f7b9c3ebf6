// Discrete PID controller for the steering loop
//
// The drive loop is closed inside the motor controller, so this is only used
// to turn a heading error into a steering output.

use serde::{Deserialize, Serialize};

/// PID gains
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

/// PID controller sampled at a fixed period
#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    period: f64,
    /// Bound on the integral term's contribution to the output
    integral_limit: f64,
    total_error: f64,
    prev_error: f64,
    has_measurement: bool,
}

impl PidController {
    /// Create a controller with gains and a loop period in seconds
    pub fn new(gains: PidGains, period: f64) -> Self {
        Self {
            gains,
            period,
            integral_limit: 1.0,
            total_error: 0.0,
            prev_error: 0.0,
            has_measurement: false,
        }
    }

    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = limit.abs();
        self
    }

    /// Compute the next output for `measurement` tracking `setpoint`
    pub fn calculate(&mut self, measurement: f64, setpoint: f64) -> f64 {
        let error = setpoint - measurement;

        let derivative = if self.has_measurement && self.period > 0.0 {
            (error - self.prev_error) / self.period
        } else {
            0.0
        };

        self.total_error += error * self.period;
        if self.gains.ki != 0.0 {
            // Anti-windup: the integral term alone never exceeds integral_limit
            let bound = self.integral_limit / self.gains.ki.abs();
            self.total_error = self.total_error.clamp(-bound, bound);
        }

        self.prev_error = error;
        self.has_measurement = true;

        self.gains.kp * error + self.gains.ki * self.total_error + self.gains.kd * derivative
    }

    /// Clear accumulated integral and derivative history
    pub fn reset(&mut self) {
        self.total_error = 0.0;
        self.prev_error = 0.0;
        self.has_measurement = false;
    }
}
