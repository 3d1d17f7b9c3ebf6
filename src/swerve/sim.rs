// Simulated module hardware
//
// Each command advances the simulated encoders by one loop period, which
// matches the runtime calling every actuator exactly once per tick.
// A SimHandle shares the device state so callers can inspect commands,
// move sensors and inject faults.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::hardware::{AbsoluteEncoder, DriveMotor, HardwareError, ModuleHardware, MotorConfig, Result, SteerMotor};
use crate::config::ModuleCalibration;

/// Physical constants of the simulated module
#[derive(Debug, Clone, Copy)]
pub struct SimParams {
    /// Seconds advanced per command
    pub period: f64,
    /// Drive motor speed at full output
    pub drive_free_rpm: f64,
    /// Steer motor speed at full supply voltage
    pub steer_free_rpm: f64,
    pub supply_voltage: f64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            period: 0.02,
            drive_free_rpm: 5600.0,
            steer_free_rpm: 5600.0,
            supply_voltage: 12.6,
        }
    }
}

/// Shared state of one simulated module
#[derive(Debug, Clone, Default)]
pub struct SimModuleState {
    pub drive_revs: f64,
    pub drive_rpm: f64,
    pub steer_revs: f64,
    pub absolute_angle: f64,
    pub bus_voltage: f64,

    pub drive_config: Option<MotorConfig>,
    pub steer_config: Option<MotorConfig>,
    /// Last open-loop output, if the last drive command was open loop
    pub drive_output: Option<f64>,
    /// Last velocity target in RPM, if the last drive command was closed loop
    pub drive_target_rpm: Option<f64>,
    pub steer_volts: f64,

    pub fail_configure: bool,
    pub fail_absolute: bool,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

/// Cloneable view into a simulated module
#[derive(Debug, Clone, Default)]
pub struct SimHandle(Arc<Mutex<SimModuleState>>);

impl SimHandle {
    fn lock(&self) -> MutexGuard<'_, SimModuleState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current device state
    pub fn state(&self) -> SimModuleState {
        self.lock().clone()
    }

    /// Mutate the device state (move sensors, inject faults)
    pub fn update<R>(&self, f: impl FnOnce(&mut SimModuleState) -> R) -> R {
        f(&mut self.lock())
    }
}

/// A full simulated module: drive, steer and absolute encoder
pub struct SimModule {
    handle: SimHandle,
    params: SimParams,
    ids: [u8; 3],
}

impl SimModule {
    /// Module physically pointing forward, so calibration yields heading 0
    pub fn new(calibration: &ModuleCalibration, params: SimParams) -> Self {
        let handle = SimHandle::default();
        handle.update(|s| {
            s.absolute_angle = calibration.angle_offset;
            s.bus_voltage = params.supply_voltage;
        });

        Self {
            handle,
            params,
            ids: [
                calibration.drive_motor_id,
                calibration.steer_motor_id,
                calibration.absolute_encoder_id,
            ],
        }
    }

    pub fn handle(&self) -> SimHandle {
        self.handle.clone()
    }

    /// Split into the boxed devices a module controller owns
    pub fn into_hardware(self) -> ModuleHardware {
        let [drive_id, steer_id, encoder_id] = self.ids;
        ModuleHardware::new(
            SimDriveMotor {
                id: drive_id,
                handle: self.handle.clone(),
                params: self.params,
            },
            SimSteerMotor {
                id: steer_id,
                handle: self.handle.clone(),
                params: self.params,
            },
            SimAbsoluteEncoder {
                id: encoder_id,
                handle: self.handle,
            },
        )
    }
}

fn check(fail: bool, id: u8) -> Result<()> {
    if fail {
        Err(HardwareError::Timeout { device: id })
    } else {
        Ok(())
    }
}

fn check_finite(value: f64, id: u8) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(HardwareError::Rejected {
            device: id,
            reason: format!("non-finite setpoint {}", value),
        })
    }
}

pub struct SimDriveMotor {
    id: u8,
    handle: SimHandle,
    params: SimParams,
}

impl SimDriveMotor {
    fn advance(&self, s: &mut SimModuleState, rpm: f64) {
        s.drive_rpm = rpm;
        s.drive_revs += rpm / 60.0 * self.params.period;
    }
}

impl DriveMotor for SimDriveMotor {
    fn configure(&mut self, config: &MotorConfig) -> Result<()> {
        let mut s = self.handle.lock();
        if s.fail_configure {
            return Err(HardwareError::Disconnected { device: self.id });
        }
        s.drive_config = Some(*config);
        Ok(())
    }

    fn set_output(&mut self, fraction: f64) -> Result<()> {
        let mut s = self.handle.lock();
        check(s.fail_writes, self.id)?;
        check_finite(fraction, self.id)?;
        let fraction = fraction.clamp(-1.0, 1.0);
        s.drive_output = Some(fraction);
        s.drive_target_rpm = None;
        self.advance(&mut s, fraction * self.params.drive_free_rpm);
        Ok(())
    }

    fn set_velocity(&mut self, rpm: f64) -> Result<()> {
        let mut s = self.handle.lock();
        check(s.fail_writes, self.id)?;
        check_finite(rpm, self.id)?;
        let rpm = rpm.clamp(-self.params.drive_free_rpm, self.params.drive_free_rpm);
        s.drive_output = None;
        s.drive_target_rpm = Some(rpm);
        self.advance(&mut s, rpm);
        Ok(())
    }

    fn position(&mut self) -> Result<f64> {
        let s = self.handle.lock();
        check(s.fail_reads, self.id)?;
        Ok(s.drive_revs)
    }

    fn velocity(&mut self) -> Result<f64> {
        let s = self.handle.lock();
        check(s.fail_reads, self.id)?;
        Ok(s.drive_rpm)
    }

    fn set_position(&mut self, revolutions: f64) -> Result<()> {
        let mut s = self.handle.lock();
        check(s.fail_writes, self.id)?;
        s.drive_revs = revolutions;
        Ok(())
    }
}

pub struct SimSteerMotor {
    id: u8,
    handle: SimHandle,
    params: SimParams,
}

impl SteerMotor for SimSteerMotor {
    fn configure(&mut self, config: &MotorConfig) -> Result<()> {
        let mut s = self.handle.lock();
        if s.fail_configure {
            return Err(HardwareError::Disconnected { device: self.id });
        }
        s.steer_config = Some(*config);
        Ok(())
    }

    fn set_voltage(&mut self, volts: f64) -> Result<()> {
        let mut s = self.handle.lock();
        check(s.fail_writes, self.id)?;
        check_finite(volts, self.id)?;
        let volts = volts.clamp(-s.bus_voltage, s.bus_voltage);
        s.steer_volts = volts;
        if s.bus_voltage > 0.0 {
            let rpm = volts / s.bus_voltage * self.params.steer_free_rpm;
            s.steer_revs += rpm / 60.0 * self.params.period;
        }
        Ok(())
    }

    fn position(&mut self) -> Result<f64> {
        let s = self.handle.lock();
        check(s.fail_reads, self.id)?;
        Ok(s.steer_revs)
    }

    fn set_position(&mut self, revolutions: f64) -> Result<()> {
        let mut s = self.handle.lock();
        check(s.fail_writes, self.id)?;
        s.steer_revs = revolutions;
        Ok(())
    }

    fn bus_voltage(&mut self) -> Result<f64> {
        let s = self.handle.lock();
        check(s.fail_reads, self.id)?;
        Ok(s.bus_voltage)
    }
}

pub struct SimAbsoluteEncoder {
    id: u8,
    handle: SimHandle,
}

impl AbsoluteEncoder for SimAbsoluteEncoder {
    fn absolute_angle(&mut self) -> Result<f64> {
        let s = self.handle.lock();
        if s.fail_absolute {
            return Err(HardwareError::Disconnected { device: self.id });
        }
        Ok(s.absolute_angle)
    }
}
