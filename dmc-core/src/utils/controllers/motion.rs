//! Open-loop timed motions on top of [`Drv8830`].
//!
//! Nothing here measures the shaft. Rotations are a drive, a settle window, a fault check and
//! a timed wait; ramps step the speed along the wall clock.

use core::fmt::Debug;

use embedded_hal::i2c::I2c;
use serde::Serialize;

use super::drv8830::{Direction, DriverError, Drv8830, FaultStatus};
use crate::utils::{
    clock::Clock,
    math::calibration::{angle_factor, angle_to_duration_ms, ramp_target},
};

/// Timing constants for the timed motions, tuned for the sorter's geared motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionProfile {
    /// Wait after the initial standby before the first fault check.
    pub init_settle_ms: u32,
    /// Rotations below this speed stall the motor and are rejected.
    pub min_rotate_speed: u8,
    /// Settle window of `rotate_for_duration`, also its shortest accepted duration.
    pub duration_settle_ms: u32,
    /// Settle window of `rotate_by_angle`, also its shortest accepted duration.
    pub angle_settle_ms: u32,
    /// Speed of the reverse pulse after a fault.
    pub recovery_speed: u8,
    /// Length of the reverse pulse after a fault.
    pub recovery_ms: u32,
    /// Time between speed updates of a ramp.
    pub ramp_step_ms: u32,
    /// Pause after each brake while shaking.
    pub shake_gap_ms: u32,
    /// Give up a rotation after this many fault retries. `None` retries forever.
    pub max_fault_retries: Option<u32>,
}

impl Default for MotionProfile {
    fn default() -> Self {
        MotionProfile {
            init_settle_ms: 10,
            min_rotate_speed: 15,
            duration_settle_ms: 100,
            angle_settle_ms: 350,
            recovery_speed: 60,
            recovery_ms: 30,
            ramp_step_ms: 300,
            shake_gap_ms: 10,
            max_fault_retries: None,
        }
    }
}

/// Result of a timed rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    /// The motor ran for `duration_ms` and was braked.
    Completed { duration_ms: u32, fault_retries: u32 },
    /// Rejected without motion: the speed cannot turn the motor.
    SpeedTooLow { speed: u8 },
    /// Rejected without motion: the duration is shorter than the settle window.
    TooShort { duration_ms: u32, min_ms: u32 },
}

impl Rotation {
    pub fn completed(&self) -> bool {
        matches!(self, Rotation::Completed { .. })
    }
}

impl<I2C, C, E> Drv8830<I2C, C>
where
    I2C: I2c<Error = E>,
    C: Clock,
    E: Debug,
{
    /// Drive for `duration_ms` at `speed`, then brake.
    ///
    /// After each settle window a fault triggers a short reverse pulse and another attempt;
    /// the full duration only starts counting once a settle window passes without a fault.
    pub fn rotate_for_duration(
        &mut self,
        direction: Direction,
        speed: u8,
        duration_ms: u32,
    ) -> Result<Rotation, DriverError<E>> {
        let settle_ms = self.profile().duration_settle_ms;
        if let Some(rejected) = self.screen(speed, duration_ms, settle_ms) {
            return Ok(rejected);
        }

        tracing::info!(address = self.address(), duration_ms, speed, "rotate for duration");
        self.run_timed(direction, speed, duration_ms, settle_ms)
    }

    /// Turn by roughly `degrees` using the sorter motor's speed/time calibration.
    pub fn rotate_by_angle(
        &mut self,
        direction: Direction,
        speed: u8,
        degrees: u32,
    ) -> Result<Rotation, DriverError<E>> {
        let settle_ms = self.profile().angle_settle_ms;
        let duration_ms = if speed < self.profile().min_rotate_speed {
            0
        } else {
            angle_to_duration_ms(speed, degrees).unwrap_or(0)
        };
        if let Some(rejected) = self.screen(speed, duration_ms, settle_ms) {
            return Ok(rejected);
        }

        tracing::info!(
            address = self.address(),
            duration_ms,
            speed,
            degrees,
            k = angle_factor(speed),
            "rotate by angle"
        );
        self.run_timed(direction, speed, duration_ms, settle_ms)
    }

    /// Ramp linearly from `from` to `to` over `total_ms`, one drive per `ramp_step_ms`.
    ///
    /// Stops stepping once more than `total_ms + ramp_step_ms` has elapsed and finishes with a
    /// drive at exactly `to`, whose fault status is returned.
    pub fn ramp_speed(
        &mut self,
        direction: Direction,
        from: u8,
        to: u8,
        total_ms: u32,
    ) -> Result<FaultStatus, DriverError<E>> {
        let step_ms = self.profile().ramp_step_ms.max(1);
        let limit = u64::from(total_ms) + u64::from(step_ms);
        let start = self.clock().now_ms();

        tracing::info!(address = self.address(), from, to, total_ms, "ramp");
        loop {
            let elapsed = self.clock().now_ms().saturating_sub(start);
            if elapsed > limit {
                break;
            }
            let speed = ramp_target(from, to, elapsed, total_ms);
            tracing::debug!(elapsed, speed, "ramp step");
            self.drive(direction, speed)?;
            self.clock().sleep_ms(step_ms);
        }
        self.drive(direction, to)
    }

    /// Rock the motor back and forth `count` times to loosen a card.
    pub fn shake(
        &mut self,
        direction: Direction,
        speed: u8,
        count: u16,
        forward_ms: u32,
        back_ms: u32,
    ) -> Result<(), DriverError<E>> {
        let gap_ms = self.profile().shake_gap_ms;
        for _ in 0..count {
            self.drive(direction, speed)?;
            self.clock().sleep_ms(forward_ms);
            self.brake()?;
            self.clock().sleep_ms(gap_ms);
            self.drive(direction.opposite(), speed)?;
            self.clock().sleep_ms(back_ms);
            self.brake()?;
            self.clock().sleep_ms(gap_ms);
        }
        Ok(())
    }

    /// Drive for `ms`, then coast.
    pub fn pulse(
        &mut self,
        direction: Direction,
        speed: u8,
        ms: u32,
    ) -> Result<FaultStatus, DriverError<E>> {
        self.drive(direction, speed)?;
        self.clock().sleep_ms(ms);
        self.coast()
    }

    fn screen(
        &self,
        speed: u8,
        duration_ms: u32,
        settle_ms: u32,
    ) -> Option<Rotation> {
        if speed < self.profile().min_rotate_speed {
            tracing::warn!(duration_ms, speed, "speed too small: increase speed");
            return Some(Rotation::SpeedTooLow { speed });
        }
        if duration_ms < settle_ms {
            tracing::warn!(duration_ms, speed, "time too small: reduce speed");
            return Some(Rotation::TooShort {
                duration_ms,
                min_ms: settle_ms,
            });
        }
        None
    }

    fn run_timed(
        &mut self,
        direction: Direction,
        speed: u8,
        duration_ms: u32,
        settle_ms: u32,
    ) -> Result<Rotation, DriverError<E>> {
        let mut fault_retries = 0u32;
        loop {
            self.drive(direction, speed)?;
            self.clock().sleep_ms(settle_ms);
            if !self.check_fault("post move")?.is_fault() {
                break;
            }

            if let Some(max) = self.profile().max_fault_retries {
                if fault_retries >= max {
                    self.brake()?;
                    return Err(DriverError::FaultRetriesExhausted {
                        address: self.address(),
                        retries: fault_retries,
                    });
                }
            }
            fault_retries += 1;
            tracing::warn!(address = self.address(), fault_retries, "reversing after fault");
            let recovery_speed = self.profile().recovery_speed;
            self.drive(direction.opposite(), recovery_speed)?;
            self.clock().sleep_ms(self.profile().recovery_ms);
        }

        if duration_ms > settle_ms {
            self.clock().sleep_ms(duration_ms - settle_ms);
        }
        self.brake()?;
        Ok(Rotation::Completed {
            duration_ms,
            fault_retries,
        })
    }
}
