//! Module Exports
//!
//! - `drv8830`: register access and basic moves for one DRV8830
//! - `motion`: timed rotations, ramps and sorter sequences
//!
//! This file also holds the two-motor `SystemController` that executes `MotorCommand`s
//! received over `MOTOR_CHANNEL`.

/// Module for the DRV8830 I2C motor driver.
pub mod drv8830;
pub mod motion;

use core::{cell::RefCell, fmt::Debug};

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embedded_hal::i2c::I2c;
use embedded_hal_bus::i2c::RefCellDevice;
use serde::{Deserialize, Serialize};

use crate::utils::clock::Clock;
pub use drv8830::{Address, BusOp, Direction, DriverError, Drv8830, FaultStatus};
pub use motion::{MotionProfile, Rotation};

/// Channel used to receive motor commands (`MotorCommand` messages).
pub static MOTOR_CHANNEL: Channel<CriticalSectionRawMutex, MotorCommand, 16> = Channel::new();

/// One `CommandReport` per executed command, in order.
pub static REPORT_CHANNEL: Channel<CriticalSectionRawMutex, CommandReport, 16> = Channel::new();

/// The two motors of the card sorter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorId {
    /// Sorter wheel, throws cards into the baskets.
    Sorter,
    /// Eject wheel under the card stack.
    Eject,
}

/// Motor command variants.
///
/// Serialized as JSON with tag `"mc"`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "mc", rename_all = "snake_case")]
pub enum MotorCommand {
    /// Drive continuously.
    Drive { m: MotorId, d: Direction, s: u8 },
    Brake { m: MotorId },
    /// Standby / coast.
    Idle { m: MotorId },
    /// Rotate for `t` milliseconds.
    RotateFor {
        m: MotorId,
        d: Direction,
        s: u8,
        t: u32,
    },
    /// Rotate by `deg` degrees.
    RotateBy {
        m: MotorId,
        d: Direction,
        s: u8,
        deg: u32,
    },
    /// Linear ramp from `from` to `to` over `t` milliseconds.
    Ramp {
        m: MotorId,
        d: Direction,
        from: u8,
        to: u8,
        t: u32,
    },
    /// `n` shakes, `f` ms forward and `b` ms back.
    Shake {
        m: MotorId,
        d: Direction,
        s: u8,
        n: u16,
        f: u32,
        b: u32,
    },
    /// Drive for `t` ms, then coast.
    Pulse {
        m: MotorId,
        d: Direction,
        s: u8,
        t: u32,
    },
    /// Read the fault register.
    Status { m: MotorId },
    /// Pause the sequence for `t` ms.
    Wait { t: u32 },
}

/// What a successful command produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Status(FaultStatus),
    Rotation(Rotation),
    Done,
    Waited(u32),
}

/// Bus-independent summary of a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Failure {
    Bus(BusOp),
    InvalidAddress(u8),
    FaultRetriesExhausted { address: u8, retries: u32 },
    NotInitialized(MotorId),
}

impl Failure {
    /// Bus and setup failures leave a motor in an unknown state and end the program.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Failure::FaultRetriesExhausted { .. })
    }
}

impl<E: Debug> From<DriverError<E>> for Failure {
    fn from(err: DriverError<E>) -> Self {
        match err {
            DriverError::Bus { op, .. } => Failure::Bus(op),
            DriverError::InvalidAddress(address) => Failure::InvalidAddress(address),
            DriverError::FaultRetriesExhausted { address, retries } => {
                Failure::FaultRetriesExhausted { address, retries }
            }
        }
    }
}

/// Published on `REPORT_CHANNEL` after each command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandReport {
    pub command: MotorCommand,
    pub result: Result<Outcome, Failure>,
}

pub type SharedDrv<'a, I2C, C> = Drv8830<RefCellDevice<'a, I2C>, C>;

/// Sorter and eject motors sharing one I2C bus.
pub struct SystemController<'a, I2C: 'a, C> {
    i2c: &'a RefCell<I2C>,
    clock: C,
    pub sorter: Option<SharedDrv<'a, I2C, C>>,
    pub eject: Option<SharedDrv<'a, I2C, C>>,
}

impl<'a, I2C, C, E> SystemController<'a, I2C, C>
where
    I2C: I2c<Error = E> + 'a,
    C: Clock + Clone,
    E: Debug,
{
    /// Initialize both motors. A motor that fails to initialize is left out and the
    /// DRV8830 address range is scanned to help find it.
    pub fn new(
        i2c_bus: &'a RefCell<I2C>,
        clock: C,
        sorter_address: Option<u8>,
        eject_address: Option<u8>,
        profile: Option<MotionProfile>,
    ) -> Self {
        let sorter = Self::init_motor(
            i2c_bus,
            clock.clone(),
            sorter_address.unwrap_or(Address::SORTER.get()),
            profile,
        );
        let eject = Self::init_motor(
            i2c_bus,
            clock.clone(),
            eject_address.unwrap_or(Address::EJECT.get()),
            profile,
        );

        let ctrl = SystemController {
            i2c: i2c_bus,
            clock,
            sorter,
            eject,
        };
        if ctrl.sorter.is_none() || ctrl.eject.is_none() {
            ctrl.scan_bus();
        }
        ctrl
    }

    fn init_motor(
        i2c_bus: &'a RefCell<I2C>,
        clock: C,
        address: u8,
        profile: Option<MotionProfile>,
    ) -> Option<SharedDrv<'a, I2C, C>> {
        match Drv8830::init(RefCellDevice::new(i2c_bus), address, clock, profile) {
            Ok(drv) => Some(drv),
            Err(e) => {
                tracing::warn!("DRV8830 init at 0x{:02X} failed: {:?}", address, e);
                None
            }
        }
    }

    /// Scan the DRV8830 address range and log any device that acknowledges.
    pub fn scan_bus(&self) {
        let mut bus = self.i2c.borrow_mut();
        for addr in 0x60..=0x68 {
            if bus.write(addr, &[]).is_ok() {
                tracing::warn!("I2C device found at 0x{:02X}", addr);
            }
        }
    }

    pub fn motor(
        &mut self,
        id: MotorId,
    ) -> Result<&mut SharedDrv<'a, I2C, C>, Failure> {
        let slot = match id {
            MotorId::Sorter => self.sorter.as_mut(),
            MotorId::Eject => self.eject.as_mut(),
        };
        slot.ok_or(Failure::NotInitialized(id))
    }

    /// Execute one `MotorCommand` to completion.
    pub fn execute_command(
        &mut self,
        command: MotorCommand,
    ) -> Result<Outcome, Failure> {
        let result = match command {
            MotorCommand::Wait { t } => {
                self.clock.sleep_ms(t);
                return Ok(Outcome::Waited(t));
            }
            MotorCommand::Drive { m, d, s } => self.motor(m)?.drive(d, s).map(Outcome::Status),
            MotorCommand::Brake { m } => self.motor(m)?.brake().map(Outcome::Status),
            MotorCommand::Idle { m } => self.motor(m)?.idle().map(Outcome::Status),
            MotorCommand::RotateFor { m, d, s, t } => self
                .motor(m)?
                .rotate_for_duration(d, s, t)
                .map(Outcome::Rotation),
            MotorCommand::RotateBy { m, d, s, deg } => self
                .motor(m)?
                .rotate_by_angle(d, s, deg)
                .map(Outcome::Rotation),
            MotorCommand::Ramp { m, d, from, to, t } => self
                .motor(m)?
                .ramp_speed(d, from, to, t)
                .map(Outcome::Status),
            MotorCommand::Shake { m, d, s, n, f, b } => self
                .motor(m)?
                .shake(d, s, n, f, b)
                .map(|()| Outcome::Done),
            MotorCommand::Pulse { m, d, s, t } => {
                self.motor(m)?.pulse(d, s, t).map(Outcome::Status)
            }
            MotorCommand::Status { m } => self.motor(m)?.check_fault("status").map(Outcome::Status),
        };
        result.map_err(Failure::from)
    }

    /// Receive commands from `MOTOR_CHANNEL` forever, reporting each on `REPORT_CHANNEL`.
    pub async fn motor_ch(&mut self) -> ! {
        loop {
            let command = MOTOR_CHANNEL.receiver().receive().await;
            tracing::info!("Received motor command: {:?}", command);
            let result = self.execute_command(command);
            match &result {
                Ok(outcome) => tracing::info!(?outcome, "motor command executed"),
                Err(failure) => tracing::error!(?failure, "motor command failed"),
            }
            REPORT_CHANNEL
                .sender()
                .send(CommandReport { command, result })
                .await;
        }
    }
}
