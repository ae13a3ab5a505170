//! DRV8830 I2C H-bridge motor driver.
//!
//! Register map:
//!
//! | reg | bits | meaning                                                        |
//! |-----|------|----------------------------------------------------------------|
//! | 0   | 7-2  | VSET, output voltage setting `0x06..=0x3F`                     |
//! | 0   | 1-0  | IN2/IN1: 00 standby, 01 reverse, 10 forward, 11 brake          |
//! | 1   | 7    | CLEAR, writing 1 clears the latched fault bits                 |
//! | 1   | 4-0  | ILIMT, OTS, UVLO, OCP, FAULT                                   |
//!
//! Every write to the control register goes through [`Drv8830`], so its cached speed and mode
//! always mirror the device.

use core::fmt::Debug;

use embedded_hal::i2c::I2c;
use serde::{Deserialize, Serialize};

use super::motion::MotionProfile;
use crate::utils::clock::Clock;

// Register addresses
pub mod reg {
    pub const CONTROL: u8 = 0x00;
    pub const FAULT: u8 = 0x01;

    /// Value written to `FAULT` to clear latched fault bits.
    pub const CLEAR_FAULTS: u8 = 0x80;
}

/// Lowest VSET the device accepts.
pub const VSET_MIN: u8 = 0x06;
/// Highest VSET the device accepts.
pub const VSET_MAX: u8 = 0x3F;

/// Clamp a speed into the VSET range.
#[inline]
pub fn clamp_speed(speed: u8) -> u8 {
    speed.clamp(VSET_MIN, VSET_MAX)
}

/// Control register value for `speed` in `mode`.
#[inline]
pub fn control_byte(
    speed: u8,
    mode: Mode,
) -> u8 {
    (clamp_speed(speed) << 2) | mode as u8
}

/// 7-bit bus address of a DRV8830, limited to the nine A1/A0 strap options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address(u8);

impl Address {
    /// Sorter wheel motor (A1 = 0, A0 = 0).
    pub const SORTER: Address = Address(0x60);
    /// Card eject motor (Grove mini 0xCA).
    pub const EJECT: Address = Address(0x65);

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Address {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x60..=0x68 => Ok(Address(value)),
            _ => Err(value),
        }
    }
}

/// H-bridge drive mode, encoded as IN2/IN1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    /// Outputs high-Z, motor coasts.
    Standby = 0b00,
    Reverse = 0b01,
    Forward = 0b10,
    /// Both outputs high.
    Brake = 0b11,
}

/// Rotation direction of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// Map a direction bit: `0` is forward, anything else reverse.
    pub fn from_bit(bit: u8) -> Self {
        if bit == 0 {
            Direction::Forward
        } else {
            Direction::Reverse
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }

    pub fn mode(self) -> Mode {
        match self {
            Direction::Forward => Mode::Forward,
            Direction::Reverse => Mode::Reverse,
        }
    }
}

/// FAULT register snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FaultStatus {
    raw: u8,
}

impl FaultStatus {
    #[inline]
    pub fn from_raw(raw: u8) -> Self {
        Self { raw }
    }

    #[inline]
    pub fn raw(&self) -> u8 {
        self.raw
    }

    /// FAULT: set while any fault condition is latched.
    #[inline]
    pub fn latched(&self) -> bool {
        (self.raw & (1 << 0)) != 0
    }

    /// OCP: overcurrent event.
    #[inline]
    pub fn overcurrent(&self) -> bool {
        (self.raw & (1 << 1)) != 0
    }

    /// UVLO: undervoltage lockout.
    #[inline]
    pub fn undervoltage(&self) -> bool {
        (self.raw & (1 << 2)) != 0
    }

    /// OTS: overtemperature condition.
    #[inline]
    pub fn overtemperature(&self) -> bool {
        (self.raw & (1 << 3)) != 0
    }

    /// ILIMT: extended current limit event.
    #[inline]
    pub fn current_limit(&self) -> bool {
        (self.raw & (1 << 4)) != 0
    }

    /// Any fault bit in 1..=6 is set. The FAULT latch alone does not count.
    #[inline]
    pub fn is_fault(&self) -> bool {
        (self.raw & 0x7E) != 0
    }
}

/// The bus access that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BusOp {
    Write { address: u8, register: u8, value: u8 },
    Read { address: u8, register: u8 },
}

/// Errors that can occur when driving a DRV8830.
#[derive(Debug)]
pub enum DriverError<E: Debug> {
    /// I2C transfer failed. Not recoverable.
    Bus { op: BusOp, source: E },
    /// Address outside `0x60..=0x68`.
    InvalidAddress(u8),
    /// `MotionProfile::max_fault_retries` was reached during a timed rotation.
    FaultRetriesExhausted { address: u8, retries: u32 },
}

/// Driver for one DRV8830 on an I2C bus.
pub struct Drv8830<I2C, C> {
    i2c: I2C,
    address: Address,
    clock: C,
    profile: MotionProfile,
    last_speed: u8,
    mode: Mode,
}

impl<I2C, C, E> Drv8830<I2C, C>
where
    I2C: I2c<Error = E>,
    C: Clock,
    E: Debug,
{
    /// Take ownership of `i2c`, clear latched faults and put the bridge in standby.
    ///
    /// Waits `profile.init_settle_ms` before the first fault check. `profile` defaults to
    /// [`MotionProfile::default`].
    pub fn init(
        i2c: I2C,
        address: u8,
        clock: C,
        profile: Option<MotionProfile>,
    ) -> Result<Self, DriverError<E>> {
        let address = Address::try_from(address).map_err(DriverError::InvalidAddress)?;
        let mut drv = Drv8830 {
            i2c,
            address,
            clock,
            profile: profile.unwrap_or_default(),
            last_speed: VSET_MIN,
            mode: Mode::Standby,
        };

        drv.clear_faults()?;
        drv.write_control(VSET_MIN, Mode::Standby)?;
        drv.clock.sleep_ms(drv.profile.init_settle_ms);
        drv.check_fault("init")?;
        tracing::info!(address = address.get(), "DRV8830 initialized");
        Ok(drv)
    }

    /// Drive in `direction` at `speed` (clamped to `6..=63`), then clear the fault latches and
    /// return the fault status read after the move.
    pub fn drive(
        &mut self,
        direction: Direction,
        speed: u8,
    ) -> Result<FaultStatus, DriverError<E>> {
        self.write_control(speed, direction.mode())?;
        self.clear_faults()?;
        self.check_fault("move")
    }

    pub fn brake(&mut self) -> Result<FaultStatus, DriverError<E>> {
        self.write_control(VSET_MIN, Mode::Brake)?;
        self.check_fault("brake")
    }

    /// Put the bridge in standby (outputs high-Z).
    pub fn idle(&mut self) -> Result<FaultStatus, DriverError<E>> {
        self.write_control(VSET_MIN, Mode::Standby)?;
        self.check_fault("idle")
    }

    /// Same as [`idle`](Self::idle); the motor spins down freely.
    pub fn coast(&mut self) -> Result<FaultStatus, DriverError<E>> {
        self.idle()
    }

    /// Read and log the FAULT register. `hint` names the caller in the log.
    ///
    /// A latched FAULT bit is logged as critical but is not an error.
    pub fn check_fault(
        &mut self,
        hint: &str,
    ) -> Result<FaultStatus, DriverError<E>> {
        let status = FaultStatus::from_raw(self.read_reg(reg::FAULT)?);
        if status.raw() & 0x7F == 0 {
            return Ok(status);
        }

        let address = self.address.get();
        if status.latched() {
            tracing::error!(address, raw = status.raw(), hint, "DRV8830 critical fault");
        } else {
            tracing::warn!(address, raw = status.raw(), hint, "DRV8830 fault");
        }
        if status.overcurrent() {
            tracing::warn!(address, "OCP: overcurrent event");
        }
        if status.undervoltage() {
            tracing::warn!(address, "UVLO: undervoltage lockout");
        }
        if status.overtemperature() {
            tracing::warn!(address, "OTS: overtemperature condition");
        }
        if status.current_limit() {
            tracing::warn!(address, "ILIMT: extended current limit event");
        }
        Ok(status)
    }

    /// Write 0x80 to the FAULT register.
    pub fn clear_faults(&mut self) -> Result<(), DriverError<E>> {
        self.write_reg(reg::FAULT, reg::CLEAR_FAULTS)
    }

    pub fn address(&self) -> u8 {
        self.address.get()
    }

    /// Speed of the last control write, always in `6..=63`.
    pub fn speed(&self) -> u8 {
        self.last_speed
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn profile(&self) -> &MotionProfile {
        &self.profile
    }

    /// Give the bus device back. The device keeps its last commanded mode.
    pub fn release(self) -> I2C {
        self.i2c
    }

    pub(crate) fn clock(&self) -> &C {
        &self.clock
    }

    fn write_control(
        &mut self,
        speed: u8,
        mode: Mode,
    ) -> Result<(), DriverError<E>> {
        let speed = clamp_speed(speed);
        self.write_reg(reg::CONTROL, control_byte(speed, mode))?;
        self.last_speed = speed;
        self.mode = mode;
        Ok(())
    }

    fn write_reg(
        &mut self,
        register: u8,
        value: u8,
    ) -> Result<(), DriverError<E>> {
        let address = self.address.get();
        self.i2c.write(address, &[register, value]).map_err(|source| {
            tracing::error!(address, register, value, error = ?source, "DRV8830 write failed");
            DriverError::Bus {
                op: BusOp::Write {
                    address,
                    register,
                    value,
                },
                source,
            }
        })
    }

    fn read_reg(
        &mut self,
        register: u8,
    ) -> Result<u8, DriverError<E>> {
        let address = self.address.get();
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(address, &[register], &mut buf)
            .map_err(|source| {
                tracing::error!(address, register, error = ?source, "DRV8830 read failed");
                DriverError::Bus {
                    op: BusOp::Read { address, register },
                    source,
                }
            })?;
        Ok(buf[0])
    }
}
