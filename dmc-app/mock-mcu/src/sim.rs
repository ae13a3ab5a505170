//! Simulated I2C bus with DRV8830 register models behind it.

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use tracing::{debug, warn};

/// Register model of one DRV8830.
struct SimDrv8830 {
    address: u8,
    control: u8,
    fault: u8,
    fault_reads: u32,
}

impl SimDrv8830 {
    fn write(
        &mut self,
        register: u8,
        value: u8,
    ) {
        match register {
            0x00 => {
                self.control = value;
                let mode = match value & 0b11 {
                    0b00 => "standby",
                    0b01 => "reverse",
                    0b10 => "forward",
                    _ => "brake",
                };
                debug!(address = self.address, vset = value >> 2, mode, "control");
            }
            0x01 if value & 0x80 != 0 => self.fault = 0,
            _ => {}
        }
    }

    fn read(
        &mut self,
        register: u8,
        fault_every: Option<u32>,
    ) -> u8 {
        match register {
            0x00 => self.control,
            0x01 => {
                self.fault_reads = self.fault_reads.wrapping_add(1);
                let driving = matches!(self.control & 0b11, 0b01 | 0b10);
                if let Some(n) = fault_every.filter(|&n| n > 0) {
                    if driving && self.fault_reads % n == 0 {
                        warn!(address = self.address, "injecting overcurrent");
                        self.fault = 0x03;
                    }
                }
                self.fault
            }
            _ => 0,
        }
    }
}

/// Bus with a DRV8830 at each configured address.
pub struct SimBus {
    devices: Vec<SimDrv8830>,
    fault_every: Option<u32>,
    fail_after: Option<u32>,
    transfers: u32,
}

impl SimBus {
    /// `fault_every`: latch an overcurrent on every Nth fault read of a driving motor.
    /// `fail_after`: every transfer after this many fails.
    pub fn new(
        addresses: &[u8],
        fault_every: Option<u32>,
        fail_after: Option<u32>,
    ) -> Self {
        let devices = addresses
            .iter()
            .map(|&address| SimDrv8830 {
                address,
                control: 0,
                fault: 0,
                fault_reads: 0,
            })
            .collect();
        SimBus {
            devices,
            fault_every,
            fail_after,
            transfers: 0,
        }
    }
}

impl ErrorType for SimBus {
    type Error = ErrorKind;
}

impl I2c for SimBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.transfers = self.transfers.saturating_add(1);
        if self.fail_after.is_some_and(|limit| self.transfers > limit) {
            warn!(address, transfer = self.transfers, "simulated bus failure");
            return Err(ErrorKind::Bus);
        }

        let fault_every = self.fault_every;
        let dev = self
            .devices
            .iter_mut()
            .find(|d| d.address == address)
            .ok_or(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))?;

        let mut pointer = 0u8;
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => match *bytes {
                    &[] => {}
                    &[register] => pointer = register,
                    &[register, value, ..] => {
                        pointer = register;
                        dev.write(register, value);
                    }
                },
                Operation::Read(buf) => {
                    for b in buf.iter_mut() {
                        *b = dev.read(pointer, fault_every);
                    }
                }
            }
        }
        Ok(())
    }
}
