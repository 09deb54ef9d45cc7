//! STM32G0 peripherals behind the charger capability traits.

#![cfg(target_os = "none")]

use charger_core::hw::{BoardGpio, GpioLine, Level, RegisterBus, RegisterError};
use embassy_stm32::gpio::{self, Output};
use embassy_stm32::i2c::{self, I2c};
use embassy_stm32::mode::Blocking;

use super::lines;

/// Charger register file reached over blocking I2C.
pub struct I2cRegisterBus<'d> {
    i2c: I2c<'d, Blocking>,
    address: u8,
}

impl<'d> I2cRegisterBus<'d> {
    pub fn new(i2c: I2c<'d, Blocking>, address: u8) -> Self {
        Self { i2c, address }
    }
}

impl RegisterBus for I2cRegisterBus<'_> {
    fn read(&mut self, addr: u8) -> Result<u8, RegisterError> {
        let mut value = [0u8];
        self.i2c
            .blocking_write_read(self.address, &[addr], &mut value)
            .map_err(register_error)?;
        Ok(value[0])
    }

    fn write(&mut self, addr: u8, value: u8) -> Result<(), RegisterError> {
        self.i2c
            .blocking_write(self.address, &[addr, value])
            .map_err(register_error)
    }
}

fn register_error(error: i2c::Error) -> RegisterError {
    match error {
        i2c::Error::Nack => RegisterError::Nack,
        i2c::Error::Timeout => RegisterError::Timeout,
        i2c::Error::Arbitration => RegisterError::Busy,
        _ => RegisterError::Bus,
    }
}

/// Push-pull outputs driving the power-path switches.
pub struct BoardOutputs<'d> {
    pins: [Output<'d>; lines::COUNT],
}

impl<'d> BoardOutputs<'d> {
    /// `pins` must be ordered by [`lines`] index.
    pub fn new(pins: [Output<'d>; lines::COUNT]) -> Self {
        Self { pins }
    }
}

impl BoardGpio for BoardOutputs<'_> {
    fn set_line(&mut self, line: GpioLine, level: Level) {
        let Some(pin) = self.pins.get_mut(usize::from(line.0)) else {
            defmt::warn!("hw: set_line on unmapped line {}", line.0);
            return;
        };
        pin.set_level(match level {
            Level::High => gpio::Level::High,
            Level::Low => gpio::Level::Low,
        });
    }
}
