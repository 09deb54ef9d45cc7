//! Hardware capabilities consumed by the arbitration engine.
//!
//! The charger IC is reached through [`RegisterBus`] and board wiring through
//! [`BoardGpio`]. Neither trait knows anything about use cases; firmware backs
//! them with I2C and GPIO peripherals, the emulator with in-memory models.

use core::cell::RefCell;
use core::fmt;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;

/// Register map of the charger IC, limited to the fields the engine drives.
pub mod regs {
    /// Charger configuration register holding the mode field.
    pub const MODE_REGISTER: u8 = 0xB9;
    pub const MODE_MASK: u8 = 0x0F;

    /// Input-select register.
    pub const INSEL_REGISTER: u8 = 0xC4;
    pub const INSEL_WIRED: u8 = 1 << 5;
    pub const INSEL_WIRELESS: u8 = 1 << 6;
    pub const INSEL_MASK: u8 = INSEL_WIRED | INSEL_WIRELESS;

    /// Reverse boost (bypass) voltage used while transmitting wirelessly.
    pub const REVERSE_BOOST_REGISTER: u8 = 0xC3;
    pub const REVERSE_BOOST_MASK: u8 = 0x7F;
}

/// Uniform error space for register access.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegisterError {
    /// The device did not acknowledge its address.
    Nack,
    /// The transfer exceeded the bus timeout.
    Timeout,
    /// The device is alive but not ready to accept the access yet.
    Busy,
    /// Any other bus-level failure.
    Bus,
}

impl RegisterError {
    /// Returns `true` when retrying later may succeed.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, RegisterError::Busy)
    }
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegisterError::Nack => "nack",
            RegisterError::Timeout => "timeout",
            RegisterError::Busy => "busy",
            RegisterError::Bus => "bus error",
        })
    }
}

/// Synchronous access to the charger register file.
pub trait RegisterBus {
    /// Reads one register.
    fn read(&mut self, addr: u8) -> Result<u8, RegisterError>;

    /// Writes one register.
    fn write(&mut self, addr: u8, value: u8) -> Result<(), RegisterError>;

    /// Read-modify-write of the bits selected by `mask`.
    fn update(&mut self, addr: u8, mask: u8, value: u8) -> Result<(), RegisterError> {
        let current = self.read(addr)?;
        let next = (current & !mask) | (value & mask);
        if next == current {
            return Ok(());
        }
        self.write(addr, next)
    }
}

impl<T> RegisterBus for &mut T
where
    T: RegisterBus + ?Sized,
{
    fn read(&mut self, addr: u8) -> Result<u8, RegisterError> {
        (**self).read(addr)
    }

    fn write(&mut self, addr: u8, value: u8) -> Result<(), RegisterError> {
        (**self).write(addr, value)
    }

    fn update(&mut self, addr: u8, mask: u8, value: u8) -> Result<(), RegisterError> {
        (**self).update(addr, mask, value)
    }
}

/// Register bus shared with accesses outside the arbitration engine.
pub type SharedRegisterBus<M, B> = Mutex<M, RefCell<B>>;

/// [`RegisterBus`] view that takes the bus lock for every access.
///
/// `update` holds the lock across the read and the write so no other user of
/// the bus can interleave with the read-modify-write.
pub struct LockedRegisters<'a, M, B>
where
    M: RawMutex,
{
    shared: &'a SharedRegisterBus<M, B>,
}

impl<'a, M, B> LockedRegisters<'a, M, B>
where
    M: RawMutex,
    B: RegisterBus,
{
    #[must_use]
    pub const fn new(shared: &'a SharedRegisterBus<M, B>) -> Self {
        Self { shared }
    }
}

impl<M, B> RegisterBus for LockedRegisters<'_, M, B>
where
    M: RawMutex,
    B: RegisterBus,
{
    fn read(&mut self, addr: u8) -> Result<u8, RegisterError> {
        self.shared.lock(|bus| bus.borrow_mut().read(addr))
    }

    fn write(&mut self, addr: u8, value: u8) -> Result<(), RegisterError> {
        self.shared.lock(|bus| bus.borrow_mut().write(addr, value))
    }

    fn update(&mut self, addr: u8, mask: u8, value: u8) -> Result<(), RegisterError> {
        self.shared
            .lock(|bus| bus.borrow_mut().update(addr, mask, value))
    }
}

/// Board GPIO line identifier.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct GpioLine(pub u8);

/// Electrical level driven onto a line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    #[must_use]
    pub const fn from_bool(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }

    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

/// Fire-and-forget GPIO control.
pub trait BoardGpio {
    fn set_line(&mut self, line: GpioLine, level: Level);
}

/// GPIO sink for boards without any controllable lines.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopGpio;

impl BoardGpio for NoopGpio {
    fn set_line(&mut self, _: GpioLine, _: Level) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    struct Registers {
        file: [u8; 256],
        writes: u32,
    }

    impl RegisterBus for Registers {
        fn read(&mut self, addr: u8) -> Result<u8, RegisterError> {
            Ok(self.file[usize::from(addr)])
        }

        fn write(&mut self, addr: u8, value: u8) -> Result<(), RegisterError> {
            self.file[usize::from(addr)] = value;
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn update_preserves_unmasked_bits() {
        let mut bus = Registers {
            file: [0; 256],
            writes: 0,
        };
        bus.file[usize::from(regs::MODE_REGISTER)] = 0xA0;

        bus.update(regs::MODE_REGISTER, regs::MODE_MASK, 0x05)
            .expect("update");
        assert_eq!(bus.file[usize::from(regs::MODE_REGISTER)], 0xA5);
        assert_eq!(bus.writes, 1);

        bus.update(regs::MODE_REGISTER, regs::MODE_MASK, 0x05)
            .expect("update");
        assert_eq!(bus.writes, 1, "unchanged value must not be rewritten");
    }

    #[test]
    fn locked_registers_forward_to_shared_bus() {
        let shared: SharedRegisterBus<NoopRawMutex, Registers> = Mutex::new(RefCell::new(Registers {
            file: [0; 256],
            writes: 0,
        }));

        let mut locked = LockedRegisters::new(&shared);
        locked
            .update(regs::INSEL_REGISTER, regs::INSEL_MASK, regs::INSEL_WIRED)
            .expect("update");
        assert_eq!(locked.read(regs::INSEL_REGISTER), Ok(regs::INSEL_WIRED));

        let writes = shared.lock(|bus| bus.borrow().writes);
        assert_eq!(writes, 1);
    }

    #[test]
    fn only_busy_is_transient() {
        assert!(RegisterError::Busy.is_transient());
        assert!(!RegisterError::Nack.is_transient());
        assert!(!RegisterError::Timeout.is_transient());
        assert!(!RegisterError::Bus.is_transient());
    }
}
