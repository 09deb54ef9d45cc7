use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::i2c::{self, I2c};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::Delay;
use static_cell::StaticCell;

use charger_core::arbiter::{ArbiterConfig, ModeArbiter};
use charger_core::hw::{LockedRegisters, SharedRegisterBus};
use charger_core::sequencer::BoardHooks;

use crate::charger::{ChargerArbiter, ChargerHandle, ChargerMutex, ChargerService, CycleRequest};
use crate::hw::{self, BoardOutputs, I2cRegisterBus};

mod charger_task;
mod console_task;
mod heartbeat_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) type FirmwareHooks = BoardHooks<BoardOutputs<'static>, Delay>;
pub(super) type FirmwareArbiter = ChargerArbiter<FirmwareHooks>;
pub(super) type FirmwareRegisters =
    LockedRegisters<'static, ChargerMutex, I2cRegisterBus<'static>>;
pub(super) type FirmwareService = ChargerService<'static, FirmwareHooks, FirmwareRegisters>;
pub(super) type FirmwareHandle = ChargerHandle<'static, FirmwareHooks>;

static CYCLE_REQUEST: CycleRequest = Signal::new();
static ARBITER: StaticCell<FirmwareArbiter> = StaticCell::new();
static CHARGER_BUS: StaticCell<SharedRegisterBus<ChargerMutex, I2cRegisterBus<'static>>> =
    StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA2,
        PA3,
        PA4,
        PA5,
        PB0,
        PB1,
        PB6,
        PB7,
        I2C1,
        USART5,
        ..
    } = hal::init(config);

    let i2c = I2c::new_blocking(I2C1, PB6, PB7, i2c::Config::default());
    let bus = CHARGER_BUS.init(Mutex::new(core::cell::RefCell::new(I2cRegisterBus::new(
        i2c,
        hw::CHARGER_I2C_ADDR,
    ))));

    // Ordered by `hw::lines` index; every switch starts open.
    let outputs = BoardOutputs::new([
        Output::new(PA2, Level::Low, Speed::Low),
        Output::new(PA3, Level::Low, Speed::Low),
        Output::new(PA4, Level::Low, Speed::Low),
        Output::new(PA5, Level::Low, Speed::Low),
    ]);

    let hooks = BoardHooks::new(hw::board_config(), outputs, Delay);
    let arbiter: &'static FirmwareArbiter = ARBITER.init(ModeArbiter::new(
        ArbiterConfig::new(hw::BOARD_POLICY),
        hooks,
    ));

    let service = ChargerService::new(arbiter, &CYCLE_REQUEST, LockedRegisters::new(bus));
    let handle = ChargerHandle::new(arbiter, &CYCLE_REQUEST);

    spawner
        .spawn(charger_task::run(service))
        .expect("failed to spawn charger task");
    spawner
        .spawn(console_task::run(handle, USART5, PB0, PB1))
        .expect("failed to spawn console task");
    spawner
        .spawn(heartbeat_task::run())
        .expect("failed to spawn heartbeat task");

    core::future::pending::<()>().await;
}
