//! Board wiring for the charger controller.
//!
//! The line map and policy are plain data so they can be checked on the host;
//! the STM32 peripherals behind them only exist on the target.

use charger_core::hw::GpioLine;
use charger_core::sequencer::{BoardConfig, BoardLines};
use charger_core::usecase::ResolverPolicy;

#[cfg(target_os = "none")]
mod stm32;

#[cfg(target_os = "none")]
pub use stm32::{BoardOutputs, I2cRegisterBus};

/// 7-bit I2C address of the charger.
pub const CHARGER_I2C_ADDR: u8 = 0x69;

/// MCU outputs wired to the power path, indexed by [`GpioLine`].
pub mod lines {
    use super::GpioLine;

    pub const OTG_LOAD_SWITCH: GpioLine = GpioLine(0);
    pub const WLC_ENABLE: GpioLine = GpioLine(1);
    pub const WLC_SPOOF: GpioLine = GpioLine(2);
    pub const WLC_TX_ENABLE: GpioLine = GpioLine(3);

    /// Number of driven outputs.
    pub const COUNT: usize = 4;
}

/// This board sources OTG from the charger's internal boost and has no dock
/// connector on DCIN.
pub const BOARD_POLICY: ResolverPolicy = ResolverPolicy::new(false, false);

/// Board configuration handed to the use-case hooks.
pub const fn board_config() -> BoardConfig {
    let lines = BoardLines {
        otg_load_switch: Some(lines::OTG_LOAD_SWITCH),
        wlc_enable: Some(lines::WLC_ENABLE),
        wlc_spoof: Some(lines::WLC_SPOOF),
        wlc_tx_enable: Some(lines::WLC_TX_ENABLE),
        ..BoardLines::none()
    };
    BoardConfig::new(lines, BOARD_POLICY)
}
