//! Per-board use-case hooks.
//!
//! Boards differ in which external boost, load switch, and wireless control
//! lines they route to the MCU. [`PlatformUseCaseHooks`] is the seam the
//! sequencer calls around the mode register commit; [`BoardHooks`] is the
//! generic implementation driven by a [`BoardConfig`] whose absent lines are
//! simply skipped.

use core::fmt;

use embedded_hal::delay::DelayNs;

use crate::hw::{BoardGpio, GpioLine, Level, RegisterBus, RegisterError, regs};
use crate::usecase::{ResolverPolicy, UseCase, needs_standby};

use super::Transition;

/// Upper bound for the settle delays used between sequenced GPIO assertions.
pub const MAX_SEQUENCE_DELAY_MS: u32 = 10;

/// Default reverse boost code programmed before wireless TX (7.1 V).
pub const DEFAULT_REVERSE_BOOST_CODE: u8 = 0x29;

/// Errors reported by platform hooks.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HookError {
    /// The hardware is not ready yet; the cycle should be re-run later.
    RetryLater,
    Register(RegisterError),
    /// The board cannot provide this use case.
    Unsupported(UseCase),
}

impl From<RegisterError> for HookError {
    fn from(error: RegisterError) -> Self {
        if error.is_transient() {
            HookError::RetryLater
        } else {
            HookError::Register(error)
        }
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::RetryLater => f.write_str("hardware not ready"),
            HookError::Register(error) => write!(f, "register access failed: {error}"),
            HookError::Unsupported(use_case) => write!(f, "{use_case} unsupported on this board"),
        }
    }
}

/// Use-case specific hardware work surrounding the mode register commit.
pub trait PlatformUseCaseHooks {
    /// Undoes `from`'s board state before the mode register drops to standby.
    ///
    /// # Errors
    ///
    /// Returns a [`HookError`] when the board could not be quiesced.
    fn to_standby<B: RegisterBus>(&mut self, regs: &mut B, from: UseCase) -> Result<(), HookError>;

    /// Prepares the board for the target use case.
    ///
    /// # Errors
    ///
    /// [`HookError::RetryLater`] when the hardware is not responding yet.
    fn to_usecase<B: RegisterBus>(
        &mut self,
        regs: &mut B,
        transition: &Transition,
    ) -> Result<(), HookError>;

    /// Completes work that needs the new mode value to be live.
    ///
    /// # Errors
    ///
    /// Returns a [`HookError`] when a post-commit step fails.
    fn finish_usecase<B: RegisterBus>(
        &mut self,
        regs: &mut B,
        transition: &Transition,
    ) -> Result<(), HookError>;

    /// Drops every boost and OTG output. Must not fail.
    fn force_safe(&mut self);
}

/// Hooks for boards with no controllable lines.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopHooks;

impl PlatformUseCaseHooks for NoopHooks {
    fn to_standby<B: RegisterBus>(&mut self, _: &mut B, _: UseCase) -> Result<(), HookError> {
        Ok(())
    }

    fn to_usecase<B: RegisterBus>(&mut self, _: &mut B, _: &Transition) -> Result<(), HookError> {
        Ok(())
    }

    fn finish_usecase<B: RegisterBus>(
        &mut self,
        _: &mut B,
        _: &Transition,
    ) -> Result<(), HookError> {
        Ok(())
    }

    fn force_safe(&mut self) {}
}

/// GPIO lines routed to the MCU; `None` when a board lacks the line.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BoardLines {
    /// Enables the external OTG boost converter.
    pub ext_boost_enable: Option<GpioLine>,
    /// Routes the external boost output onto VBUS.
    pub ext_boost_select: Option<GpioLine>,
    /// Connects VBUS to the OTG load.
    pub otg_load_switch: Option<GpioLine>,
    /// Enables the wireless receiver chip.
    pub wlc_enable: Option<GpioLine>,
    /// Spoofs wireless presence so the receiver stays quiet.
    pub wlc_spoof: Option<GpioLine>,
    /// Enables the wireless transmitter output.
    pub wlc_tx_enable: Option<GpioLine>,
}

impl BoardLines {
    /// A board with no controllable lines.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            ext_boost_enable: None,
            ext_boost_select: None,
            otg_load_switch: None,
            wlc_enable: None,
            wlc_spoof: None,
            wlc_tx_enable: None,
        }
    }
}

/// Board description consumed by [`BoardHooks`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BoardConfig {
    pub lines: BoardLines,
    pub policy: ResolverPolicy,
    /// Delay between selecting and enabling the external boost.
    pub boost_pre_delay_ms: u32,
    /// Delay after enabling the external boost before VBUS is connected.
    pub boost_post_delay_ms: u32,
    pub reverse_boost_code: u8,
}

impl BoardConfig {
    #[must_use]
    pub const fn new(lines: BoardLines, policy: ResolverPolicy) -> Self {
        Self {
            lines,
            policy,
            boost_pre_delay_ms: 2,
            boost_post_delay_ms: 5,
            reverse_boost_code: DEFAULT_REVERSE_BOOST_CODE,
        }
    }

    /// Returns the settle delays clamped to `1..=MAX_SEQUENCE_DELAY_MS`.
    #[must_use]
    pub const fn boost_delays_ms(&self) -> (u32, u32) {
        (
            clamp_delay(self.boost_pre_delay_ms),
            clamp_delay(self.boost_post_delay_ms),
        )
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self::new(BoardLines::none(), ResolverPolicy::default())
    }
}

const fn clamp_delay(ms: u32) -> u32 {
    if ms == 0 {
        1
    } else if ms > MAX_SEQUENCE_DELAY_MS {
        MAX_SEQUENCE_DELAY_MS
    } else {
        ms
    }
}

/// Generic board implementation of [`PlatformUseCaseHooks`].
pub struct BoardHooks<G, D> {
    config: BoardConfig,
    gpio: G,
    delay: D,
}

impl<G, D> BoardHooks<G, D>
where
    G: BoardGpio,
    D: DelayNs,
{
    pub const fn new(config: BoardConfig, gpio: G, delay: D) -> Self {
        Self {
            config,
            gpio,
            delay,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn gpio(&self) -> &G {
        &self.gpio
    }

    pub fn gpio_mut(&mut self) -> &mut G {
        &mut self.gpio
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    fn drive(&mut self, line: Option<GpioLine>, level: Level) {
        if let Some(line) = line {
            self.gpio.set_line(line, level);
        }
    }

    fn enable_ext_boost(&mut self) {
        let lines = self.config.lines;
        let (pre, post) = self.config.boost_delays_ms();

        self.drive(lines.ext_boost_select, Level::High);
        self.delay.delay_ms(pre);
        self.drive(lines.ext_boost_enable, Level::High);
        self.delay.delay_ms(post);
    }

    fn disable_ext_boost(&mut self) {
        let lines = self.config.lines;
        self.drive(lines.ext_boost_enable, Level::Low);
        self.drive(lines.ext_boost_select, Level::Low);
    }

    fn uses_ext_boost(&self, use_case: UseCase) -> bool {
        self.config.policy.ext_boost_sources(use_case)
            && self.config.lines.ext_boost_enable.is_some()
    }

    /// The boost stays live across a direct move between two use cases that
    /// both source VBUS from it.
    fn ext_boost_live(&self, transition: &Transition) -> bool {
        self.uses_ext_boost(transition.from) && !needs_standby(transition.from, transition.to)
    }
}

impl<G, D> PlatformUseCaseHooks for BoardHooks<G, D>
where
    G: BoardGpio,
    D: DelayNs,
{
    fn to_standby<B: RegisterBus>(&mut self, _: &mut B, from: UseCase) -> Result<(), HookError> {
        let lines = self.config.lines;
        if from == UseCase::WlcTx {
            self.drive(lines.wlc_tx_enable, Level::Low);
        }
        if from.is_otg() {
            self.drive(lines.otg_load_switch, Level::Low);
            self.disable_ext_boost();
        }
        Ok(())
    }

    fn to_usecase<B: RegisterBus>(
        &mut self,
        regs: &mut B,
        transition: &Transition,
    ) -> Result<(), HookError> {
        let lines = self.config.lines;
        let to = transition.to;

        if self.config.policy.ext_boost_sources(to) && !self.ext_boost_live(transition) {
            if lines.ext_boost_enable.is_none() {
                return Err(HookError::Unsupported(to));
            }
            self.enable_ext_boost();
        }

        match to {
            UseCase::WlcTx => {
                regs.update(
                    regs::REVERSE_BOOST_REGISTER,
                    regs::REVERSE_BOOST_MASK,
                    self.config.reverse_boost_code,
                )?;
                self.drive(lines.wlc_spoof, Level::Low);
                self.drive(lines.wlc_enable, Level::High);
            }
            to if to.receives_wireless() => {
                self.drive(lines.wlc_spoof, Level::Low);
                self.drive(lines.wlc_enable, Level::High);
            }
            UseCase::UsbChg | UseCase::UsbDc if !self.config.policy.dcin_is_dock => {
                self.drive(lines.wlc_enable, Level::Low);
            }
            _ => {}
        }

        Ok(())
    }

    fn finish_usecase<B: RegisterBus>(
        &mut self,
        _: &mut B,
        transition: &Transition,
    ) -> Result<(), HookError> {
        let lines = self.config.lines;
        let to = transition.to;

        if to == UseCase::WlcTx {
            self.drive(lines.wlc_tx_enable, Level::High);
        } else if transition.from == UseCase::WlcTx {
            self.drive(lines.wlc_enable, Level::High);
        }

        if to.is_otg() {
            self.drive(lines.otg_load_switch, Level::High);
        }
        if self.uses_ext_boost(transition.from) && !self.uses_ext_boost(to) {
            self.disable_ext_boost();
        }

        Ok(())
    }

    fn force_safe(&mut self) {
        let lines = self.config.lines;
        self.drive(lines.wlc_tx_enable, Level::Low);
        self.drive(lines.otg_load_switch, Level::Low);
        self.disable_ext_boost();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::RegisterError;
    use crate::usecase::HardwareModeValue;
    use heapless::Vec;

    #[derive(Default)]
    struct RecordingGpio {
        events: Vec<(GpioLine, Level), 16>,
    }

    impl BoardGpio for RecordingGpio {
        fn set_line(&mut self, line: GpioLine, level: Level) {
            self.events.push((line, level)).expect("gpio log full");
        }
    }

    #[derive(Default)]
    struct RecordingDelay {
        delays_ms: Vec<u32, 8>,
    }

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.delays_ms.push(ns / 1_000_000).expect("delay log full");
        }

        fn delay_ms(&mut self, ms: u32) {
            self.delays_ms.push(ms).expect("delay log full");
        }
    }

    struct BusyBus;

    impl RegisterBus for BusyBus {
        fn read(&mut self, _: u8) -> Result<u8, RegisterError> {
            Err(RegisterError::Busy)
        }

        fn write(&mut self, _: u8, _: u8) -> Result<(), RegisterError> {
            Err(RegisterError::Busy)
        }
    }

    const EXT_BOOST_EN: GpioLine = GpioLine(1);
    const EXT_BOOST_SEL: GpioLine = GpioLine(2);
    const OTG_SWITCH: GpioLine = GpioLine(3);

    fn ext_boost_board() -> BoardHooks<RecordingGpio, RecordingDelay> {
        let lines = BoardLines {
            ext_boost_enable: Some(EXT_BOOST_EN),
            ext_boost_select: Some(EXT_BOOST_SEL),
            otg_load_switch: Some(OTG_SWITCH),
            ..BoardLines::none()
        };
        let mut config = BoardConfig::new(lines, ResolverPolicy::new(false, true));
        config.boost_post_delay_ms = 40;
        BoardHooks::new(config, RecordingGpio::default(), RecordingDelay::default())
    }

    fn transition(from: UseCase, to: UseCase) -> Transition {
        Transition {
            from,
            to,
            mode: HardwareModeValue::ALL_OFF,
        }
    }

    #[test]
    fn external_boost_is_sequenced_with_clamped_delays() {
        let mut hooks = ext_boost_board();
        let mut bus = BusyBus;

        hooks
            .to_usecase(&mut bus, &transition(UseCase::Standby, UseCase::UsbOtg))
            .expect("boost enable");

        assert_eq!(
            hooks.gpio().events.as_slice(),
            &[(EXT_BOOST_SEL, Level::High), (EXT_BOOST_EN, Level::High)]
        );
        assert_eq!(hooks.delay().delays_ms.as_slice(), &[2, MAX_SEQUENCE_DELAY_MS]);

        hooks
            .finish_usecase(&mut bus, &transition(UseCase::Standby, UseCase::UsbOtg))
            .expect("finish");
        assert_eq!(
            hooks.gpio().events.last(),
            Some(&(OTG_SWITCH, Level::High))
        );
    }

    #[test]
    fn combined_otg_rx_keeps_or_raises_the_external_boost() {
        let mut hooks = ext_boost_board();
        let mut bus = BusyBus;

        let from_otg = transition(UseCase::UsbOtg, UseCase::UsbOtgWlcRx);
        hooks.to_usecase(&mut bus, &from_otg).expect("already live");
        hooks.finish_usecase(&mut bus, &from_otg).expect("finish");
        assert!(!hooks.gpio().events.contains(&(EXT_BOOST_EN, Level::Low)));
        assert!(hooks.delay().delays_ms.is_empty());

        let mut hooks = ext_boost_board();
        let from_rx = transition(UseCase::WlcRx, UseCase::UsbOtgWlcRx);
        hooks.to_usecase(&mut bus, &from_rx).expect("boost enable");
        hooks.finish_usecase(&mut bus, &from_rx).expect("finish");
        let events = hooks.gpio().events.as_slice();
        assert_eq!(
            &events[..2],
            &[(EXT_BOOST_SEL, Level::High), (EXT_BOOST_EN, Level::High)]
        );
        assert_eq!(events.last(), Some(&(OTG_SWITCH, Level::High)));
    }

    #[test]
    fn missing_boost_line_is_unsupported() {
        let config = BoardConfig::new(BoardLines::none(), ResolverPolicy::new(false, true));
        let mut hooks = BoardHooks::new(config, RecordingGpio::default(), RecordingDelay::default());

        let result = hooks.to_usecase(&mut BusyBus, &transition(UseCase::Standby, UseCase::UsbOtg));
        assert_eq!(result, Err(HookError::Unsupported(UseCase::UsbOtg)));
    }

    #[test]
    fn busy_register_maps_to_retry_later() {
        let mut hooks = ext_boost_board();
        let result = hooks.to_usecase(&mut BusyBus, &transition(UseCase::Standby, UseCase::WlcTx));
        assert_eq!(result, Err(HookError::RetryLater));
    }

    #[test]
    fn force_safe_drops_every_output() {
        let mut hooks = ext_boost_board();
        hooks.force_safe();

        let events = hooks.gpio().events.as_slice();
        assert!(events.contains(&(OTG_SWITCH, Level::Low)));
        assert!(events.contains(&(EXT_BOOST_EN, Level::Low)));
        assert!(events.contains(&(EXT_BOOST_SEL, Level::Low)));
    }
}
