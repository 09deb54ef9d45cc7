#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use charger_core::arbiter::{ArbiterConfig, CycleOutcome, ModeArbiter};
use charger_core::hw::{BoardGpio, GpioLine, Level, RegisterBus, RegisterError, regs};
use charger_core::sequencer::{BoardConfig, BoardHooks, BoardLines};
use charger_core::telemetry::TelemetryRecorder;
use charger_core::usecase::{InputMask, ResolverPolicy};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_hal::delay::DelayNs;

pub const EXT_BOOST_EN: GpioLine = GpioLine(1);
pub const EXT_BOOST_SEL: GpioLine = GpioLine(2);
pub const OTG_SWITCH: GpioLine = GpioLine(3);
pub const WLC_EN: GpioLine = GpioLine(4);
pub const WLC_SPOOF: GpioLine = GpioLine(5);
pub const WLC_TX_EN: GpioLine = GpioLine(6);

/// In-memory charger register file with access accounting and one-shot faults.
pub struct ChargerModel {
    pub file: [u8; 256],
    /// Every value written to the mode register, in order.
    pub mode_writes: Vec<u8>,
    /// Number of masked updates aimed at the mode register.
    pub mode_updates: usize,
    pub insel_updates: usize,
    /// Fails the next write of this mode value.
    pub fail_mode_value: Option<(u8, RegisterError)>,
    /// Fails the next write to this register.
    pub fail_register: Option<(u8, RegisterError)>,
}

impl ChargerModel {
    pub fn new() -> Self {
        Self {
            file: [0; 256],
            mode_writes: Vec::new(),
            mode_updates: 0,
            insel_updates: 0,
            fail_mode_value: None,
            fail_register: None,
        }
    }

    pub fn mode(&self) -> u8 {
        self.file[usize::from(regs::MODE_REGISTER)] & regs::MODE_MASK
    }

    pub fn inputs(&self) -> InputMask {
        let bits = self.file[usize::from(regs::INSEL_REGISTER)];
        let mut mask = InputMask::NONE;
        if bits & regs::INSEL_WIRED != 0 {
            mask = mask.union(InputMask::WIRED);
        }
        if bits & regs::INSEL_WIRELESS != 0 {
            mask = mask.union(InputMask::WIRELESS);
        }
        mask
    }
}

impl RegisterBus for ChargerModel {
    fn read(&mut self, addr: u8) -> Result<u8, RegisterError> {
        Ok(self.file[usize::from(addr)])
    }

    fn write(&mut self, addr: u8, value: u8) -> Result<(), RegisterError> {
        if let Some((register, error)) = self.fail_register {
            if register == addr {
                self.fail_register = None;
                return Err(error);
            }
        }

        if addr == regs::MODE_REGISTER {
            if let Some((mode, error)) = self.fail_mode_value {
                if value & regs::MODE_MASK == mode {
                    self.fail_mode_value = None;
                    return Err(error);
                }
            }
            self.mode_writes.push(value & regs::MODE_MASK);
        }

        self.file[usize::from(addr)] = value;
        Ok(())
    }

    fn update(&mut self, addr: u8, mask: u8, value: u8) -> Result<(), RegisterError> {
        match addr {
            regs::MODE_REGISTER => self.mode_updates += 1,
            regs::INSEL_REGISTER => self.insel_updates += 1,
            _ => {}
        }

        let current = self.read(addr)?;
        let next = (current & !mask) | (value & mask);
        if next == current {
            return Ok(());
        }
        self.write(addr, next)
    }
}

/// GPIO model that remembers the last level of every line.
#[derive(Default)]
pub struct BoardPins {
    levels: HashMap<GpioLine, Level>,
    pub history: Vec<(GpioLine, Level)>,
}

impl BoardPins {
    pub fn level(&self, line: GpioLine) -> Level {
        self.levels.get(&line).copied().unwrap_or(Level::Low)
    }
}

impl BoardGpio for BoardPins {
    fn set_line(&mut self, line: GpioLine, level: Level) {
        self.levels.insert(line, level);
        self.history.push((line, level));
    }
}

#[derive(Default)]
pub struct RecordingDelay {
    pub waits_ms: Vec<u32>,
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.waits_ms.push(ns / 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.waits_ms.push(ms);
    }
}

pub type BoardArbiter = ModeArbiter<NoopRawMutex, BoardHooks<BoardPins, RecordingDelay>>;

pub fn full_lines() -> BoardLines {
    BoardLines {
        ext_boost_enable: Some(EXT_BOOST_EN),
        ext_boost_select: Some(EXT_BOOST_SEL),
        otg_load_switch: Some(OTG_SWITCH),
        wlc_enable: Some(WLC_EN),
        wlc_spoof: Some(WLC_SPOOF),
        wlc_tx_enable: Some(WLC_TX_EN),
    }
}

pub fn board_arbiter(lines: BoardLines, policy: ResolverPolicy) -> BoardArbiter {
    let hooks = BoardHooks::new(
        BoardConfig::new(lines, policy),
        BoardPins::default(),
        RecordingDelay::default(),
    );
    ModeArbiter::new(ArbiterConfig::new(policy), hooks)
}

pub fn internal_boost_arbiter() -> BoardArbiter {
    board_arbiter(full_lines(), ResolverPolicy::default())
}

/// Harness bundling an arbiter with its register model and telemetry ring.
pub struct Bench {
    pub arbiter: BoardArbiter,
    pub charger: ChargerModel,
    pub telemetry: TelemetryRecorder<Duration>,
    now: Duration,
}

impl Bench {
    pub fn new(arbiter: BoardArbiter) -> Self {
        Self {
            arbiter,
            charger: ChargerModel::new(),
            telemetry: TelemetryRecorder::new(),
            now: Duration::ZERO,
        }
    }

    pub fn cycle(&mut self) -> CycleOutcome {
        self.now += Duration::from_millis(10);
        self.arbiter
            .resolve_and_apply(&mut self.charger, &mut self.telemetry, self.now)
    }

    pub fn level(&self, line: GpioLine) -> Level {
        self.arbiter.with_hooks(|hooks| hooks.gpio().level(line))
    }
}
