//! Charger arbitration service.
//!
//! Vote producers (console, power-delivery and wireless stacks) only touch the
//! election through a [`ChargerHandle`]; every change wakes the single
//! [`ChargerService`], which owns the register bus and runs the arbitration
//! cycles. Deferred cycles re-arm a timer; a newer wake supersedes it.

use core::time::Duration;

use charger_core::arbiter::{ArbiterError, CycleOutcome, ModeArbiter};
use charger_core::election::{ModeRequest, VoteError};
use charger_core::hw::RegisterBus;
use charger_core::repl::commands::VoteController;
use charger_core::repl::status::StatusSnapshot;
use charger_core::sequencer::PlatformUseCaseHooks;
use charger_core::telemetry::TelemetryRecorder;
#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::signal::Signal;

use crate::telemetry;

#[cfg(target_os = "none")]
pub type ChargerMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
pub type ChargerMutex = NoopRawMutex;

/// Arbiter shared by every vote producer.
pub type ChargerArbiter<H> = ModeArbiter<ChargerMutex, H>;

/// Wakes the service after the election or device readiness changed.
pub type CycleRequest = Signal<ChargerMutex, ()>;

/// Read access to the arbiter state for front-ends.
pub trait StatusSource {
    fn status(&self) -> StatusSnapshot;
}

/// Producer-side view of the arbiter.
pub struct ChargerHandle<'a, H> {
    arbiter: &'a ChargerArbiter<H>,
    wake: &'a CycleRequest,
}

impl<H> Clone for ChargerHandle<'_, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H> Copy for ChargerHandle<'_, H> {}

impl<'a, H> ChargerHandle<'a, H>
where
    H: PlatformUseCaseHooks,
{
    pub const fn new(arbiter: &'a ChargerArbiter<H>, wake: &'a CycleRequest) -> Self {
        Self { arbiter, wake }
    }
}

impl<H> VoteController for ChargerHandle<'_, H>
where
    H: PlatformUseCaseHooks,
{
    fn cast_vote(&self, reason: &str, value: ModeRequest) -> Result<bool, VoteError> {
        let changed = self.arbiter.cast_vote(reason, value)?;
        if changed {
            self.wake.signal(());
        }
        Ok(changed)
    }

    fn withdraw_vote(&self, reason: &str) -> bool {
        let removed = self.arbiter.withdraw_vote(reason);
        if removed {
            self.wake.signal(());
        }
        removed
    }

    fn set_device_ready(&self, ready: bool) {
        self.arbiter.set_device_ready(ready);
        self.wake.signal(());
    }
}

impl<H> StatusSource for ChargerHandle<'_, H>
where
    H: PlatformUseCaseHooks,
{
    fn status(&self) -> StatusSnapshot {
        self.arbiter.status()
    }
}

/// Owner of the register bus; runs every arbitration cycle.
pub struct ChargerService<'a, H, B> {
    arbiter: &'a ChargerArbiter<H>,
    wake: &'a CycleRequest,
    regs: B,
    telemetry: TelemetryRecorder<Duration>,
    /// Uptime at which a deferred cycle is due.
    retry_at: Option<Duration>,
}

impl<'a, H, B> ChargerService<'a, H, B>
where
    H: PlatformUseCaseHooks,
    B: RegisterBus,
{
    pub const fn new(arbiter: &'a ChargerArbiter<H>, wake: &'a CycleRequest, regs: B) -> Self {
        Self {
            arbiter,
            wake,
            regs,
            telemetry: TelemetryRecorder::new(),
            retry_at: None,
        }
    }

    pub fn telemetry(&self) -> &TelemetryRecorder<Duration> {
        &self.telemetry
    }

    /// Runs one cycle at `now` and mirrors its telemetry to the log.
    ///
    /// A suspended device parks the retry: resuming goes through
    /// [`ChargerHandle`], which wakes the service again.
    pub fn cycle(&mut self, now: Duration) -> CycleOutcome {
        let first = self.telemetry.next_id();
        let outcome = self
            .arbiter
            .resolve_and_apply(&mut self.regs, &mut self.telemetry, now);

        for record in self.telemetry.since(first) {
            telemetry::log_record(record);
        }
        telemetry::log_outcome(&outcome);

        self.retry_at = match outcome.error() {
            Some(ArbiterError::DeviceNotReady) => None,
            _ => outcome.retry_after().map(|delay| now + delay),
        };
        outcome
    }

    /// Time left before the deferred cycle is due, if one is pending.
    pub fn retry_delay(&self, now: Duration) -> Option<Duration> {
        self.retry_at.map(|at| at.saturating_sub(now))
    }

    /// Serves wake requests and deferred retries forever.
    #[cfg(target_os = "none")]
    pub async fn run(mut self) -> ! {
        use embassy_futures::select::select;
        use embassy_time::Timer;

        loop {
            match self.retry_delay(uptime()) {
                Some(delay) => {
                    let micros = u64::try_from(delay.as_micros()).unwrap_or(u64::MAX);
                    select(
                        self.wake.wait(),
                        Timer::after(embassy_time::Duration::from_micros(micros)),
                    )
                    .await;
                }
                None => self.wake.wait().await,
            }

            self.cycle(uptime());
            crate::status::publish(&self.arbiter.status());
        }
    }
}

#[cfg(target_os = "none")]
fn uptime() -> Duration {
    Duration::from_micros(embassy_time::Instant::now().as_micros())
}
