//! Retry and concurrency wrapper around the election and the sequencer.
//!
//! [`ModeArbiter`] is the only entry point callers need: votes are cast from
//! any context that can take the arbiter lock, and a single owner runs
//! [`ModeArbiter::resolve_and_apply`] to move the hardware. Election state and
//! sequencer state live behind the same blocking mutex so a cycle observes a
//! consistent vote map from aggregation through commit; the register bus is
//! passed in per cycle and typically guarded by its own, narrower lock
//! ([`crate::hw::LockedRegisters`]).

use core::cell::RefCell;
use core::fmt;
use core::time::Duration;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::election::{Election, ElectionResult, MAX_VOTES, ModeRequest, Vote, VoteError};
use crate::hw::{RegisterBus, RegisterError};
use crate::repl::commands::VoteController;
use crate::repl::status::StatusSnapshot;
use crate::sequencer::{
    PlatformUseCaseHooks, Sequencer, TransitionError, TransitionFault, TransitionReport,
    TransitionStep,
};
use crate::telemetry::{TelemetryEventKind, TelemetryInstant, TelemetryPayload, TelemetryRecorder};
use crate::usecase::{
    HardwareModeValue, ResolveError, ResolverPolicy, UseCase, resolve, select_inputs,
};

/// Delay requested before a deferred cycle is re-run.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Arbiter tuning.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ArbiterConfig {
    pub retry_delay: Duration,
    pub policy: ResolverPolicy,
}

impl ArbiterConfig {
    #[must_use]
    pub const fn new(policy: ResolverPolicy) -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            policy,
        }
    }
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self::new(ResolverPolicy::default())
    }
}

/// Error taxonomy surfaced by arbitration cycles.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ArbiterError {
    /// The charger device is suspended; nothing was touched.
    DeviceNotReady,
    /// A transition step asked to be retried later.
    RetryLater,
    /// The requests cannot be satisfied together.
    InvalidCombination(ResolveError),
    /// A register or hook failure; the hardware was forced to standby.
    HardwareIo(TransitionFault),
}

impl fmt::Display for ArbiterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArbiterError::DeviceNotReady => f.write_str("device not ready"),
            ArbiterError::RetryLater => f.write_str("hardware asked to retry later"),
            ArbiterError::InvalidCombination(error) => write!(f, "invalid combination: {error}"),
            ArbiterError::HardwareIo(fault) => write!(f, "hardware i/o: {fault}"),
        }
    }
}

/// Result of one arbitration cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CycleOutcome {
    /// The election is empty; hardware and published result were kept.
    Idle,
    Applied(TransitionReport),
    /// The cycle should be re-run after `retry_after`.
    Deferred {
        cause: ArbiterError,
        retry_after: Duration,
    },
    /// The requests conflict; hardware and published result were kept.
    Rejected(ResolveError),
    /// A hardware fault forced the charger back to standby.
    Recovered(ArbiterError),
}

impl CycleOutcome {
    /// Delay before the cycle must run again, if any.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            CycleOutcome::Deferred { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Error carried by the outcome, if the cycle did not complete.
    #[must_use]
    pub const fn error(&self) -> Option<ArbiterError> {
        match self {
            CycleOutcome::Idle | CycleOutcome::Applied(_) => None,
            CycleOutcome::Deferred { cause, .. } => Some(*cause),
            CycleOutcome::Rejected(error) => Some(ArbiterError::InvalidCombination(*error)),
            CycleOutcome::Recovered(error) => Some(*error),
        }
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Idle => f.write_str("idle"),
            CycleOutcome::Applied(report) => {
                write!(f, "applied {} -> {} mode={}", report.from, report.to, report.mode)?;
                if report.transited_standby {
                    f.write_str(" via STANDBY")?;
                }
                Ok(())
            }
            CycleOutcome::Deferred { cause, retry_after } => {
                write!(f, "deferred ({cause}), retry in {}ms", retry_after.as_millis())
            }
            CycleOutcome::Rejected(error) => write!(f, "rejected: {error}"),
            CycleOutcome::Recovered(error) => write!(f, "recovered to STANDBY after {error}"),
        }
    }
}

struct ArbiterState<H, const CAPACITY: usize> {
    election: Election<CAPACITY>,
    sequencer: Sequencer<H>,
    device_ready: bool,
    retry_pending: bool,
    retry_attempts: u32,
}

impl<H, const CAPACITY: usize> ArbiterState<H, CAPACITY>
where
    H: PlatformUseCaseHooks,
{
    fn defer<I, const N: usize>(
        &mut self,
        config: &ArbiterConfig,
        cause: ArbiterError,
        telemetry: &mut TelemetryRecorder<I, N>,
        step: Option<TransitionStep>,
        now: I,
    ) -> CycleOutcome
    where
        I: TelemetryInstant,
    {
        self.retry_pending = true;
        self.retry_attempts = self.retry_attempts.saturating_add(1);
        telemetry.record_retry(step, config.retry_delay, self.retry_attempts, now);
        CycleOutcome::Deferred {
            cause,
            retry_after: config.retry_delay,
        }
    }

    fn settle(&mut self) {
        self.retry_pending = false;
        self.retry_attempts = 0;
    }

    fn run_cycle<B, I, const N: usize>(
        &mut self,
        config: &ArbiterConfig,
        regs: &mut B,
        telemetry: &mut TelemetryRecorder<I, N>,
        now: I,
    ) -> CycleOutcome
    where
        B: RegisterBus,
        I: TelemetryInstant,
    {
        if !self.device_ready {
            return self.defer(config, ArbiterError::DeviceNotReady, telemetry, None, now);
        }

        self.election.take_dirty();
        let snapshot = self.election.snapshot();

        if snapshot.is_empty() {
            self.settle();
            telemetry.record(TelemetryEventKind::NoVotes, TelemetryPayload::none(), now);
            return CycleOutcome::Idle;
        }

        let current = self.sequencer.current_use_case();
        let target = match resolve(&snapshot, current, config.policy) {
            Ok(target) => target,
            Err(error) => {
                self.settle();
                telemetry.record(
                    TelemetryEventKind::CombinationRejected,
                    TelemetryPayload::none(),
                    now,
                );
                return CycleOutcome::Rejected(error);
            }
        };
        telemetry.record_resolution(current, target.use_case, target.mode, now);

        let inputs = select_inputs(&snapshot, current, config.policy);

        match self.sequencer.transition(regs, target, inputs) {
            Ok(report) => {
                self.settle();
                telemetry.record_inputs(report.inputs, now);
                telemetry.record_transition(&report, now);
                self.election.publish(report.mode);
                CycleOutcome::Applied(report)
            }
            Err(TransitionError::RetryLater(step)) => {
                self.defer(config, ArbiterError::RetryLater, telemetry, Some(step), now)
            }
            Err(TransitionError::Fault(fault)) => {
                let recovered = self.sequencer.force_standby(regs).is_ok();
                telemetry.record_forced_standby(fault.step, fault.cause, recovered, now);
                self.election.publish_error();
                self.settle();
                CycleOutcome::Recovered(ArbiterError::HardwareIo(fault))
            }
        }
    }
}

/// Election, sequencer, and retry bookkeeping behind one lock.
pub struct ModeArbiter<M, H, const CAPACITY: usize = MAX_VOTES>
where
    M: RawMutex,
{
    config: ArbiterConfig,
    state: Mutex<M, RefCell<ArbiterState<H, CAPACITY>>>,
}

impl<M, H, const CAPACITY: usize> ModeArbiter<M, H, CAPACITY>
where
    M: RawMutex,
    H: PlatformUseCaseHooks,
{
    /// Creates an arbiter with an empty election and the hardware assumed in standby.
    pub const fn new(config: ArbiterConfig, hooks: H) -> Self {
        Self {
            config,
            state: Mutex::new(RefCell::new(ArbiterState {
                election: Election::new(),
                sequencer: Sequencer::new(hooks),
                device_ready: true,
                retry_pending: false,
                retry_attempts: 0,
            })),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ArbiterState<H, CAPACITY>) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Adds or replaces a vote. Hardware is not touched until the next cycle.
    ///
    /// # Errors
    ///
    /// Propagates [`VoteError`] from the election.
    pub fn cast_vote(&self, reason: &str, value: ModeRequest) -> Result<bool, VoteError> {
        self.with_state(|state| state.election.cast(reason, value))
    }

    /// Removes a vote, returning whether the reason held one.
    pub fn withdraw_vote(&self, reason: &str) -> bool {
        self.with_state(|state| state.election.withdraw(reason))
    }

    #[must_use]
    pub fn current_use_case(&self) -> UseCase {
        self.with_state(|state| state.sequencer.current_use_case())
    }

    #[must_use]
    pub fn current_mode_value(&self) -> HardwareModeValue {
        self.with_state(|state| state.sequencer.current_mode())
    }

    /// Most recently published result, `None` before the first applied cycle.
    #[must_use]
    pub fn election_result(&self) -> Option<ElectionResult> {
        self.with_state(|state| state.election.current().cloned())
    }

    #[must_use]
    pub fn vote_count(&self) -> usize {
        self.with_state(|state| state.election.len())
    }

    /// Runs `f` over the current votes in insertion order.
    pub fn with_votes<R>(&self, f: impl FnOnce(&[Vote]) -> R) -> R {
        self.with_state(|state| f(state.election.votes()))
    }

    /// Runs `f` with exclusive access to the platform hooks.
    pub fn with_hooks<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        self.with_state(|state| f(state.sequencer.hooks_mut()))
    }

    /// Marks the charger device suspended or resumed.
    ///
    /// Resuming marks a retry pending so the owner re-runs the cycle.
    pub fn set_device_ready(&self, ready: bool) {
        self.with_state(|state| {
            if ready && !state.device_ready {
                state.retry_pending = true;
            }
            state.device_ready = ready;
        });
    }

    #[must_use]
    pub fn is_device_ready(&self) -> bool {
        self.with_state(|state| state.device_ready)
    }

    /// Returns `true` when votes changed since the last cycle.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.with_state(|state| state.election.is_dirty())
    }

    /// Returns `true` when a deferred cycle is waiting to be re-run.
    #[must_use]
    pub fn retry_pending(&self) -> bool {
        self.with_state(|state| state.retry_pending)
    }

    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        self.with_state(|state| StatusSnapshot {
            use_case: state.sequencer.current_use_case(),
            mode: state.sequencer.current_mode(),
            inputs: state.sequencer.applied_inputs(),
            result: state.election.current().cloned(),
            vote_count: state.election.len(),
            device_ready: state.device_ready,
            retry_pending: state.retry_pending,
        })
    }

    /// Runs one arbitration cycle: aggregate, resolve, select inputs, and
    /// sequence the hardware to the resolved use case.
    ///
    /// Never panics; every failure is reported through [`CycleOutcome`].
    pub fn resolve_and_apply<B, I, const N: usize>(
        &self,
        regs: &mut B,
        telemetry: &mut TelemetryRecorder<I, N>,
        now: I,
    ) -> CycleOutcome
    where
        B: RegisterBus,
        I: TelemetryInstant,
    {
        self.with_state(|state| state.run_cycle(&self.config, regs, telemetry, now))
    }

    /// Forces the hardware back to standby outside of a cycle.
    ///
    /// # Errors
    ///
    /// Returns the first register error; the sequencer records standby regardless.
    pub fn force_standby<B>(&self, regs: &mut B) -> Result<(), RegisterError>
    where
        B: RegisterBus,
    {
        self.with_state(|state| {
            let result = state.sequencer.force_standby(regs);
            state.election.publish_error();
            result
        })
    }
}

impl<M, H, const CAPACITY: usize> VoteController for ModeArbiter<M, H, CAPACITY>
where
    M: RawMutex,
    H: PlatformUseCaseHooks,
{
    fn cast_vote(&self, reason: &str, value: ModeRequest) -> Result<bool, VoteError> {
        ModeArbiter::cast_vote(self, reason, value)
    }

    fn withdraw_vote(&self, reason: &str) -> bool {
        ModeArbiter::withdraw_vote(self, reason)
    }

    fn set_device_ready(&self, ready: bool) {
        ModeArbiter::set_device_ready(self, ready);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::SymbolicMode;
    use crate::hw::regs;
    use crate::sequencer::NoopHooks;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    struct Registers {
        file: [u8; 256],
        busy: bool,
    }

    impl Registers {
        fn new() -> Self {
            Self {
                file: [0; 256],
                busy: false,
            }
        }
    }

    impl RegisterBus for Registers {
        fn read(&mut self, addr: u8) -> Result<u8, RegisterError> {
            Ok(self.file[usize::from(addr)])
        }

        fn write(&mut self, addr: u8, value: u8) -> Result<(), RegisterError> {
            if self.busy && addr == regs::MODE_REGISTER {
                return Err(RegisterError::Busy);
            }
            self.file[usize::from(addr)] = value;
            Ok(())
        }
    }

    type TestArbiter = ModeArbiter<NoopRawMutex, NoopHooks>;

    fn arbiter() -> TestArbiter {
        ModeArbiter::new(ArbiterConfig::default(), NoopHooks)
    }

    #[test]
    fn empty_election_is_idle() {
        let arbiter = arbiter();
        let mut regs = Registers::new();
        let mut telemetry = TelemetryRecorder::<Duration>::new();

        let outcome = arbiter.resolve_and_apply(&mut regs, &mut telemetry, Duration::ZERO);
        assert_eq!(outcome, CycleOutcome::Idle);
        assert_eq!(arbiter.election_result(), None);
        assert_eq!(
            telemetry.latest().map(|record| record.event),
            Some(TelemetryEventKind::NoVotes)
        );
    }

    #[test]
    fn applied_cycle_publishes_last_reason() {
        let arbiter = arbiter();
        let mut regs = Registers::new();
        let mut telemetry = TelemetryRecorder::<Duration>::new();

        arbiter
            .cast_vote("USB", SymbolicMode::ChargerBuckOn.into())
            .expect("vote");
        arbiter
            .cast_vote("BATT", SymbolicMode::ChargerBuckOn.into())
            .expect("vote");
        assert!(arbiter.is_dirty());

        let outcome = arbiter.resolve_and_apply(&mut regs, &mut telemetry, Duration::ZERO);
        match outcome {
            CycleOutcome::Applied(report) => {
                assert_eq!(report.to, UseCase::UsbChg);
                assert_eq!(report.mode, HardwareModeValue::CHGR_BUCK_ON);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let result = arbiter.election_result().expect("published");
        assert_eq!(result.reason.as_str(), "BATT");
        assert_eq!(result.mode, HardwareModeValue::CHGR_BUCK_ON);
        assert!(!arbiter.is_dirty());
    }

    #[test]
    fn suspended_device_defers_without_touching_hardware() {
        let arbiter = arbiter();
        let mut regs = Registers::new();
        let mut telemetry = TelemetryRecorder::<Duration>::new();

        arbiter.set_device_ready(false);
        arbiter.cast_vote("WLC", SymbolicMode::WlcRx.into()).expect("vote");

        let outcome = arbiter.resolve_and_apply(&mut regs, &mut telemetry, Duration::ZERO);
        assert_eq!(
            outcome,
            CycleOutcome::Deferred {
                cause: ArbiterError::DeviceNotReady,
                retry_after: DEFAULT_RETRY_DELAY,
            }
        );
        assert!(regs.file.iter().all(|value| *value == 0));
        assert!(arbiter.retry_pending());

        arbiter.set_device_ready(true);
        let outcome = arbiter.resolve_and_apply(&mut regs, &mut telemetry, Duration::from_millis(50));
        assert!(matches!(outcome, CycleOutcome::Applied(_)));
        assert!(!arbiter.retry_pending());
    }

    #[test]
    fn busy_commit_is_deferred() {
        let arbiter = arbiter();
        let mut regs = Registers::new();
        regs.busy = true;
        let mut telemetry = TelemetryRecorder::<Duration>::new();

        arbiter.cast_vote("WLC", SymbolicMode::WlcRx.into()).expect("vote");
        let outcome = arbiter.resolve_and_apply(&mut regs, &mut telemetry, Duration::ZERO);

        assert_eq!(outcome.retry_after(), Some(DEFAULT_RETRY_DELAY));
        assert_eq!(arbiter.current_use_case(), UseCase::Standby);
        assert_eq!(arbiter.election_result(), None);
        assert_eq!(
            telemetry.latest().map(|record| record.event),
            Some(TelemetryEventKind::RetryScheduled)
        );
    }

    #[test]
    fn status_reflects_state() {
        let arbiter = arbiter();
        let mut regs = Registers::new();
        let mut telemetry = TelemetryRecorder::<Duration>::new();

        arbiter.cast_vote("WLC", SymbolicMode::WlcRx.into()).expect("vote");
        arbiter.resolve_and_apply(&mut regs, &mut telemetry, Duration::ZERO);

        let status = arbiter.status();
        assert_eq!(status.use_case, UseCase::WlcRx);
        assert_eq!(status.mode, HardwareModeValue::BUCK_ON);
        assert_eq!(status.vote_count, 1);
        assert!(status.device_ready);
        assert!(!status.retry_pending);
    }
}
