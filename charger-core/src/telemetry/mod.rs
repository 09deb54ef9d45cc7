//! Telemetry event catalog and ring buffer shared by firmware and host targets.
//!
//! The arbitration engine never prints. Each cycle records strongly typed
//! events into a [`TelemetryRecorder`]; firmware mirrors new records to defmt
//! and the emulator renders them into its transcript. Event kinds encode to
//! compact numeric codes so they can be forwarded over diagnostics channels.

use core::{convert::TryFrom, fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::election::ModeRequest;
use crate::sequencer::{FaultCause, TransitionReport, TransitionStep};
use crate::usecase::{HardwareModeValue, InputMask, UseCase};

/// Monotonic identifier assigned to each record.
pub type EventId = u32;

/// Discriminated telemetry events emitted by the arbitration cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    VoteCast,
    VoteWithdrawn,
    /// A cycle ran with an empty election.
    NoVotes,
    UseCaseResolved(UseCase),
    CombinationRejected,
    InputsApplied,
    /// The sequencer passed through standby while leaving the given use case.
    StandbyTransit(UseCase),
    UseCaseEntered(UseCase),
    ModeCommitted,
    RetryScheduled,
    DeviceNotReady,
    ForcedStandby,
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::VoteCast => f.write_str("vote-cast"),
            TelemetryEventKind::VoteWithdrawn => f.write_str("vote-withdrawn"),
            TelemetryEventKind::NoVotes => f.write_str("no-votes"),
            TelemetryEventKind::UseCaseResolved(use_case) => write!(f, "resolved {use_case}"),
            TelemetryEventKind::CombinationRejected => f.write_str("combination-rejected"),
            TelemetryEventKind::InputsApplied => f.write_str("inputs-applied"),
            TelemetryEventKind::StandbyTransit(from) => write!(f, "standby-transit {from}"),
            TelemetryEventKind::UseCaseEntered(use_case) => write!(f, "entered {use_case}"),
            TelemetryEventKind::ModeCommitted => f.write_str("mode-committed"),
            TelemetryEventKind::RetryScheduled => f.write_str("retry-scheduled"),
            TelemetryEventKind::DeviceNotReady => f.write_str("device-not-ready"),
            TelemetryEventKind::ForcedStandby => f.write_str("forced-standby"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl TelemetryEventKind {
    const VOTE_CAST_CODE: u16 = 0x0001;
    const VOTE_WITHDRAWN_CODE: u16 = 0x0002;
    const NO_VOTES_CODE: u16 = 0x0003;
    const COMBINATION_REJECTED_CODE: u16 = 0x0004;
    const INPUTS_APPLIED_CODE: u16 = 0x0005;
    const MODE_COMMITTED_CODE: u16 = 0x0006;
    const RETRY_SCHEDULED_CODE: u16 = 0x0007;
    const DEVICE_NOT_READY_CODE: u16 = 0x0008;
    const FORCED_STANDBY_CODE: u16 = 0x0009;
    const RESOLVED_BASE: u16 = 0x0020;
    const STANDBY_TRANSIT_BASE: u16 = 0x0040;
    const ENTERED_BASE: u16 = 0x0060;
    const USE_CASE_SPAN: u16 = 0x0020;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::VoteCast => Self::VOTE_CAST_CODE,
            TelemetryEventKind::VoteWithdrawn => Self::VOTE_WITHDRAWN_CODE,
            TelemetryEventKind::NoVotes => Self::NO_VOTES_CODE,
            TelemetryEventKind::UseCaseResolved(use_case) => {
                Self::RESOLVED_BASE + use_case.as_index()
            }
            TelemetryEventKind::CombinationRejected => Self::COMBINATION_REJECTED_CODE,
            TelemetryEventKind::InputsApplied => Self::INPUTS_APPLIED_CODE,
            TelemetryEventKind::StandbyTransit(from) => {
                Self::STANDBY_TRANSIT_BASE + from.as_index()
            }
            TelemetryEventKind::UseCaseEntered(use_case) => Self::ENTERED_BASE + use_case.as_index(),
            TelemetryEventKind::ModeCommitted => Self::MODE_COMMITTED_CODE,
            TelemetryEventKind::RetryScheduled => Self::RETRY_SCHEDULED_CODE,
            TelemetryEventKind::DeviceNotReady => Self::DEVICE_NOT_READY_CODE,
            TelemetryEventKind::ForcedStandby => Self::FORCED_STANDBY_CODE,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`TelemetryEventKind::Custom`].
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        match code {
            Self::VOTE_CAST_CODE => TelemetryEventKind::VoteCast,
            Self::VOTE_WITHDRAWN_CODE => TelemetryEventKind::VoteWithdrawn,
            Self::NO_VOTES_CODE => TelemetryEventKind::NoVotes,
            Self::COMBINATION_REJECTED_CODE => TelemetryEventKind::CombinationRejected,
            Self::INPUTS_APPLIED_CODE => TelemetryEventKind::InputsApplied,
            Self::MODE_COMMITTED_CODE => TelemetryEventKind::ModeCommitted,
            Self::RETRY_SCHEDULED_CODE => TelemetryEventKind::RetryScheduled,
            Self::DEVICE_NOT_READY_CODE => TelemetryEventKind::DeviceNotReady,
            Self::FORCED_STANDBY_CODE => TelemetryEventKind::ForcedStandby,
            value if in_span(value, Self::RESOLVED_BASE) => {
                decode_use_case(value, Self::RESOLVED_BASE, TelemetryEventKind::UseCaseResolved)
            }
            value if in_span(value, Self::STANDBY_TRANSIT_BASE) => decode_use_case(
                value,
                Self::STANDBY_TRANSIT_BASE,
                TelemetryEventKind::StandbyTransit,
            ),
            value if in_span(value, Self::ENTERED_BASE) => {
                decode_use_case(value, Self::ENTERED_BASE, TelemetryEventKind::UseCaseEntered)
            }
            other => TelemetryEventKind::Custom(other),
        }
    }
}

fn in_span(value: u16, base: u16) -> bool {
    (base..base + TelemetryEventKind::USE_CASE_SPAN).contains(&value)
}

fn decode_use_case(
    value: u16,
    base: u16,
    build: fn(UseCase) -> TelemetryEventKind,
) -> TelemetryEventKind {
    UseCase::from_index(value - base).map_or(TelemetryEventKind::Custom(value), build)
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    None,
    Votes(VoteTelemetry),
    Transition(TransitionTelemetry),
    Inputs(InputMask),
    Retry(RetryTelemetry),
    Fault(FaultTelemetry),
}

impl TelemetryPayload {
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

/// Election state after a vote change.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VoteTelemetry {
    pub vote_count: u8,
    /// Value cast, `None` for a withdrawal.
    pub value: Option<ModeRequest>,
}

impl VoteTelemetry {
    #[must_use]
    pub const fn new(vote_count: u8, value: Option<ModeRequest>) -> Self {
        Self { vote_count, value }
    }
}

/// Use-case movement payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransitionTelemetry {
    pub from: UseCase,
    pub to: UseCase,
    pub mode: HardwareModeValue,
    pub transited_standby: bool,
    /// Time since the previous use-case entry, if one was recorded.
    pub elapsed_since_previous: Option<Duration>,
}

/// Deferred cycle payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryTelemetry {
    /// Step that asked for the retry, `None` when the device was not ready.
    pub step: Option<TransitionStep>,
    pub retry_after: Duration,
    pub attempts: u8,
}

impl RetryTelemetry {
    #[must_use]
    pub const fn new(step: Option<TransitionStep>, retry_after: Duration, attempts: u8) -> Self {
        Self {
            step,
            retry_after,
            attempts,
        }
    }
}

/// Hardware fault and recovery payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FaultTelemetry {
    pub step: TransitionStep,
    pub cause: FaultCause,
    /// `true` when the forced standby itself completed without error.
    pub recovered: bool,
}

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Monotonic instants used to timestamp telemetry.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Offset-since-boot timestamps.
impl TelemetryInstant for Duration {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.saturating_sub(earlier)
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    last_entry_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_entry_at: None,
            next_event_id: 0,
        }
    }

    /// Returns the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Identifier the next record will receive.
    #[must_use]
    pub const fn next_id(&self) -> EventId {
        self.next_event_id
    }

    /// Records still in the ring that were written at or after the mark
    /// `first` (a previous [`Self::next_id`]). Ids wrap, so membership is
    /// measured as the distance from `first`.
    pub fn since(&self, first: EventId) -> impl Iterator<Item = &TelemetryRecord<TInstant>> {
        let written = self.next_event_id.wrapping_sub(first);
        self.ring
            .oldest_ordered()
            .filter(move |record| record.id.wrapping_sub(first) < written)
    }

    /// Records an arbitrary event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }

    pub fn record_vote_cast(
        &mut self,
        vote_count: usize,
        value: ModeRequest,
        timestamp: TInstant,
    ) -> EventId {
        let payload =
            TelemetryPayload::Votes(VoteTelemetry::new(truncate_count(vote_count), Some(value)));
        self.record(TelemetryEventKind::VoteCast, payload, timestamp)
    }

    pub fn record_vote_withdrawn(&mut self, vote_count: usize, timestamp: TInstant) -> EventId {
        let payload = TelemetryPayload::Votes(VoteTelemetry::new(truncate_count(vote_count), None));
        self.record(TelemetryEventKind::VoteWithdrawn, payload, timestamp)
    }

    /// Records the resolver's choice for this cycle.
    pub fn record_resolution(
        &mut self,
        from: UseCase,
        to: UseCase,
        mode: HardwareModeValue,
        timestamp: TInstant,
    ) -> EventId {
        let payload = TelemetryPayload::Transition(TransitionTelemetry {
            from,
            to,
            mode,
            transited_standby: false,
            elapsed_since_previous: None,
        });
        self.record(TelemetryEventKind::UseCaseResolved(to), payload, timestamp)
    }

    pub fn record_inputs(&mut self, inputs: InputMask, timestamp: TInstant) -> EventId {
        self.record(
            TelemetryEventKind::InputsApplied,
            TelemetryPayload::Inputs(inputs),
            timestamp,
        )
    }

    /// Records a completed transition, emitting the standby transit, the use
    /// case entry, and the mode commit as separate events.
    ///
    /// Returns the id of the entry event.
    pub fn record_transition(&mut self, report: &TransitionReport, timestamp: TInstant) -> EventId {
        if report.transited_standby {
            self.record(
                TelemetryEventKind::StandbyTransit(report.from),
                TelemetryPayload::none(),
                timestamp,
            );
        }

        if report.mode_written {
            self.record(
                TelemetryEventKind::ModeCommitted,
                TelemetryPayload::none(),
                timestamp,
            );
        }

        let elapsed = self
            .last_entry_at
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_entry_at = Some(timestamp);

        let payload = TelemetryPayload::Transition(TransitionTelemetry {
            from: report.from,
            to: report.to,
            mode: report.mode,
            transited_standby: report.transited_standby,
            elapsed_since_previous: elapsed,
        });
        self.record(
            TelemetryEventKind::UseCaseEntered(report.to),
            payload,
            timestamp,
        )
    }

    pub fn record_retry(
        &mut self,
        step: Option<TransitionStep>,
        retry_after: Duration,
        attempts: u32,
        timestamp: TInstant,
    ) -> EventId {
        let event = if step.is_some() {
            TelemetryEventKind::RetryScheduled
        } else {
            TelemetryEventKind::DeviceNotReady
        };
        let payload = TelemetryPayload::Retry(RetryTelemetry::new(
            step,
            retry_after,
            truncate_attempts(attempts),
        ));
        self.record(event, payload, timestamp)
    }

    pub fn record_forced_standby(
        &mut self,
        step: TransitionStep,
        cause: FaultCause,
        recovered: bool,
        timestamp: TInstant,
    ) -> EventId {
        self.last_entry_at = Some(timestamp);
        let payload = TelemetryPayload::Fault(FaultTelemetry {
            step,
            cause,
            recovered,
        });
        self.record(TelemetryEventKind::ForcedStandby, payload, timestamp)
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_count(count: usize) -> u8 {
    match u8::try_from(count) {
        Ok(value) => value,
        Err(_) => u8::MAX,
    }
}

fn truncate_attempts(attempts: u32) -> u8 {
    match u8::try_from(attempts) {
        Ok(value) => value,
        Err(_) => u8::MAX,
    }
}
