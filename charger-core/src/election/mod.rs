//! Vote store for the charger mode election.
//!
//! Callers register a named reason together with the configuration they need.
//! Each reason holds exactly one vote; casting again replaces it. The store only
//! tracks votes and reports whether anything changed: aggregation, resolution,
//! and hardware work happen later in a separate cycle run by the owner of the
//! [`crate::arbiter::ModeArbiter`].

use core::fmt;

use heapless::{String, Vec};

use crate::usecase::HardwareModeValue;

pub mod aggregate;

pub use aggregate::{CHARGER_ON_MIN_VOTES, RequestSnapshot, aggregate};

/// Maximum number of concurrent reasons tracked by one election.
pub const MAX_VOTES: usize = 16;

/// Maximum length, in bytes, of a vote reason.
pub const MAX_REASON_LEN: usize = 24;

/// Reason published when recovery forced the hardware back to standby.
pub const ERROR_REASON: &str = "error";

/// Bounded reason string owned by the election.
pub type Reason = String<MAX_REASON_LEN>;

/// Symbolic configuration requests understood by the aggregator.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SymbolicMode {
    /// Keep the charger out of charging even when other votes ask for it.
    StandbyOn,
    /// Suspend the wired input path.
    ChginOff,
    /// Suspend the wireless input path.
    WlcinOff,
    /// Factory mode combining the USB buck and the wireless receiver.
    UsbWlcRx,
    /// Wired input present and charging requested.
    ChargerBuckOn,
    /// Wired input present, buck only.
    UsbBuckOn,
    /// Fast role swap armed by the USB-PD stack.
    OtgFrsOn,
    OtgOn,
    /// Direct charging through an external path.
    ChargerDc,
    /// Wireless receiver present.
    WlcRx,
    /// Reverse wireless charging requested.
    WlcTx,
    /// Accessory firmware update needs the system boost.
    FwUpdateBoost,
}

impl SymbolicMode {
    /// Every symbolic mode in declaration order.
    pub const ALL: [SymbolicMode; 12] = [
        SymbolicMode::StandbyOn,
        SymbolicMode::ChginOff,
        SymbolicMode::WlcinOff,
        SymbolicMode::UsbWlcRx,
        SymbolicMode::ChargerBuckOn,
        SymbolicMode::UsbBuckOn,
        SymbolicMode::OtgFrsOn,
        SymbolicMode::OtgOn,
        SymbolicMode::ChargerDc,
        SymbolicMode::WlcRx,
        SymbolicMode::WlcTx,
        SymbolicMode::FwUpdateBoost,
    ];

    /// Keyword used by the REPL and in logs.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            SymbolicMode::StandbyOn => "standby-on",
            SymbolicMode::ChginOff => "chgin-off",
            SymbolicMode::WlcinOff => "wlcin-off",
            SymbolicMode::UsbWlcRx => "usb-wlc-rx",
            SymbolicMode::ChargerBuckOn => "charger-buck-on",
            SymbolicMode::UsbBuckOn => "usb-buck-on",
            SymbolicMode::OtgFrsOn => "otg-frs-on",
            SymbolicMode::OtgOn => "otg-on",
            SymbolicMode::ChargerDc => "charger-dc",
            SymbolicMode::WlcRx => "wlc-rx",
            SymbolicMode::WlcTx => "wlc-tx",
            SymbolicMode::FwUpdateBoost => "fwupdate-boost",
        }
    }

    /// Looks a mode up by keyword (case insensitive).
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|mode| mode.keyword().eq_ignore_ascii_case(keyword))
    }
}

impl fmt::Display for SymbolicMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Value carried by a vote.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModeRequest {
    /// Forces a mode register value verbatim.
    Raw(HardwareModeValue),
    Symbolic(SymbolicMode),
}

impl fmt::Display for ModeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeRequest::Raw(value) => write!(f, "raw={value}"),
            ModeRequest::Symbolic(mode) => mode.fmt(f),
        }
    }
}

impl From<SymbolicMode> for ModeRequest {
    fn from(mode: SymbolicMode) -> Self {
        ModeRequest::Symbolic(mode)
    }
}

/// A single named request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Vote {
    pub reason: Reason,
    pub value: ModeRequest,
}

/// Mode published by the election together with the reason that produced it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ElectionResult {
    pub reason: Reason,
    pub mode: HardwareModeValue,
}

impl ElectionResult {
    /// Returns `true` when recovery produced this result.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.reason.as_str() == ERROR_REASON
    }
}

/// Errors reported while mutating the vote map.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VoteError {
    EmptyReason,
    ReasonTooLong { len: usize },
    ElectionFull,
}

impl fmt::Display for VoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteError::EmptyReason => f.write_str("vote reason is empty"),
            VoteError::ReasonTooLong { len } => write!(
                f,
                "vote reason is {len} bytes, limit is {MAX_REASON_LEN}"
            ),
            VoteError::ElectionFull => write!(f, "election already holds {MAX_VOTES} votes"),
        }
    }
}

/// Insertion-ordered map from reason to vote.
#[derive(Clone, Debug, Default)]
pub struct Election<const CAPACITY: usize = MAX_VOTES> {
    votes: Vec<Vote, CAPACITY>,
    last_reason: Option<Reason>,
    result: Option<ElectionResult>,
    dirty: bool,
}

impl<const CAPACITY: usize> Election<CAPACITY> {
    /// Creates an empty election.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            votes: Vec::new(),
            last_reason: None,
            result: None,
            dirty: false,
        }
    }

    /// Adds or replaces the vote held by `reason`.
    ///
    /// Returns `Ok(true)` when the map changed. Replacing a vote with the same
    /// value leaves the election clean.
    pub fn cast(&mut self, reason: &str, value: ModeRequest) -> Result<bool, VoteError> {
        let key = make_reason(reason)?;

        if let Some(existing) = self.votes.iter_mut().find(|vote| vote.reason == key) {
            if existing.value == value {
                return Ok(false);
            }
            existing.value = value;
        } else {
            self.votes
                .push(Vote {
                    reason: key.clone(),
                    value,
                })
                .map_err(|_| VoteError::ElectionFull)?;
        }

        self.mark_changed(key);
        Ok(true)
    }

    /// Removes the vote held by `reason`, returning `true` if one existed.
    pub fn withdraw(&mut self, reason: &str) -> bool {
        let Some(index) = self
            .votes
            .iter()
            .position(|vote| vote.reason.as_str() == reason)
        else {
            return false;
        };

        let removed = self.votes.remove(index);
        self.mark_changed(removed.reason);
        true
    }

    /// Returns the value currently held by `reason`.
    #[must_use]
    pub fn get(&self, reason: &str) -> Option<ModeRequest> {
        self.votes
            .iter()
            .find(|vote| vote.reason.as_str() == reason)
            .map(|vote| vote.value)
    }

    /// Returns the votes in insertion order.
    #[must_use]
    pub fn votes(&self) -> &[Vote] {
        &self.votes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Returns the most recently published result.
    #[must_use]
    pub fn current(&self) -> Option<&ElectionResult> {
        self.result.as_ref()
    }

    /// Reason of the most recent change to the vote map.
    #[must_use]
    pub fn last_reason(&self) -> Option<&str> {
        self.last_reason.as_deref()
    }

    /// Returns `true` when votes changed since the last [`Election::take_dirty`].
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears and returns the dirty flag.
    pub fn take_dirty(&mut self) -> bool {
        core::mem::take(&mut self.dirty)
    }

    /// Publishes a committed mode on behalf of the latest change.
    pub fn publish(&mut self, mode: HardwareModeValue) {
        let reason = self.last_reason.clone().unwrap_or_default();
        self.result = Some(ElectionResult { reason, mode });
    }

    /// Publishes the recovery result (`"error"`, [`HardwareModeValue::ALL_OFF`]).
    pub fn publish_error(&mut self) {
        let mut reason = Reason::new();
        // ERROR_REASON is shorter than MAX_REASON_LEN.
        let _ = reason.push_str(ERROR_REASON);
        self.result = Some(ElectionResult {
            reason,
            mode: HardwareModeValue::ALL_OFF,
        });
    }

    /// Folds the current votes into a [`RequestSnapshot`].
    #[must_use]
    pub fn snapshot(&self) -> RequestSnapshot {
        aggregate(self.votes.iter())
    }

    fn mark_changed(&mut self, reason: Reason) {
        self.last_reason = Some(reason);
        self.dirty = true;
    }
}

fn make_reason(reason: &str) -> Result<Reason, VoteError> {
    if reason.is_empty() {
        return Err(VoteError::EmptyReason);
    }

    let mut key = Reason::new();
    key.push_str(reason)
        .map_err(|_| VoteError::ReasonTooLong { len: reason.len() })?;
    Ok(key)
}
