//! Folds the vote map into a single [`RequestSnapshot`].
//!
//! The snapshot is recomputed on every cycle and never stored. Counters rather
//! than booleans are kept so the charger consensus rule can see how many
//! independent reasons asked for charging.

use super::{ModeRequest, SymbolicMode, Vote};
use crate::usecase::HardwareModeValue;

/// Independent `CHARGER_BUCK_ON` votes required before charging is enabled.
pub const CHARGER_ON_MIN_VOTES: u8 = 2;

/// Aggregate view of every vote in the election.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RequestSnapshot {
    pub stby_on: u8,
    pub chgin_off: u8,
    pub wlcin_off: u8,
    pub usb_wlc: u8,
    /// Votes that asked for charging, not just the buck.
    pub chgr_on_votes: u8,
    pub buck_on: u8,
    pub otg_on: u8,
    pub frs_on: u8,
    pub dc_on: u8,
    pub wlc_rx: u8,
    pub wlc_tx: u8,
    pub fwupdate: u8,
    /// First raw vote seen, if any.
    pub raw: Option<HardwareModeValue>,
    pub vote_count: u8,
}

impl RequestSnapshot {
    /// Snapshot of an empty election.
    #[must_use]
    pub const fn off() -> Self {
        Self {
            stby_on: 0,
            chgin_off: 0,
            wlcin_off: 0,
            usb_wlc: 0,
            chgr_on_votes: 0,
            buck_on: 0,
            otg_on: 0,
            frs_on: 0,
            dc_on: 0,
            wlc_rx: 0,
            wlc_tx: 0,
            fwupdate: 0,
            raw: None,
            vote_count: 0,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.vote_count == 0
    }

    #[must_use]
    pub const fn use_raw(&self) -> bool {
        self.raw.is_some()
    }

    /// Charging consensus: enough charger votes and no standby vote.
    #[must_use]
    pub const fn charger_on(&self) -> bool {
        self.stby_on == 0 && self.chgr_on_votes >= CHARGER_ON_MIN_VOTES
    }

    /// Wired input requested and not suspended.
    #[must_use]
    pub const fn wired_on(&self) -> bool {
        self.buck_on > 0 && self.chgin_off == 0
    }

    /// Wireless receiver present and not suspended.
    #[must_use]
    pub const fn wireless_rx(&self) -> bool {
        self.wlc_rx > 0 && self.wlcin_off == 0
    }

    #[must_use]
    pub const fn otg_requested(&self) -> bool {
        self.otg_on > 0 || self.frs_on > 0
    }

    /// Counts one vote into the snapshot.
    pub fn include(&mut self, request: ModeRequest) {
        self.vote_count = self.vote_count.saturating_add(1);

        let mode = match request {
            ModeRequest::Raw(value) => {
                if self.raw.is_none() {
                    self.raw = Some(value);
                }
                return;
            }
            ModeRequest::Symbolic(mode) => mode,
        };

        let counter = match mode {
            SymbolicMode::StandbyOn => &mut self.stby_on,
            SymbolicMode::ChginOff => &mut self.chgin_off,
            SymbolicMode::WlcinOff => &mut self.wlcin_off,
            SymbolicMode::UsbWlcRx => &mut self.usb_wlc,
            SymbolicMode::ChargerBuckOn => {
                self.chgr_on_votes = self.chgr_on_votes.saturating_add(1);
                &mut self.buck_on
            }
            SymbolicMode::UsbBuckOn => &mut self.buck_on,
            SymbolicMode::OtgFrsOn => &mut self.frs_on,
            SymbolicMode::OtgOn => &mut self.otg_on,
            SymbolicMode::ChargerDc => &mut self.dc_on,
            SymbolicMode::WlcRx => &mut self.wlc_rx,
            SymbolicMode::WlcTx => &mut self.wlc_tx,
            SymbolicMode::FwUpdateBoost => &mut self.fwupdate,
        };
        *counter = counter.saturating_add(1);
    }
}

/// Folds every vote into a snapshot. An empty iterator yields [`RequestSnapshot::off`].
pub fn aggregate<'a, I>(votes: I) -> RequestSnapshot
where
    I: IntoIterator<Item = &'a Vote>,
{
    votes
        .into_iter()
        .fold(RequestSnapshot::off(), |mut snapshot, vote| {
            snapshot.include(vote.value);
            snapshot
        })
}
