//! Input-select policy.
//!
//! The physical input switch is a separate hardware block from the mode
//! register, so it is recomputed from the same snapshot on every cycle and
//! re-applied even when the use case does not change.

use core::fmt;

use super::{ResolverPolicy, UseCase};
use crate::election::RequestSnapshot;

/// Set of input paths allowed to conduct.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct InputMask(u8);

impl InputMask {
    pub const NONE: Self = Self(0);
    pub const WIRED: Self = Self(0b01);
    pub const WIRELESS: Self = Self(0b10);
    pub const BOTH: Self = Self(0b11);

    /// Builds a mask from raw bits, discarding unknown ones.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::BOTH.0)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Label used by logs and the status surface.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self.0 {
            0b01 => "wired",
            0b10 => "wireless",
            0b11 => "wired+wireless",
            _ => "none",
        }
    }
}

impl fmt::Display for InputMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selection applied when recovering to the safe baseline.
pub const DEFAULT_SAFE_INPUTS: InputMask = InputMask::BOTH;

/// Input selection for one cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InputSelection {
    /// Mask applied before the transition.
    pub mask: InputMask,
    /// Mask applied by the finish step once the new mode is live.
    pub settle: Option<InputMask>,
}

impl InputSelection {
    #[must_use]
    pub const fn new(mask: InputMask) -> Self {
        Self { mask, settle: None }
    }

    /// Returns `true` for the pre-computed selection that skips fail-open.
    #[must_use]
    pub const fn is_forced(&self) -> bool {
        self.settle.is_some()
    }

    /// Mask left in place after the cycle completes.
    #[must_use]
    pub const fn final_mask(&self) -> InputMask {
        match self.settle {
            Some(mask) => mask,
            None => self.mask,
        }
    }
}

/// Computes which inputs may conduct for `snapshot`.
///
/// Leaving wireless TX while TX is no longer requested keeps the wireless
/// input off until the finish step, avoiding inrush while the coil turns
/// around; every other selection fails open to any path not explicitly
/// suspended.
#[must_use]
pub fn select_inputs(
    snapshot: &RequestSnapshot,
    current: UseCase,
    policy: ResolverPolicy,
) -> InputSelection {
    if snapshot.fwupdate > 0 || snapshot.use_raw() {
        return InputSelection::new(DEFAULT_SAFE_INPUTS);
    }

    let normal = settled_inputs(snapshot, policy);

    if current == UseCase::WlcTx && snapshot.wlc_tx == 0 {
        return InputSelection {
            mask: normal.without(InputMask::WIRELESS),
            settle: Some(normal),
        };
    }

    InputSelection::new(normal)
}

fn settled_inputs(snapshot: &RequestSnapshot, policy: ResolverPolicy) -> InputMask {
    let suspended = explicitly_suspended(snapshot);

    let mask = if snapshot.usb_wlc > 0 {
        InputMask::WIRED
    } else {
        let wired = snapshot.wired_on();
        let mut mask = InputMask::NONE;
        if wired {
            mask = mask.union(InputMask::WIRED);
        }
        if snapshot.wireless_rx() && (!wired || policy.dcin_is_dock) {
            mask = mask.union(InputMask::WIRELESS);
        }
        mask
    };

    let mask = mask.without(suspended);
    if !mask.is_empty() {
        return mask;
    }

    let mut fallback = InputMask::BOTH.without(suspended);
    if snapshot.wlc_tx > 0 || snapshot.usb_wlc > 0 {
        fallback = fallback.without(InputMask::WIRELESS);
    }
    fallback
}

fn explicitly_suspended(snapshot: &RequestSnapshot) -> InputMask {
    let mut suspended = InputMask::NONE;
    if snapshot.chgin_off > 0 {
        suspended = suspended.union(InputMask::WIRED);
    }
    if snapshot.wlcin_off > 0 {
        suspended = suspended.union(InputMask::WIRELESS);
    }
    suspended
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: ResolverPolicy = ResolverPolicy::new(false, false);

    fn select(snapshot: &RequestSnapshot, current: UseCase) -> InputSelection {
        select_inputs(snapshot, current, POLICY)
    }

    #[test]
    fn idle_fails_open() {
        let selection = select(&RequestSnapshot::off(), UseCase::Standby);
        assert_eq!(selection, InputSelection::new(InputMask::BOTH));
    }

    #[test]
    fn wired_turns_wireless_off() {
        let snapshot = RequestSnapshot {
            buck_on: 1,
            wlc_rx: 1,
            ..RequestSnapshot::off()
        };
        assert_eq!(select(&snapshot, UseCase::UsbChg).mask, InputMask::WIRED);

        let docked = select_inputs(&snapshot, UseCase::Dock, ResolverPolicy::new(true, false));
        assert_eq!(docked.mask, InputMask::BOTH);
    }

    #[test]
    fn usb_wlc_forces_wireless_off() {
        let snapshot = RequestSnapshot {
            usb_wlc: 1,
            wlc_rx: 1,
            ..RequestSnapshot::off()
        };
        assert_eq!(select(&snapshot, UseCase::UsbWlcRx).mask, InputMask::WIRED);
    }

    #[test]
    fn suspend_is_honoured_while_charging() {
        let snapshot = RequestSnapshot {
            buck_on: 2,
            chgr_on_votes: 2,
            chgin_off: 1,
            ..RequestSnapshot::off()
        };
        // Wired path suspended: fail open to the wireless path only.
        assert_eq!(select(&snapshot, UseCase::UsbChg).mask, InputMask::WIRELESS);
    }

    #[test]
    fn both_paths_suspended_stays_dark() {
        let snapshot = RequestSnapshot {
            chgin_off: 1,
            wlcin_off: 1,
            ..RequestSnapshot::off()
        };
        assert_eq!(select(&snapshot, UseCase::Standby).mask, InputMask::NONE);
    }

    #[test]
    fn leaving_tx_forces_wireless_off_until_finish() {
        let snapshot = RequestSnapshot {
            wlc_rx: 1,
            ..RequestSnapshot::off()
        };
        let selection = select(&snapshot, UseCase::WlcTx);
        assert!(selection.is_forced());
        assert_eq!(selection.mask, InputMask::NONE);
        assert_eq!(selection.settle, Some(InputMask::WIRELESS));
        assert_eq!(selection.final_mask(), InputMask::WIRELESS);
    }

    #[test]
    fn staying_in_tx_is_not_forced() {
        let snapshot = RequestSnapshot {
            wlc_tx: 1,
            ..RequestSnapshot::off()
        };
        let selection = select(&snapshot, UseCase::WlcTx);
        assert!(!selection.is_forced());
        assert_eq!(selection.mask, InputMask::WIRED);
    }

    #[test]
    fn raw_and_firmware_update_use_default_inputs() {
        let raw = RequestSnapshot {
            raw: Some(crate::usecase::HardwareModeValue::new(0x04)),
            chgin_off: 1,
            ..RequestSnapshot::off()
        };
        assert_eq!(select(&raw, UseCase::Standby).mask, DEFAULT_SAFE_INPUTS);

        let update = RequestSnapshot {
            fwupdate: 1,
            ..RequestSnapshot::off()
        };
        assert_eq!(select(&update, UseCase::UsbChg).mask, DEFAULT_SAFE_INPUTS);
    }
}
