//! Pure use-case resolution.
//!
//! [`resolve`] maps a [`RequestSnapshot`] and the use case currently driven by
//! the sequencer onto the next use case and its mode register value. Rules are
//! applied in priority order:
//!
//! 1. a firmware-update vote forces the system boost;
//! 2. a raw vote passes its value through unchanged;
//! 3. OTG or FRS requests go through [`resolve_otg`];
//! 4. wired and wireless requests are folded, with wired presence suppressing
//!    the wireless paths unless the board treats DCIN as a dock.
//!
//! Charger consensus picks between the buck-only and buck+charge mode values
//! without changing the use case.

use core::fmt;

use super::{HardwareModeValue, UseCase};
use crate::election::RequestSnapshot;

/// Board facts that change how requests resolve.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ResolverPolicy {
    /// DCIN is wired to a dock, which may feed power next to the USB input.
    pub dcin_is_dock: bool,
    /// OTG VBUS comes from an external boost instead of the charger's own.
    pub otg_uses_ext_boost: bool,
}

impl ResolverPolicy {
    #[must_use]
    pub const fn new(dcin_is_dock: bool, otg_uses_ext_boost: bool) -> Self {
        Self {
            dcin_is_dock,
            otg_uses_ext_boost,
        }
    }

    /// Returns `true` when VBUS in `use_case` comes from the external boost.
    #[must_use]
    pub const fn ext_boost_sources(self, use_case: UseCase) -> bool {
        self.otg_uses_ext_boost && matches!(use_case, UseCase::UsbOtg | UseCase::UsbOtgWlcRx)
    }
}

/// Target selected by the resolver.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Resolution {
    pub use_case: UseCase,
    pub mode: HardwareModeValue,
}

impl Resolution {
    #[must_use]
    pub const fn new(use_case: UseCase, mode: HardwareModeValue) -> Self {
        Self { use_case, mode }
    }

    /// The safe baseline.
    #[must_use]
    pub const fn standby() -> Self {
        Self::new(UseCase::Standby, HardwareModeValue::ALL_OFF)
    }
}

/// Request combinations with no valid hardware configuration.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResolveError {
    /// The coil cannot receive and transmit at the same time.
    WlcRxWithWlcTx,
    /// OTG and reverse wireless both need the boost.
    OtgWithWlcTx,
    /// Direct charging cannot run while VBUS is sourced.
    OtgWithDirectCharge,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolveError::WlcRxWithWlcTx => "wireless rx and tx requested together",
            ResolveError::OtgWithWlcTx => "otg requested together with wireless tx",
            ResolveError::OtgWithDirectCharge => "otg requested together with direct charging",
        })
    }
}

/// Resolves the snapshot into the next use case and mode value.
///
/// `current` is only consulted to keep an established fast-role-swap session
/// when a plain OTG vote joins it.
///
/// # Errors
///
/// Returns a [`ResolveError`] when the requests cannot be satisfied together.
pub fn resolve(
    snapshot: &RequestSnapshot,
    current: UseCase,
    policy: ResolverPolicy,
) -> Result<Resolution, ResolveError> {
    if snapshot.fwupdate > 0 {
        return Ok(Resolution::new(UseCase::FwUpdate, HardwareModeValue::BOOST_ON));
    }

    if let Some(raw) = snapshot.raw {
        return Ok(Resolution::new(UseCase::Raw, raw));
    }

    if snapshot.otg_requested() {
        return resolve_otg(snapshot, current, policy);
    }

    let wired = snapshot.wired_on();
    let dc = snapshot.dc_on > 0;
    let mut wlc_rx = snapshot.wireless_rx();
    let mut wlc_tx = snapshot.wlc_tx > 0;

    if wlc_rx && wlc_tx {
        return Err(ResolveError::WlcRxWithWlcTx);
    }

    if wlc_tx && dc {
        wlc_tx = false;
    }

    if wired {
        wlc_tx = false;
        if !policy.dcin_is_dock {
            wlc_rx = false;
        }
    }

    if snapshot.usb_wlc > 0 {
        return Ok(Resolution::new(
            UseCase::UsbWlcRx,
            HardwareModeValue::CHGR_BUCK_ON,
        ));
    }

    if !wired && !wlc_rx {
        return Ok(if wlc_tx {
            Resolution::new(UseCase::WlcTx, HardwareModeValue::BOOST_UNO_ON)
        } else {
            Resolution::standby()
        });
    }

    let inflow = inflow_mode(snapshot);

    let resolution = if wlc_rx {
        if dc {
            Resolution::new(UseCase::WlcDc, HardwareModeValue::ALL_OFF)
        } else if policy.dcin_is_dock {
            Resolution::new(UseCase::Dock, inflow)
        } else {
            Resolution::new(UseCase::WlcRx, inflow)
        }
    } else if dc {
        Resolution::new(UseCase::UsbDc, HardwareModeValue::ALL_OFF)
    } else {
        Resolution::new(UseCase::UsbChg, inflow)
    };

    Ok(resolution)
}

/// Resolves requests that involve sourcing VBUS.
///
/// # Errors
///
/// Rejects OTG together with wireless TX or direct charging, and wireless RX
/// together with TX.
pub fn resolve_otg(
    snapshot: &RequestSnapshot,
    current: UseCase,
    policy: ResolverPolicy,
) -> Result<Resolution, ResolveError> {
    let wlc_rx = snapshot.wireless_rx();
    let wlc_tx = snapshot.wlc_tx > 0;

    if wlc_rx && wlc_tx {
        return Err(ResolveError::WlcRxWithWlcTx);
    }
    if wlc_tx {
        return Err(ResolveError::OtgWithWlcTx);
    }
    if snapshot.dc_on > 0 {
        return Err(ResolveError::OtgWithDirectCharge);
    }

    if wlc_rx {
        // The external boost feeds VBUS; the charger only runs its buck.
        let mode = if policy.otg_uses_ext_boost {
            inflow_mode(snapshot)
        } else if snapshot.charger_on() {
            HardwareModeValue::CHGR_OTG_BUCK_BOOST_ON
        } else {
            HardwareModeValue::OTG_BUCK_BOOST_ON
        };
        return Ok(Resolution::new(UseCase::UsbOtgWlcRx, mode));
    }

    let frs = snapshot.frs_on > 0 && (snapshot.otg_on == 0 || current == UseCase::UsbOtgFrs);
    if frs {
        return Ok(Resolution::new(
            UseCase::UsbOtgFrs,
            HardwareModeValue::OTG_BOOST_ON,
        ));
    }

    let mode = if policy.otg_uses_ext_boost {
        HardwareModeValue::ALL_OFF
    } else {
        HardwareModeValue::OTG_BOOST_ON
    };
    Ok(Resolution::new(UseCase::UsbOtg, mode))
}

const fn inflow_mode(snapshot: &RequestSnapshot) -> HardwareModeValue {
    if snapshot.charger_on() {
        HardwareModeValue::CHGR_BUCK_ON
    } else {
        HardwareModeValue::BUCK_ON
    }
}
