//! Canonical charger use cases and the hardware mode values they map onto.
//!
//! A use case names one operating configuration of the charging subsystem
//! (charging from USB, reverse wireless power, OTG boost, ...). The resolver
//! picks one per cycle and the sequencer drives the hardware into it. The
//! `(from, to)` standby table lives here because both sides consult it.

use core::fmt;

pub mod insel;
pub mod resolver;

pub use insel::{DEFAULT_SAFE_INPUTS, InputMask, InputSelection, select_inputs};
pub use resolver::{Resolution, ResolveError, ResolverPolicy, resolve};

/// Opaque byte written into the charger mode register.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct HardwareModeValue(u8);

impl HardwareModeValue {
    /// Every converter, boost, and charge path disabled.
    pub const ALL_OFF: Self = Self(0x00);
    /// Input buck enabled without charging the battery.
    pub const BUCK_ON: Self = Self(0x04);
    /// Input buck enabled and the battery charging.
    pub const CHGR_BUCK_ON: Self = Self(0x05);
    /// Reverse boost feeding the wireless transmitter.
    pub const BOOST_UNO_ON: Self = Self(0x08);
    /// System boost used while flashing accessory firmware.
    pub const BOOST_ON: Self = Self(0x09);
    /// Boost sourcing VBUS for an OTG peripheral.
    pub const OTG_BOOST_ON: Self = Self(0x0A);
    pub const BUCK_BOOST_UNO_ON: Self = Self(0x0C);
    pub const CHGR_BUCK_BOOST_UNO_ON: Self = Self(0x0D);
    /// OTG boost while the wireless input keeps the buck running.
    pub const OTG_BUCK_BOOST_ON: Self = Self(0x0E);
    /// OTG boost while the wireless input keeps charging the battery.
    pub const CHGR_OTG_BUCK_BOOST_ON: Self = Self(0x0F);

    /// Wraps a raw register value.
    #[must_use]
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// Returns the raw register value.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Returns the symbolic name when the value is one of the documented modes.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            0x00 => Some("ALL_OFF"),
            0x04 => Some("BUCK_ON"),
            0x05 => Some("CHGR_BUCK_ON"),
            0x08 => Some("BOOST_UNO_ON"),
            0x09 => Some("BOOST_ON"),
            0x0A => Some("OTG_BOOST_ON"),
            0x0C => Some("BUCK_BOOST_UNO_ON"),
            0x0D => Some("CHGR_BUCK_BOOST_UNO_ON"),
            0x0E => Some("OTG_BUCK_BOOST_ON"),
            0x0F => Some("CHGR_OTG_BUCK_BOOST_ON"),
            _ => None,
        }
    }
}

impl fmt::Display for HardwareModeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}(0x{:02x})", self.0),
            None => write!(f, "0x{:02x}", self.0),
        }
    }
}

/// Canonical operating configurations of the charging subsystem.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum UseCase {
    /// Safe baseline with every charge and boost path disabled.
    #[default]
    Standby,
    UsbChg,
    UsbDc,
    WlcRx,
    WlcDc,
    /// Reverse wireless charging of an accessory.
    WlcTx,
    UsbOtg,
    /// OTG entered through a USB-PD fast role swap.
    UsbOtgFrs,
    UsbOtgWlcRx,
    /// Factory mode keeping the USB buck and wireless receiver alive together.
    UsbWlcRx,
    Dock,
    FwUpdate,
    /// Mode value forced verbatim by a raw vote.
    Raw,
}

impl UseCase {
    /// Every use case in declaration order.
    pub const ALL: [UseCase; 13] = [
        UseCase::Standby,
        UseCase::UsbChg,
        UseCase::UsbDc,
        UseCase::WlcRx,
        UseCase::WlcDc,
        UseCase::WlcTx,
        UseCase::UsbOtg,
        UseCase::UsbOtgFrs,
        UseCase::UsbOtgWlcRx,
        UseCase::UsbWlcRx,
        UseCase::Dock,
        UseCase::FwUpdate,
        UseCase::Raw,
    ];

    /// Canonical upper-case label used in logs and status output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            UseCase::Standby => "STANDBY",
            UseCase::UsbChg => "USB_CHG",
            UseCase::UsbDc => "USB_DC",
            UseCase::WlcRx => "WLC_RX",
            UseCase::WlcDc => "WLC_DC",
            UseCase::WlcTx => "WLC_TX",
            UseCase::UsbOtg => "USB_OTG",
            UseCase::UsbOtgFrs => "USB_OTG_FRS",
            UseCase::UsbOtgWlcRx => "USB_OTG_WLC_RX",
            UseCase::UsbWlcRx => "USB_WLC_RX",
            UseCase::Dock => "DOCK",
            UseCase::FwUpdate => "FWUPDATE",
            UseCase::Raw => "RAW",
        }
    }

    /// Stable index used by the telemetry codes.
    #[must_use]
    pub const fn as_index(self) -> u16 {
        match self {
            UseCase::Standby => 0,
            UseCase::UsbChg => 1,
            UseCase::UsbDc => 2,
            UseCase::WlcRx => 3,
            UseCase::WlcDc => 4,
            UseCase::WlcTx => 5,
            UseCase::UsbOtg => 6,
            UseCase::UsbOtgFrs => 7,
            UseCase::UsbOtgWlcRx => 8,
            UseCase::UsbWlcRx => 9,
            UseCase::Dock => 10,
            UseCase::FwUpdate => 11,
            UseCase::Raw => 12,
        }
    }

    /// Inverse of [`UseCase::as_index`].
    #[must_use]
    pub const fn from_index(index: u16) -> Option<Self> {
        if (index as usize) < Self::ALL.len() {
            Some(Self::ALL[index as usize])
        } else {
            None
        }
    }

    /// Returns `true` for the use cases that source VBUS through the OTG boost.
    #[must_use]
    pub const fn is_otg(self) -> bool {
        matches!(
            self,
            UseCase::UsbOtg | UseCase::UsbOtgFrs | UseCase::UsbOtgWlcRx
        )
    }

    /// Returns `true` when the wireless receiver delivers power in this use case.
    #[must_use]
    pub const fn receives_wireless(self) -> bool {
        matches!(
            self,
            UseCase::WlcRx
                | UseCase::WlcDc
                | UseCase::UsbOtgWlcRx
                | UseCase::UsbWlcRx
                | UseCase::Dock
        )
    }

    /// Returns `true` for the ordinary charging configurations.
    #[must_use]
    pub const fn is_charging(self) -> bool {
        matches!(
            self,
            UseCase::UsbChg
                | UseCase::UsbDc
                | UseCase::WlcRx
                | UseCase::WlcDc
                | UseCase::UsbWlcRx
                | UseCase::Dock
        )
    }
}

impl fmt::Display for UseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns `true` when moving from `from` to `to` must pass through standby.
///
/// Leaving a boost configuration (OTG or wireless TX) disables the boost before
/// anything else is programmed, except for the combined OTG + wireless RX state
/// which is reachable directly from plain OTG and from the wireless receiver
/// states. Entering a raw mode always starts from a clean baseline.
#[must_use]
pub const fn needs_standby(from: UseCase, to: UseCase) -> bool {
    if from as u8 == to as u8 {
        return false;
    }

    if matches!(to, UseCase::Raw) {
        return true;
    }

    match (from, to) {
        (UseCase::Standby, _) => false,
        (UseCase::UsbOtg | UseCase::WlcRx | UseCase::Dock, UseCase::UsbOtgWlcRx) => false,
        (from, _) if from.is_otg() => true,
        (UseCase::WlcTx, _) => true,
        (_, UseCase::WlcTx) => true,
        (UseCase::Raw | UseCase::FwUpdate, _) => true,
        (_, UseCase::FwUpdate) => true,
        _ => false,
    }
}
