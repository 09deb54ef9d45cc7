//! Shared status surface for the REPL.
//!
//! [`crate::arbiter::ModeArbiter::status`] samples the arbiter into a
//! [`StatusSnapshot`]; [`StatusFormatter`] keeps the textual rendering
//! consistent across front-ends.

use core::fmt;

use crate::election::ElectionResult;
use crate::usecase::{HardwareModeValue, InputMask, UseCase};

/// Snapshot of the arbiter state surfaced by the `status` command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub use_case: UseCase,
    pub mode: HardwareModeValue,
    /// Input selection last written, `None` before the first cycle.
    pub inputs: Option<InputMask>,
    pub result: Option<ElectionResult>,
    pub vote_count: usize,
    pub device_ready: bool,
    pub retry_pending: bool,
}

impl StatusSnapshot {
    /// Snapshot of a freshly booted arbiter.
    #[must_use]
    pub const fn boot() -> Self {
        Self {
            use_case: UseCase::Standby,
            mode: HardwareModeValue::ALL_OFF,
            inputs: None,
            result: None,
            vote_count: 0,
            device_ready: true,
            retry_pending: false,
        }
    }
}

/// Helper that renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a StatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes the hardware line (e.g. `usecase USB_CHG mode=CHGR_BUCK_ON(0x05) inputs=wired`).
    pub fn write_usecase_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "usecase {} mode={}",
            self.snapshot.use_case, self.snapshot.mode
        )?;

        writer.write_str(" inputs=")?;
        match self.snapshot.inputs {
            Some(mask) => write!(writer, "{mask}"),
            None => writer.write_str("unset"),
        }
    }

    /// Writes the election line (e.g. `election result=CHGR_BUCK_ON(0x05) reason=USB votes=2`).
    pub fn write_election_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("election result=")?;
        match &self.snapshot.result {
            Some(result) => write!(writer, "{} reason={}", result.mode, result.reason)?,
            None => writer.write_str("none")?,
        }
        write!(writer, " votes={}", self.snapshot.vote_count)
    }

    /// Writes the device line (e.g. `device ready=yes retry=idle`).
    pub fn write_device_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("device ready=")?;
        writer.write_str(if self.snapshot.device_ready {
            "yes"
        } else {
            "no"
        })?;
        writer.write_str(" retry=")?;
        writer.write_str(if self.snapshot.retry_pending {
            "pending"
        } else {
            "idle"
        })
    }

    /// Renders every status line.
    #[cfg(feature = "alloc")]
    #[must_use]
    pub fn render_lines(&self) -> alloc::vec::Vec<alloc::string::String> {
        use alloc::string::String;

        let writers: [fn(&Self, &mut String) -> fmt::Result; 3] = [
            Self::write_usecase_line,
            Self::write_election_line,
            Self::write_device_line,
        ];

        writers
            .iter()
            .filter_map(|write_line| {
                let mut line = String::new();
                write_line(self, &mut line).ok().map(|()| line)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::Reason;
    use heapless::String;

    fn render(write: impl FnOnce(&mut String<96>) -> fmt::Result) -> String<96> {
        let mut line = String::new();
        write(&mut line).expect("line fits");
        line
    }

    #[test]
    fn boot_snapshot_renders_defaults() {
        let snapshot = StatusSnapshot::boot();
        let formatter = StatusFormatter::new(&snapshot);

        assert_eq!(
            render(|w| formatter.write_usecase_line(w)).as_str(),
            "usecase STANDBY mode=ALL_OFF(0x00) inputs=unset"
        );
        assert_eq!(
            render(|w| formatter.write_election_line(w)).as_str(),
            "election result=none votes=0"
        );
        assert_eq!(
            render(|w| formatter.write_device_line(w)).as_str(),
            "device ready=yes retry=idle"
        );
    }

    #[test]
    fn published_result_is_rendered() {
        let mut reason = Reason::new();
        reason.push_str("USB").expect("reason fits");

        let snapshot = StatusSnapshot {
            use_case: UseCase::UsbChg,
            mode: HardwareModeValue::CHGR_BUCK_ON,
            inputs: Some(InputMask::WIRED),
            result: Some(ElectionResult {
                reason,
                mode: HardwareModeValue::CHGR_BUCK_ON,
            }),
            vote_count: 2,
            device_ready: false,
            retry_pending: true,
        };
        let formatter = StatusFormatter::new(&snapshot);

        assert_eq!(
            render(|w| formatter.write_usecase_line(w)).as_str(),
            "usecase USB_CHG mode=CHGR_BUCK_ON(0x05) inputs=wired"
        );
        assert_eq!(
            render(|w| formatter.write_election_line(w)).as_str(),
            "election result=CHGR_BUCK_ON(0x05) reason=USB votes=2"
        );
        assert_eq!(
            render(|w| formatter.write_device_line(w)).as_str(),
            "device ready=no retry=pending"
        );
    }
}
