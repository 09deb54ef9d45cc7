use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant as HostInstant};

use charger_core::arbiter::{ArbiterConfig, ArbiterError, CycleOutcome, ModeArbiter};
use charger_core::hw::{BoardGpio, GpioLine, Level, RegisterBus, RegisterError, regs};
use charger_core::repl::catalog;
use charger_core::repl::commands::{CommandError, CommandExecutor, CommandOutcome};
use charger_core::repl::grammar::{FaultCommand, FaultPoint};
use charger_core::repl::status::StatusFormatter;
use charger_core::sequencer::{BoardConfig, BoardHooks, BoardLines};
use charger_core::telemetry::{TelemetryPayload, TelemetryRecord, TelemetryRecorder};
use charger_core::usecase::{HardwareModeValue, ResolverPolicy};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_hal::delay::DelayNs;

/// Deferred cycles re-run back to back before the session gives up and
/// leaves the retry pending.
pub const MAX_EMULATED_RETRIES: usize = 3;

const LINE_NAMES: [(GpioLine, &str); 6] = [
    (GpioLine(0), "ext-boost-en"),
    (GpioLine(1), "ext-boost-sel"),
    (GpioLine(2), "otg-switch"),
    (GpioLine(3), "wlc-en"),
    (GpioLine(4), "wlc-spoof"),
    (GpioLine(5), "wlc-tx-en"),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    /// OTG from the charger's own boost.
    Internal,
    /// OTG from an external boost converter behind two GPIOs.
    ExtBoost,
    /// DCIN wired to a dock next to the USB input.
    Dock,
}

impl TranscriptProfile {
    pub const ALL: [TranscriptProfile; 3] = [
        TranscriptProfile::Internal,
        TranscriptProfile::ExtBoost,
        TranscriptProfile::Dock,
    ];

    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Internal => "transcripts/emulator-internal.log",
            TranscriptProfile::ExtBoost => "transcripts/emulator-ext-boost.log",
            TranscriptProfile::Dock => "transcripts/emulator-dock.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Internal => "Charger Emulator transcript (internal OTG boost)",
            TranscriptProfile::ExtBoost => "Charger Emulator transcript (external OTG boost)",
            TranscriptProfile::Dock => "Charger Emulator transcript (dock on DCIN)",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("internal") {
            Ok(Self::Internal)
        } else if tag.eq_ignore_ascii_case("ext-boost") {
            Ok(Self::ExtBoost)
        } else if tag.eq_ignore_ascii_case("dock") {
            Ok(Self::Dock)
        } else {
            Err(format!("Unknown transcript profile `{tag}`"))
        }
    }

    fn policy(self) -> ResolverPolicy {
        match self {
            TranscriptProfile::Internal => ResolverPolicy::new(false, false),
            TranscriptProfile::ExtBoost => ResolverPolicy::new(false, true),
            TranscriptProfile::Dock => ResolverPolicy::new(true, false),
        }
    }

    fn board(self) -> BoardConfig {
        let line = |index: usize| Some(LINE_NAMES[index].0);
        let mut lines = BoardLines {
            otg_load_switch: line(2),
            wlc_enable: line(3),
            wlc_spoof: line(4),
            wlc_tx_enable: line(5),
            ..BoardLines::none()
        };
        if self == TranscriptProfile::ExtBoost {
            lines.ext_boost_enable = line(0);
            lines.ext_boost_select = line(1);
        }
        BoardConfig::new(lines, self.policy())
    }
}

type EmulatedArbiter = ModeArbiter<NoopRawMutex, BoardHooks<SimulatedGpio, HostDelay>>;

pub struct Session {
    arbiter: EmulatedArbiter,
    charger: SimulatedCharger,
    telemetry: TelemetryRecorder<Duration>,
    transcript: TranscriptLogger,
    started_at: HostInstant,
    /// Virtual time skipped by emulated retry delays.
    skipped: Duration,
}

impl Session {
    pub fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(profile)?;
        Ok(Self::with_transcript(profile, transcript))
    }

    fn with_transcript(profile: TranscriptProfile, transcript: TranscriptLogger) -> Self {
        let hooks = BoardHooks::new(profile.board(), SimulatedGpio::default(), HostDelay);
        Self {
            arbiter: ModeArbiter::new(ArbiterConfig::new(profile.policy()), hooks),
            charger: SimulatedCharger::new(),
            telemetry: TelemetryRecorder::new(),
            transcript,
            started_at: HostInstant::now(),
            skipped: Duration::ZERO,
        }
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        self.transcript
            .append_line(elapsed, TranscriptRole::Host, trimmed)?;

        let result = CommandExecutor::new(&self.arbiter).execute(trimmed);
        let mut lines = Vec::new();
        let run_cycle = match result {
            Ok(outcome) => {
                let needs_cycle = outcome.needs_cycle();
                self.narrate_outcome(outcome, &mut lines);
                needs_cycle
            }
            Err(CommandError::Parse(err)) => {
                lines.push(format!("ERR syntax {err}"));
                false
            }
            Err(CommandError::Vote(err)) => {
                lines.push(format!("ERR vote {err}"));
                false
            }
        };

        if run_cycle {
            self.run_cycles(&mut lines);
        }

        self.record_output(elapsed, &lines)?;
        Ok(lines)
    }

    fn now(&self) -> Duration {
        self.started_at.elapsed() + self.skipped
    }

    fn narrate_outcome(&mut self, outcome: CommandOutcome<'_>, lines: &mut Vec<String>) {
        let now = self.now();
        match outcome {
            CommandOutcome::Voted {
                reason,
                value,
                changed,
            } => {
                if changed {
                    self.telemetry
                        .record_vote_cast(self.arbiter.vote_count(), value, now);
                    lines.push(format!(
                        "OK vote {reason} {value} votes={}",
                        self.arbiter.vote_count()
                    ));
                } else {
                    lines.push(format!("OK vote {reason} {value} unchanged"));
                }
            }
            CommandOutcome::Withdrawn { reason, removed } => {
                if removed {
                    self.telemetry
                        .record_vote_withdrawn(self.arbiter.vote_count(), now);
                    lines.push(format!(
                        "OK withdraw {reason} votes={}",
                        self.arbiter.vote_count()
                    ));
                } else {
                    lines.push(format!("ERR withdraw {reason} not-found"));
                }
            }
            CommandOutcome::Device { ready } => {
                lines.push(
                    if ready {
                        "OK device ready"
                    } else {
                        "OK device suspended"
                    }
                    .to_string(),
                );
            }
            CommandOutcome::Fault(FaultCommand::Inject(point)) => {
                self.charger.arm(point);
                lines.push(format!("OK fault armed {point}"));
            }
            CommandOutcome::Fault(FaultCommand::Clear) => {
                self.charger.disarm();
                lines.push("OK fault cleared".to_string());
            }
            CommandOutcome::Status => self.describe_status(lines),
            CommandOutcome::Help { topic } => describe_help(topic, lines),
        }
    }

    /// Runs arbitration until the cycle settles, replaying deferred cycles
    /// after their retry delay in virtual time.
    fn run_cycles(&mut self, lines: &mut Vec<String>) {
        let mut recovered = false;
        for attempt in 0..=MAX_EMULATED_RETRIES {
            let first = self.telemetry.next_id();
            let now = self.now();
            let outcome = self
                .arbiter
                .resolve_and_apply(&mut self.charger, &mut self.telemetry, now);
            recovered = matches!(outcome, CycleOutcome::Recovered(_));

            lines.push(format!("cycle {outcome}"));
            for record in self.telemetry.since(first) {
                lines.push(describe_record(record));
            }

            let Some(retry_after) = outcome.retry_after() else {
                break;
            };
            if outcome.error() == Some(ArbiterError::DeviceNotReady) {
                lines.push("retry parked until `device ready`".to_string());
                break;
            }
            if attempt == MAX_EMULATED_RETRIES {
                lines.push(format!("retry budget exhausted after {attempt} attempts"));
                break;
            }
            self.skipped += retry_after;
        }

        if recovered {
            lines.push("election result overwritten with reason `error`".to_string());
        }
    }

    fn describe_status(&self, lines: &mut Vec<String>) {
        let snapshot = self.arbiter.status();
        lines.extend(StatusFormatter::new(&snapshot).render_lines());
        lines.push(format!(
            "register mode=0x{:02x} insel=0x{:02x}",
            self.charger.mode().raw(),
            self.charger.register(regs::INSEL_REGISTER),
        ));

        let pins = self.arbiter.with_hooks(|hooks| hooks.gpio().describe());
        lines.push(format!("gpio {pins}"));

        self.arbiter.with_votes(|votes| {
            for vote in votes {
                lines.push(format!("  vote {}={}", vote.reason, vote.value));
            }
        });

        if let Some(point) = self.charger.armed() {
            lines.push(format!("fault armed {point}"));
        }
    }

    fn record_output(&mut self, elapsed: Duration, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.transcript
                .append_line(elapsed, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

fn describe_help(topic: Option<&str>, lines: &mut Vec<String>) {
    match topic {
        Some(target) => {
            if let Some(spec) = catalog::find(target) {
                lines.push(spec.usage.to_string());
                if spec.name == "vote" {
                    let keywords: Vec<&str> = catalog::vote_keywords().collect();
                    lines.push(format!("  modes: {}", keywords.join(", ")));
                }
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        None => {
            lines.push("Available commands:".to_string());
            for spec in catalog::commands() {
                lines.push(format!("  {}", spec.usage));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
}

fn help_topic_list() -> String {
    catalog::commands()
        .iter()
        .map(|spec| spec.name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_record(record: &TelemetryRecord<Duration>) -> String {
    let detail = match record.details {
        TelemetryPayload::None => String::new(),
        TelemetryPayload::Votes(votes) => format!(" votes={}", votes.vote_count),
        TelemetryPayload::Transition(transition) => {
            format!(" {} -> {} mode={}", transition.from, transition.to, transition.mode)
        }
        TelemetryPayload::Inputs(mask) => format!(" inputs={mask}"),
        TelemetryPayload::Retry(retry) => format!(
            " after={}ms attempts={}",
            retry.retry_after.as_millis(),
            retry.attempts
        ),
        TelemetryPayload::Fault(fault) => format!(
            " step={} cause={} recovered={}",
            fault.step, fault.cause, fault.recovered
        ),
    };
    format!("  #{} {}{detail}", record.id, record.event)
}

/// Charger register file with one-shot fault injection.
struct SimulatedCharger {
    file: [u8; 256],
    armed: Option<FaultPoint>,
}

impl SimulatedCharger {
    fn new() -> Self {
        Self {
            file: [0; 256],
            armed: None,
        }
    }

    fn arm(&mut self, point: FaultPoint) {
        self.armed = Some(point);
    }

    fn disarm(&mut self) {
        self.armed = None;
    }

    fn armed(&self) -> Option<FaultPoint> {
        self.armed
    }

    fn register(&self, addr: u8) -> u8 {
        self.file[usize::from(addr)]
    }

    fn mode(&self) -> HardwareModeValue {
        HardwareModeValue::new(self.register(regs::MODE_REGISTER) & regs::MODE_MASK)
    }

    /// Fires the armed fault if it covers this write.
    fn trip(&mut self, addr: u8, value: u8) -> Option<RegisterError> {
        let commits = addr == regs::MODE_REGISTER && value & regs::MODE_MASK != 0;
        let error = match self.armed? {
            FaultPoint::InputSelect if addr == regs::INSEL_REGISTER => RegisterError::Nack,
            FaultPoint::Commit if commits => RegisterError::Nack,
            FaultPoint::Busy if commits => RegisterError::Busy,
            _ => return None,
        };
        self.armed = None;
        Some(error)
    }
}

impl RegisterBus for SimulatedCharger {
    fn read(&mut self, addr: u8) -> Result<u8, RegisterError> {
        Ok(self.register(addr))
    }

    fn write(&mut self, addr: u8, value: u8) -> Result<(), RegisterError> {
        if let Some(error) = self.trip(addr, value) {
            return Err(error);
        }
        self.file[usize::from(addr)] = value;
        Ok(())
    }
}

#[derive(Default)]
struct SimulatedGpio {
    levels: BTreeMap<u8, Level>,
}

impl SimulatedGpio {
    fn describe(&self) -> String {
        let high: Vec<&str> = LINE_NAMES
            .iter()
            .filter(|(line, _)| {
                self.levels
                    .get(&line.0)
                    .is_some_and(|level| level.is_high())
            })
            .map(|(_, name)| *name)
            .collect();
        if high.is_empty() {
            "all-low".to_string()
        } else {
            format!("high={}", high.join(","))
        }
    }
}

impl BoardGpio for SimulatedGpio {
    fn set_line(&mut self, line: GpioLine, level: Level) {
        self.levels.insert(line.0, level);
    }
}

/// Sequencing delays are honoured with real sleeps; they never exceed 10 ms.
struct HostDelay;

impl DelayNs for HostDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

struct TranscriptLogger {
    writer: BufWriter<Box<dyn Write>>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(Box::new(file)),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    #[cfg(test)]
    fn discard() -> Self {
        Self {
            writer: BufWriter::new(Box::new(io::sink())),
        }
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charger_core::usecase::UseCase;

    fn session(profile: TranscriptProfile) -> Session {
        Session::with_transcript(profile, TranscriptLogger::discard())
    }

    fn run(session: &mut Session, line: &str) -> Vec<String> {
        session.handle_command(line).expect("sink never fails")
    }

    #[test]
    fn two_charger_votes_reach_usb_charging() {
        let mut session = session(TranscriptProfile::Internal);

        run(&mut session, "vote USB charger-buck-on");
        let lines = run(&mut session, "vote BATT charger-buck-on");
        assert!(
            lines
                .iter()
                .any(|line| line == "cycle applied USB_CHG -> USB_CHG mode=CHGR_BUCK_ON(0x05)"),
            "unexpected narration: {lines:?}"
        );
        assert_eq!(session.arbiter.current_use_case(), UseCase::UsbChg);
        assert_eq!(session.charger.mode(), HardwareModeValue::CHGR_BUCK_ON);
    }

    #[test]
    fn armed_commit_fault_recovers_to_standby() {
        let mut session = session(TranscriptProfile::Internal);

        run(&mut session, "fault inject commit");
        let lines = run(&mut session, "vote WLC wlc-rx");
        assert!(lines.iter().any(|line| line.starts_with("cycle recovered")));
        assert!(
            lines
                .iter()
                .any(|line| line == "election result overwritten with reason `error`")
        );
        assert_eq!(session.arbiter.current_use_case(), UseCase::Standby);

        let status = run(&mut session, "status");
        assert_eq!(status[1], "election result=ALL_OFF(0x00) reason=error votes=1");
        assert!(session.charger.armed().is_none());
    }

    #[test]
    fn busy_commit_is_replayed_after_retry_delay() {
        let mut session = session(TranscriptProfile::Internal);

        run(&mut session, "fault inject busy");
        let lines = run(&mut session, "vote WLC wlc-rx");
        let cycles: Vec<&String> = lines
            .iter()
            .filter(|line| line.starts_with("cycle "))
            .collect();
        assert_eq!(cycles.len(), 2, "unexpected narration: {lines:?}");
        assert!(cycles[0].starts_with("cycle deferred"));
        assert!(cycles[1].starts_with("cycle applied"));
        assert!(session.skipped >= Duration::from_millis(50));
    }

    #[test]
    fn suspended_device_parks_the_retry() {
        let mut session = session(TranscriptProfile::Internal);

        run(&mut session, "device suspend");
        let lines = run(&mut session, "vote WLC wlc-rx");
        assert_eq!(
            lines.last().map(String::as_str),
            Some("retry parked until `device ready`")
        );

        let lines = run(&mut session, "device ready");
        assert!(lines.iter().any(|line| line.starts_with("cycle applied")));
        assert_eq!(session.arbiter.current_use_case(), UseCase::WlcRx);
    }

    #[test]
    fn external_boost_profile_drives_boost_lines() {
        let mut session = session(TranscriptProfile::ExtBoost);

        run(&mut session, "vote OTG otg-on");
        assert_eq!(session.arbiter.current_use_case(), UseCase::UsbOtg);
        assert_eq!(session.charger.mode(), HardwareModeValue::ALL_OFF);

        let status = run(&mut session, "status");
        assert!(
            status
                .iter()
                .any(|line| line == "gpio high=ext-boost-en,ext-boost-sel,otg-switch"),
            "unexpected status: {status:?}"
        );
    }

    #[test]
    fn help_lists_catalog_usage() {
        let mut session = session(TranscriptProfile::Dock);

        let lines = run(&mut session, "help");
        assert_eq!(lines[0], "Available commands:");
        assert!(lines.iter().any(|line| line == "  device ready|suspend"));

        let lines = run(&mut session, "help vote");
        assert_eq!(lines[0], "vote <reason> <mode>|raw=<value>");
        assert!(lines[1].contains("charger-buck-on"));
    }

    #[test]
    fn syntax_errors_are_reported() {
        let mut session = session(TranscriptProfile::Internal);
        let lines = run(&mut session, "vote USB");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ERR syntax"));
    }
}
