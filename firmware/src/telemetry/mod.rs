//! Logging mirror for arbitration telemetry.
//!
//! The charger service keeps the telemetry ring itself; this module turns
//! each fresh record into a single log line on defmt (target) or stdout
//! (host builds), so bring-up traces show every transition with its timing.

use core::fmt::{self, Write as _};
use core::time::Duration;

use charger_core::arbiter::CycleOutcome;
use charger_core::telemetry::{TelemetryPayload, TelemetryRecord};
use heapless::String;

/// Longest log line emitted for a record; longer lines are truncated.
pub const LOG_LINE_LEN: usize = 96;

pub type LogLine = String<LOG_LINE_LEN>;

/// Mirrors a telemetry record to the log.
pub fn log_record(record: &TelemetryRecord<Duration>) {
    emit_log("telemetry:charger", &record_line(record));
}

/// Mirrors a cycle outcome; idle cycles stay quiet.
pub fn log_outcome(outcome: &CycleOutcome) {
    if matches!(outcome, CycleOutcome::Idle) {
        return;
    }

    let mut line = LogLine::new();
    let _ = write!(line, "{outcome}");
    match outcome {
        CycleOutcome::Rejected(_) | CycleOutcome::Recovered(_) => {
            emit_warning("charger", &line);
        }
        _ => emit_log("charger", &line),
    }
}

/// Formats a record as `#id event t=..us [details]`.
pub fn record_line(record: &TelemetryRecord<Duration>) -> LogLine {
    let mut line = LogLine::new();
    let _ = write_record(&mut line, record);
    line
}

fn write_record(line: &mut LogLine, record: &TelemetryRecord<Duration>) -> fmt::Result {
    write!(
        line,
        "#{} {} t={}us",
        record.id,
        record.event,
        record.timestamp.as_micros()
    )?;

    match record.details {
        TelemetryPayload::None => Ok(()),
        TelemetryPayload::Votes(votes) => write!(line, " votes={}", votes.vote_count),
        TelemetryPayload::Transition(transition) => {
            write!(line, " mode={}", transition.mode)?;
            if transition.transited_standby {
                line.write_str(" via STANDBY")?;
            }
            match transition.elapsed_since_previous {
                Some(elapsed) => write!(line, " Δ={}us", elapsed.as_micros()),
                None => Ok(()),
            }
        }
        TelemetryPayload::Inputs(mask) => write!(line, " inputs={mask}"),
        TelemetryPayload::Retry(retry) => write!(
            line,
            " after={}ms attempts={}",
            retry.retry_after.as_millis(),
            retry.attempts
        ),
        TelemetryPayload::Fault(fault) => write!(
            line,
            " step={} cause={} recovered={}",
            fault.step, fault.cause, fault.recovered
        ),
    }
}

#[cfg(target_os = "none")]
fn emit_log(target: &'static str, line: &str) {
    defmt::info!("{} {}", target, line);
}

#[cfg(not(target_os = "none"))]
fn emit_log(target: &'static str, line: &str) {
    println!("{target} {line}");
}

#[cfg(target_os = "none")]
fn emit_warning(target: &'static str, line: &str) {
    defmt::warn!("{} {}", target, line);
}

#[cfg(not(target_os = "none"))]
fn emit_warning(target: &'static str, line: &str) {
    println!("{target} WARN {line}");
}
