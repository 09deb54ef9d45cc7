//! Line-oriented operator console served over the debug UART.
//!
//! Bytes are assembled into lines, executed through the shared command
//! executor and answered with a bounded set of reply lines.

use core::fmt::{self, Write as _};
use core::str;

use charger_core::repl::catalog;
use charger_core::repl::commands::{CommandError, CommandExecutor, CommandOutcome, VoteController};
use charger_core::repl::status::StatusFormatter;
use heapless::{String, Vec};

use crate::charger::StatusSource;

/// Maximum number of bytes accepted on a single line (excluding terminator).
pub const MAX_LINE_LEN: usize = 96;
/// Maximum number of lines produced for one command.
pub const MAX_REPLY_LINES: usize = 10;

pub type ReplyLine = String<MAX_LINE_LEN>;
pub type Reply = Vec<ReplyLine, MAX_REPLY_LINES>;

/// Errors surfaced while assembling a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleError {
    /// Input exceeded [`MAX_LINE_LEN`]; the partial line was discarded.
    LineOverflow,
    /// The assembled line was not UTF-8.
    InvalidUtf8,
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::LineOverflow => f.write_str("ERR line too long"),
            ConsoleError::InvalidUtf8 => f.write_str("ERR invalid utf-8"),
        }
    }
}

pub struct ConsoleSession<C> {
    executor: CommandExecutor<C>,
    buffer: Vec<u8, MAX_LINE_LEN>,
}

impl<C> ConsoleSession<C>
where
    C: VoteController + StatusSource,
{
    pub const fn new(controller: C) -> Self {
        Self {
            executor: CommandExecutor::new(controller),
            buffer: Vec::new(),
        }
    }

    /// Feeds a single byte. A line terminator executes the buffered line and
    /// returns its reply; blank lines produce an empty reply.
    pub fn ingest(&mut self, byte: u8) -> Result<Option<Reply>, ConsoleError> {
        match byte {
            b'\r' | b'\n' => {
                let reply = self.process_line();
                self.buffer.clear();
                reply.map(Some)
            }
            0x08 | 0x7f => {
                self.buffer.pop();
                Ok(None)
            }
            value => self.buffer.push(value).map(|()| None).map_err(|_| {
                self.buffer.clear();
                ConsoleError::LineOverflow
            }),
        }
    }

    fn process_line(&self) -> Result<Reply, ConsoleError> {
        let line = str::from_utf8(&self.buffer).map_err(|_| ConsoleError::InvalidUtf8)?;
        let mut reply = Reply::new();
        if line.trim().is_empty() {
            return Ok(reply);
        }

        match self.executor.execute(line) {
            Ok(outcome) => self.describe_outcome(&outcome, &mut reply),
            Err(CommandError::Parse(error)) => {
                push_line(&mut reply, format_args!("ERR syntax: {error}"));
            }
            Err(CommandError::Vote(error)) => {
                push_line(&mut reply, format_args!("ERR vote: {error}"));
            }
        }
        Ok(reply)
    }

    fn describe_outcome(&self, outcome: &CommandOutcome<'_>, reply: &mut Reply) {
        match outcome {
            CommandOutcome::Voted {
                reason,
                value,
                changed,
            } => {
                let suffix = if *changed { "" } else { " (unchanged)" };
                push_line(reply, format_args!("OK vote {reason} {value}{suffix}"));
            }
            CommandOutcome::Withdrawn { reason, removed } => {
                if *removed {
                    push_line(reply, format_args!("OK withdraw {reason}"));
                } else {
                    push_line(reply, format_args!("ERR withdraw {reason} not-found"));
                }
            }
            CommandOutcome::Device { ready } => {
                let state = if *ready { "ready" } else { "suspended" };
                push_line(reply, format_args!("OK device {state}"));
            }
            CommandOutcome::Fault(_) => {
                push_line(reply, format_args!("ERR fault injection requires the emulator"));
            }
            CommandOutcome::Status => self.describe_status(reply),
            CommandOutcome::Help { topic } => describe_help(*topic, reply),
        }
    }

    fn describe_status(&self, reply: &mut Reply) {
        let snapshot = self.executor.controller().status();
        let formatter = StatusFormatter::new(&snapshot);

        // Truncated lines are still worth showing.
        let mut line = ReplyLine::new();
        let _ = formatter.write_usecase_line(&mut line);
        let _ = reply.push(line);

        let mut line = ReplyLine::new();
        let _ = formatter.write_election_line(&mut line);
        let _ = reply.push(line);

        let mut line = ReplyLine::new();
        let _ = formatter.write_device_line(&mut line);
        let _ = reply.push(line);
    }
}

fn describe_help(topic: Option<&str>, reply: &mut Reply) {
    match topic {
        Some(target) => match catalog::find(target) {
            Some(spec) => {
                push_line(reply, format_args!("{}", spec.usage));
                if spec.name == "vote" {
                    push_wrapped(reply, "  modes:", catalog::vote_keywords());
                }
            }
            None => {
                push_line(reply, format_args!("No help available for `{target}`."));
                push_wrapped(
                    reply,
                    "  topics:",
                    catalog::commands().iter().map(|spec| spec.name),
                );
            }
        },
        None => {
            push_line(reply, format_args!("Available commands:"));
            for spec in catalog::commands() {
                push_line(reply, format_args!("  {}", spec.usage));
            }
            push_line(
                reply,
                format_args!("Type `help <topic>` for a specific command."),
            );
        }
    }
}

fn push_line(reply: &mut Reply, args: fmt::Arguments<'_>) {
    let mut line = ReplyLine::new();
    let _ = line.write_fmt(args);
    let _ = reply.push(line);
}

/// Packs `words` after `prefix`, starting a new line whenever the current one
/// would overflow.
fn push_wrapped<'w>(reply: &mut Reply, prefix: &str, words: impl Iterator<Item = &'w str>) {
    let mut line = ReplyLine::new();
    let _ = line.push_str(prefix);

    for word in words {
        if line.len() + word.len() + 1 > MAX_LINE_LEN {
            let _ = reply.push(core::mem::take(&mut line));
            let _ = line.push_str("   ");
        }
        let _ = line.push(' ');
        let _ = line.push_str(word);
    }
    let _ = reply.push(line);
}
