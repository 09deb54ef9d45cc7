//! High-level REPL command dispatcher.
//!
//! Vote and device commands are applied to a [`VoteController`]; fault
//! injection, status, and help only make sense for the front-end that owns the
//! hardware and are handed back untouched.

use core::fmt;

use crate::election::{ModeRequest, VoteError};

use super::grammar::{self, Command, DeviceCommand, FaultCommand};

/// Command execution successes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome<'a> {
    Voted {
        reason: &'a str,
        value: ModeRequest,
        /// `false` when the reason already held the same value.
        changed: bool,
    },
    Withdrawn {
        reason: &'a str,
        removed: bool,
    },
    Device {
        ready: bool,
    },
    Fault(FaultCommand),
    Status,
    Help {
        topic: Option<&'a str>,
    },
}

impl CommandOutcome<'_> {
    /// Returns `true` when the election or device state may have changed and
    /// an arbitration cycle should run.
    #[must_use]
    pub const fn needs_cycle(&self) -> bool {
        match self {
            CommandOutcome::Voted { changed, .. } => *changed,
            CommandOutcome::Withdrawn { removed, .. } => *removed,
            CommandOutcome::Device { .. } => true,
            CommandOutcome::Fault(_) | CommandOutcome::Status | CommandOutcome::Help { .. } => {
                false
            }
        }
    }
}

/// Errors surfaced while executing a command.
#[derive(Debug, PartialEq)]
pub enum CommandError<'a> {
    Parse(grammar::ParseError<'a>),
    Vote(VoteError),
}

impl<'a> From<grammar::ParseError<'a>> for CommandError<'a> {
    fn from(error: grammar::ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

impl From<VoteError> for CommandError<'_> {
    fn from(error: VoteError) -> Self {
        Self::Vote(error)
    }
}

impl fmt::Display for CommandError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(error) => error.fmt(f),
            CommandError::Vote(error) => error.fmt(f),
        }
    }
}

/// Election operations reachable from the REPL.
pub trait VoteController {
    /// Adds or replaces the vote held by `reason`, returning whether it changed.
    ///
    /// # Errors
    ///
    /// Returns a [`VoteError`] when the reason is invalid or the election is full.
    fn cast_vote(&self, reason: &str, value: ModeRequest) -> Result<bool, VoteError>;

    /// Removes the vote held by `reason`, returning whether one existed.
    fn withdraw_vote(&self, reason: &str) -> bool;

    fn set_device_ready(&self, ready: bool);
}

impl<T> VoteController for &T
where
    T: VoteController + ?Sized,
{
    fn cast_vote(&self, reason: &str, value: ModeRequest) -> Result<bool, VoteError> {
        (**self).cast_vote(reason, value)
    }

    fn withdraw_vote(&self, reason: &str) -> bool {
        (**self).withdraw_vote(reason)
    }

    fn set_device_ready(&self, ready: bool) {
        (**self).set_device_ready(ready);
    }
}

/// Dispatches REPL commands into a [`VoteController`].
pub struct CommandExecutor<C> {
    controller: C,
}

impl<C> CommandExecutor<C> {
    pub const fn new(controller: C) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn into_inner(self) -> C {
        self.controller
    }
}

impl<C> CommandExecutor<C>
where
    C: VoteController,
{
    /// Parses and executes a REPL command.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Parse`] for malformed input and
    /// [`CommandError::Vote`] when the election rejects the vote.
    pub fn execute<'a>(&self, line: &'a str) -> Result<CommandOutcome<'a>, CommandError<'a>> {
        let command = grammar::parse(line)?;
        self.dispatch(command)
    }

    fn dispatch<'a>(&self, command: Command<'a>) -> Result<CommandOutcome<'a>, CommandError<'a>> {
        match command {
            Command::Vote(vote) => {
                let changed = self.controller.cast_vote(vote.reason, vote.value)?;
                Ok(CommandOutcome::Voted {
                    reason: vote.reason,
                    value: vote.value,
                    changed,
                })
            }
            Command::Withdraw(withdraw) => Ok(CommandOutcome::Withdrawn {
                reason: withdraw.reason,
                removed: self.controller.withdraw_vote(withdraw.reason),
            }),
            Command::Device(action) => {
                let ready = matches!(action, DeviceCommand::Ready);
                self.controller.set_device_ready(ready);
                Ok(CommandOutcome::Device { ready })
            }
            Command::Fault(fault) => Ok(CommandOutcome::Fault(fault)),
            Command::Status => Ok(CommandOutcome::Status),
            Command::Help(help) => Ok(CommandOutcome::Help { topic: help.topic }),
        }
    }
}
