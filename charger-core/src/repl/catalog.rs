//! Shared REPL grammar specification expressed as an applicative AST.
//!
//! The parser and the help renderer interpret the same structure, so keywords
//! and value layouts stay in sync.

use crate::election::SymbolicMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    Vote,
    Withdraw,
    Device,
    Fault,
    Status,
    Help,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubcommandTag {
    FaultInject,
    FaultClear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChoiceTag {
    Mode(SymbolicMode),
    Raw,
    DeviceReady,
    DeviceSuspend,
    InjectInputSelect,
    InjectCommit,
    InjectBusy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueSpec {
    None,
    /// `=<value>` with a decimal or `0x`-prefixed byte.
    ByteAssignment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    pub grammar: &'static Node,
    /// One-line usage shown by `help`.
    pub usage: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Node {
    End,
    /// Free-form identifier naming a vote reason.
    Reason { next: &'static Node },
    /// Exactly one keyword from the list.
    Choice(&'static [ChoiceBranch]),
    Subcommands(&'static [SubcommandBranch]),
    /// Optional command name to describe.
    Topic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChoiceBranch {
    pub keyword: &'static str,
    pub tag: ChoiceTag,
    pub value: ValueSpec,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubcommandBranch {
    pub name: &'static str,
    pub tag: SubcommandTag,
    pub grammar: &'static Node,
}

const END: Node = Node::End;

const fn keyword_branch(keyword: &'static str, tag: ChoiceTag) -> ChoiceBranch {
    ChoiceBranch {
        keyword,
        tag,
        value: ValueSpec::None,
    }
}

const fn mode_branch(mode: SymbolicMode) -> ChoiceBranch {
    keyword_branch(mode.keyword(), ChoiceTag::Mode(mode))
}

const VOTE_VALUES: [ChoiceBranch; 13] = [
    mode_branch(SymbolicMode::StandbyOn),
    mode_branch(SymbolicMode::ChginOff),
    mode_branch(SymbolicMode::WlcinOff),
    mode_branch(SymbolicMode::UsbWlcRx),
    mode_branch(SymbolicMode::ChargerBuckOn),
    mode_branch(SymbolicMode::UsbBuckOn),
    mode_branch(SymbolicMode::OtgFrsOn),
    mode_branch(SymbolicMode::OtgOn),
    mode_branch(SymbolicMode::ChargerDc),
    mode_branch(SymbolicMode::WlcRx),
    mode_branch(SymbolicMode::WlcTx),
    mode_branch(SymbolicMode::FwUpdateBoost),
    ChoiceBranch {
        keyword: "raw",
        tag: ChoiceTag::Raw,
        value: ValueSpec::ByteAssignment,
    },
];

const VOTE_VALUE_GRAMMAR: Node = Node::Choice(&VOTE_VALUES);

const VOTE_GRAMMAR: Node = Node::Reason {
    next: &VOTE_VALUE_GRAMMAR,
};

const WITHDRAW_GRAMMAR: Node = Node::Reason { next: &END };

const DEVICE_CHOICES: [ChoiceBranch; 2] = [
    keyword_branch("ready", ChoiceTag::DeviceReady),
    keyword_branch("suspend", ChoiceTag::DeviceSuspend),
];

const DEVICE_GRAMMAR: Node = Node::Choice(&DEVICE_CHOICES);

const FAULT_POINTS: [ChoiceBranch; 3] = [
    keyword_branch("insel", ChoiceTag::InjectInputSelect),
    keyword_branch("commit", ChoiceTag::InjectCommit),
    keyword_branch("busy", ChoiceTag::InjectBusy),
];

const FAULT_INJECT_GRAMMAR: Node = Node::Choice(&FAULT_POINTS);

const FAULT_SUBCOMMANDS: [SubcommandBranch; 2] = [
    SubcommandBranch {
        name: "inject",
        tag: SubcommandTag::FaultInject,
        grammar: &FAULT_INJECT_GRAMMAR,
    },
    SubcommandBranch {
        name: "clear",
        tag: SubcommandTag::FaultClear,
        grammar: &END,
    },
];

const FAULT_GRAMMAR: Node = Node::Subcommands(&FAULT_SUBCOMMANDS);

const COMMANDS: [CommandSpec; 6] = [
    CommandSpec {
        name: "vote",
        tag: CommandTag::Vote,
        grammar: &VOTE_GRAMMAR,
        usage: "vote <reason> <mode>|raw=<value>",
    },
    CommandSpec {
        name: "withdraw",
        tag: CommandTag::Withdraw,
        grammar: &WITHDRAW_GRAMMAR,
        usage: "withdraw <reason>",
    },
    CommandSpec {
        name: "device",
        tag: CommandTag::Device,
        grammar: &DEVICE_GRAMMAR,
        usage: "device ready|suspend",
    },
    CommandSpec {
        name: "fault",
        tag: CommandTag::Fault,
        grammar: &FAULT_GRAMMAR,
        usage: "fault inject insel|commit|busy | fault clear",
    },
    CommandSpec {
        name: "status",
        tag: CommandTag::Status,
        grammar: &END,
        usage: "status",
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        grammar: &Node::Topic,
        usage: "help [command]",
    },
];

/// Returns the full command catalog.
#[must_use]
pub const fn commands() -> &'static [CommandSpec] {
    &COMMANDS
}

/// Finds a command by name (case insensitive).
#[must_use]
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

/// Keywords accepted as vote values, in catalog order.
pub fn vote_keywords() -> impl Iterator<Item = &'static str> {
    VOTE_VALUES.iter().map(|branch| branch.keyword)
}
