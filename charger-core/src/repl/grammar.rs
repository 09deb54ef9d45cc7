#![allow(clippy::module_name_repetitions)]

//! Lexer and parser for the charger REPL.
//!
//! A console line is tokenized by a `regal` lexer into a fixed-size buffer,
//! then walked against the [`catalog`] grammar with `winnow` parsers. Nothing
//! allocates, so the firmware console and the emulator share this path.

use super::catalog::{self, ChoiceTag, CommandTag, Node, SubcommandTag, ValueSpec};
use core::fmt;
use core::ops::Range;

use crate::election::ModeRequest;
use crate::usecase::HardwareModeValue;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
#[allow(deprecated)]
use winnow::error::ErrorKind;
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::stream::Stream;

/// Token budget for one console line; a raw vote with its line ending needs six.
pub const MAX_TOKENS: usize = 32;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;

/// Lexical token kinds recognized by the REPL grammar.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// `0x`-prefixed hexadecimal literal.
    #[regex(r"0[xX][0-9A-Fa-f]+", priority = 2)]
    Hex,
    /// Unsuffixed decimal literal.
    #[regex(r"[0-9]+")]
    Integer,
    /// Identifier, keyword, or vote reason (case-insensitive keyword match performed later).
    #[regex(r"[A-Za-z][A-Za-z0-9_-]*")]
    Ident,
    /// Equals sign for key/value assignments.
    #[token("=")]
    Equals,
    /// Inline whitespace is ignored.
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    /// End-of-line token (`\r`, `\n`, or `\r\n`).
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Pseudo variant used when the lexer encounters unsupported input.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Token emitted by the lexer with a byte span back into the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

/// Tokens of one line, in order.
pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

/// Lexer errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// Input produced more tokens than the static buffer allows.
    TooManyTokens { processed: usize },
    /// Underlying lexer reported an unrecoverable error.
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "line too long: {processed} tokens")
            }
            LexError::Engine => f.write_str("lexer failed"),
        }
    }
}

/// Grammar errors emitted by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarError<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: TokenKind,
        span: Range<usize>,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    InvalidInteger {
        span: Range<usize>,
    },
    InvalidToken {
        span: Range<usize>,
        lexeme: &'a str,
    },
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::UnexpectedToken {
                expected,
                found,
                span,
            } => write!(f, "expected {expected}, found {found:?} at {span:?}"),
            GrammarError::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
            GrammarError::InvalidInteger { span } => write!(f, "invalid byte literal at {span:?}"),
            GrammarError::InvalidToken { span, lexeme } => {
                write!(f, "unsupported token `{lexeme}` at {span:?}")
            }
        }
    }
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        match token {
            Some(token) => GrammarError::UnexpectedToken {
                expected,
                found: token.kind,
                span: token.span.clone(),
            },
            None => GrammarError::UnexpectedEnd { expected },
        }
    }
}

type Input<'src, 'slice> = &'slice [Token<'src>];

#[allow(deprecated)]
impl<'src, 'slice> ParserError<Input<'src, 'slice>> for GrammarError<'src>
where
    'src: 'slice,
{
    fn from_error_kind(input: &Input<'src, 'slice>, _kind: ErrorKind) -> Self {
        GrammarError::unexpected("token", input.first())
    }

    fn append(
        self,
        _input: &Input<'src, 'slice>,
        _token_start: &<Input<'src, 'slice> as Stream>::Checkpoint,
        _kind: ErrorKind,
    ) -> Self {
        self
    }

    fn or(self, other: Self) -> Self {
        other
    }
}

/// Combined lex/parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl<'a> fmt::Display for ParseError<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

/// Structured commands produced by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Vote(VoteCommand<'a>),
    Withdraw(WithdrawCommand<'a>),
    Device(DeviceCommand),
    Fault(FaultCommand),
    Status,
    Help(HelpCommand<'a>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteCommand<'a> {
    pub reason: &'a str,
    pub value: ModeRequest,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawCommand<'a> {
    pub reason: &'a str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceCommand {
    Ready,
    Suspend,
}

/// Register access that fails once on the simulated charger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultPoint {
    /// Next input-select write is not acknowledged.
    InputSelect,
    /// Next mode register write is not acknowledged.
    Commit,
    /// Next mode register write reports busy.
    Busy,
}

impl FaultPoint {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FaultPoint::InputSelect => "insel",
            FaultPoint::Commit => "commit",
            FaultPoint::Busy => "busy",
        }
    }
}

impl fmt::Display for FaultPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultCommand {
    Inject(FaultPoint),
    Clear,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

/// Tokenize the provided line.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    for record in cache.tokens() {
        if !record.skipped {
            push_token(&mut buffer, line, record.token, record.start..record.end)?;
        }
    }

    // Trailing input the lexer could not finish becomes an error token.
    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let end = partial.start + partial.fragment.len();
        push_token(&mut buffer, line, TokenKind::Error, partial.start..end)?;
    }

    Ok(buffer)
}

fn push_token<'a>(
    buffer: &mut TokenBuffer<'a>,
    line: &'a str,
    kind: TokenKind,
    span: Range<usize>,
) -> Result<(), LexError> {
    let token = Token {
        kind,
        lexeme: &line[span.clone()],
        span,
    };
    buffer.push(token).map_err(|_| LexError::TooManyTokens {
        processed: buffer.len() + 1,
    })
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parse a REPL command from the provided line.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    for token in tokens.iter() {
        if token.kind == TokenKind::Error {
            return Err(ParseError::Grammar(GrammarError::InvalidToken {
                span: token.span.clone(),
                lexeme: token.lexeme,
            }));
        }
    }

    let mut rest = tokens.as_slice();
    let command = match command().parse_next(&mut rest) {
        Ok(command) => command,
        Err(ErrMode::Backtrack(err) | ErrMode::Cut(err)) => {
            return Err(ParseError::Grammar(err));
        }
        Err(ErrMode::Incomplete(_)) => {
            return Err(ParseError::Grammar(GrammarError::unexpected(
                "token",
                rest.first(),
            )));
        }
    };

    if let Some(token) = rest.iter().find(|token| token.kind != TokenKind::Eol) {
        return Err(ParseError::Grammar(GrammarError::unexpected(
            "end of command",
            Some(token),
        )));
    }

    Ok(command)
}

fn command<'src, 'slice>() -> impl Parser<Input<'src, 'slice>, Command<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let spec = keyword(input, "command keyword", catalog::find)?;
        let mut state = CommandState::new(spec.tag);
        parse_node(spec.grammar, input, &mut state)?;
        state.finish()
    }
}

fn parse_node<'src, 'slice>(
    node: &'static Node,
    input: &mut Input<'src, 'slice>,
    state: &mut CommandState<'src>,
) -> Result<(), ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    match node {
        Node::End => Ok(()),
        Node::Reason { next } => {
            let reason = expect_kind(TokenKind::Ident, "reason").parse_next(input)?;
            state.set_reason(reason.lexeme);
            parse_node(next, input, state)
        }
        Node::Choice(choices) => {
            let expected = choices.first().map_or("keyword", |choice| choice.keyword);
            let branch = keyword(input, expected, |lexeme| {
                choices
                    .iter()
                    .find(|choice| choice.keyword.eq_ignore_ascii_case(lexeme))
                    .copied()
            })?;
            let value = parse_value(input, branch.value)?;
            state.apply_choice(branch.tag, value)
        }
        Node::Subcommands(branches) => {
            let expected = branches.first().map_or("subcommand", |branch| branch.name);
            let branch = keyword(input, expected, |lexeme| {
                branches
                    .iter()
                    .find(|branch| branch.name.eq_ignore_ascii_case(lexeme))
                    .copied()
            })?;
            state.set_subcommand(branch.tag);
            parse_node(branch.grammar, input, state)
        }
        Node::Topic => {
            let topic = input
                .split_first()
                .filter(|(token, _)| token.kind == TokenKind::Ident);
            if let Some((token, rest)) = topic {
                state.set_topic(token.lexeme);
                *input = rest;
            }
            Ok(())
        }
    }
}

/// Consumes an identifier and maps it through `lookup`; unknown words are
/// reported against `expected`.
fn keyword<'src, 'slice, T>(
    input: &mut Input<'src, 'slice>,
    expected: &'static str,
    lookup: impl Fn(&str) -> Option<T>,
) -> Result<T, ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    let token = expect_kind(TokenKind::Ident, expected).parse_next(input)?;
    lookup(token.lexeme)
        .ok_or_else(|| ErrMode::Backtrack(GrammarError::unexpected(expected, Some(&token))))
}

/// Parses the value trailing a choice keyword, if its layout has one.
fn parse_value<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
    spec: ValueSpec,
) -> Result<Option<u8>, ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    match spec {
        ValueSpec::None => Ok(None),
        ValueSpec::ByteAssignment => {
            expect_kind(TokenKind::Equals, "=").parse_next(input)?;
            match input.split_first() {
                Some((token, rest)) if matches!(token.kind, TokenKind::Integer | TokenKind::Hex) => {
                    *input = rest;
                    parse_byte(token).map(Some).map_err(ErrMode::Cut)
                }
                other => Err(ErrMode::Backtrack(GrammarError::unexpected(
                    "byte value",
                    other.map(|(token, _)| token),
                ))),
            }
        }
    }
}

/// Fields collected while walking a command's grammar.
enum CommandState<'a> {
    Vote {
        reason: Option<&'a str>,
        value: Option<ModeRequest>,
    },
    Withdraw {
        reason: Option<&'a str>,
    },
    Device(Option<DeviceCommand>),
    Fault {
        subcommand: Option<SubcommandTag>,
        point: Option<FaultPoint>,
    },
    Status,
    Help(Option<&'a str>),
}

impl<'a> CommandState<'a> {
    fn new(tag: CommandTag) -> Self {
        match tag {
            CommandTag::Vote => CommandState::Vote {
                reason: None,
                value: None,
            },
            CommandTag::Withdraw => CommandState::Withdraw { reason: None },
            CommandTag::Device => CommandState::Device(None),
            CommandTag::Fault => CommandState::Fault {
                subcommand: None,
                point: None,
            },
            CommandTag::Status => CommandState::Status,
            CommandTag::Help => CommandState::Help(None),
        }
    }

    fn apply_choice(
        &mut self,
        tag: ChoiceTag,
        byte: Option<u8>,
    ) -> Result<(), ErrMode<GrammarError<'a>>> {
        match (self, tag, byte) {
            (CommandState::Vote { value, .. }, ChoiceTag::Mode(mode), _) => {
                *value = Some(ModeRequest::Symbolic(mode));
            }
            (CommandState::Vote { value, .. }, ChoiceTag::Raw, Some(raw)) => {
                *value = Some(ModeRequest::Raw(HardwareModeValue::new(raw)));
            }
            (CommandState::Device(action), ChoiceTag::DeviceReady, _) => {
                *action = Some(DeviceCommand::Ready);
            }
            (CommandState::Device(action), ChoiceTag::DeviceSuspend, _) => {
                *action = Some(DeviceCommand::Suspend);
            }
            (CommandState::Fault { point, .. }, ChoiceTag::InjectInputSelect, _) => {
                *point = Some(FaultPoint::InputSelect);
            }
            (CommandState::Fault { point, .. }, ChoiceTag::InjectCommit, _) => {
                *point = Some(FaultPoint::Commit);
            }
            (CommandState::Fault { point, .. }, ChoiceTag::InjectBusy, _) => {
                *point = Some(FaultPoint::Busy);
            }
            _ => return Err(ErrMode::Backtrack(GrammarError::unexpected("choice", None))),
        }
        Ok(())
    }

    fn set_reason(&mut self, lexeme: &'a str) {
        if let CommandState::Vote { reason, .. } | CommandState::Withdraw { reason } = self {
            *reason = Some(lexeme);
        }
    }

    fn set_subcommand(&mut self, tag: SubcommandTag) {
        if let CommandState::Fault { subcommand, .. } = self {
            *subcommand = Some(tag);
        }
    }

    fn set_topic(&mut self, topic: &'a str) {
        if let CommandState::Help(slot) = self {
            *slot = Some(topic);
        }
    }

    fn finish(self) -> Result<Command<'a>, ErrMode<GrammarError<'a>>> {
        match self {
            CommandState::Vote {
                reason: Some(reason),
                value: Some(value),
            } => Ok(Command::Vote(VoteCommand { reason, value })),
            CommandState::Withdraw {
                reason: Some(reason),
            } => Ok(Command::Withdraw(WithdrawCommand { reason })),
            CommandState::Device(Some(action)) => Ok(Command::Device(action)),
            CommandState::Fault {
                subcommand: Some(SubcommandTag::FaultInject),
                point: Some(point),
            } => Ok(Command::Fault(FaultCommand::Inject(point))),
            CommandState::Fault {
                subcommand: Some(SubcommandTag::FaultClear),
                ..
            } => Ok(Command::Fault(FaultCommand::Clear)),
            CommandState::Status => Ok(Command::Status),
            CommandState::Help(topic) => Ok(Command::Help(HelpCommand { topic })),
            _ => Err(ErrMode::Backtrack(GrammarError::unexpected("argument", None))),
        }
    }
}

fn expect_kind<'src, 'slice>(
    kind: TokenKind,
    label: &'static str,
) -> impl Parser<Input<'src, 'slice>, Token<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if token.kind == kind => {
            *input = rest;
            Ok(token.clone())
        }
        other => Err(ErrMode::Backtrack(GrammarError::unexpected(
            label,
            other.map(|(token, _)| token),
        ))),
    }
}

fn parse_byte<'a>(token: &Token<'a>) -> Result<u8, GrammarError<'a>> {
    let text = token.lexeme;
    let parsed = match text.get(..2) {
        Some("0x" | "0X") => u8::from_str_radix(&text[2..], 16),
        _ => text.parse::<u8>(),
    };
    parsed.map_err(|_| GrammarError::InvalidInteger {
        span: token.span.clone(),
    })
}
