//! Pure classification of raw IRC lines.
//!
//! The parser borrows from the input line and has no side effects: it never
//! touches the cache, the sender or the event bus. The [`Dispatcher`] decides
//! what each [`ParsedLine`] means.
//!
//! Prefixed lines are split as
//!
//! ```text
//! :<actor> <command> <target>[ <remainder>][ :<trailing>]
//! ```
//!
//! where `trailing` starts at the first token that begins with `:` and runs to
//! the end of the line, spaces and colons included. The prefixed form is
//! parsed with nom combinators; a failure maps to a [`LineParseError`].
//!
//! [`Dispatcher`]: crate::dispatch::Dispatcher

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::char,
    combinator::{opt, rest, verify},
    error::{context, VerboseError, VerboseErrorKind},
    sequence::{preceded, tuple},
    IResult,
};

use crate::error::LineParseError;

/// Prefix marker for lines carrying an actor.
pub const PREFIX_MARKER: char = ':';

/// The literal line a server sends to ask for SASL credentials.
pub const AUTHENTICATE_CONTINUE: &str = "AUTHENTICATE +";

/// Fields of a prefixed line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Params<'a> {
    /// Message originator as it appeared on the wire.
    pub actor: &'a str,
    /// First parameter; empty when the line only has a trailing parameter.
    pub target: &'a str,
    /// Everything between the target and the trailing parameter.
    pub remainder: &'a str,
    /// The free-text parameter after ` :`.
    pub trailing: Option<&'a str>,
}

impl<'a> Params<'a> {
    /// Free text: the trailing parameter, or the remainder if there is none.
    pub fn text(&self) -> &'a str {
        self.trailing.unwrap_or(self.remainder)
    }

    /// First token of the remainder (`LS` in `CAP * LS :...`).
    pub fn subcommand(&self) -> &'a str {
        self.remainder.split(' ').next().unwrap_or("")
    }

    /// Second token of the remainder (`*` on a continued `CAP LS`).
    pub fn sub_argument(&self) -> Option<&'a str> {
        self.remainder.split(' ').nth(1)
    }
}

/// A classified line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParsedLine<'a> {
    /// Unprefixed `PING`; `token` is echoed back in the `PONG`.
    Ping { token: &'a str },
    /// Unprefixed `AUTHENTICATE +`.
    AuthenticateContinue,
    /// Any other unprefixed line.
    Unclassified,
    /// A server reply whose command is exactly three digits.
    Numeric { code: u16, params: Params<'a> },
    /// A named command such as `PRIVMSG`.
    Named { command: &'a str, params: Params<'a> },
}

impl<'a> ParsedLine<'a> {
    /// Classify one line with its terminator already stripped.
    pub fn parse(line: &'a str) -> Result<Self, LineParseError> {
        if line.is_empty() {
            return Err(LineParseError::Empty);
        }
        if line.starts_with(PREFIX_MARKER) {
            parse_prefixed(line)
        } else {
            Ok(parse_unprefixed(line))
        }
    }

    /// Params of a prefixed line.
    pub fn params(&self) -> Option<&Params<'a>> {
        match self {
            Self::Numeric { params, .. } | Self::Named { params, .. } => Some(params),
            _ => None,
        }
    }
}

fn parse_unprefixed(line: &str) -> ParsedLine<'_> {
    let (head, tail) = match line.split_once(PREFIX_MARKER) {
        Some((head, tail)) => (head, Some(tail)),
        None => (line, None),
    };

    if head.contains("PING") {
        let token = tail.unwrap_or_else(|| {
            head.split_once("PING")
                .map(|(_, after)| after.trim())
                .unwrap_or("")
        });
        return ParsedLine::Ping { token };
    }
    if line.trim_end() == AUTHENTICATE_CONTINUE {
        return ParsedLine::AuthenticateContinue;
    }
    ParsedLine::Unclassified
}

type ParseResult<'a, O> = IResult<&'a str, O, VerboseError<&'a str>>;

const ACTOR_CONTEXT: &str = "parsing actor";
const COMMAND_CONTEXT: &str = "parsing command";

/// Parse the actor (the part after `:` and before the first space).
fn parse_actor(input: &str) -> ParseResult<'_, &str> {
    context(
        ACTOR_CONTEXT,
        preceded(char(PREFIX_MARKER), take_while1(|c: char| c != ' ')),
    )(input)
}

/// Parse the command name or numeric code.
fn parse_command(input: &str) -> ParseResult<'_, &str> {
    context(
        COMMAND_CONTEXT,
        preceded(char(' '), take_while1(|c: char| c != ' ')),
    )(input)
}

/// Parse one middle parameter, which never starts with `:`.
fn parse_middle(input: &str) -> ParseResult<'_, &str> {
    preceded(
        char(' '),
        verify(take_while1(|c: char| c != ' '), |s: &str| {
            !s.starts_with(PREFIX_MARKER)
        }),
    )(input)
}

/// Parse everything between the target and the trailing parameter.
fn parse_remainder(input: &str) -> ParseResult<'_, &str> {
    preceded(
        char(' '),
        verify(alt((take_until(" :"), rest)), |s: &str| {
            !s.is_empty() && !s.starts_with(PREFIX_MARKER)
        }),
    )(input)
}

/// Parse the trailing parameter, spaces and colons included.
fn parse_trailing(input: &str) -> ParseResult<'_, &str> {
    preceded(tag(" :"), rest)(input)
}

type Fields<'a> = (&'a str, &'a str, Option<&'a str>, Option<&'a str>, Option<&'a str>);

/// Split a prefixed line into actor, command, target, remainder and trailing.
fn parse_fields(input: &str) -> ParseResult<'_, Fields<'_>> {
    tuple((
        parse_actor,
        parse_command,
        opt(parse_middle),
        opt(parse_remainder),
        opt(parse_trailing),
    ))(input)
}

fn violation(err: nom::Err<VerboseError<&str>>) -> LineParseError {
    let context = match &err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            e.errors.iter().find_map(|(_, kind)| match kind {
                VerboseErrorKind::Context(ctx) => Some(*ctx),
                _ => None,
            })
        }
        nom::Err::Incomplete(_) => None,
    };
    match context {
        Some(ACTOR_CONTEXT) => LineParseError::MissingActor,
        _ => LineParseError::MissingCommand,
    }
}

/// A numeric reply code is exactly three ASCII digits.
fn numeric_code(command: &str) -> Option<u16> {
    if command.len() == 3 && command.bytes().all(|b| b.is_ascii_digit()) {
        command.parse().ok()
    } else {
        None
    }
}

fn parse_prefixed(line: &str) -> Result<ParsedLine<'_>, LineParseError> {
    let (_, (actor, command, target, remainder, trailing)) =
        parse_fields(line).map_err(violation)?;

    let target = match (target, trailing) {
        (Some(target), _) => target,
        (None, Some(_)) => "",
        (None, None) => return Err(LineParseError::MissingTarget(command.to_owned())),
    };

    let params = Params {
        actor,
        target,
        remainder: remainder.unwrap_or(""),
        trailing,
    };

    match numeric_code(command) {
        Some(code) => Ok(ParsedLine::Numeric { code, params }),
        None => Ok(ParsedLine::Named { command, params }),
    }
}
