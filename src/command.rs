//! Edit commands: the line grammar clients speak, the parsed representation,
//! and the timestamp-ordered queue a tick drains.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use smartstring::alias::String as SmartString;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Submitter privilege, resolved once at connect time from the role table.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Role {
    Read,
    Write,
}

impl Role {
    pub fn can_write(self) -> bool {
        self == Role::Write
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Read => "read",
            Role::Write => "write",
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
#[error("role must be `read` or `write`")]
pub struct UnknownRole;

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, UnknownRole> {
        match s {
            "read" => Ok(Role::Read),
            "write" => Ok(Role::Write),
            _ => Err(UnknownRole),
        }
    }
}

/// Wall-clock submission time as a duration since the Unix epoch. The queue
/// sorts by this; equal stamps keep arrival order.
pub type Timestamp = std::time::Duration;

/// A parsed edit command. All positions are byte offsets into the snapshot
/// published at the last tick commit.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Command {
    Insert { pos: usize, text: SmartString },
    Delete { pos: usize, len: usize },
    Newline { pos: usize },
    Heading { level: u8, pos: usize },
    Blockquote { pos: usize },
    OrderedList { pos: usize },
    UnorderedList { pos: usize },
    HorizontalRule { pos: usize },
    Bold { start: usize, end: usize },
    Italic { start: usize, end: usize },
    Code { start: usize, end: usize },
    Link { start: usize, end: usize, url: SmartString },
}

/// Why a command line failed to parse. `BadArgument` reports as an invalid
/// position and everything else as an unknown error, matching how the wire
/// grammar has always rejected these.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ParseError {
    #[error("empty command line")]
    Empty,
    #[error("unknown command {0:?}")]
    UnknownCommand(SmartString),
    #[error("missing or malformed argument")]
    BadArgument,
}

impl Command {
    /// Parse one line of the command grammar. Trailing `<text>` / `<url>`
    /// fields capture the rest of the line verbatim, embedded spaces
    /// included.
    pub fn parse(line: &str) -> Result<Command, ParseError> {
        let mut rest = line.trim_end_matches(['\n', '\r']);
        let word = next_token(&mut rest).ok_or(ParseError::Empty)?;
        match word {
            "INSERT" => {
                let pos = parse_num(&mut rest)?;
                let text = rest.trim_start_matches(' ');
                if text.is_empty() {
                    return Err(ParseError::BadArgument);
                }
                Ok(Command::Insert { pos, text: text.into() })
            }
            "DEL" => {
                let pos = parse_num(&mut rest)?;
                let len = parse_num(&mut rest)?;
                Ok(Command::Delete { pos, len })
            }
            "NEWLINE" => Ok(Command::Newline { pos: parse_num(&mut rest)? }),
            "HEADING" => {
                let level = next_token(&mut rest)
                    .and_then(|t| t.parse::<u8>().ok())
                    .ok_or(ParseError::BadArgument)?;
                let pos = parse_num(&mut rest)?;
                Ok(Command::Heading { level, pos })
            }
            "BOLD" => {
                let (start, end) = parse_pair(&mut rest)?;
                Ok(Command::Bold { start, end })
            }
            "ITALIC" => {
                let (start, end) = parse_pair(&mut rest)?;
                Ok(Command::Italic { start, end })
            }
            "CODE" => {
                let (start, end) = parse_pair(&mut rest)?;
                Ok(Command::Code { start, end })
            }
            "LINK" => {
                let (start, end) = parse_pair(&mut rest)?;
                let url = rest.trim_start_matches(' ');
                if url.is_empty() {
                    return Err(ParseError::BadArgument);
                }
                Ok(Command::Link { start, end, url: url.into() })
            }
            "BLOCKQUOTE" => Ok(Command::Blockquote { pos: parse_num(&mut rest)? }),
            "ORDERED_LIST" => Ok(Command::OrderedList { pos: parse_num(&mut rest)? }),
            "UNORDERED_LIST" => Ok(Command::UnorderedList { pos: parse_num(&mut rest)? }),
            "HORIZONTAL_RULE" => Ok(Command::HorizontalRule { pos: parse_num(&mut rest)? }),
            other => Err(ParseError::UnknownCommand(other.into())),
        }
    }
}

fn next_token<'a>(s: &mut &'a str) -> Option<&'a str> {
    *s = s.trim_start_matches(' ');
    if s.is_empty() {
        return None;
    }
    let end = s.find(' ').unwrap_or(s.len());
    let (tok, rest) = s.split_at(end);
    *s = rest;
    Some(tok)
}

fn parse_num(s: &mut &str) -> Result<usize, ParseError> {
    next_token(s)
        .and_then(|t| t.parse().ok())
        .ok_or(ParseError::BadArgument)
}

fn parse_pair(s: &mut &str) -> Result<(usize, usize), ParseError> {
    Ok((parse_num(s)?, parse_num(s)?))
}

/// Per-command outcome, rendered into the broadcast block.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CmdStatus {
    Success,
    InvalidPosition,
    DeletedPosition,
    Unauthorised,
    Malformed,
}

impl CmdStatus {
    pub fn as_result_str(self) -> &'static str {
        match self {
            CmdStatus::Success => "SUCCESS",
            CmdStatus::InvalidPosition => "Reject INVALID_POSITION",
            CmdStatus::DeletedPosition => "Reject DELETED_POSITION",
            CmdStatus::Unauthorised => "Reject UNAUTHORISED",
            CmdStatus::Malformed => "REJECT UNKNOWN_ERROR",
        }
    }
}

impl Display for CmdStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_result_str())
    }
}

/// A submitted command waiting for the next tick.
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub username: SmartString,
    pub role: Role,
    pub at: Timestamp,
    /// The submitted line, echoed verbatim in the broadcast block.
    pub raw: String,
    pub parsed: Result<Command, ParseError>,
}

impl QueuedCommand {
    pub fn new(username: &str, role: Role, at: Timestamp, line: &str) -> Self {
        let raw = line.trim_end_matches(['\n', '\r']).to_string();
        QueuedCommand {
            username: username.into(),
            role,
            at,
            parsed: Command::parse(&raw),
            raw,
        }
    }
}

/// The per-tick command queue, kept sorted by timestamp as commands arrive.
#[derive(Debug, Default)]
pub struct CommandQueue {
    cmds: Vec<QueuedCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cmds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    /// Insert keeping timestamp order. A command never hops over one with an
    /// equal stamp, so arrival order breaks ties.
    pub fn push(&mut self, cmd: QueuedCommand) {
        let mut i = self.cmds.len();
        while i > 0 && cmd.at < self.cmds[i - 1].at {
            i -= 1;
        }
        self.cmds.insert(i, cmd);
    }

    /// Take the whole batch for a tick.
    pub fn drain(&mut self) -> Vec<QueuedCommand> {
        std::mem::take(&mut self.cmds)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_simple_commands() {
        assert_eq!(
            Command::parse("INSERT 4 hello world"),
            Ok(Command::Insert { pos: 4, text: "hello world".into() })
        );
        assert_eq!(Command::parse("DEL 3 7"), Ok(Command::Delete { pos: 3, len: 7 }));
        assert_eq!(Command::parse("NEWLINE 0"), Ok(Command::Newline { pos: 0 }));
        assert_eq!(Command::parse("HEADING 2 10"), Ok(Command::Heading { level: 2, pos: 10 }));
        assert_eq!(Command::parse("BOLD 1 5"), Ok(Command::Bold { start: 1, end: 5 }));
        assert_eq!(Command::parse("BLOCKQUOTE 9"), Ok(Command::Blockquote { pos: 9 }));
        assert_eq!(Command::parse("HORIZONTAL_RULE 2"), Ok(Command::HorizontalRule { pos: 2 }));
    }

    #[test]
    fn trailing_fields_capture_spaces_verbatim() {
        assert_eq!(
            Command::parse("INSERT 0   two  spaced  "),
            Ok(Command::Insert { pos: 0, text: "two  spaced  ".into() })
        );
        assert_eq!(
            Command::parse("LINK 2 5 http://example.com/a b"),
            Ok(Command::Link { start: 2, end: 5, url: "http://example.com/a b".into() })
        );
    }

    #[test]
    fn newline_terminator_is_stripped() {
        assert_eq!(
            Command::parse("INSERT 0 hi\n"),
            Ok(Command::Insert { pos: 0, text: "hi".into() })
        );
    }

    #[test]
    fn bad_arguments_reject() {
        assert_eq!(Command::parse("INSERT 0"), Err(ParseError::BadArgument));
        assert_eq!(Command::parse("DEL 1"), Err(ParseError::BadArgument));
        assert_eq!(Command::parse("DEL x 2"), Err(ParseError::BadArgument));
        assert_eq!(Command::parse("HEADING -1 0"), Err(ParseError::BadArgument));
        assert_eq!(Command::parse("LINK 1 2"), Err(ParseError::BadArgument));
        assert_eq!(Command::parse("LINK 1 2 "), Err(ParseError::BadArgument));
    }

    #[test]
    fn unknown_commands_reject() {
        assert_eq!(
            Command::parse("FROBNICATE 3"),
            Err(ParseError::UnknownCommand("FROBNICATE".into()))
        );
        assert_eq!(Command::parse(""), Err(ParseError::Empty));
        assert_eq!(Command::parse("   "), Err(ParseError::Empty));
    }

    #[test]
    fn queue_orders_by_timestamp_with_stable_ties() {
        let qc = |name: &str, usec: u64| {
            QueuedCommand::new(name, Role::Write, Timestamp::from_micros(usec), "NEWLINE 0")
        };
        let mut q = CommandQueue::new();
        q.push(qc("b", 20));
        q.push(qc("a", 10));
        q.push(qc("c", 20));
        q.push(qc("d", 5));
        let order: Vec<_> = q.drain().into_iter().map(|c| c.username).collect();
        assert_eq!(order, vec!["d", "a", "b", "c"]);
        // "c" arrived after "b" with the same stamp and stays behind it.
    }

    #[test]
    fn role_parsing() {
        assert_eq!("read".parse(), Ok(Role::Read));
        assert_eq!("write".parse(), Ok(Role::Write));
        assert!("admin".parse::<Role>().is_err());
        assert!(Role::Write.can_write());
        assert!(!Role::Read.can_write());
    }
}
