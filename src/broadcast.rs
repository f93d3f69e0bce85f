//! The version-stamped log block the server emits once per tick, and the
//! client side of it: parsing a received block and replaying its successful
//! edits into a local replica.
//!
//! ```text
//! VERSION <n>
//! EDIT <username> <raw_command> <result>
//! ...
//! END
//! ```

use std::fmt::Write;

use smartstring::alias::String as SmartString;
use thiserror::Error;

use crate::command::{CmdStatus, Command};
use crate::document::Document;
use crate::engine::{apply_batch, TickReport};

/// Render a tick's report as one broadcast block. A heartbeat (no commands)
/// renders as just the `VERSION` and `END` lines.
pub fn render_block(report: &TickReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "VERSION {}", report.version);
    for e in &report.edits {
        let _ = writeln!(out, "EDIT {} {} {}", e.username, e.raw, e.status);
    }
    out.push_str("END\n");
    out
}

/// One `EDIT` line of a received block.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BlockEdit {
    pub username: SmartString,
    pub raw: String,
    pub status: CmdStatus,
}

/// A parsed broadcast block.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Block {
    pub version: u64,
    pub edits: Vec<BlockEdit>,
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum BlockError {
    #[error("block does not start with a VERSION line")]
    MissingVersion,
    #[error("block is not terminated by END")]
    MissingEnd,
    #[error("unparsable EDIT line {0:?}")]
    BadEditLine(String),
    #[error("a SUCCESS edit failed to re-parse: {0:?}")]
    BadCommand(String),
}

/// Every result string the block grammar knows. The result is recovered from
/// the line's tail because the raw command in the middle may itself contain
/// spaces (or even one of these words).
const RESULTS: &[(&str, CmdStatus)] = &[
    ("Reject INVALID_POSITION", CmdStatus::InvalidPosition),
    ("Reject DELETED_POSITION", CmdStatus::DeletedPosition),
    ("Reject UNAUTHORISED", CmdStatus::Unauthorised),
    ("REJECT UNKNOWN_ERROR", CmdStatus::Malformed),
    ("SUCCESS", CmdStatus::Success),
];

pub fn parse_block(text: &str) -> Result<Block, BlockError> {
    let mut lines = text.lines();
    let version = lines
        .next()
        .and_then(|l| l.strip_prefix("VERSION "))
        .and_then(|v| v.trim().parse().ok())
        .ok_or(BlockError::MissingVersion)?;

    let mut edits = Vec::new();
    for line in lines {
        if line == "END" {
            return Ok(Block { version, edits });
        }
        let body = line
            .strip_prefix("EDIT ")
            .ok_or_else(|| BlockError::BadEditLine(line.to_string()))?;
        let (username, rest) = body
            .split_once(' ')
            .ok_or_else(|| BlockError::BadEditLine(line.to_string()))?;
        let (raw, status) =
            split_result(rest).ok_or_else(|| BlockError::BadEditLine(line.to_string()))?;
        edits.push(BlockEdit { username: username.into(), raw: raw.to_string(), status });
    }
    Err(BlockError::MissingEnd)
}

fn split_result(rest: &str) -> Option<(&str, CmdStatus)> {
    for (suffix, status) in RESULTS {
        if let Some(raw) = rest.strip_suffix(suffix) {
            if let Some(raw) = raw.strip_suffix(' ') {
                return Some((raw, *status));
            }
        }
    }
    None
}

/// Replay a received block's successful edits into a local replica, as one
/// batch through the same engine pipeline the server used.
pub fn apply_block(doc: &mut Document, block: &Block) -> Result<(), BlockError> {
    let mut cmds = Vec::with_capacity(block.edits.len());
    for e in &block.edits {
        if e.status == CmdStatus::Success {
            let cmd =
                Command::parse(&e.raw).map_err(|_| BlockError::BadCommand(e.raw.clone()))?;
            cmds.push(cmd);
        }
    }
    apply_batch(doc, &cmds);
    Ok(())
}
