//! The tick engine: one atomic collect → clamp → apply → commit cycle.
//!
//! Every command in a batch names positions in the same immutable snapshot,
//! the one published by the previous tick. Deletes are validated against that
//! snapshot and staged into a coalesced range set before anything mutates, so
//! overlapping deletes merge and formatting anchors inside doomed regions can
//! be clamped. The surviving commands then run in queue order, translating
//! their snapshot anchors through the meta-log as the working buffer drifts.

use smartstring::alias::String as SmartString;

use crate::command::{CmdStatus, Command, ParseError, QueuedCommand};
use crate::document::Document;
use crate::ops::EditError;
use crate::range::SnapRange;

/// One line of a tick's broadcast log.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EditRecord {
    pub username: SmartString,
    pub raw: String,
    pub status: CmdStatus,
}

/// What the transport needs to broadcast after a tick.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TickReport {
    pub version: u64,
    pub edits: Vec<EditRecord>,
}

/// Run one full tick: apply `batch` (already timestamp-sorted by the queue)
/// against `doc`, commit a fresh snapshot, and report per-command outcomes.
///
/// The version is bumped iff at least one command succeeded; an empty batch
/// still produces a (heartbeat) report at the current version.
pub fn run_tick(doc: &mut Document, batch: Vec<QueuedCommand>) -> TickReport {
    debug_assert!(batch.windows(2).all(|w| w[0].at <= w[1].at), "batch not timestamp-sorted");
    let mut statuses = vec![CmdStatus::Success; batch.len()];

    // Read-only submitters and unparsable lines drop out first; deletes are
    // staged against the pristine snapshot.
    for (i, qc) in batch.iter().enumerate() {
        if !qc.role.can_write() {
            statuses[i] = CmdStatus::Unauthorised;
            continue;
        }
        match &qc.parsed {
            Err(ParseError::BadArgument) => statuses[i] = CmdStatus::InvalidPosition,
            Err(_) => statuses[i] = CmdStatus::Malformed,
            Ok(Command::Delete { pos, len }) => statuses[i] = stage_delete(doc, *pos, *len),
            Ok(_) => {}
        }
    }

    cut_deletes(doc);

    for (i, qc) in batch.iter().enumerate() {
        if statuses[i] != CmdStatus::Success {
            continue;
        }
        if let Ok(cmd) = &qc.parsed {
            if !matches!(cmd, Command::Delete { .. }) {
                statuses[i] = apply_one(doc, cmd);
            }
        }
    }

    let any_success = statuses.contains(&CmdStatus::Success);
    doc.commit(any_success);

    let edits = batch
        .into_iter()
        .zip(statuses)
        .map(|(qc, status)| EditRecord { username: qc.username, raw: qc.raw, status })
        .collect();

    TickReport { version: doc.version(), edits }
}

/// Replica-side entry point: run an ordered batch of already-parsed commands
/// (the `SUCCESS` lines of a broadcast block) through the same pipeline the
/// server used. Since failed commands never touch the document or the
/// meta-log, replaying only the successes reproduces the server's state.
pub fn apply_batch(doc: &mut Document, cmds: &[Command]) -> Vec<CmdStatus> {
    let mut statuses = vec![CmdStatus::Success; cmds.len()];
    for (i, cmd) in cmds.iter().enumerate() {
        if let Command::Delete { pos, len } = cmd {
            statuses[i] = stage_delete(doc, *pos, *len);
        }
    }
    cut_deletes(doc);
    for (i, cmd) in cmds.iter().enumerate() {
        if statuses[i] == CmdStatus::Success && !matches!(cmd, Command::Delete { .. }) {
            statuses[i] = apply_one(doc, cmd);
        }
    }
    let any_success = statuses.contains(&CmdStatus::Success);
    doc.commit(any_success);
    statuses
}

/// Validate a delete against the snapshot and stage its range. The length is
/// clamped so the range never reaches past the snapshot's end; a range that
/// clamps to nothing is as invalid as one that starts past the end.
fn stage_delete(doc: &mut Document, pos: usize, len: usize) -> CmdStatus {
    if pos > doc.snapshot_len() || len == 0 {
        return CmdStatus::InvalidPosition;
    }
    // `len` is untrusted client input; saturate before clamping so a huge
    // length can't wrap `pos + len` around.
    let end = pos.saturating_add(len).min(doc.snapshot_len());
    if end <= pos {
        return CmdStatus::InvalidPosition;
    }
    doc.deleted.insert(SnapRange::new(pos, end));
    CmdStatus::Success
}

/// Cut the coalesced ranges out of the working buffer, highest first so the
/// lower ranges keep their coordinates.
fn cut_deletes(doc: &mut Document) {
    let ranges: Vec<SnapRange> = doc.deleted.ranges().to_vec();
    for r in ranges.iter().rev() {
        doc.delete_span(*r);
        doc.meta_log.push(r.start, -(r.len() as isize));
    }
}

/// Start-style clamping: an anchor inside a doomed region snaps back to the
/// region's start, which is where the hole collapses to.
fn clamp_start(doc: &Document, pos: usize) -> usize {
    match doc.deleted.containing(pos) {
        Some(r) => r.start,
        None => pos,
    }
}

/// Clamp an inline pair against the deleted ranges. Both endpoints inside
/// holes means there is nothing left to format.
fn clamp_inline(doc: &Document, start: usize, end: usize) -> Result<(usize, usize), EditError> {
    let start_hole = doc.deleted.containing(start);
    let end_hole = doc.deleted.containing(end);
    if start_hole.is_some() && end_hole.is_some() {
        return Err(EditError::DeletedPosition);
    }
    let start = start_hole.map_or(start, |r| r.start);
    let end = end_hole.map_or(end, |r| r.end);
    if start >= end {
        return Err(EditError::InvalidPosition);
    }
    Ok((start, end))
}

fn apply_one(doc: &mut Document, cmd: &Command) -> CmdStatus {
    use Command::*;
    let result = match cmd {
        Insert { pos, text } => doc.apply_insert(clamp_start(doc, *pos), text),
        Newline { pos } => doc.apply_newline(clamp_start(doc, *pos)),
        Heading { level, pos } => doc.apply_heading(*level, clamp_start(doc, *pos)),
        Blockquote { pos } => doc.apply_blockquote(clamp_start(doc, *pos)),
        OrderedList { pos } => doc.apply_ordered_list(clamp_start(doc, *pos)),
        UnorderedList { pos } => doc.apply_unordered_list(clamp_start(doc, *pos)),
        HorizontalRule { pos } => doc.apply_horizontal_rule(clamp_start(doc, *pos)),
        Bold { start, end } => clamp_inline(doc, *start, *end)
            .and_then(|(s, e)| doc.apply_inline(s, e, b"**", b"**")),
        Italic { start, end } => clamp_inline(doc, *start, *end)
            .and_then(|(s, e)| doc.apply_inline(s, e, b"*", b"*")),
        Code { start, end } => clamp_inline(doc, *start, *end)
            .and_then(|(s, e)| doc.apply_inline(s, e, b"`", b"`")),
        Link { start, end, url } => clamp_inline(doc, *start, *end).and_then(|(s, e)| {
            let close = format!("]({})", url);
            doc.apply_inline(s, e, b"[", close.as_bytes())
        }),
        Delete { .. } => unreachable!("deletes run in their own phase"),
    };
    match result {
        Ok(()) => CmdStatus::Success,
        Err(EditError::InvalidPosition) => CmdStatus::InvalidPosition,
        Err(EditError::DeletedPosition) => CmdStatus::DeletedPosition,
    }
}
