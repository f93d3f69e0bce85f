//! The per-kind editors. Each takes snapshot positions that the engine has
//! already clamped against the tick's deleted ranges, projects them into the
//! working frame through the meta-log, mutates the chunk store, and records
//! its own displacement entries.

use thiserror::Error;

use crate::chunk::{Chunk, ChunkKind};
use crate::document::Document;

/// Why a single edit failed. Failures are local to the command; the tick
/// carries on.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum EditError {
    /// The anchor lies beyond the snapshot, the range is empty or inverted,
    /// or a parameter is out of range.
    #[error("invalid cursor position")]
    InvalidPosition,
    /// Both endpoints of an inline range fell inside deleted regions.
    #[error("position was deleted in this batch")]
    DeletedPosition,
}

impl Document {
    /// Splice text in at a snapshot position. The text may carry embedded
    /// newlines when commands are built programmatically; the chunk store
    /// re-splits lines as needed.
    pub(crate) fn apply_insert(&mut self, snap: usize, text: &str) -> Result<(), EditError> {
        if snap > self.snapshot_len() {
            return Err(EditError::InvalidPosition);
        }
        let work = self.meta_log.project(snap, self.num_characters);
        self.insert_working(work, text.as_bytes());
        self.meta_log.push(snap, text.len() as isize);
        Ok(())
    }

    /// Insert a line boundary at a snapshot position.
    pub(crate) fn apply_newline(&mut self, snap: usize) -> Result<(), EditError> {
        if snap > self.snapshot_len() {
            return Err(EditError::InvalidPosition);
        }
        let work = self.meta_log.project_block(snap, self.num_characters);
        if self.head.is_none() {
            self.link_after(None, Chunk::with_text(ChunkKind::Plain, b"\n"));
            self.num_characters += 1;
            self.meta_log.push(snap, 1);
            return Ok(());
        }
        let (id, local) = self.locate(work);
        let chunk = &self.chunks[id];
        if local == 0 {
            // An empty line slides in above this one.
            let prev = chunk.prev;
            self.link_after(prev, Chunk::with_text(ChunkKind::Plain, b"\n"));
            self.num_characters += 1;
            if self.chunks[id].kind.is_ordered() {
                self.renumber_from(id);
            }
        } else if local == chunk.len() && chunk.ends_with_newline() {
            self.link_after(Some(id), Chunk::with_text(ChunkKind::Plain, b"\n"));
            self.num_characters += 1;
        } else {
            self.split_line_at(id, local);
        }
        self.meta_log.push(snap, 1);
        Ok(())
    }

    pub(crate) fn apply_heading(&mut self, level: u8, snap: usize) -> Result<(), EditError> {
        let (prefix, kind): (&[u8], _) = match level {
            1 => (b"# ", ChunkKind::Heading1),
            2 => (b"## ", ChunkKind::Heading2),
            3 => (b"### ", ChunkKind::Heading3),
            _ => return Err(EditError::InvalidPosition),
        };
        self.apply_block_prefix(snap, prefix, kind)
    }

    pub(crate) fn apply_blockquote(&mut self, snap: usize) -> Result<(), EditError> {
        self.apply_block_prefix(snap, b"> ", ChunkKind::Blockquote)
    }

    pub(crate) fn apply_unordered_list(&mut self, snap: usize) -> Result<(), EditError> {
        self.apply_block_prefix(snap, b"- ", ChunkKind::UnorderedItem)
    }

    /// Turn the line at `snap` into an ordered item, numbering it after its
    /// predecessor and renumbering the rest of the run.
    pub(crate) fn apply_ordered_list(&mut self, snap: usize) -> Result<(), EditError> {
        if snap > self.snapshot_len() {
            return Err(EditError::InvalidPosition);
        }
        let work = self.meta_log.project_block(snap, self.num_characters);
        let (id, split) = self.ensure_line_start(work);
        if split {
            self.meta_log.push(snap, 1);
        }
        let prev_idx = match self.chunks[id].prev {
            Some(p) if self.chunks[p].kind.is_ordered() => self.chunks[p].ol_index,
            _ => 0,
        };
        let idx = (prev_idx + 1).min(9);
        {
            let chunk = &mut self.chunks[id];
            chunk.insert_bytes(0, &[b'0' + idx, b'.', b' ']);
            chunk.kind = ChunkKind::OrderedItem;
            chunk.ol_index = idx;
        }
        self.num_characters += 3;
        self.meta_log.push(snap, 3);
        self.renumber_from(id);
        Ok(())
    }

    /// Splice a standalone `---` line in front of the line at `snap`.
    pub(crate) fn apply_horizontal_rule(&mut self, snap: usize) -> Result<(), EditError> {
        if snap > self.snapshot_len() {
            return Err(EditError::InvalidPosition);
        }
        let work = self.meta_log.project_block(snap, self.num_characters);
        if self.head.is_none() {
            self.link_after(None, Chunk::with_text(ChunkKind::HorizontalRule, b"---\n"));
            self.num_characters += 4;
            self.meta_log.push(snap, 4);
            return Ok(());
        }
        let (id, split) = self.ensure_line_start(work);
        if split {
            self.meta_log.push(snap, 1);
        }
        let prev = self.chunks[id].prev;
        self.link_after(prev, Chunk::with_text(ChunkKind::HorizontalRule, b"---\n"));
        self.num_characters += 4;
        self.meta_log.push(snap, 4);
        // The rule interrupts any run it landed in.
        if self.chunks[id].kind.is_ordered() {
            self.renumber_from(id);
        }
        Ok(())
    }

    /// Wrap `start..end` in a delimiter pair. The closing delimiter goes in
    /// first so the opening insert cannot shift it.
    pub(crate) fn apply_inline(
        &mut self,
        start: usize,
        end: usize,
        open: &[u8],
        close: &[u8],
    ) -> Result<(), EditError> {
        debug_assert!(start < end);
        if start > self.snapshot_len() {
            return Err(EditError::InvalidPosition);
        }
        let close_at = self.meta_log.project(end, self.num_characters);
        self.insert_working(close_at, close);
        self.meta_log.push(end, close.len() as isize);

        let open_at = self.meta_log.project(start, self.num_characters);
        self.insert_working(open_at, open);
        self.meta_log.push(start, open.len() as isize);
        Ok(())
    }

    fn apply_block_prefix(
        &mut self,
        snap: usize,
        prefix: &[u8],
        kind: ChunkKind,
    ) -> Result<(), EditError> {
        if snap > self.snapshot_len() {
            return Err(EditError::InvalidPosition);
        }
        let work = self.meta_log.project_block(snap, self.num_characters);
        let (id, split) = self.ensure_line_start(work);
        if split {
            self.meta_log.push(snap, 1);
        }
        let was_ordered = self.chunks[id].kind.is_ordered();
        {
            let chunk = &mut self.chunks[id];
            chunk.insert_bytes(0, prefix);
            chunk.kind = kind;
            chunk.ol_index = 0;
        }
        self.num_characters += prefix.len();
        self.meta_log.push(snap, prefix.len() as isize);
        if was_ordered {
            if let Some(n) = self.chunks[id].next {
                if self.chunks[n].kind.is_ordered() {
                    self.renumber_from(n);
                }
            }
        }
        Ok(())
    }
}
