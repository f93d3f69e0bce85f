use crate::chunk::{Chunk, ChunkArena, ChunkId, ChunkKind};
use crate::meta::MetaLog;
use crate::range::{DeletedRanges, SnapRange};

/// The authoritative document state: a linked sequence of typed line chunks
/// plus the immutable byte image published at the last tick commit.
///
/// All positions arriving from clients name bytes in `snapshot`. While a tick
/// is mid-application the chunk store drifts away from that image and the
/// tick-local `meta_log` / `deleted` containers track the difference; commit
/// re-flattens the chunks into a fresh snapshot and clears both.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub(crate) chunks: ChunkArena,
    pub(crate) head: Option<ChunkId>,
    pub(crate) tail: Option<ChunkId>,
    pub(crate) num_chunks: usize,
    pub(crate) num_characters: usize,

    pub(crate) snapshot: Vec<u8>,

    pub(crate) meta_log: MetaLog,
    pub(crate) deleted: DeletedRanges,

    version: u64,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a typed document from flattened Markdown bytes. This is how a
    /// client turns the handshake snapshot into a live replica: each line is
    /// classified by its rendered prefix.
    pub fn parse_markdown(bytes: &[u8]) -> Document {
        let mut doc = Document::new();
        let mut prev: Option<ChunkId> = None;
        for line in bytes.split_inclusive(|&b| b == b'\n') {
            let (kind, ol_index) = classify_line(line);
            let mut chunk = Chunk::with_text(kind, line);
            chunk.ol_index = ol_index;
            let id = doc.link_after(prev, chunk);
            doc.num_characters += line.len();
            prev = Some(id);
        }
        doc.snapshot = bytes.to_vec();
        doc
    }

    pub fn len(&self) -> usize {
        self.num_characters
    }

    pub fn is_empty(&self) -> bool {
        self.num_characters == 0
    }

    pub fn num_chunks(&self) -> usize {
        self.num_chunks
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// The byte image at the last committed tick.
    pub fn snapshot(&self) -> &[u8] {
        &self.snapshot
    }

    pub fn snapshot_len(&self) -> usize {
        self.snapshot.len()
    }

    /// Walk the chunk list in document order.
    pub fn chunks(&self) -> ChunkIter<'_> {
        ChunkIter { doc: self, cur: self.head }
    }

    /// Flatten the chunk store into one contiguous byte string.
    pub fn flatten(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.num_characters);
        let mut cur = self.head;
        while let Some(id) = cur {
            out.extend_from_slice(&self.chunks[id].text);
            cur = self.chunks[id].next;
        }
        out
    }

    /// Publish the current chunk state as the new snapshot and reset the
    /// tick-local logs. `bump` is set when at least one command in the tick
    /// succeeded.
    pub(crate) fn commit(&mut self, bump: bool) {
        self.snapshot = self.flatten();
        debug_assert_eq!(self.snapshot.len(), self.num_characters);
        self.meta_log.clear();
        self.deleted.clear();
        if bump {
            self.version += 1;
        }
    }

    /// Find the chunk whose span contains `pos`, returning it and the local
    /// byte offset. `pos == len()` resolves to the tail at its end.
    pub(crate) fn locate(&self, pos: usize) -> (ChunkId, usize) {
        debug_assert!(pos <= self.num_characters);
        let mut cur = self.head.expect("locate on an empty document");
        let mut cum = 0;
        loop {
            let chunk = &self.chunks[cur];
            if pos < cum + chunk.len() {
                return (cur, pos - cum);
            }
            match chunk.next {
                Some(next) => {
                    cum += chunk.len();
                    cur = next;
                }
                // Tail; pos == num_characters.
                None => return (cur, pos - cum),
            }
        }
    }

    /// Link a fresh chunk in after `prev` (`None` links it in as the head).
    /// Only adjacency and the chunk count are touched here; byte accounting
    /// belongs to whichever operation actually adds or removes bytes.
    pub(crate) fn link_after(&mut self, prev: Option<ChunkId>, chunk: Chunk) -> ChunkId {
        let id = self.chunks.insert(chunk);
        let next = match prev {
            Some(p) => {
                let n = self.chunks[p].next;
                self.chunks[p].next = Some(id);
                n
            }
            None => {
                let h = self.head;
                self.head = Some(id);
                h
            }
        };
        self.chunks[id].prev = prev;
        self.chunks[id].next = next;
        match next {
            Some(n) => self.chunks[n].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.num_chunks += 1;
        id
    }

    pub(crate) fn unlink(&mut self, id: ChunkId) -> Chunk {
        let (prev, next) = {
            let c = &self.chunks[id];
            (c.prev, c.next)
        };
        match prev {
            Some(p) => self.chunks[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.chunks[n].prev = prev,
            None => self.tail = prev,
        }
        self.num_chunks -= 1;
        self.chunks.remove(id)
    }

    /// Split the line at `local` (which must be inside the chunk, `local > 0`)
    /// by writing a newline there and moving the suffix into a fresh `Plain`
    /// chunk. The document grows by exactly one byte.
    pub(crate) fn split_line_at(&mut self, id: ChunkId, local: usize) -> ChunkId {
        debug_assert!(local > 0 && local <= self.chunks[id].len());
        let suffix = self.chunks[id].text.split_off(local);
        self.chunks[id].text.push(b'\n');
        self.num_characters += 1;

        // Splitting inside the "N. " prefix leaves no rendered index behind,
        // and half a rule is not a rule.
        {
            let chunk = &mut self.chunks[id];
            if (chunk.kind.is_ordered() && local < 3) || chunk.kind == ChunkKind::HorizontalRule {
                chunk.kind = ChunkKind::Plain;
                chunk.ol_index = 0;
            }
        }

        let new_id = self.link_after(Some(id), Chunk::with_text(ChunkKind::Plain, &suffix));

        // Plain text now sits in front of whatever remains of the run.
        if let Some(next) = self.chunks[new_id].next {
            if self.chunks[next].kind.is_ordered() {
                self.renumber_from(next);
            }
        }
        new_id
    }

    /// Make `work` a line start, splitting if it lands mid-line. Returns the
    /// chunk that now begins at that position and whether a split (one new
    /// newline byte) happened.
    pub(crate) fn ensure_line_start(&mut self, work: usize) -> (ChunkId, bool) {
        if self.head.is_none() {
            let id = self.link_after(None, Chunk::new(ChunkKind::Plain));
            return (id, false);
        }
        let (id, local) = self.locate(work);
        if local == 0 {
            return (id, false);
        }
        let chunk = &self.chunks[id];
        if local == chunk.len() && chunk.ends_with_newline() {
            // Just past the final terminated line. Hand back a fresh empty
            // line; no byte was inserted.
            let id = self.link_after(Some(id), Chunk::new(ChunkKind::Plain));
            (id, false)
        } else {
            (self.split_line_at(id, local), true)
        }
    }

    /// Reassign ordered-list indices walking forward from `id`: sequential
    /// from the predecessor's index (or 1 when the predecessor is not an
    /// ordered item), capped at 9, rewriting each rendered prefix digit.
    pub(crate) fn renumber_from(&mut self, id: ChunkId) {
        let mut idx = match self.chunks[id].prev {
            Some(p) if self.chunks[p].kind.is_ordered() => self.chunks[p].ol_index,
            _ => 0,
        };
        let mut cur = Some(id);
        while let Some(c) = cur {
            let chunk = &mut self.chunks[c];
            if !chunk.kind.is_ordered() {
                break;
            }
            idx = (idx + 1).min(9);
            chunk.ol_index = idx;
            debug_assert!(chunk.len() >= 3);
            chunk.text[0] = b'0' + idx;
            cur = chunk.next;
        }
    }

    fn first_ordered_from(&self, id: ChunkId) -> Option<ChunkId> {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if self.chunks[c].kind.is_ordered() {
                return Some(c);
            }
            cur = self.chunks[c].next;
        }
        None
    }

    /// Splice bytes in at a working position. Embedded newlines are legal
    /// (the engine accepts them even though the line protocol can't carry
    /// them); the chunk is re-split afterwards so every chunk stays one line.
    pub(crate) fn insert_working(&mut self, work: usize, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if self.head.is_none() {
            let id = self.link_after(None, Chunk::with_text(ChunkKind::Plain, bytes));
            self.num_characters += bytes.len();
            self.split_off_embedded_lines(id);
            return;
        }
        let (id, local) = self.locate(work);
        let chunk = &self.chunks[id];
        if local == chunk.len() && chunk.ends_with_newline() {
            // Appending after the final terminated line starts a new one.
            let id = self.link_after(Some(id), Chunk::with_text(ChunkKind::Plain, bytes));
            self.num_characters += bytes.len();
            self.split_off_embedded_lines(id);
            return;
        }
        if (chunk.kind.is_ordered() && local < 3) || chunk.kind == ChunkKind::HorizontalRule {
            // Typing into the "N. " prefix (or into a rule) reverts the line
            // to plain text.
            let chunk = &mut self.chunks[id];
            chunk.kind = ChunkKind::Plain;
            chunk.ol_index = 0;
            let next = self.chunks[id].next;
            if let Some(n) = next {
                if self.chunks[n].kind.is_ordered() {
                    self.renumber_from(n);
                }
            }
        }
        self.chunks[id].insert_bytes(local, bytes);
        self.num_characters += bytes.len();
        self.split_off_embedded_lines(id);
    }

    /// Peel trailing lines off a chunk that ended up holding more than one
    /// (an insert can carry newlines). Byte count is unchanged.
    fn split_off_embedded_lines(&mut self, id: ChunkId) {
        let mut id = id;
        loop {
            let text = &self.chunks[id].text;
            let interior = &text[..text.len().saturating_sub(1)];
            let Some(nl) = interior.iter().position(|&b| b == b'\n') else {
                break;
            };
            let suffix = self.chunks[id].text.split_off(nl + 1);
            id = self.link_after(Some(id), Chunk::with_text(ChunkKind::Plain, &suffix));
        }
    }

    /// Physically remove a span of bytes. Called for each coalesced deleted
    /// range, in descending order, before any other command has touched the
    /// working buffer, so working and snapshot coordinates still agree.
    pub(crate) fn delete_span(&mut self, range: SnapRange) {
        debug_assert!(!range.is_empty() && range.end <= self.num_characters);
        let (start_id, start_local) = self.locate(range.start);
        let mut remaining = range.len();
        let mut cur = Some(start_id);
        let mut local = start_local;
        // First chunk at or after the hole that survives, and the start
        // chunk specifically if it keeps bytes.
        let mut anchor: Option<ChunkId> = None;
        let mut survivor: Option<ChunkId> = None;

        loop {
            let id = cur.expect("delete span runs past the tail");
            let (take, next, now_empty) = {
                let chunk = &mut self.chunks[id];
                let take = remaining.min(chunk.len() - local);
                // Deleting into an item's "N. " prefix (or into a rule)
                // reverts it.
                if take > 0
                    && ((chunk.kind.is_ordered() && local < 3)
                        || chunk.kind == ChunkKind::HorizontalRule)
                {
                    chunk.kind = ChunkKind::Plain;
                    chunk.ol_index = 0;
                }
                chunk.remove_bytes(local..local + take);
                (take, chunk.next, chunk.is_empty())
            };
            self.num_characters -= take;
            remaining -= take;

            if now_empty {
                self.unlink(id);
            } else {
                if id == start_id {
                    survivor = Some(id);
                }
                if anchor.is_none() {
                    anchor = Some(id);
                }
            }

            if remaining == 0 {
                if anchor.is_none() {
                    anchor = next;
                }
                break;
            }
            cur = next;
            local = 0;
        }

        // If the start line lost its trailing newline it now continues into
        // the next chunk; join the two lines. The start chunk's kind wins.
        if let Some(s) = survivor {
            if !self.chunks[s].ends_with_newline() && self.chunks[s].next.is_some() {
                self.merge_with_next(s);
            }
        }

        if let Some(a) = anchor {
            if let Some(ol) = self.first_ordered_from(a) {
                self.renumber_from(ol);
            }
        }
    }

    fn merge_with_next(&mut self, id: ChunkId) {
        let next_id = self.chunks[id].next.expect("merge_with_next at the tail");
        let next = self.unlink(next_id);
        let chunk = &mut self.chunks[id];
        let len = chunk.len();
        chunk.insert_bytes(len, &next.text);
    }
}

fn classify_line(line: &[u8]) -> (ChunkKind, u8) {
    let body = line.strip_suffix(b"\n").unwrap_or(line);
    if body == b"---" {
        return (ChunkKind::HorizontalRule, 0);
    }
    if line.starts_with(b"### ") {
        return (ChunkKind::Heading3, 0);
    }
    if line.starts_with(b"## ") {
        return (ChunkKind::Heading2, 0);
    }
    if line.starts_with(b"# ") {
        return (ChunkKind::Heading1, 0);
    }
    if line.starts_with(b"> ") {
        return (ChunkKind::Blockquote, 0);
    }
    if line.starts_with(b"- ") {
        return (ChunkKind::UnorderedItem, 0);
    }
    if line.len() >= 3 && line[0].is_ascii_digit() && line[0] != b'0' && &line[1..3] == b". " {
        return (ChunkKind::OrderedItem, line[0] - b'0');
    }
    (ChunkKind::Plain, 0)
}

pub struct ChunkIter<'a> {
    doc: &'a Document,
    cur: Option<ChunkId>,
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = &'a Chunk;

    fn next(&mut self) -> Option<&'a Chunk> {
        let id = self.cur?;
        self.cur = self.doc.chunks[id].next;
        Some(&self.doc.chunks[id])
    }
}
