use std::ops::{Index, IndexMut, Range};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Chunk buffers never start smaller than this, and they grow by doubling.
pub const MIN_CHUNK_CAP: usize = 128;

/// Semantic tag for one line of the document.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChunkKind {
    Plain,
    Heading1,
    Heading2,
    Heading3,
    Blockquote,
    UnorderedItem,
    OrderedItem,
    HorizontalRule,
}

impl ChunkKind {
    pub fn is_ordered(self) -> bool {
        self == ChunkKind::OrderedItem
    }
}

/// Stable handle into the chunk arena. Handles stay valid across unrelated
/// insertions and removals; only removing the chunk itself retires one.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ChunkId(u32);

/// One logical Markdown line: a semantic tag plus an owned byte buffer.
///
/// Every chunk except the document's last ends in a newline byte; the last
/// chunk may or may not. Ordered list items additionally render their index
/// as a `"N. "` prefix in the first three bytes, kept in sync with
/// `ol_index` by renumbering.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub kind: ChunkKind,
    pub text: Vec<u8>,
    /// 1..=9 when `kind` is `OrderedItem`, 0 otherwise.
    pub ol_index: u8,
    pub(crate) prev: Option<ChunkId>,
    pub(crate) next: Option<ChunkId>,
}

impl Chunk {
    pub fn new(kind: ChunkKind) -> Self {
        Chunk {
            kind,
            text: Vec::with_capacity(MIN_CHUNK_CAP),
            ol_index: 0,
            prev: None,
            next: None,
        }
    }

    pub fn with_text(kind: ChunkKind, text: &[u8]) -> Self {
        let mut chunk = Chunk::new(kind);
        chunk.text.extend_from_slice(text);
        chunk
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn ends_with_newline(&self) -> bool {
        self.text.last() == Some(&b'\n')
    }

    /// Splice `bytes` in at `local`, shifting the suffix right. Grows the
    /// buffer by doubling when it runs out of room.
    pub fn insert_bytes(&mut self, local: usize, bytes: &[u8]) {
        debug_assert!(local <= self.text.len());
        let needed = self.text.len() + bytes.len();
        if needed > self.text.capacity() {
            let mut cap = self.text.capacity().max(MIN_CHUNK_CAP);
            while cap < needed {
                cap *= 2;
            }
            self.text.reserve_exact(cap - self.text.len());
        }
        self.text.splice(local..local, bytes.iter().copied());
    }

    pub fn remove_bytes(&mut self, local: Range<usize>) {
        self.text.drain(local);
    }
}

/// Slot arena backing the document's chunk list.
///
/// Adjacency lives in the chunks themselves (`prev` / `next` handles), so the
/// arena is nothing but storage: a slot vector and a free list. Removing a
/// chunk recycles its slot without moving anything else.
#[derive(Debug, Clone, Default)]
pub struct ChunkArena {
    slots: Vec<Option<Chunk>>,
    free: Vec<ChunkId>,
}

impl ChunkArena {
    pub fn insert(&mut self, chunk: Chunk) -> ChunkId {
        match self.free.pop() {
            Some(id) => {
                debug_assert!(self.slots[id.0 as usize].is_none());
                self.slots[id.0 as usize] = Some(chunk);
                id
            }
            None => {
                let id = ChunkId(self.slots.len() as u32);
                self.slots.push(Some(chunk));
                id
            }
        }
    }

    pub fn remove(&mut self, id: ChunkId) -> Chunk {
        let chunk = self.slots[id.0 as usize].take().expect("removing a vacant chunk slot");
        self.free.push(id);
        chunk
    }

    /// Number of live chunks.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Index<ChunkId> for ChunkArena {
    type Output = Chunk;

    fn index(&self, id: ChunkId) -> &Chunk {
        self.slots[id.0 as usize].as_ref().expect("dangling ChunkId")
    }
}

impl IndexMut<ChunkId> for ChunkArena {
    fn index_mut(&mut self, id: ChunkId) -> &mut Chunk {
        self.slots[id.0 as usize].as_mut().expect("dangling ChunkId")
    }
}
