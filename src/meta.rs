use smallvec::SmallVec;

/// One displacement record: an earlier command in this tick changed the
/// working buffer by `offset` bytes at snapshot position `snapshot_pos`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MetaEntry {
    pub snapshot_pos: usize,
    pub offset: isize,
}

/// The per-tick log of displacements, in batch-apply order.
///
/// All client-supplied positions name bytes in the immutable snapshot from
/// the last commit. While a batch is mid-application the working buffer has
/// drifted away from that image, and this log is what translates between the
/// two frames. It is cleared when the tick commits.
#[derive(Debug, Clone, Default)]
pub struct MetaLog(SmallVec<[MetaEntry; 8]>);

impl MetaLog {
    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, snapshot_pos: usize, offset: isize) {
        if offset != 0 {
            self.0.push(MetaEntry { snapshot_pos, offset });
        }
    }

    /// Translate a snapshot position into the working frame: earlier applied
    /// commands at snapshot positions strictly before `pos` shift it by the
    /// sum of their offsets. The result is clamped into `0..=doc_len`.
    pub fn project(&self, pos: usize, doc_len: usize) -> usize {
        self.project_with(pos, doc_len, false)
    }

    /// Like [`project`](MetaLog::project), but entries at exactly `pos` shift
    /// the anchor too. Block commands use this: their anchor names the line
    /// as it currently stands, so text inserted at that same spot earlier in
    /// the tick belongs in front of them.
    pub fn project_block(&self, pos: usize, doc_len: usize) -> usize {
        self.project_with(pos, doc_len, true)
    }

    fn project_with(&self, pos: usize, doc_len: usize, inclusive: bool) -> usize {
        let mut p = pos as isize;
        for e in &self.0 {
            if e.snapshot_pos < pos || (inclusive && e.snapshot_pos == pos) {
                p += e.offset;
            }
        }
        p.clamp(0, doc_len as isize) as usize
    }
}
