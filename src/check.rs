use crate::chunk::{ChunkId, ChunkKind};
use crate::document::Document;

impl Document {
    /// Check every internal invariant, panicking on the first violation.
    /// Used by tests and fuzzers; not part of the API.
    pub fn dbg_check(&self) {
        let mut count = 0;
        let mut bytes = 0;
        let mut prev: Option<ChunkId> = None;
        let mut cur = self.head;
        let mut run_index = 0u8;

        while let Some(id) = cur {
            let chunk = &self.chunks[id];
            assert_eq!(chunk.prev, prev, "broken back link");
            count += 1;
            bytes += chunk.len();

            if chunk.next.is_some() {
                assert!(chunk.ends_with_newline(), "interior chunk not newline-terminated");
            }

            if chunk.kind.is_ordered() {
                run_index = (run_index + 1).min(9);
                assert_eq!(chunk.ol_index, run_index, "ordered run numbering broken");
                assert!(chunk.len() >= 3, "ordered item shorter than its prefix");
                assert_eq!(
                    &chunk.text[..3],
                    &[b'0' + chunk.ol_index, b'.', b' '],
                    "rendered prefix disagrees with ol_index"
                );
            } else {
                run_index = 0;
                assert_eq!(chunk.ol_index, 0, "ol_index set on a non-ordered chunk");
                if chunk.kind == ChunkKind::HorizontalRule {
                    assert_eq!(chunk.text, b"---\n", "horizontal rule text drifted");
                }
            }

            prev = cur;
            cur = chunk.next;
        }

        assert_eq!(prev, self.tail, "tail pointer out of date");
        assert_eq!(count, self.num_chunks, "chunk count out of date");
        assert_eq!(bytes, self.num_characters, "byte count out of date");

        // Outside a tick the published image must match the chunk store.
        if self.meta_log.is_empty() && self.deleted.is_empty() {
            assert_eq!(self.snapshot, self.flatten(), "snapshot out of date");
        }

        let ranges = self.deleted.ranges();
        for r in ranges {
            assert!(r.start < r.end, "empty deleted range survived insertion");
        }
        for w in ranges.windows(2) {
            assert!(w[0].end < w[1].start, "deleted ranges not coalesced");
        }
    }
}
