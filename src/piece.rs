//! Pieces: immutable references to runs of text in a backing buffer.
//!
//! A piece describes a contiguous byte range of exactly one backing buffer
//! together with cached length and line-feed metadata. Pieces are plain
//! `Copy` values and are never modified after construction; every edit
//! produces new pieces.

use crate::buffer::{BufferCursor, BufferId, BufferStore};

/// A contiguous run of text within one backing buffer.
///
/// `length` is the byte distance between `start` and `end`; `newline_count`
/// is the number of line feeds in that range. Both are derived from the
/// buffer's line-start index, never from a scan of the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub buffer: BufferId,
    pub start: BufferCursor,
    pub end: BufferCursor,
    pub length: usize,
    pub newline_count: usize,
}

impl Piece {
    /// Build a piece over `[start, end)` of a backing buffer, computing its
    /// metadata from the buffer's line-start index.
    ///
    /// The line-feed count falls out of the cursors themselves: every line
    /// boundary between `start.line` and `end.line` is one line feed inside
    /// the range, so no bytes are touched.
    pub fn new(store: &BufferStore, buffer: BufferId, start: BufferCursor, end: BufferCursor) -> Self {
        let buf = store.buffer(buffer);
        let start_offset = buf.offset_of(start);
        let end_offset = buf.offset_of(end);
        debug_assert!(start_offset <= end_offset);
        Piece {
            buffer,
            start,
            end,
            length: end_offset - start_offset,
            newline_count: end.line - start.line,
        }
    }

    /// Split this piece at a byte offset within it, producing the two
    /// halves over the same underlying range. `at` must be strictly inside
    /// the piece; neither half is empty.
    pub fn split(&self, store: &BufferStore, at: usize) -> (Piece, Piece) {
        debug_assert!(at > 0 && at < self.length);
        let buf = store.buffer(self.buffer);
        let mid = buf.cursor_at(buf.offset_of(self.start) + at);
        (
            Piece::new(store, self.buffer, self.start, mid),
            Piece::new(store, self.buffer, mid, self.end),
        )
    }

    /// Whether `other` continues this piece: same backing buffer, and its
    /// range starts exactly where this one ends.
    pub fn is_adjacent_to(&self, other: &Piece) -> bool {
        self.buffer == other.buffer && self.end == other.start
    }

    /// Merge two adjacent pieces into one covering both ranges.
    pub fn merge(&self, other: &Piece) -> Piece {
        debug_assert!(self.is_adjacent_to(other));
        Piece {
            buffer: self.buffer,
            start: self.start,
            end: other.end,
            length: self.length + other.length,
            newline_count: self.newline_count + other.newline_count,
        }
    }

    /// The bytes this piece references.
    pub fn bytes<'a>(&self, store: &'a BufferStore) -> &'a [u8] {
        store.slice(self.buffer, self.start, self.end)
    }
}
