//! The document façade: a text buffer backed by the persistent piece tree.
//!
//! Composes the backing buffer store and the tree into the externally
//! visible operations: load content, query size/lines, read lines, insert
//! and remove by (line, column). Coordinates clamp to the document rather
//! than failing, so callers slightly out of sync with the buffer (a UI
//! reacting to a stale line count) stay safe; see the individual methods
//! for the exact policy.
//!
//! All input text must be valid UTF-8; the caller validates before it gets
//! here. Columns are byte offsets within a line, not code points.

use anyhow::Result;

use crate::buffer::{BufferId, BufferStore};
use crate::piece::Piece;
use crate::tree::{PieceTree, TreeStats};

/// Upper bound on the size of pieces created by bulk loading. Large
/// original content is chunked so a later edit never splits a piece
/// spanning the whole document.
pub const MAX_PIECE_SIZE: usize = 64 * 1024;

/// A retained prior version of the document.
///
/// Cheap to take and to keep: it shares every unchanged subtree with the
/// live document. Read it back through [`PieceTreeBuffer::text_of`] on the
/// buffer that produced it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    tree: PieceTree,
}

impl Snapshot {
    pub fn size(&self) -> usize {
        self.tree.len()
    }

    pub fn line_count(&self) -> usize {
        self.tree.line_feed_count() + 1
    }
}

/// A text buffer over a persistent piece tree.
#[derive(Debug)]
pub struct PieceTreeBuffer {
    store: BufferStore,
    tree: PieceTree,
}

impl PieceTreeBuffer {
    pub fn new() -> Self {
        PieceTreeBuffer {
            store: BufferStore::new(),
            tree: PieceTree::empty(),
        }
    }

    pub fn from_str(text: &str) -> Self {
        let mut buffer = Self::new();
        buffer.set_contents(text);
        buffer
    }

    /// Replace the whole document with `text`.
    ///
    /// The content becomes a fresh original buffer referenced by chunked
    /// pieces, and the add buffer starts over empty. Snapshots taken
    /// before this call must not be read through this buffer afterwards.
    pub fn set_contents(&mut self, text: &str) {
        self.store = BufferStore::new();
        self.tree = PieceTree::empty();
        let bytes = text.as_bytes();
        if bytes.is_empty() {
            return;
        }
        let id = self.store.push_original(bytes.to_vec());
        let mut offset = 0;
        while offset < bytes.len() {
            let end = (offset + MAX_PIECE_SIZE).min(bytes.len());
            let buf = self.store.buffer(id);
            let piece = Piece::new(&self.store, id, buf.cursor_at(offset), buf.cursor_at(end));
            self.tree.insert(self.tree.len(), piece);
            offset = end;
        }
    }

    /// Total document length in bytes. O(1).
    pub fn size(&self) -> usize {
        self.tree.len()
    }

    /// Total number of lines. A document always has at least one line;
    /// every line feed starts another. O(1).
    pub fn line_count(&self) -> usize {
        self.tree.line_feed_count() + 1
    }

    /// Document offset of the first byte of `line`. Out-of-range line
    /// numbers clamp to the last line.
    pub fn byte_offset_of_line(&self, line: usize) -> usize {
        self.tree.offset_of_line(line, &self.store)
    }

    /// Length in bytes of `line`, excluding its line feed. Out-of-range
    /// line numbers clamp to the last line.
    pub fn line_length(&self, line: usize) -> usize {
        let line = line.min(self.line_count() - 1);
        self.line_end(line) - self.byte_offset_of_line(line)
    }

    /// The content of `line` without its trailing line feed. Out-of-range
    /// line numbers clamp to the last line.
    pub fn get_line_content(&self, line: usize) -> String {
        let line = line.min(self.line_count() - 1);
        let start = self.byte_offset_of_line(line);
        let end = self.line_end(line);
        let bytes = self.tree.extract(start..end, &self.store);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Offset one past the last content byte of `line` (before its line
    /// feed, or the document end for the last line).
    fn line_end(&self, line: usize) -> usize {
        if line < self.tree.line_feed_count() {
            self.tree.offset_of_line(line + 1, &self.store) - 1
        } else {
            self.tree.len()
        }
    }

    /// Resolve (line, column) to a document offset, clamping both the line
    /// number and the column to what the document actually holds.
    fn offset_for(&self, line: usize, column: usize) -> usize {
        let line = line.min(self.line_count() - 1);
        let start = self.byte_offset_of_line(line);
        start + column.min(self.line_end(line) - start)
    }

    /// Insert `text` before the byte at (line, column). Coordinates clamp;
    /// the text itself is appended to the add buffer and spliced in as a
    /// new piece.
    pub fn insert(&mut self, line: usize, column: usize, text: &str) {
        let offset = self.offset_for(line, column);
        self.insert_at_offset(offset, text);
    }

    /// Insert `text` at a document offset (clamped to the document end).
    pub fn insert_at_offset(&mut self, offset: usize, text: &str) {
        if text.is_empty() {
            return;
        }
        let offset = offset.min(self.tree.len());
        tracing::debug!(offset, bytes = text.len(), "insert");
        let start = self.store.append(text.as_bytes());
        let end = self.store.added_end();
        let piece = Piece::new(&self.store, BufferId::Added, start, end);

        // Typing at the end of the most recently appended piece extends it
        // instead of growing the piece count: the add buffer is append-only,
        // so the ranges are contiguous exactly in that case.
        if offset > 0 {
            if let Some((prev, within)) = self.tree.piece_at(offset - 1) {
                if within == prev.length - 1 && prev.is_adjacent_to(&piece) {
                    let prev_start = offset - prev.length;
                    self.tree.remove(prev_start);
                    self.tree.insert(prev_start, prev.merge(&piece));
                    return;
                }
            }
        }

        match self.tree.piece_at(offset) {
            Some((host, within)) if within > 0 => {
                // Mid-piece insert: split the occupying piece around it.
                let host_start = offset - within;
                self.tree.remove(host_start);
                let (head, tail) = host.split(&self.store, within);
                self.tree.insert(host_start, head);
                self.tree.insert(offset, piece);
                self.tree.insert(offset + piece.length, tail);
            }
            _ => self.tree.insert(offset, piece),
        }
    }

    /// Remove `byte_count` bytes starting at (line, column). The range may
    /// span line feeds and piece boundaries; it clips to the document end,
    /// so over-long deletions are benign.
    pub fn remove(&mut self, line: usize, column: usize, byte_count: usize) {
        let start = self.offset_for(line, column);
        self.remove_at_offset(start, byte_count);
    }

    /// Remove `byte_count` bytes starting at a document offset, clipped to
    /// the document.
    pub fn remove_at_offset(&mut self, offset: usize, byte_count: usize) {
        let start = offset.min(self.tree.len());
        let end = start.saturating_add(byte_count).min(self.tree.len());
        if start >= end {
            return;
        }
        tracing::debug!(offset = start, bytes = end - start, "remove");
        self.tree.remove_range(start, end, &self.store);
    }

    /// The whole document content, in one traversal.
    pub fn text(&self) -> Vec<u8> {
        self.tree.extract(0..self.tree.len(), &self.store)
    }

    /// Retain the current version. Later edits to this buffer never change
    /// what the snapshot reads.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tree: self.tree.clone(),
        }
    }

    /// The full content of a previously taken snapshot.
    pub fn text_of(&self, snapshot: &Snapshot) -> Vec<u8> {
        snapshot.tree.extract(0..snapshot.tree.len(), &self.store)
    }

    pub fn stats(&self) -> TreeStats {
        self.tree.stats()
    }

    /// Run the tree's internal consistency checks. Test tooling only; a
    /// failure is a bug in this crate.
    pub fn check_invariants(&self) -> Result<()> {
        self.tree.check_invariants(&self.store)
    }
}

impl Default for PieceTreeBuffer {
    fn default() -> Self {
        Self::new()
    }
}
