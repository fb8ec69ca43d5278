//! Backing buffer storage for the piece table.
//!
//! Text bytes live in backing buffers and are never moved or rewritten once
//! stored. Original buffers hold the content the document was opened with;
//! a single append-only add buffer accumulates every inserted run of text.
//! Pieces reference ranges of these buffers by cursor, so edits only ever
//! touch piece boundaries, not buffer bytes.

/// A position local to one backing buffer: a 0-indexed line within the
/// buffer plus a byte column within that line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BufferCursor {
    pub line: usize,
    pub column: usize,
}

impl BufferCursor {
    pub fn new(line: usize, column: usize) -> Self {
        BufferCursor { line, column }
    }
}

/// Identifies which backing buffer a piece of text comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferId {
    /// Content loaded at open time; never modified.
    Original(usize),
    /// The single append-only buffer holding inserted text.
    Added,
}

/// One backing buffer: raw bytes plus the byte offset of every line start.
///
/// `line_starts` always begins with 0 and gains one entry per line feed, so
/// `line_starts.len() - 1` is the number of line feeds in the buffer.
#[derive(Debug, Clone)]
pub struct BackingBuffer {
    data: Vec<u8>,
    line_starts: Vec<usize>,
}

impl BackingBuffer {
    /// Create a buffer from its full contents, scanning for line feeds once.
    pub fn new(data: Vec<u8>) -> Self {
        let line_starts = Self::compute_line_starts(&data);
        BackingBuffer { data, line_starts }
    }

    pub fn empty() -> Self {
        BackingBuffer {
            data: Vec::new(),
            line_starts: vec![0],
        }
    }

    fn compute_line_starts(data: &[u8]) -> Vec<usize> {
        let mut line_starts = vec![0];
        for (i, &byte) in data.iter().enumerate() {
            if byte == b'\n' {
                line_starts.push(i + 1);
            }
        }
        line_starts
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn line_starts(&self) -> &[usize] {
        &self.line_starts
    }

    /// Number of line feeds stored in this buffer.
    pub fn line_feed_count(&self) -> usize {
        self.line_starts.len() - 1
    }

    /// Append bytes at the end, extending the line-start index by scanning
    /// only the appended bytes. Returns the cursor where the appended run
    /// starts.
    pub fn append(&mut self, bytes: &[u8]) -> BufferCursor {
        let start = self.end_cursor();
        let base = self.data.len();
        self.data.extend_from_slice(bytes);
        for (i, &byte) in bytes.iter().enumerate() {
            if byte == b'\n' {
                self.line_starts.push(base + i + 1);
            }
        }
        start
    }

    /// Cursor just past the last byte of the buffer.
    pub fn end_cursor(&self) -> BufferCursor {
        let line = self.line_starts.len() - 1;
        BufferCursor::new(line, self.data.len() - self.line_starts[line])
    }

    /// Absolute byte offset of a cursor.
    pub fn offset_of(&self, cursor: BufferCursor) -> usize {
        self.line_starts[cursor.line] + cursor.column
    }

    /// Cursor for an absolute byte offset. The cursor's line is the line
    /// whose half-open range contains the offset (binary search over the
    /// line-start index).
    pub fn cursor_at(&self, offset: usize) -> BufferCursor {
        debug_assert!(offset <= self.data.len());
        let line = self.line_starts.partition_point(|&s| s <= offset) - 1;
        BufferCursor::new(line, offset - self.line_starts[line])
    }

    /// The bytes between two cursors.
    pub fn slice(&self, start: BufferCursor, end: BufferCursor) -> &[u8] {
        &self.data[self.offset_of(start)..self.offset_of(end)]
    }
}

/// The document's backing buffers: original content plus the add buffer.
///
/// This is the only mutable state in the design, and its only mutation is
/// monotonic growth of the add buffer through [`BufferStore::append`].
/// Pieces held by any tree version keep referencing stable byte ranges.
#[derive(Debug)]
pub struct BufferStore {
    originals: Vec<BackingBuffer>,
    added: BackingBuffer,
}

impl BufferStore {
    pub fn new() -> Self {
        BufferStore {
            originals: Vec::new(),
            added: BackingBuffer::empty(),
        }
    }

    /// Register an original buffer loaded at open time.
    pub fn push_original(&mut self, data: Vec<u8>) -> BufferId {
        self.originals.push(BackingBuffer::new(data));
        BufferId::Original(self.originals.len() - 1)
    }

    /// Append inserted text to the add buffer. Returns the cursor where the
    /// appended run starts; the run ends at [`BufferStore::added_end`].
    pub fn append(&mut self, bytes: &[u8]) -> BufferCursor {
        self.added.append(bytes)
    }

    /// Cursor just past the last byte of the add buffer.
    pub fn added_end(&self) -> BufferCursor {
        self.added.end_cursor()
    }

    pub fn buffer(&self, id: BufferId) -> &BackingBuffer {
        match id {
            BufferId::Original(i) => &self.originals[i],
            BufferId::Added => &self.added,
        }
    }

    /// The bytes between two cursors of one backing buffer.
    pub fn slice(&self, id: BufferId, start: BufferCursor, end: BufferCursor) -> &[u8] {
        self.buffer(id).slice(start, end)
    }
}

impl Default for BufferStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_starts_computed_on_load() {
        let buf = BackingBuffer::new(b"ab\ncd\n".to_vec());
        assert_eq!(buf.line_starts(), &[0, 3, 6]);
        assert_eq!(buf.line_feed_count(), 2);
    }

    #[test]
    fn empty_buffer_has_one_line_start() {
        let buf = BackingBuffer::empty();
        assert_eq!(buf.line_starts(), &[0]);
        assert_eq!(buf.line_feed_count(), 0);
        assert_eq!(buf.end_cursor(), BufferCursor::new(0, 0));
    }

    #[test]
    fn append_extends_line_starts_incrementally() {
        let mut buf = BackingBuffer::empty();
        let start = buf.append(b"hello\n");
        assert_eq!(start, BufferCursor::new(0, 0));
        let start = buf.append(b"wo\nrld");
        assert_eq!(start, BufferCursor::new(1, 0));
        assert_eq!(buf.line_starts(), &[0, 6, 9]);
        assert_eq!(buf.end_cursor(), BufferCursor::new(2, 3));
    }

    #[test]
    fn cursor_offset_round_trip() {
        let buf = BackingBuffer::new(b"ab\ncd\nef".to_vec());
        for offset in 0..=buf.len() {
            let cursor = buf.cursor_at(offset);
            assert_eq!(buf.offset_of(cursor), offset);
        }
        assert_eq!(buf.cursor_at(3), BufferCursor::new(1, 0));
        assert_eq!(buf.cursor_at(2), BufferCursor::new(0, 2));
    }

    #[test]
    fn slice_between_cursors() {
        let buf = BackingBuffer::new(b"ab\ncd\n".to_vec());
        let s = buf.slice(BufferCursor::new(0, 1), BufferCursor::new(1, 1));
        assert_eq!(s, b"b\nc");
    }

    #[test]
    fn store_append_returns_start_cursor() {
        let mut store = BufferStore::new();
        let id = store.push_original(b"abc".to_vec());
        assert_eq!(id, BufferId::Original(0));
        let c1 = store.append(b"x\n");
        assert_eq!(c1, BufferCursor::new(0, 0));
        let c2 = store.append(b"yz");
        assert_eq!(c2, BufferCursor::new(1, 0));
        assert_eq!(store.added_end(), BufferCursor::new(1, 2));
        assert_eq!(store.buffer(BufferId::Added).bytes(), b"x\nyz");
    }
}
