//! A persistent piece-table text buffer.
//!
//! The document is represented as a sequence of [`Piece`]s, each a
//! reference into an immutable backing buffer: original content loaded at
//! open time plus one append-only buffer accumulating inserted text. The
//! pieces hang off an immutable red-black tree augmented with per-node
//! byte and line-feed aggregates, so inserts, deletes, and line/offset
//! queries are all logarithmic, and no edit ever copies unmodified text.
//!
//! Every mutation builds a new tree version that shares untouched subtrees
//! with its predecessors through `Arc`. A retained version
//! ([`Snapshot`]) keeps reading exactly the content it had when taken, no
//! matter how the live document evolves — the basis for undo stacks and
//! background readers, which this crate deliberately does not provide
//! itself.
//!
//! ```
//! use piece_tree::PieceTreeBuffer;
//!
//! let mut buffer = PieceTreeBuffer::from_str("ab\ncd\n");
//! assert_eq!(buffer.line_count(), 3);
//!
//! let snapshot = buffer.snapshot();
//! buffer.insert(0, 1, "X");
//! assert_eq!(buffer.get_line_content(0), "aXb");
//! assert_eq!(buffer.text_of(&snapshot), b"ab\ncd\n");
//! ```

pub mod buffer;
pub mod piece;
pub mod text_buffer;
pub mod tree;

pub use buffer::{BackingBuffer, BufferCursor, BufferId, BufferStore};
pub use piece::Piece;
pub use text_buffer::{PieceTreeBuffer, Snapshot, MAX_PIECE_SIZE};
pub use tree::{PieceTree, TreeStats};
