//! The augmented persistent search tree behind the piece table.
//!
//! An immutable red-black tree keyed by cumulative document offset. Each
//! node holds one [`Piece`] plus the total byte length and line-feed count
//! of its left subtree, so offset and line lookups descend without any
//! absolute-position bookkeeping. Nodes are shared between tree versions
//! through `Arc`: every mutation path-copies the root-to-target spine and
//! reuses every untouched subtree, so any previously obtained
//! [`PieceTree`] value keeps reading exactly the content it had when it
//! was taken.
//!
//! Insertion is the classic functional red-black insert: a red leaf at the
//! target position, then red-red rotation patterns on the way back up.
//! Deletion tracks its black-height deficit as an explicit transient
//! marker ([`Fixup::DoubleBlack`]) carried in the recursive return value;
//! the marker is resolved by sibling recoloring/rotation before any public
//! operation returns, and never appears in a persisted node.

use std::ops::Range;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};

use crate::buffer::BufferStore;
use crate::piece::Piece;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

type Link = Option<Arc<Node>>;

/// One tree node: a piece plus cached left-subtree aggregates.
///
/// Nodes are immutable after construction; the aggregates are computed
/// once from the children the node is built with.
#[derive(Debug)]
pub struct Node {
    color: Color,
    left: Link,
    piece: Piece,
    /// Total bytes in the left subtree.
    left_len: usize,
    /// Total line feeds in the left subtree.
    left_lf: usize,
    right: Link,
}

/// Total bytes of a whole subtree, read off the cached left aggregates
/// along its right spine.
fn subtree_len(link: &Link) -> usize {
    let mut total = 0;
    let mut cur = link;
    while let Some(n) = cur {
        total += n.left_len + n.piece.length;
        cur = &n.right;
    }
    total
}

/// Total line feeds of a whole subtree.
fn subtree_lf(link: &Link) -> usize {
    let mut total = 0;
    let mut cur = link;
    while let Some(n) = cur {
        total += n.left_lf + n.piece.newline_count;
        cur = &n.right;
    }
    total
}

/// Build a node, recomputing its left-subtree aggregates.
fn node(color: Color, left: Link, piece: Piece, right: Link) -> Arc<Node> {
    Arc::new(Node {
        color,
        left_len: subtree_len(&left),
        left_lf: subtree_lf(&left),
        left,
        piece,
        right,
    })
}

/// Copy of a node with a different color; shares both subtrees.
fn paint(n: &Arc<Node>, color: Color) -> Arc<Node> {
    if n.color == color {
        Arc::clone(n)
    } else {
        Arc::new(Node {
            color,
            left: n.left.clone(),
            piece: n.piece,
            left_len: n.left_len,
            left_lf: n.left_lf,
            right: n.right.clone(),
        })
    }
}

fn is_red(link: &Link) -> bool {
    matches!(link, Some(n) if n.color == Color::Red)
}

/// Outcome of one recursive deletion step.
///
/// `DoubleBlack` marks a subtree that is one black node short on every
/// path — the transient double-black state of red-black deletion. The
/// parent resolves it by looking at the sibling's color and the sibling's
/// children's colors, either recoloring, rotating, or passing the marker
/// further up. The public `remove` absorbs a marker that survives to the
/// root by repainting the root black.
enum Fixup {
    Balanced(Link),
    DoubleBlack(Link),
}

/// Summary of the tree's shape, for tests and diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct TreeStats {
    pub total_bytes: usize,
    pub line_feeds: usize,
    pub piece_count: usize,
    pub depth: usize,
}

/// A persistent piece tree value.
///
/// Cloning is cheap (an `Arc` bump plus two counters) and yields an
/// independent version: mutating one clone never changes what another
/// reads. Whole-document length and line-feed totals are cached on the
/// value itself so both queries are O(1) on any version.
#[derive(Debug, Clone)]
pub struct PieceTree {
    root: Link,
    length: usize,
    line_feeds: usize,
}

impl PieceTree {
    pub fn empty() -> Self {
        PieceTree {
            root: None,
            length: 0,
            line_feeds: 0,
        }
    }

    /// Total bytes across all pieces.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Total line feeds across all pieces.
    pub fn line_feed_count(&self) -> usize {
        self.line_feeds
    }

    /// Insert a piece so that its first byte lands at `offset`.
    ///
    /// `offset` must lie on a piece boundary (callers split the occupying
    /// piece first); a zero-length piece is ignored.
    pub fn insert(&mut self, offset: usize, piece: Piece) {
        if piece.length == 0 {
            return;
        }
        debug_assert!(offset <= self.length);
        let new_root = ins(&self.root, offset, piece);
        self.root = Some(paint(&new_root, Color::Black));
        self.length += piece.length;
        self.line_feeds += piece.newline_count;
    }

    /// Remove the whole piece containing `offset` and return it.
    ///
    /// Returns `None` if `offset` is past the end of the document.
    pub fn remove(&mut self, offset: usize) -> Option<Piece> {
        let (_, within) = self.piece_at(offset)?;
        let target = offset - within;
        let (fixup, removed) = rem(&self.root, target);
        let link = match fixup {
            Fixup::Balanced(link) => link,
            // A deficit at the root lowers the black height of every path
            // uniformly, so it is absorbed here.
            Fixup::DoubleBlack(link) => link,
        };
        self.root = link.map(|n| paint(&n, Color::Black));
        self.length -= removed.length;
        self.line_feeds -= removed.newline_count;
        Some(removed)
    }

    /// Delete the byte range `[start, end)`, splitting the pieces at the
    /// range ends as needed and re-inserting the surviving remainders.
    ///
    /// An empty or inverted range is a no-op that leaves the tree value
    /// untouched. Pieces left adjacent at the deletion seam are coalesced
    /// when they reference contiguous ranges of the same backing buffer.
    pub fn remove_range(&mut self, start: usize, end: usize, store: &BufferStore) {
        let end = end.min(self.length);
        if start >= end {
            return;
        }
        let mut remaining = end - start;
        while remaining > 0 {
            let Some((piece, within)) = self.piece_at(start) else {
                break;
            };
            let piece_start = start - within;
            self.remove(piece_start);
            let tail = if within > 0 {
                let (head, tail) = piece.split(store, within);
                self.insert(piece_start, head);
                tail
            } else {
                piece
            };
            // `tail` begins at document offset `start`; drop its deleted
            // prefix and keep whatever extends past the range.
            let take = remaining.min(tail.length);
            if take < tail.length {
                let (_, keep) = tail.split(store, take);
                self.insert(start, keep);
            }
            remaining -= take;
        }
        self.coalesce_at(start);
    }

    /// Merge the two pieces meeting at `offset` if they are contiguous in
    /// the same backing buffer. Keeps the piece count bounded after edits
    /// that re-expose adjacent ranges.
    fn coalesce_at(&mut self, offset: usize) {
        if offset == 0 || offset >= self.length {
            return;
        }
        let Some((right, within)) = self.piece_at(offset) else {
            return;
        };
        if within != 0 {
            return; // not a piece boundary
        }
        let Some((left, left_within)) = self.piece_at(offset - 1) else {
            return;
        };
        if !left.is_adjacent_to(&right) {
            return;
        }
        let left_start = offset - 1 - left_within;
        self.remove(offset);
        self.remove(left_start);
        self.insert(left_start, left.merge(&right));
    }

    /// Find the piece containing `offset`, returning it together with the
    /// offset of the target byte within the piece. `None` past the end.
    pub fn piece_at(&self, offset: usize) -> Option<(Piece, usize)> {
        if offset >= self.length {
            return None;
        }
        let mut cur = self.root.as_ref()?;
        let mut rel = offset;
        loop {
            if rel < cur.left_len {
                cur = cur.left.as_ref()?;
            } else if rel < cur.left_len + cur.piece.length {
                return Some((cur.piece, rel - cur.left_len));
            } else {
                rel -= cur.left_len + cur.piece.length;
                cur = cur.right.as_ref()?;
            }
        }
    }

    /// Document offset of the first byte of `line`.
    ///
    /// Line numbers past the last line clamp to the last line's start.
    /// Descends by line-feed aggregates, then finds the line feed inside
    /// the resolved piece through its buffer's line-start index.
    pub fn offset_of_line(&self, line: usize, store: &BufferStore) -> usize {
        if line == 0 {
            return 0;
        }
        // Line k starts just past the k-th line feed of the document.
        let mut k = line.min(self.line_feeds);
        if k == 0 {
            return 0;
        }
        let mut base = 0;
        let mut cur = &self.root;
        loop {
            let Some(n) = cur else {
                // Totals guarantee the k-th line feed exists.
                unreachable!("line-feed aggregates out of sync with tree");
            };
            if k <= n.left_lf {
                cur = &n.left;
            } else if k <= n.left_lf + n.piece.newline_count {
                let j = k - n.left_lf;
                let buf = store.buffer(n.piece.buffer);
                // The j-th line feed of the piece ends buffer line
                // `start.line + j - 1`; the next line starts right after.
                let after_lf = buf.line_starts()[n.piece.start.line + j];
                let within = after_lf - buf.offset_of(n.piece.start);
                return base + n.left_len + within;
            } else {
                k -= n.left_lf + n.piece.newline_count;
                base += n.left_len + n.piece.length;
                cur = &n.right;
            }
        }
    }

    /// Collect the bytes of a document range, clamped to the document.
    pub fn extract(&self, range: Range<usize>, store: &BufferStore) -> Vec<u8> {
        let start = range.start.min(self.length);
        let end = range.end.min(self.length);
        let mut out = Vec::with_capacity(end.saturating_sub(start));
        if start < end {
            collect_range(&self.root, start, end, store, &mut out);
        }
        out
    }

    /// All pieces in document order.
    pub fn pieces(&self) -> Vec<Piece> {
        let mut out = Vec::new();
        collect_pieces(&self.root, &mut out);
        out
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats {
            total_bytes: self.length,
            line_feeds: self.line_feeds,
            piece_count: self.pieces().len(),
            depth: depth(&self.root),
        }
    }

    /// Verify every structural invariant: red-black shape, aggregate
    /// caches, piece metadata against the backing buffers, and the cached
    /// totals. A failure here is a bug in the tree itself, never a caller
    /// error; tests run this after every mutation.
    pub fn check_invariants(&self, store: &BufferStore) -> Result<()> {
        if let Some(root) = &self.root {
            ensure!(root.color == Color::Black, "root must be black");
        }
        let (_, total_len, total_lf) =
            check_node(&self.root, store).context("tree structure check failed")?;
        ensure!(
            total_len == self.length,
            "cached length {} != piece total {}",
            self.length,
            total_len
        );
        ensure!(
            total_lf == self.line_feeds,
            "cached line feeds {} != piece total {}",
            self.line_feeds,
            total_lf
        );
        Ok(())
    }

    #[cfg(test)]
    fn root_ptr(&self) -> Option<*const Node> {
        self.root.as_deref().map(|n| n as *const Node)
    }
}

fn depth(link: &Link) -> usize {
    match link {
        None => 0,
        Some(n) => 1 + depth(&n.left).max(depth(&n.right)),
    }
}

fn collect_pieces(link: &Link, out: &mut Vec<Piece>) {
    if let Some(n) = link {
        collect_pieces(&n.left, out);
        out.push(n.piece);
        collect_pieces(&n.right, out);
    }
}

/// Append the bytes of subtree range `[start, end)` (subtree-relative) to
/// `out`, descending only into children that overlap the range.
fn collect_range(link: &Link, start: usize, end: usize, store: &BufferStore, out: &mut Vec<u8>) {
    let Some(n) = link else {
        return;
    };
    let piece_start = n.left_len;
    let piece_end = n.left_len + n.piece.length;
    if start < piece_start {
        collect_range(&n.left, start, end.min(piece_start), store, out);
    }
    if start < piece_end && end > piece_start {
        let from = start.max(piece_start) - piece_start;
        let to = end.min(piece_end) - piece_start;
        let buf = store.buffer(n.piece.buffer);
        let base = buf.offset_of(n.piece.start);
        out.extend_from_slice(&buf.bytes()[base + from..base + to]);
    }
    if end > piece_end {
        collect_range(&n.right, start.max(piece_end) - piece_end, end - piece_end, store, out);
    }
}

/// Path-copying insert: returns the new subtree root, possibly with a
/// red-red violation at the top for the caller's `balance` to fix.
fn ins(link: &Link, offset: usize, piece: Piece) -> Arc<Node> {
    match link {
        None => node(Color::Red, None, piece, None),
        Some(n) => {
            if offset <= n.left_len {
                balance(
                    n.color,
                    Some(ins(&n.left, offset, piece)),
                    n.piece,
                    n.right.clone(),
                )
            } else {
                debug_assert!(
                    offset >= n.left_len + n.piece.length,
                    "insert offset must lie on a piece boundary"
                );
                let rel = offset - n.left_len - n.piece.length;
                balance(
                    n.color,
                    n.left.clone(),
                    n.piece,
                    Some(ins(&n.right, rel, piece)),
                )
            }
        }
    }
}

/// The four red-red rotation patterns of functional red-black insertion.
/// Anything else is rebuilt as-is.
fn balance(color: Color, left: Link, piece: Piece, right: Link) -> Arc<Node> {
    if color == Color::Black {
        if let Some(l) = &left {
            if l.color == Color::Red {
                if is_red(&l.left) {
                    let ll = l.left.as_ref().expect("checked red");
                    return node(
                        Color::Red,
                        Some(paint(ll, Color::Black)),
                        l.piece,
                        Some(node(Color::Black, l.right.clone(), piece, right)),
                    );
                }
                if is_red(&l.right) {
                    let lr = l.right.as_ref().expect("checked red");
                    return node(
                        Color::Red,
                        Some(node(Color::Black, l.left.clone(), l.piece, lr.left.clone())),
                        lr.piece,
                        Some(node(Color::Black, lr.right.clone(), piece, right)),
                    );
                }
            }
        }
        if let Some(r) = &right {
            if r.color == Color::Red {
                if is_red(&r.left) {
                    let rl = r.left.as_ref().expect("checked red");
                    return node(
                        Color::Red,
                        Some(node(Color::Black, left, piece, rl.left.clone())),
                        rl.piece,
                        Some(node(Color::Black, rl.right.clone(), r.piece, r.right.clone())),
                    );
                }
                if is_red(&r.right) {
                    let rr = r.right.as_ref().expect("checked red");
                    return node(
                        Color::Red,
                        Some(node(Color::Black, left, piece, r.left.clone())),
                        r.piece,
                        Some(paint(rr, Color::Black)),
                    );
                }
            }
        }
    }
    node(color, left, piece, right)
}

/// Recursive deletion of the piece starting exactly at `offset`.
fn rem(link: &Link, offset: usize) -> (Fixup, Piece) {
    let Some(n) = link else {
        unreachable!("remove target vanished; aggregates out of sync");
    };
    if offset < n.left_len {
        let (fixup, removed) = rem(&n.left, offset);
        let out = match fixup {
            Fixup::Balanced(new_left) => {
                Fixup::Balanced(Some(node(n.color, new_left, n.piece, n.right.clone())))
            }
            Fixup::DoubleBlack(new_left) => fix_left(n.color, new_left, n.piece, &n.right),
        };
        (out, removed)
    } else if offset >= n.left_len + n.piece.length {
        let rel = offset - n.left_len - n.piece.length;
        let (fixup, removed) = rem(&n.right, rel);
        let out = match fixup {
            Fixup::Balanced(new_right) => {
                Fixup::Balanced(Some(node(n.color, n.left.clone(), n.piece, new_right)))
            }
            Fixup::DoubleBlack(new_right) => fix_right(n.color, &n.left, n.piece, new_right),
        };
        (out, removed)
    } else {
        debug_assert_eq!(offset, n.left_len, "remove offset must be a piece start");
        let removed = n.piece;
        let out = match (&n.left, &n.right) {
            (None, None) => {
                if n.color == Color::Red {
                    Fixup::Balanced(None)
                } else {
                    Fixup::DoubleBlack(None)
                }
            }
            // A black node with a single child: the child is a red leaf,
            // repainting it black restores the black height.
            (Some(l), None) => Fixup::Balanced(Some(paint(l, Color::Black))),
            (None, Some(r)) => Fixup::Balanced(Some(paint(r, Color::Black))),
            (Some(_), Some(r)) => {
                // Two children: pull the in-order successor's piece up and
                // delete it from the right subtree.
                let (fixup, successor) = rem_min(r);
                match fixup {
                    Fixup::Balanced(new_right) => {
                        Fixup::Balanced(Some(node(n.color, n.left.clone(), successor, new_right)))
                    }
                    Fixup::DoubleBlack(new_right) => {
                        fix_right(n.color, &n.left, successor, new_right)
                    }
                }
            }
        };
        (out, removed)
    }
}

/// Delete the leftmost piece of a subtree, returning it for reuse as a
/// successor replacement.
fn rem_min(n: &Arc<Node>) -> (Fixup, Piece) {
    match &n.left {
        None => {
            let removed = n.piece;
            let out = match &n.right {
                None => {
                    if n.color == Color::Red {
                        Fixup::Balanced(None)
                    } else {
                        Fixup::DoubleBlack(None)
                    }
                }
                Some(r) => Fixup::Balanced(Some(paint(r, Color::Black))),
            };
            (out, removed)
        }
        Some(l) => {
            let (fixup, removed) = rem_min(l);
            let out = match fixup {
                Fixup::Balanced(new_left) => {
                    Fixup::Balanced(Some(node(n.color, new_left, n.piece, n.right.clone())))
                }
                Fixup::DoubleBlack(new_left) => fix_left(n.color, new_left, n.piece, &n.right),
            };
            (out, removed)
        }
    }
}

/// Resolve a double-black deficit in the left subtree of a node being
/// rebuilt as `(color, left, piece, sibling)`. The sibling cannot be empty:
/// the deficient side still has one fewer black node than it.
fn fix_left(color: Color, left: Link, piece: Piece, sibling: &Link) -> Fixup {
    let Some(s) = sibling else {
        unreachable!("deficit side cannot have an empty sibling");
    };
    if s.color == Color::Black {
        if is_red(&s.right) {
            // Sibling's far child is red: one rotation restores the height.
            let sr = s.right.as_ref().expect("checked red");
            return Fixup::Balanced(Some(node(
                color,
                Some(node(Color::Black, left, piece, s.left.clone())),
                s.piece,
                Some(paint(sr, Color::Black)),
            )));
        }
        if is_red(&s.left) {
            // Sibling's near child is red: double rotation.
            let sl = s.left.as_ref().expect("checked red");
            return Fixup::Balanced(Some(node(
                color,
                Some(node(Color::Black, left, piece, sl.left.clone())),
                sl.piece,
                Some(node(Color::Black, sl.right.clone(), s.piece, s.right.clone())),
            )));
        }
        // Sibling all-black: recolor it red. A red parent absorbs the
        // deficit by turning black; a black parent passes it up.
        let rebuilt = node(Color::Black, left, piece, Some(paint(s, Color::Red)));
        if color == Color::Red {
            Fixup::Balanced(Some(rebuilt))
        } else {
            Fixup::DoubleBlack(Some(rebuilt))
        }
    } else {
        // Red sibling: rotate it above, then the deficit faces a black
        // sibling under a red parent and resolves in one more step.
        debug_assert_eq!(color, Color::Black);
        let inner = fix_left(Color::Red, left, piece, &s.left);
        let new_left = match inner {
            Fixup::Balanced(link) => link,
            Fixup::DoubleBlack(_) => unreachable!("deficit under a red parent always resolves"),
        };
        Fixup::Balanced(Some(node(Color::Black, new_left, s.piece, s.right.clone())))
    }
}

/// Mirror of [`fix_left`] for a deficit in the right subtree.
fn fix_right(color: Color, sibling: &Link, piece: Piece, right: Link) -> Fixup {
    let Some(s) = sibling else {
        unreachable!("deficit side cannot have an empty sibling");
    };
    if s.color == Color::Black {
        if is_red(&s.left) {
            let sl = s.left.as_ref().expect("checked red");
            return Fixup::Balanced(Some(node(
                color,
                Some(paint(sl, Color::Black)),
                s.piece,
                Some(node(Color::Black, s.right.clone(), piece, right)),
            )));
        }
        if is_red(&s.right) {
            let sr = s.right.as_ref().expect("checked red");
            return Fixup::Balanced(Some(node(
                color,
                Some(node(Color::Black, s.left.clone(), s.piece, sr.left.clone())),
                sr.piece,
                Some(node(Color::Black, sr.right.clone(), piece, right)),
            )));
        }
        let rebuilt = node(Color::Black, Some(paint(s, Color::Red)), piece, right);
        if color == Color::Red {
            Fixup::Balanced(Some(rebuilt))
        } else {
            Fixup::DoubleBlack(Some(rebuilt))
        }
    } else {
        debug_assert_eq!(color, Color::Black);
        let inner = fix_right(Color::Red, &s.right, piece, right);
        let new_right = match inner {
            Fixup::Balanced(link) => link,
            Fixup::DoubleBlack(_) => unreachable!("deficit under a red parent always resolves"),
        };
        Fixup::Balanced(Some(node(Color::Black, s.left.clone(), s.piece, new_right)))
    }
}

/// Returns `(black_height, subtree_bytes, subtree_line_feeds)`.
fn check_node(link: &Link, store: &BufferStore) -> Result<(usize, usize, usize)> {
    let Some(n) = link else {
        return Ok((0, 0, 0));
    };
    if n.color == Color::Red {
        ensure!(
            !is_red(&n.left) && !is_red(&n.right),
            "red node has a red child"
        );
    }
    let (left_bh, left_len, left_lf) = check_node(&n.left, store)?;
    let (right_bh, right_len, right_lf) = check_node(&n.right, store)?;
    ensure!(
        left_bh == right_bh,
        "black height mismatch: left {} right {}",
        left_bh,
        right_bh
    );
    ensure!(
        n.left_len == left_len,
        "left_len cache {} != recomputed {}",
        n.left_len,
        left_len
    );
    ensure!(
        n.left_lf == left_lf,
        "left_lf cache {} != recomputed {}",
        n.left_lf,
        left_lf
    );
    ensure!(n.piece.length > 0, "zero-length piece stored in tree");
    let recomputed = Piece::new(store, n.piece.buffer, n.piece.start, n.piece.end);
    ensure!(
        recomputed == n.piece,
        "piece metadata out of sync with backing buffer"
    );
    let bh = if n.color == Color::Black {
        left_bh + 1
    } else {
        left_bh
    };
    Ok((
        bh,
        left_len + n.piece.length + right_len,
        left_lf + n.piece.newline_count + right_lf,
    ))
}
