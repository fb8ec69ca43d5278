// Property-based tests using proptest.
//
// Random sequences of edits are applied both to a PieceTreeBuffer and to a
// plain Vec<u8> reference model; after every operation the buffer must
// agree with the model on content, size, and line structure, and the
// tree's structural invariants must hold.

use piece_tree::PieceTreeBuffer;
use proptest::prelude::*;

/// Low-level buffer edit operations. Offsets address the document through
/// a 0..=255 percentage so operations stay valid as the document changes
/// size under them.
#[derive(Debug, Clone)]
enum BufferOp {
    /// Insert text at a proportional offset.
    Insert { offset_percent: u8, content: String },
    /// Delete bytes at a proportional offset.
    Delete { offset_percent: u8, len: usize },
    /// Insert addressed by (line, column), both proportional.
    InsertAt {
        line_percent: u8,
        column: usize,
        content: String,
    },
    /// Delete addressed by (line, column).
    DeleteAt {
        line_percent: u8,
        column: usize,
        len: usize,
    },
}

fn resolve_percent(total: usize, percent: u8) -> usize {
    if total == 0 {
        0
    } else {
        total * percent as usize / 255
    }
}

impl BufferOp {
    fn apply(&self, buffer: &mut PieceTreeBuffer, shadow: &mut Vec<u8>) {
        match self {
            Self::Insert {
                offset_percent,
                content,
            } => {
                let offset = resolve_percent(shadow.len(), *offset_percent);
                buffer.insert_at_offset(offset, content);
                shadow.splice(offset..offset, content.bytes());
            }
            Self::Delete { offset_percent, len } => {
                let offset = resolve_percent(shadow.len(), *offset_percent);
                let end = (offset + len).min(shadow.len());
                buffer.remove_at_offset(offset, *len);
                shadow.drain(offset..end);
            }
            Self::InsertAt {
                line_percent,
                column,
                content,
            } => {
                let line_count = shadow.iter().filter(|&&b| b == b'\n').count() + 1;
                let line = resolve_percent(line_count - 1, *line_percent);
                let (start, line_len) = shadow_line(shadow, line);
                let offset = start + (*column).min(line_len);
                buffer.insert(line, *column, content);
                shadow.splice(offset..offset, content.bytes());
            }
            Self::DeleteAt {
                line_percent,
                column,
                len,
            } => {
                let line_count = shadow.iter().filter(|&&b| b == b'\n').count() + 1;
                let line = resolve_percent(line_count - 1, *line_percent);
                let (start, line_len) = shadow_line(shadow, line);
                let offset = start + (*column).min(line_len);
                let end = (offset + len).min(shadow.len());
                buffer.remove(line, *column, *len);
                shadow.drain(offset..end);
            }
        }
    }
}

/// Start offset and content length (excluding the line feed) of a line in
/// the reference model.
fn shadow_line(shadow: &[u8], line: usize) -> (usize, usize) {
    let mut start = 0;
    let mut seen = 0;
    for (i, &b) in shadow.iter().enumerate() {
        if seen == line {
            break;
        }
        if b == b'\n' {
            seen += 1;
            start = i + 1;
        }
    }
    let len = shadow[start..]
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(shadow.len() - start);
    (start, len)
}

fn content_strategy() -> impl Strategy<Value = String> {
    "[a-z \\n]{1,12}"
}

fn buffer_op_strategy() -> impl Strategy<Value = Vec<BufferOp>> {
    prop::collection::vec(
        prop_oneof![
            3 => (any::<u8>(), content_strategy())
                .prop_map(|(offset_percent, content)| BufferOp::Insert { offset_percent, content }),
            2 => (any::<u8>(), 1usize..30)
                .prop_map(|(offset_percent, len)| BufferOp::Delete { offset_percent, len }),
            2 => (any::<u8>(), 0usize..20, content_strategy()).prop_map(
                |(line_percent, column, content)| BufferOp::InsertAt { line_percent, column, content }
            ),
            1 => (any::<u8>(), 0usize..20, 1usize..30).prop_map(
                |(line_percent, column, len)| BufferOp::DeleteAt { line_percent, column, len }
            ),
        ],
        1..60,
    )
}

fn initial_content_strategy() -> impl Strategy<Value = String> {
    "[a-z \\n]{0,200}"
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 150,
        ..ProptestConfig::default()
    })]

    /// The buffer always matches the reference model after any sequence of
    /// edits, and the tree invariants hold after every single operation.
    #[test]
    fn prop_buffer_matches_reference_model(
        initial in initial_content_strategy(),
        ops in buffer_op_strategy(),
    ) {
        let mut buffer = PieceTreeBuffer::from_str(&initial);
        let mut shadow: Vec<u8> = initial.into_bytes();

        for op in &ops {
            op.apply(&mut buffer, &mut shadow);

            prop_assert_eq!(buffer.size(), shadow.len());
            let expected_lines = shadow.iter().filter(|&&b| b == b'\n').count() + 1;
            prop_assert_eq!(buffer.line_count(), expected_lines);
            prop_assert_eq!(buffer.text(), shadow.clone());
            if let Err(e) = buffer.check_invariants() {
                return Err(TestCaseError::fail(format!("invariant violated: {e:#}")));
            }
        }
    }

    /// Line-level queries agree with splitting the reference model on
    /// line feeds.
    #[test]
    fn prop_line_queries_match_model(
        initial in initial_content_strategy(),
        ops in buffer_op_strategy(),
    ) {
        let mut buffer = PieceTreeBuffer::from_str(&initial);
        let mut shadow: Vec<u8> = initial.into_bytes();
        for op in &ops {
            op.apply(&mut buffer, &mut shadow);
        }

        let text = String::from_utf8(shadow).unwrap();
        let lines: Vec<&str> = text.split('\n').collect();
        prop_assert_eq!(buffer.line_count(), lines.len());

        let mut offset = 0;
        for (i, line) in lines.iter().enumerate() {
            prop_assert_eq!(buffer.byte_offset_of_line(i), offset);
            prop_assert_eq!(buffer.get_line_content(i), *line);
            prop_assert_eq!(buffer.line_length(i), line.len());
            offset += line.len() + 1;
        }
    }

    /// set_contents followed by a full traversal reconstructs the input
    /// exactly.
    #[test]
    fn prop_set_contents_round_trip(content in "[a-z\\n]{0,300}") {
        let buffer = PieceTreeBuffer::from_str(&content);
        prop_assert_eq!(buffer.text(), content.as_bytes());
        prop_assert_eq!(
            buffer.line_count(),
            content.bytes().filter(|&b| b == b'\n').count() + 1
        );
    }
}
