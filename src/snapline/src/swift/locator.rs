//! Read-only call-site location for failure diagnostics.
//!
//! Given the recorded end position of a called expression, reports the line
//! of the closure slot a snapshot edit would touch, so failure markers point
//! at the snapshot text instead of the assertion itself.

use crate::swift::SourceFile;
use crate::text::Pos;

/// The start line of the closure slot addressed by `descriptor_offset` at the
/// call whose callee ends at (`line`, `column`), or `None` when no call
/// matches or the slot is not occupied yet.
///
/// Slots are resolved through [`Call::centered_offset`], the same resolution
/// the rewriter uses, so the reported line is the line a rewrite would touch.
///
/// [`Call::centered_offset`]: crate::swift::reader::Call::centered_offset
pub(crate) fn closure_line(
    file: &SourceFile,
    line: usize,
    column: usize,
    descriptor_offset: usize,
) -> Option<usize> {
    let target = Pos::new(line, column);
    let call = file
        .calls
        .iter()
        .find(|call| file.lines.pos(call.key) == target)?;

    let centered = call.centered_offset(descriptor_offset);
    let occupant = if centered < 0 {
        let index = (call.args.len() as isize + centered) as usize;
        call.args.get(index).map(|arg| arg.expr.start)
    } else if centered == 0 {
        call.trailing.as_ref().map(|trailing| trailing.start)
    } else {
        call.additional
            .get((centered - 1) as usize)
            .map(|labeled| labeled.closure.start)
    };

    occupant.map(|offset| file.lines.pos(offset).line)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::swift::SourceFile;

    const SOURCE: &str = indoc! {r#"
        func testTranscript() {
            assertInlineSnapshot(of: request, as: .raw) {
                """
                GET /
                """
            } matches: {
                """
                ok
                """
            }
        }
    "#};

    fn key(source: &str, callee: &str) -> (usize, usize) {
        let start = source.find(callee).expect("callee") + callee.len();
        let offset = source[start..].find(['(', '{']).expect("call") + start;
        let pos = crate::text::LineIndex::new(source).pos(offset);
        (pos.line, pos.column)
    }

    #[test]
    fn reports_the_trailing_closure_line() {
        let file = SourceFile::from_string(SOURCE.to_string());
        let (line, column) = key(SOURCE, "assertInlineSnapshot");

        assert_eq!(closure_line(&file, line, column, 0), Some(2));
        assert_eq!(closure_line(&file, line, column, 1), Some(6));
    }

    #[test]
    fn reports_absence() {
        let file = SourceFile::from_string(SOURCE.to_string());
        let (line, column) = key(SOURCE, "assertInlineSnapshot");

        // No third closure slot is occupied.
        assert_eq!(closure_line(&file, line, column, 2), None);
        // No call ends at an arbitrary position.
        assert_eq!(closure_line(&file, 1, 1, 0), None);
    }

    #[test]
    fn reports_a_parenthesized_closure_argument() {
        let source = indoc! {r#"
            func testFold() {
                transform(of: value,
                    { $0 })
            }
        "#};
        let file = SourceFile::from_string(source.to_string());
        let (line, column) = key(source, "transform");

        assert_eq!(closure_line(&file, line, column, 0), Some(3));
    }

    #[test]
    fn missing_trailing_closure_is_absent() {
        let source = "assert(of: value)";
        let file = SourceFile::from_string(source.to_string());
        let (line, column) = key(source, "assert");

        assert_eq!(closure_line(&file, line, column, 0), None);
    }
}
