//! Text-level helpers shared by the reader, the locator, and the rewriter.

use std::fmt::Display;

/// Prefix every non-empty line of `payload` with `prefix`.
///
/// Empty lines stay empty, so synthesized snapshot bodies never carry
/// trailing whitespace.
pub(crate) fn indent(payload: &str, prefix: &str) -> String {
    let mut out = String::with_capacity(payload.len() + prefix.len() * 4);
    for (i, line) in payload.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if !line.is_empty() {
            out.push_str(prefix);
            out.push_str(line);
        }
    }
    out
}

/// The smallest number of `#` marks that makes `payload` safe to embed in a
/// raw string literal.
///
/// Starts at 1 when the payload contains a backslash (a raw delimiter also
/// disables escape processing), then scans every quote run followed by `#`
/// marks and keeps the largest count that could collide with a closing
/// delimiter. For multi-line literals the quote is `"""` and the first two
/// quote characters are discounted, since only the final `"` of a closing
/// delimiter abuts the `#` run.
pub(crate) fn pound_count(payload: &str, multiline: bool) -> usize {
    let (quote, discount) = if multiline { ("\"\"\"", 2) } else { ("\"", 0) };
    let mut count = usize::from(payload.contains('\\'));
    let mut rest = payload;
    while let Some(found) = rest.find(quote) {
        let after = &rest[found + quote.len()..];
        let run = after.len() - after.trim_start_matches('#').len();
        count = count.max(quote.len() + run - discount);
        rest = &after[run..];
    }
    count
}

/// The file's prevailing one-level indentation: the leading whitespace of the
/// first indented, non-blank line. Four spaces when nothing in the file is
/// indented.
pub(crate) fn detect_indent(source: &str) -> &str {
    for line in source.lines() {
        let rest = line.trim_start_matches([' ', '\t']);
        if rest.is_empty() {
            continue;
        }
        if rest.len() < line.len() {
            return &line[..line.len() - rest.len()];
        }
    }
    "    "
}

/// The leading whitespace of a single line.
pub(crate) fn leading_whitespace(line: &str) -> &str {
    let rest = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - rest.len()]
}

/// A 1-based (line, column) position. Columns count UTF-8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Pos {
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub(crate) fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self { line, column } = self;
        write!(f, "line {line}, column {column}")
    }
}

/// Maps byte offsets to [`Pos`] values for one source text.
#[derive(Debug)]
pub(crate) struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub(crate) fn new(source: &str) -> Self {
        let mut starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        Self { starts }
    }

    pub(crate) fn pos(&self, offset: usize) -> Pos {
        let line = self.starts.partition_point(|&start| start <= offset);
        Pos::new(line, offset - self.starts[line - 1] + 1)
    }

    /// The byte offset where the 1-based `line` starts.
    pub(crate) fn line_start(&self, line: usize) -> Option<usize> {
        self.starts.get(line - 1).copied()
    }

    /// The text of the 1-based `line`, without its terminator.
    pub(crate) fn line_text<'a>(&self, source: &'a str, line: usize) -> Option<&'a str> {
        let start = self.line_start(line)?;
        let end = self.starts.get(line).map_or(source.len(), |next| next - 1);
        source.get(start..end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indent_skips_empty_lines() {
        assert_eq!(indent("a\n\nb", "  "), "  a\n\n  b");
        assert_eq!(indent("", "  "), "");
        assert_eq!(indent("a\n", "...."), "....a\n");
    }

    #[test]
    fn pound_count_table() {
        struct TestCase {
            payload: &'static str,
            multiline: bool,
            exp: usize,
        }
        let test_cases = [
            TestCase {
                payload: "plain text",
                multiline: true,
                exp: 0,
            },
            TestCase {
                payload: "back\\slash",
                multiline: true,
                exp: 1,
            },
            TestCase {
                payload: "quote \" inside",
                multiline: true,
                exp: 0,
            },
            TestCase {
                payload: "triple \"\"\" inside",
                multiline: true,
                exp: 1,
            },
            TestCase {
                payload: "closing \"\"\"## inside",
                multiline: true,
                exp: 3,
            },
            TestCase {
                payload: "\"\"\"\n\\foo\n\"\"\"",
                multiline: true,
                exp: 1,
            },
            TestCase {
                payload: "six \"\"\"\"\"\" quotes",
                multiline: true,
                exp: 1,
            },
            TestCase {
                payload: "single \" quote",
                multiline: false,
                exp: 1,
            },
            TestCase {
                payload: "single \"# quote",
                multiline: false,
                exp: 2,
            },
        ];

        for TestCase {
            payload,
            multiline,
            exp,
        } in test_cases
        {
            assert_eq!(pound_count(payload, multiline), exp, "payload {payload:?}");
        }
    }

    #[test]
    fn pound_count_round_trips() {
        // Re-parse the synthesized multi-line literal and check that it
        // yields the payload unchanged (no premature close).
        let payloads = [
            "hi",
            "triple \"\"\" inside",
            "\"\"\"\n\\foo\n\"\"\"",
            "tail quotes \"\"\"##",
        ];
        for payload in payloads {
            let pounds = "#".repeat(pound_count(payload, true));
            let literal = format!("{pounds}\"\"\"\n{payload}\n\"\"\"{pounds}");

            // The first closing delimiter after the opening quote must be the
            // final one, otherwise the literal closes early.
            let closing = format!("\"\"\"{pounds}");
            let open_end = pounds.len() + 4; // pounds, quotes, newline
            let scan = &literal[open_end..];
            assert_eq!(
                scan.find(&closing),
                Some(scan.len() - closing.len()),
                "payload {payload:?} closes early"
            );
            assert_eq!(&scan[..scan.len() - closing.len() - 1], payload);
        }
    }

    #[test]
    fn detect_indent_first_indented_line() {
        assert_eq!(detect_indent("a\n  b\n      c\n"), "  ");
        assert_eq!(detect_indent("a\n\tb\n"), "\t");
        assert_eq!(detect_indent("a\nb\n"), "    ");
        assert_eq!(detect_indent("a\n   \n  b\n"), "  ");
        assert_eq!(detect_indent(""), "    ");
    }

    #[test]
    fn leading_whitespace_prefix() {
        assert_eq!(leading_whitespace("    foo"), "    ");
        assert_eq!(leading_whitespace("\t\tfoo"), "\t\t");
        assert_eq!(leading_whitespace("foo"), "");
    }

    #[test]
    fn line_index_positions() {
        let source = "ab\ncd\n\nef";
        let lines = LineIndex::new(source);

        assert_eq!(lines.pos(0), Pos::new(1, 1));
        assert_eq!(lines.pos(1), Pos::new(1, 2));
        assert_eq!(lines.pos(3), Pos::new(2, 1));
        assert_eq!(lines.pos(6), Pos::new(3, 1));
        assert_eq!(lines.pos(7), Pos::new(4, 1));

        assert_eq!(lines.line_text(source, 1), Some("ab"));
        assert_eq!(lines.line_text(source, 3), Some(""));
        assert_eq!(lines.line_text(source, 4), Some("ef"));
        assert_eq!(lines.line_text(source, 5), None);
    }
}
