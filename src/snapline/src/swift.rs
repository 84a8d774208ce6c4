//! Support for test sources written in a Swift-style syntax: labeled call
//! arguments, trailing closures, and pound-delimited raw string literals.

pub(crate) mod locator;
pub(crate) mod reader;
pub(crate) mod rewriter;
pub(crate) mod writer;

use std::path::Path;

use crate::swift::reader::Call;
use crate::text::LineIndex;
use crate::Token;

/// A parsed version of a test source file.
///
/// Holds the original text, the spanned token stream, every recognized call
/// expression, and a line index for position lookups. A `SourceFile` is
/// immutable once built; the rewriter produces fresh text instead of mutating
/// the parse.
#[derive(Debug)]
pub struct SourceFile {
    pub(crate) source: String,
    pub(crate) tokens: Vec<Token>,
    pub(crate) calls: Vec<Call>,
    pub(crate) lines: LineIndex,
}

impl SourceFile {
    /// Parse a source text.
    pub fn from_string(source: String) -> Self {
        let tokens = reader::tokenize(&source);
        let calls = reader::calls(&source, &tokens);
        let lines = LineIndex::new(&source);
        Self {
            source,
            tokens,
            calls,
            lines,
        }
    }

    /// Read and parse the file at `path`.
    pub fn from_path<P>(path: P) -> std::io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let source = reader::read_to_string(path.as_ref())?;
        Ok(Self::from_string(source))
    }

    /// The original source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Reassemble the source from the token stream and the trivia between
    /// tokens. The result is byte-identical to the input; round-trip tests
    /// use this to check that token spans tile the file.
    pub fn write_to_string(&self) -> String {
        let mut out = String::with_capacity(self.source.len());
        let mut last = 0;
        for (_, range) in &self.tokens {
            out.push_str(&self.source[last..range.start]);
            out.push_str(&self.source[range.clone()]);
            last = range.end;
        }
        out.push_str(&self.source[last..]);
        out
    }
}
