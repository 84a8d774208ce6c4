//! Utilities for reading [`SourceFile`](super::SourceFile) documents.
//!
//! The reader tokenizes a test source into spanned tokens and extracts every
//! function-call expression along with its argument list and trailing
//! closures. Everything between token spans is trivia and is reproduced
//! verbatim on output, so the reader only needs enough syntax to recognize
//! call shapes: string literals (including pound-delimited raw and multi-line
//! forms), comments, identifiers, and brackets.

use std::fs::OpenOptions;
use std::io::Read;
use std::ops::Range;
use std::path::Path;

use fs2::FileExt;

use crate::{kind, span, Token};

/// Read file contents into a String using a shared lock.
pub(crate) fn read_to_string(path: &Path) -> std::io::Result<String> {
    let mut file_buff = String::new();

    let mut file = OpenOptions::new().read(true).open(path)?;
    file.lock_shared()?;
    file.read_to_string(&mut file_buff)?;

    Ok(file_buff)
}

// Token kinds
// ===========

/// The kind of a lexical token.
///
/// Keywords are not distinguished from identifiers; the call scanner checks
/// the token text where it matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tok {
    Ident,
    Number,
    /// Any string literal, including raw and multi-line forms.
    Str,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Dot,
    /// Any other punctuation, one byte at a time.
    Op,
}

// Lexer
// =====

/// A byte-cursor lexer over one source text.
///
/// The lexer never fails: unterminated strings and comments end at the next
/// hard boundary (newline or end of input) and scanning continues. All stop
/// positions fall on ASCII bytes, so token spans always lie on character
/// boundaries.
struct Lexer<'src> {
    source: &'src str,
    pos: usize,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src str) -> Self {
        Self { source, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.source.as_bytes().get(self.pos + n).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    /// Whether the input at the cursor starts with `pat`. Byte-based, so it
    /// is safe to call while the cursor is inside a multi-byte character.
    fn starts_with(&self, pat: &str) -> bool {
        self.source.as_bytes()[self.pos..].starts_with(pat.as_bytes())
    }

    fn eat(&mut self, pat: &str) -> bool {
        if self.starts_with(pat) {
            self.pos += pat.len();
            true
        } else {
            false
        }
    }

    fn advance_while(&mut self, predicate: impl Fn(u8) -> bool) {
        while self.peek().is_some_and(&predicate) {
            self.bump();
        }
    }

    /// Length of the `#` run at the cursor.
    fn pound_run(&self) -> usize {
        let bytes = &self.source.as_bytes()[self.pos..];
        bytes.iter().take_while(|&&b| b == b'#').count()
    }

    /// Skips whitespace and comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.advance_while(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'));
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    self.advance_while(|b| b != b'\n');
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.skip_block_comment();
                }
                _ => break,
            }
        }
    }

    /// Skips a block comment. Block comments nest.
    fn skip_block_comment(&mut self) {
        self.pos += 2;
        let mut depth = 1usize;
        while depth > 0 && self.pos < self.source.len() {
            if self.eat("/*") {
                depth += 1;
            } else if self.eat("*/") {
                depth -= 1;
            } else {
                self.bump();
            }
        }
    }

    /// Lexes a string literal body. The cursor sits on the opening quote;
    /// `pounds` is the length of the raw delimiter already consumed.
    fn lex_string(&mut self, pounds: usize) {
        let multiline = self.starts_with("\"\"\"");
        self.pos += if multiline { 3 } else { 1 };

        let marks = "#".repeat(pounds);
        let closing = if multiline {
            format!("\"\"\"{marks}")
        } else {
            format!("\"{marks}")
        };
        let escape = format!("\\{marks}");

        loop {
            if self.pos >= self.source.len() {
                return; // Unterminated - recover gracefully
            }
            if !multiline && self.peek() == Some(b'\n') {
                return; // Unterminated - recover gracefully
            }
            if self.eat(&closing) {
                return;
            }
            if self.eat(&escape) {
                if self.peek() == Some(b'(') {
                    self.bump();
                    self.skip_interpolation();
                } else if self.peek().is_some() {
                    self.bump();
                }
            } else {
                self.bump();
            }
        }
    }

    /// Skips a `\(...)` interpolation segment, re-entering the string lexer
    /// for nested literals so their brackets stay invisible.
    fn skip_interpolation(&mut self) {
        let mut depth = 1usize;
        while depth > 0 {
            match self.peek() {
                None => return,
                Some(b'(') => {
                    self.bump();
                    depth += 1;
                }
                Some(b')') => {
                    self.bump();
                    depth -= 1;
                }
                Some(b'"') => self.lex_string(0),
                Some(b'#') => {
                    let run = self.pound_run();
                    if self.peek_at(run) == Some(b'"') {
                        self.pos += run;
                        self.lex_string(run);
                    } else {
                        self.bump();
                    }
                }
                Some(_) => self.bump(),
            }
        }
    }

    fn tokens(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let start = self.pos;
            let Some(b) = self.peek() else { break };
            let tok = match b {
                b'(' => {
                    self.bump();
                    Tok::LParen
                }
                b')' => {
                    self.bump();
                    Tok::RParen
                }
                b'{' => {
                    self.bump();
                    Tok::LBrace
                }
                b'}' => {
                    self.bump();
                    Tok::RBrace
                }
                b'[' => {
                    self.bump();
                    Tok::LBracket
                }
                b']' => {
                    self.bump();
                    Tok::RBracket
                }
                b',' => {
                    self.bump();
                    Tok::Comma
                }
                b':' => {
                    self.bump();
                    Tok::Colon
                }
                b'.' => {
                    self.bump();
                    Tok::Dot
                }
                b'"' => {
                    self.lex_string(0);
                    Tok::Str
                }
                b'#' => {
                    let run = self.pound_run();
                    if self.peek_at(run) == Some(b'"') {
                        self.pos += run;
                        self.lex_string(run);
                        Tok::Str
                    } else {
                        self.bump();
                        Tok::Op
                    }
                }
                b if is_ident_start(b) => {
                    self.advance_while(is_ident_continue);
                    Tok::Ident
                }
                b if b.is_ascii_digit() => {
                    self.advance_while(|b| b.is_ascii_alphanumeric() || b == b'_');
                    Tok::Number
                }
                _ => {
                    self.bump();
                    Tok::Op
                }
            };
            tokens.push((tok, start..self.pos));
        }
        tokens
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// Tokenize a source text.
pub(crate) fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).tokens()
}

// Call extraction
// ===============

/// One positional argument inside a call's parentheses.
#[derive(Debug)]
pub(crate) struct Argument {
    /// Span of the argument label, when present.
    pub label: Option<Range<usize>>,
    /// Span of the argument expression, trivia excluded.
    pub expr: Range<usize>,
    /// Whether the expression is exactly one closure literal.
    pub is_closure: bool,
}

/// A labeled additional trailing closure (`label: { ... }`).
#[derive(Debug)]
pub(crate) struct LabeledClosure {
    pub label: Range<usize>,
    pub closure: Range<usize>,
}

/// A function-call expression recognized in the token stream.
#[derive(Debug)]
pub(crate) struct Call {
    /// Span of the called expression (the trailing identifier chain).
    pub callee: Range<usize>,
    /// Byte offset of the called expression's end, trailing trivia included:
    /// the start of the `(` (or of the closure for parenless calls). This is
    /// the offset assertion locations are keyed by.
    pub key: usize,
    /// Byte offset just past the `)`, when the call has parentheses.
    pub rparen_end: Option<usize>,
    pub args: Vec<Argument>,
    /// Span of the unlabeled trailing closure.
    pub trailing: Option<Range<usize>>,
    pub additional: Vec<LabeledClosure>,
}

impl Call {
    /// Index of the first argument of the maximal all-closure suffix of the
    /// parenthesized argument list; the argument count when no such suffix
    /// exists.
    pub(crate) fn first_trailing_closure_offset(&self) -> usize {
        let mut first = self.args.len();
        while first > 0 && self.args[first - 1].is_closure {
            first -= 1;
        }
        first
    }

    /// The descriptor's target slot, centered on the argument count: negative
    /// values address parenthesized arguments, zero the unlabeled trailing
    /// closure, positive values the labeled additional closures.
    ///
    /// Both the locator and the rewriter resolve slots through this method,
    /// so the line a failure points at is always the line the rewriter would
    /// touch.
    pub(crate) fn centered_offset(&self, descriptor_offset: usize) -> isize {
        let absolute = self.first_trailing_closure_offset() + descriptor_offset;
        absolute as isize - self.args.len() as isize
    }
}

/// Extract every call expression from a token stream, in source order.
pub(crate) fn calls(source: &str, tokens: &[Token]) -> Vec<Call> {
    let pairs = match_brackets(tokens);
    let mut calls = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        if kind(token) != Tok::Ident {
            continue;
        }
        let Some(next) = tokens.get(i + 1) else {
            continue;
        };
        if !matches!(kind(next), Tok::LParen | Tok::LBrace) {
            continue;
        }

        // Absorb an `a.b.c` chain ending at `i`; intermediate segments are
        // followed by `.` and never start a call themselves.
        let mut first = i;
        while first >= 2
            && kind(&tokens[first - 1]) == Tok::Dot
            && kind(&tokens[first - 2]) == Tok::Ident
        {
            first -= 2;
        }

        // `func name(...)` is a declaration, not a call.
        if first > 0 {
            let prev = &tokens[first - 1];
            if kind(prev) == Tok::Ident && &source[span(prev).clone()] == "func" {
                continue;
            }
        }

        if let Some(call) = parse_call(tokens, &pairs, first, i) {
            calls.push(call);
        }
    }

    calls
}

/// Parse the argument list and trailing closures of the call whose callee
/// chain spans token indices `first..=last`.
fn parse_call(
    tokens: &[Token],
    pairs: &[Option<usize>],
    first: usize,
    last: usize,
) -> Option<Call> {
    let mut cursor = last + 1;
    let key = span(&tokens[cursor]).start;

    let mut args = Vec::new();
    let mut rparen_end = None;

    if kind(&tokens[cursor]) == Tok::LParen {
        let close = pairs[cursor]?;

        // Split the argument list at top-level commas.
        let mut depth = 0usize;
        let mut item = cursor + 1;
        for j in cursor + 1..close {
            match kind(&tokens[j]) {
                Tok::LParen | Tok::LBrace | Tok::LBracket => depth += 1,
                Tok::RParen | Tok::RBrace | Tok::RBracket => depth = depth.saturating_sub(1),
                Tok::Comma if depth == 0 => {
                    push_argument(tokens, pairs, item..j, &mut args);
                    item = j + 1;
                }
                _ => {}
            }
        }
        push_argument(tokens, pairs, item..close, &mut args);

        rparen_end = Some(span(&tokens[close]).end);
        cursor = close + 1;
    }

    let mut trailing = None;
    let mut additional = Vec::new();

    if cursor < tokens.len() && kind(&tokens[cursor]) == Tok::LBrace {
        let close = pairs[cursor]?;
        trailing = Some(span(&tokens[cursor]).start..span(&tokens[close]).end);
        cursor = close + 1;

        while cursor + 2 < tokens.len()
            && kind(&tokens[cursor]) == Tok::Ident
            && kind(&tokens[cursor + 1]) == Tok::Colon
            && kind(&tokens[cursor + 2]) == Tok::LBrace
        {
            let Some(end) = pairs[cursor + 2] else { break };
            additional.push(LabeledClosure {
                label: span(&tokens[cursor]).clone(),
                closure: span(&tokens[cursor + 2]).start..span(&tokens[end]).end,
            });
            cursor = end + 1;
        }
    }

    Some(Call {
        callee: span(&tokens[first]).start..span(&tokens[last]).end,
        key,
        rparen_end,
        args,
        trailing,
        additional,
    })
}

fn push_argument(
    tokens: &[Token],
    pairs: &[Option<usize>],
    range: Range<usize>,
    args: &mut Vec<Argument>,
) {
    if range.is_empty() {
        return;
    }

    let (label, expr_first) = if range.len() >= 3
        && kind(&tokens[range.start]) == Tok::Ident
        && kind(&tokens[range.start + 1]) == Tok::Colon
    {
        (Some(span(&tokens[range.start]).clone()), range.start + 2)
    } else {
        (None, range.start)
    };

    let expr_last = range.end - 1;
    let is_closure = kind(&tokens[expr_first]) == Tok::LBrace && pairs[expr_first] == Some(expr_last);

    args.push(Argument {
        label,
        expr: span(&tokens[expr_first]).start..span(&tokens[expr_last]).end,
        is_closure,
    });
}

/// Pair up brackets by index. Mismatched closers are left unpaired so a
/// damaged file degrades to fewer recognized calls instead of a failure.
fn match_brackets(tokens: &[Token]) -> Vec<Option<usize>> {
    let mut pairs = vec![None; tokens.len()];
    let mut stack: Vec<(Tok, usize)> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        match kind(token) {
            Tok::LParen | Tok::LBrace | Tok::LBracket => stack.push((kind(token), i)),
            Tok::RParen | Tok::RBrace | Tok::RBracket => {
                let open = match kind(token) {
                    Tok::RParen => Tok::LParen,
                    Tok::RBrace => Tok::LBrace,
                    _ => Tok::LBracket,
                };
                if stack.last().is_some_and(|&(k, _)| k == open) {
                    let (_, j) = stack.pop().unwrap_or((open, i));
                    pairs[j] = Some(i);
                    pairs[i] = Some(j);
                }
            }
            _ => {}
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::swift::SourceFile;
    use crate::text::Pos;

    #[test]
    fn call_with_trailing_and_additional_closures() {
        let source = indoc! {r#"
            assertInlineSnapshot(of: request, as: .raw) {
                """
                GET /
                """
            } matches: {
                """
                ok
                """
            }
        "#};
        let file = SourceFile::from_string(source.to_string());

        assert_eq!(file.calls.len(), 1);
        let call = &file.calls[0];
        assert_eq!(&file.source[call.callee.clone()], "assertInlineSnapshot");
        assert_eq!(file.lines.pos(call.key), Pos::new(1, 21));
        assert_eq!(call.args.len(), 2);
        assert!(call.args.iter().all(|arg| !arg.is_closure));
        assert!(call.trailing.is_some());
        assert_eq!(call.additional.len(), 1);
        assert_eq!(
            &file.source[call.additional[0].label.clone()],
            "matches"
        );
    }

    #[test]
    fn closure_suffix_offset() {
        let source = "fold(base, { $0 }, { $1 })";
        let file = SourceFile::from_string(source.to_string());

        let call = &file.calls[0];
        assert_eq!(call.args.len(), 3);
        assert!(!call.args[0].is_closure);
        assert!(call.args[1].is_closure);
        assert!(call.args[2].is_closure);
        assert_eq!(call.first_trailing_closure_offset(), 1);
        assert_eq!(call.centered_offset(0), -2);
        assert_eq!(call.centered_offset(2), 0);
    }

    #[test]
    fn function_declarations_are_not_calls() {
        let source = "func test() { assert(of: value) }";
        let file = SourceFile::from_string(source.to_string());

        assert_eq!(file.calls.len(), 1);
        let call = &file.calls[0];
        assert_eq!(&file.source[call.callee.clone()], "assert");
        assert_eq!(call.args.len(), 1);
        assert_eq!(
            call.args[0].label.clone().map(|l| &file.source[l]),
            Some("of")
        );
        assert!(call.trailing.is_none());
    }

    #[test]
    fn member_chain_callee() {
        let source = "Snapshots.assertInline(of: value)";
        let file = SourceFile::from_string(source.to_string());

        let call = &file.calls[0];
        assert_eq!(&file.source[call.callee.clone()], "Snapshots.assertInline");
        assert_eq!(file.lines.pos(call.key), Pos::new(1, 23));
    }

    #[test]
    fn parenless_call_has_only_a_trailing_closure() {
        let source = "withSnapshot { record() }";
        let file = SourceFile::from_string(source.to_string());

        let call = &file.calls[0];
        assert_eq!(&file.source[call.callee.clone()], "withSnapshot");
        assert_eq!(file.lines.pos(call.key), Pos::new(1, 14));
        assert!(call.args.is_empty());
        assert!(call.rparen_end.is_none());
        assert!(call.trailing.is_some());
        // The nested `record()` is extracted as its own call.
        assert_eq!(file.calls.len(), 2);
    }

    #[test]
    fn braces_inside_strings_are_opaque() {
        let source = r##"assert(of: "{ \" }", raw: #"quote " here"#)"##;
        let file = SourceFile::from_string(source.to_string());

        let call = &file.calls[0];
        assert_eq!(call.args.len(), 2);
        assert!(call.args.iter().all(|arg| !arg.is_closure));
        assert!(call.trailing.is_none());
    }

    #[test]
    fn interpolation_keeps_brackets_balanced() {
        let source = r#"log("value: \(compute(1, { $0 }))") { done() }"#;
        let file = SourceFile::from_string(source.to_string());

        let call = &file.calls[0];
        assert_eq!(&file.source[call.callee.clone()], "log");
        assert_eq!(call.args.len(), 1);
        assert!(call.trailing.is_some());
    }

    #[test]
    fn multiline_strings_swallow_delimiters() {
        let source = indoc! {r#"
            check(value) {
                """
                inner "quotes" and { braces } and ) parens
                """
            }
        "#};
        let file = SourceFile::from_string(source.to_string());

        let call = &file.calls[0];
        assert!(call.trailing.is_some());
        assert_eq!(call.additional.len(), 0);
    }

    #[test]
    fn unbalanced_input_degrades_gracefully() {
        let source = "assert(of: value";
        let file = SourceFile::from_string(source.to_string());
        assert!(file.calls.is_empty());
    }
}
