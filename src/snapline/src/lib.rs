//! A lightweight engine for inline snapshot testing: assertions whose
//! expected value is embedded in the test source as a trailing closure, and
//! which rewrite the test source in place when the snapshot is missing or
//! out of date.
//!
//! The engine edits test sources written in a Swift-style syntax (labeled
//! arguments, trailing closures, pound-delimited multi-line raw strings). It
//! is deliberately host-agnostic: the test framework is injected as a
//! [`Host`] (a failure reporter plus a bundle-lifecycle hook) and the
//! snapshotting format as a [`Strategy`] (a value-to-string conversion plus
//! a diff).
//!
//! To use the engine:
//!
//! 1. Implement a [`Host`] for your test framework and a [`Strategy`] for
//!    your snapshot format (or use the built-in [`Lines`] strategy).
//! 2. Call [`assert_inline_snapshot`] from your assertion surface, passing
//!    the call's [`CallSite`] and the text of the existing `matches:`
//!    closure, when one is present.
//!
//! While an expected snapshot exists and matches, assertions are silent.
//! When it is missing, or record mode is on (see [`set_recording`] and
//! [`with_recording`]), the assertion fails with a recording notice and the
//! source edit is queued; queued edits are written back atomically, once,
//! when the host reports the end of the test bundle (or when
//! [`flush_pending_edits`] is called directly).
//!
//! # Example
//!
//! ```
//! use std::path::{Path, PathBuf};
//!
//! use snapline::{assert_inline_snapshot, CallSite, Host, Lines, SnapshotDescriptor};
//!
//! struct StderrHost;
//!
//! impl Host for StderrHost {
//!     fn fail(&self, message: &str, file: &Path, line: usize) {
//!         eprintln!("{}:{line}: {message}", file.display());
//!     }
//!
//!     fn on_bundle_finished(&self, flush: fn()) {
//!         // A real host runs `flush` after its last test.
//!         let _ = flush;
//!     }
//! }
//!
//! // `Tests.swift`, line 4: assertInlineSnapshot(of: greeting) { ... }
//! let site = CallSite {
//!     file: PathBuf::from("Tests.swift"),
//!     line: 4,
//!     column: 25,
//! };
//!
//! assert_inline_snapshot(
//!     &StderrHost,
//!     &Lines,
//!     String::from("Hello!"),
//!     Some("Hello!"),
//!     SnapshotDescriptor::default(),
//!     "assertInlineSnapshot",
//!     site,
//! );
//! ```

use std::ops::Range;

use crate::swift::reader::Tok;

pub mod core;
pub mod swift;
mod text;

pub use crate::core::registry::flush_pending_edits;
pub use crate::core::{
    assert_inline_snapshot, async_assert_inline_snapshot, is_recording, set_recording,
    with_recording, AsyncStrategy, CallSite, Error, Host, Lines, SnapshotDescriptor, Strategy,
};
pub use crate::swift::SourceFile;
#[cfg(feature = "macros")]
pub use snapline_macros::glob_test;

// Common private helper types
// ===========================

pub(crate) type Token = (Tok, Range<usize>);

/// Project the `kind` component of a `token`.
#[inline]
pub(crate) fn kind(token: &Token) -> Tok {
    token.0
}

/// Project the `span` component of a `token`.
#[inline]
pub(crate) fn span(token: &Token) -> &Range<usize> {
    &token.1
}

/// Print a token sequence for debugging purposes.
#[allow(unused)]
pub(crate) fn debug(tag: &str, source: &str, tokens: &[Token]) {
    println!("<{tag}>");
    for (i, (kind, span)) in tokens.iter().enumerate() {
        let text = &source[span.clone()];
        println!("{i:03} at: span={span:03?} - kind={kind:?} text={text:?}");
    }
    println!("</{tag}>");
}
