//! Core primitives and data types for inline snapshot assertions.

use std::cell::RefCell;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::swift::locator;

pub(crate) mod registry;

// Data model
// ==========

/// Identifies which closure of an assertion call holds the inline snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotDescriptor {
    /// The argument label used when a new trailing closure must be written.
    pub trailing_closure_label: String,
    /// The target slot, relative to the first trailing closure position.
    pub trailing_closure_offset: usize,
}

impl Default for SnapshotDescriptor {
    fn default() -> Self {
        Self {
            trailing_closure_label: String::from("matches"),
            trailing_closure_offset: 0,
        }
    }
}

/// Where an assertion call lives in its test source file.
///
/// `line` and `column` are the 1-based end position of the called expression,
/// trailing trivia included; in practice that is the position of the `(`
/// opening the argument list. Columns count UTF-8 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
}

/// One recorded intent to update a snapshot at a call site.
#[derive(Debug)]
pub(crate) struct PendingEdit {
    /// The snapshot text already embedded in the source, when present.
    pub expected: Option<String>,
    /// The freshly produced snapshot text.
    pub actual: String,
    /// Whether the assertion ran in record mode.
    pub was_recording: bool,
    pub descriptor: SnapshotDescriptor,
    /// The called expression's base name, for messages.
    pub function_name: String,
    pub line: usize,
    pub column: usize,
}

// Strategy and host traits
// ========================

/// A trait implemented by snapshot strategies.
///
/// The engine consumes exactly two capabilities: turning a value into its
/// snapshot string, and diffing two snapshot strings.
pub trait Strategy {
    type Value;
    type Error: Display;

    /// Produce the snapshot string for `value`.
    fn snapshot(&self, value: Self::Value) -> Result<String, Self::Error>;

    /// Compare an expected snapshot against a fresh one, returning a
    /// human-readable difference, or `None` when they agree.
    fn diff(&self, expected: &str, actual: &str) -> Option<String>;
}

#[allow(async_fn_in_trait)]
/// An `async` version of [`Strategy`].
pub trait AsyncStrategy {
    type Value;
    type Error: Display;

    async fn snapshot(&self, value: Self::Value) -> Result<String, Self::Error>;

    fn diff(&self, expected: &str, actual: &str) -> Option<String>;
}

/// The host test framework, as seen by the engine.
pub trait Host {
    /// Report a test failure attributed to `file` at `line`.
    fn fail(&self, message: &str, file: &Path, line: usize);

    /// Register `flush` to run after the test bundle finishes. The engine
    /// calls this at most once per process; hosts must perform the
    /// registration on their main thread.
    fn on_bundle_finished(&self, flush: fn());
}

/// A line-oriented strategy over plain strings: the snapshot is the value
/// itself and differences are labeled line diffs.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lines;

impl Strategy for Lines {
    type Value = String;
    type Error = std::convert::Infallible;

    fn snapshot(&self, value: String) -> Result<String, Self::Error> {
        Ok(value)
    }

    fn diff(&self, expected: &str, actual: &str) -> Option<String> {
        if expected == actual {
            return None;
        }
        let diff = similar::TextDiff::from_lines(expected, actual);
        let mut out = String::new();
        for change in diff.iter_all_changes() {
            let sign = match change.tag() {
                similar::ChangeTag::Delete => "-",
                similar::ChangeTag::Insert => "+",
                similar::ChangeTag::Equal => " ",
            };
            out.push_str(sign);
            out.push(' ');
            out.push_str(change.value().trim_end_matches('\n'));
            out.push('\n');
        }
        Some(out)
    }
}

// Record-mode configuration
// =========================

static RECORD_ALL: AtomicBool = AtomicBool::new(false);

thread_local! {
    static RECORD_OVERRIDES: RefCell<Vec<bool>> = const { RefCell::new(Vec::new()) };
}

/// Set the process-wide record mode. While recording, every assertion
/// enqueues a source edit and fails, whether or not the expected snapshot
/// matches.
pub fn set_recording(on: bool) {
    RECORD_ALL.store(on, Ordering::Relaxed);
}

/// Whether assertions currently record: the innermost [`with_recording`]
/// override when one is active, the process-wide flag otherwise.
pub fn is_recording() -> bool {
    RECORD_OVERRIDES
        .with(|overrides| overrides.borrow().last().copied())
        .unwrap_or_else(|| RECORD_ALL.load(Ordering::Relaxed))
}

/// Run `f` with record mode overridden to `on`.
///
/// The override is scoped to the call and restores on every exit path,
/// including unwinding. Overrides nest; the innermost wins.
pub fn with_recording<R>(on: bool, f: impl FnOnce() -> R) -> R {
    struct Restore;

    impl Drop for Restore {
        fn drop(&mut self) {
            RECORD_OVERRIDES.with(|overrides| {
                overrides.borrow_mut().pop();
            });
        }
    }

    RECORD_OVERRIDES.with(|overrides| overrides.borrow_mut().push(on));
    let _restore = Restore;
    f()
}

// Assertion entry points
// ======================

/// Assert that `value`'s snapshot matches the inline snapshot embedded at
/// `site`.
///
/// When record mode is off and `expected` is present, the two snapshots are
/// diffed through the strategy: agreement returns silently, disagreement
/// fails the test at the snapshot closure's line. When record mode is on, or
/// no expected snapshot exists yet, the test fails with a recording notice
/// and a source edit is queued; the edit is written back when the host
/// signals the end of the bundle (see
/// [`flush_pending_edits`](registry::flush_pending_edits)).
pub fn assert_inline_snapshot<S, H>(
    host: &H,
    strategy: &S,
    value: S::Value,
    expected: Option<&str>,
    descriptor: SnapshotDescriptor,
    function_name: &str,
    site: CallSite,
) where
    S: Strategy,
    H: Host,
{
    let was_recording = is_recording();

    let actual = match strategy.snapshot(value) {
        Ok(actual) => actual,
        Err(err) => {
            let msg = format!("`{function_name}` could not produce a snapshot: {err}");
            host.fail(&msg, &site.file, site.line);
            return;
        }
    };

    if !was_recording {
        if let Some(expected) = expected {
            let Some(difference) = strategy.diff(expected, &actual) else {
                return;
            };
            let line = closure_line(&site, &descriptor);
            let msg = format!("`{function_name}` snapshot did not match:\n\n{difference}");
            host.fail(&msg, &site.file, line);
            return;
        }
    }

    let msg = format!(
        "`{function_name}` automatically recorded a new snapshot; re-run the test to assert against it"
    );
    host.fail(&msg, &site.file, site.line);

    registry::record(
        site.file.clone(),
        PendingEdit {
            expected: expected.map(str::to_owned),
            actual,
            was_recording,
            descriptor,
            function_name: function_name.to_owned(),
            line: site.line,
            column: site.column,
        },
    );
    registry::ensure_flush_hook(host);
}

/// An `async` version of [`assert_inline_snapshot`].
///
/// The record flag is captured before the strategy suspends, so overrides
/// behave the same as in the synchronous entry point. Dropping the returned
/// future before completion records nothing.
pub async fn async_assert_inline_snapshot<S, H>(
    host: &H,
    strategy: &S,
    value: S::Value,
    expected: Option<&str>,
    descriptor: SnapshotDescriptor,
    function_name: &str,
    site: CallSite,
) where
    S: AsyncStrategy,
    H: Host,
{
    let was_recording = is_recording();

    let actual = match strategy.snapshot(value).await {
        Ok(actual) => actual,
        Err(err) => {
            let msg = format!("`{function_name}` could not produce a snapshot: {err}");
            host.fail(&msg, &site.file, site.line);
            return;
        }
    };

    if !was_recording {
        if let Some(expected) = expected {
            let Some(difference) = strategy.diff(expected, &actual) else {
                return;
            };
            let line = closure_line(&site, &descriptor);
            let msg = format!("`{function_name}` snapshot did not match:\n\n{difference}");
            host.fail(&msg, &site.file, line);
            return;
        }
    }

    let msg = format!(
        "`{function_name}` automatically recorded a new snapshot; re-run the test to assert against it"
    );
    host.fail(&msg, &site.file, site.line);

    registry::record(
        site.file.clone(),
        PendingEdit {
            expected: expected.map(str::to_owned),
            actual,
            was_recording,
            descriptor,
            function_name: function_name.to_owned(),
            line: site.line,
            column: site.column,
        },
    );
    registry::ensure_flush_hook(host);
}

/// The line failure markers point at: the target closure's opening line when
/// the slot is occupied, the assertion line otherwise. An unreadable source
/// is fatal here because the flush could not reconcile the recording against
/// it either.
fn closure_line(site: &CallSite, descriptor: &SnapshotDescriptor) -> usize {
    match registry::source(&site.file, site.line) {
        Ok(file) => locator::closure_line(
            file,
            site.line,
            site.column,
            descriptor.trailing_closure_offset,
        )
        .unwrap_or(site.line),
        Err(err) => panic!("{err}"),
    }
}

// Errors
// ======

/// Errors the engine treats as fatal.
///
/// Recoverable conditions (snapshot mismatches, missing snapshots, strategy
/// errors) are reported through [`Host::fail`] instead and never surface
/// here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot read test source `{}` near line {line}: {source}", path.display())]
    UnreadableSource {
        path: PathBuf,
        line: usize,
        source: std::io::Error,
    },
    #[error("cannot write test source `{}` near line {line}: {source}", path.display())]
    UnwritableSource {
        path: PathBuf,
        line: usize,
        source: std::io::Error,
    },
    #[error(
        "inline snapshot for `{function}` at line {line} targets an existing trailing closure; \
         record mode is required to overwrite it"
    )]
    UnexpectedTrailingClosure { function: String, line: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_overrides_nest() {
        with_recording(true, || {
            assert!(is_recording());
            with_recording(false, || assert!(!is_recording()));
            assert!(is_recording());
        });
    }

    #[test]
    fn global_record_flag() {
        set_recording(true);
        assert!(is_recording());
        set_recording(false);
    }

    #[test]
    fn record_override_restores_after_unwind() {
        let result = std::panic::catch_unwind(|| with_recording(true, || panic!("boom")));
        assert!(result.is_err());
        let depth = RECORD_OVERRIDES.with(|overrides| overrides.borrow().len());
        assert_eq!(depth, 0);
    }

    #[test]
    fn lines_diff_labels_changes() {
        let diff = Lines.diff("hello\nshared", "hi\nshared");
        let diff = diff.expect("difference");
        assert!(diff.contains("- hello"));
        assert!(diff.contains("+ hi"));
        assert!(diff.contains("  shared"));

        assert_eq!(Lines.diff("same", "same"), None);
    }
}
