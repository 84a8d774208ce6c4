//! Process-wide recording state: the per-file pending-edit buffer, the parse
//! cache, and the end-of-bundle flush.
//!
//! Assertions append to the buffer; the flush drains it exactly once per
//! bundle. Both maps are guarded by mutexes so hosts that run assertions
//! from several threads stay consistent; the critical sections are an append
//! and a drain.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, Once};

use crate::core::{Error, Host, PendingEdit};
use crate::swift::{rewriter, writer, SourceFile};

static PENDING: LazyLock<Mutex<HashMap<PathBuf, Vec<PendingEdit>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

static SOURCES: LazyLock<Mutex<HashMap<PathBuf, &'static SourceFile>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

static FLUSH_HOOK: Once = Once::new();

/// Append a pending edit for `path`.
pub(crate) fn record(path: PathBuf, edit: PendingEdit) {
    let mut pending = PENDING.lock().unwrap();
    pending.entry(path).or_default().push(edit);
}

/// The cached parse of `path`, reading and parsing on first use.
///
/// Parses live until process exit; recorded positions refer to the file as
/// it was when the bundle started, so a stale parse is exactly what the
/// rewriter needs.
pub(crate) fn source(path: &Path, line: usize) -> Result<&'static SourceFile, Error> {
    let mut sources = SOURCES.lock().unwrap();
    if let Some(file) = sources.get(path) {
        return Ok(file);
    }

    tracing::debug!(path = %path.display(), "parsing test source");
    let file = SourceFile::from_path(path).map_err(|source| Error::UnreadableSource {
        path: path.to_path_buf(),
        line,
        source,
    })?;
    let file: &'static SourceFile = Box::leak(Box::new(file));
    sources.insert(path.to_path_buf(), file);
    Ok(file)
}

/// Register the flush with the host's bundle lifecycle, at most once per
/// process.
pub(crate) fn ensure_flush_hook<H>(host: &H)
where
    H: Host + ?Sized,
{
    FLUSH_HOOK.call_once(|| host.on_bundle_finished(flush_pending_edits));
}

/// Drain every recorded edit and rewrite the files they refer to.
///
/// Runs through [`Host::on_bundle_finished`] after the last assertion; hosts
/// without a bundle lifecycle, and tests, may call it directly. Files whose
/// rewrite equals the current text byte-for-byte are not written. An
/// unreadable or unwritable source panics with the file and the first edit's
/// line: the buffer has already been drained and a partial application
/// cannot be reconciled.
pub fn flush_pending_edits() {
    let mut drained: Vec<(PathBuf, Vec<PendingEdit>)> = {
        let mut pending = PENDING.lock().unwrap();
        pending.drain().collect()
    };
    drained.sort_by(|a, b| a.0.cmp(&b.0));

    for (path, edits) in drained {
        let first_line = edits.first().map_or(1, |edit| edit.line);
        let file = match source(&path, first_line) {
            Ok(file) => file,
            Err(err) => panic!("{err}"),
        };

        let rewritten = rewriter::rewrite(file, edits);
        if rewritten == file.source() {
            continue;
        }

        tracing::debug!(path = %path.display(), "updating inline snapshots");
        if let Err(source) = writer::write_atomic(&path, &rewritten) {
            let err = Error::UnwritableSource {
                path,
                line: first_line,
                source,
            };
            panic!("{err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::core::SnapshotDescriptor;

    fn pending_edit(line: usize, column: usize, actual: &str) -> PendingEdit {
        PendingEdit {
            expected: None,
            actual: actual.to_owned(),
            was_recording: false,
            descriptor: SnapshotDescriptor::default(),
            function_name: String::from("assert"),
            line,
            column,
        }
    }

    #[test]
    fn flush_rewrites_recorded_files() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("FlushTests.swift");
        std::fs::write(&path, "func testFlush() {\n    assert(of: value)\n}\n")?;

        // The call's `(` sits on line 2 right after the callee.
        record(path.clone(), pending_edit(2, 11, "flushed"));
        flush_pending_edits();

        let rewritten = std::fs::read_to_string(&path)?;
        assert_eq!(
            rewritten,
            "func testFlush() {\n    assert(of: value) {\n        \"\"\"\n        flushed\n        \"\"\"\n    }\n}\n"
        );

        // The buffer is drained: a second flush changes nothing.
        flush_pending_edits();
        assert_eq!(std::fs::read_to_string(&path)?, rewritten);

        Ok(())
    }

    #[test]
    fn matching_snapshots_do_not_touch_the_file() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("NoopTests.swift");
        let source = "func testNoop() {\n    assert(of: value)\n}\n";
        std::fs::write(&path, source)?;

        let mut edit = pending_edit(2, 11, "same");
        edit.expected = Some(String::from("same"));
        record(path.clone(), edit);
        flush_pending_edits();

        assert_eq!(std::fs::read_to_string(&path)?, source);
        Ok(())
    }

    #[test]
    fn flush_hook_installs_once() {
        static INSTALLS: AtomicUsize = AtomicUsize::new(0);

        struct CountingHost;

        impl Host for CountingHost {
            fn fail(&self, _message: &str, _file: &Path, _line: usize) {}

            fn on_bundle_finished(&self, _flush: fn()) {
                INSTALLS.fetch_add(1, Ordering::SeqCst);
            }
        }

        ensure_flush_hook(&CountingHost);
        ensure_flush_hook(&CountingHost);
        assert_eq!(INSTALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn source_cache_returns_the_same_parse() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("CacheTests.swift");
        std::fs::write(&path, "assert(of: value)\n")?;

        let first = source(&path, 1).expect("readable");
        let second = source(&path, 1).expect("cached");
        assert!(std::ptr::eq(first, second));
        Ok(())
    }

    #[test]
    fn missing_source_is_reported_with_the_edit_line() {
        let missing = PathBuf::from("/nonexistent/snapline/Missing.swift");
        let err = source(&missing, 7).expect_err("unreadable");
        let message = err.to_string();
        assert!(message.contains("Missing.swift"));
        assert!(message.contains("line 7"));
    }
}
