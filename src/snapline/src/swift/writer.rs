//! Utilities for writing [`SourceFile`](super::SourceFile) documents.

use std::fs::OpenOptions;
use std::io::Write;
use std::ops::Range;
use std::path::Path;

use fs2::FileExt;

/// One source edit: replace `range` of the original text with `text`.
///
/// An empty range is an insertion. Splices are expressed in original byte
/// coordinates and applied in one pass, so unchanged regions are reproduced
/// byte-for-byte.
#[derive(Debug)]
pub(crate) struct Splice {
    pub range: Range<usize>,
    pub text: String,
}

/// Apply `splices` to `source`. The splices must be sorted by start offset
/// and must not overlap; insertions at the same offset keep their order.
pub(crate) fn apply(source: &str, splices: &[Splice]) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for splice in splices {
        out.push_str(&source[cursor..splice.range.start]);
        out.push_str(&splice.text);
        cursor = splice.range.end;
    }
    out.push_str(&source[cursor..]);
    out
}

/// Replace the file at `path` with `contents` atomically: write a sibling
/// temporary file, then rename it over the target. The target is locked
/// exclusively for the duration of the swap so shared-lock readers never
/// observe a half-written file.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut temp_file = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
        None => tempfile::NamedTempFile::new()?,
    };
    temp_file.write_all(contents.as_bytes())?;
    temp_file.flush()?;

    let lock = OpenOptions::new().write(true).open(path);
    if let Ok(target) = &lock {
        target.lock_exclusive()?;
    }

    temp_file.persist(path).map_err(|err| err.error)?;
    Ok(())
}
