//! The source rewriter: splices freshly recorded snapshots into a parsed
//! test source.
//!
//! Each pending edit is keyed by the end position of a called expression.
//! The rewriter resolves the edit's descriptor to a closure slot (a
//! parenthesized closure argument, the unlabeled trailing closure, or a
//! labeled additional trailing closure), synthesizes a replacement closure
//! holding the actual snapshot as a pound-delimited multi-line raw string,
//! and assembles one splice per edit. Untouched regions of the source are
//! reproduced byte-for-byte.

use crate::core::{Error, PendingEdit};
use crate::swift::reader::Call;
use crate::swift::writer::{self, Splice};
use crate::swift::SourceFile;
use crate::text::{self, Pos};

/// Apply `edits` to `file`, returning the updated source text.
///
/// Edits are sorted stably by (line, trailing closure offset) first; edits
/// whose expected text already equals the actual text are dropped. An edit
/// whose call site cannot be found leaves the source unchanged.
pub(crate) fn rewrite(file: &SourceFile, edits: Vec<PendingEdit>) -> String {
    let mut edits: Vec<PendingEdit> = edits
        .into_iter()
        .filter(|edit| edit.expected.as_deref() != Some(edit.actual.as_str()))
        .collect();
    edits.sort_by_key(|edit| (edit.line, edit.descriptor.trailing_closure_offset));

    let mut consumed = vec![false; edits.len()];
    let mut splices: Vec<Splice> = Vec::new();

    for call in &file.calls {
        let pos = file.lines.pos(call.key);
        for (i, edit) in edits.iter().enumerate() {
            if consumed[i] || pos != Pos::new(edit.line, edit.column) {
                continue;
            }
            consumed[i] = true;
            tracing::debug!(
                callee = &file.source[call.callee.clone()],
                line = edit.line,
                offset = edit.descriptor.trailing_closure_offset,
                "rewriting inline snapshot"
            );
            if let Some(splice) = plan(file, call, edit) {
                push(&mut splices, splice);
            }
        }
    }

    for (i, edit) in edits.iter().enumerate() {
        if !consumed[i] {
            tracing::warn!(
                function = edit.function_name.as_str(),
                line = edit.line,
                column = edit.column,
                "no call found for recorded snapshot; leaving the source unchanged"
            );
        }
    }

    splices.sort_by_key(|splice| splice.range.start);
    writer::apply(&file.source, &splices)
}

/// Resolve one edit against its call and produce the splice for it, or
/// `None` when the edit resolves to leaving the source alone.
fn plan(file: &SourceFile, call: &Call, edit: &PendingEdit) -> Option<Splice> {
    let closure = synthesize(file, edit);
    let centered = call.centered_offset(edit.descriptor.trailing_closure_offset);

    // Target sits inside the parenthesized argument list.
    if centered < 0 {
        let index = (call.args.len() as isize + centered) as usize;
        let arg = call.args.get(index)?;
        return Some(Splice {
            range: arg.expr.clone(),
            text: closure,
        });
    }

    // Target is the unlabeled trailing closure position.
    if centered == 0 {
        return match (&call.trailing, edit.was_recording) {
            (Some(range), true) => Some(Splice {
                range: range.clone(),
                text: closure,
            }),
            (Some(_), false) => {
                let err = Error::UnexpectedTrailingClosure {
                    function: edit.function_name.clone(),
                    line: edit.line,
                };
                panic!("{err}");
            }
            (None, _) => {
                // Parenless calls always carry a trailing closure, so the
                // right parenthesis exists here.
                let anchor = call.rparen_end?;
                Some(Splice {
                    range: anchor..anchor,
                    text: format!(" {closure}"),
                })
            }
        };
    }

    // Target is a labeled additional trailing closure.
    let index = (centered - 1) as usize;
    let label = &edit.descriptor.trailing_closure_label;
    match call.additional.get(index) {
        Some(occupant) if &file.source[occupant.label.clone()] == label.as_str() => {
            edit.was_recording.then(|| Splice {
                range: occupant.closure.clone(),
                text: closure,
            })
        }
        Some(occupant) => {
            let at = occupant.label.start;
            Some(Splice {
                range: at..at,
                text: format!("{label}: {closure} "),
            })
        }
        None => {
            let anchor = call
                .additional
                .last()
                .map(|labeled| labeled.closure.end)
                .or_else(|| call.trailing.as_ref().map(|trailing| trailing.end))
                .or(call.rparen_end)?;
            Some(Splice {
                range: anchor..anchor,
                text: format!(" {label}: {closure}"),
            })
        }
    }
}

/// Build the replacement closure: a single-statement closure whose statement
/// is a multi-line raw string literal holding the actual snapshot, indented
/// one level past the line that carries the call.
fn synthesize(file: &SourceFile, edit: &PendingEdit) -> String {
    let line = file.lines.line_text(&file.source, edit.line).unwrap_or("");
    let leading = text::leading_whitespace(line);
    let inner = format!("{leading}{}", text::detect_indent(&file.source));
    let marks = "#".repeat(text::pound_count(&edit.actual, true));
    let body = text::indent(&edit.actual, &inner);
    format!("{{\n{inner}{marks}\"\"\"\n{body}\n{inner}\"\"\"{marks}\n{leading}}}")
}

/// Add a splice, keeping the splice set non-overlapping. An exact duplicate
/// range is overwritten (the later edit wins); a partial overlap is dropped.
fn push(splices: &mut Vec<Splice>, splice: Splice) {
    if !splice.range.is_empty() {
        if let Some(existing) = splices
            .iter_mut()
            .find(|existing| existing.range == splice.range)
        {
            existing.text = splice.text;
            return;
        }
    }
    let overlapping = splices
        .iter()
        .any(|existing| existing.range.start < splice.range.end && splice.range.start < existing.range.end);
    if overlapping {
        tracing::warn!("skipping snapshot edit that overlaps an earlier rewrite");
        return;
    }
    splices.push(splice);
}
