//! Line-oriented merge of pending directives into an event.
//!
//! One forward pass over the event. For each line the pending directives are
//! visited in catalog order; each one counts the occurrences of its own key,
//! and the first one sitting at its `key_index` wins the line. At most one
//! directive applies per line.
//!
//! * `Insert` emits its content, then the matched line.
//! * `Replace` emits its content instead of the matched line, or instead of
//!   the whole span from the matched line through the `key2_index`-th line
//!   (counted from the matched line, inclusive) starting with `key2`.

use crate::catalog::PatchCatalog;
use crate::diagnostics::{ErrorSink, PatchError};
use crate::directive::{EventEdit, ReplaceDirective};
use crate::segment::{Event, ScriptDocument};
use std::ops::AddAssign;

/// Minimum similarity for an unapplied directive to name a closest line.
const CLOSEST_LINE_THRESHOLD: f64 = 0.75;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub applied: usize,
    pub failed: usize,
    pub unapplied: usize,
}

impl AddAssign for MergeStats {
    fn add_assign(&mut self, other: Self) {
        self.applied += other.applied;
        self.failed += other.failed;
        self.unapplied += other.unapplied;
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeOutput {
    pub lines: Vec<String>,
    pub stats: MergeStats,
}

/// Merge `pending` into `lines`, removing each directive as it applies.
///
/// Directives still in `pending` afterwards never matched; reporting them is
/// up to the caller (see [`merge_event`]).
pub fn merge_lines<S: AsRef<str>>(
    lines: &[S],
    pending: &mut Vec<EventEdit>,
    sink: &mut dyn ErrorSink,
) -> MergeOutput {
    // Scan-local occurrence counters, parallel to `pending`.
    let mut counters = vec![0usize; pending.len()];
    let mut output = MergeOutput {
        lines: Vec::with_capacity(lines.len()),
        stats: MergeStats::default(),
    };
    let mut cursor = 0;

    while cursor < lines.len() {
        let line = lines[cursor].as_ref();
        let Some(scan) = scan_line(line, pending, &mut counters) else {
            output.lines.push(line.to_string());
            cursor += 1;
            continue;
        };

        let span_end = match &pending[scan.winner] {
            EventEdit::Insert(_) => None,
            EventEdit::Replace(replace) => replace_end(lines, cursor, replace),
        };
        // Directives behind the winner only see the line if it survives.
        if span_end.is_none() {
            for idx in scan.deferred {
                counters[idx] += 1;
            }
        }

        counters.remove(scan.winner);
        match pending.remove(scan.winner) {
            EventEdit::Insert(insert) => {
                output.lines.extend(insert.content);
                output.lines.push(line.to_string());
                output.stats.applied += 1;
                cursor += 1;
            }
            EventEdit::Replace(replace) => match span_end {
                Some(end) => {
                    output.lines.extend(replace.content);
                    output.stats.applied += 1;
                    cursor = end + 1;
                }
                None => {
                    let key2 = replace.key2.clone();
                    let key2_index = replace.key2_index;
                    sink.report_error(PatchError::ApplicationFailure {
                        edit: EventEdit::Replace(replace),
                        key2,
                        key2_index,
                    });
                    output.lines.push(line.to_string());
                    output.stats.failed += 1;
                    cursor += 1;
                }
            },
        }
    }

    output
}

/// Merge the catalog's directives for `event` into its lines.
///
/// The event's directives are taken out of the catalog; any that never
/// matched are reported once each and dropped. The header is not included
/// in the returned lines.
pub fn merge_event(
    event: &Event,
    catalog: &mut PatchCatalog,
    sink: &mut dyn ErrorSink,
) -> MergeOutput {
    let lines: Vec<&str> = event.lines.iter().map(|l| l.text.as_str()).collect();
    let mut pending = catalog.take(&event.id);
    if pending.is_empty() {
        return MergeOutput {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            stats: MergeStats::default(),
        };
    }

    let mut output = merge_lines(&lines, &mut pending, sink);
    output.stats.unapplied = pending.len();
    for edit in pending {
        let closest = closest_line(&lines, edit.key());
        sink.report_error(PatchError::UnappliedDirective { edit, closest });
    }
    output
}

/// Merge every event of `document`, passing the preamble and headers through.
pub fn merge_document(
    document: &ScriptDocument,
    catalog: &mut PatchCatalog,
    sink: &mut dyn ErrorSink,
) -> MergeOutput {
    let mut output = MergeOutput {
        lines: document.preamble.iter().map(|l| l.text.clone()).collect(),
        stats: MergeStats::default(),
    };

    for event in &document.events {
        output.lines.push(event.header.text.clone());
        let merged = merge_event(event, catalog, sink);
        output.lines.extend(merged.lines);
        output.stats += merged.stats;
    }

    output
}

/// Result of scanning one line: the winning directive and the directives
/// after it whose count would advance if the line is kept.
struct LineScan {
    winner: usize,
    deferred: Vec<usize>,
}

fn scan_line(line: &str, pending: &[EventEdit], counters: &mut [usize]) -> Option<LineScan> {
    let mut hit: Option<LineScan> = None;
    for (idx, edit) in pending.iter().enumerate() {
        if !line.starts_with(edit.key()) {
            continue;
        }
        if counters[idx] < edit.key_index() {
            match hit.as_mut() {
                Some(scan) => scan.deferred.push(idx),
                None => counters[idx] += 1,
            }
            continue;
        }
        if counters[idx] > edit.key_index() {
            continue;
        }
        match &hit {
            None => {
                hit = Some(LineScan {
                    winner: idx,
                    deferred: Vec::new(),
                })
            }
            // Same anchor as the winner: its occurrence is gone, so it can
            // only end unapplied.
            Some(scan) if edit.same_anchor(&pending[scan.winner]) => counters[idx] += 1,
            // A different key keeps its count and may take the next
            // occurrence of that key.
            Some(_) => {}
        }
    }
    hit
}

fn replace_end<S: AsRef<str>>(lines: &[S], start: usize, replace: &ReplaceDirective) -> Option<usize> {
    if replace.key2.is_empty() {
        return Some(start);
    }
    lines[start..]
        .iter()
        .enumerate()
        .filter(|(_, line)| line.as_ref().starts_with(&replace.key2))
        .nth(replace.key2_index)
        .map(|(offset, _)| start + offset)
}

fn closest_line(lines: &[&str], key: &str) -> Option<String> {
    let width = key.chars().count();
    lines
        .iter()
        .map(|line| {
            let prefix: String = line.chars().take(width).collect();
            (strsim::normalized_levenshtein(&prefix, key), *line)
        })
        .filter(|(score, _)| *score >= CLOSEST_LINE_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, line)| line.to_string())
}
