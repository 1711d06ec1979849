use crate::error::{CriticalPathError, Result};
use crate::graph::{CPSpan, SpanMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A slice of one span's own execution lying on the critical path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CriticalPathSection {
    pub span_id: String,
    pub section_start: i64,
    pub section_end: i64,
}

impl CriticalPathSection {
    pub fn duration(&self) -> i64 {
        self.section_end - self.section_start
    }
}

/// The child of `span` that finished last, optionally restricted to children
/// ending strictly before `spawn_time`.
///
/// Relies on `child_span_ids` being ordered latest-finishing first.
pub fn last_finishing_child<'a>(
    map: &'a SpanMap,
    span: &CPSpan,
    spawn_time: Option<i64>,
) -> Option<&'a CPSpan> {
    next_finishing_child(map, span, spawn_time, 0).map(|(_, child)| child)
}

/// Like `last_finishing_child`, scanning `child_span_ids` from index `from`
/// and also returning the position of the child found.
fn next_finishing_child<'a>(
    map: &'a SpanMap,
    span: &CPSpan,
    spawn_time: Option<i64>,
    from: usize,
) -> Option<(usize, &'a CPSpan)> {
    span.child_span_ids
        .iter()
        .enumerate()
        .skip(from)
        .filter_map(|(index, id)| map.get(id).map(|child| (index, child)))
        .find(|(_, child)| spawn_time.map_or(true, |threshold| child.end_time() < threshold))
}

/// Walk backwards in time from the end of `root_span_id`, returning the
/// critical path sections in chronological order.
///
/// At each span the last finishing child is followed; the time between that
/// child's end and the current point belongs to the span itself. A span with
/// no (further) finishing child owns the time back to its own start, and the
/// walk resumes in its parent from that start. Zero-length sections are not
/// emitted.
///
/// The threshold a span is revisited with only ever decreases, and children
/// are sorted by descending end time, so a child skipped once is never a
/// candidate again. Each span keeps a cursor into its child list and the
/// whole walk scans every child list once.
///
/// # Example
/// ```text
/// |-------------A--------------|
///    |---B---|     |---C---|
/// ```
/// The LFC of A is C. C has no children, so the walk returns to A with C's
/// start as the threshold and picks B, which finished before it.
pub fn walk(map: &SpanMap, root_span_id: &str) -> Result<Vec<CriticalPathSection>> {
    let mut current = map
        .get(root_span_id)
        .ok_or_else(|| CriticalPathError::MissingSpan {
            span_id: root_span_id.to_string(),
        })?;
    let mut returning_child_start: Option<i64> = None;
    let mut cursors: HashMap<&str, usize> = HashMap::new();
    let mut sections = Vec::new();

    loop {
        let section_end = returning_child_start.unwrap_or_else(|| current.end_time());
        let from = cursors.get(current.span_id.as_str()).copied().unwrap_or(0);

        if let Some((index, lfc)) = next_finishing_child(map, current, returning_child_start, from)
        {
            cursors.insert(current.span_id.as_str(), index + 1);
            push_section(&mut sections, current, lfc.end_time(), section_end);
            current = lfc;
            returning_child_start = None;
            continue;
        }

        push_section(&mut sections, current, current.start_time, section_end);
        if current.span_id == root_span_id {
            break;
        }
        match map.parent_of(&current.span_id) {
            Some(parent) => {
                returning_child_start = Some(current.start_time);
                current = parent;
            }
            None => break,
        }
    }

    sections.reverse();
    Ok(sections)
}

fn push_section(sections: &mut Vec<CriticalPathSection>, span: &CPSpan, start: i64, end: i64) {
    if start < end {
        sections.push(CriticalPathSection {
            span_id: span.span_id.clone(),
            section_start: start,
            section_end: end,
        });
    }
}
