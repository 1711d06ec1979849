use crate::graph::{CPSpan, SpanMap};
use tracing::warn;

/// Pick the root of the trace tree.
///
/// Candidates are spans that declare no parent at all; when there are none,
/// spans whose declared parent is missing from the map (orphans) are used.
/// Several candidates resolve to the earliest start, then the latest end,
/// then the smallest span id. Returns `None` only for an empty map.
pub fn locate_root(map: &SpanMap) -> Option<String> {
    let tree_roots: Vec<&CPSpan> = map
        .tree_roots()
        .iter()
        .filter_map(|id| map.get(id))
        .collect();

    let declared: Vec<&CPSpan> = tree_roots
        .iter()
        .copied()
        .filter(|span| span.parent_span_id.is_none())
        .collect();
    let candidates = if declared.is_empty() {
        tree_roots
    } else {
        declared
    };

    let root = candidates
        .iter()
        .min_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| b.end_time().cmp(&a.end_time()))
                .then_with(|| a.span_id.cmp(&b.span_id))
        })?;

    if candidates.len() > 1 {
        warn!(
            candidates = candidates.len(),
            root = %root.span_id,
            "ambiguous trace root, using earliest span"
        );
    }
    Some(root.span_id.clone())
}
