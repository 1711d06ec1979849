use crate::graph::SpanMap;
use std::collections::VecDeque;
use tracing::debug;

/// Position of a child interval relative to its parent interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    /// |----parent----|
    ///   |--child--|
    Inside,
    ///      |----parent----|
    ///   |--child--|
    StartsBefore,
    /// |----parent----|
    ///           |--child--|
    EndsAfter,
    ///    |--parent--|
    /// |-----child------|
    Encloses,
    /// |--parent--|
    ///               |--child--|
    Outside,
}

/// Classify `[child_start, child_end]` against `[parent_start, parent_end]`.
///
/// Containment is checked first and is inclusive at both ends, so a
/// zero-length child sitting on either edge of its parent is `Inside`. A
/// child only counts as `Outside` when it starts at or after the parent's end
/// or ends at or before the parent's start without being contained.
pub fn overlap(child_start: i64, child_end: i64, parent_start: i64, parent_end: i64) -> Overlap {
    let starts_inside = child_start >= parent_start;
    let ends_inside = child_end <= parent_end;

    match (starts_inside, ends_inside) {
        (true, true) => Overlap::Inside,
        (false, true) if child_end > parent_start => Overlap::StartsBefore,
        (true, false) if child_start < parent_end => Overlap::EndsAfter,
        (false, false) => Overlap::Encloses,
        _ => Overlap::Outside,
    }
}

/// Fit every child interval inside its parent's interval.
///
/// Works top-down from each tree root so a child is always compared with
/// its parent's already-repaired interval. Children lying wholly outside
/// their parent are dropped with their subtree; the others are truncated.
pub fn sanitize(mut map: SpanMap) -> SpanMap {
    let mut queue: VecDeque<String> = map.tree_roots().into();
    let mut truncated = 0usize;
    let mut dropped = 0usize;

    while let Some(parent_id) = queue.pop_front() {
        let Some(parent) = map.get(&parent_id) else {
            continue;
        };
        let parent_start = parent.start_time;
        let parent_end = parent.end_time();
        let children = parent.child_span_ids.clone();
        let mut outside = Vec::new();

        for child_id in children {
            let Some(child) = map.get_mut(&child_id) else {
                continue;
            };
            let child_end = child.end_time();

            match overlap(child.start_time, child_end, parent_start, parent_end) {
                Overlap::Inside => {}
                Overlap::StartsBefore => {
                    child.start_time = parent_start;
                    child.duration = child_end - parent_start;
                    truncated += 1;
                }
                Overlap::EndsAfter => {
                    child.duration = parent_end - child.start_time;
                    truncated += 1;
                }
                Overlap::Encloses => {
                    child.start_time = parent_start;
                    child.duration = parent_end - parent_start;
                    truncated += 1;
                }
                Overlap::Outside => {
                    outside.push(child_id);
                    continue;
                }
            }
            queue.push_back(child_id);
        }
        dropped += map.remove_subtrees(&outside);
    }

    map.sort_children();
    debug!(truncated, dropped, "sanitized overflowing children");
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CPSpan;
    use crate::trace::RawSpan;

    fn sanitized(spans: &[RawSpan]) -> SpanMap {
        sanitize(SpanMap::build(spans).unwrap())
    }

    fn interval(map: &SpanMap, id: &str) -> (i64, i64) {
        let span: &CPSpan = map.get(id).unwrap();
        (span.start_time, span.duration)
    }

    #[test]
    fn child_starting_before_parent_truncated() {
        let map = sanitized(&[
            RawSpan::new("parent", 0, 100),
            RawSpan::new("child", -10, 30).child_of("parent"),
        ]);
        assert_eq!(interval(&map, "child"), (0, 20));
    }

    #[test]
    fn child_ending_after_parent_truncated() {
        let map = sanitized(&[
            RawSpan::new("parent", 0, 100),
            RawSpan::new("child", 80, 40).child_of("parent"),
        ]);
        assert_eq!(interval(&map, "child"), (80, 20));
    }

    #[test]
    fn enclosing_child_clamped_to_parent() {
        let map = sanitized(&[
            RawSpan::new("parent", 10, 50),
            RawSpan::new("child", 0, 100).child_of("parent"),
        ]);
        assert_eq!(interval(&map, "child"), (10, 50));
    }

    #[test]
    fn contained_child_untouched() {
        let map = sanitized(&[
            RawSpan::new("parent", 0, 100),
            RawSpan::new("child", 10, 20).child_of("parent"),
        ]);
        assert_eq!(interval(&map, "child"), (10, 20));
    }

    #[test]
    fn disjoint_children_dropped_with_subtrees() {
        let map = sanitized(&[
            RawSpan::new("parent", 100, 100),
            RawSpan::new("before", 0, 50).child_of("parent"),
            RawSpan::new("before-child", 10, 10).child_of("before"),
            RawSpan::new("after", 200, 50).child_of("parent"),
            RawSpan::new("kept", 150, 10).child_of("parent"),
        ]);

        assert_eq!(map.len(), 2);
        assert_eq!(map.get("parent").unwrap().child_span_ids, vec!["kept".to_string()]);
    }

    #[test]
    fn grandchildren_checked_against_repaired_parent() {
        let map = sanitized(&[
            RawSpan::new("root", 0, 100),
            RawSpan::new("mid", 50, 100).child_of("root"),
            RawSpan::new("leaf", 120, 20).child_of("mid"),
            RawSpan::new("edge", 90, 20).child_of("mid"),
        ]);

        assert_eq!(interval(&map, "mid"), (50, 50));
        assert!(!map.contains("leaf"));
        assert_eq!(interval(&map, "edge"), (90, 10));
    }

    #[test]
    fn children_resorted_after_truncation() {
        let map = sanitized(&[
            RawSpan::new("root", 0, 100),
            RawSpan::new("long", 50, 200).child_of("root"),
            RawSpan::new("short", 10, 85).child_of("root"),
        ]);
        // long ends at 100 after truncation, still after short (95)
        assert_eq!(
            map.get("root").unwrap().child_span_ids,
            vec!["long".to_string(), "short".to_string()]
        );
    }

    #[test]
    fn sanitizing_twice_changes_nothing() {
        let once = sanitized(&[
            RawSpan::new("root", 0, 100),
            RawSpan::new("a", -20, 50).child_of("root"),
            RawSpan::new("b", 60, 80).child_of("root"),
            RawSpan::new("c", -5, 500).child_of("a"),
            RawSpan::new("empty", 0, 0).child_of("root"),
            RawSpan::new("z", 0, 0),
            RawSpan::new("z-child", -1, 3).child_of("z"),
        ]);
        assert_eq!(interval(&once, "z-child"), (0, 0));
        assert_eq!(interval(&once, "empty"), (0, 0));

        let twice = sanitize(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn zero_length_parent_clamps_enclosing_child() {
        let map = sanitized(&[
            RawSpan::new("root", 0, 100),
            RawSpan::new("p", 50, 0).child_of("root"),
            RawSpan::new("c", 40, 20).child_of("p"),
            RawSpan::new("late", 50, 10).child_of("p"),
        ]);

        assert_eq!(interval(&map, "c"), (50, 0));
        assert!(!map.contains("late"));
        assert_eq!(map.get("p").unwrap().child_span_ids, vec!["c".to_string()]);
    }

    #[test]
    fn zero_length_children_on_parent_edges_kept() {
        let map = sanitized(&[
            RawSpan::new("root", 0, 100),
            RawSpan::new("at-end", 100, 0).child_of("root"),
            RawSpan::new("at-start", 0, 0).child_of("root"),
        ]);

        assert_eq!(interval(&map, "at-end"), (100, 0));
        assert_eq!(interval(&map, "at-start"), (0, 0));
    }

    #[test]
    fn wide_outside_fan_out_dropped() {
        let mut spans = vec![RawSpan::new("root", 0, 10)];
        spans.extend(
            (0..1_000).map(|i| RawSpan::new(format!("late-{:04}", i), 20 + i, 1).child_of("root")),
        );
        spans.push(RawSpan::new("kept", 2, 3).child_of("root"));

        let map = sanitized(&spans);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("root").unwrap().child_span_ids, vec!["kept".to_string()]);
    }

    #[test]
    fn every_child_contained_in_parent() {
        let map = sanitized(&[
            RawSpan::new("root", 0, 100),
            RawSpan::new("a", -50, 80).child_of("root"),
            RawSpan::new("b", 40, 500).child_of("a"),
            RawSpan::new("c", -100, 1000).child_of("b"),
            RawSpan::new("d", 90, 30).child_of("root"),
        ]);

        for span in map.iter() {
            if let Some(parent) = map.parent_of(&span.span_id) {
                assert!(span.start_time >= parent.start_time, "{}", span.span_id);
                assert!(span.end_time() <= parent.end_time(), "{}", span.span_id);
            }
        }
    }

    #[test]
    fn overlap_boundaries() {
        assert_eq!(overlap(100, 120, 0, 100), Overlap::Outside);
        assert_eq!(overlap(-20, 0, 0, 100), Overlap::Outside);
        assert_eq!(overlap(0, 100, 0, 100), Overlap::Inside);
        assert_eq!(overlap(5, 5, 5, 5), Overlap::Inside);
        assert_eq!(overlap(100, 100, 0, 100), Overlap::Inside);
        assert_eq!(overlap(0, 10, 5, 5), Overlap::Encloses);
        assert_eq!(overlap(5, 10, 5, 5), Overlap::Outside);
        assert_eq!(overlap(0, 5, 5, 5), Overlap::Outside);
    }
}
