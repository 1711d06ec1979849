use crate::graph::{CPSpan, SpanMap};
use crate::trace::{RefType, SpanKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Rule deciding whether a child's work delays its parent's completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingPolicy {
    /// `Combined` when any span carries a span kind, `References` otherwise.
    #[default]
    Auto,
    /// Only `FOLLOWS_FROM` references are non-blocking.
    References,
    /// Only producer -> consumer hand-offs are non-blocking.
    SpanKinds,
    /// Both of the above.
    Combined,
}

impl BlockingPolicy {
    /// Pick the concrete rule for the metadata present in `map`.
    pub fn resolve(self, map: &SpanMap) -> Self {
        match self {
            BlockingPolicy::Auto => {
                if map.iter().any(|span| span.kind != SpanKind::Unspecified) {
                    BlockingPolicy::Combined
                } else {
                    BlockingPolicy::References
                }
            }
            other => other,
        }
    }

    pub fn is_blocking(self, parent: &CPSpan, child: &CPSpan) -> bool {
        let follows_from = child.ref_type == Some(RefType::FollowsFrom);
        let async_handoff = parent.kind == SpanKind::Producer && child.kind == SpanKind::Consumer;

        match self {
            BlockingPolicy::References => !follows_from,
            BlockingPolicy::SpanKinds => !async_handoff,
            BlockingPolicy::Combined | BlockingPolicy::Auto => !(follows_from || async_handoff),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlockingPolicy::Auto => "auto",
            BlockingPolicy::References => "references",
            BlockingPolicy::SpanKinds => "span_kinds",
            BlockingPolicy::Combined => "combined",
        }
    }
}

impl fmt::Display for BlockingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "auto" => Ok(BlockingPolicy::Auto),
            "references" => Ok(BlockingPolicy::References),
            "span_kinds" => Ok(BlockingPolicy::SpanKinds),
            "combined" => Ok(BlockingPolicy::Combined),
            other => Err(format!("unknown blocking policy: {}", other)),
        }
    }
}

/// Set `is_blocking` on every span according to the edge from its parent.
/// Spans without a parent in the map stay blocking.
pub fn mark_blocking(mut map: SpanMap, policy: BlockingPolicy) -> SpanMap {
    let policy = policy.resolve(&map);

    let non_blocking: Vec<String> = map
        .iter()
        .filter(|span| {
            map.parent_of(&span.span_id)
                .is_some_and(|parent| !policy.is_blocking(parent, span))
        })
        .map(|span| span.span_id.clone())
        .collect();

    for span_id in &non_blocking {
        if let Some(span) = map.get_mut(span_id) {
            span.is_blocking = false;
        }
    }
    map
}

/// Remove every non-blocking span together with its whole subtree.
pub fn classify(map: SpanMap, policy: BlockingPolicy) -> SpanMap {
    let policy = policy.resolve(&map);
    let mut map = mark_blocking(map, policy);

    let non_blocking: Vec<String> = map
        .iter()
        .filter(|span| !span.is_blocking)
        .map(|span| span.span_id.clone())
        .collect();

    let removed = map.remove_subtrees(&non_blocking);

    debug!(
        policy = %policy,
        non_blocking_edges = non_blocking.len(),
        removed,
        "classified blocking spans"
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::RawSpan;

    fn build(spans: &[RawSpan]) -> SpanMap {
        SpanMap::build(spans).unwrap()
    }

    #[test]
    fn producer_consumer_subtree_removed() {
        let map = classify(
            build(&[
                RawSpan::new("producer", 0, 100).with_kind(SpanKind::Producer),
                RawSpan::new("consumer", 20, 200)
                    .child_of("producer")
                    .with_kind(SpanKind::Consumer),
                RawSpan::new("handler", 30, 50).child_of("consumer"),
            ]),
            BlockingPolicy::Auto,
        );

        assert_eq!(map.len(), 1);
        assert!(map.get("producer").unwrap().child_span_ids.is_empty());
        assert!(!map.contains("consumer"));
        assert!(!map.contains("handler"));
    }

    #[test]
    fn follows_from_subtree_removed_siblings_kept() {
        let map = classify(
            build(&[
                RawSpan::new("root", 0, 100),
                RawSpan::new("sync", 10, 20).child_of("root"),
                RawSpan::new("async", 40, 90).follows_from("root"),
                RawSpan::new("async-child", 50, 10).child_of("async"),
            ]),
            BlockingPolicy::References,
        );

        assert_eq!(map.len(), 2);
        assert!(map.contains("sync"));
        assert_eq!(map.get("root").unwrap().child_span_ids, vec!["sync".to_string()]);
    }

    #[test]
    fn root_kept_regardless_of_kind() {
        let map = classify(
            build(&[RawSpan::new("root", 0, 10)
                .with_kind(SpanKind::Consumer)
                .follows_from("elsewhere")]),
            BlockingPolicy::Combined,
        );
        assert!(map.contains("root"));
    }

    #[test]
    fn policies_apply_only_their_rule() {
        let spans = [
            RawSpan::new("p", 0, 100).with_kind(SpanKind::Producer),
            RawSpan::new("c", 10, 10)
                .child_of("p")
                .with_kind(SpanKind::Consumer),
            RawSpan::new("f", 30, 10).follows_from("p"),
        ];

        let references = classify(build(&spans), BlockingPolicy::References);
        assert!(references.contains("c"));
        assert!(!references.contains("f"));

        let kinds = classify(build(&spans), BlockingPolicy::SpanKinds);
        assert!(!kinds.contains("c"));
        assert!(kinds.contains("f"));

        let combined = classify(build(&spans), BlockingPolicy::Combined);
        assert_eq!(combined.len(), 1);
    }

    #[test]
    fn auto_resolution_depends_on_kinds() {
        let plain = build(&[RawSpan::new("a", 0, 1)]);
        assert_eq!(BlockingPolicy::Auto.resolve(&plain), BlockingPolicy::References);

        let kinded = build(&[RawSpan::new("a", 0, 1).with_kind(SpanKind::Server)]);
        assert_eq!(BlockingPolicy::Auto.resolve(&kinded), BlockingPolicy::Combined);
    }

    #[test]
    fn mark_blocking_keeps_spans() {
        let map = mark_blocking(
            build(&[
                RawSpan::new("root", 0, 100),
                RawSpan::new("later", 10, 20).follows_from("root"),
            ]),
            BlockingPolicy::References,
        );
        assert_eq!(map.len(), 2);
        assert!(map.get("root").unwrap().is_blocking);
        assert!(!map.get("later").unwrap().is_blocking);
    }

    #[test]
    fn classified_spans_are_all_blocking() {
        let spans = [
            RawSpan::new("root", 0, 100).with_kind(SpanKind::Producer),
            RawSpan::new("consumer", 10, 20)
                .child_of("root")
                .with_kind(SpanKind::Consumer),
            RawSpan::new("later", 10, 20).follows_from("root"),
            RawSpan::new("sync", 30, 20).child_of("root"),
        ];

        let marked = mark_blocking(build(&spans), BlockingPolicy::Combined);
        assert_eq!(marked.iter().filter(|span| !span.is_blocking).count(), 2);

        let map = classify(build(&spans), BlockingPolicy::Combined);
        assert_eq!(map.len(), 2);
        assert!(map.iter().all(|span| span.is_blocking));
    }

    #[test]
    fn policy_parses_from_str() {
        assert_eq!("span-kinds".parse::<BlockingPolicy>(), Ok(BlockingPolicy::SpanKinds));
        assert_eq!("Combined".parse::<BlockingPolicy>(), Ok(BlockingPolicy::Combined));
        assert!("bogus".parse::<BlockingPolicy>().is_err());
    }
}
