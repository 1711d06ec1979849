use crate::error::{CriticalPathError, Result};
use crate::trace::{RawSpan, RefType, SpanKind};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Node of the critical path computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CPSpan {
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub ref_type: Option<RefType>, // how the parent is referenced
    pub kind: SpanKind,
    pub start_time: i64,
    pub duration: i64,
    /// Only `mark_blocking` leaves this `false`; `classify` removes such
    /// spans, so every span it hands on is blocking.
    pub is_blocking: bool,
    pub child_span_ids: Vec<String>, // latest-finishing first
}

impl CPSpan {
    pub fn end_time(&self) -> i64 {
        self.start_time.saturating_add(self.duration)
    }
}

/// Spans of one computation keyed by span id.
///
/// Parents are referenced by id only. Each pipeline stage takes the map by
/// value and hands back the transformed map, so a map is never shared
/// between stages or between computations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanMap {
    spans: BTreeMap<String, CPSpan>,
}

impl SpanMap {
    /// Build the span map from caller-supplied spans.
    ///
    /// Negative durations are clamped to zero. Duplicate ids and cyclic
    /// parent references are rejected.
    pub fn build(raw_spans: &[RawSpan]) -> Result<Self> {
        let mut spans = BTreeMap::new();

        for raw in raw_spans {
            let duration = if raw.duration < 0 {
                warn!(
                    span_id = %raw.span_id,
                    duration = raw.duration,
                    "negative span duration clamped to zero"
                );
                0
            } else {
                raw.duration
            };

            let (parent_span_id, ref_type) = match raw.parent_reference() {
                Some((parent, ref_type)) => (Some(parent.to_string()), Some(ref_type)),
                None => (None, None),
            };

            let span = CPSpan {
                span_id: raw.span_id.clone(),
                parent_span_id,
                ref_type,
                kind: raw.span_kind(),
                start_time: raw.start_time,
                duration,
                is_blocking: true,
                child_span_ids: Vec::new(),
            };

            if spans.insert(raw.span_id.clone(), span).is_some() {
                return Err(CriticalPathError::DuplicateSpan {
                    span_id: raw.span_id.clone(),
                });
            }
        }

        ensure_acyclic(&spans)?;

        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for span in spans.values() {
            if let Some(parent) = &span.parent_span_id {
                if spans.contains_key(parent) {
                    children
                        .entry(parent.clone())
                        .or_default()
                        .push(span.span_id.clone());
                }
            }
        }
        for (parent, ids) in children {
            if let Some(span) = spans.get_mut(&parent) {
                span.child_span_ids = ids;
            }
        }

        let mut map = Self { spans };
        map.sort_children();
        debug!(spans = map.len(), "span map built");
        Ok(map)
    }

    pub fn get(&self, span_id: &str) -> Option<&CPSpan> {
        self.spans.get(span_id)
    }

    pub(crate) fn get_mut(&mut self, span_id: &str) -> Option<&mut CPSpan> {
        self.spans.get_mut(span_id)
    }

    pub fn contains(&self, span_id: &str) -> bool {
        self.spans.contains_key(span_id)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Spans in span id order.
    pub fn iter(&self) -> impl Iterator<Item = &CPSpan> {
        self.spans.values()
    }

    /// Parent of `span_id` if it is still present in the map.
    pub fn parent_of(&self, span_id: &str) -> Option<&CPSpan> {
        self.get(span_id)
            .and_then(|span| span.parent_span_id.as_deref())
            .and_then(|parent| self.get(parent))
    }

    /// Ids of spans whose parent is absent from the map, in span id order.
    pub fn tree_roots(&self) -> Vec<String> {
        self.spans
            .values()
            .filter(|span| {
                span.parent_span_id
                    .as_deref()
                    .map_or(true, |parent| !self.contains(parent))
            })
            .map(|span| span.span_id.clone())
            .collect()
    }

    /// `span_id` and every span below it, parents before children.
    pub fn subtree(&self, span_id: &str) -> Vec<String> {
        let mut collected = Vec::new();
        let mut stack = vec![span_id.to_string()];
        while let Some(id) = stack.pop() {
            if let Some(span) = self.get(&id) {
                stack.extend(span.child_span_ids.iter().rev().cloned());
                collected.push(id);
            }
        }
        collected
    }

    /// Delete `span_id` with all of its descendants and unlink it from its
    /// parent. Returns the number of spans removed.
    pub fn remove_subtree(&mut self, span_id: &str) -> usize {
        self.remove_subtrees(&[span_id.to_string()])
    }

    /// Delete every listed span with its descendants. Ids already gone, for
    /// instance because an ancestor was listed first, are skipped. Each
    /// affected parent's child list is filtered once, however many of its
    /// children were removed.
    pub fn remove_subtrees(&mut self, span_ids: &[String]) -> usize {
        let mut parents = BTreeSet::new();
        let mut removed = 0;

        for span_id in span_ids {
            let Some(span) = self.get(span_id) else {
                continue;
            };
            if let Some(parent) = &span.parent_span_id {
                parents.insert(parent.clone());
            }
            for id in self.subtree(span_id) {
                self.spans.remove(&id);
                removed += 1;
            }
        }

        for parent in parents {
            let Some(children) = self
                .spans
                .get_mut(&parent)
                .map(|span| std::mem::take(&mut span.child_span_ids))
            else {
                continue;
            };
            let kept: Vec<String> = children
                .into_iter()
                .filter(|id| self.spans.contains_key(id))
                .collect();
            if let Some(span) = self.spans.get_mut(&parent) {
                span.child_span_ids = kept;
            }
        }
        removed
    }

    /// Keep only the spans reachable from `root`. Returns the trimmed map and
    /// how many spans were discarded.
    pub fn retain_reachable(mut self, root: &str) -> (Self, usize) {
        let reachable: BTreeSet<String> = self.subtree(root).into_iter().collect();
        let before = self.spans.len();
        self.spans.retain(|id, _| reachable.contains(id));
        let discarded = before - self.spans.len();
        (self, discarded)
    }

    /// Re-establish the `child_span_ids` ordering on every span: descending
    /// end time, ties broken by ascending span id. Ids of spans no longer in
    /// the map are dropped.
    pub(crate) fn sort_children(&mut self) {
        let end_times: HashMap<String, i64> = self
            .spans
            .values()
            .map(|span| (span.span_id.clone(), span.end_time()))
            .collect();

        for span in self.spans.values_mut() {
            span.child_span_ids.retain(|id| end_times.contains_key(id));
            span.child_span_ids
                .sort_by(|a, b| end_times[b].cmp(&end_times[a]).then_with(|| a.cmp(b)));
        }
    }
}

fn ensure_acyclic(spans: &BTreeMap<String, CPSpan>) -> Result<()> {
    let mut graph: DiGraph<&str, ()> = DiGraph::with_capacity(spans.len(), spans.len());
    let index: HashMap<&str, NodeIndex> = spans
        .keys()
        .map(|id| (id.as_str(), graph.add_node(id.as_str())))
        .collect();

    for span in spans.values() {
        let Some(parent) = span.parent_span_id.as_deref() else {
            continue;
        };
        if let (Some(&from), Some(&to)) = (index.get(parent), index.get(span.span_id.as_str())) {
            graph.add_edge(from, to, ());
        }
    }

    toposort(&graph, None)
        .map(|_| ())
        .map_err(|cycle| CriticalPathError::CyclicReference {
            span_id: graph[cycle.node_id()].to_string(),
        })
}
