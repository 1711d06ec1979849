use crate::classify::{classify, BlockingPolicy};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::graph::SpanMap;
use crate::root::locate_root;
use crate::sanitize::sanitize;
use crate::trace::{RawSpan, Trace};
use crate::walker::{walk, CriticalPathSection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Critical path of one trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalPath {
    pub trace_id: String,
    pub root_span_id: Option<String>,
    pub policy: BlockingPolicy, // resolved, never `Auto` for a non-empty trace
    pub sections: Vec<CriticalPathSection>, // chronological
    pub trace_duration: i64,
    pub dropped_spans: usize, // non-blocking, out of range or unreachable
}

impl CriticalPath {
    fn empty(trace_id: &str, policy: BlockingPolicy, dropped_spans: usize) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            root_span_id: None,
            policy,
            sections: Vec::new(),
            trace_duration: 0,
            dropped_spans,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Ids of every span with at least one section on the path.
    pub fn span_ids(&self) -> BTreeSet<&str> {
        self.sections.iter().map(|s| s.span_id.as_str()).collect()
    }

    /// Time attributed to `span_id` across all of its sections.
    pub fn self_time(&self, span_id: &str) -> i64 {
        self.sections
            .iter()
            .filter(|s| s.span_id == span_id)
            .map(CriticalPathSection::duration)
            .sum()
    }

    /// Sum of all section lengths.
    pub fn critical_duration(&self) -> i64 {
        self.sections.iter().map(CriticalPathSection::duration).sum()
    }

    /// Share of the root span's duration covered by the path, in percent.
    pub fn percentage_of_total(&self) -> f64 {
        if self.trace_duration == 0 {
            return 0.0;
        }
        self.critical_duration() as f64 / self.trace_duration as f64 * 100.0
    }

    pub fn start_time(&self) -> Option<i64> {
        self.sections.first().map(|s| s.section_start)
    }

    pub fn end_time(&self) -> Option<i64> {
        self.sections.last().map(|s| s.section_end)
    }
}

/// Runs the full pipeline: build, classify, sanitize, locate root, walk.
///
/// Holds no per-trace state, so one analyzer can serve many threads; every
/// call builds and owns its own span map.
#[derive(Debug, Clone, Default)]
pub struct CriticalPathAnalyzer {
    config: AnalysisConfig,
}

impl CriticalPathAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn analyze(&self, spans: &[RawSpan]) -> Result<CriticalPath> {
        self.run("", spans)
    }

    pub fn analyze_trace(&self, trace: &Trace) -> Result<CriticalPath> {
        self.run(&trace.trace_id, &trace.spans)
    }

    fn run(&self, trace_id: &str, spans: &[RawSpan]) -> Result<CriticalPath> {
        let span_map = SpanMap::build(spans)?;
        let policy = self.config.blocking_policy.resolve(&span_map);
        let span_map = sanitize(classify(span_map, policy));

        let Some(root) = locate_root(&span_map) else {
            return Ok(CriticalPath::empty(trace_id, policy, spans.len()));
        };

        let (span_map, unreachable) = span_map.retain_reachable(&root);
        if unreachable > 0 {
            warn!(
                trace_id,
                root = %root,
                unreachable,
                "spans not connected to the trace root were ignored"
            );
        }

        let sections = walk(&span_map, &root)?;
        let trace_duration = span_map.get(&root).map_or(0, |span| span.duration);

        debug!(
            trace_id,
            spans = spans.len(),
            kept = span_map.len(),
            sections = sections.len(),
            "critical path computed"
        );

        Ok(CriticalPath {
            trace_id: trace_id.to_string(),
            root_span_id: Some(root),
            policy,
            sections,
            trace_duration,
            dropped_spans: spans.len() - span_map.len(),
        })
    }
}

/// Critical path of `trace` using `policy`.
pub fn critical_path_for_trace(trace: &Trace, policy: BlockingPolicy) -> Result<CriticalPath> {
    CriticalPathAnalyzer::new(AnalysisConfig {
        blocking_policy: policy,
    })
    .analyze_trace(trace)
}
