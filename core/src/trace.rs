use crate::error::Result;
use serde::{Deserialize, Deserializer, Serialize};

/// Tag key carrying the OpenTelemetry span kind in Jaeger-shaped spans.
pub const SPAN_KIND_TAG: &str = "span.kind";

/// Relationship between a span and the span it references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefType {
    ChildOf,     // parent waits on the child
    FollowsFrom, // causally related, no ordering guarantee
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanKind {
    #[default]
    Unspecified,
    Server,
    Client,
    Producer,
    Consumer,
    Internal,
}

impl SpanKind {
    /// Parse a kind name case-insensitively. Unknown names are `Unspecified`.
    pub fn from_tag(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "SERVER" => SpanKind::Server,
            "CLIENT" => SpanKind::Client,
            "PRODUCER" => SpanKind::Producer,
            "CONSUMER" => SpanKind::Consumer,
            "INTERNAL" => SpanKind::Internal,
            _ => SpanKind::Unspecified,
        }
    }
}

impl<'de> Deserialize<'de> for SpanKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(SpanKind::from_tag(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanReference {
    #[serde(rename = "refType")]
    pub ref_type: RefType,
    #[serde(rename = "traceID", default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(rename = "spanID")]
    pub span_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// A span as supplied by the caller, before any tree processing.
///
/// Accepts both Jaeger's query-API shape (`references`, `span.kind` tag) and
/// a flat shape carrying `parentSpanID` and `kind` directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSpan {
    #[serde(rename = "spanID")]
    pub span_id: String,
    #[serde(rename = "traceID", default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(rename = "operationName", default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<SpanReference>,
    #[serde(rename = "parentSpanID", default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    #[serde(rename = "startTime")]
    pub start_time: i64,
    pub duration: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SpanKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<KeyValue>,
}

impl RawSpan {
    pub fn new(span_id: impl Into<String>, start_time: i64, duration: i64) -> Self {
        Self {
            span_id: span_id.into(),
            trace_id: None,
            operation_name: None,
            references: Vec::new(),
            parent_span_id: None,
            start_time,
            duration,
            kind: None,
            tags: Vec::new(),
        }
    }

    pub fn child_of(self, parent: impl Into<String>) -> Self {
        self.with_reference(RefType::ChildOf, parent)
    }

    pub fn follows_from(self, parent: impl Into<String>) -> Self {
        self.with_reference(RefType::FollowsFrom, parent)
    }

    pub fn with_reference(mut self, ref_type: RefType, span_id: impl Into<String>) -> Self {
        self.references.push(SpanReference {
            ref_type,
            trace_id: self.trace_id.clone(),
            span_id: span_id.into(),
        });
        self
    }

    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_operation(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// The structural parent and how it is referenced.
    ///
    /// The first `CHILD_OF` reference wins, then the first reference of any
    /// type, then the flat `parentSpanID` field (treated as `CHILD_OF`).
    pub fn parent_reference(&self) -> Option<(&str, RefType)> {
        self.references
            .iter()
            .find(|r| r.ref_type == RefType::ChildOf)
            .or_else(|| self.references.first())
            .map(|r| (r.span_id.as_str(), r.ref_type))
            .or_else(|| {
                self.parent_span_id
                    .as_deref()
                    .map(|id| (id, RefType::ChildOf))
            })
    }

    /// Explicit kind, falling back to the `span.kind` tag.
    pub fn span_kind(&self) -> SpanKind {
        if let Some(kind) = self.kind {
            return kind;
        }
        self.tags
            .iter()
            .find(|tag| tag.key == SPAN_KIND_TAG)
            .and_then(|tag| tag.value.as_str())
            .map(SpanKind::from_tag)
            .unwrap_or_default()
    }
}

/// One trace: an identifier and its spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(rename = "traceID", default)]
    pub trace_id: String,
    pub spans: Vec<RawSpan>,
}

impl Trace {
    pub fn new(trace_id: impl Into<String>, spans: Vec<RawSpan>) -> Self {
        Self {
            trace_id: trace_id.into(),
            spans,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TraceDocument {
    Envelope { data: Vec<Trace> },
    Single(Trace),
    Spans(Vec<RawSpan>),
}

/// Parse every trace contained in a JSON document.
///
/// Understands the Jaeger query-API envelope (`{"data": [...]}`), a single
/// trace object and a bare span array.
pub fn load_traces(json: &str) -> Result<Vec<Trace>> {
    let document: TraceDocument = serde_json::from_str(json)?;
    let traces = match document {
        TraceDocument::Envelope { data } => data,
        TraceDocument::Single(trace) => vec![trace],
        TraceDocument::Spans(spans) => {
            let trace_id = spans
                .iter()
                .find_map(|span| span.trace_id.clone())
                .unwrap_or_default();
            vec![Trace::new(trace_id, spans)]
        }
    };
    Ok(traces)
}
