use critpath_core::trace::{KeyValue, SPAN_KIND_TAG};
use critpath_core::{CriticalPathSection, RawSpan, SpanKind, Trace};
use serde::Serialize;
use std::path::PathBuf;

/// 2023-11-14T22:13:20Z in microseconds
pub const BASE_TIME: i64 = 1_700_000_000_000_000;

#[derive(Debug, Clone, Serialize)]
pub struct TraceFixture {
    pub trace: Trace,
    pub expected_sections: Vec<CriticalPathSection>,
    pub expected_dropped: usize,
}

fn span(id: &str, start: i64, duration: i64) -> RawSpan {
    let mut span = RawSpan::new(id, BASE_TIME + start, duration).with_operation(id);
    span.trace_id = Some("checkout".to_string());
    span
}

fn kind_tag(mut span: RawSpan, kind: &str) -> RawSpan {
    span.tags.push(KeyValue {
        key: SPAN_KIND_TAG.to_string(),
        value: serde_json::Value::String(kind.to_string()),
    });
    span
}

pub fn section(span_id: &str, start: i64, end: i64) -> CriticalPathSection {
    CriticalPathSection {
        span_id: span_id.to_string(),
        section_start: BASE_TIME + start,
        section_end: BASE_TIME + end,
    }
}

/// A checkout request fanning out to auth, inventory and payment, then
/// publishing a receipt that an email worker consumes asynchronously.
///
/// ```text
/// frontend        |0--------------------------------------------------1000|
/// cache-lookup      |30-60|
/// auth                |50------200|
/// inventory                        |220----------500|
/// inventory-db                         |250----450|
/// payment                                             |520--------900|
/// payment-gateway                                   |510-------880|        (skewed)
/// publish-receipt                                                    |910-950|
/// send-email (consumer)                                                 |960--1500|
/// smtp                                                                    |1000-1400|
/// audit (follows-from)    |100----------------------------------------------1200|
/// stale                                                                      |1100-1150|
/// ```
pub fn checkout_fixture() -> TraceFixture {
    let spans = vec![
        kind_tag(span("frontend", 0, 1000), "server"),
        span("cache-lookup", 30, 30).child_of("frontend"),
        kind_tag(span("auth", 50, 150).child_of("frontend"), "client"),
        kind_tag(span("inventory", 220, 280).child_of("frontend"), "client"),
        span("inventory-db", 250, 200)
            .child_of("inventory")
            .with_kind(SpanKind::Internal),
        kind_tag(span("payment", 520, 380).child_of("frontend"), "client"),
        kind_tag(span("payment-gateway", 510, 370).child_of("payment"), "server"),
        kind_tag(span("publish-receipt", 910, 40).child_of("frontend"), "producer"),
        kind_tag(span("send-email", 960, 540).child_of("publish-receipt"), "consumer"),
        span("smtp", 1000, 400).child_of("send-email"),
        span("audit", 100, 1100).follows_from("frontend"),
        span("stale", 1100, 50).child_of("frontend"),
    ];

    TraceFixture {
        trace: Trace::new("checkout", spans),
        expected_sections: vec![
            section("frontend", 0, 50),
            section("auth", 50, 200),
            section("frontend", 200, 220),
            section("inventory", 220, 250),
            section("inventory-db", 250, 450),
            section("inventory", 450, 500),
            section("frontend", 500, 520),
            section("payment-gateway", 520, 880),
            section("payment", 880, 900),
            section("frontend", 900, 910),
            section("publish-receipt", 910, 950),
            section("frontend", 950, 1000),
        ],
        expected_dropped: 4,
    }
}

/// A single chain `span-0 -> span-1 -> ...` each nested in the previous one.
pub fn deep_chain_trace(depth: usize) -> Trace {
    let depth = depth as i64;
    let spans = (0..depth)
        .map(|i| {
            let span = RawSpan::new(format!("span-{}", i), i, 2 * (depth - i));
            if i == 0 {
                span
            } else {
                span.child_of(format!("span-{}", i - 1))
            }
        })
        .collect();
    Trace::new("deep", spans)
}

/// One root with `width` sequential children, each followed by a 1µs gap.
pub fn wide_trace(width: usize) -> Trace {
    let width = width as i64;
    let mut spans = vec![RawSpan::new("root", 0, width * 10)];
    spans.extend(
        (0..width).map(|i| RawSpan::new(format!("child-{:05}", i), i * 10, 9).child_of("root")),
    );
    Trace::new("wide", spans)
}

/// Jaeger query-API envelope around `traces`.
pub fn jaeger_document(traces: &[Trace]) -> String {
    serde_json::json!({ "data": traces }).to_string()
}

/// Write `contents` to a file in the system temp directory unique to this
/// process and `name`.
pub fn write_temp_file(name: &str, contents: &str) -> std::io::Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("critpath-{}-{}", std::process::id(), name));
    std::fs::write(&path, contents)?;
    Ok(path)
}
