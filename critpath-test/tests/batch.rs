use anyhow::Result;
use critpath::{analyze_file, analyze_files, report, Session};
use critpath_core::{BlockingPolicy, Config, CriticalPathCache};
use critpath_test::fixtures::{checkout_fixture, jaeger_document, wide_trace, write_temp_file};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_reports_follow_argument_order() -> Result<()> {
    let fixture = checkout_fixture();
    let checkout = write_temp_file("order-checkout.json", &jaeger_document(&[fixture.trace]))?;
    let wide = write_temp_file("order-wide.json", &jaeger_document(&[wide_trace(50)]))?;
    let missing = PathBuf::from("/nonexistent/critpath/trace.json");

    let session = Arc::new(Session::new(&Config::default()));
    let reports = analyze_files(
        Arc::clone(&session),
        vec![wide.clone(), missing, checkout.clone()],
    )
    .await;

    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].file, wide.display().to_string());
    assert_eq!(reports[0].critical_paths[0].trace_id, "wide");
    assert!(!reports[1].is_ok());
    assert!(reports[1]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("Failed to read trace file")));
    assert_eq!(
        reports[2].critical_paths[0].sections,
        fixture.expected_sections
    );
    assert_eq!(session.cache().map(CriticalPathCache::len), Some(2));

    let json: serde_json::Value = serde_json::from_str(&report::reports_to_json(&reports)?)?;
    assert_eq!(json[2]["critical_paths"][0]["root_span_id"], "frontend");
    assert!(json[0].get("error").is_none());

    std::fs::remove_file(checkout)?;
    std::fs::remove_file(wide)?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unparseable_file_does_not_stop_the_batch() -> Result<()> {
    let broken = write_temp_file("broken.json", "{\"data\": [")?;
    let good = write_temp_file("good.json", &jaeger_document(&[wide_trace(5)]))?;

    let session = Arc::new(Session::with_policy(
        &Config::default(),
        Some(BlockingPolicy::References),
    ));
    let reports = analyze_files(session, vec![broken.clone(), good.clone()]).await;

    assert!(reports[0]
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("Failed to analyze")));
    assert!(reports[1].is_ok());
    assert_eq!(reports[1].critical_paths[0].policy, BlockingPolicy::References);

    let text = report::render_reports(&reports);
    assert!(text.contains("  error: Failed to analyze"));
    assert!(text.contains("Trace wide (root root, policy references, 0 spans dropped)"));

    std::fs::remove_file(broken)?;
    std::fs::remove_file(good)?;
    Ok(())
}

#[test]
fn shared_session_is_deterministic_across_threads() -> Result<()> {
    let fixture = checkout_fixture();
    let path = write_temp_file("threads.json", &jaeger_document(&[fixture.trace.clone()]))?;
    let session = Session::new(&Config::default());
    let expected = analyze_file(&session, &path)?;

    std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| analyze_file(&session, &path)))
            .collect();
        for worker in workers {
            let paths = worker
                .join()
                .map_err(|_| anyhow::anyhow!("worker panicked"))??;
            assert_eq!(paths, expected);
        }
        Ok::<_, anyhow::Error>(())
    })?;

    assert_eq!(expected[0].sections, fixture.expected_sections);
    std::fs::remove_file(path)?;
    Ok(())
}

#[test]
fn cache_recomputes_when_a_trace_changes() -> Result<()> {
    let session = Session::new(&Config::default());
    let fixture = checkout_fixture();
    let first = session.analyze(&fixture.trace)?;

    let mut edited = fixture.trace.clone();
    edited.spans.retain(|span| span.span_id != "auth");
    let second = session.analyze(&edited)?;

    assert_ne!(first, second);
    assert!(!second.span_ids().contains("auth"));
    assert_eq!(session.cache().map(CriticalPathCache::len), Some(1));
    Ok(())
}
