//! AI extraction flow

mod support;

use sightline_e2e::E2eError;
use support::{FakeDriver, Harness, Reply, StubVision};

#[tokio::test(start_paused = true)]
async fn extracts_tagged_value() {
    let h = Harness::new(
        FakeDriver::new(),
        StubVision::always(Reply::Text(
            "<reasoning>Total in summary</reasoning><extracted_value>42</extracted_value>".into(),
        )),
    );

    let value = h
        .session
        .extract_action("total", "The order total in the summary box")
        .await
        .unwrap();

    assert_eq!(value, "42");
    assert_eq!(h.vision.calls(), 1);

    let steps = h.step_descriptions();
    assert_eq!(steps.len(), 1);
    assert!(steps[0].contains("42"));
    assert_eq!(steps[0], "Extracted Variable 'total' as '42'");
    assert_eq!(h.tracker.attachments().len(), 1);

    let request = &h.vision.requests()[0];
    assert_eq!(request.temperature, Some(0.0));
    let user = request.messages[1].content.text();
    assert!(user.contains("Variable to extract: \"total\""));
    assert!(user.contains("The order total in the summary box"));
}

#[tokio::test(start_paused = true)]
async fn wait_then_value() {
    let h = Harness::new(
        FakeDriver::new(),
        StubVision::scripted(
            vec![Reply::Text("<wait/>".into()), Reply::Text("<wait />".into())],
            Reply::Text("<extracted_value>ORD-991</extracted_value>".into()),
        ),
    );

    let value = h.session.ai_extract("order_id", "Order number").await.unwrap();
    assert_eq!(value, "ORD-991");
    assert_eq!(h.vision.calls(), 3);
    assert_eq!(h.screenshots_on_disk(), 1);
}

#[tokio::test(start_paused = true)]
async fn untagged_response_is_stripped() {
    let h = Harness::new(
        FakeDriver::new(),
        StubVision::always(Reply::Text("<reasoning></reasoning> jane@example.test ".into())),
    );

    let value = h.session.ai_extract("email", "Account email").await.unwrap();
    assert_eq!(value, "jane@example.test");
}

#[tokio::test(start_paused = true)]
async fn endless_loading_is_fatal() {
    let h = Harness::new(FakeDriver::new(), StubVision::always(Reply::Text("<wait/>".into())));

    let err = h.session.ai_extract("total", "Order total").await.unwrap_err();

    match &err {
        E2eError::ExtractionStalled { variable, attempts } => {
            assert_eq!(variable, "total");
            assert_eq!(*attempts, 11);
        }
        other => panic!("expected ExtractionStalled, got {:?}", other),
    }
    assert_eq!(
        err.to_string(),
        "AI detected loading state for total after 11 attempts"
    );
    assert_eq!(h.vision.calls(), 11);
    assert_eq!(h.tracker.step_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn empty_response_is_fatal() {
    let h = Harness::new(FakeDriver::new(), StubVision::always(Reply::Text("<reasoning></reasoning>".into())));

    let err = h.session.ai_extract("total", "Order total").await.unwrap_err();
    assert!(matches!(err, E2eError::ExtractionUnparseable { ref variable, .. } if variable == "total"));
    assert_eq!(h.vision.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn extraction_timeouts_propagate() {
    let h = Harness::new(FakeDriver::new(), StubVision::always(Reply::Hang));

    let err = h.session.ai_extract("total", "Order total").await.unwrap_err();
    assert!(matches!(err, E2eError::AiTimeout { timeout_ms: 180_000, attempts: 3 }));
    assert_eq!(h.vision.calls(), 3);
}
