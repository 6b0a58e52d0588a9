mod common;

use common::{FakeDetector, FakeGenerator, FakeNotifier, FakeRenderer, MemoryStorage, label};
use damage_check::{
    config::Config,
    notify::{NotificationOrchestrator, email_body},
    pipeline::Pipeline,
    report::ProcessingResult,
};
use std::sync::Arc;

const SRC: &str = "incoming";
const DST: &str = "processed";

fn orchestrator(
    storage: Arc<MemoryStorage>,
    notifier: Arc<FakeNotifier>,
    pdf: bool,
) -> NotificationOrchestrator {
    let cfg = Config::default();
    let mut pipeline = Pipeline::new(
        &cfg,
        storage,
        Arc::new(FakeDetector::returning(vec![
            label("Scratch", 88.0),
            label("Car", 95.0),
        ])),
        Arc::new(FakeGenerator::default()),
    );
    if pdf {
        pipeline = pipeline.with_renderer(Arc::new(FakeRenderer::default()));
    }
    NotificationOrchestrator::new(&cfg, pipeline, notifier, DST)
}

#[test]
fn sends_one_email_per_result_with_attachment() {
    let storage = Arc::new(MemoryStorage::with_images(SRC, &["a.jpg", "b.jpeg", "c.gif"]));
    let notifier = Arc::new(FakeNotifier::default());
    let out = orchestrator(storage, notifier.clone(), true).process_and_notify(SRC, "owner@example.com");

    assert_eq!(out.batch.results.len(), 2);
    assert_eq!(out.deliveries.len(), 2);
    assert!(out.deliveries.iter().all(|d| d.sent));

    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent[0].to, "owner@example.com");
    assert_eq!(sent[0].from, "reports@example.com");
    assert_eq!(sent[0].subject, "Damage Report for a.jpg");
    let att = sent[0].attachment.as_ref().expect("attachment");
    assert!(att.filename.starts_with("a.jpg_"));
    assert!(att.filename.ends_with(".pdf"));
    assert_eq!(att.content_type, "application/pdf");
    assert!(att.data.starts_with(b"%PDF"));
}

#[test]
fn missing_report_sends_without_attachment() {
    let mut storage = MemoryStorage::with_images(SRC, &["a.jpg"]);
    storage.fail_put = true;
    let notifier = Arc::new(FakeNotifier::default());
    let out = orchestrator(Arc::new(storage), notifier.clone(), false)
        .process_and_notify(SRC, "owner@example.com");

    assert_eq!(out.deliveries.len(), 1);
    assert!(out.deliveries[0].sent);
    assert!(out.deliveries[0].attached.is_none());
    assert!(notifier.sent.lock().unwrap()[0].attachment.is_none());
}

#[test]
fn a_failed_send_does_not_stop_the_rest() {
    let storage = Arc::new(MemoryStorage::with_images(SRC, &["a.jpg", "b.jpg", "c.jpg"]));
    let notifier = Arc::new(FakeNotifier {
        fail_subjects_containing: Some("b.jpg".into()),
        ..Default::default()
    });
    let out = orchestrator(storage, notifier.clone(), false).process_and_notify(SRC, "x@example.com");

    let sent: Vec<bool> = out.deliveries.iter().map(|d| d.sent).collect();
    assert_eq!(sent, vec![true, false, true]);
    assert!(out.deliveries[1].error.is_some());
    assert_eq!(notifier.sent.lock().unwrap().len(), 2);
}

#[test]
fn email_body_lists_labels_and_escapes_report() {
    let result = ProcessingResult {
        source_key: "home.jpg".into(),
        damage_labels: vec![label("Crack", 80.0), label("Rust", 75.0)],
        report: "Cost < $500 & easy".into(),
    };
    let html = email_body(&result);
    assert!(html.contains("<strong>Image:</strong> home.jpg"));
    assert!(html.contains("<strong>Damage Labels:</strong> Crack, Rust"));
    assert!(html.contains("Cost &lt; $500 &amp; easy"));
}
