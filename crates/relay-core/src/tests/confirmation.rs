//! Confirmation handling and acknowledgement rules.

use super::harness::{test_config, MockSource, TestRelay, WAIT};
use crate::{ConfirmationEvent, ConfirmationListener, ConfirmationOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

fn listener(relay: &TestRelay, source: &Arc<MockSource>) -> ConfirmationListener {
    ConfirmationListener::new(relay.service.clone(), source.clone(), &test_config())
}

fn event(receipt: &str, data: &str) -> ConfirmationEvent {
    ConfirmationEvent {
        receipt: receipt.to_string(),
        data: data.as_bytes().to_vec(),
    }
}

#[tokio::test]
async fn matching_confirmation_marks_processed_and_acks() {
    let relay = TestRelay::new();
    let source = Arc::new(MockSource::new());
    let id = Uuid::new_v4();

    let data = format!(r#"{{"id":"{id}","instance":"test-relay"}}"#);
    let outcome = listener(&relay, &source).handle(event("1-0", &data)).await;

    assert_eq!(outcome, ConfirmationOutcome::Confirmed(id));
    assert_eq!(relay.repository.processed(), vec![id]);
    assert_eq!(source.acked(), vec!["1-0".to_string()]);
}

#[tokio::test]
async fn foreign_confirmation_is_acked_without_update() {
    let relay = TestRelay::new();
    let source = Arc::new(MockSource::new());

    let data = format!(r#"{{"id":"{}","instance":"someone-else"}}"#, Uuid::new_v4());
    let outcome = listener(&relay, &source).handle(event("2-0", &data)).await;

    assert_eq!(outcome, ConfirmationOutcome::Foreign);
    assert!(relay.repository.processed().is_empty());
    assert_eq!(source.acked(), vec!["2-0".to_string()]);
}

#[tokio::test]
async fn undecodable_confirmation_is_acked_and_dropped() {
    let relay = TestRelay::new();
    let source = Arc::new(MockSource::new());

    let outcome = listener(&relay, &source).handle(event("3-0", "not json")).await;

    assert_eq!(outcome, ConfirmationOutcome::Undecodable);
    assert_eq!(source.acked(), vec!["3-0".to_string()]);
}

#[tokio::test]
async fn failed_update_leaves_confirmation_pending() {
    let relay = TestRelay::new();
    relay.repository.set_fail_updates(true);
    let source = Arc::new(MockSource::new());
    let id = Uuid::new_v4();

    let data = format!(r#"{{"id":"{id}","instance":"test-relay"}}"#);
    let outcome = listener(&relay, &source).handle(event("4-0", &data)).await;

    assert_eq!(outcome, ConfirmationOutcome::Rejected(id));
    assert!(source.acked().is_empty());
    assert_eq!(source.nacked(), vec!["4-0".to_string()]);
}

#[tokio::test]
async fn listener_loop_processes_events_until_shutdown() {
    let relay = TestRelay::new();
    let source = Arc::new(MockSource::new());
    let mine = Uuid::new_v4();

    let foreign = source.push_confirmation(Uuid::new_v4(), "other-relay");
    let matching = source.push_confirmation(mine, "test-relay");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(listener(&relay, &source).run(shutdown_rx));

    tokio::time::timeout(WAIT, async {
        while source.acked().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(source.acked(), vec![foreign, matching]);
    assert_eq!(relay.repository.processed(), vec![mine]);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
}
