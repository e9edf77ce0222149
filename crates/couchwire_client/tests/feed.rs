//! Integration tests for change feeds against the in-memory server.

use couchwire_client::{CancellationToken, FeedEnd, FeedOptions, FeedState};
use couchwire_testkit::prelude::*;
use futures::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;

const WITHIN: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(100);

#[tokio::test]
async fn delivers_existing_changes_in_sequence_order() {
    let couch = TestCouch::new();
    let db = couch.create_database("events").await;
    scenarios::populated(&db, 3).await;

    let cancel = CancellationToken::new();
    let mut feed = db.subscribe(&cancel, FeedOptions::new());

    let mut seqs = Vec::new();
    for _ in 0..3 {
        let change = timeout(WITHIN, feed.recv()).await.unwrap().unwrap();
        seqs.push((change.seq, change.id));
    }
    assert_eq!(
        seqs,
        [
            (1, "doc-000".to_string()),
            (2, "doc-001".to_string()),
            (3, "doc-002".to_string())
        ]
    );
    assert!(timeout(QUIET, feed.recv()).await.is_err());
    assert_eq!(feed.state(), FeedState::Streaming);

    let request = couch.server.last_request().unwrap();
    assert_eq!(request.path, "/events/_changes");
    assert_eq!(request.query_value("feed"), Some("continuous"));
    assert_eq!(request.query_value("since"), None);
    assert_eq!(request.timeout, None);
}

#[tokio::test]
async fn resumes_after_since() {
    let couch = TestCouch::new();
    let db = couch.create_database("events").await;
    scenarios::populated(&db, 4).await;

    let cancel = CancellationToken::new();
    let mut feed = db.subscribe(&cancel, FeedOptions::new().since(2));
    let first = timeout(WITHIN, feed.recv()).await.unwrap().unwrap();
    let second = timeout(WITHIN, feed.recv()).await.unwrap().unwrap();
    assert_eq!((first.seq, second.seq), (3, 4));
    assert!(timeout(QUIET, feed.recv()).await.is_err());
    assert_eq!(
        couch.server.last_request().unwrap().query_value("since"),
        Some("2")
    );
}

#[tokio::test]
async fn delivers_live_writes() {
    let couch = TestCouch::new();
    let db = couch.create_database("events").await;

    let cancel = CancellationToken::new();
    let mut feed = db.subscribe(&cancel, FeedOptions::new().include_docs(true));
    assert!(couch.server.wait_for_open_streams(1, WITHIN).await);

    let rev = db.put("live", &json!({"n": 7})).await.unwrap();
    let change = timeout(WITHIN, feed.recv()).await.unwrap().unwrap();
    assert_eq!(change.id, "live");
    assert_eq!(change.rev(), Some(rev.as_str()));
    let doc: Value = change.doc_as().unwrap().unwrap();
    assert_eq!(doc["n"], json!(7));

    // Writes by another client show up too.
    couch.server.put_document("events", "other", json!({"n": 8}));
    let change = timeout(WITHIN, feed.recv()).await.unwrap().unwrap();
    assert_eq!(change.id, "other");
}

#[tokio::test]
async fn cancellation_releases_the_stream() {
    let couch = TestCouch::new();
    let db = couch.create_database("events").await;
    scenarios::populated(&db, 1).await;

    let cancel = CancellationToken::new();
    let mut feed = db.subscribe(&cancel, FeedOptions::new());
    timeout(WITHIN, feed.recv()).await.unwrap().unwrap();
    assert_eq!(couch.server.open_streams(), 1);

    cancel.cancel();
    assert!(timeout(WITHIN, feed.recv()).await.unwrap().is_none());
    assert_eq!(feed.state(), FeedState::Closed(FeedEnd::Cancelled));
    assert!(feed.error().is_none());
    assert!(couch.server.wait_for_open_streams(0, WITHIN).await);
}

#[tokio::test]
async fn cancellation_discards_buffered_changes() {
    let couch = TestCouch::new();
    let db = couch.create_database("events").await;
    scenarios::populated(&db, 5).await;

    let cancel = CancellationToken::new();
    let mut feed = db.subscribe(&cancel, FeedOptions::new());
    let first = timeout(WITHIN, feed.recv()).await.unwrap().unwrap();
    assert_eq!(first.seq, 1);

    // Let the remaining changes land in the channel.
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();

    assert!(timeout(WITHIN, feed.recv()).await.unwrap().is_none());
    assert!(feed.recv().await.is_none());
    assert_eq!(feed.state(), FeedState::Closed(FeedEnd::Cancelled));
    assert!(couch.server.wait_for_open_streams(0, WITHIN).await);
}

#[tokio::test]
async fn dropping_the_feed_cancels_it() {
    let couch = TestCouch::new();
    let db = couch.create_database("events").await;

    let cancel = CancellationToken::new();
    let feed = db.subscribe(&cancel, FeedOptions::new());
    assert!(couch.server.wait_for_open_streams(1, WITHIN).await);

    drop(feed);
    assert!(couch.server.wait_for_open_streams(0, WITHIN).await);
    assert!(!cancel.is_cancelled());
}

#[tokio::test]
async fn server_close_completes_the_feed() {
    let couch = TestCouch::new();
    let db = couch.create_database("events").await;
    scenarios::populated(&db, 2).await;

    let cancel = CancellationToken::new();
    let mut feed = db.subscribe(&cancel, FeedOptions::new());
    assert_eq!(feed.by_ref().take(2).count().await, 2);

    couch.server.close_feeds();
    assert!(timeout(WITHIN, feed.recv()).await.unwrap().is_none());
    assert_eq!(feed.state(), FeedState::Closed(FeedEnd::Completed));
    assert_eq!(feed.last_seq(), Some(2));
}

#[tokio::test]
async fn close_racing_cancel_ends_cleanly() {
    let couch = TestCouch::new();
    let db = couch.create_database("events").await;
    scenarios::populated(&db, 1).await;

    let cancel = CancellationToken::new();
    let mut feed = db.subscribe(&cancel, FeedOptions::new());
    timeout(WITHIN, feed.recv()).await.unwrap().unwrap();

    let closer = {
        let server = couch.server.clone();
        tokio::spawn(async move { server.close_feeds() })
    };
    cancel.cancel();
    closer.await.unwrap();

    assert!(timeout(WITHIN, feed.recv()).await.unwrap().is_none());
    assert!(matches!(
        feed.state(),
        FeedState::Closed(FeedEnd::Completed | FeedEnd::Cancelled)
    ));
    assert!(feed.error().is_none());
    assert!(couch.server.wait_for_open_streams(0, WITHIN).await);
}

#[tokio::test]
async fn missing_database_fails_the_feed() {
    let couch = TestCouch::new();
    let cancel = CancellationToken::new();
    let mut feed = couch
        .client
        .database("nowhere")
        .subscribe(&cancel, FeedOptions::new());

    assert!(timeout(WITHIN, feed.recv()).await.unwrap().is_none());
    assert_eq!(feed.state(), FeedState::Closed(FeedEnd::Failed));
    assert!(feed.error().unwrap().is_not_found());
}

#[tokio::test]
async fn broken_stream_fails_after_delivered_changes() {
    let couch = TestCouch::new();
    let db = couch.create_database("events").await;
    couch.server.inject_at(
        "/events/_changes",
        Fault::respond(
            CannedResponse::new(200)
                .chunk("{\"seq\":1,\"id\":\"a\",\"changes\":[{\"rev\":\"1-a\"}]}\n{\"seq\":2,")
                .end(BodyEnd::Error("connection reset".into())),
        ),
    );

    let cancel = CancellationToken::new();
    let mut feed = db.subscribe(&cancel, FeedOptions::new());
    let change = timeout(WITHIN, feed.recv()).await.unwrap().unwrap();
    assert_eq!(change.id, "a");
    assert!(timeout(WITHIN, feed.recv()).await.unwrap().is_none());

    assert_eq!(feed.state(), FeedState::Closed(FeedEnd::Failed));
    assert!(feed.error().unwrap().is_retryable());
    assert_eq!(feed.last_seq(), Some(1));
    assert!(couch.server.wait_for_open_streams(0, WITHIN).await);
}

#[tokio::test]
async fn cancel_stops_a_silent_stream() {
    let couch = TestCouch::new();
    let db = couch.create_database("events").await;
    couch.server.inject_at(
        "/events/_changes",
        Fault::respond(CannedResponse::new(200).end(BodyEnd::Hang)),
    );

    let cancel = CancellationToken::new();
    let mut feed = db.subscribe(&cancel, FeedOptions::new());
    assert!(couch.server.wait_for_open_streams(1, WITHIN).await);

    cancel.cancel();
    assert!(timeout(WITHIN, feed.recv()).await.unwrap().is_none());
    assert_eq!(feed.state(), FeedState::Closed(FeedEnd::Cancelled));
    assert!(couch.server.wait_for_open_streams(0, WITHIN).await);
}
