//! The `_changes` endpoint of [`MemoryCouch`](crate::MemoryCouch).
//!
//! A continuous feed runs as a task that writes one line per change and a
//! bare newline per heartbeat into a channel read by the response body. It
//! stops when the body is dropped, when the database goes away, or when the
//! feed times out (no heartbeat requested, or [`close_feeds`] called).
//!
//! [`close_feeds`]: crate::MemoryCouch::close_feeds

use crate::server::{json_response, Shared};
use crate::store::Reply;
use bytes::Bytes;
use couchwire_client::{Error, HttpResponse};
use futures::stream;
use serde_json::json;
use std::future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};

/// Query parameters of a `_changes` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChangesParams {
    continuous: bool,
    since: u64,
    timeout: Duration,
    heartbeat: Option<Duration>,
    include_docs: bool,
}

impl ChangesParams {
    pub(crate) fn parse(pairs: &[(String, String)]) -> Result<Self, Reply> {
        let mut params = ChangesParams {
            continuous: false,
            since: 0,
            timeout: Duration::from_secs(60),
            heartbeat: None,
            include_docs: false,
        };
        for (key, value) in pairs {
            match key.as_str() {
                "feed" => match value.as_str() {
                    "continuous" => params.continuous = true,
                    "normal" => params.continuous = false,
                    other => {
                        return Err(Reply::bad_request(&format!("unsupported feed `{}`", other)))
                    }
                },
                "since" => params.since = parse_number(key, value)?,
                "timeout" => params.timeout = Duration::from_millis(parse_number(key, value)?),
                "heartbeat" => {
                    params.heartbeat = Some(Duration::from_millis(parse_number(key, value)?))
                }
                "include_docs" => params.include_docs = value == "true",
                _ => {}
            }
        }
        Ok(params)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, Reply> {
    value
        .parse()
        .map_err(|_| Reply::bad_request(&format!("invalid `{}` value", key)))
}

pub(crate) fn respond(shared: Arc<Shared>, db: String, params: ChangesParams) -> HttpResponse {
    if !params.continuous {
        return normal(&shared, &db, &params);
    }

    let (sender, receiver) = mpsc::channel::<Bytes>(64);
    let guard = shared.stream_guard();
    tokio::spawn(run(shared, db, params, sender));

    let chunks = stream::unfold(receiver, |mut receiver| async move {
        receiver
            .recv()
            .await
            .map(|chunk| (Ok::<_, Error>(chunk), receiver))
    });
    json_response(Reply::ok(200, json!(null)), true).with_body(guard.wrap(chunks))
}

fn normal(shared: &Shared, db: &str, params: &ChangesParams) -> HttpResponse {
    let store = shared.store.lock();
    let reply = match store.changes_since(db, params.since, params.include_docs) {
        Some(changes) => {
            let last_seq = changes
                .last()
                .map(|(seq, _)| *seq)
                .unwrap_or(params.since);
            let results: Vec<_> = changes.into_iter().map(|(_, record)| record).collect();
            Reply::ok(200, json!({"results": results, "last_seq": last_seq}))
        }
        None => Reply::missing_database(),
    };
    json_response(reply, false)
}

fn line(value: &serde_json::Value) -> Bytes {
    let mut line = value.to_string();
    line.push('\n');
    Bytes::from(line)
}

async fn run(shared: Arc<Shared>, db: String, params: ChangesParams, sender: mpsc::Sender<Bytes>) {
    let mut updates = shared.updates.subscribe();
    let mut closes = shared.closes.subscribe();
    let mut last = params.since;
    let mut idle_until = Instant::now() + params.timeout;

    loop {
        updates.borrow_and_update();
        let batch = shared
            .store
            .lock()
            .changes_since(&db, last, params.include_docs);
        let Some(batch) = batch else {
            let error = json!({"error": "not_found", "reason": "Database does not exist."});
            let _ = sender.send(line(&error)).await;
            return;
        };

        if !batch.is_empty() {
            idle_until = Instant::now() + params.timeout;
        }
        for (seq, record) in batch {
            if sender.send(line(&record)).await.is_err() {
                return;
            }
            last = seq;
        }

        let heartbeat = async {
            match params.heartbeat {
                Some(interval) => sleep(interval).await,
                None => future::pending().await,
            }
        };
        // A heartbeat keeps the feed open forever, as on a real server.
        let timeout = async {
            match params.heartbeat {
                Some(_) => future::pending().await,
                None => sleep_until(idle_until).await,
            }
        };

        tokio::select! {
            _ = sender.closed() => return,
            changed = updates.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = closes.changed() => {
                let _ = sender.send(line(&json!({"last_seq": last}))).await;
                return;
            }
            _ = heartbeat => {
                if sender.send(Bytes::from_static(b"\n")).await.is_err() {
                    return;
                }
            }
            _ = timeout => {
                let _ = sender.send(line(&json!({"last_seq": last}))).await;
                return;
            }
        }
    }
}
