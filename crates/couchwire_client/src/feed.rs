//! Continuous change feed subscription.
//!
//! [`Database::subscribe`] spawns one task that owns the `_changes`
//! response body and the sending half of a bounded channel. The task
//! decodes records as chunks arrive and delivers them in server order.
//!
//! The feed ends exactly once, for one of three reasons:
//!
//! - the cancellation token fires or the [`Feed`] is dropped
//!   ([`FeedEnd::Cancelled`])
//! - the server closes the stream on a record boundary
//!   ([`FeedEnd::Completed`])
//! - a request, transport or decode error occurs ([`FeedEnd::Failed`])
//!
//! Either way the body is closed and the channel is closed, and the
//! terminal error (if any) is recorded before the channel closes.

use crate::database::Database;
use crate::error::{ApiError, Error};
use crate::http::Request;
use couchwire_protocol::{Change, ChangeDecoder, FeedRecord};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use reqwest::Method;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Kind of change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedType {
    /// One long-lived response with a record per change.
    #[default]
    Continuous,
}

impl FeedType {
    /// Returns the value of the `feed` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedType::Continuous => "continuous",
        }
    }
}

/// Options for [`Database::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOptions {
    /// Feed kind.
    pub feed: FeedType,
    /// Only report changes after this sequence. 0 means from the start.
    pub since: u64,
    /// How long the server keeps an idle feed open before closing it.
    pub timeout: Duration,
    /// Interval of the server's keep-alive newlines.
    pub heartbeat: Duration,
    /// Embed the changed documents in the records.
    pub include_docs: bool,
    /// Capacity of the delivery channel.
    pub buffer: usize,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            feed: FeedType::Continuous,
            since: 0,
            timeout: Duration::from_secs(60),
            heartbeat: Duration::from_secs(10),
            include_docs: false,
            buffer: 16,
        }
    }
}

impl FeedOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts after `since`.
    pub fn since(mut self, since: u64) -> Self {
        self.since = since;
        self
    }

    /// Sets the server-side idle timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the heartbeat interval.
    pub fn heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Embeds documents in the records.
    pub fn include_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = include_docs;
        self
    }

    /// Sets the channel capacity. At least 1.
    pub fn buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    fn apply(&self, mut request: Request) -> Request {
        request = request
            .query("feed", self.feed.as_str())
            .query("timeout", self.timeout.as_millis())
            .query("heartbeat", self.heartbeat.as_millis());
        if self.since != 0 {
            request = request.query("since", self.since);
        }
        if self.include_docs {
            request = request.query("include_docs", "true");
        }
        request.streaming()
    }
}

/// Why a feed stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEnd {
    /// The server closed the stream.
    Completed,
    /// The feed failed; see [`Feed::error`].
    Failed,
    /// The feed was cancelled.
    Cancelled,
}

/// Lifecycle of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// The request has not been answered yet.
    Starting,
    /// Records are being delivered.
    Streaming,
    /// The feed is over.
    Closed(FeedEnd),
}

#[derive(Debug)]
struct FeedStatus {
    state: FeedState,
    error: Option<Error>,
    last_seq: Option<u64>,
}

/// A live change feed.
///
/// Read changes with [`recv`](Self::recv) or as a [`Stream`]. When either
/// yields `None` the feed is closed and [`error`](Self::error) tells
/// whether it failed. Once cancelled, no further change is yielded, even one
/// already buffered. Dropping the feed cancels it.
#[derive(Debug)]
pub struct Feed {
    receiver: mpsc::Receiver<Change>,
    status: Arc<Mutex<FeedStatus>>,
    cancel: CancellationToken,
}

impl Feed {
    /// Receives the next change. `None` once the feed is closed and every
    /// buffered change has been read, or as soon as it is cancelled.
    pub async fn recv(&mut self) -> Option<Change> {
        std::future::poll_fn(|cx| self.poll_recv(cx)).await
    }

    /// Polls for the next change.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Change>> {
        if !self.cancel.is_cancelled() {
            match self.receiver.poll_recv(cx) {
                Poll::Ready(Some(_)) if self.cancel.is_cancelled() => {}
                other => return other,
            }
        }
        // Cancelled: discard the backlog and wait for the worker to record
        // its end state and close the channel.
        while ready!(self.receiver.poll_recv(cx)).is_some() {}
        Poll::Ready(None)
    }

    /// Returns the terminal error, if the feed failed.
    pub fn error(&self) -> Option<Error> {
        self.status.lock().error.clone()
    }

    /// Returns the current state.
    pub fn state(&self) -> FeedState {
        self.status.lock().state
    }

    /// Returns the last sequence seen: the server's closing `last_seq` if
    /// it sent one, otherwise the sequence of the last delivered change.
    ///
    /// Pass it as [`FeedOptions::since`] to resume.
    pub fn last_seq(&self) -> Option<u64> {
        self.status.lock().last_seq
    }

    /// Stops the feed. Buffered changes are discarded and the next read
    /// yields `None`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Stream for Feed {
    type Item = Change;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Change>> {
        self.poll_recv(cx)
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Database {
    /// Subscribes to the database's change feed.
    ///
    /// Returns immediately; the request is made by a background task. The
    /// feed stops when `cancel` fires, when the returned [`Feed`] is
    /// dropped, or when the stream ends.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(&self, cancel: &CancellationToken, options: FeedOptions) -> Feed {
        let (sender, receiver) = mpsc::channel(options.buffer.max(1));
        let status = Arc::new(Mutex::new(FeedStatus {
            state: FeedState::Starting,
            error: None,
            last_seq: None,
        }));
        let cancel = cancel.child_token();

        let worker = FeedWorker {
            db: self.clone(),
            options,
            sender,
            status: status.clone(),
            cancel: cancel.clone(),
        };
        tokio::spawn(worker.run());

        Feed {
            receiver,
            status,
            cancel,
        }
    }
}

enum Exit {
    Completed,
    Failed(Error),
    Cancelled,
}

struct FeedWorker {
    db: Database,
    options: FeedOptions,
    sender: mpsc::Sender<Change>,
    status: Arc<Mutex<FeedStatus>>,
    cancel: CancellationToken,
}

impl FeedWorker {
    async fn run(self) {
        debug!(db = %self.db.name(), since = self.options.since, "change feed starting");

        let (end, error) = match self.stream().await {
            Exit::Completed => (FeedEnd::Completed, None),
            Exit::Failed(err) => (FeedEnd::Failed, Some(err)),
            Exit::Cancelled => (FeedEnd::Cancelled, None),
        };

        match &error {
            Some(err) => warn!(db = %self.db.name(), error = %err, "change feed failed"),
            None => debug!(db = %self.db.name(), end = ?end, "change feed closed"),
        }

        {
            let mut status = self.status.lock();
            status.state = FeedState::Closed(end);
            status.error = error;
        }
        // Dropping self closes the channel.
    }

    async fn stream(&self) -> Exit {
        let request = self
            .options
            .apply(self.db.request(Method::GET).segment("_changes"));

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Exit::Cancelled,
            response = self.db.send(request, &[200]) => response,
        };
        let response = match response {
            Ok(response) => response,
            Err(err) => return Exit::Failed(err),
        };
        let status = response.status.as_u16();

        self.status.lock().state = FeedState::Streaming;
        debug!(db = %self.db.name(), "change feed streaming");

        let mut body = response.body.into_stream();
        let mut decoder = ChangeDecoder::new();
        loop {
            loop {
                match decoder.next_record() {
                    Ok(Some(FeedRecord::Change(change))) => {
                        let seq = change.seq;
                        tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => return Exit::Cancelled,
                            sent = self.sender.send(change) => {
                                if sent.is_err() {
                                    return Exit::Cancelled;
                                }
                            }
                        }
                        self.status.lock().last_seq = Some(seq);
                    }
                    Ok(Some(FeedRecord::LastSeq(seq))) => {
                        self.status.lock().last_seq = Some(seq);
                    }
                    Ok(Some(FeedRecord::Error { response, raw })) => {
                        return Exit::Failed(Error::Api(ApiError::new(status, response, raw)));
                    }
                    Ok(None) => break,
                    Err(err) => return Exit::Failed(err.into()),
                }
            }

            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Exit::Cancelled,
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => decoder.push(&bytes),
                Some(Err(err)) => return Exit::Failed(err),
                None => {
                    return match decoder.finish() {
                        Ok(()) => Exit::Completed,
                        Err(err) => Exit::Failed(err.into()),
                    }
                }
            }
        }
    }
}
