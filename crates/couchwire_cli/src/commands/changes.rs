//! Changes command: prints one JSON line per change until Ctrl-C or the
//! server closes the feed.

use super::CommandResult;
use couchwire_client::{CancellationToken, Database, FeedOptions};
use std::time::Duration;
use tracing::{info, warn};

/// Follows the change feed of `db`.
pub async fn run(
    db: &Database,
    since: u64,
    include_docs: bool,
    heartbeat: Duration,
) -> CommandResult {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, closing feed");
                cancel.cancel();
            }
        });
    }

    let options = FeedOptions::new()
        .since(since)
        .include_docs(include_docs)
        .heartbeat(heartbeat);
    let mut feed = db.subscribe(&cancel, options);

    while let Some(change) = feed.recv().await {
        println!("{}", serde_json::to_string(&change)?);
    }

    if let Some(seq) = feed.last_seq() {
        info!(last_seq = seq, "feed closed");
    }
    match feed.error() {
        Some(err) => {
            warn!(error = %err, "feed failed");
            Err(err.into())
        }
        None => Ok(()),
    }
}
