//! Document commands.

use super::{print_json, CommandResult};
use clap::Subcommand;
use couchwire_client::Database;
use serde_json::{json, Value};
use std::io::Read;

/// Document actions.
#[derive(Subcommand)]
pub enum DocAction {
    /// Print a document
    Get {
        /// Document ID
        id: String,
    },
    /// Store a document read from a JSON argument or stdin
    Put {
        /// Document ID
        id: String,
        /// Document body; read from stdin when omitted
        body: Option<String>,
    },
    /// Print the current revision of a document
    Rev {
        /// Document ID
        id: String,
    },
    /// Delete a document
    Delete {
        /// Document ID
        id: String,
        /// Revision to delete; the current one when omitted
        #[arg(short, long)]
        rev: Option<String>,
    },
}

/// Runs a document command.
pub async fn run(db: &Database, action: DocAction) -> CommandResult {
    match action {
        DocAction::Get { id } => {
            let doc: Value = db.get(&id).await?;
            print_json(&doc)?;
        }
        DocAction::Put { id, body } => {
            let body = match body {
                Some(body) => body,
                None => {
                    let mut buffer = String::new();
                    std::io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };
            let doc: Value = serde_json::from_str(&body)?;
            if !doc.is_object() {
                return Err("document body must be a JSON object".into());
            }
            let rev = db.put(&id, &doc).await?;
            print_json(&json!({"id": id, "rev": rev}))?;
        }
        DocAction::Rev { id } => {
            println!("{}", db.rev(&id).await?);
        }
        DocAction::Delete { id, rev } => {
            let rev = match rev {
                Some(rev) => rev,
                None => db.rev(&id).await?,
            };
            let rev = db.delete(&id, &rev).await?;
            print_json(&json!({"id": id, "rev": rev, "deleted": true}))?;
        }
    }
    Ok(())
}
