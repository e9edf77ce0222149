//! Database commands.

use super::{print_json, CommandResult};
use clap::Subcommand;
use couchwire_client::Client;
use serde_json::json;

/// Database actions.
#[derive(Subcommand)]
pub enum DbAction {
    /// Create a database
    Create {
        /// Database name
        name: String,
    },
    /// Delete a database
    Delete {
        /// Database name
        name: String,
    },
    /// Check whether a database exists
    Exists {
        /// Database name
        name: String,
    },
    /// Show database metadata
    Info {
        /// Database name
        name: String,
    },
}

/// Runs a database command.
pub async fn run(client: &Client, action: DbAction) -> CommandResult {
    let databases = client.databases();
    match action {
        DbAction::Create { name } => {
            databases.create(&name).await?;
            println!("Created database {}", name);
        }
        DbAction::Delete { name } => {
            databases.delete(&name).await?;
            println!("Deleted database {}", name);
        }
        DbAction::Exists { name } => {
            let exists = databases.exists(&name).await?;
            print_json(&json!({"db_name": name, "exists": exists}))?;
        }
        DbAction::Info { name } => {
            let meta = databases.meta(&name).await?;
            print_json(&serde_json::to_value(&meta)?)?;
        }
    }
    Ok(())
}
