//! Administrator commands.

use super::{print_json, CommandResult};
use clap::Subcommand;
use couchwire_client::Client;
use serde_json::json;

/// Administrator actions.
#[derive(Subcommand)]
pub enum AdminAction {
    /// List administrator names
    List,
    /// Create an administrator or change its password
    Create {
        /// Administrator name
        name: String,
        /// Password
        #[arg(long, env = "COUCHWIRE_ADMIN_PASSWORD", hide_env_values = true)]
        admin_password: String,
    },
    /// Delete an administrator
    Delete {
        /// Administrator name
        name: String,
    },
}

/// Runs an administrator command.
pub async fn run(client: &Client, action: AdminAction) -> CommandResult {
    let admins = client.admins();
    match action {
        AdminAction::List => {
            let names = admins.list().await?;
            print_json(&json!(names))?;
        }
        AdminAction::Create {
            name,
            admin_password,
        } => {
            admins.create(&name, &admin_password).await?;
            println!("Saved administrator {}", name);
        }
        AdminAction::Delete { name } => {
            admins.delete(&name).await?;
            println!("Deleted administrator {}", name);
        }
    }
    Ok(())
}
