//! Regular user commands.

use super::{print_json, CommandResult};
use clap::Subcommand;
use couchwire_client::{user_id, Client, CreateUser};
use serde_json::json;

/// User actions.
#[derive(Subcommand)]
pub enum UserAction {
    /// Create a user
    Create {
        /// Login name
        name: String,
        /// Password
        #[arg(long, env = "COUCHWIRE_USER_PASSWORD", hide_env_values = true)]
        user_password: String,
        /// Roles to grant
        #[arg(short, long)]
        role: Vec<String>,
    },
    /// Print a user document
    Get {
        /// Login name
        name: String,
    },
    /// Delete a user
    Delete {
        /// Login name
        name: String,
    },
}

/// Runs a user command.
pub async fn run(client: &Client, action: UserAction) -> CommandResult {
    let users = client.users();
    match action {
        UserAction::Create {
            name,
            user_password,
            role,
        } => {
            let user = users
                .create(CreateUser {
                    name,
                    password: user_password,
                    roles: role,
                })
                .await?;
            print_json(&json!({"id": user.document.id, "rev": user.document.rev}))?;
        }
        UserAction::Get { name } => {
            let user = users.get(&user_id(&name)).await?;
            print_json(&serde_json::to_value(&user)?)?;
        }
        UserAction::Delete { name } => {
            users.delete(&user_id(&name)).await?;
            println!("Deleted user {}", name);
        }
    }
    Ok(())
}
