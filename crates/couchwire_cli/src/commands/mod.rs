//! CLI command implementations.

pub mod admins;
pub mod changes;
pub mod db;
pub mod doc;
pub mod users;

/// Result type of every command.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Prints a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
