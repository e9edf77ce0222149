//! couchwire CLI
//!
//! Command-line access to a CouchDB server.
//!
//! # Commands
//!
//! - `db` - Create, delete, probe and describe databases
//! - `doc` - Read, write and delete documents
//! - `changes` - Follow a database's change feed until Ctrl-C
//! - `admins` - Manage server administrators
//! - `users` - Manage regular users

mod commands;

use clap::{Parser, Subcommand};
use commands::{admins, changes, db, doc, users};
use couchwire_client::{Client, ClientConfig, DEFAULT_HOST};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// couchwire command-line CouchDB client.
#[derive(Parser)]
#[command(name = "couchwire")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server URL
    #[arg(global = true, long, env = "COUCHDB_URL", default_value = DEFAULT_HOST)]
    url: String,

    /// User name for basic authentication
    #[arg(global = true, short, long, env = "COUCHDB_USER")]
    user: Option<String>,

    /// Password for basic authentication
    #[arg(global = true, short, long, env = "COUCHDB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Request timeout in seconds
    #[arg(global = true, long, default_value = "60")]
    timeout: u64,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage databases
    Db {
        #[command(subcommand)]
        action: db::DbAction,
    },

    /// Manage documents
    Doc {
        /// Database name
        #[arg(short, long)]
        db: String,

        #[command(subcommand)]
        action: doc::DocAction,
    },

    /// Follow the change feed of a database
    Changes {
        /// Database name
        db: String,

        /// Start after this sequence
        #[arg(short, long, default_value = "0")]
        since: u64,

        /// Include document bodies
        #[arg(long)]
        include_docs: bool,

        /// Heartbeat interval in seconds
        #[arg(long, default_value = "10")]
        heartbeat: u64,
    },

    /// Manage server administrators
    Admins {
        #[command(subcommand)]
        action: admins::AdminAction,
    },

    /// Manage regular users
    Users {
        #[command(subcommand)]
        action: users::UserAction,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config =
        ClientConfig::new(cli.url.as_str()).with_timeout(Duration::from_secs(cli.timeout));
    match (cli.user, cli.password) {
        (Some(user), Some(password)) => config = config.with_basic_auth(user, password),
        (Some(_), None) => return Err("--password is required with --user".into()),
        (None, Some(_)) => return Err("--user is required with --password".into()),
        (None, None) => {}
    }

    let command = cli.command;
    if let Commands::Version = command {
        println!("couchwire CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let client = Client::new(config)?;
    match command {
        Commands::Db { action } => db::run(&client, action).await?,
        Commands::Doc { db, action } => doc::run(&client.database(db), action).await?,
        Commands::Changes {
            db,
            since,
            include_docs,
            heartbeat,
        } => {
            changes::run(
                &client.database(db),
                since,
                include_docs,
                Duration::from_secs(heartbeat),
            )
            .await?
        }
        Commands::Admins { action } => admins::run(&client, action).await?,
        Commands::Users { action } => users::run(&client, action).await?,
        Commands::Version => {}
    }

    Ok(())
}
