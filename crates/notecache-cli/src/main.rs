//! notecache CLI
//!
//! Command-line interface over the local note store: notes and folders,
//! trash, keyword search and per-user stores.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use notecache_core::{Config, Session};

mod commands;
mod output;
mod scope;

use output::{Output, OutputFormat};
use scope::Scope;

#[derive(Parser)]
#[command(name = "notecache")]
#[command(about = "notecache - Local notes with folders, trash and background sync")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Operate on this user's store instead of the main one
    #[arg(short, long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a note or folder
    Add {
        /// Create a folder instead of a note
        #[arg(long)]
        folder: bool,
        /// Title
        #[arg(short = 'T', long)]
        title: String,
        /// Note body
        #[arg(short, long)]
        content: Option<String>,
        /// Parent folder ID (full ID or prefix)
        #[arg(short, long)]
        parent: Option<String>,
    },
    /// Show a record
    Show {
        /// Record ID (full ID or prefix)
        id: String,
    },
    /// Edit a record
    Edit {
        /// Record ID (full ID or prefix)
        id: String,
        /// New title
        #[arg(short = 'T', long)]
        title: Option<String>,
        /// New body
        #[arg(short, long)]
        content: Option<String>,
        /// New parent folder ID, or "root"
        #[arg(short, long)]
        parent: Option<String>,
    },
    /// List records under a folder, "root", "allnotes" or "unfilednotes"
    #[command(alias = "ls")]
    List {
        /// Parent key (defaults to root)
        key: Option<String>,
        /// Include soft-deleted records
        #[arg(short, long)]
        all: bool,
    },
    /// List all folders
    Folders,
    /// Show the folder tree
    Tree {
        /// Folder to start from (defaults to root)
        key: Option<String>,
    },
    /// Count active notes under a parent key
    Count {
        /// Parent key
        key: String,
    },
    /// Move a record to the trash
    Trash {
        /// Record ID (full ID or prefix)
        id: String,
    },
    /// Restore a record from the trash
    Restore {
        /// Record ID (full ID or prefix)
        id: String,
    },
    /// Delete a record permanently
    #[command(alias = "remove")]
    Rm {
        /// Record ID (full ID or prefix)
        id: String,
    },
    /// List recently trashed records
    Deleted,
    /// Search notes by keyword
    Search {
        /// Keyword to look for
        keyword: String,
        /// Only search below this folder
        #[arg(short, long, conflicts_with = "persisted")]
        parent: Option<String>,
        /// Search the database instead of memory
        #[arg(long)]
        persisted: bool,
    },
    /// Show store and sync status
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, debounce_ms, trash_retention_days)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't need the store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), &output);
    }

    let config = Config::load().context("Failed to load configuration")?;
    let mut session = Session::open(config.clone())?;
    debug!("Using data directory {:?}", config.data_dir);

    let result = {
        let mut scope = match cli.user.as_deref() {
            Some(name) => {
                let store = session
                    .user(name)
                    .await
                    .with_context(|| format!("Failed to open store for user '{}'", name))?;
                if !store.is_loaded() {
                    let reason = store
                        .sync_status()
                        .error
                        .unwrap_or_else(|| "unknown error".to_string());
                    bail!("Failed to load notes for user '{}': {}", name, reason);
                }
                Scope::User(store)
            }
            None => {
                if !session.init().await {
                    let reason = session
                        .notes()
                        .sync_status()
                        .error
                        .unwrap_or_else(|| "unknown error".to_string());
                    bail!("Failed to load notes: {}", reason);
                }
                Scope::Main(session.notes_mut())
            }
        };
        run(cli.command, &mut scope, &config, cli.user.as_deref(), &output).await
    };

    let flushed = session.dispose().await;
    debug!("Session closed, flushed: {}", flushed);
    if result.is_ok() && !flushed {
        bail!("Some changes could not be saved");
    }
    result
}

async fn run(
    command: Commands,
    scope: &mut Scope<'_>,
    config: &Config,
    user: Option<&str>,
    output: &Output,
) -> Result<()> {
    match command {
        Commands::Add {
            folder,
            title,
            content,
            parent,
        } => commands::note::add(scope, folder, title, content, parent, output),
        Commands::Show { id } => commands::note::show(scope, &id, output),
        Commands::Edit {
            id,
            title,
            content,
            parent,
        } => commands::note::edit(scope, &id, title, content, parent, output),
        Commands::List { key, all } => commands::note::list(scope, key, all, output),
        Commands::Folders => commands::folder::list(scope, output),
        Commands::Tree { key } => commands::folder::tree(scope, key, output),
        Commands::Count { key } => commands::note::count(scope, &key, output),
        Commands::Trash { id } => commands::note::trash(scope, &id, output),
        Commands::Restore { id } => commands::note::restore(scope, &id, output),
        Commands::Rm { id } => commands::note::remove(scope, &id, output),
        Commands::Deleted => commands::note::deleted(scope, output),
        Commands::Search {
            keyword,
            parent,
            persisted,
        } => commands::search::search(scope, &keyword, parent, persisted, output).await,
        Commands::Status => commands::status::show(scope, config, user, output),
        Commands::Config { .. } => unreachable!(), // Handled in main
    }
}

fn handle_config_command(command: Option<ConfigCommands>, output: &Output) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(output),
        Some(ConfigCommands::Set { key, value }) => commands::config::set(key, value, output),
    }
}

/// Log to stderr; RUST_LOG overrides the default level
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let env_filter = if verbose {
        EnvFilter::new(format!("notecache_core={},notecache_cli={}", level, level))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("notecache_core={},notecache_cli={}", level, level))
        })
    };

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_with_user() {
        let cli = Cli::try_parse_from([
            "notecache", "--user", "dana", "add", "--folder", "-T", "Inbox",
        ])
        .unwrap();

        assert_eq!(cli.user.as_deref(), Some("dana"));
        match cli.command {
            Commands::Add { folder, title, .. } => {
                assert!(folder);
                assert_eq!(title, "Inbox");
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_remove_alias() {
        let cli = Cli::try_parse_from(["notecache", "remove", "abc"]).unwrap();
        assert!(matches!(cli.command, Commands::Rm { id } if id == "abc"));
    }
}
