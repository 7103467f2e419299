pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::database::DatabaseManager;

#[derive(Parser)]
#[command(name = "campus")]
#[command(about = "Campus Hub CLI - sync, account bootstrap and migrations against the hub database")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run upstream syncs and inspect schedules")]
    Sync {
        #[command(subcommand)]
        cmd: commands::sync::SyncCommands,
    },

    #[command(about = "User account management")]
    User {
        #[command(subcommand)]
        cmd: commands::user::UserCommands,
    },

    #[command(about = "Apply database migrations")]
    Migrate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Every command talks to the database directly; there is no remote server mode
pub(crate) async fn connect() -> anyhow::Result<PgPool> {
    Ok(DatabaseManager::connect().await?)
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Sync { cmd } => commands::sync::handle(cmd, output_format).await,
        Commands::User { cmd } => commands::user::handle(cmd, output_format).await,
        Commands::Migrate => commands::migrate::handle(output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sync_run_with_node() {
        let id = uuid::Uuid::new_v4();
        let cli = Cli::try_parse_from(["campus", "--json", "sync", "run", "--node", &id.to_string()]).unwrap();
        assert_eq!(OutputFormat::from_cli(&cli), OutputFormat::Json);
        match cli.command {
            Commands::Sync { cmd: commands::sync::SyncCommands::Run { node } } => assert_eq!(node, Some(id)),
            _ => panic!("expected sync run"),
        }
    }

    #[test]
    fn user_create_rejects_unknown_role() {
        let parsed = Cli::try_parse_from([
            "campus", "user", "create", "--email", "a@b.test", "--name", "A", "--role", "owner",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn migrate_defaults_to_text_output() {
        let cli = Cli::try_parse_from(["campus", "migrate"]).unwrap();
        assert_eq!(OutputFormat::from_cli(&cli), OutputFormat::Text);
        assert!(matches!(cli.command, Commands::Migrate));
    }
}
