mod events;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dualcast::directory::SqliteStore;
use dualcast::{IdentityDirectory, Upsert, UpsertOutcome};
use events::{emit, EventRecord, EventResolved, EventUpserted};

#[derive(Parser)]
#[command(name = "dualcast", about = "dualcast operator tool")]
struct Cli {
    /// SQLite database holding the identity directory.
    #[arg(long, env = "DUALCAST_DB", default_value = "dualcast.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Identity directory operations.
    Directory {
        #[command(subcommand)]
        command: DirectoryCommand,
    },
}

#[derive(Subcommand)]
enum DirectoryCommand {
    /// Create or update a recipient's record.
    Upsert {
        #[arg(long)]
        recipient: String,
        /// Direct-link address (required to create a record).
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        push_token: Option<String>,
    },

    /// Print a recipient's direct-link address, or push token with --push-token.
    Resolve {
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        push_token: bool,
    },

    /// Print a recipient's full record.
    Show {
        #[arg(long)]
        recipient: String,
    },

    /// Print every record.
    List,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = SqliteStore::open(&cli.db)
        .with_context(|| format!("opening directory database {}", cli.db.display()))?;
    let directory = IdentityDirectory::new(Arc::new(store));

    match cli.command {
        Command::Directory { command } => run_directory(&directory, command),
    }
}

fn run_directory(directory: &IdentityDirectory, command: DirectoryCommand) -> anyhow::Result<()> {
    match command {
        DirectoryCommand::Upsert {
            recipient,
            address,
            push_token,
        } => {
            let request = Upsert {
                recipient_id: recipient.clone(),
                direct_link_address: address,
                push_token,
            };
            let event = match directory.upsert(request)? {
                UpsertOutcome::Created { shard_index } => EventUpserted::created(&recipient, shard_index),
                UpsertOutcome::Updated { .. } => EventUpserted::updated(&recipient),
            };
            emit(&event);
        }
        DirectoryCommand::Resolve {
            recipient,
            push_token,
        } => {
            let event = if push_token {
                EventResolved::new(&recipient, "push_token", directory.resolve_push_token(&recipient)?)
            } else {
                let address = directory.resolve_direct_link_address(&recipient)?;
                EventResolved::new(&recipient, "direct_link_address", Some(address))
            };
            emit(&event);
        }
        DirectoryCommand::Show { recipient } => {
            emit(&EventRecord::new(directory.record(&recipient)?));
        }
        DirectoryCommand::List => {
            for record in directory.records()? {
                emit(&EventRecord::new(record));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upsert() {
        let cli = Cli::try_parse_from([
            "dualcast",
            "--db",
            "/tmp/x.db",
            "directory",
            "upsert",
            "--recipient",
            "driver-1",
            "--address",
            "peer-abc",
        ])
        .unwrap();
        assert_eq!(cli.db, PathBuf::from("/tmp/x.db"));
        match cli.command {
            Command::Directory {
                command:
                    DirectoryCommand::Upsert {
                        recipient,
                        address,
                        push_token,
                    },
            } => {
                assert_eq!(recipient, "driver-1");
                assert_eq!(address.as_deref(), Some("peer-abc"));
                assert!(push_token.is_none());
            }
            _ => panic!("expected upsert"),
        }
    }

    #[test]
    fn resolve_requires_recipient() {
        assert!(Cli::try_parse_from(["dualcast", "directory", "resolve"]).is_err());
    }

    #[test]
    fn commands_run_against_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("d.db")).unwrap();
        let directory = IdentityDirectory::new(Arc::new(store));

        run_directory(
            &directory,
            DirectoryCommand::Upsert {
                recipient: "a".into(),
                address: Some("peer-1".into()),
                push_token: Some("tok".into()),
            },
        )
        .unwrap();
        run_directory(
            &directory,
            DirectoryCommand::Resolve {
                recipient: "a".into(),
                push_token: true,
            },
        )
        .unwrap();

        let err = run_directory(
            &directory,
            DirectoryCommand::Show {
                recipient: "ghost".into(),
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}
