//! revschema CLI
//!
//! Runs the metadata-store migrations and inspects databases.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use revschema_core::DialectKind;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use revschema_migrate::executor::MigrationState;
use revschema_migrate::{meta, ClientConfig, MetaConnection, MigrationExecutor, SqlClient};

/// Reversible schema edits and metadata-store migrations.
#[derive(Parser)]
#[command(name = "revschema")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database URL, overriding the configuration file.
    #[arg(short, long, env = "DATABASE_URL")]
    database: Option<String>,

    /// SQL dialect (databricks, postgres, sqlite). Guessed from the URL if omitted.
    #[arg(long)]
    dialect: Option<DialectKind>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending metadata migrations.
    Migrate {
        /// Revert migrations instead of applying.
        #[arg(short, long)]
        reverse: bool,

        /// Number of migrations to revert (with --reverse, default 1).
        #[arg(short, long)]
        count: Option<usize>,
    },

    /// Show migration status.
    ShowMigrations,

    /// List the columns of a table.
    Columns {
        /// Table name.
        table: String,
    },

    /// Check that the database is reachable.
    TestConnection,

    /// Show the server version.
    Version,
}

fn guess_dialect(url: &str) -> anyhow::Result<DialectKind> {
    let scheme = url.split(':').next().unwrap_or_default();
    Ok(match scheme {
        "sqlite" => DialectKind::Sqlite,
        "postgres" | "postgresql" => DialectKind::Postgres,
        "databricks" => DialectKind::Databricks,
        other => bail!("cannot guess the dialect of '{other}' URLs, pass --dialect"),
    })
}

fn resolve_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = match (&cli.config, &cli.database) {
        (Some(path), _) => ClientConfig::from_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        (None, Some(url)) => {
            let dialect = match cli.dialect {
                Some(dialect) => dialect,
                None => guess_dialect(url)?,
            };
            ClientConfig::new(dialect, url.clone())
        }
        (None, None) => bail!("pass --config or --database (or set DATABASE_URL)"),
    };
    if cli.config.is_some() {
        if let Some(url) = &cli.database {
            config.url = Some(url.clone());
            config.remote = None;
        }
    }
    if let Some(dialect) = cli.dialect {
        config.dialect = dialect;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = resolve_config(&cli)?;
    let client = Arc::new(SqlClient::connect(&config).await?);

    match cli.command {
        Commands::Migrate { reverse, count } => {
            let conn = MetaConnection::new(Arc::clone(&client));
            if reverse {
                let mut remaining = count.unwrap_or(1);
                for source in meta::ALL_SOURCES.iter().rev() {
                    if remaining == 0 {
                        break;
                    }
                    let executor = MigrationExecutor::new(conn.clone(), source);
                    let reverted = executor.revert_last(remaining).await?;
                    remaining -= reverted.len();
                }
            } else {
                let report = meta::init(&conn).await?;
                let total: usize = report.iter().map(|(_, applied)| applied.len()).sum();
                info!(applied = total, "Metadata store is up to date");
            }
        }

        Commands::ShowMigrations => {
            let conn = MetaConnection::new(Arc::clone(&client));
            println!("\nMigrations:");
            println!("{:-<60}", "");
            for source in meta::ALL_SOURCES {
                let executor = MigrationExecutor::new(conn.clone(), source);
                for status in executor.status().await? {
                    let mark = if status.state == MigrationState::Applied {
                        "X"
                    } else {
                        " "
                    };
                    match status.applied_at {
                        Some(at) => println!(
                            " [{mark}] {}/{} ({})",
                            source.name,
                            status.name,
                            at.format("%Y-%m-%d %H:%M:%S")
                        ),
                        None => println!(" [{mark}] {}/{}", source.name, status.name),
                    }
                }
            }
            println!();
        }

        Commands::Columns { table } => {
            let columns = client.list_columns(&table).await;
            println!("{}", serde_json::to_string_pretty(&columns)?);
        }

        Commands::TestConnection => {
            let result = client.test_connection().await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Version => {
            let version = client.server_version().await;
            println!("{}", serde_json::to_string_pretty(&version)?);
        }
    }

    client.close().await;
    Ok(())
}
