//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvQuoteFeed;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::sqlite_adapter::SqliteStore;
use crate::domain::account;
use crate::domain::alert;
use crate::domain::error::CommodityxError;
use crate::domain::quote_import;
use crate::domain::user::{DEFAULT_INITIAL_BALANCE, Registration};
use crate::ports::config_port::ConfigPort;

#[derive(Parser, Debug)]
#[command(name = "commodityx", about = "Commodities trading platform")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the web server
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create the database schema
    InitDb {
        #[arg(short, long)]
        config: PathBuf,
        /// Also list the reference commodities
        #[arg(long)]
        seed: bool,
    },
    /// Upsert commodity quotes from a CSV file
    ImportQuotes {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Evaluate active price alerts once
    CheckAlerts {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create an administrator account; the password is read from stdin
    CreateAdmin {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
    },
    /// Output an argon2 hash for a password
    HashPassword,
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Serve { config } => run_serve(&config),
        Command::InitDb { config, seed } => run_init_db(&config, seed),
        Command::ImportQuotes { config, file } => run_import_quotes(&config, file),
        Command::CheckAlerts { config } => run_check_alerts(&config),
        Command::CreateAdmin {
            config,
            username,
            email,
        } => run_create_admin(&config, username, email),
        Command::HashPassword => run_hash_password(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, CommodityxError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// Open the configured database and make sure the schema exists.
fn open_store(config: &dyn ConfigPort) -> Result<SqliteStore, CommodityxError> {
    let store = SqliteStore::from_config(config)?;
    store.initialize_schema()?;
    Ok(store)
}

fn read_password_line() -> Result<String, CommodityxError> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn run_init_db(config_path: &PathBuf, seed: bool) -> Result<(), CommodityxError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    eprintln!("Schema ready");

    if seed || config.get_bool("database", "seed_commodities", false) {
        let added = store.seed_commodities()?;
        eprintln!("Seeded {added} commodities");
    }
    Ok(())
}

fn run_import_quotes(config_path: &PathBuf, file: PathBuf) -> Result<(), CommodityxError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;

    eprintln!("Importing quotes from {}", file.display());
    let feed = CsvQuoteFeed::new(file);
    let summary = quote_import::import_quotes(&store, &feed)?;

    eprintln!("Imported {} quotes", summary.imported);
    if !summary.rejected.is_empty() {
        eprintln!("Rejected: {}", summary.rejected.join(", "));
    }
    Ok(())
}

fn run_check_alerts(config_path: &PathBuf) -> Result<(), CommodityxError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;

    let triggered = alert::check_alerts(&store, chrono::Utc::now())?;
    for fired in &triggered {
        let line = serde_json::to_string(fired)
            .map_err(|e| CommodityxError::Io(io::Error::other(e)))?;
        println!("{line}");
    }
    eprintln!("{} alert(s) triggered", triggered.len());
    Ok(())
}

fn run_create_admin(
    config_path: &PathBuf,
    username: String,
    email: String,
) -> Result<(), CommodityxError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let initial_balance =
        config.get_double("trading", "initial_balance", DEFAULT_INITIAL_BALANCE);

    eprintln!("Enter password for {username}:");
    let password = read_password_line()?;

    let user = account::register(
        &store,
        Registration {
            username,
            email,
            password,
            full_name: None,
        },
        initial_balance,
        true,
    )?;
    eprintln!("Created admin {} (id {})", user.username, user.id);
    Ok(())
}

fn run_hash_password() -> Result<(), CommodityxError> {
    eprintln!("Enter password to hash:");
    let password = read_password_line()?;
    println!("{}", account::hash_password(&password)?);
    Ok(())
}

fn run_serve(config_path: &PathBuf) -> Result<(), CommodityxError> {
    #[cfg(feature = "web")]
    {
        use crate::adapters::web::{AppState, WebSettings, build_router};
        use std::net::SocketAddr;
        use std::sync::Arc;

        let config = load_config(config_path)?;
        let settings = WebSettings::from_config(&config)?;
        let store = open_store(&config)?;
        if config.get_bool("database", "seed_commodities", false) {
            let added = store.seed_commodities()?;
            tracing::info!(added, "seeded reference commodities");
        }

        let addr: SocketAddr =
            settings
                .listen
                .parse()
                .map_err(|e: std::net::AddrParseError| CommodityxError::ConfigInvalid {
                    section: "web".into(),
                    key: "listen".into(),
                    reason: e.to_string(),
                })?;

        let router = build_router(AppState::new(Arc::new(store), settings));

        eprintln!("Starting web server on {addr}");
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::info!(%addr, "listening");
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::info!("shutdown requested");
                    }
                })
                .await?;
            Ok::<(), CommodityxError>(())
        })
    }

    #[cfg(not(feature = "web"))]
    {
        let _ = config_path;
        Err(CommodityxError::validation(
            "command",
            "web feature is required for serve",
        ))
    }
}
