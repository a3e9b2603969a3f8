//! CC Helper Storage - admin binary
//!
//! Opens the catalog database and runs one subcommand against it.
//!
//! ## Usage
//!
//! ```bash
//! cchelper-storage init
//! cchelper-storage category add product Kredit
//! cchelper-storage item create product "BJB T Samsat" --category 2 --text "Syarat ..."
//! cchelper-storage item show product bjb-t-samsat
//! cchelper-storage guide tree call
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use cchelper_storage::cli::{execute_command, Command};
use cchelper_storage::services::spawn_logging_listener;
use cchelper_storage::{CatalogDb, Config, Services};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cchelper-storage")]
#[command(about = "Category, content and call-flow storage for call-center agents")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "CCHELPER_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "CCHELPER_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr, stdout carries the JSON result
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("cchelper_storage=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = Config::resolve(args.config.as_deref(), args.storage_dir)
        .context("loading config")?;

    std::fs::create_dir_all(&config.storage_dir)
        .with_context(|| format!("creating {}", config.storage_dir.display()))?;

    if matches!(args.command, Command::Init) {
        let config_path = config.config_path();
        if !config_path.exists() {
            config.save(&config_path)?;
            info!(path = %config_path.display(), "Created default config");
        }
    }

    let db = Arc::new(CatalogDb::open_path(&config.db_path())?);
    let services = Services::new(db.clone(), &config);
    let listener = spawn_logging_listener(services.events.clone());

    let result = execute_command(&db, &services, args.command);

    // Closing the bus lets the listener drain and stop
    drop(services);
    if let Err(e) = listener.await {
        error!(error = %e, "Event listener failed");
    }

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            error!(status = e.status_code(), "{}", e);
            Err(e.into())
        }
    }
}
