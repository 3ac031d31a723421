//! podwallet
//!
//! Wallet process that keeps a wallet synchronised with a remote chain
//! server and serves it over RPC.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                  PODWALLET                    │
//!    RPC clients         │  ┌──────────────┐      ┌──────────────────┐  │
//!    ────────────────────┼─▶│ ServiceBridge│─────▶│  WalletLoader    │  │
//!    (podctl, REST)      │  │ legacy + v1  │      │  (file wallet)   │  │
//!                        │  └──────┬───────┘      └────────▲─────────┘  │
//!                        │         │ chain client          │ run_after  │
//!                        │         │                       │ _load      │
//!                        │  ┌──────┴───────────────────────┴─────────┐  │
//!                        │  │          ChainSyncSession               │  │     Chain
//!                        │  │   dial → associate → wait → redial      │──┼──── server
//!                        │  └─────────────────────────────────────────┘  │     (ws://)
//!                        │                                               │
//!                        │  ShutdownCoordinator: signals, RPC stop,      │
//!                        │  fatal errors → handlers in reverse order     │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use podwallet::config::{load_or_init_config, save_config};
use podwallet::observability::{init_logging, metrics};
use podwallet::wallet::{Credentials, FileWalletStore};
use podwallet::ProcessMain;

#[derive(Parser)]
#[command(name = "podwallet", version)]
#[command(about = "Wallet process with a reconnecting chain server session", long_about = None)]
struct Cli {
    /// Configuration file; created with defaults if missing
    #[arg(short, long, default_value = "podwallet.toml")]
    config: PathBuf,

    /// Override the wallet data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Start without loading the wallet
    #[arg(long)]
    no_initial_load: bool,

    /// Create a new wallet with the configured passphrase, then exit
    #[arg(long)]
    create: bool,

    /// Override the log level
    #[arg(long)]
    log_level: Option<String>,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    save_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match load_or_init_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("podwallet: {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(data_dir) = cli.data_dir {
        config.wallet.data_dir = data_dir;
    }
    if cli.no_initial_load {
        config.wallet.no_initial_load = true;
    }
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    init_logging(&config.observability);

    if cli.save_config {
        if let Err(e) = save_config(&cli.config, &config) {
            tracing::error!(error = %e, "Failed to save configuration");
            return ExitCode::FAILURE;
        }
        tracing::info!(path = %cli.config.display(), "Configuration saved");
    }

    if cli.create {
        let Some(passphrase) = config.wallet.passphrase.clone() else {
            tracing::error!("wallet.passphrase must be set to create a wallet");
            return ExitCode::FAILURE;
        };
        let store = FileWalletStore::new(config.wallet.data_dir.clone(), config.wallet.sync_poll_interval());
        return match store.create(&config.wallet.name, &Credentials::new(passphrase)) {
            Ok(id) => {
                tracing::info!(wallet = %id, path = %store.wallet_path().display(), "Wallet created");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to create wallet");
                ExitCode::FAILURE
            }
        };
    }

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    tracing::info!(
        chain = %config.chain.address,
        legacy_rpc = %config.rpc.legacy.bind_address,
        experimental_rpc = config.rpc.experimental.enabled,
        "Configuration loaded"
    );

    let status = ProcessMain::new(config).run().await;
    ExitCode::from(status.code())
}
