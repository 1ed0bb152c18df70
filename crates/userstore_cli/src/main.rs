//! Server entry point.
//!
//! # Responsibility
//! - Parse flags, start logging, open the store and serve HTTP.
//! - Close the store after the server has drained on shutdown.

mod config;

use clap::Parser;
use config::Cli;
use log::{error, info};
use tokio_util::sync::CancellationToken;
use userstore_api::{ApiConfig, AppState};
use userstore_core::{default_log_level, init_logging, Store};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    if let Err(err) = init_logging(level, cli.log_dir.as_deref()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }

    if let Err(err) = run(cli).await {
        error!("event=server_exit module=cli status=error error={err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = ApiConfig::new(&cli.deactivate_domain)
        .map_err(|err| format!("invalid --deactivate-domain: {err}"))?;
    let store = Store::open(&cli.db_path)
        .map_err(|err| format!("open `{}`: {err}", cli.db_path.display()))?
        .with_call_timeout(cli.request_timeout());

    let listener = userstore_api::bind(cli.port)
        .await
        .map_err(|err| format!("bind :{}: {err}", cli.port))?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("event=shutdown_requested module=cli status=ok");
                signal_token.cancel();
            }
            Err(err) => error!("event=signal_listen module=cli status=error error={err}"),
        }
    });

    let served = userstore_api::serve(listener, AppState::new(store.clone(), config), shutdown)
        .await
        .map_err(|err| format!("serve: {err}"));

    store
        .close()
        .map_err(|err| format!("close store: {err}"))?;
    info!(
        "event=server_exit module=cli status=ok version={}",
        userstore_core::core_version()
    );
    served
}
