//! exposure-daemon - trigger adapter and retention sweeper for the
//! exposure-notification propagation engine.
//!
//! Stands in for the platform-managed on-create/scheduled trigger runtime:
//! polls `reports` for newly-written `pending` documents and invokes the
//! Report Processor (C9), and runs the Retention Sweeper (C11) on its own
//! interval. The callable surface (C10) has no process of its own here.
//! It is a library API (`exposure_engine::callable`) meant to be wired into
//! whatever request-handling front end a deployment chooses.

mod config;
mod dispatcher;
mod server;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use config::Config;
use exposure_store::{SledStore, Store};
use server::Server;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();
    if let Err(err) = config.validate() {
        eprintln!("invalid configuration: {err}");
        return ExitCode::FAILURE;
    }

    let default_level = if config.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::from_default_env()
        .add_directive(format!("exposure_daemon={default_level}").parse().unwrap());

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(env_filter)
            .init();
    }

    info!(
        "exposure-daemon v{} starting (data_dir={})",
        env!("CARGO_PKG_VERSION"),
        config.data_dir.display()
    );

    let store: Arc<dyn Store> = match SledStore::open(&config.data_dir) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!("failed to open store at {}: {err}", config.data_dir.display());
            return ExitCode::FAILURE;
        }
    };

    let server = Server::new(config, store);
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown.send(());
    });

    server.run().await;
    ExitCode::SUCCESS
}
