//! proxydeck: WebSocket terminal bridge for the antigravity-claude-proxy
//! control surface.
//!
//! Every accepted connection becomes one session owning at most one shell
//! in a pseudo-terminal. Shell output is streamed back base64-encoded;
//! keystrokes, resizes and start requests come in as JSON frames.

mod cli;
mod commands;
mod connection;
mod server;
mod wizard;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use proxydeck_config::ProxydeckConfig;
use proxydeck_lifecycle::LifecycleController;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, ServeArgs};
use crate::server::Bridge;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    let loaded = match args.config.as_deref() {
        Some(path) => proxydeck_config::load_config_from(Path::new(path)),
        None => proxydeck_config::load_config(),
    };

    let filter = match args.log_level.as_deref() {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let directive = loaded
                .as_ref()
                .map(|c| c.logging.directive())
                .unwrap_or_else(|_| "proxydeck=info".into());
            EnvFilter::new(directive)
        }),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let config = loaded.unwrap_or_else(|e| {
        tracing::warn!("Config load failed, using defaults: {e}");
        ProxydeckConfig::default()
    });

    match args.command() {
        Command::Serve(serve_args) => serve(config, serve_args).await,
        Command::Status { limits } => report(commands::status(&config, limits).await),
        Command::Accounts => report(commands::accounts(&config).await),
        Command::Add { fresh, url } => {
            let url = url.unwrap_or_else(|| wizard::default_url(&config));
            report(wizard::add_account(&config, &url, fresh).await)
        }
        Command::Remove { number, url } => {
            let url = url.unwrap_or_else(|| wizard::default_url(&config));
            report(wizard::remove_account(&config, &url, number).await)
        }
    }
}

fn report(result: proxydeck_common::Result<String>) -> ExitCode {
    match result {
        Ok(out) => {
            println!("{out}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(mut config: ProxydeckConfig, args: ServeArgs) -> ExitCode {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let addr = config.server.bind_addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind TCP listener");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("proxydeck v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);

    let bridge = Bridge::from_config(&config.server, &config.shell, &args.env);
    let sessions = bridge.sessions().clone();

    let controller = Arc::new(LifecycleController::from_config(
        &config.proxy,
        &config.automation,
    ));
    if args.start_proxy {
        match controller.start_proxy().await {
            Ok(pid) => tracing::info!(?pid, "proxy process started"),
            Err(e) => tracing::warn!(error = %e, "could not start proxy"),
        }
    }
    let health = (config.proxy.health_interval_secs > 0).then(|| {
        spawn_status_log(&controller);
        controller.spawn_health_cycle(Duration::from_secs(config.proxy.health_interval_secs))
    });

    tokio::select! {
        _ = bridge.serve(listener) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("Shutting down");
        }
    }

    if let Some(task) = health {
        task.abort();
    }
    if let Err(e) = controller.stop_proxy().await {
        tracing::warn!(error = %e, "could not stop proxy");
    }
    sessions.terminate_all().await;
    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}

fn spawn_status_log(controller: &LifecycleController) {
    let mut status = controller.subscribe();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            tracing::info!(status = ?current, "proxy status changed");
        }
    });
}
