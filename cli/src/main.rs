//! asbridge - watches the script compiler's debug server from a terminal.
//!
//! Connects as soon as the server is reachable, reconnects after it
//! restarts, and prints a fresh report on every debounced change until
//! Ctrl-C. Logs go to a file so stdout carries only the reports.

mod report;

use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::Mutex,
};

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use asbridge_client::{AlwaysAvailable, ChangeReason, DiagnosticsClient};
use asbridge_config::BridgeConfig;

fn init_tracing(default_filter: Option<&str>) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: stay silent rather than interleave logs with reports.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.asbridge/logs/asbridge.log
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".asbridge").join("logs").join("asbridge.log"));
    }

    // Fallback: ./.asbridge/logs/asbridge.log
    candidates.push(PathBuf::from(".asbridge").join("logs").join("asbridge.log"));

    candidates
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_error) = match BridgeConfig::load() {
        Ok(config) => (config.unwrap_or_default(), None),
        Err(e) => (BridgeConfig::default(), Some(e)),
    };
    init_tracing(config.log_filter());
    if let Some(e) = config_error {
        eprintln!("Ignoring config: {e}");
    }

    let client_config = config.client_config();
    println!(
        "Watching debug server at {}:{} (Ctrl-C to quit)",
        client_config.host, client_config.port
    );

    let client = DiagnosticsClient::start(client_config, AlwaysAvailable);
    let mut changes = client.subscribe();

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!("Failed to listen for Ctrl-C: {e}");
                }
                break;
            }
            event = changes.recv() => match event {
                Ok(event) => print!("{}", report::render(event.reason, &client.snapshot())),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Change signals lagged");
                    print!("{}", report::render(ChangeReason::Updated, &client.snapshot()));
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.shutdown().await;
    Ok(())
}
