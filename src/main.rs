// src/main.rs
//! Game Telemetry reference host
//!
//! Reads one event per line from stdin and delivers it through the pipeline.
//! A line is `<name> [json properties]`, or one of the control words
//! `approve`, `deny`, `save`, `stats`. EOF or Ctrl-C drains the queue and
//! exits.

use anyhow::{Context, Result};
use game_telemetry::observability::init_tracing;
use game_telemetry::{FileConsentStore, HttpTransport, Properties, Telemetry, TelemetryConfig, TransportConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

/// Upper bound on how long the drain may hold up shutdown
const EXIT_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = TelemetryConfig::load()?;
    init_tracing(&config.logging)?;

    info!(
        "Starting Game Telemetry v{} ({})",
        game_telemetry::VERSION,
        game_telemetry::GIT_HASH
    );

    let transport = HttpTransport::new(TransportConfig::from(&config.server));
    let consent = FileConsentStore::new(&config.consent.config_file_path);
    let telemetry = Telemetry::start(config, Arc::new(transport), Box::new(consent))?;

    if telemetry.should_prompt_user().await? {
        info!("Consent required: type 'approve' or 'deny'");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => handle_line(&telemetry, line.trim()).await,
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, draining...");
                break;
            }
        }
    }

    telemetry.handle_exit();
    match tokio::time::timeout(EXIT_TIMEOUT, telemetry.wait_for_exit()).await {
        Ok(result) => {
            result?;
            info!("Telemetry drained");
        }
        Err(_) => warn!("Gave up waiting for telemetry after {:?}", EXIT_TIMEOUT),
    }

    Ok(())
}

async fn handle_line(telemetry: &Telemetry, line: &str) {
    match line {
        "" => {}
        "approve" => telemetry.approve(),
        "deny" => telemetry.deny(),
        "save" => match telemetry.save_queue().await {
            Ok(count) => info!("Saved {} pending events", count),
            Err(e) => error!("Failed to save queue: {}", e),
        },
        "stats" => match telemetry.stats().await {
            Ok(stats) => match serde_json::to_string(&stats) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("Failed to encode stats: {}", e),
            },
            Err(e) => error!("Failed to query stats: {}", e),
        },
        _ => {
            let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            match parse_properties(rest.trim()) {
                Ok(properties) => telemetry.add_event(name, properties),
                Err(e) => warn!("Ignoring '{}': {}", name, e),
            }
        }
    }
}

fn parse_properties(raw: &str) -> Result<Option<Properties>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let properties: Properties = serde_json::from_str(raw).context("properties must be a JSON object")?;
    Ok(Some(properties))
}
