//! # firehose
//!
//! Host server binary: loads settings, installs the firehose on the host's
//! upgrade listeners, and serves until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use firehose_core::{Target, WILDCARD};
use firehose_server::trigger::{self, FirehoseOptions};
use firehose_server::{Firehose, HostServer, Invocation, ServerConfig};
use firehose_settings::FirehoseSettings;

/// Realtime event dispatcher over a shared upgrade endpoint.
#[derive(Parser, Debug)]
#[command(name = "firehose", about = "Realtime event dispatcher")]
struct Cli {
    /// Settings file (defaults to `~/.firehose/settings.json`).
    #[arg(long, env = "FIREHOSE_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Upgrade path owned by the firehose.
    #[arg(long)]
    path: Option<String>,

    /// Log level filter (`RUST_LOG` still wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    /// Print the trigger options schema and exit.
    #[arg(long)]
    schema: bool,
}

impl Cli {
    /// Flags take precedence over file and environment settings.
    fn apply(&self, settings: &mut FirehoseSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.path {
            settings.server.upgrade_path.clone_from(path);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

fn server_config(settings: &FirehoseSettings) -> ServerConfig {
    ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        upgrade_path: settings.server.upgrade_path.clone(),
        max_message_size: settings.server.max_message_size,
        send_queue_capacity: settings.server.send_queue_capacity,
    }
}

/// Log every connection lifecycle event.
fn register_audit_log(firehose: &Firehose) {
    firehose.register(
        Some(Arc::new(|inv: Invocation| {
            tracing::info!(
                event = %inv.event,
                conn_id = inv.client.id(),
                remote = ?inv.client.remote_address(),
                pool = inv.pool.size(),
                "firehose lifecycle"
            );
        })),
        Target::new("firehose", "audit"),
        &FirehoseOptions::new(WILDCARD),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    if args.schema {
        println!("{}", serde_json::to_string_pretty(&trigger::schema())?);
        return Ok(());
    }

    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(firehose_settings::settings_path);
    let mut settings = firehose_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    firehose_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let metrics = match firehose_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder not installed, /metrics disabled");
            None
        }
    };

    let firehose = Arc::new(Firehose::new(settings.dispatch.wildcard_mode));
    register_audit_log(&firehose);

    let server = HostServer::new(server_config(&settings), firehose, metrics);
    let _mux = server.install_firehose();

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    tracing::info!(
        wildcard_mode = ?settings.dispatch.wildcard_mode,
        "firehose listening on ws://{addr}{}",
        settings.server.upgrade_path
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let timeout = Duration::from_secs(settings.server.shutdown_timeout_secs);
    let _ = server
        .shutdown()
        .graceful_shutdown(vec![handle], timeout)
        .await;

    tracing::info!("Shutdown complete");
    Ok(())
}
