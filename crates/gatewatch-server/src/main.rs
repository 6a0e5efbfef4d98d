//! gatewatch-server: WebSocket gateway with admission control.
//!
//! Evaluates every connection and message against the admission gate and,
//! when explicitly enabled, runs the background network scanner.

mod config;
mod protocol;
mod server;
mod transport;

use clap::Parser;
use config::ServerConfig;
use gatewatch_core::{Gateway, Scanner, SystemProbe};
use server::GatewatchServer;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// gatewatch-server: WebSocket gateway with admission control
#[derive(Parser, Debug)]
#[command(name = "gatewatch-server", version, about = "WebSocket gateway with admission control")]
struct Cli {
    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.gatewatch/config.toml")]
    config: String,

    /// Enable the background scanner (seeds must be set in the config file)
    #[arg(long)]
    enable_scanner: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also append log output to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let (file_layer, file_error) = match cli.log_file.as_deref().map(open_log_file) {
        Some(Ok(file)) => (
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            None,
        ),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .with(env_filter)
        .init();
    if let Some(e) = file_error {
        warn!(error = %e, "cannot open log file, logging to stdout only");
    }

    let config_path = PathBuf::from(&cli.config);
    let server_config = match ServerConfig::load(
        Some(&config_path),
        cli.bind.as_deref(),
        cli.port,
        cli.enable_scanner,
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = server_config.port,
        "starting gatewatch-server"
    );

    let scanner = match Scanner::new(server_config.scanner.clone(), Arc::new(SystemProbe::new())) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, "invalid scanner configuration");
            std::process::exit(1);
        }
    };
    if scanner.config().enabled {
        if scanner.config().seeds.is_empty() {
            warn!("scanner enabled without seed bases; it will only sweep ranges added at runtime");
        }
        info!(
            seeds = scanner.config().seeds.len(),
            port = scanner.config().probe_port,
            "scanner armed, starts on first admitted connection"
        );
    }

    let gateway = Arc::new(Gateway::new(&server_config.admission, Some(scanner)));
    let server = GatewatchServer::new(server_config, gateway.clone());

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                gateway.stop_scanner();
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    gateway.stop_scanner();
    info!("gatewatch-server stopped");
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_log_file_created_with_parent_dirs_and_appended() {
        let dir = std::env::temp_dir().join(format!("gatewatch-log-{}", std::process::id()));
        let path = dir.join("nested").join("gatewatch.log");

        writeln!(open_log_file(&path).unwrap(), "first").unwrap();
        writeln!(open_log_file(&path).unwrap(), "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_cli_log_file_flag() {
        let cli = Cli::parse_from(["gatewatch-server", "--log-file", "/var/log/gatewatch.log"]);
        assert_eq!(cli.log_file, Some(PathBuf::from("/var/log/gatewatch.log")));
        assert!(Cli::parse_from(["gatewatch-server"]).log_file.is_none());
    }
}
