//! Server configuration: TOML file + CLI overrides.

use gatewatch_core::{AdmissionConfig, GatewatchError, Result, ScannerConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds a client has to send its `hello` frame.
    #[serde(default = "default_hello_timeout")]
    pub hello_timeout: u64,
    /// Seconds between admission state collections.
    #[serde(default = "default_gc_interval")]
    pub gc_interval: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            hello_timeout: default_hello_timeout(),
            gc_interval: default_gc_interval(),
        }
    }
}

/// `[auth]` section of the config TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSection {
    /// HMAC secret for bearer tokens. Without it only token presence is checked.
    #[serde(default)]
    pub token_secret: Option<String>,
    /// Token that unlocks the scanner commands (`scan_status`, `add_range`,
    /// `start_scan`, `stop_scan`).
    #[serde(default)]
    pub admin_token: Option<String>,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3001
}
fn default_hello_timeout() -> u64 {
    10
}
fn default_gc_interval() -> u64 {
    60
}

/// Resolved server configuration (CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub hello_timeout: u64,
    pub gc_interval: u64,
    pub token_secret: Option<Vec<u8>>,
    pub admin_token: Option<String>,
    pub admission: AdmissionConfig,
    pub scanner: ScannerConfig,
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_bind: Option<&str>,
        cli_port: Option<u16>,
        cli_enable_scanner: bool,
    ) -> Result<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    parse(&content)?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        Ok(Self::merge(file_config, cli_bind, cli_port, cli_enable_scanner))
    }

    fn merge(
        file: ConfigFile,
        cli_bind: Option<&str>,
        cli_port: Option<u16>,
        cli_enable_scanner: bool,
    ) -> Self {
        let mut scanner = file.scanner;
        scanner.enabled |= cli_enable_scanner;

        Self {
            bind: cli_bind.map(str::to_string).unwrap_or(file.server.bind),
            port: cli_port.unwrap_or(file.server.port),
            hello_timeout: file.server.hello_timeout,
            gc_interval: file.server.gc_interval.max(1),
            token_secret: file
                .auth
                .token_secret
                .filter(|s| !s.is_empty())
                .map(String::into_bytes),
            admin_token: file.auth.admin_token.filter(|s| !s.is_empty()),
            admission: file.admission,
            scanner,
        }
    }
}

fn parse(content: &str) -> Result<ConfigFile> {
    toml::from_str::<ConfigFile>(content)
        .map_err(|e| GatewatchError::Config(format!("config parse error: {e}")))
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = parse("").unwrap();
        let config = ServerConfig::merge(file, None, None, false);
        assert_eq!(config.port, 3001);
        assert_eq!(config.admission.rate_limit, 50);
        assert_eq!(config.admission.max_connections_per_source, 5);
        assert!(!config.scanner.enabled);
        assert!(config.token_secret.is_none());
    }

    #[test]
    fn test_sections_and_overrides() {
        let file = parse(
            r#"
            [server]
            port = 9000

            [auth]
            token_secret = "s3cret"
            admin_token = ""

            [admission]
            rate_window_ms = 10000
            rate_limit = 5

            [scanner]
            seeds = ["192.0.2.1"]
            target_pattern = "shop"
            probe_port = 8080
            "#,
        )
        .unwrap();
        let config = ServerConfig::merge(file, Some("127.0.0.1"), None, true);
        assert_eq!(config.bind, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.token_secret.as_deref(), Some(&b"s3cret"[..]));
        assert!(config.admin_token.is_none());
        assert_eq!(config.admission.rate_limit, 5);
        assert_eq!(config.admission.spam_limit, 10);
        assert!(config.scanner.enabled);
        assert_eq!(config.scanner.probe_port, 8080);
        assert_eq!(config.scanner.radius_floor, 10);
    }

    #[test]
    fn test_parse_error_is_config_error() {
        assert!(matches!(parse("[server"), Err(GatewatchError::Config(_))));
    }
}
