use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Identifier used to compute per-app configuration directories.
#[derive(Clone, Copy)]
pub struct AppId {
    /// Reverse-DNS style qualifier, e.g. `"com"`.
    pub qualifier: &'static str,
    /// Organization or vendor name, e.g. `"local"`.
    pub organization: &'static str,
    /// Application name, e.g. `"crabwatch"`.
    pub application: &'static str,
}

/// Application configuration persisted to `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Tracing level to use if `RUST_LOG` is not set (e.g. `"info"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL of the crab server.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Client-side timeout of one long-poll request (ms).
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// Wait before resuming the stream after a failure (ms).
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Timeout of a job info request (ms).
    #[serde(default = "default_info_timeout_ms")]
    pub info_timeout_ms: u64,
    /// Address of the local status view, e.g. `"127.0.0.1:8090"`; disabled if unset.
    #[serde(default)]
    pub status_addr: Option<String>,
}

fn default_log_level() -> String { "info".to_string() }
fn default_server_url() -> String { "http://localhost:8000".to_string() }
fn default_poll_timeout_ms() -> u64 { 160_000 }
fn default_reconnect_delay_ms() -> u64 { 600_000 }
fn default_info_timeout_ms() -> u64 { 10_000 }

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server_url: default_server_url(),
            poll_timeout_ms: default_poll_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            info_timeout_ms: default_info_timeout_ms(),
            status_addr: None,
        }
    }
}

impl Config {
    /// Long-poll timeout as a [`Duration`].
    pub fn poll_timeout(&self) -> Duration { Duration::from_millis(self.poll_timeout_ms) }
    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration { Duration::from_millis(self.reconnect_delay_ms) }
    /// Job info timeout as a [`Duration`].
    pub fn info_timeout(&self) -> Duration { Duration::from_millis(self.info_timeout_ms) }
}

/// Return the configuration directory for this app, creating it if needed.
pub fn config_dir(app: &AppId) -> Result<PathBuf> {
    let pd = ProjectDirs::from(app.qualifier, app.organization, app.application)
        .ok_or_else(|| anyhow::anyhow!("failed to resolve ProjectDirs"))?;
    let dir = pd.config_dir().to_path_buf();
    fs::create_dir_all(&dir).with_context(|| format!("create config dir {}", dir.display()))?;
    Ok(dir)
}

/// Load `config.toml` from the app config dir or create a default one.
pub fn load_or_init(app: &AppId) -> Result<Config> {
    let dir = config_dir(app)?;
    load_or_init_at(&dir.join("config.toml"))
}

/// Load the config at `path`, writing the defaults there first if it is missing.
pub fn load_or_init_at(path: &Path) -> Result<Config> {
    if path.exists() {
        let txt = fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&txt)
            .with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    } else {
        let cfg = Config::default();
        save_config(path, &cfg)?;
        Ok(cfg)
    }
}

fn save_config(path: &Path, cfg: &Config) -> Result<()> {
    let s = toml::to_string_pretty(cfg)?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
