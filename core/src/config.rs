//! Configuration management for capture and visualization settings.
//!
//! Stores configuration in JSON format at `~/.netscope/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::capture::TcpdumpLauncher;
use crate::error::{Error, Result};
use crate::layout::LayoutConfig;
use crate::state::DEFAULT_TTL;

/// Configuration data stored in JSON format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Capture tool executable, looked up on `PATH` when not absolute.
    #[serde(default = "default_capture_program")]
    pub capture_program: String,

    /// Arguments placed before `-i <interface>`.
    #[serde(default = "default_capture_args")]
    pub capture_args: Vec<String>,

    /// Filter applied when a start request does not carry one.
    #[serde(default)]
    pub default_filter: Option<String>,

    #[serde(default = "default_ttl_ms")]
    pub device_ttl_ms: u64,

    #[serde(default = "default_ttl_ms")]
    pub connection_ttl_ms: u64,

    /// Run a full layout pass on every Nth snapshot.
    #[serde(default = "default_layout_every")]
    pub layout_every: u32,

    #[serde(default)]
    pub layout: LayoutConfig,
}

fn default_capture_program() -> String {
    "tcpdump".to_string()
}

fn default_capture_args() -> Vec<String> {
    TcpdumpLauncher::DEFAULT_ARGS
        .iter()
        .map(|a| a.to_string())
        .collect()
}

fn default_ttl_ms() -> u64 {
    DEFAULT_TTL.as_millis() as u64
}

fn default_layout_every() -> u32 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture_program: default_capture_program(),
            capture_args: default_capture_args(),
            default_filter: None,
            device_ttl_ms: default_ttl_ms(),
            connection_ttl_ms: default_ttl_ms(),
            layout_every: default_layout_every(),
            layout: LayoutConfig::default(),
        }
    }
}

impl Config {
    pub fn device_ttl(&self) -> Duration {
        Duration::from_millis(self.device_ttl_ms)
    }

    pub fn connection_ttl(&self) -> Duration {
        Duration::from_millis(self.connection_ttl_ms)
    }

    /// Launcher for the configured capture tool.
    pub fn launcher(&self) -> TcpdumpLauncher {
        TcpdumpLauncher::with_program(&self.capture_program, self.capture_args.clone())
    }
}

/// Configuration store for reading and writing settings.
///
/// Handles reading and writing configuration to `~/.netscope/config.json`.
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Create a new config store with the default path.
    ///
    /// Default path: `~/.netscope/config.json`
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

        Ok(Self {
            config_path: home.join(".netscope").join("config.json"),
        })
    }

    /// Create a config store with a custom path (for testing).
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Directory holding the config file.
    pub fn config_dir(&self) -> Option<&Path> {
        self.config_path.parent()
    }

    /// Load configuration from disk.
    ///
    /// Returns default config if the file doesn't exist.
    pub async fn load(&self) -> Result<Config> {
        if !fs::try_exists(&self.config_path).await.unwrap_or(false) {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub async fn save(&self, config: &Config) -> Result<()> {
        if let Some(dir) = self.config_dir().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        // Write to a sibling temp file, then rename over the real one
        let temp_path = self.config_path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to create temp config file: {}", e)))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        file.sync_all()
            .await
            .map_err(|e| Error::Config(format!("Failed to sync config: {}", e)))?;

        fs::rename(&temp_path, &self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to rename config file: {}", e)))?;

        tracing::debug!(path = %self.config_path.display(), "Saved config");
        Ok(())
    }

    // =========================================================================
    // Settings
    // =========================================================================

    pub async fn get_device_ttl(&self) -> Result<Duration> {
        Ok(self.load().await?.device_ttl())
    }

    pub async fn set_device_ttl(&self, ttl: Duration) -> Result<()> {
        let mut config = self.load().await?;
        config.device_ttl_ms = ttl_millis(ttl)?;
        self.save(&config).await
    }

    pub async fn get_connection_ttl(&self) -> Result<Duration> {
        Ok(self.load().await?.connection_ttl())
    }

    pub async fn set_connection_ttl(&self, ttl: Duration) -> Result<()> {
        let mut config = self.load().await?;
        config.connection_ttl_ms = ttl_millis(ttl)?;
        self.save(&config).await
    }

    /// Get the filter used when a start request has none.
    pub async fn get_default_filter(&self) -> Result<Option<String>> {
        Ok(self.load().await?.default_filter)
    }

    /// Set or clear the default filter. Blank filters clear it.
    pub async fn set_default_filter(&self, filter: Option<&str>) -> Result<()> {
        let mut config = self.load().await?;
        config.default_filter = filter
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        self.save(&config).await
    }
}

fn ttl_millis(ttl: Duration) -> Result<u64> {
    let millis = u64::try_from(ttl.as_millis())
        .map_err(|_| Error::Config(format!("TTL out of range: {:?}", ttl)))?;
    if millis == 0 {
        return Err(Error::Config("TTL must be greater than zero".to_string()));
    }
    Ok(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureLauncher;
    use tempfile::tempdir;

    async fn test_store() -> (ConfigStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        (ConfigStore::with_path(path), dir)
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _dir) = test_store().await;
        let config = store.load().await.unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.capture_program, "tcpdump");
        assert_eq!(config.capture_args, vec!["-l", "-n", "-e"]);
        assert_eq!(config.device_ttl_ms, 300_000);
        assert_eq!(config.layout_every, 5);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _dir) = test_store().await;

        let config = Config {
            capture_program: "/usr/sbin/tcpdump".to_string(),
            default_filter: Some("not port 22".to_string()),
            layout_every: 2,
            ..Config::default()
        };
        store.save(&config).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, config);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let (store, _dir) = test_store().await;
        fs::create_dir_all(store.config_dir().unwrap()).await.unwrap();
        fs::write(store.path(), r#"{"deviceTtlMs": 1000, "layout": {"width": 640}}"#)
            .await
            .unwrap();

        let config = store.load().await.unwrap();
        assert_eq!(config.device_ttl_ms, 1000);
        assert_eq!(config.connection_ttl_ms, 300_000);
        assert_eq!(config.layout.width, 640.0);
        assert_eq!(config.layout.height, 800.0);
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let (store, _dir) = test_store().await;
        fs::create_dir_all(store.config_dir().unwrap()).await.unwrap();
        fs::write(store.path(), "{not json").await.unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_ttl_settings() {
        let (store, _dir) = test_store().await;

        store.set_device_ttl(Duration::from_secs(60)).await.unwrap();
        store.set_connection_ttl(Duration::from_secs(30)).await.unwrap();

        assert_eq!(store.get_device_ttl().await.unwrap(), Duration::from_secs(60));
        assert_eq!(store.get_connection_ttl().await.unwrap(), Duration::from_secs(30));

        let result = store.set_device_ttl(Duration::ZERO).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_default_filter() {
        let (store, _dir) = test_store().await;

        store.set_default_filter(Some(" udp ")).await.unwrap();
        assert_eq!(store.get_default_filter().await.unwrap().as_deref(), Some("udp"));

        store.set_default_filter(Some("   ")).await.unwrap();
        assert_eq!(store.get_default_filter().await.unwrap(), None);
    }

    #[test]
    fn test_launcher_from_config() {
        let config = Config {
            capture_program: "/opt/bin/tcpdump".to_string(),
            ..Config::default()
        };
        let launcher = config.launcher();
        assert_eq!(launcher.program(), "/opt/bin/tcpdump");
    }
}
