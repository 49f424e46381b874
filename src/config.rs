//! Configuration for the XHDR server
//!
//! Loads configuration from TOML file at `~/.config/xhdr/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::capability::HdrSettings;
use crate::dispatch::DispatchTimeouts;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hdr: HdrConfig,
    pub server: ServerConfig,
}

impl Config {
    pub fn dispatch_timeouts(&self) -> DispatchTimeouts {
        DispatchTimeouts {
            resolve: Duration::from_millis(self.server.resolve_timeout_ms),
            apply: self.hdr.apply_timeout(),
        }
    }

    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            // Auto-generate default config file
            if let Err(e) = Self::save_default(config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("xhdr");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// HDR feature configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HdrConfig {
    /// Master switch; when off every screen reports no HDR support
    pub enable_hdr10: bool,
    /// Upper bound on a backend capability probe, in milliseconds
    pub probe_timeout_ms: u64,
    /// Upper bound on handing metadata to the backend, in milliseconds
    pub apply_timeout_ms: u64,
    /// Bit depth reported for HDR outputs that don't advertise one
    pub default_max_depth: u8,
}

impl Default for HdrConfig {
    fn default() -> Self {
        Self {
            enable_hdr10: true,
            probe_timeout_ms: 500,
            apply_timeout_ms: 250,
            default_max_depth: 10,
        }
    }
}

impl HdrConfig {
    pub fn settings(&self) -> HdrSettings {
        HdrSettings {
            enabled: self.enable_hdr10,
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            default_max_depth: self.default_max_depth,
        }
    }

    pub fn apply_timeout(&self) -> Duration {
        Duration::from_millis(self.apply_timeout_ms)
    }
}

/// Socket and access configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket to listen on; defaults to `$XDG_RUNTIME_DIR/xhdr.sock`
    pub socket_path: Option<PathBuf>,
    /// Extra users allowed to set metadata on windows
    pub trusted_uids: Vec<u32>,
    /// Upper bound on a window or screen lookup against the X server, in milliseconds
    pub resolve_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            trusted_uids: Vec::new(),
            resolve_timeout_ms: 250,
        }
    }
}

impl ServerConfig {
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(xhdr_proto::socket_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xhdr").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        // the generated file parses back to the same thing
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[hdr]\nenable_hdr10 = false\n\n[server]\ntrusted_uids = [1001]\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(!config.hdr.enable_hdr10);
        assert_eq!(config.hdr.probe_timeout_ms, 500);
        assert_eq!(config.server.trusted_uids, vec![1001]);
        assert_eq!(config.server.socket_path, None);
        assert_eq!(
            config.dispatch_timeouts().resolve,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[hdr\nenable_hdr10 = ").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_settings_conversion() {
        let hdr = HdrConfig {
            probe_timeout_ms: 20,
            apply_timeout_ms: 30,
            ..HdrConfig::default()
        };
        let settings = hdr.settings();
        assert!(settings.enabled);
        assert_eq!(settings.probe_timeout, Duration::from_millis(20));
        assert_eq!(settings.default_max_depth, 10);
        assert_eq!(hdr.apply_timeout(), Duration::from_millis(30));
    }

    #[test]
    fn test_explicit_socket_path() {
        let server = ServerConfig {
            socket_path: Some(PathBuf::from("/tmp/custom.sock")),
            trusted_uids: Vec::new(),
            ..ServerConfig::default()
        };
        assert_eq!(server.socket_path(), PathBuf::from("/tmp/custom.sock"));
    }
}
