// Configuration management for subpipe
// Handles loading/saving settings, with sensible defaults when config is missing

use anyhow::{bail, Context, Result};
use dirs::{config_dir, data_local_dir};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

use crate::session::commands::Controls;

const APP_DIR: &str = "subpipe";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub streaming: StreamingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    /// Subsonic REST API version; below 1.13.0 the password is sent in clear.
    pub api: String,
    pub ssl: bool,
    pub verify_ssl: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Transcoding format passed to the `stream` endpoint ("raw" = no transcoding)
    pub format: String,
    /// Flip the meaning of `--randomise`
    pub invert_random: bool,
    pub notify: bool,
    pub image_size: u32,
    pub player: String,
    pub controls: Controls,
    pub ffplay: FfplayConfig,
    pub mpv: MpvConfig,
    pub vlc: VlcConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FfplayConfig {
    pub display: bool,
    pub show_mode: u8,
    /// Command prefixed to the ffplay invocation, e.g. "nice -n 10"
    pub pre_exe: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MpvConfig {
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VlcConfig {
    /// Seconds to wait after launch before vlc reports its state reliably
    pub playing_interval: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            api: "1.16.1".to_string(),
            ssl: false,
            verify_ssl: true,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            format: "raw".to_string(),
            invert_random: false,
            notify: true,
            image_size: 512,
            player: "ffplay".to_string(),
            controls: Controls::default(),
            ffplay: FfplayConfig::default(),
            mpv: MpvConfig::default(),
            vlc: VlcConfig::default(),
        }
    }
}

impl Default for VlcConfig {
    fn default() -> Self {
        Self { playing_interval: 2 }
    }
}

impl Config {
    /// Load from `path`, writing the defaults first when the file is missing.
    /// Returns the config and whether it was freshly created.
    pub fn load_or_create(path: &Path) -> Result<(Self, bool)> {
        if path.exists() {
            Ok((Self::load_from(path)?, false))
        } else {
            let config = Config::default();
            config.save_to(path)?;
            info!("Wrote default config to {}", path.display());
            Ok((config, true))
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    /// Reject configs the client cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            bail!("server.host is not set.\nPlease adjust your config file by running:\n  subpipe -c");
        }

        let controls = &self.streaming.controls;
        for (name, key) in controls.bindings() {
            if key.trim().is_empty() {
                bail!("streaming.controls.{name} must not be empty");
            }
        }

        if let Some((a, b)) = controls.first_overlap() {
            warn!("Control keys '{a}' and '{b}' overlap; the first in previous/next/restart/exit order wins");
        }

        Ok(())
    }

    /// `$SUBPIPE_CONFIG`, else `<config dir>/subpipe/config.toml`
    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("SUBPIPE_CONFIG") {
            return Ok(PathBuf::from(path));
        }

        let config_dir = config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join(APP_DIR);

        Ok(config_dir.join("config.toml"))
    }

    /// Directory for logs and other transient state.
    pub fn state_dir() -> Result<PathBuf> {
        let dir = data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find local data directory"))?
            .join(APP_DIR);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Open `path` in `$VISUAL`/`$EDITOR` (falls back to `vi`) and wait for it.
pub fn edit_file(path: &Path) -> Result<()> {
    let editor = env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| "vi".to_string());

    let status = Command::new(&editor)
        .arg(path)
        .status()
        .with_context(|| {
            format!(
                "Unable to open your config file with '{editor}'.\nPlease open {} manually to edit your config file",
                path.display()
            )
        })?;

    if !status.success() {
        warn!("Editor '{editor}' exited with {status}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            host = "music.example.com"
            username = "alice"

            [streaming]
            player = "mpv"

            [streaming.controls]
            next = "j"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.host, "music.example.com");
        assert_eq!(config.server.api, "1.16.1");
        assert!(config.server.verify_ssl);
        assert_eq!(config.streaming.player, "mpv");
        assert_eq!(config.streaming.format, "raw");
        assert_eq!(config.streaming.controls.next, "j");
        assert_eq!(config.streaming.controls.previous, "p");
        assert_eq!(config.streaming.vlc.playing_interval, 2);
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let (config, created) = Config::load_or_create(&path).unwrap();
        assert!(created);
        assert!(path.exists());
        assert_eq!(config.streaming.player, "ffplay");

        let (again, created) = Config::load_or_create(&path).unwrap();
        assert!(!created);
        assert_eq!(again.streaming.image_size, 512);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.server.host = "localhost:4533".to_string();
        config.streaming.invert_random = true;
        config.streaming.ffplay.pre_exe = "nice -n 10".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.server.host, "localhost:4533");
        assert!(loaded.streaming.invert_random);
        assert_eq!(loaded.streaming.ffplay.pre_exe, "nice -n 10");
    }

    #[test]
    fn test_validate_requires_host() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.host = "localhost".to_string();
        assert!(config.validate().is_ok());

        config.streaming.controls.exit = " ".to_string();
        assert!(config.validate().is_err());
    }
}
