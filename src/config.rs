use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use stripbar_audio::AudioOptions;
use thiserror::Error;
use tracing::{debug, warn};

const APP_DIR: &str = "stripbar";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioOptions,
    pub panel: PanelConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub frame_interval_ms: u64,
    pub show_peaks: bool,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 40,
            show_peaks: true,
        }
    }
}

impl PanelConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

/// `$XDG_CONFIG_HOME/stripbar/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// An explicit path must load; the default location may be absent. Any
/// failure falls back to built-in defaults.
pub fn load_or_default(explicit: Option<&Path>) -> AppConfig {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_path() {
            Some(path) if path.exists() => path,
            _ => {
                debug!("no config file, using defaults");
                return AppConfig::default();
            }
        },
    };
    match load(&path) {
        Ok(config) => {
            debug!("loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{e}; using defaults");
            AppConfig::default()
        }
    }
}
