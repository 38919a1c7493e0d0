// Configuration management for deck
// Handles loading/saving settings, with sensible defaults when config is missing

use anyhow::Result;
use dirs::{config_dir, data_dir};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const TOKEN_ENV: &str = "DECK_LISTENBRAINZ_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub player: PlayerConfig,
    pub logging: LoggingConfig,
    pub scrobble: ScrobbleConfig,
    pub nfc: NfcConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_path: PathBuf,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub tick_ms: u64,
    pub key_timeout_ms: u64,
    pub seek_step_seconds: f64,
    pub volume_step: i64,
    pub recently_played_limit: usize,
    /// how long the seek glyph stays on screen
    pub seek_indicator_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrobbleConfig {
    pub enabled: bool,
    pub api_url: String,
    pub token: Option<String>,
    pub poll_ms: u64,
    pub attempts: u32,
    pub retry_delay_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NfcConfig {
    /// Line-oriented UID source (FIFO or serial bridge). None disables the listener.
    pub device: Option<PathBuf>,
    pub playlist_dir: PathBuf,
    pub retrigger_seconds: u64,
    pub poll_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deck");

        Self {
            store: StoreConfig {
                database_path: data_dir.join("deck.db"),
                namespace: "deck".to_string(),
            },
            player: PlayerConfig::default(),
            logging: LoggingConfig {
                directory: data_dir.join("logs"),
            },
            scrobble: ScrobbleConfig {
                enabled: true,
                api_url: "https://api.listenbrainz.org".to_string(),
                token: None,
                poll_ms: 1000,
                attempts: 3,
                retry_delay_seconds: 5,
            },
            nfc: NfcConfig {
                device: None,
                playlist_dir: PathBuf::from("nfc"),
                retrigger_seconds: 10,
                poll_ms: 500,
            },
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 200,
            key_timeout_ms: 100,
            seek_step_seconds: 15.0,
            volume_step: 50,
            recently_played_limit: 100,
            seek_indicator_ms: 200,
        }
    }
}

impl PlayerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn key_timeout(&self) -> Duration {
        Duration::from_millis(self.key_timeout_ms)
    }

    pub fn seek_indicator(&self) -> Duration {
        Duration::from_millis(self.seek_indicator_ms)
    }
}

impl ScrobbleConfig {
    /// Token from the environment wins over the file so secrets can stay out of it
    pub fn resolved_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.token.clone())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(config_path, content)?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("deck");

        Ok(config_dir.join("config.toml"))
    }
}
