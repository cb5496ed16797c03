use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{DownloaderError, Result};
use crate::sources::SourceId;

/// Placeholder values shipped in sample config files; treated as unset
const PLACEHOLDER_CLIENT_ID: &str = "your_spotify_client_id_here";
const PLACEHOLDER_CLIENT_SECRET: &str = "your_spotify_client_secret_here";

/// API Keys configuration for the catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

impl ApiKeys {
    /// Both credentials present, non-blank and not the sample placeholders
    pub fn are_credentials_set(&self) -> bool {
        match (&self.spotify_client_id, &self.spotify_client_secret) {
            (Some(id), Some(secret)) => {
                !id.trim().is_empty()
                    && !secret.trim().is_empty()
                    && !id.contains(PLACEHOLDER_CLIENT_ID)
                    && !secret.contains(PLACEHOLDER_CLIENT_SECRET)
            }
            _ => false,
        }
    }

    /// Environment variables win over the file
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("SPOTIFY_CLIENT_ID") {
            self.spotify_client_id = Some(id);
        }
        if let Ok(secret) = std::env::var("SPOTIFY_CLIENT_SECRET") {
            self.spotify_client_secret = Some(secret);
        }
    }
}

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 1080,
            username: None,
            password: None,
        }
    }
}

impl ProxyConfig {
    /// Proxy URL understood by both reqwest and yt-dlp, `None` when disabled
    pub fn url(&self) -> Option<String> {
        if !self.enabled {
            return None;
        }
        Some(match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                format!("http://{}:{}@{}:{}", username, password, self.host, self.port)
            }
            _ => format!("http://{}:{}", self.host, self.port),
        })
    }
}

/// Fallback policy for resolving one track into acquisition attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Sources in priority order, most reliable first
    pub sources: Vec<SourceId>,
    /// Query templates, most specific first. `{artist}` and `{title}` are substituted.
    pub query_templates: Vec<String>,
    /// Attempts per track, clamped to `1..=MAX_ATTEMPTS_PER_TRACK`
    pub max_attempts: usize,
    pub attempt_timeout_secs: u64,
    pub inter_track_delay_ms: u64,
    /// Candidates requested from a source per search
    pub search_results: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sources: vec![SourceId::Youtube, SourceId::Soundcloud],
            query_templates: vec![
                "{artist} {title} official audio".to_string(),
                "{artist} {title} audio".to_string(),
                "{title} {artist}".to_string(),
            ],
            max_attempts: 5,
            attempt_timeout_secs: 120,
            inter_track_delay_ms: 1000,
            search_results: 3,
        }
    }
}

impl AcquisitionConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn inter_track_delay(&self) -> Duration {
        Duration::from_millis(self.inter_track_delay_ms)
    }
}

/// yt-dlp invocation settings, including the headers used to look like a browser
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YtDlpConfig {
    pub executable_path: String,
    pub audio_format: String,
    pub audio_quality: String,
    pub user_agent: String,
    pub referer: Option<String>,
    pub socket_timeout_secs: u32,
    pub retries: u32,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            executable_path: "yt-dlp".to_string(),
            audio_format: "mp3".to_string(),
            audio_quality: "192K".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            referer: Some("https://www.youtube.com/".to_string()),
            socket_timeout_secs: 30,
            retries: 3,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub download_directory: PathBuf,
    /// Put each playlist into its own sanitized subfolder
    pub per_playlist_folder: bool,
    pub api_keys: ApiKeys,
    pub proxy_config: ProxyConfig,
    pub acquisition: AcquisitionConfig,
    pub yt_dlp: YtDlpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_directory: default_download_directory(),
            per_playlist_folder: false,
            api_keys: ApiKeys::default(),
            proxy_config: ProxyConfig::default(),
            acquisition: AcquisitionConfig::default(),
            yt_dlp: YtDlpConfig::default(),
        }
    }
}

fn default_download_directory() -> PathBuf {
    dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Music")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Playlist Downloads")
}

impl Config {
    /// Get the configuration directory path
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .ok_or_else(|| DownloaderError::Config("Could not find config directory".to_string()))
            .map(|dir| dir.join("playlist-downloader"))
    }

    /// Get the settings file path (TOML format)
    pub fn settings_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the JSON settings file path
    pub fn json_settings_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Get the local JSON settings file path (in the working directory)
    pub fn local_json_settings_path() -> Result<PathBuf> {
        Ok(std::env::current_dir()?.join("config.json"))
    }

    /// The file `load` reads and `save` writes: local JSON, then config-dir JSON,
    /// then the TOML settings file (which may not exist yet)
    pub fn active_path() -> Result<PathBuf> {
        for json_path in [Self::local_json_settings_path(), Self::json_settings_path()]
            .into_iter()
            .flatten()
        {
            if json_path.exists() {
                return Ok(json_path);
            }
        }
        Self::settings_path()
    }

    /// Configuration for running: the active file plus environment credentials.
    /// Never save the result; use [`load_stored`](Self::load_stored) for edits.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::active_path()?)
    }

    /// Like [`load`](Self::load), for an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::load_stored(path)?;
        config.api_keys.apply_env_overrides();
        Ok(config)
    }

    /// Exactly what is on disk at `path`, or defaults when the file is missing
    pub fn load_stored(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let config = if is_json(path) {
            Self::load_from_json(path)?
        } else {
            Self::load_from_toml(path)?
        };
        info!("Configuration loaded from: {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_toml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DownloaderError::Config(format!("Failed to read settings file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| DownloaderError::Config(format!("Failed to parse settings file: {}", e)))
    }

    /// Load configuration from a JSON file
    fn load_from_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DownloaderError::Config(format!("Failed to read JSON settings file: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| DownloaderError::Config(format!("Failed to parse JSON settings file: {}", e)))
    }

    /// Save configuration to the file `load` would read next time
    pub fn save(&self) -> Result<PathBuf> {
        let settings_path = Self::active_path()?;
        self.save_to(&settings_path)?;
        Ok(settings_path)
    }

    /// Save configuration to an explicit path, as JSON for `.json` files and TOML otherwise
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DownloaderError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self).map_err(|e| {
                DownloaderError::Config(format!("Failed to serialize JSON settings: {}", e))
            })?
        } else {
            toml::to_string_pretty(self).map_err(|e| {
                DownloaderError::Config(format!("Failed to serialize TOML settings: {}", e))
            })?
        };

        std::fs::write(path, content)
            .map_err(|e| DownloaderError::Config(format!("Failed to write settings file: {}", e)))?;
        info!("Configuration saved to: {}", path.display());
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}
