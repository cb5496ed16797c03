use thiserror::Error;

/// Main error type for the playlist downloader
#[derive(Error, Debug)]
pub enum DownloaderError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Playlist not found: {0}")]
    PlaylistNotFound(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("yt-dlp error: {0}")]
    YtDlp(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, DownloaderError>;

/// Helper trait for converting foreign errors that only implement `Display`
pub trait IntoDownloaderError<T> {
    fn into_downloader_error(self) -> Result<T>;
}

impl<T, E> IntoDownloaderError<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn into_downloader_error(self) -> Result<T> {
        self.map_err(|e| DownloaderError::Unknown(e.to_string()))
    }
}
