use crate::catalog::{Catalog, SpotifyClient};
use crate::config::Config;
use crate::downloader::{DownloadOrchestrator, JobSnapshot, JobStatus, Track, TrackList};
use crate::errors::{DownloaderError, Result};
use crate::sources::YtDlp;
use crate::utils::fs::FileUtils;
use crate::utils::Utils;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Playlist Downloader - resolve catalog playlists into local audio files
#[derive(Parser)]
#[command(name = "playlist-downloader")]
#[command(about = "Download Spotify playlists using YouTube/SoundCloud as the audio source")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Read configuration from this TOML file instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download a playlist (or a selection of its tracks)
    Download {
        /// Spotify playlist URL or URI
        url: String,

        /// Only download these track ids (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        tracks: Option<Vec<String>>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Download a single track by artist and title
    Fetch {
        artist: String,
        title: String,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the tracks of a playlist
    Tracks {
        /// Spotify playlist URL or URI
        url: String,
    },

    /// Show playlist details
    Info {
        /// Spotify playlist URL or URI
        url: String,
    },

    /// List finished downloads
    Files {
        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set download directory
    SetDir {
        /// Directory path
        path: PathBuf,
    },

    /// Set Spotify API credentials
    SetSpotify {
        /// Client ID
        client_id: String,
        /// Client secret
        client_secret: String,
    },

    /// Reset to default settings
    Reset,
}

impl Cli {
    /// Load the configuration selected on the command line
    pub fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
    }

    /// Execute the CLI command
    pub async fn execute(self, mut config: Config) -> Result<()> {
        match self.command {
            Commands::Download { url, tracks, output } => {
                if let Some(output) = output {
                    config.download_directory = output;
                }
                handle_download(&config, &url, tracks).await
            }
            Commands::Fetch { artist, title, output } => {
                if let Some(output) = output {
                    config.download_directory = output;
                }
                handle_fetch(&config, artist, title).await
            }
            Commands::Tracks { url } => handle_tracks(&config, &url).await,
            Commands::Info { url } => handle_info(&config, &url).await,
            Commands::Files { output } => {
                handle_files(&output.unwrap_or_else(|| config.download_directory.clone()))
            }
            Commands::Config { command } => handle_config(&config, command, self.config.as_deref()),
        }
    }
}

fn build_catalog(config: &Config) -> Result<Arc<dyn Catalog>> {
    if !config.api_keys.are_credentials_set() {
        return Err(DownloaderError::Config(
            "Spotify credentials not set. Run `playlist-downloader config set-spotify <id> <secret>` \
             or set SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET"
                .to_string(),
        ));
    }

    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent("PlaylistDownloader/1.0");
    if let Some(proxy_url) = config.proxy_config.url() {
        builder = builder.proxy(reqwest::Proxy::all(&proxy_url)?);
    }

    Ok(Arc::new(SpotifyClient::new_with_client(
        config.api_keys.spotify_client_id.clone().unwrap_or_default(),
        config.api_keys.spotify_client_secret.clone().unwrap_or_default(),
        builder.build()?,
    )))
}

async fn warn_if_yt_dlp_missing(config: &Config) {
    if !YtDlp::from_config(config).is_available().await {
        warn!(
            "yt-dlp not found at '{}'; every attempt will fail until it is installed",
            config.yt_dlp.executable_path
        );
    }
}

async fn handle_download(config: &Config, url: &str, tracks: Option<Vec<String>>) -> Result<()> {
    let catalog = build_catalog(config)?;
    warn_if_yt_dlp_missing(config).await;

    let orchestrator = DownloadOrchestrator::from_config(config, Some(catalog))?;
    if !orchestrator.submit_playlist(url, tracks) {
        return Err(DownloaderError::Download("Download already in progress".to_string()));
    }

    let snapshot = follow(&orchestrator).await;
    orchestrator.wait().await;
    report(&snapshot, &orchestrator)
}

async fn handle_fetch(config: &Config, artist: String, title: String) -> Result<()> {
    warn_if_yt_dlp_missing(config).await;

    let track = Track::new(uuid::Uuid::new_v4().to_string(), title, vec![artist]);
    let orchestrator = DownloadOrchestrator::from_config(config, None)?;
    if !orchestrator.submit(TrackList::new(String::new(), vec![track])) {
        return Err(DownloaderError::Download("Download already in progress".to_string()));
    }

    let snapshot = follow(&orchestrator).await;
    orchestrator.wait().await;
    report(&snapshot, &orchestrator)
}

/// Print log lines as they arrive until the job reaches a terminal status.
/// Ctrl-C requests cancellation; the job stops after the current track.
async fn follow(orchestrator: &DownloadOrchestrator) -> JobSnapshot {
    let mut next_log = 0;
    let mut ticker = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                if orchestrator.cancel() {
                    println!("Cancelling after the current track...");
                }
            }
        }

        let snapshot = orchestrator.progress();
        for entry in orchestrator.logs(next_log) {
            println!("{} {}", entry.timestamp.format("%H:%M:%S"), entry.message);
            next_log = entry.index + 1;
        }
        if snapshot.status.is_terminal() {
            return snapshot;
        }
    }
}

fn report(snapshot: &JobSnapshot, orchestrator: &DownloadOrchestrator) -> Result<()> {
    println!();
    println!("Status: {}", snapshot.status);
    println!(
        "Downloaded: {} / {} ({} failed)",
        snapshot.successful, snapshot.total, snapshot.failed
    );
    println!("Output directory: {}", orchestrator.output_dir().display());

    match snapshot.status {
        JobStatus::Error => Err(DownloaderError::Download(
            snapshot.error.clone().unwrap_or_else(|| "unknown error".to_string()),
        )),
        _ => Ok(()),
    }
}

async fn handle_tracks(config: &Config, url: &str) -> Result<()> {
    let catalog = build_catalog(config)?;
    let playlist_id = catalog.resolve_playlist_id(url)?;
    let tracks = catalog.list_tracks(&playlist_id).await?;

    for (index, track) in tracks.iter().enumerate() {
        println!("{}", format_track(index + 1, track));
    }
    println!("{} tracks", tracks.len());
    Ok(())
}

/// One listing entry: the numbered track line, then any links on indented lines
fn format_track(position: usize, track: &Track) -> String {
    let duration = track
        .duration_ms
        .map(Utils::format_duration_ms)
        .unwrap_or_else(|| "-:--".to_string());
    let mut entry = format!(
        "{:>3}. {} - {} ({}) [{}]",
        position,
        track.artists.join(", "),
        track.title,
        duration,
        track.id
    );
    if let Some(url) = &track.external_url {
        entry.push_str(&format!("\n     {}", url));
    }
    if let Some(preview) = &track.preview_url {
        entry.push_str(&format!("\n     preview: {}", preview));
    }
    entry
}

async fn handle_info(config: &Config, url: &str) -> Result<()> {
    let catalog = build_catalog(config)?;
    let playlist_id = catalog.resolve_playlist_id(url)?;
    let info = catalog.playlist_info(&playlist_id).await?;

    println!("Name: {}", info.name);
    if let Some(owner) = &info.owner {
        println!("Owner: {}", owner);
    }
    if let Some(description) = &info.description {
        println!("Description: {}", description);
    }
    println!("Tracks: {}", info.track_count);
    if let Some(url) = &info.url {
        println!("URL: {}", url);
    }
    if let Some(image) = &info.image {
        println!("Image: {}", image);
    }
    Ok(())
}

fn handle_files(output_dir: &std::path::Path) -> Result<()> {
    let files = FileUtils::list_downloaded(output_dir)?;
    for file in &files {
        let size = FileUtils::file_size(file).unwrap_or(0);
        let name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        println!("{} ({})", name, Utils::format_file_size(size));
    }
    println!("{} files in {}", files.len(), output_dir.display());
    Ok(())
}

/// `show` prints the effective configuration. Edits start from what is stored in the
/// settings file, so environment credentials never end up on disk.
fn handle_config(
    effective: &Config,
    command: ConfigCommands,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    if let ConfigCommands::Show = command {
        let mut shown = effective.clone();
        if shown.api_keys.spotify_client_secret.is_some() {
            shown.api_keys.spotify_client_secret = Some("********".to_string());
        }
        println!("{}", toml::to_string_pretty(&shown)?);
        return Ok(());
    }

    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => Config::active_path()?,
    };
    let mut config = Config::load_stored(&path)?;

    match command {
        ConfigCommands::Show => {}
        ConfigCommands::SetDir { path } => config.download_directory = path,
        ConfigCommands::SetSpotify {
            client_id,
            client_secret,
        } => {
            if client_id.trim().is_empty() || client_secret.trim().is_empty() {
                return Err(DownloaderError::Config(
                    "Client ID and Client Secret cannot be empty".to_string(),
                ));
            }
            config.api_keys.spotify_client_id = Some(client_id.trim().to_string());
            config.api_keys.spotify_client_secret = Some(client_secret.trim().to_string());
        }
        ConfigCommands::Reset => config = Config::default(),
    }

    config.save_to(&path)?;
    println!("Configuration saved to {}", path.display());
    Ok(())
}
