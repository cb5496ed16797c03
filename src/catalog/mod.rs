pub mod spotify;

pub use spotify::SpotifyClient;

use crate::downloader::{Track, TrackList};
use crate::errors::{DownloaderError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Playlist summary as shown before downloading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub track_count: u32,
    pub image: Option<String>,
    pub url: Option<String>,
}

/// Source of track lists. Upstream payloads are converted to [`Track`] before they
/// leave the implementation.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Extract the playlist id from a share URL or URI
    fn resolve_playlist_id(&self, url: &str) -> Result<String> {
        extract_playlist_id(url)
    }

    async fn playlist_info(&self, playlist_id: &str) -> Result<PlaylistInfo>;

    /// Every track of the playlist, in playlist order
    async fn list_tracks(&self, playlist_id: &str) -> Result<Vec<Track>>;

    /// Resolve a URL into a named track list
    async fn load_playlist(&self, url: &str) -> Result<TrackList> {
        let playlist_id = self.resolve_playlist_id(url)?;
        let info = self.playlist_info(&playlist_id).await?;
        let tracks = self.list_tracks(&playlist_id).await?;
        Ok(TrackList::new(info.name, tracks))
    }
}

/// Accepts `.../playlist/<id>?...` links and `spotify:playlist:<id>` URIs
pub fn extract_playlist_id(url: &str) -> Result<String> {
    let pattern = Regex::new(r"playlist[/:]([a-zA-Z0-9]+)")
        .map_err(|e| DownloaderError::Unknown(format!("Invalid playlist pattern: {}", e)))?;

    pattern
        .captures(url)
        .map(|c| c[1].to_string())
        .ok_or_else(|| DownloaderError::InvalidUrl(format!("Invalid Spotify playlist URL: {}", url)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_ids_from_links_and_uris() {
        assert_eq!(
            extract_playlist_id("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M?si=abc").unwrap(),
            "37i9dQZF1DXcBWIGoYBM5M"
        );
        assert_eq!(
            extract_playlist_id("spotify:playlist:37i9dQZF1DXcBWIGoYBM5M").unwrap(),
            "37i9dQZF1DXcBWIGoYBM5M"
        );
        assert!(matches!(
            extract_playlist_id("https://open.spotify.com/album/123"),
            Err(DownloaderError::InvalidUrl(_))
        ));
    }
}
