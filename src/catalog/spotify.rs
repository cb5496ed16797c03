use crate::catalog::{Catalog, PlaylistInfo};
use crate::downloader::Track;
use crate::errors::{DownloaderError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
const PAGE_LIMIT: usize = 100;

/// Spotify Web API client using the client-credentials grant
pub struct SpotifyClient {
    client: Client,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<AccessToken>>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct SpotifyTokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpotifyPlaylistResponse {
    id: String,
    name: String,
    description: Option<String>,
    owner: Option<SpotifyOwner>,
    tracks: SpotifyTracksTotal,
    #[serde(default)]
    images: Vec<SpotifyImage>,
    external_urls: Option<SpotifyExternalUrls>,
}

#[derive(Debug, Deserialize)]
struct SpotifyOwner {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTracksTotal {
    total: u32,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTracksPage {
    items: Vec<SpotifyPlaylistItem>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpotifyPlaylistItem {
    track: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    id: Option<String>,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    duration_ms: Option<u32>,
    preview_url: Option<String>,
    external_urls: Option<SpotifyExternalUrls>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

impl SpotifyTrack {
    /// Episodes, local files without ids and nameless entries are dropped here
    fn into_track(self) -> Option<Track> {
        if self.kind.as_deref() != Some("track") {
            return None;
        }
        let track = Track {
            id: self.id?,
            title: self.name?,
            artists: self.artists.into_iter().map(|a| a.name).collect(),
            duration_ms: self.duration_ms,
            preview_url: self.preview_url,
            external_url: self.external_urls.and_then(|u| u.spotify),
        };
        track.is_well_formed().then_some(track)
    }
}

impl SpotifyClient {
    /// Create a new Spotify client
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self::new_with_client(client_id, client_secret, Client::new())
    }

    /// Create a new Spotify client with a custom HTTP client (for proxy support)
    pub fn new_with_client(client_id: String, client_secret: String, client: Client) -> Self {
        Self {
            client,
            client_id,
            client_secret,
            token: RwLock::new(None),
        }
    }

    /// Check if the client is configured (has client_id and client_secret)
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// Authenticate with Spotify API
    async fn authenticate(&self) -> Result<AccessToken> {
        if !self.is_configured() {
            return Err(DownloaderError::Catalog(
                "Spotify credentials are not set".to_string(),
            ));
        }

        debug!("Requesting Spotify access token");
        let params = [("grant_type", "client_credentials")];
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DownloaderError::Catalog(format!(
                "Authentication failed: {} - {}",
                status, error_text
            )));
        }

        let token_response: SpotifyTokenResponse = response.json().await?;
        info!("Authenticated with Spotify");
        // Refresh a minute early so a token never expires mid-pagination
        let lifetime = Duration::from_secs(token_response.expires_in.saturating_sub(60));
        Ok(AccessToken {
            value: token_response.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }

    /// Ensure we have a valid access token
    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let mut guard = self.token.write().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }
        let token = self.authenticate().await?;
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let access_token = self.access_token().await?;
        debug!("API Request: GET {}", url);
        let response = self.client.get(url).bearer_auth(access_token).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DownloaderError::PlaylistNotFound(what.to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DownloaderError::Catalog(format!(
                "Failed to fetch {}: {} - {}",
                what, status, error_text
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Catalog for SpotifyClient {
    async fn playlist_info(&self, playlist_id: &str) -> Result<PlaylistInfo> {
        let url = format!(
            "{}/playlists/{}?fields=id,name,description,owner(display_name),tracks(total),images,external_urls",
            API_BASE, playlist_id
        );
        let playlist: SpotifyPlaylistResponse = self.get_json(&url, playlist_id).await?;

        Ok(PlaylistInfo {
            id: playlist.id,
            name: playlist.name,
            description: playlist.description.filter(|d| !d.is_empty()),
            owner: playlist.owner.and_then(|o| o.display_name),
            track_count: playlist.tracks.total,
            image: playlist.images.into_iter().next().map(|i| i.url),
            url: playlist.external_urls.and_then(|u| u.spotify),
        })
    }

    async fn list_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
        let mut all_tracks = Vec::new();
        let mut next_url = Some(format!(
            "{}/playlists/{}/tracks?limit={}",
            API_BASE, playlist_id, PAGE_LIMIT
        ));
        let mut page_count = 0;

        while let Some(url) = next_url {
            page_count += 1;
            let page: SpotifyTracksPage = self.get_json(&url, playlist_id).await?;
            debug!("Found {} items on page {}", page.items.len(), page_count);

            all_tracks.extend(page.items.into_iter().filter_map(|item| item.track?.into_track()));
            next_url = page.next;
        }

        info!(
            "Fetched {} tracks from {} pages of playlist {}",
            all_tracks.len(),
            page_count,
            playlist_id
        );
        Ok(all_tracks)
    }
}
