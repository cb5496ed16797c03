pub mod youtube_web;
pub mod yt_dlp;

pub use youtube_web::YoutubeWebSource;
pub use yt_dlp::{YtDlp, YtDlpSearchSource};

use crate::config::Config;
use crate::errors::{DownloaderError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Stable identifier the resolver uses to reference a content source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceId {
    Youtube,
    Soundcloud,
    YoutubeWeb,
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceId::Youtube => write!(f, "youtube"),
            SourceId::Soundcloud => write!(f, "soundcloud"),
            SourceId::YoutubeWeb => write!(f, "youtube-web"),
        }
    }
}

impl std::str::FromStr for SourceId {
    type Err = DownloaderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "youtube" | "yt" => Ok(SourceId::Youtube),
            "soundcloud" | "sc" => Ok(SourceId::Soundcloud),
            "youtube-web" => Ok(SourceId::YoutubeWeb),
            _ => Err(DownloaderError::Config(format!("Unknown source: {}", s))),
        }
    }
}

/// A ranked search hit, opaque to everything but the source that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub source: SourceId,
    pub id: String,
    pub title: String,
    pub url: String,
    pub duration_secs: Option<u32>,
}

/// Raw audio handed back by a source
#[derive(Debug)]
pub enum FetchedAudio {
    Bytes(Vec<u8>),
    /// A finished file inside the scratch directory the caller provided
    File(PathBuf),
}

/// Capability of one content provider: find candidates for a query, fetch one.
///
/// The cancellation token lets a client decline to start new network work once the
/// job has been cancelled; clients must not abandon a write they already started.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn search(
        &self,
        query: &str,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<Candidate>>;

    async fn fetch(
        &self,
        candidate: &Candidate,
        scratch_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchedAudio>;
}

/// Source clients by identifier
#[derive(Clone, Default)]
pub struct SourceRegistry {
    clients: HashMap<SourceId, Arc<dyn SourceClient>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in yt-dlp and web-scraping backends
    pub fn from_config(config: &Config) -> Result<Self> {
        let yt_dlp = YtDlp::from_config(config);
        let mut registry = Self::new();
        registry.register(
            SourceId::Youtube,
            Arc::new(YtDlpSearchSource::new(SourceId::Youtube, yt_dlp.clone())),
        );
        registry.register(
            SourceId::Soundcloud,
            Arc::new(YtDlpSearchSource::new(SourceId::Soundcloud, yt_dlp.clone())),
        );
        registry.register(
            SourceId::YoutubeWeb,
            Arc::new(YoutubeWebSource::new(config, yt_dlp)?),
        );
        Ok(registry)
    }

    pub fn register(&mut self, id: SourceId, client: Arc<dyn SourceClient>) {
        self.clients.insert(id, client);
    }

    pub fn get(&self, id: SourceId) -> Option<Arc<dyn SourceClient>> {
        self.clients.get(&id).cloned()
    }
}
