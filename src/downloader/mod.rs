pub mod acquirer;
pub mod orchestrator;
pub mod progress;
pub mod resolver;

pub use acquirer::TrackAcquirer;
pub use orchestrator::{DownloadOrchestrator, OrchestratorOptions};
pub use progress::{JobSnapshot, JobStatus, LogEntry, ProgressChannel};
pub use resolver::{StrategyResolver, MAX_ATTEMPTS_PER_TRACK};

use crate::sources::SourceId;
use crate::utils::Utils;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One logical song entry from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    /// Non-empty for well-formed tracks; the first entry names the file
    pub artists: Vec<String>,
    pub duration_ms: Option<u32>,
    pub preview_url: Option<String>,
    pub external_url: Option<String>,
}

impl Track {
    pub fn new(id: impl Into<String>, title: impl Into<String>, artists: Vec<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artists,
            duration_ms: None,
            preview_url: None,
            external_url: None,
        }
    }

    pub fn primary_artist(&self) -> Option<&str> {
        self.artists
            .iter()
            .map(|a| a.trim())
            .find(|a| !a.is_empty())
    }

    /// A title and at least one artist are present
    pub fn is_well_formed(&self) -> bool {
        !self.title.trim().is_empty() && self.primary_artist().is_some()
    }

    /// `"{artist} - {title}"`, used for progress and log lines
    pub fn label(&self) -> String {
        format!("{} - {}", self.primary_artist().unwrap_or("Unknown Artist"), self.title.trim())
    }

    /// Sanitized file name of the finished artifact
    pub fn file_name(&self) -> String {
        format!("{}.mp3", Utils::sanitize_filename(&self.label()))
    }
}

/// Ordered tracks plus the name used for an optional output subfolder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackList {
    pub name: String,
    pub tracks: Vec<Track>,
}

impl TrackList {
    pub fn new(name: impl Into<String>, tracks: Vec<Track>) -> Self {
        Self {
            name: name.into(),
            tracks,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Keep only the selected ids, in list order
    pub fn select(self, track_ids: &[String]) -> Self {
        let tracks = self
            .tracks
            .into_iter()
            .filter(|t| track_ids.iter().any(|id| id == &t.id))
            .collect();
        Self {
            name: self.name,
            tracks,
        }
    }
}

/// One concrete (source, query) pairing tried during acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub source: SourceId,
    pub query: String,
    pub timeout: Duration,
}

impl std::fmt::Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} \"{}\"", self.source, self.query)
    }
}

/// Outcome of one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionResult {
    Success { path: PathBuf, bytes: u64 },
    NotFound,
    TimedOut,
    SourceError { message: String },
}

impl AcquisitionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, AcquisitionResult::Success { .. })
    }
}

impl std::fmt::Display for AcquisitionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionResult::Success { path, bytes } => {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                write!(f, "saved {} ({})", name, Utils::format_file_size(*bytes))
            }
            AcquisitionResult::NotFound => write!(f, "no results"),
            AcquisitionResult::TimedOut => write!(f, "timed out"),
            AcquisitionResult::SourceError { message } => write!(f, "source error: {}", message),
        }
    }
}
