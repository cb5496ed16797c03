#![allow(dead_code)]

use async_trait::async_trait;
use playlist_downloader::catalog::{Catalog, PlaylistInfo};
use playlist_downloader::downloader::{
    DownloadOrchestrator, JobSnapshot, OrchestratorOptions, StrategyResolver, Track,
    TrackAcquirer,
};
use playlist_downloader::errors::{DownloaderError, Result};
use playlist_downloader::sources::{Candidate, FetchedAudio, SourceClient, SourceId, SourceRegistry};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const AUDIO: &[u8] = b"ID3 fake audio payload";

/// What the fake source does for one search of a given title
#[derive(Debug, Clone)]
pub enum Step {
    Bytes(Vec<u8>),
    Slow(Duration, Vec<u8>),
    Hang,
    NotFound,
    Fail,
}

/// Source whose behavior is scripted per track title. The n-th search for a title
/// plays the n-th step; the last step repeats, and unscripted titles succeed.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<HashMap<String, Vec<Step>>>,
    seen: Mutex<HashMap<String, usize>>,
    pending: Mutex<HashMap<String, Step>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(self: &Arc<Self>, title: &str, steps: Vec<Step>) -> Arc<Self> {
        self.script.lock().unwrap().insert(title.to_string(), steps);
        Arc::clone(self)
    }

    /// Number of searches issued so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self, query: &str) -> Step {
        let script = self.script.lock().unwrap();
        let Some((title, steps)) = script.iter().find(|(title, _)| query.contains(title.as_str()))
        else {
            return Step::Bytes(AUDIO.to_vec());
        };

        let mut seen = self.seen.lock().unwrap();
        let n = seen.entry(title.clone()).or_insert(0);
        let step = steps
            .get(*n)
            .or_else(|| steps.last())
            .cloned()
            .unwrap_or_else(|| Step::Bytes(AUDIO.to_vec()));
        *n += 1;
        step
    }
}

#[async_trait]
impl SourceClient for ScriptedSource {
    async fn search(&self, query: &str, _: u32, _: &CancellationToken) -> Result<Vec<Candidate>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.next_step(query);
        match step {
            Step::NotFound => Ok(Vec::new()),
            Step::Fail => Err(DownloaderError::Source("scripted failure".to_string())),
            step => {
                let id = format!("candidate-{}", call);
                self.pending.lock().unwrap().insert(id.clone(), step);
                Ok(vec![Candidate {
                    source: SourceId::Youtube,
                    id: id.clone(),
                    title: query.to_string(),
                    url: format!("https://example.invalid/{}", id),
                    duration_secs: None,
                }])
            }
        }
    }

    async fn fetch(&self, candidate: &Candidate, _: &Path, _: &CancellationToken) -> Result<FetchedAudio> {
        let step = self.pending.lock().unwrap().remove(&candidate.id);
        match step {
            Some(Step::Bytes(bytes)) => Ok(FetchedAudio::Bytes(bytes)),
            Some(Step::Slow(delay, bytes)) => {
                tokio::time::sleep(delay).await;
                Ok(FetchedAudio::Bytes(bytes))
            }
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(FetchedAudio::Bytes(AUDIO.to_vec()))
            }
            _ => Err(DownloaderError::Source("unknown candidate".to_string())),
        }
    }
}

/// In-memory catalog serving one playlist
pub struct FakeCatalog {
    pub name: String,
    pub tracks: Vec<Track>,
    pub fail: bool,
}

impl FakeCatalog {
    pub fn new(name: &str, tracks: Vec<Track>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            tracks,
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            name: String::new(),
            tracks: Vec::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn playlist_info(&self, playlist_id: &str) -> Result<PlaylistInfo> {
        if self.fail {
            return Err(DownloaderError::PlaylistNotFound(playlist_id.to_string()));
        }
        Ok(PlaylistInfo {
            id: playlist_id.to_string(),
            name: self.name.clone(),
            description: None,
            owner: Some("tester".to_string()),
            track_count: self.tracks.len() as u32,
            image: None,
            url: None,
        })
    }

    async fn list_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
        if self.fail {
            return Err(DownloaderError::PlaylistNotFound(playlist_id.to_string()));
        }
        Ok(self.tracks.clone())
    }
}

pub fn track(id: &str, title: &str) -> Track {
    Track::new(id, title, vec!["Artist".to_string()])
}

pub fn tracks(titles: &[&str]) -> Vec<Track> {
    titles
        .iter()
        .enumerate()
        .map(|(i, title)| track(&format!("t{}", i + 1), title))
        .collect()
}

pub struct Harness {
    pub source: Arc<ScriptedSource>,
    pub catalog: Option<Arc<dyn Catalog>>,
    pub attempt_timeout: Duration,
    pub inter_track_delay: Duration,
    pub per_playlist_folder: bool,
}

impl Harness {
    pub fn new(source: Arc<ScriptedSource>) -> Self {
        Self {
            source,
            catalog: None,
            attempt_timeout: Duration::from_secs(5),
            inter_track_delay: Duration::ZERO,
            per_playlist_folder: false,
        }
    }

    pub fn catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn inter_track_delay(mut self, delay: Duration) -> Self {
        self.inter_track_delay = delay;
        self
    }

    pub fn per_playlist_folder(mut self) -> Self {
        self.per_playlist_folder = true;
        self
    }

    /// One source, two query templates: two attempts per track
    pub fn build(&self, output_dir: &Path) -> DownloadOrchestrator {
        let mut registry = SourceRegistry::new();
        registry.register(SourceId::Youtube, self.source.clone());

        let resolver = StrategyResolver::new(
            vec![SourceId::Youtube],
            vec!["{artist} {title}".to_string(), "{title} {artist} audio".to_string()],
            5,
            self.attempt_timeout,
        );

        DownloadOrchestrator::new(
            resolver,
            TrackAcquirer::new(registry, 1),
            self.catalog.clone(),
            OrchestratorOptions {
                output_dir: output_dir.to_path_buf(),
                per_playlist_folder: self.per_playlist_folder,
                inter_track_delay: self.inter_track_delay,
            },
        )
    }
}

/// Poll until the job reaches a terminal status
pub async fn wait_for_terminal(orchestrator: &DownloadOrchestrator) -> JobSnapshot {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let snapshot = orchestrator.progress();
            if snapshot.status.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job did not finish in time")
}

pub fn log_messages(orchestrator: &DownloadOrchestrator) -> Vec<String> {
    orchestrator.logs(0).into_iter().map(|e| e.message).collect()
}

pub fn position(logs: &[String], needle: &str) -> Option<usize> {
    logs.iter().position(|line| line.contains(needle))
}

/// First line at or after `start` containing `needle`
pub fn position_from(logs: &[String], start: usize, needle: &str) -> Option<usize> {
    logs.iter()
        .enumerate()
        .skip(start)
        .find(|(_, line)| line.contains(needle))
        .map(|(i, _)| i)
}
