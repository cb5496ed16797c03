use crate::catalog::Catalog;
use crate::config::Config;
use crate::downloader::progress::JobWriter;
use crate::downloader::{
    JobSnapshot, LogEntry, ProgressChannel, StrategyResolver, Track, TrackAcquirer, TrackList,
};
use crate::errors::{DownloaderError, IntoDownloaderError, Result};
use crate::sources::SourceRegistry;
use crate::utils::fs::FileUtils;
use crate::utils::Utils;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Where and how fast a job writes
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub output_dir: PathBuf,
    pub per_playlist_folder: bool,
    /// Pause between tracks that hit the network, to stay under source rate limits
    pub inter_track_delay: Duration,
}

impl OrchestratorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_dir: config.download_directory.clone(),
            per_playlist_folder: config.per_playlist_folder,
            inter_track_delay: config.acquisition.inter_track_delay(),
        }
    }

    /// A name of only dots would point outside `output_dir`, so it gets no folder
    fn output_dir_for(&self, list: &TrackList) -> PathBuf {
        let folder = Utils::sanitize_filename(&list.name);
        if self.per_playlist_folder && !folder.chars().all(|c| c == '.') {
            self.output_dir.join(folder)
        } else {
            self.output_dir.clone()
        }
    }
}

enum JobInput {
    Tracks(TrackList),
    Playlist {
        url: String,
        track_ids: Option<Vec<String>>,
    },
}

struct TrackOutcome {
    succeeded: bool,
    /// False for cache hits and unresolvable tracks
    contacted_sources: bool,
}

/// Everything a job needs, shared read-only with the job task
struct JobContext {
    resolver: StrategyResolver,
    acquirer: TrackAcquirer,
    catalog: Option<Arc<dyn Catalog>>,
    options: OrchestratorOptions,
}

struct ActiveJob {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Runs at most one download job at a time in the background and exposes its
/// progress, log and cancellation to any number of callers.
pub struct DownloadOrchestrator {
    context: Arc<JobContext>,
    progress: Arc<ProgressChannel>,
    active: Mutex<Option<ActiveJob>>,
}

impl DownloadOrchestrator {
    pub fn new(
        resolver: StrategyResolver,
        acquirer: TrackAcquirer,
        catalog: Option<Arc<dyn Catalog>>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            context: Arc::new(JobContext {
                resolver,
                acquirer,
                catalog,
                options,
            }),
            progress: ProgressChannel::new(),
            active: Mutex::new(None),
        }
    }

    /// Orchestrator wired to the built-in sources
    pub fn from_config(config: &Config, catalog: Option<Arc<dyn Catalog>>) -> Result<Self> {
        let sources = SourceRegistry::from_config(config)?;
        Ok(Self::new(
            StrategyResolver::from_config(&config.acquisition),
            TrackAcquirer::new(sources, config.acquisition.search_results),
            catalog,
            OrchestratorOptions::from_config(config),
        ))
    }

    pub fn output_dir(&self) -> &Path {
        &self.context.options.output_dir
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start downloading `list` in the background. `false` while another job is
    /// starting or downloading; the running job is not affected.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, list: TrackList) -> bool {
        let total = list.len();
        self.start(JobInput::Tracks(list), total)
    }

    /// Like [`submit`](Self::submit), but the playlist is fetched from the catalog
    /// inside the job. Catalog failures end the job with status `error`.
    pub fn submit_playlist(&self, url: &str, track_ids: Option<Vec<String>>) -> bool {
        self.start(
            JobInput::Playlist {
                url: url.to_string(),
                track_ids,
            },
            0,
        )
    }

    fn start(&self, input: JobInput, total: usize) -> bool {
        let mut active = self.lock_active();
        let Some(writer) = self.progress.begin_job(total) else {
            debug!("Rejected submission: a download job is already running");
            return false;
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(supervise(
            Arc::clone(&self.context),
            writer,
            input,
            cancel.clone(),
        ));
        *active = Some(ActiveJob {
            cancel,
            handle: Some(handle),
        });
        true
    }

    /// Ask the running job to stop before its next track. `false` when no job is
    /// starting or downloading.
    pub fn cancel(&self) -> bool {
        let active = self.lock_active();
        if !self.progress.is_active() {
            return false;
        }
        match active.as_ref() {
            Some(job) => {
                info!("Cancellation requested");
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn progress(&self) -> JobSnapshot {
        self.progress.snapshot()
    }

    /// Log entries from index `since` onwards
    pub fn logs(&self, since: usize) -> Vec<LogEntry> {
        self.progress.logs_since(since)
    }

    pub fn is_active(&self) -> bool {
        self.progress.is_active()
    }

    /// Wait for the most recently submitted job to finish
    pub async fn wait(&self) {
        let handle = self.lock_active().as_mut().and_then(|job| job.handle.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// Top-level boundary of a job: nothing escapes it except through the job state
async fn supervise(
    context: Arc<JobContext>,
    writer: JobWriter,
    input: JobInput,
    cancel: CancellationToken,
) {
    let writer = Arc::new(writer);
    let job = tokio::spawn(run_job(context, Arc::clone(&writer), input, cancel));

    if let Err(e) = job.await.into_downloader_error().and_then(|outcome| outcome) {
        writer.fail(e.to_string());
    }
}

async fn run_job(
    context: Arc<JobContext>,
    writer: Arc<JobWriter>,
    input: JobInput,
    cancel: CancellationToken,
) -> Result<()> {
    let list = match input {
        JobInput::Tracks(list) => list,
        JobInput::Playlist { url, track_ids } => {
            let catalog = context
                .catalog
                .as_ref()
                .ok_or_else(|| DownloaderError::Catalog("no catalog configured".to_string()))?;
            writer.log(format!("Loading playlist {}", url));
            let list = catalog.load_playlist(&url).await?;
            let list = match track_ids {
                Some(ids) => list.select(&ids),
                None => list,
            };
            writer.set_total(list.len());
            list
        }
    };

    let output_dir = context.options.output_dir_for(&list);
    FileUtils::create_directory(&output_dir).map_err(|e| {
        DownloaderError::Download(format!(
            "Cannot create output directory {}: {}",
            output_dir.display(),
            e
        ))
    })?;
    let leftovers = FileUtils::cleanup_staging(&output_dir)?;
    if leftovers > 0 {
        debug!("Removed {} leftover staging entries", leftovers);
    }

    writer.log(format!(
        "Downloading {} tracks to {}",
        list.len(),
        output_dir.display()
    ));
    writer.start_downloading();

    let mut pause_before_next = false;
    for (index, track) in list.tracks.iter().enumerate() {
        if pause_before_next && !context.options.inter_track_delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(context.options.inter_track_delay) => {}
            }
        }
        if cancel.is_cancelled() {
            writer.cancel();
            return Ok(());
        }

        writer.begin_track(index + 1, &track.label());
        let outcome = context
            .download_track(track, &output_dir, &writer, &cancel)
            .await;
        pause_before_next = outcome.contacted_sources;

        if outcome.succeeded {
            writer.record_success();
        } else if !cancel.is_cancelled() {
            writer.record_failure();
        }
    }

    writer.complete();
    Ok(())
}

impl JobContext {
    /// Cache check, then attempts in order until the first success
    async fn download_track(
        &self,
        track: &Track,
        output_dir: &Path,
        writer: &JobWriter,
        cancel: &CancellationToken,
    ) -> TrackOutcome {
        let label = track.label();

        if TrackAcquirer::cached(track, output_dir).is_some() {
            writer.log(format!("Already downloaded: {}", label));
            return TrackOutcome {
                succeeded: true,
                contacted_sources: false,
            };
        }

        let attempts = self.resolver.resolve(track);
        if attempts.is_empty() {
            writer.log(format!("Failed: {} (missing title or artist)", label));
            return TrackOutcome {
                succeeded: false,
                contacted_sources: false,
            };
        }

        let count = attempts.len();
        for (n, attempt) in attempts.iter().enumerate() {
            if n > 0 && cancel.is_cancelled() {
                writer.log(format!("Skipping remaining attempts for {}: cancelled", label));
                break;
            }

            writer.log(format!("Attempt {}/{}: {}", n + 1, count, attempt));
            let result = self.acquirer.acquire(attempt, track, output_dir, cancel).await;
            writer.log(format!("Attempt {}/{}: {}", n + 1, count, result));

            if result.is_success() {
                writer.log(format!("Downloaded: {}", label));
                return TrackOutcome {
                    succeeded: true,
                    contacted_sources: true,
                };
            }
        }

        if !cancel.is_cancelled() {
            writer.log(format!("Failed: {} (all {} attempts exhausted)", label, count));
        }
        TrackOutcome {
            succeeded: false,
            contacted_sources: true,
        }
    }
}
