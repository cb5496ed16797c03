use crate::downloader::{AcquisitionResult, Attempt, Track};
use crate::errors::{DownloaderError, Result};
use crate::sources::{Candidate, FetchedAudio, SourceClient, SourceRegistry};
use crate::utils::fs::{FileUtils, ScratchDir};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Content fetched for an attempt, sitting under a hidden staging name
#[derive(Debug)]
struct StagedFile {
    path: PathBuf,
    bytes: u64,
}

/// Executes single attempts against source clients and publishes the result
/// atomically under the track's final file name.
#[derive(Clone)]
pub struct TrackAcquirer {
    sources: SourceRegistry,
    search_results: u32,
}

impl TrackAcquirer {
    pub fn new(sources: SourceRegistry, search_results: u32) -> Self {
        Self {
            sources,
            search_results: search_results.max(1),
        }
    }

    pub fn final_path(track: &Track, output_dir: &Path) -> PathBuf {
        output_dir.join(track.file_name())
    }

    /// `Success` for a track whose final file is already on disk
    pub fn cached(track: &Track, output_dir: &Path) -> Option<AcquisitionResult> {
        let path = Self::final_path(track, output_dir);
        if !FileUtils::is_complete_file(&path) {
            return None;
        }
        let bytes = FileUtils::file_size(&path).ok()?;
        Some(AcquisitionResult::Success { path, bytes })
    }

    /// Run one attempt, bounded by its timeout.
    ///
    /// The source work runs in its own task. When the timeout elapses first the task
    /// is left to finish on its own and whatever it staged is deleted; it can never
    /// reach the final file name.
    pub async fn acquire(
        &self,
        attempt: &Attempt,
        track: &Track,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> AcquisitionResult {
        if let Some(hit) = Self::cached(track, output_dir) {
            return hit;
        }

        let Some(client) = self.sources.get(attempt.source) else {
            return AcquisitionResult::SourceError {
                message: format!("source {} is not configured", attempt.source),
            };
        };

        let mut work = tokio::spawn(stage_attempt(
            client,
            attempt.query.clone(),
            self.search_results,
            output_dir.to_path_buf(),
            cancel.clone(),
        ));

        match tokio::time::timeout(attempt.timeout, &mut work).await {
            Ok(Ok(Ok(Some(staged)))) => publish(staged, Self::final_path(track, output_dir)).await,
            Ok(Ok(Ok(None))) => AcquisitionResult::NotFound,
            Ok(Ok(Err(e))) => AcquisitionResult::SourceError {
                message: e.to_string(),
            },
            Ok(Err(join_error)) => AcquisitionResult::SourceError {
                message: format!("attempt task failed: {}", join_error),
            },
            Err(_) => {
                warn!("Attempt {} timed out after {:?}", attempt, attempt.timeout);
                tokio::spawn(discard_orphan(work));
                AcquisitionResult::TimedOut
            }
        }
    }
}

/// Search, then fetch candidates in rank order until one yields audio, and stage it.
/// `Ok(None)` means the source had nothing for the query.
async fn stage_attempt(
    client: Arc<dyn SourceClient>,
    query: String,
    limit: u32,
    output_dir: PathBuf,
    cancel: CancellationToken,
) -> Result<Option<StagedFile>> {
    let candidates = client.search(&query, limit, &cancel).await?;
    if candidates.is_empty() {
        return Ok(None);
    }

    let mut last_error = None;
    for candidate in candidates.iter().take(limit as usize) {
        match stage_candidate(client.as_ref(), candidate, &output_dir, &cancel).await {
            Ok(staged) => return Ok(Some(staged)),
            Err(DownloaderError::Cancelled) => return Err(DownloaderError::Cancelled),
            Err(e) => {
                debug!("Candidate {} failed: {}", candidate.url, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| DownloaderError::Download("no usable candidate".to_string())))
}

async fn stage_candidate(
    client: &dyn SourceClient,
    candidate: &Candidate,
    output_dir: &Path,
    cancel: &CancellationToken,
) -> Result<StagedFile> {
    let scratch = ScratchDir::new_in(output_dir)?;
    let fetched = client.fetch(candidate, scratch.path(), cancel).await?;

    let staging = FileUtils::staging_path(output_dir);
    let written = match fetched {
        FetchedAudio::Bytes(bytes) => tokio::fs::write(&staging, bytes).await.map_err(DownloaderError::from),
        FetchedAudio::File(path) => FileUtils::move_file(&path, &staging).await,
    };
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e);
    }

    let bytes = tokio::fs::metadata(&staging).await?.len();
    Ok(StagedFile {
        path: staging,
        bytes,
    })
}

/// Validate the staged file and rename it into place
async fn publish(staged: StagedFile, final_path: PathBuf) -> AcquisitionResult {
    if staged.bytes == 0 {
        let _ = tokio::fs::remove_file(&staged.path).await;
        return AcquisitionResult::SourceError {
            message: "source returned an empty payload".to_string(),
        };
    }

    match tokio::fs::rename(&staged.path, &final_path).await {
        Ok(()) => AcquisitionResult::Success {
            path: final_path,
            bytes: staged.bytes,
        },
        Err(e) => {
            let _ = tokio::fs::remove_file(&staged.path).await;
            AcquisitionResult::SourceError {
                message: format!("failed to move download into place: {}", e),
            }
        }
    }
}

async fn discard_orphan(work: JoinHandle<Result<Option<StagedFile>>>) {
    if let Ok(Ok(Some(staged))) = work.await {
        debug!("Discarding late result {}", staged.path.display());
        let _ = tokio::fs::remove_file(&staged.path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceId;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    enum Behavior {
        Bytes(&'static [u8]),
        File(&'static [u8]),
        Nothing,
        Fail,
        Slow(Duration),
        FirstCandidateBroken,
    }

    struct FakeSource {
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    fn candidate(id: &str) -> Candidate {
        Candidate {
            source: SourceId::Youtube,
            id: id.to_string(),
            title: id.to_string(),
            url: format!("https://example.invalid/{}", id),
            duration_secs: None,
        }
    }

    #[async_trait]
    impl SourceClient for FakeSource {
        async fn search(&self, _: &str, _: u32, _: &CancellationToken) -> Result<Vec<Candidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Nothing => Ok(Vec::new()),
                Behavior::Fail => Err(DownloaderError::Source("blocked".to_string())),
                Behavior::FirstCandidateBroken => Ok(vec![candidate("broken"), candidate("good")]),
                _ => Ok(vec![candidate("one")]),
            }
        }

        async fn fetch(
            &self,
            candidate: &Candidate,
            scratch_dir: &Path,
            _: &CancellationToken,
        ) -> Result<FetchedAudio> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Bytes(data) => Ok(FetchedAudio::Bytes(data.to_vec())),
                Behavior::File(data) => {
                    let path = scratch_dir.join("audio.mp3");
                    std::fs::write(&path, data)?;
                    Ok(FetchedAudio::File(path))
                }
                Behavior::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(FetchedAudio::Bytes(b"late audio".to_vec()))
                }
                Behavior::FirstCandidateBroken if candidate.id == "broken" => {
                    Err(DownloaderError::Download("403".to_string()))
                }
                Behavior::FirstCandidateBroken => Ok(FetchedAudio::Bytes(b"second".to_vec())),
                _ => unreachable!("search returned no candidates"),
            }
        }
    }

    fn acquirer_with(source: Arc<FakeSource>) -> TrackAcquirer {
        let mut registry = SourceRegistry::new();
        registry.register(SourceId::Youtube, source);
        TrackAcquirer::new(registry, 3)
    }

    fn attempt(timeout: Duration) -> Attempt {
        Attempt {
            source: SourceId::Youtube,
            query: "Artist Song".to_string(),
            timeout,
        }
    }

    fn track() -> Track {
        Track::new("t1", "Song", vec!["Artist".to_string()])
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn bytes_are_published_under_final_name() {
        let dir = tempfile::tempdir().unwrap();
        let acquirer = acquirer_with(FakeSource::new(Behavior::Bytes(b"mp3 data")));

        let result = acquirer
            .acquire(&attempt(Duration::from_secs(5)), &track(), dir.path(), &CancellationToken::new())
            .await;

        let expected = dir.path().join("Artist - Song.mp3");
        assert_eq!(result, AcquisitionResult::Success { path: expected.clone(), bytes: 8 });
        assert_eq!(std::fs::read(&expected).unwrap(), b"mp3 data");
        assert_eq!(dir_entries(dir.path()), vec!["Artist - Song.mp3"]);
    }

    #[tokio::test]
    async fn file_payload_is_moved_and_scratch_removed() {
        let dir = tempfile::tempdir().unwrap();
        let acquirer = acquirer_with(FakeSource::new(Behavior::File(b"from disk")));

        let result = acquirer
            .acquire(&attempt(Duration::from_secs(5)), &track(), dir.path(), &CancellationToken::new())
            .await;

        assert!(result.is_success());
        assert_eq!(dir_entries(dir.path()), vec!["Artist - Song.mp3"]);
    }

    #[tokio::test]
    async fn empty_search_is_not_found_and_errors_are_source_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();

        let result = acquirer_with(FakeSource::new(Behavior::Nothing))
            .acquire(&attempt(Duration::from_secs(5)), &track(), dir.path(), &cancel)
            .await;
        assert_eq!(result, AcquisitionResult::NotFound);

        let result = acquirer_with(FakeSource::new(Behavior::Fail))
            .acquire(&attempt(Duration::from_secs(5)), &track(), dir.path(), &cancel)
            .await;
        assert!(matches!(result, AcquisitionResult::SourceError { ref message } if message.contains("blocked")));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn empty_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = acquirer_with(FakeSource::new(Behavior::Bytes(b"")))
            .acquire(&attempt(Duration::from_secs(5)), &track(), dir.path(), &CancellationToken::new())
            .await;

        assert!(matches!(result, AcquisitionResult::SourceError { .. }));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn falls_through_to_next_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let result = acquirer_with(FakeSource::new(Behavior::FirstCandidateBroken))
            .acquire(&attempt(Duration::from_secs(5)), &track(), dir.path(), &CancellationToken::new())
            .await;

        assert!(result.is_success());
        assert_eq!(std::fs::read(dir.path().join("Artist - Song.mp3")).unwrap(), b"second");
    }

    #[tokio::test]
    async fn timeout_abandons_work_and_discards_late_result() {
        let dir = tempfile::tempdir().unwrap();
        let acquirer = acquirer_with(FakeSource::new(Behavior::Slow(Duration::from_millis(200))));

        let result = acquirer
            .acquire(&attempt(Duration::from_millis(30)), &track(), dir.path(), &CancellationToken::new())
            .await;
        assert_eq!(result, AcquisitionResult::TimedOut);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn existing_file_short_circuits_without_source_calls() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Artist - Song.mp3"), b"old").unwrap();
        let source = FakeSource::new(Behavior::Bytes(b"new"));
        let acquirer = acquirer_with(source.clone());

        let result = acquirer
            .acquire(&attempt(Duration::from_secs(5)), &track(), dir.path(), &CancellationToken::new())
            .await;

        assert!(result.is_success());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read(dir.path().join("Artist - Song.mp3")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn unknown_source_is_a_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let acquirer = TrackAcquirer::new(SourceRegistry::new(), 1);
        let result = acquirer
            .acquire(&attempt(Duration::from_secs(1)), &track(), dir.path(), &CancellationToken::new())
            .await;
        assert!(matches!(result, AcquisitionResult::SourceError { .. }));
    }
}
