use crate::config::Config;
use crate::errors::{DownloaderError, Result};
use crate::sources::{Candidate, FetchedAudio, SourceClient, SourceId};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command as AsyncCommand;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// yt-dlp subprocess wrapper shared by every backend that needs it
#[derive(Debug, Clone)]
pub struct YtDlp {
    executable_path: String,
    audio_format: String,
    audio_quality: String,
    user_agent: String,
    referer: Option<String>,
    socket_timeout_secs: u32,
    retries: u32,
    proxy: Option<String>,
}

/// One line of `--dump-json` output; only the fields we rank on
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
}

impl YtDlp {
    pub fn from_config(config: &Config) -> Self {
        let yt = &config.yt_dlp;
        Self {
            executable_path: yt.executable_path.clone(),
            audio_format: yt.audio_format.clone(),
            audio_quality: yt.audio_quality.clone(),
            user_agent: yt.user_agent.clone(),
            referer: yt.referer.clone(),
            socket_timeout_secs: yt.socket_timeout_secs,
            retries: yt.retries,
            proxy: config.proxy_config.url(),
        }
    }

    /// Check if yt-dlp is available
    pub async fn is_available(&self) -> bool {
        AsyncCommand::new(&self.executable_path)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Arguments common to searching and downloading
    fn command(&self) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.executable_path);
        cmd.kill_on_drop(true)
            .arg("--quiet")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg("--socket-timeout")
            .arg(self.socket_timeout_secs.to_string())
            .arg("--retries")
            .arg(self.retries.to_string())
            .arg("--user-agent")
            .arg(&self.user_agent);

        if let Some(referer) = &self.referer {
            cmd.arg("--add-header").arg(format!("Referer:{}", referer));
        }
        if let Some(proxy) = &self.proxy {
            cmd.arg("--proxy").arg(proxy);
        }
        cmd
    }

    /// Run a `ytsearchN:` / `scsearchN:` style query and return the ranked hits
    pub async fn search(&self, search_url: &str, source: SourceId) -> Result<Vec<Candidate>> {
        debug!("yt-dlp search: {}", search_url);
        let output = self
            .command()
            .arg(search_url)
            .arg("--dump-json")
            .arg("--flat-playlist")
            .output()
            .await
            .map_err(|e| DownloaderError::YtDlp(format!("Failed to execute yt-dlp search: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloaderError::YtDlp(format!("yt-dlp search failed: {}", stderr.trim())));
        }

        Ok(parse_search_output(&String::from_utf8_lossy(&output.stdout), source))
    }

    /// Download and transcode one URL into `scratch_dir`, returning the audio file
    pub async fn download_audio(&self, url: &str, scratch_dir: &Path) -> Result<PathBuf> {
        debug!("yt-dlp download: {}", url);
        let output = self
            .command()
            .arg(url)
            .arg("--format")
            .arg("bestaudio/best")
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg(&self.audio_format)
            .arg("--audio-quality")
            .arg(&self.audio_quality)
            .arg("--output")
            .arg(scratch_dir.join("audio.%(ext)s"))
            .output()
            .await
            .map_err(|e| DownloaderError::YtDlp(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloaderError::YtDlp(format!("yt-dlp download failed: {}", stderr.trim())));
        }

        find_audio_file(scratch_dir, &self.audio_format)?.ok_or_else(|| {
            DownloaderError::YtDlp(format!("yt-dlp produced no .{} file", self.audio_format))
        })
    }
}

/// Parse line-delimited `--dump-json` output, keeping entries that carry a URL
fn parse_search_output(stdout: &str, source: SourceId) -> Vec<Candidate> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<YtDlpEntry>(line).ok())
        .filter_map(|entry| {
            let url = entry.webpage_url.or(entry.url)?;
            Some(Candidate {
                source,
                id: entry.id.unwrap_or_else(|| url.clone()),
                title: entry.title.unwrap_or_default(),
                url,
                duration_secs: entry.duration.map(|d| d.round() as u32),
            })
        })
        .collect()
}

fn find_audio_file(dir: &Path, extension: &str) -> Result<Option<PathBuf>> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// A yt-dlp search extractor (`ytsearch`, `scsearch`) exposed as a source
pub struct YtDlpSearchSource {
    id: SourceId,
    yt_dlp: YtDlp,
}

impl YtDlpSearchSource {
    pub fn new(id: SourceId, yt_dlp: YtDlp) -> Self {
        Self { id, yt_dlp }
    }

    fn search_url(&self, query: &str, limit: u32) -> String {
        let prefix = match self.id {
            SourceId::Soundcloud => "scsearch",
            _ => "ytsearch",
        };
        format!("{}{}:{}", prefix, limit.max(1), query)
    }
}

#[async_trait]
impl SourceClient for YtDlpSearchSource {
    async fn search(
        &self,
        query: &str,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<Candidate>> {
        if cancel.is_cancelled() {
            return Err(DownloaderError::Cancelled);
        }
        self.yt_dlp.search(&self.search_url(query, limit), self.id).await
    }

    async fn fetch(
        &self,
        candidate: &Candidate,
        scratch_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchedAudio> {
        if cancel.is_cancelled() {
            return Err(DownloaderError::Cancelled);
        }
        let path = self.yt_dlp.download_audio(&candidate.url, scratch_dir).await?;
        Ok(FetchedAudio::File(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_playlist_lines() {
        let stdout = concat!(
            r#"{"id":"abc","title":"Song (Official Audio)","url":"https://www.youtube.com/watch?v=abc","duration":215.4}"#,
            "\n",
            "not json\n",
            r#"{"id":"nourl","title":"Broken"}"#,
            "\n",
            r#"{"id":"def","title":"Song Live","webpage_url":"https://www.youtube.com/watch?v=def"}"#,
            "\n",
        );

        let candidates = parse_search_output(stdout, SourceId::Youtube);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, "abc");
        assert_eq!(candidates[0].duration_secs, Some(215));
        assert_eq!(candidates[1].url, "https://www.youtube.com/watch?v=def");
        assert_eq!(candidates[1].duration_secs, None);
    }

    #[test]
    fn search_url_uses_source_prefix() {
        let yt_dlp = YtDlp::from_config(&Config::default());
        let youtube = YtDlpSearchSource::new(SourceId::Youtube, yt_dlp.clone());
        let soundcloud = YtDlpSearchSource::new(SourceId::Soundcloud, yt_dlp);
        assert_eq!(youtube.search_url("a b", 3), "ytsearch3:a b");
        assert_eq!(soundcloud.search_url("a b", 0), "scsearch1:a b");
    }

    #[tokio::test]
    async fn cancelled_token_skips_subprocess() {
        let mut config = Config::default();
        config.yt_dlp.executable_path = "definitely-not-a-real-binary".to_string();
        let source = YtDlpSearchSource::new(SourceId::Youtube, YtDlp::from_config(&config));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = source.search("query", 1, &cancel).await;
        assert!(matches!(result, Err(DownloaderError::Cancelled)));
    }
}
