use crate::config::Config;
use crate::errors::{DownloaderError, Result};
use crate::sources::{Candidate, FetchedAudio, SourceClient, SourceId, YtDlp};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const RESULTS_URL: &str = "https://www.youtube.com/results";

/// Scrapes the YouTube results page for video ids and hands downloads to yt-dlp.
/// Avoids the search extractor entirely, which is what gets rate limited first.
pub struct YoutubeWebSource {
    client: Client,
    video_id: Regex,
    yt_dlp: YtDlp,
}

impl YoutubeWebSource {
    pub fn new(config: &Config, yt_dlp: YtDlp) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(u64::from(config.yt_dlp.socket_timeout_secs)))
            .user_agent(&config.yt_dlp.user_agent);

        if let Some(proxy_url) = config.proxy_config.url() {
            builder = builder.proxy(reqwest::Proxy::all(&proxy_url)?);
        }

        Ok(Self {
            client: builder.build()?,
            video_id: video_id_pattern()?,
            yt_dlp,
        })
    }
}

fn video_id_pattern() -> Result<Regex> {
    Regex::new(r"watch\?v=([A-Za-z0-9_-]{11})")
        .map_err(|e| DownloaderError::Unknown(format!("Invalid video id pattern: {}", e)))
}

/// Unique video ids in page order
fn extract_video_ids(pattern: &Regex, html: &str, limit: usize) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for capture in pattern.captures_iter(html) {
        let id = &capture[1];
        if !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
        if ids.len() >= limit {
            break;
        }
    }
    ids
}

#[async_trait]
impl SourceClient for YoutubeWebSource {
    async fn search(
        &self,
        query: &str,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<Candidate>> {
        if cancel.is_cancelled() {
            return Err(DownloaderError::Cancelled);
        }

        let url = format!("{}?search_query={}", RESULTS_URL, urlencoding::encode(query));
        debug!("YouTube web search: {}", url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(DownloaderError::Source(format!(
                "YouTube search failed with status: {}",
                response.status()
            )));
        }

        let html = response.text().await?;
        let candidates = extract_video_ids(&self.video_id, &html, limit.max(1) as usize)
            .into_iter()
            .map(|id| Candidate {
                source: SourceId::YoutubeWeb,
                url: format!("https://www.youtube.com/watch?v={}", id),
                title: String::new(),
                duration_secs: None,
                id,
            })
            .collect();
        Ok(candidates)
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
    fn extracts_unique_ids_in_order() {
        let pattern = video_id_pattern().unwrap();
        let html = r#"
            <a href="/watch?v=dQw4w9WgXcQ">one</a>
            "url":"/watch?v=dQw4w9WgXcQ&pp=x"
            <a href="/watch?v=9bZkp7q19f0">two</a>
            <a href="/watch?v=short">bad</a>
            <a href="/watch?v=kJQP7kiw5Fk">three</a>
        "#;

        assert_eq!(
            extract_video_ids(&pattern, html, 10),
            vec!["dQw4w9WgXcQ", "9bZkp7q19f0", "kJQP7kiw5Fk"]
        );
        assert_eq!(extract_video_ids(&pattern, html, 2).len(), 2);
        assert!(extract_video_ids(&pattern, "<html></html>", 3).is_empty());
    }
}
