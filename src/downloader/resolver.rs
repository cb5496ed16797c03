use crate::config::AcquisitionConfig;
use crate::downloader::{Attempt, Track};
use crate::sources::SourceId;
use std::time::Duration;

/// Hard ceiling on attempts per track, whatever the configuration says
pub const MAX_ATTEMPTS_PER_TRACK: usize = 5;

/// Turns one track into an ordered, capped list of acquisition attempts.
///
/// Queries go from most to least specific; each query is tried against every source in
/// priority order before moving on to the next query. The same input always yields
/// the same list.
#[derive(Debug, Clone)]
pub struct StrategyResolver {
    sources: Vec<SourceId>,
    query_templates: Vec<String>,
    max_attempts: usize,
    attempt_timeout: Duration,
}

impl StrategyResolver {
    pub fn new(
        sources: Vec<SourceId>,
        query_templates: Vec<String>,
        max_attempts: usize,
        attempt_timeout: Duration,
    ) -> Self {
        let mut unique_sources = Vec::with_capacity(sources.len());
        for source in sources {
            if !unique_sources.contains(&source) {
                unique_sources.push(source);
            }
        }

        Self {
            sources: unique_sources,
            query_templates,
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS_PER_TRACK),
            attempt_timeout,
        }
    }

    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self::new(
            config.sources.clone(),
            config.query_templates.clone(),
            config.max_attempts,
            config.attempt_timeout(),
        )
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Empty only for tracks without a title or artist, or with no sources configured
    pub fn resolve(&self, track: &Track) -> Vec<Attempt> {
        let Some(artist) = track.primary_artist() else {
            return Vec::new();
        };
        let title = track.title.trim();
        if title.is_empty() {
            return Vec::new();
        }

        let mut queries: Vec<String> = Vec::new();
        for template in &self.query_templates {
            let query = render_query(template, artist, title);
            if !query.is_empty() && !queries.contains(&query) {
                queries.push(query);
            }
        }
        if queries.is_empty() {
            queries.push(format!("{} {}", artist, title));
        }

        queries
            .iter()
            .flat_map(|query| {
                self.sources.iter().map(move |source| Attempt {
                    source: *source,
                    query: query.clone(),
                    timeout: self.attempt_timeout,
                })
            })
            .take(self.max_attempts)
            .collect()
    }
}

fn render_query(template: &str, artist: &str, title: &str) -> String {
    template
        .replace("{artist}", artist)
        .replace("{title}", title)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
