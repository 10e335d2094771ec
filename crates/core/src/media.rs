use anyhow::{Context, Result};
use async_trait::async_trait;
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
#[cfg(test)]
use mockall::automock;

/// A live TV channel from the IPTV playlist.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Channel {
    pub name: String,
    pub logo: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
}

/// Channel lookup by spoken name. Network-backed, so it may be slow; the
/// orchestrator awaits it without blocking audio capture.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MediaLookup: Send + Sync {
    async fn find_channel(&self, name: &str) -> Result<Option<Channel>>;
}

fn extinf_attr(line: &str, attr: &str) -> Option<String> {
    let marker = format!("{}=\"", attr);
    let start = line.find(&marker)? + marker.len();
    let end = line[start..].find('"')? + start;
    Some(line[start..end].trim().to_string())
}

/// Parses an M3U playlist into channels. Entries without a usable name or
/// url are skipped.
pub fn parse_m3u(m3u: &str) -> Vec<Channel> {
    let lines: Vec<&str> = m3u.lines().collect();
    let mut channels = Vec::new();
    for i in 0..lines.len() {
        if !lines[i].starts_with("#EXTINF:") {
            continue;
        }
        let Some(url_line) = lines.get(i + 1) else {
            continue;
        };
        if url_line.starts_with('#') || url_line.trim().is_empty() {
            continue;
        }
        let info = lines[i];
        let name = extinf_attr(info, "tvg-name")
            .or_else(|| info.rsplit_once(',').map(|(_, display)| display.trim().to_string()))
            .unwrap_or_default();
        let logo = extinf_attr(info, "tvg-logo").unwrap_or_default();
        if !name.is_empty() {
            channels.push(Channel {
                name,
                logo,
                url: url_line.trim().to_string(),
            });
        }
    }
    channels
}

const FUZZY_THRESHOLD: i64 = 50;

/// Picks the channel best matching a spoken name: exact match first, then
/// substring, then the highest fuzzy score above a threshold.
pub fn match_channel<'a>(channels: &'a [Channel], wanted: &str) -> Option<&'a Channel> {
    let wanted = wanted.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }

    if let Some(exact) = channels
        .iter()
        .find(|channel| channel.name.to_lowercase() == wanted)
    {
        return Some(exact);
    }

    if let Some(contains) = channels
        .iter()
        .find(|channel| channel.name.to_lowercase().contains(&wanted))
    {
        return Some(contains);
    }

    let matcher = SkimMatcherV2::default();
    channels
        .iter()
        .filter_map(|channel| {
            matcher
                .fuzzy_match(&channel.name.to_lowercase(), &wanted)
                .filter(|score| *score > FUZZY_THRESHOLD)
                .map(|score| (score, channel))
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, channel)| channel)
}

/// Fetches and caches the IPTV playlist.
pub struct IptvClient {
    client: reqwest::Client,
    playlist_url: String,
    cache: tokio::sync::Mutex<Option<Vec<Channel>>>,
}

impl IptvClient {
    pub fn new(playlist_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            playlist_url,
            cache: tokio::sync::Mutex::new(None),
        }
    }

    async fn channels(&self) -> Result<Vec<Channel>> {
        let mut cache = self.cache.lock().await;
        if let Some(channels) = cache.as_ref() {
            return Ok(channels.clone());
        }
        let body = self
            .client
            .get(&self.playlist_url)
            .send()
            .await
            .context("Failed to fetch the channel playlist")?
            .error_for_status()?
            .text()
            .await?;
        let channels = parse_m3u(&body);
        tracing::info!("loaded {} channels from playlist", channels.len());
        *cache = Some(channels.clone());
        Ok(channels)
    }
}

#[async_trait]
impl MediaLookup for IptvClient {
    async fn find_channel(&self, name: &str) -> Result<Option<Channel>> {
        let channels = self.channels().await?;
        Ok(match_channel(&channels, name).cloned())
    }
}
