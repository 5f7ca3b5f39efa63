use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::InstallerConfig;
use crate::error::{Result, ToolFetchError};
use crate::tools::{MatchRule, ToolSpec};

/// Release metadata as served by `.../releases/latest`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseMetadata {
    #[serde(default)]
    pub tag_name: Option<String>,
    pub assets: Vec<AssetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetEntry {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

/// The one asset picked for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: String,
    pub url: String,
    /// Size advertised by the feed, when there is one.
    pub size: Option<u64>,
}

impl From<&AssetEntry> for ReleaseAsset {
    fn from(entry: &AssetEntry) -> Self {
        Self {
            name: entry.name.clone(),
            url: entry.browser_download_url.clone(),
            size: (entry.size > 0).then_some(entry.size),
        }
    }
}

pub struct ReleaseClient {
    http_client: Client,
    token: Option<String>,
    timeout: Duration,
}

impl ReleaseClient {
    pub fn new(http_client: Client, config: &InstallerConfig) -> Self {
        Self {
            http_client,
            token: config.github_token.clone(),
            timeout: config.metadata_timeout,
        }
    }

    /// Fetch and decode the latest-release document at `feed_url`.
    pub async fn fetch_latest_release(&self, feed_url: &str) -> Result<ReleaseMetadata> {
        debug!("Fetching release metadata from {}", feed_url);

        let mut request = self
            .http_client
            .get(feed_url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .timeout(self.timeout);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolFetchError::network(format!("contacting {feed_url}"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolFetchError::HttpStatus {
                url: feed_url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ToolFetchError::network(format!("reading {feed_url}"), e))?;

        let metadata: ReleaseMetadata =
            serde_json::from_slice(&body).map_err(|e| ToolFetchError::Parse {
                url: feed_url.to_string(),
                reason: e.to_string(),
            })?;

        info!(
            "Release {} lists {} assets",
            metadata.tag_name.as_deref().unwrap_or("latest"),
            metadata.assets.len()
        );
        Ok(metadata)
    }
}

/// Pick the asset `spec` wants from `metadata`.
pub fn select_asset(metadata: &ReleaseMetadata, spec: &ToolSpec) -> Result<ReleaseAsset> {
    let picked = match &spec.match_rule {
        MatchRule::Contains(needle) => first_containing(&metadata.assets, needle),
        MatchRule::Versioned(pattern) => greatest_version(&metadata.assets, pattern)?,
    };

    match picked {
        Some(entry) => {
            info!("Selected asset {}", entry.name);
            Ok(ReleaseAsset::from(entry))
        }
        None => {
            let available = metadata
                .assets
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            Err(ToolFetchError::NoMatchingAsset {
                tool: spec.display_name.clone(),
                releases_page: spec.releases_page.clone(),
                available: if available.is_empty() {
                    "No assets available".to_string()
                } else {
                    available
                },
            })
        }
    }
}

fn first_containing<'a>(assets: &'a [AssetEntry], needle: &str) -> Option<&'a AssetEntry> {
    assets.iter().find(|asset| asset.name.contains(needle))
}

/// Asset with the numerically greatest captured version. On a tie the
/// earlier asset in the list wins.
fn greatest_version<'a>(assets: &'a [AssetEntry], pattern: &str) -> Result<Option<&'a AssetEntry>> {
    let re = Regex::new(pattern)?;
    let mut best: Option<(Vec<u64>, &AssetEntry)> = None;

    for asset in assets {
        let Some(version) = re
            .captures(&asset.name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_version(m.as_str()))
        else {
            continue;
        };

        let newer = best
            .as_ref()
            .map_or(true, |(current, _)| version > *current);
        if newer {
            best = Some((version, asset));
        }
    }

    Ok(best.map(|(_, asset)| asset))
}

/// Parse a dotted numeric version so that `5.10` orders after `5.9`.
fn parse_version(raw: &str) -> Option<Vec<u64>> {
    raw.split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}
