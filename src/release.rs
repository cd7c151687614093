//! Latest-release lookup for the toolset.
//!
//! Tries the configured metadata proxy first (it shields the GitHub API
//! from anonymous rate limits), then the GitHub releases endpoint. The
//! main executable is promoted to the front of the asset list.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::transport::truncate_error;

/// Repository whose releases carry the toolset binaries.
pub const RELEASE_REPO: &str = "steamcloud/steamclouds";

/// Asset name stem that marks the main executable.
const MAIN_ASSET_STEM: &str = "steamclouds";

/// The proxy answers slower than GitHub; cap the detour.
const PROXY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub name: Option<String>,
    pub tag_name: String,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub browser_download_url: String,
}

impl Release {
    pub fn title(&self) -> &str {
        match &self.name {
            Some(name) if !name.is_empty() => name,
            _ => &self.tag_name,
        }
    }

    /// Assets with the main executable first; the rest keep API order.
    pub fn ordered_assets(&self) -> Vec<&ReleaseAsset> {
        let main = self
            .assets
            .iter()
            .find(|a| is_main_executable(&a.name));

        let mut ordered: Vec<&ReleaseAsset> = Vec::with_capacity(self.assets.len());
        if let Some(main) = main {
            ordered.push(main);
        }
        ordered.extend(
            self.assets
                .iter()
                .filter(|a| main.map(|m| a.id != m.id).unwrap_or(true)),
        );
        ordered
    }
}

fn is_main_executable(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower == format!("{MAIN_ASSET_STEM}.exe")
        || (lower.contains(MAIN_ASSET_STEM) && lower.ends_with(".exe"))
}

/// Fetch the latest release, proxy first when one is configured.
pub async fn fetch_latest(
    client: &reqwest::Client,
    proxy: Option<&str>,
) -> Result<Release, FetchError> {
    if let Some(endpoint) = proxy {
        match fetch_from_proxy(client, endpoint).await {
            Ok(release) => return Ok(release),
            Err(err) => {
                warn!("release proxy failed ({}), falling back to the GitHub API", err);
            }
        }
    }

    let url = format!("https://api.github.com/repos/{RELEASE_REPO}/releases/latest");
    debug!("GET {}", url);
    let response = client
        .get(&url)
        .header(reqwest::header::ACCEPT, "application/vnd.github+json")
        .send()
        .await
        .map_err(FetchError::from)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FetchError::Status(status.as_u16(), truncate_error(&body)));
    }

    response
        .json::<Release>()
        .await
        .map_err(|e| FetchError::Malformed(e.to_string()))
}

async fn fetch_from_proxy(client: &reqwest::Client, endpoint: &str) -> Result<Release, FetchError> {
    debug!("GET {} (release proxy)", endpoint);
    let response = client
        .get(endpoint)
        .timeout(PROXY_TIMEOUT)
        .send()
        .await
        .map_err(FetchError::from)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FetchError::Status(status.as_u16(), truncate_error(&body)));
    }

    response
        .json::<Release>()
        .await
        .map_err(|e| FetchError::Malformed(e.to_string()))
}

/// Human-readable byte count, 1024 base, trailing zeros trimmed.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rendered = format!("{value:.2}");
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rendered, UNITS[unit])
}
