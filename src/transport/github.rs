//! Direct GitHub API transport.

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{truncate_error, RepoTransport};
use crate::error::FetchError;
use crate::tree::{Tree, TreeEntry};

const API_BASE: &str = "https://api.github.com";
const RAW_BASE: &str = "https://raw.githubusercontent.com";

/// Raw shape of a git/trees response. A lookup can come back as an inline
/// tree or as a reference object (`url`, no entries) that must be
/// followed once.
#[derive(Debug, Deserialize)]
struct TreePayload {
    #[serde(default)]
    tree: Option<Vec<TreeEntry>>,
    #[serde(default)]
    url: Option<String>,
}

pub struct GithubClient {
    client: Client,
}

impl GithubClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get_tree_payload(&self, url: &str) -> Result<TreePayload, FetchError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(FetchError::from)?;

        let status = response.status();
        if !status.is_success() {
            if is_rate_limited(status, remaining_quota_is_zero(&response)) {
                return Err(FetchError::RateLimited);
            }
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status(status.as_u16(), truncate_error(&body)));
        }

        response
            .json::<TreePayload>()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))
    }
}

impl RepoTransport for GithubClient {
    async fn fetch_tree(&self, repo: &str, branch: &str) -> Result<Tree, FetchError> {
        let url = format!("{API_BASE}/repos/{repo}/git/trees/{branch}?recursive=1");
        let payload = self.get_tree_payload(&url).await?;

        if let Some(entries) = payload.tree {
            return Ok(Tree::new(entries));
        }

        // Reference object: follow its URL once before giving up.
        let next = payload
            .url
            .ok_or_else(|| FetchError::Malformed("response has neither tree nor url".to_string()))?;
        debug!("following tree reference to {}", next);
        let followed = self.get_tree_payload(&format!("{next}?recursive=1")).await?;
        followed
            .tree
            .map(Tree::new)
            .ok_or_else(|| FetchError::Malformed("followed reference has no tree".to_string()))
    }

    async fn fetch_file(&self, repo: &str, branch: &str, path: &str) -> Result<Vec<u8>, FetchError> {
        let url = format!("{RAW_BASE}/{repo}/{branch}/{path}");
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await.map_err(FetchError::from)?;

        let status = response.status();
        if !status.is_success() {
            if is_rate_limited(status, remaining_quota_is_zero(&response)) {
                return Err(FetchError::RateLimited);
            }
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status(status.as_u16(), truncate_error(&body)));
        }

        Ok(response.bytes().await.map_err(FetchError::from)?.to_vec())
    }
}

fn remaining_quota_is_zero(response: &Response) -> bool {
    response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false)
}

/// Rate limiting shows up as 429, or 403 with the remaining-quota header
/// at zero.
fn is_rate_limited(status: StatusCode, remaining_zero: bool) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || (status == StatusCode::FORBIDDEN && remaining_zero)
}
