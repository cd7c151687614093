//! Server-side proxy transport.
//!
//! The proxy accepts a POST body discriminated by `type` and answers with
//! either the same tree JSON the direct API returns, a base64 file
//! payload, or `{ "error": ... }`. Used when the direct path fails or is
//! rate-limited.

use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{truncate_error, RepoTransport};
use crate::error::FetchError;
use crate::tree::{Tree, TreeEntry};

/// Envelope a proxy response may carry. File responses are not always
/// JSON, so every field is optional and the caller decides what is
/// missing.
#[derive(Debug, Default, Deserialize)]
struct ProxyEnvelope {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    tree: Option<Vec<TreeEntry>>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: Client,
    endpoint: String,
}

impl ProxyClient {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, body: &serde_json::Value) -> Result<Vec<u8>, FetchError> {
        debug!("POST {} ({})", self.endpoint, body["type"]);
        let response = self
            .client
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .map_err(FetchError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status(status.as_u16(), truncate_error(&body)));
        }

        Ok(response.bytes().await.map_err(FetchError::from)?.to_vec())
    }
}

impl RepoTransport for ProxyClient {
    async fn fetch_tree(&self, repo: &str, branch: &str) -> Result<Tree, FetchError> {
        let body = json!({
            "type": "tree",
            "repo": repo,
            "branch": branch,
            "recursive": 1,
        });
        let bytes = self.post(&body).await?;

        let envelope: ProxyEnvelope = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Malformed(format!("proxy tree response: {e}")))?;
        if let Some(error) = envelope.error {
            return Err(FetchError::Proxy(error));
        }
        envelope
            .tree
            .map(Tree::new)
            .ok_or_else(|| FetchError::Malformed("proxy tree response has no entries".to_string()))
    }

    async fn fetch_file(&self, repo: &str, branch: &str, path: &str) -> Result<Vec<u8>, FetchError> {
        let body = json!({
            "type": "file",
            "repo": repo,
            "branch": branch,
            "path": path,
        });
        let bytes = self.post(&body).await?;

        // Try the JSON envelope first; anything that does not parse is the
        // raw file body itself.
        if let Ok(envelope) = serde_json::from_slice::<ProxyEnvelope>(&bytes) {
            if let Some(error) = envelope.error {
                return Err(FetchError::Proxy(error));
            }
            if let Some(content) = envelope.content {
                return decode_content(&content, envelope.encoding.as_deref());
            }
        }

        Ok(bytes)
    }
}

fn decode_content(content: &str, encoding: Option<&str>) -> Result<Vec<u8>, FetchError> {
    if encoding == Some("base64") {
        // Apps-Script-style proxies wrap base64 across lines
        let compact: String = content.split_whitespace().collect();
        return base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| FetchError::Malformed(format!("bad base64 from proxy: {e}")));
    }
    Ok(content.as_bytes().to_vec())
}
