//! HTTP transports for tree listings and file content.
//!
//! Two transports implement the same contract: the direct GitHub API and
//! an optional server-side proxy used when the direct path fails or is
//! rate-limited. All failures normalize to [`FetchError`].

mod github;
mod proxy;

pub use github::GithubClient;
pub use proxy::ProxyClient;

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::error::FetchError;
use crate::tree::Tree;

/// Time to establish the TCP connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on any single listing or file request. One unresponsive mirror
/// must not stall the whole probe.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(25);

/// One way of reaching a mirror repository. Implemented by the direct
/// GitHub client and the proxy; the fetcher tries them in order.
pub trait RepoTransport {
    /// Fetch the recursive file listing for `branch` in `repo`.
    fn fetch_tree(
        &self,
        repo: &str,
        branch: &str,
    ) -> impl Future<Output = Result<Tree, FetchError>>;

    /// Fetch one file's raw bytes from `branch` in `repo`.
    fn fetch_file(
        &self,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> impl Future<Output = Result<Vec<u8>, FetchError>>;
}

/// Build the shared HTTP client used by every transport.
pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("manifetch/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Truncate an error body for diagnostics.
pub(crate) fn truncate_error(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() > 100 {
        format!("{}...", &trimmed[..97])
    } else if trimmed.is_empty() {
        "no details".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client() {
        assert!(build_client().is_ok());
    }

    #[test]
    fn test_truncate_error() {
        assert_eq!(truncate_error("  "), "no details");
        assert_eq!(truncate_error("short"), "short");
        let long = "x".repeat(200);
        let truncated = truncate_error(&long);
        assert_eq!(truncated.len(), 100);
        assert!(truncated.ends_with("..."));
    }
}
