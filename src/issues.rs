//! Project issue tracker access.
//!
//! Listing is anonymous (and therefore rate-limited); filing an issue
//! needs a GitHub token. Pull requests come back on the same endpoint and
//! are filtered out of listings.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Tracker coordinates.
pub const TRACKER_OWNER: &str = "steamcloud";
pub const TRACKER_REPO: &str = "steamclouds.github.io";

const PER_PAGE: u32 = 25;

#[derive(Debug, Deserialize)]
pub struct Issue {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub user: Option<IssueUser>,
    #[serde(default)]
    pub labels: Vec<IssueLabel>,
    /// Present when the "issue" is actually a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct IssueUser {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct IssueLabel {
    #[serde(default)]
    pub name: String,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn author(&self) -> &str {
        self.user.as_ref().map(|u| u.login.as_str()).unwrap_or("unknown")
    }
}

/// Rate-limit headers echoed back to the user after each call.
#[derive(Debug, Default, Clone, Copy)]
pub struct RateInfo {
    pub remaining: Option<u64>,
    pub limit: Option<u64>,
}

impl RateInfo {
    fn from_headers(headers: &reqwest::header::HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
        };
        Self {
            remaining: read("x-ratelimit-remaining"),
            limit: read("x-ratelimit-limit"),
        }
    }
}

/// A new issue to file.
#[derive(Debug)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// List recent issues, newest first, pull requests excluded.
pub async fn list_issues(
    client: &reqwest::Client,
    state: &str,
) -> Result<(Vec<Issue>, RateInfo)> {
    let url = format!(
        "https://api.github.com/repos/{TRACKER_OWNER}/{TRACKER_REPO}/issues\
         ?state={state}&per_page={PER_PAGE}&sort=created&direction=desc"
    );
    debug!("GET {}", url);

    let response = client
        .get(&url)
        .header(reqwest::header::ACCEPT, "application/vnd.github+json")
        .send()
        .await
        .context("Failed to fetch issues")?;

    let rate = RateInfo::from_headers(response.headers());
    let status = response.status();
    if !status.is_success() {
        bail!("Failed to fetch issues: HTTP {}", status.as_u16());
    }

    let mut issues: Vec<Issue> = response
        .json()
        .await
        .context("Failed to parse issue list")?;
    issues.retain(|i| !i.is_pull_request());

    Ok((issues, rate))
}

/// File a new issue. Returns the created issue.
pub async fn create_issue(
    client: &reqwest::Client,
    token: &str,
    issue: &NewIssue,
) -> Result<(Issue, RateInfo)> {
    let url = format!("https://api.github.com/repos/{TRACKER_OWNER}/{TRACKER_REPO}/issues");
    let payload = json!({
        "title": issue.title,
        "body": issue.body,
        "labels": issue.labels,
    });

    let response = client
        .post(&url)
        .header(reqwest::header::ACCEPT, "application/vnd.github+json")
        .header(
            reqwest::header::AUTHORIZATION,
            format!("token {}", token.trim()),
        )
        .json(&payload)
        .send()
        .await
        .context("Failed to submit issue")?;

    let rate = RateInfo::from_headers(response.headers());
    let status = response.status();
    if !status.is_success() {
        // The API usually explains itself in `message`
        #[derive(Deserialize)]
        struct ApiError {
            #[serde(default)]
            message: String,
        }
        let detail = response
            .json::<ApiError>()
            .await
            .map(|e| e.message)
            .unwrap_or_default();
        if detail.is_empty() {
            bail!("Submit failed ({})", status.as_u16());
        }
        bail!("Submit failed ({}): {}", status.as_u16(), detail);
    }

    let created: Issue = response
        .json()
        .await
        .context("Failed to parse created issue")?;
    Ok((created, rate))
}

/// `"3h ago"`-style age for listing rows.
pub fn since(created_at: &str) -> String {
    let Ok(then) = chrono::DateTime::parse_from_rfc3339(created_at) else {
        return created_at.to_string();
    };
    since_at(then.with_timezone(&chrono::Utc), chrono::Utc::now())
}

fn since_at(then: chrono::DateTime<chrono::Utc>, now: chrono::DateTime<chrono::Utc>) -> String {
    let seconds = (now - then).num_seconds().max(0);
    if seconds < 60 {
        return format!("{seconds}s ago");
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    format!("{}d ago", hours / 24)
}
