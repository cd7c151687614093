//! Error types for the resolution pipeline.

/// A single source's tree or file call failed.
///
/// Every transport failure collapses into one of these variants so the
/// prober can record a uniform per-source diagnostic line and keep going.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {0} ({1})")]
    Status(u16, String),

    #[error("API rate limit exhausted")]
    RateLimited,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("proxy error: {0}")]
    Proxy(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Fatal outcomes of a resolution request.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The input contained no numeric app id. Raised before any network
    /// call is made.
    #[error("could not extract an app id from {input:?}")]
    InvalidInput { input: String },

    /// Every source was tried and none was accepted. `diagnostics` holds
    /// one line per failed source for display to the user.
    #[error("manifest for app id {appid} not found in any repository")]
    NotFound {
        appid: String,
        diagnostics: Vec<String>,
    },
}
