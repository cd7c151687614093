//! Branch verification against the key/config file.
//!
//! Mirror branches are looked up by name alone, so a stale or misnamed
//! branch can match the wrong app. When the branch carries a key/config
//! VDF, the app id must appear inside it before the branch is accepted.
//! The check is a substring heuristic (quoted id followed by an open
//! brace), not a structural VDF parse.

use regex::Regex;

use crate::fetcher::RepoAccess;
use crate::sources::Source;

/// Outcome of checking a branch's key file. Download errors count as
/// rejection; nothing propagates past this boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCheck {
    /// The app id appears inside the key file.
    Confirmed,
    /// The key file downloaded but the app id is not inside it.
    AppIdMissing { key_path: String },
    /// The key file could not be downloaded.
    DownloadFailed { key_path: String, reason: String },
}

impl KeyCheck {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, KeyCheck::Confirmed)
    }

    /// Diagnostic text for a rejected check.
    pub fn reject_reason(&self) -> Option<String> {
        match self {
            KeyCheck::Confirmed => None,
            KeyCheck::AppIdMissing { key_path } => {
                Some(format!("app id not present in {key_path}; wrong branch match"))
            }
            KeyCheck::DownloadFailed { key_path, reason } => {
                Some(format!("could not download {key_path}: {reason}"))
            }
        }
    }
}

/// Download `key_path` from the branch and check it names `appid`.
pub async fn check_key_file<A: RepoAccess>(
    access: &A,
    source: &Source,
    appid: &str,
    key_path: &str,
) -> KeyCheck {
    let bytes = match access.fetch_file(source, appid, key_path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return KeyCheck::DownloadFailed {
                key_path: key_path.to_string(),
                reason: err.to_string(),
            }
        }
    };

    let text = String::from_utf8_lossy(&bytes);
    if app_id_present(&text, appid) {
        KeyCheck::Confirmed
    } else {
        KeyCheck::AppIdMissing {
            key_path: key_path.to_string(),
        }
    }
}

/// `"<appid>"` followed by an open brace, optionally separated by
/// whitespace. The app id is all digits, so embedding it in the pattern
/// is safe.
fn app_id_present(text: &str, appid: &str) -> bool {
    match Regex::new(&format!("\"{appid}\"\\s*\\{{")) {
        Ok(pattern) => pattern.is_match(text),
        Err(_) => false,
    }
}
