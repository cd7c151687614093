//! Mirror repositories that publish per-app manifest branches.
//!
//! Each source is a GitHub repository whose branches are named after app
//! ids. The builtin list is ordered by priority; the first source whose
//! branch is accepted wins and the rest are never contacted.

use std::fmt;

/// One candidate upstream mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Display name shown in progress output.
    pub name: String,
    /// GitHub coordinate, `owner/repo`.
    pub repo: String,
}

impl Source {
    pub fn new(name: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repo: repo.into(),
        }
    }

    /// Parse an `owner/repo` coordinate given on the command line. The
    /// display name falls back to the coordinate itself.
    pub fn parse(coord: &str) -> Option<Self> {
        let coord = coord.trim();
        let (owner, repo) = coord.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Self::new(coord, coord))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repo)
    }
}

/// The builtin mirror list, in probe order.
pub fn builtin_sources() -> Vec<Source> {
    vec![
        Source::new("ManifestHub", "SteamAutoCracks/ManifestHub"),
        Source::new("ManifestHub (ikun)", "ikun0014/ManifestHub"),
        Source::new("ManifestAutoUpdate", "Auiowu/ManifestAutoUpdate"),
        Source::new("ManifestAutoUpdate (fix)", "tymolu233/ManifestAutoUpdate-fix"),
    ]
}
