//! Batch download of manifest blobs.

use tracing::warn;

use crate::fetcher::RepoAccess;
use crate::sources::Source;
use crate::tree::Tree;

/// Which tree entries stay out of the archive.
///
/// The mirrors disagree on what belongs in a manifest bundle, so the rule
/// is data rather than a hard-coded filter: case-insensitive substring
/// and suffix tests against each path.
#[derive(Debug, Clone)]
pub struct ArchivePolicy {
    /// A path containing any of these is excluded.
    pub exclude_contains: Vec<String>,
    /// A path ending in any of these is excluded.
    pub exclude_suffixes: Vec<String>,
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self {
            exclude_contains: vec!["key.vdf".to_string(), "config.vdf".to_string()],
            exclude_suffixes: vec![".json".to_string()],
        }
    }
}

impl ArchivePolicy {
    /// Keep `.json` files in the archive.
    pub fn include_json(mut self) -> Self {
        self.exclude_suffixes.retain(|s| s != ".json");
        self
    }

    /// Add extra substring exclusions.
    pub fn with_excludes(mut self, extra: &[String]) -> Self {
        self.exclude_contains
            .extend(extra.iter().map(|s| s.to_lowercase()));
        self
    }

    pub fn excludes(&self, path: &str) -> bool {
        let lower = path.to_lowercase();
        self.exclude_contains.iter().any(|n| lower.contains(n))
            || self.exclude_suffixes.iter().any(|s| lower.ends_with(s))
    }
}

/// One successfully downloaded file.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Outcome of a batch download. Partial success is allowed: files that
/// failed both transports are listed in `skipped` and everything else
/// proceeds to the archiver.
#[derive(Debug, Default)]
pub struct DownloadBatch {
    pub files: Vec<FetchedFile>,
    pub total_bytes: u64,
    /// `path: reason` per file that failed both transports.
    pub skipped: Vec<String>,
}

/// Download every blob the policy keeps, sequentially. `progress` is
/// called before each file with (index, total, path).
pub async fn download_files<A: RepoAccess>(
    access: &A,
    source: &Source,
    appid: &str,
    tree: &Tree,
    policy: &ArchivePolicy,
    mut progress: impl FnMut(usize, usize, &str),
) -> DownloadBatch {
    let wanted: Vec<_> = tree.blobs().filter(|e| !policy.excludes(&e.path)).collect();
    let total = wanted.len();
    let mut batch = DownloadBatch::default();

    for (index, entry) in wanted.into_iter().enumerate() {
        progress(index + 1, total, &entry.path);

        match access.fetch_file(source, appid, &entry.path).await {
            Ok(bytes) => {
                batch.total_bytes += bytes.len() as u64;
                batch.files.push(FetchedFile {
                    path: entry.path.clone(),
                    bytes,
                });
            }
            Err(err) => {
                warn!("skipping {}: {}", entry.path, err);
                batch.skipped.push(format!("{}: {}", entry.path, err));
            }
        }
    }

    batch
}
