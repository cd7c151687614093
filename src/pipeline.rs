//! End-to-end resolution: input → probe → download → archive.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::appid;
use crate::archive::{self, ArchiveSummary};
use crate::download::{self, ArchivePolicy};
use crate::fetcher::RepoAccess;
use crate::prober::{self, Verification};
use crate::sources::Source;

/// Summary of one completed resolution.
#[derive(Debug)]
pub struct FetchReport {
    pub appid: String,
    pub source: Source,
    pub verification: Verification,
    /// Files that made it into the archive (credits entry not counted).
    pub files: usize,
    /// `path: reason` per file that failed both transports.
    pub skipped: Vec<String>,
    pub total_bytes: u64,
    pub archive: ArchiveSummary,
    pub elapsed: Duration,
}

/// Resolve `input` and write the manifest bundle into `out_dir`.
///
/// Fatal failures surface as [`crate::error::ResolveError`] inside the
/// anyhow chain; callers that want the per-source diagnostics downcast
/// for it.
pub async fn fetch_manifest<A: RepoAccess>(
    access: &A,
    sources: &[Source],
    input: &str,
    policy: &ArchivePolicy,
    out_dir: &Path,
    progress: impl FnMut(usize, usize, &str),
) -> Result<FetchReport> {
    let started = Instant::now();

    let appid = appid::resolve_input(input)?;
    let matched = prober::probe(access, sources, &appid).await?;
    let batch =
        download::download_files(access, &matched.source, &appid, &matched.tree, policy, progress)
            .await;
    let summary = archive::build_archive(&appid, &matched.source, &batch, out_dir)?;

    Ok(FetchReport {
        appid,
        source: matched.source,
        verification: matched.verification,
        files: batch.files.len(),
        skipped: batch.skipped,
        total_bytes: batch.total_bytes,
        archive: summary,
        elapsed: started.elapsed(),
    })
}
